//! Caller identity and authorization.

use std::collections::HashMap;

use nix::unistd::{Gid, Group, Uid, User};
use serde::Deserialize;
use tracing::debug;

/// Identity of a connected client, taken from the socket credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerIdentity {
    pub uid: u32,
    pub gid: u32,
    pub pid: Option<i32>,
}

impl PeerIdentity {
    pub fn is_root(&self) -> bool {
        Uid::from_raw(self.uid).is_root()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("failed to look up {what}: {source}")]
    Lookup {
        what: String,
        #[source]
        source: nix::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// Decides whether a peer may perform a policy action.
///
/// `Ok(false)` means the grant was refused; `Err` means the decision could
/// not be made. The worker treats both as fatal.
pub trait Authority: Send + Sync {
    fn check(&self, action: &str, peer: &PeerIdentity) -> Result<bool, AuthError>;
}

impl<F> Authority for F
where
    F: Fn(&str, &PeerIdentity) -> Result<bool, AuthError> + Send + Sync,
{
    fn check(&self, action: &str, peer: &PeerIdentity) -> Result<bool, AuthError> {
        self(action, peer)
    }
}

/// Users and groups allowed to perform one action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ActionGrant {
    #[serde(default)]
    pub uids: Vec<u32>,
    /// Group names; a peer qualifies by primary gid or membership.
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Grants root every action, plus configured uids and groups per action.
///
/// Groups and user names are resolved through the system user database.
pub struct PeerAuthority {
    grants: HashMap<String, ActionGrant>,
}

impl PeerAuthority {
    pub fn new(grants: HashMap<String, ActionGrant>) -> Self {
        Self { grants }
    }

    fn in_group(&self, peer: &PeerIdentity, groups: &[String]) -> Result<bool, AuthError> {
        let mut user_name = None;
        for name in groups {
            let Some(group) = Group::from_name(name).map_err(|source| AuthError::Lookup {
                what: format!("group {name}"),
                source,
            })?
            else {
                debug!(group = %name, "granted group does not exist");
                continue;
            };
            if group.gid == Gid::from_raw(peer.gid) {
                return Ok(true);
            }
            if user_name.is_none() {
                user_name = Some(peer_name(peer.uid)?);
            }
            if let Some(Some(user)) = &user_name
                && is_member(&group.mem, user)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Login name of `uid`, if the user database knows it.
fn peer_name(uid: u32) -> Result<Option<String>, AuthError> {
    let user = User::from_uid(Uid::from_raw(uid)).map_err(|source| AuthError::Lookup {
        what: format!("uid {uid}"),
        source,
    })?;
    Ok(user.map(|u| u.name))
}

fn is_member(members: &[String], user: &str) -> bool {
    members.iter().any(|member| member == user)
}

impl Authority for PeerAuthority {
    fn check(&self, action: &str, peer: &PeerIdentity) -> Result<bool, AuthError> {
        if peer.is_root() {
            return Ok(true);
        }
        let Some(grant) = self.grants.get(action) else {
            debug!(action, uid = peer.uid, "no grant configured for action");
            return Ok(false);
        };
        if grant.uids.contains(&peer.uid) {
            return Ok(true);
        }
        self.in_group(peer, &grant.groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacnotify_protocol::constants::{ACTION_DOWNLOAD_ONLY, ACTION_SYSUPGRADE};

    // Far outside any range a test host hands out.
    const STRANGER: u32 = 3_999_999_001;

    fn peer(uid: u32, gid: u32) -> PeerIdentity {
        PeerIdentity {
            uid,
            gid,
            pid: Some(4242),
        }
    }

    fn grant(uids: Vec<u32>, groups: &[&str]) -> ActionGrant {
        ActionGrant {
            uids,
            groups: groups.iter().map(|g| g.to_string()).collect(),
        }
    }

    #[test]
    fn root_is_always_granted() {
        let auth = PeerAuthority::new(HashMap::new());
        assert!(auth.check(ACTION_SYSUPGRADE, &peer(0, 0)).unwrap());
    }

    #[test]
    fn unknown_action_is_refused() {
        let auth = PeerAuthority::new(HashMap::new());
        assert!(!auth.check(ACTION_SYSUPGRADE, &peer(1000, 1000)).unwrap());
    }

    #[test]
    fn grants_by_uid() {
        let mut grants = HashMap::new();
        grants.insert(ACTION_SYSUPGRADE.to_string(), grant(vec![2000], &[]));
        let auth = PeerAuthority::new(grants);

        assert!(auth.check(ACTION_SYSUPGRADE, &peer(2000, 2000)).unwrap());
        assert!(!auth.check(ACTION_SYSUPGRADE, &peer(2001, 2000)).unwrap());
        assert!(!auth.check(ACTION_DOWNLOAD_ONLY, &peer(2000, 2000)).unwrap());
    }

    #[test]
    fn grants_by_primary_group() {
        let gid = Gid::current();
        let Some(group) = Group::from_gid(gid).unwrap() else {
            // The process group has no entry in the user database.
            return;
        };
        let mut grants = HashMap::new();
        grants.insert(ACTION_DOWNLOAD_ONLY.to_string(), grant(Vec::new(), &[&group.name]));
        let auth = PeerAuthority::new(grants);

        assert!(
            auth.check(ACTION_DOWNLOAD_ONLY, &peer(STRANGER, gid.as_raw()))
                .unwrap()
        );
        assert!(
            !auth
                .check(ACTION_DOWNLOAD_ONLY, &peer(STRANGER, gid.as_raw().wrapping_add(1)))
                .unwrap()
        );
    }

    #[test]
    fn missing_group_is_refused_not_an_error() {
        let mut grants = HashMap::new();
        grants.insert(
            ACTION_SYSUPGRADE.to_string(),
            grant(Vec::new(), &["pacnotify-no-such-group"]),
        );
        let auth = PeerAuthority::new(grants);
        assert!(!auth.check(ACTION_SYSUPGRADE, &peer(STRANGER, STRANGER)).unwrap());
    }

    #[test]
    fn membership_matches_login_name() {
        let members = vec!["alice".to_string(), "carol".to_string()];
        assert!(is_member(&members, "alice"));
        assert!(!is_member(&members, "bob"));
        assert!(!is_member(&[], "alice"));
    }

    #[test]
    fn unknown_uid_has_no_name() {
        assert_eq!(peer_name(STRANGER).unwrap(), None);
        assert_eq!(peer_name(0).unwrap().as_deref(), Some("root"));
    }

    #[test]
    fn closures_are_authorities() {
        let deny = |_: &str, _: &PeerIdentity| -> Result<bool, AuthError> { Ok(false) };
        assert!(!deny.check(ACTION_SYSUPGRADE, &peer(1000, 1000)).unwrap());
    }
}
