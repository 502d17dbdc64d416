//! What an upgrade run is configured with.

use std::path::PathBuf;

use pacnotify_protocol::EngineOptions;
use pacnotify_protocol::constants::DEFAULT_SOCKET_PATH;
use pacnotify_protocol::messages::AddDatabaseRequest;
use pacnotify_protocol::types::SIG_USE_DEFAULT;
use serde::{Deserialize, Serialize};

/// A sync repository as registered with the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default = "default_repo_sig_level")]
    pub sig_level: u32,
    /// Server URLs; `$repo` and `$arch` are substituted by the worker.
    #[serde(default)]
    pub servers: Vec<String>,
}

fn default_repo_sig_level() -> u32 {
    SIG_USE_DEFAULT
}

impl Repository {
    pub fn request(&self) -> AddDatabaseRequest {
        AddDatabaseRequest {
            name: self.name.clone(),
            sig_level: self.sig_level,
            servers: self.servers.clone(),
        }
    }
}

/// Commands offered after a successful upgrade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostUpgrade {
    /// Shell command lines; `$PACKAGES` and `$PACFILES` are substituted.
    pub commands: Vec<String>,
    /// Ask once before running them.
    pub confirm: bool,
}

impl Default for PostUpgrade {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            confirm: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeOptions {
    pub socket_path: PathBuf,
    pub engine: EngineOptions,
    pub repositories: Vec<Repository>,
    /// Download databases even when they are up to date.
    pub force_sync: bool,
    pub post_upgrade: PostUpgrade,
    /// File the list of saved `.pacnew` files is appended to.
    pub pacnew_log: Option<PathBuf>,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        let mirror = "https://geo.mirror.pkgbuild.com/$repo/os/$arch".to_string();
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            engine: EngineOptions::default(),
            repositories: ["core", "extra"]
                .into_iter()
                .map(|name| Repository {
                    name: name.into(),
                    sig_level: SIG_USE_DEFAULT,
                    servers: vec![mirror.clone()],
                })
                .collect(),
            force_sync: false,
            post_upgrade: PostUpgrade::default(),
            pacnew_log: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let opts: UpgradeOptions = toml::from_str("").unwrap();
        assert_eq!(opts, UpgradeOptions::default());
        assert_eq!(opts.repositories.len(), 2);
        assert!(opts.post_upgrade.confirm);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let text = r#"
            socket_path = "/tmp/worker.sock"
            pacnew_log = "/home/user/.local/share/pacnotify/pacnew.log"

            [[repositories]]
            name = "core"
            servers = ["https://mirror.example/$repo/os/$arch"]

            [post_upgrade]
            commands = ["notify-send 'upgraded' '$PACKAGES'"]
        "#;
        let opts: UpgradeOptions = toml::from_str(text).unwrap();
        assert_eq!(opts.socket_path, PathBuf::from("/tmp/worker.sock"));
        assert_eq!(opts.repositories.len(), 1);
        assert_eq!(opts.repositories[0].sig_level, SIG_USE_DEFAULT);
        assert_eq!(opts.post_upgrade.commands.len(), 1);
        assert!(opts.post_upgrade.confirm);
        assert_eq!(opts.engine, EngineOptions::default());

        let req = opts.repositories[0].request();
        assert_eq!(req.name, "core");
        assert_eq!(req.servers.len(), 1);
    }
}
