//! Helper configuration.
//!
//! Read from `/etc/pacnotify/helper.toml`. A missing file gives the
//! defaults; a file that fails to parse is an error, since it decides who
//! may upgrade the system.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use pacnotify_protocol::constants::{ACTION_DOWNLOAD_ONLY, ACTION_SYSUPGRADE, DEFAULT_SOCKET_PATH};
use pacnotify_worker::{ActionGrant, ServerConfig};
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/pacnotify/helper.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    pub socket_path: PathBuf,
    pub socket_mode: u32,
    /// Stop the daemon once the client releases the engine.
    pub exit_when_released: bool,
    /// Who may perform each action, keyed by action id.
    pub grants: HashMap<String, ActionGrant>,
    pub engine: EngineConfig,
}

/// Which package engine the helper drives.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum EngineConfig {
    /// Engine that replays a scenario file instead of touching the system.
    Scripted {
        #[serde(default)]
        scenario: Option<PathBuf>,
    },
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::Scripted { scenario: None }
    }
}

impl Default for HelperConfig {
    fn default() -> Self {
        let wheel = ActionGrant {
            uids: Vec::new(),
            groups: vec!["wheel".into()],
        };
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            socket_mode: 0o666,
            exit_when_released: true,
            grants: HashMap::from([
                (ACTION_SYSUPGRADE.to_string(), wheel.clone()),
                (ACTION_DOWNLOAD_ONLY.to_string(), wheel),
            ]),
            engine: EngineConfig::default(),
        }
    }
}

impl HelperConfig {
    /// Loads the configuration at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no helper config, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn server(&self) -> ServerConfig {
        ServerConfig {
            socket_path: self.socket_path.clone(),
            socket_mode: self.socket_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HelperConfig::load(&dir.path().join("helper.toml")).unwrap();
        assert_eq!(config, HelperConfig::default());
        assert_eq!(config.grants[ACTION_SYSUPGRADE].groups, vec!["wheel"]);
    }

    #[test]
    fn parses_grants_and_engine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.toml");
        std::fs::write(
            &path,
            r#"
                socket_path = "/tmp/pacnotify.sock"
                socket_mode = 0o660
                exit_when_released = false

                [grants."org.pacnotify.sysupgrade"]
                uids = [1000]

                [engine]
                backend = "scripted"
                scenario = "/etc/pacnotify/demo.toml"
            "#,
        )
        .unwrap();

        let config = HelperConfig::load(&path).unwrap();
        assert_eq!(config.server().socket_mode, 0o660);
        assert!(!config.exit_when_released);
        assert_eq!(config.grants.len(), 1);
        assert_eq!(config.grants[ACTION_SYSUPGRADE].uids, vec![1000]);
        assert_eq!(
            config.engine,
            EngineConfig::Scripted {
                scenario: Some(PathBuf::from("/etc/pacnotify/demo.toml"))
            }
        );
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("helper.toml");
        std::fs::write(&path, "[engine]\nbackend = \"libalpm\"\n").unwrap();
        let err = HelperConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }
}
