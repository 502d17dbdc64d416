//! Client configuration, stored as TOML in
//! `~/.config/pacnotify/upgrade.toml`.

use std::path::{Path, PathBuf};

use pacnotify_client::UpgradeOptions;

/// Returns the default configuration file path.
pub fn config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
    PathBuf::from(home)
        .join(".config")
        .join("pacnotify")
        .join("upgrade.toml")
}

/// Loads upgrade options from `path`.
///
/// A missing file gives the defaults. So does a file that fails to parse,
/// after a warning.
pub fn load(path: &Path) -> anyhow::Result<UpgradeOptions> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no client config, using defaults");
        return Ok(UpgradeOptions::default());
    }
    let content = std::fs::read_to_string(path)?;
    match toml::from_str(&content) {
        Ok(options) => Ok(options),
        Err(e) => {
            tracing::warn!(path = %path.display(), "invalid config, using defaults: {e}");
            Ok(UpgradeOptions::default())
        }
    }
}
