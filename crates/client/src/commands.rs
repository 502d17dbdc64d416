//! Post-upgrade commands.

use tokio::process::Command;
use tracing::{info, warn};

/// Outcome of one post-upgrade command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRun {
    /// The command line after substitution.
    pub command: String,
    /// Exit code; `None` when the command could not be started or was
    /// killed by a signal.
    pub exit_code: Option<i32>,
    /// Why the command could not be started.
    pub error: String,
}

impl CommandRun {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Substitutes `$PACKAGES` and `$PACFILES` in `command`.
pub fn expand(command: &str, packages: &str, pacfiles: &str) -> String {
    command
        .replace("$PACKAGES", packages)
        .replace("$PACFILES", pacfiles)
}

/// Runs `command` with `sh -c` and waits for it.
pub async fn run(command: String) -> CommandRun {
    info!(%command, "running post-upgrade command");
    match Command::new("sh").arg("-c").arg(&command).status().await {
        Ok(status) => {
            if !status.success() {
                warn!(%command, %status, "post-upgrade command failed");
            }
            CommandRun {
                command,
                exit_code: status.code(),
                error: String::new(),
            }
        }
        Err(e) => {
            warn!(%command, "failed to start post-upgrade command: {e}");
            CommandRun {
                command,
                exit_code: None,
                error: e.to_string(),
            }
        }
    }
}
