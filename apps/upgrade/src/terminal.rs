//! Prompt-based [`UpgradeUi`] for a terminal.

use std::io::Write;
use std::sync::Mutex;

use pacnotify_client::{UiFuture, UpgradeDecision, UpgradeUi};
use pacnotify_protocol::types::LogLevel;
use pacnotify_protocol::{Answer, ChangeTotals, PackageChange, Question, SyncResult};

pub struct TerminalUi {
    /// Take default answers without prompting.
    noconfirm: bool,
    /// A `\r` progress line is on screen and needs a newline first.
    progress_line: Mutex<bool>,
}

impl TerminalUi {
    pub fn new(noconfirm: bool) -> Self {
        Self {
            noconfirm,
            progress_line: Mutex::new(false),
        }
    }

    fn end_progress_line(&self) {
        if let Ok(mut active) = self.progress_line.lock()
            && *active
        {
            println!();
            *active = false;
        }
    }

    fn say(&self, line: &str) {
        self.end_progress_line();
        println!("{line}");
    }
}

/// Reads one line from stdin without blocking the runtime.
///
/// End of input reads as an empty line.
async fn read_line(prompt: String) -> String {
    print!("{prompt} ");
    let _ = std::io::stdout().flush();
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(_) => line,
            Err(_) => String::new(),
        }
    })
    .await
    .unwrap_or_default()
}

/// `[Y/n]` or `[y/N]` depending on the default.
fn yes_no_hint(default: bool) -> &'static str {
    if default { "[Y/n]" } else { "[y/N]" }
}

/// Interprets a yes/no reply; anything unrecognized is the default.
pub fn parse_yes_no(line: &str, default: bool) -> bool {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

/// Interprets the reply to the package list. `r` recomputes the list and
/// is only offered for download-only runs.
pub fn parse_decision(line: &str, download_only: bool) -> Option<UpgradeDecision> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "yes" => Some(UpgradeDecision::Proceed),
        "n" | "no" => Some(UpgradeDecision::Decline),
        "r" if download_only => Some(UpgradeDecision::Recompute),
        _ => None,
    }
}

/// Interprets a 1-based provider choice; empty picks the first.
pub fn parse_provider(line: &str, count: usize) -> Option<usize> {
    let line = line.trim();
    if line.is_empty() {
        return Some(0);
    }
    match line.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Some(n - 1),
        _ => None,
    }
}

pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

fn signed_size(bytes: i64) -> String {
    let size = human_size(bytes.unsigned_abs());
    if bytes < 0 { format!("-{size}") } else { size }
}

fn change_line(change: &PackageChange) -> String {
    let name = match &change.repo {
        Some(repo) => format!("{repo}/{}", change.name),
        None => change.name.clone(),
    };
    if change.is_removal() {
        format!("  {name:<32} {:<20} (remove)", change.old_version)
    } else if change.is_new_install() {
        format!("  {name:<32} {:<20} (new)", change.new_version)
    } else {
        format!(
            "  {name:<32} {} -> {}",
            change.old_version, change.new_version
        )
    }
}

impl UpgradeUi for TerminalUi {
    fn status(&self, text: &str) {
        self.say(&format!(":: {text}"));
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Error => self.say(&format!("error: {message}")),
            LogLevel::Warning => self.say(&format!("warning: {message}")),
            LogLevel::Debug | LogLevel::Function => tracing::debug!("{message}"),
        }
    }

    fn database_synced(&self, name: &str, result: SyncResult) {
        let text = match result {
            SyncResult::Success => "updated",
            SyncResult::NotNeeded => "is up to date",
            SyncResult::Failure => "failed to synchronize",
        };
        self.say(&format!(" {name} {text}"));
    }

    fn progress(&self, percent: u8, text: &str) {
        print!("\r[{percent:>3}%] {text:<60}");
        let _ = std::io::stdout().flush();
        if let Ok(mut active) = self.progress_line.lock() {
            *active = true;
        }
    }

    fn scriptlet(&self, line: &str) {
        self.say(line);
    }

    fn optional_dependencies(&self, package: &str, optdepends: &[String]) {
        let mut text = format!("Optional dependencies for {package}");
        for dep in optdepends {
            text.push_str("\n    ");
            text.push_str(dep);
        }
        self.say(&text);
    }

    fn ask<'a>(&'a self, question: &'a Question) -> UiFuture<'a, Answer> {
        Box::pin(async move {
            let default = question.default_answer();
            self.end_progress_line();
            if self.noconfirm {
                println!(":: {} {default:?}", question.prompt());
                return default;
            }

            if let Question::SelectProvider { providers, .. } = question {
                println!(":: {}:", question.prompt());
                for (i, p) in providers.iter().enumerate() {
                    println!("   {}) {}/{} {}", i + 1, p.repo, p.name, p.version);
                }
                loop {
                    let line = read_line("Enter a number (default=1):".to_string()).await;
                    if let Some(index) = parse_provider(&line, providers.len()) {
                        return Answer::Provider(index);
                    }
                    println!("invalid choice");
                }
            }

            let yes = default.confirmed();
            let line = read_line(format!(":: {} {}", question.prompt(), yes_no_hint(yes))).await;
            Answer::Confirm(parse_yes_no(&line, yes))
        })
    }

    fn confirm_upgrade<'a>(
        &'a self,
        changes: &'a [PackageChange],
        totals: ChangeTotals,
        download_only: bool,
    ) -> UiFuture<'a, UpgradeDecision> {
        Box::pin(async move {
            self.end_progress_line();
            println!("Packages ({}):", changes.len());
            for change in changes {
                println!("{}", change_line(change));
            }
            println!();
            println!("Total Download Size:   {}", human_size(totals.download));
            if !download_only {
                println!("Total Installed Size:  {}", human_size(totals.installed));
                println!("Net Upgrade Size:      {}", signed_size(totals.net));
            }
            println!();

            if self.noconfirm {
                return UpgradeDecision::Proceed;
            }
            let prompt = if download_only {
                ":: Download packages? [Y/n/r]"
            } else {
                ":: Proceed with installation? [Y/n]"
            };
            loop {
                let line = read_line(prompt.to_string()).await;
                if let Some(decision) = parse_decision(&line, download_only) {
                    return decision;
                }
                println!("invalid choice");
            }
        })
    }

    fn confirm_commands<'a>(&'a self, commands: &'a [String]) -> UiFuture<'a, bool> {
        Box::pin(async move {
            self.end_progress_line();
            println!(":: Post-upgrade commands:");
            for command in commands {
                println!("   {command}");
            }
            if self.noconfirm {
                return true;
            }
            let line = read_line(format!(":: Run them? {}", yes_no_hint(true))).await;
            parse_yes_no(&line, true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yes_no_falls_back_to_default() {
        assert!(parse_yes_no("y\n", false));
        assert!(parse_yes_no("YES", false));
        assert!(!parse_yes_no("n", true));
        assert!(parse_yes_no("\n", true));
        assert!(!parse_yes_no("maybe", false));
    }

    #[test]
    fn recompute_only_for_download_only() {
        assert_eq!(parse_decision("", false), Some(UpgradeDecision::Proceed));
        assert_eq!(parse_decision("n\n", true), Some(UpgradeDecision::Decline));
        assert_eq!(parse_decision("r", true), Some(UpgradeDecision::Recompute));
        assert_eq!(parse_decision("r", false), None);
        assert_eq!(parse_decision("x", true), None);
    }

    #[test]
    fn provider_choice_is_one_based() {
        assert_eq!(parse_provider("\n", 3), Some(0));
        assert_eq!(parse_provider("2", 3), Some(1));
        assert_eq!(parse_provider("0", 3), None);
        assert_eq!(parse_provider("4", 3), None);
        assert_eq!(parse_provider("two", 3), None);
    }

    #[test]
    fn sizes_are_binary_units() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(1536), "1.50 KiB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.00 MiB");
        assert_eq!(signed_size(-2048), "-2.00 KiB");
    }

    #[test]
    fn change_lines_mark_new_and_removed() {
        let change = |old: &str, new: &str, repo: Option<&str>| PackageChange {
            repo: repo.map(Into::into),
            name: "zstd".into(),
            description: String::new(),
            old_version: old.into(),
            new_version: new.into(),
            download_size: 0,
            old_size: 0,
            new_size: 0,
        };
        assert!(change_line(&change("none", "1.5-1", Some("core"))).contains("core/zstd"));
        assert!(change_line(&change("none", "1.5-1", Some("core"))).ends_with("(new)"));
        assert!(change_line(&change("1.5-1", "-", None)).ends_with("(remove)"));
        assert!(change_line(&change("1.5-1", "1.5-2", Some("core"))).ends_with("1.5-1 -> 1.5-2"));
    }
}
