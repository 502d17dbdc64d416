//! pacnotify terminal upgrade client.

mod config;
mod terminal;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use pacnotify_client::{ClientError, Orchestrator, UpgradeOutcome, UpgradeReport, WsClient};
use pacnotify_protocol::InitMode;
use tracing_subscriber::EnvFilter;

use crate::terminal::TerminalUi;

/// Synchronize, download and install available updates through the
/// pacnotify helper.
#[derive(Debug, Parser)]
#[command(name = "pacnotify-upgrade", version)]
struct Cli {
    /// Download packages without installing them.
    #[arg(long)]
    download_only: bool,

    /// Use default answers for every question.
    #[arg(long)]
    noconfirm: bool,

    /// Configuration file (default: ~/.config/pacnotify/upgrade.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Helper socket; overrides the configuration.
    #[arg(long)]
    socket: Option<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let path = cli.config.unwrap_or_else(config::config_path);
    let mut options = config::load(&path)?;
    if let Some(socket) = cli.socket {
        options.socket_path = socket;
    }
    let mode = if cli.download_only {
        InitMode::DownloadOnly
    } else {
        InitMode::FullUpgrade
    };

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let client = WsClient::connect(&options.socket_path).await?;
        let ui = Arc::new(TerminalUi::new(cli.noconfirm));
        let orchestrator = Orchestrator::new(client, ui, options, mode)?;

        let cancel = orchestrator.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("SIGINT received, cancelling upgrade");
                cancel.cancel();
            }
        });

        orchestrator.run().await
    });
    // A prompt abandoned by ctrl-c leaves its stdin read running.
    rt.shutdown_background();

    match result {
        Ok(report) => {
            print_report(&report);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print_error(&e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_report(report: &UpgradeReport) {
    println!();
    match report.outcome {
        UpgradeOutcome::NothingToDo => println!(" there is nothing to do"),
        UpgradeOutcome::Declined => println!(" upgrade declined"),
        UpgradeOutcome::Downloaded => {
            println!(" {} packages downloaded", report.changes.len())
        }
        UpgradeOutcome::Upgraded => println!(" {} packages upgraded", report.changes.len()),
    }
    for record in &report.pacnew {
        println!(" {} saved ({})", record.path, record.package);
    }
    for run in report.commands.iter().filter(|run| !run.succeeded()) {
        match run.exit_code {
            Some(code) => println!(" command exited with {code}: {}", run.command),
            None if !run.error.is_empty() => {
                println!(" command failed to start ({}): {}", run.error, run.command)
            }
            None => println!(" command was killed: {}", run.command),
        }
    }
    if let Some(error) = &report.pacnew_log_error {
        println!(" could not write pacnew log: {error}");
    }
}

fn print_error(e: &ClientError) {
    println!();
    eprintln!("error: {}", e.summary());
    let details = e.details();
    if !details.is_empty() && details != e.summary() {
        for line in details.lines() {
            eprintln!("  {line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_parse() {
        let cli = Cli::parse_from([
            "pacnotify-upgrade",
            "--download-only",
            "--noconfirm",
            "--socket",
            "/tmp/worker.sock",
        ]);
        assert!(cli.download_only);
        assert!(cli.noconfirm);
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/worker.sock")));
        assert!(cli.config.is_none());
    }
}
