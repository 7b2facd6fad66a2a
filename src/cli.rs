use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::logging;
use crate::tether::paths::resolve_paths;

#[derive(Debug, Parser)]
#[command(
    name = "tether",
    version,
    about = "Link remote workspace records to local folders and keep them reconciled"
)]
struct Cli {
    /// Print the report as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Debug-level logging.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Prune, fetch remote records, reconcile links, then run archival.
    Sync {
        /// Skip the archival pass after reconciling.
        #[arg(long)]
        no_archive: bool,
    },
    /// Drop links whose folders no longer exist.
    Prune,
    /// Run the archival pass over existing links.
    Archive,
    /// Link an existing folder to a remote record by id.
    Link {
        #[arg(long)]
        record: String,
        #[arg(long)]
        folder: String,
    },
    /// Remove the link for a folder; the folder itself is kept.
    Unlink {
        #[arg(long)]
        folder: String,
    },
    /// Push a synced document, refusing when the remote changed since.
    Push {
        #[arg(long)]
        file: PathBuf,
    },
    /// Run one watcher cycle or the long-running daemon.
    Watch {
        #[arg(long)]
        once: bool,
        #[arg(long)]
        daemon: bool,
    },
    /// Stop a running watcher daemon.
    Stop,
    /// Show paths, configuration and link counts.
    Status,
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{}: {}",
        report.command,
        if report.ok { "ok" } else { "failed" }
    );
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = resolve_paths()?;
    logging::init(&paths.logs_dir, cli.verbose);

    let report = match cli.command {
        Command::Sync { no_archive } => commands::sync::run(&commands::sync::SyncOptions {
            skip_archival: no_archive,
        })?,
        Command::Prune => commands::prune::run()?,
        Command::Archive => commands::archive::run()?,
        Command::Link { record, folder } => {
            commands::link::run_link(&commands::link::LinkOptions {
                record_id: record,
                folder,
            })?
        }
        Command::Unlink { folder } => commands::link::run_unlink(&folder)?,
        Command::Push { file } => commands::push::run(&file)?,
        Command::Watch { once, daemon } => {
            commands::watch::run(&commands::watch::WatchOptions { once, daemon })?
        }
        Command::Stop => commands::stop::run()?,
        Command::Status => commands::status::run()?,
    };

    render(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
