use anyhow::Result;

use crate::commands::sync::describe_archival;
use crate::commands::{CommandReport, load_context, pass_busy_issue};
use crate::remote;
use crate::tether::watcher;

pub fn run() -> Result<CommandReport> {
    let (paths, cfg) = load_context()?;
    let mut report = CommandReport::new("archive");
    report.detail(format!("archive_folder={}", cfg.archive.folder_name.trim()));

    if !cfg.archive.auto_archive {
        report.detail("auto archive disabled; nothing to do");
        return Ok(report);
    }

    let api = remote::connect(&cfg)?;
    match watcher::run_archive_pass(&paths, &cfg, &api)? {
        Some(outcome) => describe_archival(&mut report, &outcome),
        None => pass_busy_issue(&mut report, &paths),
    }
    Ok(report)
}
