use anyhow::Result;

use crate::commands::{CommandReport, load_context, pass_busy_issue};
use crate::error::TetherErrorCode;
use crate::remote;
use crate::tether::archival::ArchivalOutcome;
use crate::tether::watcher::{self, PassOutcome};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub skip_archival: bool,
}

pub fn describe_archival(report: &mut CommandReport, archival: &ArchivalOutcome) {
    report.detail(format!("archival.archived={}", archival.archived));
    report.detail(format!("archival.unarchived={}", archival.unarchived));
    report.detail(format!("archival.orphaned={}", archival.orphaned));
    report.detail(format!("archival.refreshed={}", archival.refreshed));
    report.detail(format!("archival.skipped={}", archival.skipped));
    report.detail(format!("archival.failed={}", archival.failed));
    report.detail(format!("archival.stale={}", archival.stale));
    if archival.aborted {
        report.issue(
            TetherErrorCode::E004ArchiveArea
                .tag("archive area could not be created; no folders were moved"),
        );
    }
    if archival.auth_failed {
        report.issue(
            TetherErrorCode::E002AuthFailed
                .tag("remote rejected credentials during archival; completed work was kept"),
        );
    }
}

pub fn describe_pass(report: &mut CommandReport, outcome: &PassOutcome) {
    report.detail(format!("cache_file={}", outcome.cache_file));
    report.detail(format!("pruned={}", outcome.pruned));
    report.detail(format!("records_fetched={}", outcome.records_fetched));
    if let Some(stats) = outcome.reconcile {
        report.detail(format!("reconcile.created={}", stats.created));
        report.detail(format!("reconcile.linked={}", stats.linked));
        report.detail(format!("reconcile.already_linked={}", stats.already_linked));
        report.detail(format!("reconcile.filtered={}", stats.filtered));
        report.detail(format!("reconcile.failed={}", stats.failed));
        report.detail(format!("reconcile.dropped={}", stats.dropped));
    }
    if let Some(archival) = &outcome.archival {
        describe_archival(report, archival);
    }
    report.detail(format!("links={}", outcome.links));

    if let Some(err) = &outcome.remote_error {
        let code = if outcome.auth_failed {
            TetherErrorCode::E002AuthFailed
        } else {
            TetherErrorCode::E006RemoteUnavailable
        };
        report.issue(code.tag(format!("project list unavailable: {err}")));
    }
}

pub fn run(opts: &SyncOptions) -> Result<CommandReport> {
    let (paths, cfg) = load_context()?;
    let api = remote::connect(&cfg)?;
    let mut report = CommandReport::new("sync");

    match watcher::run_sync_pass(&paths, &cfg, &api, !opts.skip_archival)? {
        Some(outcome) => describe_pass(&mut report, &outcome),
        None => pass_busy_issue(&mut report, &paths),
    }
    Ok(report)
}
