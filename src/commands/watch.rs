use anyhow::Result;

use crate::commands::sync::describe_pass;
use crate::commands::{CommandReport, load_context, pass_busy_issue};
use crate::remote;
use crate::tether::watcher;

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub once: bool,
    pub daemon: bool,
}

pub fn run(opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");

    if opts.once && opts.daemon {
        report.issue("invalid flags: use only one of --once or --daemon");
        return Ok(report);
    }

    let (paths, cfg) = load_context()?;
    let api = remote::connect(&cfg)?;

    if opts.daemon {
        report.detail("starting tether watcher in daemon mode");
        watcher::run_daemon(&paths, &cfg, &api)?;
        return Ok(report);
    }

    report.detail(format!("poll_interval_secs={}", cfg.watcher.poll_interval_secs));
    match watcher::run_sync_pass(&paths, &cfg, &api, true)? {
        Some(outcome) => {
            report.detail("tether watcher cycle completed");
            describe_pass(&mut report, &outcome);
        }
        None => pass_busy_issue(&mut report, &paths),
    }
    Ok(report)
}
