use anyhow::Result;

use crate::commands::{CommandReport, pass_busy_issue};
use crate::tether::paths::resolve_paths;
use crate::tether::watcher;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("prune");
    report.detail(format!("cache_file={}", paths.cache_file().display()));

    match watcher::run_prune(&paths)? {
        Some(removed) => report.detail(format!("removed={removed}")),
        None => pass_busy_issue(&mut report, &paths),
    }
    Ok(report)
}
