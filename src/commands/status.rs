use anyhow::Result;
use std::env;

use crate::commands::{CommandReport, load_context};
use crate::tether::cache::CacheStore;
use crate::tether::config::resolve_config_path;
use crate::tether::lock::read_lock_pid;
use crate::tether::storage::{FsStorage, Storage};
use crate::tether::util::pid_alive;

include!(concat!(env!("OUT_DIR"), "/tether_env_allowlist.rs"));

/// Names of allow-listed `TETHER_*` variables that are currently set.
/// Values are never echoed; some of them are credentials.
pub fn env_overrides_set() -> Vec<&'static str> {
    GENERATED_TETHER_ENV_ALLOWLIST
        .iter()
        .copied()
        .filter(|key| env::var_os(key).is_some_and(|v| !v.is_empty()))
        .collect()
}

pub fn run() -> Result<CommandReport> {
    let (paths, cfg) = load_context()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("tether_home={}", paths.tether_home.display()));
    report.detail(format!("workspaces_dir={}", paths.workspaces_dir.display()));
    report.detail(format!("state_dir={}", paths.state_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("config_file={}", resolve_config_path(&paths).display()));
    report.detail(format!(
        "remote.base_url={}",
        cfg.remote.base_url.as_deref().unwrap_or("<unset>")
    ));
    report.detail(format!(
        "remote.token={}",
        if cfg.api_token().is_some() { "set" } else { "unset" }
    ));
    let filter = cfg.filter_rule()?;
    report.detail(format!(
        "filter.status_allowlist={}",
        if filter.allowlist_enabled() {
            cfg.filter.status_allowlist.join(",")
        } else {
            "<disabled>".to_string()
        }
    ));
    report.detail(format!("filter.ignore_patterns={}", filter.patterns().len()));
    report.detail(format!("archive.folder={}", cfg.archive.folder_name.trim()));
    report.detail(format!("archive.auto_archive={}", cfg.archive.auto_archive));
    report.detail(format!(
        "archive.auto_unarchive={}",
        cfg.archive.auto_unarchive
    ));

    let policy = cfg.archive_policy();
    let storage = FsStorage::new(&paths.workspaces_dir);
    let cache = CacheStore::load(paths.cache_file());
    let archived = cache
        .entries()
        .keys()
        .filter(|path| policy.is_archived_path(path))
        .count();
    let stale = cache
        .entries()
        .keys()
        .filter(|path| !storage.exists(path))
        .count();
    report.detail(format!("links={}", cache.len()));
    report.detail(format!("links.active={}", cache.len() - archived));
    report.detail(format!("links.archived={archived}"));
    report.detail(format!("links.stale={stale}"));
    if cache.is_empty() {
        report.detail("no links recorded yet; run `tether sync` to create them");
    }

    let daemon_lock = paths.daemon_lock_file();
    let daemon = match read_lock_pid(&daemon_lock) {
        Ok(pid) if pid_alive(pid) => format!("running pid={pid}"),
        Ok(pid) => format!("stale lock pid={pid}"),
        Err(_) => "stopped".to_string(),
    };
    report.detail(format!("daemon={daemon}"));

    let overrides = env_overrides_set();
    report.detail(format!(
        "env_overrides={}",
        if overrides.is_empty() {
            "<none>".to_string()
        } else {
            overrides.join(",")
        }
    ));

    if cfg.remote.base_url.is_none() {
        report.detail("remote base url not configured; sync, archive, link and push are unavailable");
    }

    Ok(report)
}
