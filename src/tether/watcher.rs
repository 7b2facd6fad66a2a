use crate::remote::RemoteApi;
use crate::tether::archival::{ArchivalOutcome, run_archival_pass};
use crate::tether::audit::{self, AuditStatus};
use crate::tether::cache::CacheStore;
use crate::tether::config::TetherConfig;
use crate::tether::debounce::Debouncer;
use crate::tether::lock::{DaemonLock, PassLock};
use crate::tether::paths::TetherPaths;
use crate::tether::reconcile::{LinkOptions, ReconcileStats, reconcile};
use crate::tether::storage::FsStorage;
use crate::tether::summary::MarkdownSummary;
use crate::tether::util::now_epoch_ms;
use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct PassOutcome {
    pub cache_file: String,
    pub pruned: usize,
    pub records_fetched: usize,
    pub reconcile: Option<ReconcileStats>,
    pub archival: Option<ArchivalOutcome>,
    pub auth_failed: bool,
    pub remote_error: Option<String>,
    pub links: usize,
}

impl PassOutcome {
    pub fn degraded(&self) -> bool {
        self.auth_failed
            || self.remote_error.is_some()
            || self.archival.map(|a| a.aborted).unwrap_or(false)
    }
}

fn open_workspace(paths: &TetherPaths) -> Result<FsStorage> {
    fs::create_dir_all(&paths.workspaces_dir)
        .with_context(|| format!("failed to create {}", paths.workspaces_dir.display()))?;
    Ok(FsStorage::new(&paths.workspaces_dir))
}

fn skipped_busy(paths: &TetherPaths, phase: &str) {
    warn!(phase, "another pass is in progress; skipping");
    audit::record(paths, phase, AuditStatus::Skipped, "pass already in progress");
}

/// Drop links to folders that no longer exist. `Ok(None)` when another pass
/// holds the lock.
pub fn run_prune(paths: &TetherPaths) -> Result<Option<usize>> {
    let Some(_lock) = PassLock::try_acquire(&paths.pass_lock_file())? else {
        skipped_busy(paths, "prune");
        return Ok(None);
    };
    let storage = open_workspace(paths)?;
    let mut cache = CacheStore::load(paths.cache_file());
    let removed = cache.prune(&storage)?;
    audit::record(paths, "prune", AuditStatus::Ok, &format!("removed={removed}"));
    Ok(Some(removed))
}

/// One full pass: prune, fetch, reconcile, then (optionally) archival.
pub fn run_sync_pass(
    paths: &TetherPaths,
    cfg: &TetherConfig,
    api: &RemoteApi,
    with_archival: bool,
) -> Result<Option<PassOutcome>> {
    let Some(_lock) = PassLock::try_acquire(&paths.pass_lock_file())? else {
        skipped_busy(paths, "sync");
        return Ok(None);
    };

    let mut storage = open_workspace(paths)?;
    let mut cache = CacheStore::load(paths.cache_file());
    let mut outcome = PassOutcome {
        cache_file: cache.file().display().to_string(),
        pruned: cache.prune(&storage)?,
        ..PassOutcome::default()
    };

    let records = match api.list_records() {
        Ok(records) => records,
        Err(err) => {
            error!(error = %err, "remote project list unavailable");
            outcome.auth_failed = err.is_unauthorized();
            outcome.remote_error = Some(err.to_string());
            outcome.links = cache.len();
            audit::record(paths, "sync", AuditStatus::Degraded, &err.to_string());
            return Ok(Some(outcome));
        }
    };
    outcome.records_fetched = records.len();

    let opts = LinkOptions {
        summary_file_name: cfg.sync.summary_file_name.clone(),
        archive_folder_name: cfg.archive.folder_name.trim().to_string(),
    };
    let filter = cfg.filter_rule()?;
    let stats = reconcile(
        &records,
        &mut cache,
        &mut storage,
        &MarkdownSummary,
        &filter,
        &opts,
    )?;
    outcome.reconcile = Some(stats);
    audit::record(
        paths,
        "reconcile",
        AuditStatus::Ok,
        &format!(
            "created={} linked={} already_linked={} filtered={} failed={}",
            stats.created, stats.linked, stats.already_linked, stats.filtered, stats.failed
        ),
    );

    if with_archival && cfg.sync.archive_after_sync {
        let archival = archival_step(paths, cfg, api, &mut cache, &mut storage)?;
        outcome.auth_failed |= archival.auth_failed;
        outcome.archival = Some(archival);
    }

    outcome.links = cache.len();
    Ok(Some(outcome))
}

fn archival_step(
    paths: &TetherPaths,
    cfg: &TetherConfig,
    api: &RemoteApi,
    cache: &mut CacheStore,
    storage: &mut FsStorage,
) -> Result<ArchivalOutcome> {
    let outcome = run_archival_pass(api, cache, storage, &cfg.archive_policy(), now_epoch_ms()?)?;
    let status = if outcome.aborted || outcome.auth_failed {
        AuditStatus::Degraded
    } else {
        AuditStatus::Ok
    };
    audit::record(
        paths,
        "archival",
        status,
        &format!(
            "archived={} unarchived={} orphaned={} skipped={} failed={} aborted={}",
            outcome.archived,
            outcome.unarchived,
            outcome.orphaned,
            outcome.skipped,
            outcome.failed,
            outcome.aborted
        ),
    );
    Ok(outcome)
}

/// Archival on its own, for the `archive` command.
pub fn run_archive_pass(
    paths: &TetherPaths,
    cfg: &TetherConfig,
    api: &RemoteApi,
) -> Result<Option<ArchivalOutcome>> {
    let Some(_lock) = PassLock::try_acquire(&paths.pass_lock_file())? else {
        skipped_busy(paths, "archival");
        return Ok(None);
    };
    let mut storage = open_workspace(paths)?;
    let mut cache = CacheStore::load(paths.cache_file());
    cache.prune(&storage)?;
    archival_step(paths, cfg, api, &mut cache, &mut storage).map(Some)
}

/// Digest of the top-level folder names and their modification times.
/// Changes whenever a linked folder is added, removed, renamed or touched.
pub fn local_fingerprint(root: &Path) -> String {
    let mut names = match fs::read_dir(root) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok())
            .map(|entry| {
                let modified = entry
                    .metadata()
                    .and_then(|meta| meta.modified())
                    .ok()
                    .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis())
                    .unwrap_or(0);
                format!("{}:{modified}", entry.file_name().to_string_lossy())
            })
            .collect::<Vec<_>>(),
        Err(_) => Vec::new(),
    };
    names.sort();

    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn log_pass_failure(phase: &str, result: Result<()>) {
    if let Err(err) = result {
        let error = format!("{err:#}");
        error!(phase, %error, "pass failed; daemon keeps running");
    }
}

/// Long-running watcher: prune at startup, a full pass after the startup
/// delay and then every poll interval, plus a debounced prune whenever the
/// local folder tree changes.
pub fn run_daemon(paths: &TetherPaths, cfg: &TetherConfig, api: &RemoteApi) -> Result<()> {
    let _daemon = DaemonLock::acquire(&paths.daemon_lock_file(), env!("BUILD_UUID"))?;
    info!(
        workspaces = %paths.workspaces_dir.display(),
        poll_interval_secs = cfg.watcher.poll_interval_secs,
        "watcher daemon started"
    );
    audit::record(paths, "daemon", AuditStatus::Ok, "started");

    log_pass_failure("startup-prune", run_prune(paths).map(|_| ()));

    let tick = Duration::from_millis(cfg.watcher.tick_ms.max(1));
    let poll = Duration::from_secs(cfg.watcher.poll_interval_secs.max(1));
    let mut next_pass = Instant::now() + Duration::from_secs(cfg.watcher.startup_delay_secs);
    let mut debouncer = Debouncer::new(Duration::from_millis(cfg.watcher.debounce_ms));
    let mut fingerprint = local_fingerprint(&paths.workspaces_dir);

    loop {
        let now = Instant::now();
        let current = local_fingerprint(&paths.workspaces_dir);
        if current != fingerprint {
            fingerprint = current;
            if !debouncer.is_pending() {
                debug!("local folder change detected; waiting for quiet period");
            }
            debouncer.touch(now);
        }
        if debouncer.poll(now) {
            info!("local folders changed; refreshing links");
            log_pass_failure("refresh", run_prune(paths).map(|_| ()));
        }
        if now >= next_pass {
            match run_sync_pass(paths, cfg, api, true) {
                Ok(Some(outcome)) if outcome.degraded() => {
                    warn!(links = outcome.links, "pass finished degraded; retrying next interval");
                }
                Ok(_) => {}
                Err(err) => log_pass_failure("sync", Err(err)),
            }
            // The pass itself may have moved folders; don't treat that as a local edit.
            fingerprint = local_fingerprint(&paths.workspaces_dir);
            next_pass = Instant::now() + poll;
        }
        thread::sleep(tick);
    }
}
