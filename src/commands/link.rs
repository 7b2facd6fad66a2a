use anyhow::Result;

use crate::commands::{CommandReport, load_context, pass_busy_issue, remote_issue};
use crate::remote;
use crate::tether::cache::CacheStore;
use crate::tether::lock::PassLock;
use crate::tether::paths::resolve_paths;
use crate::tether::storage::{self, FsStorage, Storage};
use crate::tether::util::now_epoch_ms;

#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub record_id: String,
    pub folder: String,
}

pub fn run_link(opts: &LinkOptions) -> Result<CommandReport> {
    let (paths, cfg) = load_context()?;
    let mut report = CommandReport::new("link");
    let folder = storage::normalize(&opts.folder);
    let record_id = opts.record_id.trim();

    if folder.is_empty() || record_id.is_empty() {
        report.issue("both --record and --folder are required");
        return Ok(report);
    }

    let Some(_lock) = PassLock::try_acquire(&paths.pass_lock_file())? else {
        pass_busy_issue(&mut report, &paths);
        return Ok(report);
    };

    let storage = FsStorage::new(&paths.workspaces_dir);
    if !storage.is_folder(&folder) {
        report.issue(format!(
            "folder `{folder}` does not exist under {}",
            paths.workspaces_dir.display()
        ));
        return Ok(report);
    }

    let api = remote::connect(&cfg)?;
    let record = match api.fetch_record(record_id) {
        Ok(record) => record,
        Err(err) if err.is_not_found() => {
            report.issue(format!("remote record `{record_id}` not found"));
            return Ok(report);
        }
        Err(err) => {
            remote_issue(&mut report, "record lookup failed", &err);
            return Ok(report);
        }
    };

    let mut cache = CacheStore::load(paths.cache_file());
    if cache.path_for_record(&record.id) == Some(folder.as_str()) {
        report.detail(format!("{folder} already linked to {}; refreshing", record.id));
    }
    if let Some(previous) = cache.get(&folder)
        && previous.record_id != record.id
    {
        report.detail(format!(
            "replaced link {folder} -> {}",
            previous.record_id
        ));
    }
    for dropped in cache.link(&folder, &record, now_epoch_ms()?) {
        report.detail(format!("dropped previous link {dropped}"));
    }
    cache.save()?;

    report.detail(format!("linked {folder} -> {} ({})", record.id, record.title));
    Ok(report)
}

pub fn run_unlink(folder: &str) -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("unlink");
    let folder = storage::normalize(folder);

    let Some(_lock) = PassLock::try_acquire(&paths.pass_lock_file())? else {
        pass_busy_issue(&mut report, &paths);
        return Ok(report);
    };

    let mut cache = CacheStore::load(paths.cache_file());
    match cache.remove(&folder) {
        Some(entry) => {
            cache.save()?;
            report.detail(format!(
                "unlinked {folder} (record {}); folder left in place",
                entry.record_id
            ));
        }
        None => report.issue(format!("no link recorded for `{folder}`")),
    }
    Ok(report)
}
