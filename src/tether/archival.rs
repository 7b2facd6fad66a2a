//! Archive / unarchive / orphan transitions for linked folders.
//!
//! A linked folder is Active when it lives outside the archive area and
//! Archived when it lives inside it. A record the remote no longer knows is
//! Orphaned: its folder is pushed into the archive area and the link is
//! dropped for good.

use crate::error::{RemoteError, TetherError};
use crate::remote::RemoteApi;
use crate::tether::cache::CacheStore;
use crate::tether::model::RemoteStatusInfo;
use crate::tether::storage::{self, Storage};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePolicy {
    pub archive_folder_name: String,
    pub archive_statuses: BTreeSet<String>,
    pub auto_archive_enabled: bool,
    pub auto_unarchive_enabled: bool,
}

impl ArchivePolicy {
    pub fn is_archived_path(&self, path: &str) -> bool {
        let normalized = storage::normalize(path);
        match normalized.split_once('/') {
            Some((first, rest)) => {
                !rest.is_empty() && first.eq_ignore_ascii_case(&self.archive_folder_name)
            }
            None => false,
        }
    }

    pub fn archived_path(&self, path: &str) -> String {
        storage::join(&self.archive_folder_name, path)
    }

    pub fn unarchived_path(&self, path: &str) -> String {
        let normalized = storage::normalize(path);
        match normalized.split_once('/') {
            Some((first, rest)) if first.eq_ignore_ascii_case(&self.archive_folder_name) => {
                rest.to_string()
            }
            _ => normalized,
        }
    }

    pub fn wants_archive(&self, info: &RemoteStatusInfo) -> bool {
        info.archived || self.archive_statuses.contains(info.status.trim())
    }
}

/// What the remote said about one linked record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteLookup {
    Found(RemoteStatusInfo),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveDecision {
    /// Record is gone remotely. `move_to` is `None` when the folder is
    /// already inside the archive area.
    Orphan { move_to: Option<String> },
    Archive { to: String },
    Unarchive { to: String },
    /// No structural change; status fields are refreshed in place.
    Refresh,
}

pub fn decide(path: &str, lookup: &RemoteLookup, policy: &ArchivePolicy) -> ArchiveDecision {
    let archived_now = policy.is_archived_path(path);
    match lookup {
        RemoteLookup::NotFound => ArchiveDecision::Orphan {
            move_to: (!archived_now).then(|| policy.archived_path(path)),
        },
        RemoteLookup::Found(info) => {
            let wants_archive = policy.wants_archive(info);
            if wants_archive && !archived_now {
                ArchiveDecision::Archive {
                    to: policy.archived_path(path),
                }
            } else if !wants_archive && archived_now && policy.auto_unarchive_enabled {
                ArchiveDecision::Unarchive {
                    to: policy.unarchived_path(path),
                }
            } else {
                ArchiveDecision::Refresh
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchivalOutcome {
    pub archived: usize,
    pub unarchived: usize,
    pub orphaned: usize,
    pub refreshed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub stale: usize,
    pub auth_failed: bool,
    pub aborted: bool,
}

impl ArchivalOutcome {
    pub fn transitions(&self) -> usize {
        self.archived + self.unarchived + self.orphaned
    }
}

/// Pick a free destination for an orphaned folder, suffixing the record id
/// when the plain name is taken.
fn orphan_destination(storage: &dyn Storage, preferred: &str, record_id: &str) -> Option<String> {
    if !storage.exists(preferred) {
        return Some(preferred.to_string());
    }
    let suffixed = format!("{preferred} ({record_id})");
    (!storage.exists(&suffixed)).then_some(suffixed)
}

fn ensure_archive_area(storage: &mut dyn Storage, folder: &str) -> Result<()> {
    if storage.is_folder(folder) {
        return Ok(());
    }
    storage
        .create_folder(folder)
        .context(TetherError::ArchiveAreaUnavailable(folder.to_string()))?;
    info!(folder = %folder, "created archive area");
    Ok(())
}

/// Run one archival pass over every cached link. Per-entry failures are
/// counted and skipped; an unusable archive area aborts the whole pass
/// before anything moves; an authentication failure stops the pass but
/// keeps the work already done.
pub fn run_archival_pass(
    api: &RemoteApi,
    cache: &mut CacheStore,
    storage: &mut dyn Storage,
    policy: &ArchivePolicy,
    now_ms: u64,
) -> Result<ArchivalOutcome> {
    let mut outcome = ArchivalOutcome::default();
    if !policy.auto_archive_enabled {
        debug!("auto archive disabled; skipping archival pass");
        return Ok(outcome);
    }

    if let Err(err) = ensure_archive_area(storage, &policy.archive_folder_name) {
        let error = format!("{err:#}");
        error!(folder = %policy.archive_folder_name, %error, "archive area unavailable; aborting archival pass");
        outcome.aborted = true;
        return Ok(outcome);
    }

    let mut dirty = false;
    let paths = cache.entries().keys().cloned().collect::<Vec<_>>();
    for path in paths {
        let Some(entry) = cache.get(&path).cloned() else {
            continue;
        };
        if !storage.exists(&path) {
            info!(path = %path, record_id = %entry.record_id, "dropping stale link before status check");
            cache.remove(&path);
            outcome.stale += 1;
            dirty = true;
            continue;
        }

        let lookup = match api.fetch_status(&entry.record_id) {
            Ok(info) => RemoteLookup::Found(info),
            Err(RemoteError::NotFound(_)) => RemoteLookup::NotFound,
            Err(RemoteError::Unauthorized) => {
                error!(record_id = %entry.record_id, "remote rejected credentials; stopping archival pass");
                outcome.auth_failed = true;
                break;
            }
            Err(err) => {
                warn!(record_id = %entry.record_id, error = %err, "status unavailable; skipping record");
                outcome.skipped += 1;
                continue;
            }
        };

        match decide(&path, &lookup, policy) {
            ArchiveDecision::Orphan { move_to } => {
                if let Some(preferred) = move_to {
                    match orphan_destination(&*storage, &preferred, &entry.record_id) {
                        Some(to) => match storage.rename(&path, &to) {
                            Ok(()) => info!(from = %path, to = %to, "moved orphaned folder into archive"),
                            Err(err) => {
                                let error = format!("{err:#}");
                                warn!(path = %path, %error, "orphaned folder could not be moved");
                                outcome.failed += 1;
                            }
                        },
                        None => {
                            warn!(path = %path, "no free archive destination for orphaned folder");
                            outcome.failed += 1;
                        }
                    }
                }
                info!(path = %path, record_id = %entry.record_id, "record gone remotely; link removed");
                cache.remove(&path);
                outcome.orphaned += 1;
                dirty = true;
            }
            ArchiveDecision::Archive { to } | ArchiveDecision::Unarchive { to } => {
                let archiving = policy.is_archived_path(&to);
                let key = match storage.rename(&path, &to) {
                    Ok(()) => {
                        cache.rekey(&path, &to, now_ms);
                        if archiving {
                            info!(from = %path, to = %to, "archived folder");
                            outcome.archived += 1;
                        } else {
                            info!(from = %path, to = %to, "unarchived folder");
                            outcome.unarchived += 1;
                        }
                        dirty = true;
                        to
                    }
                    Err(err) => {
                        let error = format!("{err:#}");
                        warn!(from = %path, to = %to, %error, "folder move failed");
                        outcome.failed += 1;
                        path
                    }
                };
                if let (RemoteLookup::Found(info), Some(entry)) = (&lookup, cache.get_mut(&key))
                    && entry.refresh_status(&info.status, &info.status_color)
                {
                    dirty = true;
                }
            }
            ArchiveDecision::Refresh => {
                if let (RemoteLookup::Found(info), Some(entry)) = (&lookup, cache.get_mut(&path))
                    && entry.refresh_status(&info.status, &info.status_color)
                {
                    outcome.refreshed += 1;
                    dirty = true;
                }
            }
        }
    }

    if dirty {
        cache.save()?;
    }
    info!(
        transitions = outcome.transitions(),
        archived = outcome.archived,
        unarchived = outcome.unarchived,
        orphaned = outcome.orphaned,
        refreshed = outcome.refreshed,
        skipped = outcome.skipped,
        failed = outcome.failed,
        stale = outcome.stale,
        auth_failed = outcome.auth_failed,
        "archival pass complete"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::transport::HttpMethod;
    use crate::remote::transport::stub::StubTransport;
    use crate::tether::cache::CacheEntry;
    use crate::tether::filter::FilterRule;
    use crate::tether::model::RemoteRecord;
    use crate::tether::reconcile::{LinkOptions, reconcile};
    use crate::tether::storage::MemoryStorage;
    use crate::tether::summary::MarkdownSummary;
    use serde_json::json;
    use tempfile::{TempDir, tempdir};

    fn policy(auto_unarchive: bool) -> ArchivePolicy {
        ArchivePolicy {
            archive_folder_name: "_Archive".to_string(),
            archive_statuses: BTreeSet::from(["Closed".to_string(), "Completed".to_string()]),
            auto_archive_enabled: true,
            auto_unarchive_enabled: auto_unarchive,
        }
    }

    fn found(status: &str, archived: bool) -> RemoteLookup {
        RemoteLookup::Found(RemoteStatusInfo {
            status: status.to_string(),
            status_color: "#000000".to_string(),
            archived,
        })
    }

    fn project(id: &str, status: &str) -> serde_json::Value {
        json!({"id": id, "title": "Acme", "status": status, "status_color": "#00ff00"})
    }

    fn linked_cache(tmp: &TempDir, path: &str, id: &str) -> CacheStore {
        let mut cache = CacheStore::empty(tmp.path().join("link_cache.json"));
        cache.insert(
            path,
            CacheEntry::from_record(&RemoteRecord::new(id, "Acme", "Active", "#00ff00"), 1),
        );
        cache
    }

    fn api(stub: &StubTransport) -> RemoteApi {
        RemoteApi::new(Box::new(stub.clone()))
    }

    #[test]
    fn decisions_follow_status_and_location() {
        let p = policy(false);
        assert_eq!(
            decide("Acme", &found("Closed", false), &p),
            ArchiveDecision::Archive {
                to: "_Archive/Acme".to_string()
            }
        );
        assert_eq!(
            decide("Acme", &found("Active", true), &p),
            ArchiveDecision::Archive {
                to: "_Archive/Acme".to_string()
            }
        );
        assert_eq!(decide("_Archive/Acme", &found("Closed", false), &p), ArchiveDecision::Refresh);
        assert_eq!(decide("_Archive/Acme", &found("Active", false), &p), ArchiveDecision::Refresh);
        assert_eq!(
            decide("_archive/Acme", &found("Active", false), &policy(true)),
            ArchiveDecision::Unarchive {
                to: "Acme".to_string()
            }
        );
        assert_eq!(
            decide("Acme", &RemoteLookup::NotFound, &p),
            ArchiveDecision::Orphan {
                move_to: Some("_Archive/Acme".to_string())
            }
        );
        assert_eq!(
            decide("_Archive/Acme", &RemoteLookup::NotFound, &p),
            ArchiveDecision::Orphan { move_to: None }
        );
    }

    #[test]
    fn archive_status_membership_is_exact() {
        let p = policy(false);
        assert_eq!(decide("Acme", &found("closed", false), &p), ArchiveDecision::Refresh);
        assert_eq!(decide("Acme", &found("COMPLETED", false), &p), ArchiveDecision::Refresh);
        assert_eq!(
            decide("Acme", &found(" Completed ", false), &p),
            ArchiveDecision::Archive {
                to: "_Archive/Acme".to_string()
            }
        );
    }

    #[test]
    fn archive_folder_itself_is_not_an_archived_path() {
        let p = policy(false);
        assert!(!p.is_archived_path("_Archive"));
        assert!(p.is_archived_path("_Archive/Acme"));
        assert!(!p.is_archived_path("Acme/_Archive"));
    }

    #[test]
    fn orphaned_record_is_archived_and_unlinked() {
        let tmp = tempdir().expect("tempdir");
        let mut cache = linked_cache(&tmp, "Acme", "42");
        let mut storage = MemoryStorage::with_folders(["Acme"]);
        let stub = StubTransport::new();
        stub.respond(
            HttpMethod::Get,
            "/projects/42",
            Err(RemoteError::NotFound("/projects/42".to_string())),
        );

        let outcome =
            run_archival_pass(&api(&stub), &mut cache, &mut storage, &policy(false), 5).expect("pass");

        assert_eq!(outcome.orphaned, 1);
        assert!(storage.is_folder("_Archive/Acme"));
        assert!(!storage.exists("Acme"));
        assert!(cache.is_empty());
        assert!(CacheStore::load(cache.file()).is_empty());

        // Should the id ever come back, the next pass treats it as unlinked.
        let record = RemoteRecord::new("42", "Acme", "Active", "");
        let opts = LinkOptions {
            summary_file_name: "_summary.md".to_string(),
            archive_folder_name: "_Archive".to_string(),
        };
        let stats = reconcile(
            &[record],
            &mut cache,
            &mut storage,
            &MarkdownSummary,
            &FilterRule::allow_all(),
            &opts,
        )
        .expect("reconcile");
        assert_eq!(stats.already_linked, 0);
        assert_eq!(stats.created, 1);
    }

    #[test]
    fn orphan_destination_collision_gets_id_suffix() {
        let tmp = tempdir().expect("tempdir");
        let mut cache = linked_cache(&tmp, "Acme", "42");
        let mut storage = MemoryStorage::with_folders(["Acme", "_Archive/Acme"]);
        let stub = StubTransport::new();
        stub.respond(
            HttpMethod::Get,
            "/projects/42",
            Err(RemoteError::NotFound("/projects/42".to_string())),
        );

        run_archival_pass(&api(&stub), &mut cache, &mut storage, &policy(false), 5).expect("pass");

        assert!(storage.is_folder("_Archive/Acme (42)"));
        assert!(cache.is_empty());
    }

    #[test]
    fn archive_round_trip_preserves_record_id() {
        let tmp = tempdir().expect("tempdir");
        let mut cache = linked_cache(&tmp, "Acme", "42");
        let mut storage = MemoryStorage::with_folders(["Acme"]);
        storage.create("Acme/notes.md", "keep me").expect("notes");
        let stub = StubTransport::new();
        let p = policy(true);

        stub.respond(HttpMethod::Get, "/projects/42", Ok(project("42", "Closed")));
        let outcome = run_archival_pass(&api(&stub), &mut cache, &mut storage, &p, 10).expect("archive");
        assert_eq!(outcome.archived, 1);
        assert_eq!(cache.path_for_record("42"), Some("_Archive/Acme"));
        let entry = cache.get("_Archive/Acme").expect("entry");
        assert_eq!(entry.cached_at, 10);
        assert_eq!(entry.record_status.as_deref(), Some("Closed"));
        assert_eq!(storage.read("_Archive/Acme/notes.md").expect("notes"), "keep me");

        stub.respond(HttpMethod::Get, "/projects/42", Ok(project("42", "Active")));
        let outcome = run_archival_pass(&api(&stub), &mut cache, &mut storage, &p, 20).expect("unarchive");
        assert_eq!(outcome.unarchived, 1);
        assert_eq!(cache.path_for_record("42"), Some("Acme"));
        assert_eq!(cache.get("Acme").map(|e| e.cached_at), Some(20));
        assert!(storage.is_folder("Acme"));
    }

    #[test]
    fn archived_folder_stays_put_without_auto_unarchive() {
        let tmp = tempdir().expect("tempdir");
        let mut cache = linked_cache(&tmp, "_Archive/Acme", "42");
        let mut storage = MemoryStorage::with_folders(["_Archive/Acme"]);
        let stub = StubTransport::new();
        stub.respond(HttpMethod::Get, "/projects/42", Ok(project("42", "Active")));

        let outcome =
            run_archival_pass(&api(&stub), &mut cache, &mut storage, &policy(false), 5).expect("pass");

        assert_eq!(outcome.transitions(), 0);
        assert!(storage.is_folder("_Archive/Acme"));
        assert_eq!(cache.path_for_record("42"), Some("_Archive/Acme"));
    }

    #[test]
    fn unusable_archive_area_aborts_with_no_transitions() {
        let tmp = tempdir().expect("tempdir");
        let mut cache = linked_cache(&tmp, "Acme", "42");
        let mut storage = MemoryStorage::with_folders(["Acme"]);
        storage.create("_Archive", "not a folder").expect("blocker");
        let stub = StubTransport::new();
        stub.respond(HttpMethod::Get, "/projects/42", Ok(project("42", "Closed")));

        let outcome =
            run_archival_pass(&api(&stub), &mut cache, &mut storage, &policy(false), 5).expect("pass");

        assert!(outcome.aborted);
        assert_eq!(outcome.transitions(), 0);
        assert!(storage.is_folder("Acme"));
        assert!(stub.calls().is_empty());
    }

    #[test]
    fn unauthorized_stops_pass_but_keeps_completed_work() {
        let tmp = tempdir().expect("tempdir");
        let mut cache = linked_cache(&tmp, "Acme", "1");
        cache.insert(
            "Globex",
            CacheEntry::from_record(&RemoteRecord::new("2", "Globex", "Active", ""), 1),
        );
        let mut storage = MemoryStorage::with_folders(["Acme", "Globex"]);
        let stub = StubTransport::new();
        stub.respond(HttpMethod::Get, "/projects/1", Ok(project("1", "Closed")));
        stub.respond(HttpMethod::Get, "/projects/2", Err(RemoteError::Unauthorized));

        let outcome =
            run_archival_pass(&api(&stub), &mut cache, &mut storage, &policy(false), 5).expect("pass");

        assert!(outcome.auth_failed);
        assert_eq!(outcome.archived, 1);
        let reloaded = CacheStore::load(cache.file());
        assert_eq!(reloaded.path_for_record("1"), Some("_Archive/Acme"));
        assert_eq!(reloaded.path_for_record("2"), Some("Globex"));
    }

    #[test]
    fn transient_failures_skip_only_that_record() {
        let tmp = tempdir().expect("tempdir");
        let mut cache = linked_cache(&tmp, "Acme", "1");
        cache.insert(
            "Globex",
            CacheEntry::from_record(&RemoteRecord::new("2", "Globex", "Active", ""), 1),
        );
        let mut storage = MemoryStorage::with_folders(["Acme", "Globex"]);
        let stub = StubTransport::new();
        stub.respond(
            HttpMethod::Get,
            "/projects/1",
            Err(RemoteError::Status {
                status: 503,
                message: "busy".to_string(),
            }),
        );
        stub.respond(HttpMethod::Get, "/projects/2", Ok(project("2", "Completed")));

        let outcome =
            run_archival_pass(&api(&stub), &mut cache, &mut storage, &policy(false), 5).expect("pass");

        assert_eq!(outcome.skipped, 1);
        assert_eq!(outcome.archived, 1);
        assert_eq!(cache.path_for_record("1"), Some("Acme"));
        assert!(storage.is_folder("_Archive/Globex"));
    }

    #[test]
    fn blocked_move_still_refreshes_status() {
        let tmp = tempdir().expect("tempdir");
        let mut cache = linked_cache(&tmp, "Acme", "42");
        let mut storage = MemoryStorage::with_folders(["Acme", "_Archive/Acme"]);
        let stub = StubTransport::new();
        stub.respond(HttpMethod::Get, "/projects/42", Ok(project("42", "Closed")));

        let outcome =
            run_archival_pass(&api(&stub), &mut cache, &mut storage, &policy(false), 5).expect("pass");

        assert_eq!(outcome.failed, 1);
        let entry = cache.get("Acme").expect("entry stays at old path");
        assert_eq!(entry.record_status.as_deref(), Some("Closed"));
    }

    #[test]
    fn stale_links_are_dropped_without_fetching() {
        let tmp = tempdir().expect("tempdir");
        let mut cache = linked_cache(&tmp, "Acme", "42");
        let mut storage = MemoryStorage::new();
        let stub = StubTransport::new();

        let outcome =
            run_archival_pass(&api(&stub), &mut cache, &mut storage, &policy(false), 5).expect("pass");

        assert_eq!(outcome.stale, 1);
        assert!(cache.is_empty());
        assert_eq!(stub.call_count(HttpMethod::Get, "/projects/42"), 0);
    }

    #[test]
    fn disabled_policy_does_nothing() {
        let tmp = tempdir().expect("tempdir");
        let mut cache = linked_cache(&tmp, "Acme", "42");
        let mut storage = MemoryStorage::with_folders(["Acme"]);
        let stub = StubTransport::new();
        let mut p = policy(false);
        p.auto_archive_enabled = false;

        let outcome = run_archival_pass(&api(&stub), &mut cache, &mut storage, &p, 5).expect("pass");

        assert_eq!(outcome, ArchivalOutcome::default());
        assert!(!storage.exists("_Archive"));
        assert!(stub.calls().is_empty());
    }
}
