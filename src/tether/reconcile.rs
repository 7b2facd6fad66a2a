//! Record ↔ folder reconciliation.
//!
//! A pass is split in two. [`plan`] is pure: it takes the remote records,
//! a [`LocalSnapshot`] and the cache, and decides one [`LinkAction`] per
//! record. [`apply`] performs those actions against storage and the cache.
//! [`reconcile`] wraps both with the snapshot capture and the single save at
//! the end of the pass, so a crash mid-pass loses only that pass's links.
//!
//! Each record id ends up linked to at most one folder: the planner seeds a
//! `record_id -> path` index from the cache, drops extra entries for the
//! same id, and claims folder names as it goes so two records never resolve
//! to the same folder within one pass.

use crate::tether::cache::{CacheEntry, CacheStore};
use crate::tether::filter::FilterRule;
use crate::tether::model::RemoteRecord;
use crate::tether::storage::{self, Storage};
use crate::tether::summary::SummaryRenderer;
use crate::tether::util::now_epoch_ms;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

const HOSTILE_CHARS: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Local state observed right before planning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSnapshot {
    /// Folder names directly under the storage root.
    pub folder_names: BTreeSet<String>,
    /// Cache keys whose folders currently exist.
    pub live_paths: BTreeSet<String>,
    /// Names that must never be linked or created (the archive area).
    pub reserved_names: BTreeSet<String>,
}

impl LocalSnapshot {
    pub fn capture(storage: &dyn Storage, cache: &CacheStore, archive_folder: &str) -> Result<Self> {
        let folder_names = storage
            .list_children("")
            .context("failed to list workspace folders")?
            .into_iter()
            .filter(|name| !name.starts_with('.'))
            .filter(|name| !name.eq_ignore_ascii_case(archive_folder))
            .filter(|name| storage.is_folder(name))
            .collect();
        let live_paths = cache
            .entries()
            .keys()
            .filter(|path| storage.exists(path))
            .cloned()
            .collect();
        Ok(Self {
            folder_names,
            live_paths,
            reserved_names: BTreeSet::from([archive_folder.to_string()]),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkAction {
    /// Already linked to an existing folder; refresh the cached status.
    Refresh { path: String, record: RemoteRecord },
    /// Cached link whose folder is gone; dropped before re-linking.
    DropMissing { path: String, record_id: String },
    /// Extra cache entry for a record that already has a canonical link.
    DropDuplicate { path: String, record_id: String },
    /// Link an existing folder that nothing else claims.
    LinkExisting { path: String, record: RemoteRecord },
    /// Create the folder plus its summary document and link it.
    Create { path: String, record: RemoteRecord },
    /// No usable folder name could be derived or claimed.
    Skip { record_id: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub actions: Vec<LinkAction>,
    pub filtered: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub created: usize,
    pub linked: usize,
    pub already_linked: usize,
    pub filtered: usize,
    pub failed: usize,
    pub dropped: usize,
}

/// Knobs the apply step needs beyond the plan itself.
#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub summary_file_name: String,
    pub archive_folder_name: String,
}

/// Derive a folder name from a record title.
pub fn folder_name_for(title: &str) -> String {
    let replaced = title
        .chars()
        .map(|c| {
            if HOSTILE_CHARS.contains(&c) || c.is_control() {
                '-'
            } else {
                c
            }
        })
        .collect::<String>();
    replaced
        .trim_matches(|c: char| c.is_whitespace() || c == '.')
        .to_string()
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}

pub fn plan(
    records: &[RemoteRecord],
    local: &LocalSnapshot,
    cache: &CacheStore,
    filter: &FilterRule,
) -> ReconcilePlan {
    let index = cache.record_index();
    let mut out = ReconcilePlan::default();

    for path in &index.duplicates {
        if let Some(entry) = cache.get(path) {
            out.actions.push(LinkAction::DropDuplicate {
                path: path.clone(),
                record_id: entry.record_id.clone(),
            });
        }
    }

    let mut by_record: BTreeMap<String, String> = index.canonical;
    let mut taken: BTreeSet<String> = by_record.values().map(|p| fold(p)).collect();
    taken.extend(local.reserved_names.iter().map(|n| fold(n)));

    for record in records {
        if !filter.should_include(record) {
            debug!(record_id = %record.id, title = %record.title, "record filtered");
            out.filtered += 1;
            continue;
        }

        if let Some(path) = by_record.get(&record.id).cloned() {
            if local.live_paths.contains(&path) {
                out.actions.push(LinkAction::Refresh {
                    path,
                    record: record.clone(),
                });
                continue;
            }
            by_record.remove(&record.id);
            taken.remove(&fold(&path));
            out.actions.push(LinkAction::DropMissing {
                path,
                record_id: record.id.clone(),
            });
        }

        let base = folder_name_for(&record.title);
        if base.is_empty() {
            out.actions.push(LinkAction::Skip {
                record_id: record.id.clone(),
                reason: "title yields an empty folder name".to_string(),
            });
            continue;
        }

        let candidates = [
            base.clone(),
            folder_name_for(&format!("{} ({})", record.title.trim(), record.id)),
        ];
        let mut decided = None;
        for name in candidates {
            let key = fold(&name);
            if taken.contains(&key) {
                continue;
            }
            let existing = local.folder_names.iter().find(|f| fold(f) == key).cloned();
            taken.insert(key);
            decided = Some(match existing {
                Some(path) => LinkAction::LinkExisting {
                    path,
                    record: record.clone(),
                },
                None => LinkAction::Create {
                    path: name,
                    record: record.clone(),
                },
            });
            break;
        }

        match decided {
            Some(action) => {
                if let LinkAction::LinkExisting { path, .. } | LinkAction::Create { path, .. } =
                    &action
                {
                    by_record.insert(record.id.clone(), path.clone());
                }
                out.actions.push(action);
            }
            None => out.actions.push(LinkAction::Skip {
                record_id: record.id.clone(),
                reason: format!("folder name `{base}` is already linked to another record"),
            }),
        }
    }

    out
}

pub fn apply(
    plan: ReconcilePlan,
    cache: &mut CacheStore,
    storage: &mut dyn Storage,
    renderer: &dyn SummaryRenderer,
    opts: &LinkOptions,
    now_ms: u64,
) -> ReconcileStats {
    let mut stats = ReconcileStats {
        filtered: plan.filtered,
        ..ReconcileStats::default()
    };

    for action in plan.actions {
        match action {
            LinkAction::Refresh { path, record } => {
                if let Some(entry) = cache.get_mut(&path) {
                    entry.refresh_status(record.effective_status(), &record.status_color);
                    if entry.record_title != record.title {
                        entry.record_title = record.title.clone();
                    }
                }
                stats.already_linked += 1;
            }
            LinkAction::DropMissing { path, record_id } => {
                info!(path = %path, record_id = %record_id, "dropping link to missing folder");
                cache.remove(&path);
                stats.dropped += 1;
            }
            LinkAction::DropDuplicate { path, record_id } => {
                warn!(path = %path, record_id = %record_id, "dropping duplicate link for record");
                cache.remove(&path);
                stats.dropped += 1;
            }
            LinkAction::LinkExisting { path, record } => {
                if !storage.is_folder(&path) {
                    warn!(path = %path, record_id = %record.id, "folder vanished before linking");
                    stats.failed += 1;
                    continue;
                }
                info!(path = %path, record_id = %record.id, "linked existing folder");
                cache.insert(path, CacheEntry::from_record(&record, now_ms));
                stats.linked += 1;
            }
            LinkAction::Create { path, record } => {
                if let Err(err) = storage.create_folder(&path) {
                    let error = format!("{err:#}");
                    warn!(path = %path, record_id = %record.id, %error, "folder creation failed; skipping record");
                    stats.failed += 1;
                    continue;
                }
                let summary_path = storage::join(&path, &opts.summary_file_name);
                if let Err(err) = storage.create(&summary_path, &renderer.render_summary(&record)) {
                    let error = format!("{err:#}");
                    warn!(path = %summary_path, %error, "summary document not written");
                }
                info!(path = %path, record_id = %record.id, "created and linked folder");
                cache.insert(path, CacheEntry::from_record(&record, now_ms));
                stats.created += 1;
            }
            LinkAction::Skip { record_id, reason } => {
                warn!(record_id = %record_id, reason = %reason, "record not linked");
                stats.failed += 1;
            }
        }
    }

    stats
}

/// One full pass over pre-fetched remote records. The cache is mutated in
/// place and persisted once at the end.
pub fn reconcile(
    records: &[RemoteRecord],
    cache: &mut CacheStore,
    storage: &mut dyn Storage,
    renderer: &dyn SummaryRenderer,
    filter: &FilterRule,
    opts: &LinkOptions,
) -> Result<ReconcileStats> {
    let local = LocalSnapshot::capture(&*storage, cache, &opts.archive_folder_name)?;
    let planned = plan(records, &local, cache, filter);
    let stats = apply(planned, cache, storage, renderer, opts, now_epoch_ms()?);
    cache.save()?;
    info!(
        created = stats.created,
        linked = stats.linked,
        already_linked = stats.already_linked,
        filtered = stats.filtered,
        failed = stats.failed,
        dropped = stats.dropped,
        "reconciliation pass complete"
    );
    Ok(stats)
}
