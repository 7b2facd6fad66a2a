use crate::remote::RemoteApi;
use crate::tether::document::SyncedDocument;
use crate::tether::storage::Storage;
use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// True iff the remote document was modified after `local_synced_at`.
/// Transport failures are treated as "no conflict" and logged.
pub fn has_conflict(api: &RemoteApi, document_id: &str, local_synced_at: DateTime<Utc>) -> bool {
    match api.document_modified_at(document_id) {
        Ok(remote_modified_at) => {
            debug!(
                document_id,
                remote = %remote_modified_at,
                local = %local_synced_at,
                "conflict check"
            );
            remote_modified_at > local_synced_at
        }
        Err(err) => {
            warn!(document_id, error = %err, "conflict check failed; assuming no conflict");
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed {
        document_id: String,
        synced_at: DateTime<Utc>,
    },
    /// Remote changed after the last sync; neither side was touched.
    Conflict {
        document_id: String,
        local_synced_at: DateTime<Utc>,
    },
}

/// Overwrite the remote copy of a locally synced document, guarded by the
/// conflict check. On success the local `tether_synced_at` is advanced to
/// the remote's new modification time, or `now` when none is reported.
pub fn push_document(
    api: &RemoteApi,
    storage: &mut dyn Storage,
    path: &str,
    now: DateTime<Utc>,
) -> Result<PushOutcome> {
    let raw = storage.read(path)?;
    let mut doc = SyncedDocument::parse(&raw)
        .with_context(|| format!("failed to read front matter of {path}"))?;
    let document_id = doc
        .document_id()
        .ok_or_else(|| anyhow!("{path} has no tether_document_id front matter"))?;

    match doc.synced_at()? {
        Some(local_synced_at) if has_conflict(api, &document_id, local_synced_at) => {
            warn!(document_id = %document_id, path, "remote changed since last sync; push blocked");
            return Ok(PushOutcome::Conflict {
                document_id,
                local_synced_at,
            });
        }
        Some(_) => {}
        None => debug!(document_id = %document_id, "document never synced; pushing without check"),
    }

    let reported = api
        .update_document(&document_id, doc.body())
        .with_context(|| format!("failed to push {path}"))?;
    let synced_at = reported.unwrap_or(now);
    doc.set_synced_at(synced_at);
    storage
        .modify(path, &doc.render())
        .with_context(|| format!("pushed {path} but could not record the sync time"))?;
    info!(document_id = %document_id, path, synced_at = %synced_at, "pushed document");
    Ok(PushOutcome::Pushed {
        document_id,
        synced_at,
    })
}
