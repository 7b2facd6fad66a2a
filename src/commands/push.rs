use anyhow::{Context, Result};
use chrono::Utc;
use std::env;
use std::path::{Path, PathBuf};

use crate::commands::{CommandReport, load_context, remote_issue};
use crate::error::{RemoteError, TetherError, TetherErrorCode};
use crate::remote;
use crate::tether::conflict::{PushOutcome, push_document};
use crate::tether::storage::FsStorage;

fn split_target(file: &Path) -> Result<(PathBuf, String)> {
    let absolute = if file.is_absolute() {
        file.to_path_buf()
    } else {
        env::current_dir()
            .context("failed to resolve current directory")?
            .join(file)
    };
    let name = absolute
        .file_name()
        .and_then(|n| n.to_str())
        .map(ToOwned::to_owned)
        .with_context(|| format!("not a file path: {}", file.display()))?;
    let parent = absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    Ok((parent, name))
}

pub fn run(file: &Path) -> Result<CommandReport> {
    let (_paths, cfg) = load_context()?;
    let mut report = CommandReport::new("push");
    report.detail(format!("file={}", file.display()));

    if !file.is_file() {
        report.issue(format!("no such file: {}", file.display()));
        return Ok(report);
    }

    let (dir, name) = split_target(file)?;
    let mut storage = FsStorage::new(dir);
    let api = remote::connect(&cfg)?;

    match push_document(&api, &mut storage, &name, Utc::now()) {
        Ok(PushOutcome::Pushed {
            document_id,
            synced_at,
        }) => {
            report.detail(format!("document_id={document_id}"));
            report.detail(format!("synced_at={}", synced_at.to_rfc3339()));
        }
        Ok(PushOutcome::Conflict {
            document_id,
            local_synced_at,
        }) => {
            let conflict = TetherError::Conflict {
                document_id,
                synced_at: local_synced_at.to_rfc3339(),
            };
            report.issue(
                TetherErrorCode::E003SyncConflict
                    .tag(format!("{conflict}; pull remote changes before pushing")),
            );
        }
        Err(err) => match err.downcast_ref::<RemoteError>() {
            Some(remote_err) => remote_issue(&mut report, "push failed", remote_err),
            None => return Err(err),
        },
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_targets_resolve_against_cwd() {
        let (dir, name) = split_target(Path::new("notes/today.md")).expect("split");
        assert!(dir.is_absolute());
        assert!(dir.ends_with("notes"));
        assert_eq!(name, "today.md");
    }
}
