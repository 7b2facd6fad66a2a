use crate::tether::paths::TetherPaths;
use crate::tether::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Ok,
    Degraded,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub phase: String,
    pub status: AuditStatus,
    pub message: String,
}

/// Append one JSON line to `<logs>/audit.log`.
pub fn append_event(
    paths: &TetherPaths,
    phase: &str,
    status: AuditStatus,
    message: &str,
) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        phase: phase.to_string(),
        status,
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = paths.logs_dir.join("audit.log");
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Audit writes never fail a pass; problems only reach the log.
pub fn record(paths: &TetherPaths, phase: &str, status: AuditStatus, message: &str) {
    if let Err(err) = append_event(paths, phase, status, message) {
        let error = format!("{err:#}");
        tracing::warn!(phase, %error, "audit append failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn events_are_appended_as_json_lines() {
        let tmp = tempdir().expect("tempdir");
        let paths = TetherPaths::under(tmp.path());

        append_event(&paths, "reconcile", AuditStatus::Ok, "created=1").expect("append");
        append_event(&paths, "archival", AuditStatus::Degraded, "auth failed").expect("append");

        let raw = fs::read_to_string(paths.logs_dir.join("audit.log")).expect("read");
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(second["phase"], "archival");
        assert_eq!(second["status"], "degraded");
    }
}
