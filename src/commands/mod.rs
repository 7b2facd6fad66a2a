pub mod archive;
pub mod link;
pub mod prune;
pub mod push;
pub mod status;
pub mod stop;
pub mod sync;
pub mod watch;

use crate::error::{RemoteError, TetherError, TetherErrorCode};
use crate::tether::config::{TetherConfig, load_config};
use crate::tether::paths::{TetherPaths, resolve_paths};
use anyhow::{Result, anyhow};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// Resolve paths and load configuration, tagging config failures.
pub fn load_context() -> Result<(TetherPaths, TetherConfig)> {
    let paths = resolve_paths()?;
    let cfg = load_config(&paths)
        .map_err(|err| anyhow!(TetherErrorCode::E005ConfigInvalid.tag(format!("{err:#}"))))?;
    Ok((paths, cfg))
}

/// Report a remote failure with the code a caller can act on.
pub fn remote_issue(report: &mut CommandReport, context: &str, err: &RemoteError) {
    let code = if err.is_unauthorized() {
        TetherErrorCode::E002AuthFailed
    } else {
        TetherErrorCode::E006RemoteUnavailable
    };
    report.issue(code.tag(format!("{context}: {err}")));
}

pub fn pass_busy_issue(report: &mut CommandReport, paths: &TetherPaths) {
    let busy = TetherError::PassInProgress(paths.pass_lock_file().display().to_string());
    report.issue(TetherErrorCode::E001PassInProgress.tag(format!("{busy}; try again shortly")));
}
