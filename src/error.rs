use thiserror::Error;

/// Failures surfaced by the remote transport, already classified by meaning.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote entity not found: {0}")]
    NotFound(String),
    #[error("remote authentication failed; check the configured API token")]
    Unauthorized,
    #[error("remote request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("remote transport failure: {0}")]
    Transport(String),
    #[error("unexpected remote payload: {0}")]
    Payload(String),
}

impl RemoteError {
    pub fn from_status(status: u16, path: &str, message: impl Into<String>) -> Self {
        match status {
            404 => Self::NotFound(path.to_string()),
            401 => Self::Unauthorized,
            _ => Self::Status {
                status,
                message: message.into(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

#[derive(Debug, Error)]
pub enum TetherError {
    #[error("another reconciliation pass is already in progress (lock {0})")]
    PassInProgress(String),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("remote base url is not configured; set TETHER_API_BASE_URL or [remote].base_url")]
    MissingBaseUrl,
    #[error("archive area `{0}` could not be created")]
    ArchiveAreaUnavailable(String),
    #[error("remote document {document_id} changed after the last sync at {synced_at}")]
    Conflict {
        document_id: String,
        synced_at: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TetherErrorCode {
    E001PassInProgress,
    E002AuthFailed,
    E003SyncConflict,
    E004ArchiveArea,
    E005ConfigInvalid,
    E006RemoteUnavailable,
}

impl TetherErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001PassInProgress => "E001_PASS_IN_PROGRESS",
            Self::E002AuthFailed => "E002_AUTH_FAILED",
            Self::E003SyncConflict => "E003_SYNC_CONFLICT",
            Self::E004ArchiveArea => "E004_ARCHIVE_AREA",
            Self::E005ConfigInvalid => "E005_CONFIG_INVALID",
            Self::E006RemoteUnavailable => "E006_REMOTE_UNAVAILABLE",
        }
    }

    pub fn tag(self, message: impl AsRef<str>) -> String {
        format!("{} {}", self.as_str(), message.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_meaningful_variants() {
        assert_eq!(
            RemoteError::from_status(404, "/projects/42", "gone"),
            RemoteError::NotFound("/projects/42".to_string())
        );
        assert!(RemoteError::from_status(401, "/projects", "nope").is_unauthorized());
        assert_eq!(
            RemoteError::from_status(503, "/projects", "busy"),
            RemoteError::Status {
                status: 503,
                message: "busy".to_string()
            }
        );
    }

    #[test]
    fn error_codes_prefix_messages() {
        assert_eq!(
            TetherErrorCode::E003SyncConflict.tag("doc changed"),
            "E003_SYNC_CONFLICT doc changed"
        );
    }
}
