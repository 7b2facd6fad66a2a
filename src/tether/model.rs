use serde::{Deserialize, Serialize};

/// Status reported for records that carry none.
pub const DEFAULT_STATUS: &str = "No Status";

/// A remote workspace record. `id` is stable; the rest is refreshed on
/// every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    pub title: String,
    pub status: String,
    pub status_color: String,
}

impl RemoteRecord {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        status: impl Into<String>,
        status_color: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            status: status.into(),
            status_color: status_color.into(),
        }
    }

    /// The status with blanks mapped to [`DEFAULT_STATUS`].
    pub fn effective_status(&self) -> &str {
        let trimmed = self.status.trim();
        if trimmed.is_empty() {
            DEFAULT_STATUS
        } else {
            trimmed
        }
    }
}

/// The slice of a remote record the archival pass needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteStatusInfo {
    pub status: String,
    pub status_color: String,
    /// Explicit archived flag set by the remote system.
    pub archived: bool,
}

impl From<&RemoteRecord> for RemoteStatusInfo {
    fn from(record: &RemoteRecord) -> Self {
        Self {
            status: record.effective_status().to_string(),
            status_color: record.status_color.clone(),
            archived: false,
        }
    }
}
