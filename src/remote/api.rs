//! Typed access to the remote workspace service.
//!
//! Every JSON document the service returns is decoded here into
//! [`RemoteRecord`], [`RemoteStatusInfo`] or a timestamp. Nothing downstream
//! looks at raw payload fields.

use crate::error::RemoteError;
use crate::remote::transport::{HttpMethod, Transport};
use crate::tether::model::{RemoteRecord, RemoteStatusInfo};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text.trim().to_string(),
            Self::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawStatus {
    Name(String),
    Detailed {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        color: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawProject {
    id: RawId,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<RawStatus>,
    #[serde(default, alias = "statusColor")]
    status_color: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    archived: Option<bool>,
}

impl RawProject {
    fn into_parts(self) -> Result<(RemoteRecord, bool), RemoteError> {
        let id = self.id.into_string();
        if id.is_empty() {
            return Err(RemoteError::Payload("project without an id".to_string()));
        }
        let title = self.title.or(self.name).unwrap_or_default();
        let (status, nested_color) = match self.status {
            Some(RawStatus::Name(name)) => (name, None),
            Some(RawStatus::Detailed { name, color }) => (name.unwrap_or_default(), color),
            None => (String::new(), None),
        };
        let status_color = self
            .status_color
            .or(nested_color)
            .or(self.color)
            .unwrap_or_default();
        let record = RemoteRecord::new(id, title, status, status_color);
        Ok((record, self.archived.unwrap_or(false)))
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default, alias = "updatedAt")]
    updated_at: Option<String>,
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RemoteError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| RemoteError::Payload(format!("bad timestamp `{raw}`: {err}")))
}

fn project_items(payload: Value) -> Result<Vec<Value>, RemoteError> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => ["projects", "data", "results"]
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| RemoteError::Payload("project list has no array".to_string())),
        other => Err(RemoteError::Payload(format!(
            "project list is not an array: {other}"
        ))),
    }
}

fn parse_project(value: Value) -> Result<(RemoteRecord, bool), RemoteError> {
    let raw: RawProject = serde_json::from_value(value)
        .map_err(|err| RemoteError::Payload(format!("malformed project: {err}")))?;
    raw.into_parts()
}

pub struct RemoteApi {
    transport: Box<dyn Transport>,
}

impl RemoteApi {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self { transport }
    }

    /// All projects visible to the token. Malformed items are skipped.
    pub fn list_records(&self) -> Result<Vec<RemoteRecord>, RemoteError> {
        let payload = self.transport.request(HttpMethod::Get, "/projects", None)?;
        let mut records = Vec::new();
        for item in project_items(payload)? {
            match parse_project(item) {
                Ok((record, _)) => records.push(record),
                Err(err) => warn!(error = %err, "skipping remote project"),
            }
        }
        Ok(records)
    }

    pub fn fetch_record(&self, record_id: &str) -> Result<RemoteRecord, RemoteError> {
        let path = format!("/projects/{record_id}");
        let payload = self.transport.request(HttpMethod::Get, &path, None)?;
        parse_project(payload).map(|(record, _)| record)
    }

    pub fn fetch_status(&self, record_id: &str) -> Result<RemoteStatusInfo, RemoteError> {
        let path = format!("/projects/{record_id}");
        let payload = self.transport.request(HttpMethod::Get, &path, None)?;
        let (record, archived) = parse_project(payload)?;
        Ok(RemoteStatusInfo {
            archived,
            ..RemoteStatusInfo::from(&record)
        })
    }

    /// Last-modified time of a remote content document.
    pub fn document_modified_at(&self, document_id: &str) -> Result<DateTime<Utc>, RemoteError> {
        let path = format!("/documents/{document_id}");
        let payload = self.transport.request(HttpMethod::Get, &path, None)?;
        let raw: RawDocument = serde_json::from_value(payload)
            .map_err(|err| RemoteError::Payload(format!("malformed document: {err}")))?;
        let updated_at = raw
            .updated_at
            .ok_or_else(|| RemoteError::Payload(format!("{path}: missing updated_at")))?;
        parse_timestamp(&updated_at)
    }

    /// Replace a document's content. Returns the new modification time when
    /// the service reports one.
    pub fn update_document(
        &self,
        document_id: &str,
        content: &str,
    ) -> Result<Option<DateTime<Utc>>, RemoteError> {
        let path = format!("/documents/{document_id}");
        let body = json!({ "content": content });
        let payload = self
            .transport
            .request(HttpMethod::Patch, &path, Some(&body))?;
        if payload.is_null() {
            return Ok(None);
        }
        let raw: RawDocument = serde_json::from_value(payload).unwrap_or(RawDocument { updated_at: None });
        match raw.updated_at {
            Some(ts) => parse_timestamp(&ts).map(Some),
            None => Ok(None),
        }
    }
}
