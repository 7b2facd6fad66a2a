use anyhow::{Context, Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_yaml::{Mapping, Value};

pub const DOCUMENT_ID_KEY: &str = "tether_document_id";
pub const SYNCED_AT_KEY: &str = "tether_synced_at";

const FENCE: &str = "---";

/// A local document that mirrors remote content. Sync metadata lives in a
/// YAML front matter block. The block's lines are kept as written so that
/// rewriting the sync time leaves unrelated keys untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncedDocument {
    front_matter: Vec<String>,
    metadata: Mapping,
    body: String,
}

fn parse_metadata(block: &str) -> Result<Mapping> {
    if block.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(block).context("front matter is not valid YAML")? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => bail!("front matter must be a YAML mapping"),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn is_key_line(line: &str, key: &str) -> bool {
    !line.starts_with([' ', '\t'])
        && line
            .split_once(':')
            .map(|(k, _)| k.trim().trim_matches(['\'', '"']) == key)
            .unwrap_or(false)
}

impl SyncedDocument {
    /// Split off a leading `---` fenced block. Text without a complete block
    /// is all body; a block that is not a YAML mapping is an error.
    pub fn parse(raw: &str) -> Result<Self> {
        let plain = || Self {
            front_matter: Vec::new(),
            metadata: Mapping::new(),
            body: raw.to_string(),
        };
        let Some(rest) = raw
            .strip_prefix("---\n")
            .or_else(|| raw.strip_prefix("---\r\n"))
        else {
            return Ok(plain());
        };

        let mut offset = 0usize;
        let mut front_matter = Vec::new();
        for line in rest.split_inclusive('\n') {
            offset += line.len();
            if line.trim_end() == FENCE {
                let metadata = parse_metadata(&front_matter.join("\n"))?;
                return Ok(Self {
                    front_matter,
                    metadata,
                    body: rest[offset..].to_string(),
                });
            }
            front_matter.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        Ok(plain())
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Scalar front matter value as text. Mappings and sequences yield `None`.
    fn field(&self, key: &str) -> Option<String> {
        self.metadata.get(key).and_then(scalar_text)
    }

    fn set_field(&mut self, key: &str, value: &str) {
        let rendered = format!("{key}: {value}");
        match self
            .front_matter
            .iter_mut()
            .find(|line| is_key_line(line, key))
        {
            Some(line) => *line = rendered,
            None => self.front_matter.push(rendered),
        }
        self.metadata
            .insert(Value::String(key.to_string()), Value::String(value.to_string()));
    }

    pub fn document_id(&self) -> Option<String> {
        self.field(DOCUMENT_ID_KEY)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    /// `None` when the document has never been synced.
    pub fn synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(raw) = self.field(SYNCED_AT_KEY).filter(|v| !v.trim().is_empty()) else {
            return Ok(None);
        };
        let parsed = DateTime::parse_from_rfc3339(raw.trim())
            .with_context(|| format!("invalid {SYNCED_AT_KEY} `{raw}`"))?;
        Ok(Some(parsed.with_timezone(&Utc)))
    }

    pub fn set_synced_at(&mut self, at: DateTime<Utc>) {
        self.set_field(SYNCED_AT_KEY, &at.to_rfc3339_opts(SecondsFormat::AutoSi, true));
    }

    pub fn render(&self) -> String {
        if self.front_matter.is_empty() {
            return self.body.clone();
        }
        let mut out = String::new();
        out.push_str(FENCE);
        out.push('\n');
        for line in &self.front_matter {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(FENCE);
        out.push('\n');
        out.push_str(&self.body);
        out
    }
}
