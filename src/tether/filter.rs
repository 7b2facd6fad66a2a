use crate::tether::model::RemoteRecord;
use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};
use std::collections::BTreeSet;

const STATUS_TOKEN: &str = "{status}";

/// Eligibility rules applied to every remote record before linking.
#[derive(Debug, Clone, Default)]
pub struct FilterRule {
    allowlist_enabled: bool,
    allowlist: BTreeSet<String>,
    patterns: Vec<String>,
}

impl FilterRule {
    /// Build a rule. Blank patterns are dropped; every remaining pattern is
    /// test-compiled so misconfiguration surfaces at load time.
    pub fn new(
        allowlist_enabled: bool,
        allowlist: impl IntoIterator<Item = String>,
        patterns: &[String],
    ) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>();
        for pattern in &patterns {
            compile_pattern(pattern, "")
                .with_context(|| format!("invalid ignore pattern `{pattern}`"))?;
        }
        Ok(Self {
            allowlist_enabled,
            allowlist: allowlist
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            patterns,
        })
    }

    #[cfg(test)]
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn allowlist_enabled(&self) -> bool {
        self.allowlist_enabled
    }

    fn status_allowed(&self, status: &str) -> bool {
        !self.allowlist_enabled || self.allowlist.contains(status)
    }

    /// The first configured pattern that matches the record's title.
    pub fn matching_pattern(&self, record: &RemoteRecord) -> Option<&str> {
        let status = record.effective_status();
        self.patterns
            .iter()
            .find(|pattern| {
                compile_pattern(pattern, status)
                    .map(|re| re.is_match(&record.title))
                    .unwrap_or(false)
            })
            .map(String::as_str)
    }

    /// Both gates must pass: the status allow-list (when enabled) and no
    /// ignore pattern matching the title.
    pub fn should_include(&self, record: &RemoteRecord) -> bool {
        if !self.status_allowed(record.effective_status()) {
            return false;
        }
        self.matching_pattern(record).is_none()
    }
}

/// Replace every `{status}` token, ignoring case.
fn substitute_status(pattern: &str, status: &str) -> String {
    let lower = pattern.to_ascii_lowercase();
    let mut out = String::with_capacity(pattern.len() + status.len());
    let mut cursor = 0usize;
    while let Some(found) = lower[cursor..].find(STATUS_TOKEN) {
        let start = cursor + found;
        out.push_str(&pattern[cursor..start]);
        out.push_str(status);
        cursor = start + STATUS_TOKEN.len();
    }
    out.push_str(&pattern[cursor..]);
    out
}

/// Substitute `{status}`, then turn the glob (`*`, `?`) into an anchored,
/// case-insensitive regex with every other character taken literally.
fn compile_pattern(pattern: &str, status: &str) -> Result<Regex> {
    let substituted = substitute_status(pattern, status);
    let mut source = String::with_capacity(substituted.len() + 2);
    source.push('^');
    for ch in substituted.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => {
                let mut buf = [0u8; 4];
                source.push_str(&regex::escape(other.encode_utf8(&mut buf)));
            }
        }
    }
    source.push('$');
    RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .context("glob did not compile")
}
