use crate::error::TetherError;
use crate::tether::archival::ArchivePolicy;
use crate::tether::filter::FilterRule;
use crate::tether::paths::TetherPaths;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: Option<String>,
    /// Name of the environment variable holding the bearer token.
    pub token_env: String,
    pub min_request_interval_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token_env: "TETHER_API_TOKEN".to_string(),
            min_request_interval_ms: 350,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FilterConfig {
    pub status_allowlist_enabled: bool,
    pub status_allowlist: Vec<String>,
    pub ignore_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub folder_name: String,
    pub statuses: Vec<String>,
    pub auto_archive: bool,
    pub auto_unarchive: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            folder_name: "_Archive".to_string(),
            statuses: vec![
                "Closed".to_string(),
                "Completed".to_string(),
                "Cancelled".to_string(),
            ],
            auto_archive: true,
            auto_unarchive: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub summary_file_name: String,
    pub archive_after_sync: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            summary_file_name: "_summary.md".to_string(),
            archive_after_sync: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub poll_interval_secs: u64,
    pub startup_delay_secs: u64,
    pub debounce_ms: u64,
    pub tick_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 900,
            startup_delay_secs: 5,
            debounce_ms: 1500,
            tick_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TetherConfig {
    pub remote: RemoteConfig,
    pub filter: FilterConfig,
    pub archive: ArchiveConfig,
    pub sync: SyncConfig,
    pub watcher: WatcherConfig,
}

impl TetherConfig {
    pub fn filter_rule(&self) -> Result<FilterRule> {
        FilterRule::new(
            self.filter.status_allowlist_enabled,
            self.filter.status_allowlist.iter().cloned(),
            &self.filter.ignore_patterns,
        )
    }

    pub fn archive_policy(&self) -> ArchivePolicy {
        ArchivePolicy {
            archive_folder_name: self.archive.folder_name.trim().to_string(),
            archive_statuses: self
                .archive
                .statuses
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<BTreeSet<_>>(),
            auto_archive_enabled: self.archive.auto_archive,
            auto_unarchive_enabled: self.archive.auto_unarchive,
        }
    }

    pub fn api_token(&self) -> Option<String> {
        match env::var(&self.remote.token_env) {
            Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialTetherConfig {
    remote: Option<RemoteConfig>,
    filter: Option<FilterConfig>,
    archive: Option<ArchiveConfig>,
    sync: Option<SyncConfig>,
    watcher: Option<WatcherConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_csv(var: &str, fallback: &[String]) -> Vec<String> {
    match env::var(var) {
        Ok(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        Err(_) => fallback.to_vec(),
    }
}

fn validate(cfg: &TetherConfig) -> Result<()> {
    if cfg.watcher.poll_interval_secs == 0 {
        return Err(anyhow!(
            "invalid watcher poll interval: must be >= 1 second"
        ));
    }
    if cfg.watcher.tick_ms == 0 {
        return Err(anyhow!("invalid watcher tick: must be >= 1 ms"));
    }
    let folder = cfg.archive.folder_name.trim();
    if folder.is_empty() {
        return Err(anyhow!("invalid archive folder name: cannot be empty"));
    }
    if folder.contains('/') || folder.contains('\\') || folder == "." || folder == ".." {
        return Err(anyhow!(
            "invalid archive folder name `{folder}`: must be a single folder name"
        ));
    }
    if cfg.sync.summary_file_name.trim().is_empty() {
        return Err(anyhow!("invalid summary file name: cannot be empty"));
    }
    if cfg.remote.token_env.trim().is_empty() {
        return Err(anyhow!("invalid remote token_env: cannot be empty"));
    }
    cfg.filter_rule()?;
    Ok(())
}

pub fn resolve_config_path(paths: &TetherPaths) -> PathBuf {
    if let Ok(custom) = env::var("TETHER_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    paths.config_file()
}

fn merge_file_config(base: &mut TetherConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: PartialTetherConfig = toml::from_str(&raw).map_err(|err| {
        TetherError::InvalidConfig(format!("failed to parse {}: {err}", path.display()))
    })?;
    if let Some(remote) = parsed.remote {
        base.remote = remote;
    }
    if let Some(filter) = parsed.filter {
        base.filter = filter;
    }
    if let Some(archive) = parsed.archive {
        base.archive = archive;
    }
    if let Some(sync) = parsed.sync {
        base.sync = sync;
    }
    if let Some(watcher) = parsed.watcher {
        base.watcher = watcher;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut TetherConfig) {
    if let Ok(v) = env::var("TETHER_API_BASE_URL")
        && !v.trim().is_empty()
    {
        cfg.remote.base_url = Some(v.trim().to_string());
    }
    cfg.remote.min_request_interval_ms = env_or_u64(
        "TETHER_MIN_REQUEST_INTERVAL_MS",
        cfg.remote.min_request_interval_ms,
    );
    cfg.remote.timeout_secs = env_or_u64("TETHER_REQUEST_TIMEOUT_SECS", cfg.remote.timeout_secs);

    cfg.filter.status_allowlist_enabled = env_or_bool(
        "TETHER_STATUS_ALLOWLIST_ENABLED",
        cfg.filter.status_allowlist_enabled,
    );
    cfg.filter.status_allowlist =
        env_or_csv("TETHER_STATUS_ALLOWLIST", &cfg.filter.status_allowlist);
    cfg.filter.ignore_patterns = env_or_csv("TETHER_IGNORE_PATTERNS", &cfg.filter.ignore_patterns);

    cfg.archive.folder_name = env_or_string("TETHER_ARCHIVE_FOLDER", &cfg.archive.folder_name);
    cfg.archive.statuses = env_or_csv("TETHER_ARCHIVE_STATUSES", &cfg.archive.statuses);
    cfg.archive.auto_archive = env_or_bool("TETHER_AUTO_ARCHIVE", cfg.archive.auto_archive);
    cfg.archive.auto_unarchive = env_or_bool("TETHER_AUTO_UNARCHIVE", cfg.archive.auto_unarchive);

    cfg.watcher.poll_interval_secs =
        env_or_u64("TETHER_POLL_INTERVAL_SECS", cfg.watcher.poll_interval_secs);
    cfg.watcher.startup_delay_secs =
        env_or_u64("TETHER_STARTUP_DELAY_SECS", cfg.watcher.startup_delay_secs);
    cfg.watcher.debounce_ms = env_or_u64("TETHER_DEBOUNCE_MS", cfg.watcher.debounce_ms);
}

pub fn load_config(paths: &TetherPaths) -> Result<TetherConfig> {
    let mut cfg = TetherConfig::default();
    merge_file_config(&mut cfg, &resolve_config_path(paths))?;
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}
