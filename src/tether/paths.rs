use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct TetherPaths {
    pub tether_home: PathBuf,
    /// Base directory under which linked folders are created.
    pub workspaces_dir: PathBuf,
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl TetherPaths {
    pub fn under(root: &std::path::Path) -> Self {
        Self {
            tether_home: root.to_path_buf(),
            workspaces_dir: root.join("workspaces"),
            state_dir: root.join("state"),
            logs_dir: root.join("logs"),
        }
    }

    pub fn cache_file(&self) -> PathBuf {
        self.state_dir.join("link_cache.json")
    }

    pub fn pass_lock_file(&self) -> PathBuf {
        self.state_dir.join("pass.lock")
    }

    pub fn daemon_lock_file(&self) -> PathBuf {
        self.logs_dir.join("tether-watch.daemon.lock")
    }

    pub fn config_file(&self) -> PathBuf {
        self.tether_home.join("tether.toml")
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<TetherPaths> {
    let tether_home = match env::var("TETHER_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".tether"),
    };

    let defaults = TetherPaths::under(&tether_home);
    Ok(TetherPaths {
        workspaces_dir: env_or_default_path("TETHER_WORKSPACES_DIR", defaults.workspaces_dir),
        state_dir: env_or_default_path("TETHER_STATE_DIR", defaults.state_dir),
        logs_dir: env_or_default_path("TETHER_LOGS_DIR", defaults.logs_dir),
        tether_home,
    })
}
