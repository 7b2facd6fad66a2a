use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

fn open_lock_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open lock {}", path.display()))
}

fn try_exclusive(file: &File, path: &Path) -> Result<bool> {
    match file.try_lock_exclusive() {
        Ok(()) => Ok(true),
        Err(err)
            if err.kind() == ErrorKind::WouldBlock
                || err.raw_os_error() == fs2::lock_contended_error().raw_os_error() =>
        {
            Ok(false)
        }
        Err(err) => Err(err).with_context(|| format!("failed to lock {}", path.display())),
    }
}

/// Guard held for the duration of one reconciliation pass. Manual runs, the
/// startup pass and interval passes all take it, so overlapping triggers
/// skip instead of interleaving cache mutations.
#[derive(Debug)]
pub struct PassLock {
    file: File,
    path: PathBuf,
}

impl PassLock {
    /// `Ok(None)` when another pass already holds the lock.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>> {
        let file = open_lock_file(path)?;
        if !try_exclusive(&file, path)? {
            debug!(lock = %path.display(), "pass lock busy");
            return Ok(None);
        }
        Ok(Some(Self {
            file,
            path: path.to_path_buf(),
        }))
    }
}

impl Drop for PassLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!(lock = %self.path.display(), "pass lock released");
    }
}

/// Pid file for the watcher daemon. Holds an exclusive lock while the
/// daemon runs and is removed on drop.
#[derive(Debug)]
pub struct DaemonLock {
    file: File,
    path: PathBuf,
}

impl DaemonLock {
    pub fn acquire(path: &Path, build_uuid: &str) -> Result<Self> {
        let mut file = open_lock_file(path)?;
        if !try_exclusive(&file, path)? {
            anyhow::bail!(
                "watcher daemon already running (lock {})",
                path.display()
            );
        }
        file.set_len(0)
            .with_context(|| format!("failed to reset {}", path.display()))?;
        let contents = format!("{}\nbuild_uuid={build_uuid}\n", std::process::id());
        file.write_all(contents.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        file.flush()?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        let _ = self.file.unlock();
    }
}

/// First non-empty line of a daemon lock file, parsed as a pid.
pub fn read_lock_pid(path: &Path) -> Result<u32> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let pid_str = raw
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(str::trim)
        .context("daemon lock file is empty")?;
    pid_str
        .parse::<u32>()
        .with_context(|| format!("invalid daemon pid in lock file: {pid_str}"))
}
