//! Storage abstraction for the linked folder tree.
//!
//! The engine never touches the filesystem directly. Every path handed to a
//! [`Storage`] is `/`-separated and relative to the storage root (the
//! workspaces directory for [`FsStorage`]), which is also the form used as a
//! cache key. Nothing here assumes a folder persists between calls; callers
//! re-check existence before acting on it.

use anyhow::{Context, Result, bail};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub trait Storage {
    fn exists(&self, path: &str) -> bool;

    fn is_folder(&self, path: &str) -> bool;

    fn read(&self, path: &str) -> Result<String>;

    /// Create a folder. Fails when something already occupies the path.
    fn create_folder(&mut self, path: &str) -> Result<()>;

    /// Create a new file. Fails when the file already exists.
    fn create(&mut self, path: &str, content: &str) -> Result<()>;

    /// Overwrite an existing file.
    fn modify(&mut self, path: &str, content: &str) -> Result<()>;

    /// Move a file or folder. Fails when the destination is occupied.
    fn rename(&mut self, from: &str, to: &str) -> Result<()>;

    /// Names of the direct children of a folder.
    fn list_children(&self, path: &str) -> Result<BTreeSet<String>>;
}

pub fn normalize(path: &str) -> String {
    path.split(['/', '\\'])
        .map(str::trim)
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/")
}

pub fn join(base: &str, name: &str) -> String {
    let base = normalize(base);
    let name = normalize(name);
    if base.is_empty() {
        name
    } else if name.is_empty() {
        base
    } else {
        format!("{base}/{name}")
    }
}

/// Filesystem-backed storage rooted at a base directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        for component in rel.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => bail!("refusing path outside storage root: {path}"),
            }
        }
        Ok(self.root.join(normalize(path)))
    }

    fn ensure_parent(target: &Path) -> Result<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        Ok(())
    }
}

impl Storage for FsStorage {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn is_folder(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.is_dir()).unwrap_or(false)
    }

    fn read(&self, path: &str) -> Result<String> {
        let target = self.resolve(path)?;
        fs::read_to_string(&target).with_context(|| format!("failed to read {}", target.display()))
    }

    fn create_folder(&mut self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        Self::ensure_parent(&target)?;
        fs::create_dir(&target).with_context(|| format!("failed to create {}", target.display()))
    }

    fn create(&mut self, path: &str, content: &str) -> Result<()> {
        use std::io::Write;
        let target = self.resolve(path)?;
        Self::ensure_parent(&target)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .with_context(|| format!("failed to create {}", target.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("failed to write {}", target.display()))?;
        Ok(())
    }

    fn modify(&mut self, path: &str, content: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if !target.is_file() {
            bail!("cannot modify missing file {}", target.display());
        }
        fs::write(&target, content).with_context(|| format!("failed to write {}", target.display()))
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if source == target {
            return Ok(());
        }
        if !source.exists() {
            bail!("cannot move missing {}", source.display());
        }
        if target.exists() {
            bail!("destination already exists: {}", target.display());
        }
        Self::ensure_parent(&target)?;
        fs::rename(&source, &target).with_context(|| {
            format!("failed to move {} to {}", source.display(), target.display())
        })
    }

    fn list_children(&self, path: &str) -> Result<BTreeSet<String>> {
        let target = self.resolve(path)?;
        let entries =
            fs::read_dir(&target).with_context(|| format!("failed to read {}", target.display()))?;
        let mut out = BTreeSet::new();
        for entry in entries {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                out.insert(name.to_string());
            }
        }
        Ok(out)
    }
}


#[cfg(test)]
pub use memory::MemoryStorage;
