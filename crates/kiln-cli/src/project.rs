//! Loading project files from disk.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use kiln_common::types::UnitKind;

/// Reads every script and stylesheet under `dir`, keyed by `/`-separated
/// relative path.
///
/// Hidden directories and `skip` (the output directory) are not descended into.
///
/// # Errors
///
/// Returns an error if a directory or file cannot be read.
pub fn load(dir: &Path, skip: Option<&Path>) -> anyhow::Result<BTreeMap<String, String>> {
    let skip = skip.and_then(|p| std::fs::canonicalize(p).ok());
    let mut files = BTreeMap::new();
    let mut pending: Vec<(PathBuf, String)> = vec![(dir.to_path_buf(), String::new())];

    while let Some((path, prefix)) = pending.pop() {
        let entries =
            std::fs::read_dir(&path).with_context(|| format!("failed to read directory {}", path.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to read directory {}", path.display()))?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 file name");
                continue;
            };
            let key = format!("{prefix}{name}");
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if name.starts_with('.') || is_skipped(&entry.path(), skip.as_deref()) {
                    continue;
                }
                pending.push((entry.path(), format!("{key}/")));
            } else if file_type.is_file() && UnitKind::from_filename(&key).is_some() {
                let content = std::fs::read_to_string(entry.path())
                    .with_context(|| format!("failed to read {}", entry.path().display()))?;
                let _ = files.insert(key, content);
            }
        }
    }

    tracing::debug!(dir = %dir.display(), files = files.len(), "project loaded");
    Ok(files)
}

fn is_skipped(path: &Path, skip: Option<&Path>) -> bool {
    skip.is_some_and(|skip| std::fs::canonicalize(path).is_ok_and(|p| p == skip))
}

/// One file-level difference found by [`ProjectFiles::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// A unit was added or its content changed.
    Changed {
        /// Project-relative key.
        filename: String,
        /// New content.
        content: String,
    },
    /// A unit no longer exists.
    Removed {
        /// Project-relative key.
        filename: String,
    },
}

/// Project units as last seen on disk.
#[derive(Debug)]
pub struct ProjectFiles {
    root: PathBuf,
    skip: Option<PathBuf>,
    files: BTreeMap<String, String>,
}

impl ProjectFiles {
    /// Loads every unit under `dir`, skipping hidden directories and `skip`.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` cannot be resolved or read.
    pub fn load(dir: &Path, skip: Option<&Path>) -> anyhow::Result<Self> {
        let root = std::fs::canonicalize(dir).with_context(|| format!("failed to resolve {}", dir.display()))?;
        let skip = skip.and_then(|p| std::fs::canonicalize(p).ok());
        let files = load(&root, skip.as_deref())?;
        Ok(Self { root, skip, files })
    }

    /// Canonical project directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Units keyed by `/`-separated relative path.
    #[must_use]
    pub const fn files(&self) -> &BTreeMap<String, String> {
        &self.files
    }

    /// Project key of `path`, or `None` if it lies outside the project, in a
    /// hidden directory or in the skipped directory.
    #[must_use]
    pub fn key_for(&self, path: &Path) -> Option<String> {
        if self.skip.as_deref().is_some_and(|skip| path.starts_with(skip)) {
            return None;
        }
        let mut parts = Vec::new();
        for component in path.strip_prefix(&self.root).ok()?.components() {
            let Component::Normal(name) = component else {
                return None;
            };
            let name = name.to_str()?;
            if name.starts_with('.') {
                return None;
            }
            parts.push(name);
        }
        (!parts.is_empty()).then(|| parts.join("/"))
    }

    /// Re-reads `path` and returns how the units under it changed.
    ///
    /// A missing path removes every unit at or below it; a directory is
    /// loaded recursively. Unchanged content yields no change.
    pub fn refresh(&mut self, path: &Path) -> Vec<FileChange> {
        let Some(key) = self.key_for(path) else {
            return Vec::new();
        };
        let mut changes = Vec::new();
        if path.is_dir() {
            match load(path, self.skip.as_deref()) {
                Ok(found) => {
                    for (name, content) in found {
                        self.record(format!("{key}/{name}"), content, &mut changes);
                    }
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to scan directory"),
            }
        } else if path.is_file() {
            if UnitKind::from_filename(&key).is_none() {
                return changes;
            }
            match std::fs::read_to_string(path) {
                Ok(content) => self.record(key, content, &mut changes),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to read file"),
            }
        } else {
            let prefix = format!("{key}/");
            let gone: Vec<String> = self
                .files
                .keys()
                .filter(|name| **name == key || name.starts_with(&prefix))
                .cloned()
                .collect();
            for filename in gone {
                let _ = self.files.remove(&filename);
                changes.push(FileChange::Removed { filename });
            }
        }
        changes
    }

    fn record(&mut self, filename: String, content: String, changes: &mut Vec<FileChange>) {
        if self.files.get(&filename) == Some(&content) {
            return;
        }
        let _ = self.files.insert(filename.clone(), content.clone());
        changes.push(FileChange::Changed { filename, content });
    }
}
