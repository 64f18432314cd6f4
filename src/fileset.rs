// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! File-Set Differ.

use crate::types::{ExpandedConfig, FileEntry};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum FileChangeKind {
    Added,
    Removed,
    Modified,
}

/// A single path that differs between two configurations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub path: String,
    pub kind: FileChangeKind,
    /// Desired entry after the change; `None` when the path goes away.
    pub contents: Option<FileEntry>,
}

/// Per-path changes, ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileSetDiff {
    changes: Vec<FileChange>,
}

impl FileSetDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileChange> {
        self.changes.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.path.as_str())
    }

    pub fn get(&self, path: &str) -> Option<&FileChange> {
        self.changes
            .binary_search_by(|c| c.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.changes[i])
    }
}

impl<'a> IntoIterator for &'a FileSetDiff {
    type Item = &'a FileChange;
    type IntoIter = std::slice::Iter<'a, FileChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

/// Expand both configurations into path-level changes.
///
/// Deterministic: both inputs are path-keyed ordered maps, and the merge
/// below walks them in key order.
pub fn diff_files(old: &ExpandedConfig, new: &ExpandedConfig) -> FileSetDiff {
    let mut changes = Vec::new();

    for (path, entry) in &new.files {
        match old.files.get(path) {
            None => changes.push(FileChange {
                path: path.clone(),
                kind: FileChangeKind::Added,
                contents: Some(entry.clone()),
            }),
            Some(prev) if prev != entry => changes.push(FileChange {
                path: path.clone(),
                kind: FileChangeKind::Modified,
                contents: Some(entry.clone()),
            }),
            Some(_) => {}
        }
    }
    for path in old.files.keys() {
        if !new.files.contains_key(path) {
            changes.push(FileChange {
                path: path.clone(),
                kind: FileChangeKind::Removed,
                contents: None,
            });
        }
    }

    changes.sort_by(|a, b| a.path.cmp(&b.path));
    FileSetDiff { changes }
}
