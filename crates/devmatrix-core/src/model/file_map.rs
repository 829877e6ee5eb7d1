//! The generated source tree as a path-to-contents mapping.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contents of one generated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileContents {
    /// UTF-8 text artifact
    Text(String),
    /// Binary artifact
    Binary(Vec<u8>),
}

impl FileContents {
    /// Text view, if this is a text artifact.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    /// Size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }

    /// Whether the contents are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for FileContents {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for FileContents {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Normalize a relative POSIX path: strip `./`, reject absolute paths,
/// `..` segments, and empty paths.
pub fn normalize_path(path: &str) -> Result<String> {
    let trimmed = path.trim();
    if trimmed.is_empty() || trimmed.starts_with('/') {
        return Err(Error::InvalidPath(path.to_string()));
    }
    let mut parts = Vec::new();
    for segment in trimmed.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(Error::InvalidPath(path.to_string())),
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(parts.join("/"))
}

/// Mapping from normalized relative path to file contents.
///
/// The repair loop treats this as copy-on-write: each iteration clones the
/// map, mutates the clone, and only commits it if compliance did not
/// regress. Ordered so that emitted trees and reports are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMap {
    files: BTreeMap<String, FileContents>,
}

impl FileMap {
    /// An empty file map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a file under a normalized path, replacing any previous entry.
    pub fn insert(
        &mut self,
        path: impl AsRef<str>,
        contents: impl Into<FileContents>,
    ) -> Result<()> {
        let normalized = normalize_path(path.as_ref())?;
        self.files.insert(normalized, contents.into());
        Ok(())
    }

    /// Fetch a file's contents.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FileContents> {
        self.files.get(path)
    }

    /// Fetch a file's text, if it exists and is text.
    #[must_use]
    pub fn get_text(&self, path: &str) -> Option<&str> {
        self.files.get(path).and_then(FileContents::as_text)
    }

    /// Whether a path is present.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// All paths in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Iterate (path, contents) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileContents)> {
        self.files.iter().map(|(p, c)| (p.as_str(), c))
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the map holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total size of all contents in bytes.
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.files.values().map(FileContents::len).sum()
    }
}
