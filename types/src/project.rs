//! Project identity, file listing, and the active file.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::epoch::SelectionToken;

/// Conventional entry-point file a project is built from.
pub const ENTRY_POINT_FILE: &str = "main.tex";

/// Scaffold template used when a directory has no project in it yet.
pub const DEFAULT_TEMPLATE: &str = "default";

/// Opaque identity of the open project: its directory path.
///
/// Projects are replaced wholesale - opening a different directory discards
/// the previous project entirely, listing included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectDir(PathBuf);

impl ProjectDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ProjectDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

impl From<PathBuf> for ProjectDir {
    fn from(path: PathBuf) -> Self {
        Self(path)
    }
}

/// A relative path inside the open project.
///
/// Rejects absolute paths and parent traversal, so a read or write can never
/// escape the project directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelPath(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelPathError {
    #[error("path is empty")]
    Empty,
    #[error("path `{0}` is absolute")]
    Absolute(String),
    #[error("path `{0}` escapes the project directory")]
    Traversal(String),
}

impl RelPath {
    pub fn new(path: impl Into<String>) -> Result<Self, RelPathError> {
        let path = path.into();
        if path.is_empty() {
            return Err(RelPathError::Empty);
        }
        if Path::new(&path).is_absolute() {
            return Err(RelPathError::Absolute(path));
        }
        if Path::new(&path)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(RelPathError::Traversal(path));
        }
        Ok(Self(path))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The set of relative paths belonging to the open project.
///
/// Owned by the session store. Refreshed by re-querying the backend and
/// replaced wholesale; never mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileListing(BTreeSet<String>);

impl FileListing {
    #[must_use]
    pub fn new(files: impl IntoIterator<Item = String>) -> Self {
        Self(files.into_iter().collect())
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.0.contains(path)
    }

    /// Whether the conventional entry-point file is present.
    #[must_use]
    pub fn has_entry_point(&self) -> bool {
        self.contains(ENTRY_POINT_FILE)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// The single file currently open for editing.
///
/// Tracks the last-known persisted content (`saved`) separately from the
/// locally edited content (`edited`); the two drift apart between keystrokes
/// and debounced persists. Carries the selection token that scopes in-flight
/// reads and saves to this selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFile {
    path: RelPath,
    saved: String,
    edited: String,
    selection: SelectionToken,
}

impl ActiveFile {
    /// A freshly selected file whose content has not arrived yet.
    #[must_use]
    pub fn pending(path: RelPath, selection: SelectionToken) -> Self {
        Self {
            path,
            saved: String::new(),
            edited: String::new(),
            selection,
        }
    }

    #[must_use]
    pub fn path(&self) -> &RelPath {
        &self.path
    }

    #[must_use]
    pub fn selection(&self) -> SelectionToken {
        self.selection
    }

    #[must_use]
    pub fn saved(&self) -> &str {
        &self.saved
    }

    #[must_use]
    pub fn edited(&self) -> &str {
        &self.edited
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.saved != self.edited
    }

    /// Commit fetched content: both saved and edited start from the backend's
    /// version of the file.
    pub fn load(&mut self, content: String) {
        self.saved.clone_from(&content);
        self.edited = content;
    }

    /// Replace the edited content only; `saved` is untouched until a persist
    /// round-trips.
    pub fn edit(&mut self, content: String) {
        self.edited = content;
    }

    /// Record that `content` was accepted by the backend.
    pub fn mark_saved(&mut self, content: &str) {
        self.saved.clear();
        self.saved.push_str(content);
    }
}
