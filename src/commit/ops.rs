//! Pending file operations and the per-path staging set.

use std::path::PathBuf;

use bytes::Bytes;

use crate::error::{HubError, Result};

/// Where the content of an added or updated file comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    Bytes(Bytes),
    /// Read when the commit is submitted, not when staged.
    Local(PathBuf),
}

impl FileSource {
    pub async fn load(&self) -> Result<Bytes> {
        match self {
            FileSource::Bytes(data) => Ok(data.clone()),
            FileSource::Local(path) => {
                let data = tokio::fs::read(path).await.map_err(|e| {
                    HubError::Io(std::io::Error::new(
                        e.kind(),
                        format!("{}: {}", path.display(), e),
                    ))
                })?;
                Ok(Bytes::from(data))
            }
        }
    }
}

impl From<Vec<u8>> for FileSource {
    fn from(data: Vec<u8>) -> Self {
        FileSource::Bytes(Bytes::from(data))
    }
}

impl From<&str> for FileSource {
    fn from(text: &str) -> Self {
        FileSource::Bytes(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<String> for FileSource {
    fn from(text: String) -> Self {
        FileSource::Bytes(Bytes::from(text))
    }
}

impl From<PathBuf> for FileSource {
    fn from(path: PathBuf) -> Self {
        FileSource::Local(path)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PendingOperation {
    Add { path: String, source: FileSource },
    Update { path: String, source: FileSource },
    Delete { path: String },
}

impl PendingOperation {
    pub fn add(path: impl Into<String>, source: impl Into<FileSource>) -> Self {
        PendingOperation::Add {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn update(path: impl Into<String>, source: impl Into<FileSource>) -> Self {
        PendingOperation::Update {
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        PendingOperation::Delete { path: path.into() }
    }

    pub fn path(&self) -> &str {
        match self {
            PendingOperation::Add { path, .. }
            | PendingOperation::Update { path, .. }
            | PendingOperation::Delete { path } => path,
        }
    }

    pub fn source(&self) -> Option<&FileSource> {
        match self {
            PendingOperation::Add { source, .. } | PendingOperation::Update { source, .. } => {
                Some(source)
            }
            PendingOperation::Delete { .. } => None,
        }
    }

    pub fn verb(&self) -> &'static str {
        match self {
            PendingOperation::Add { .. } => "add",
            PendingOperation::Update { .. } => "update",
            PendingOperation::Delete { .. } => "delete",
        }
    }

    fn with_path(self, path: String) -> Self {
        match self {
            PendingOperation::Add { source, .. } => PendingOperation::Add { path, source },
            PendingOperation::Update { source, .. } => PendingOperation::Update { path, source },
            PendingOperation::Delete { .. } => PendingOperation::Delete { path },
        }
    }
}

/// Normalize a path inside a repo, rejecting anything that escapes it.
pub fn normalize_repo_path(path: &str) -> Result<String> {
    let normalized = path.trim().replace('\\', "/");
    let normalized = normalized.trim_start_matches("./");
    if normalized.is_empty() {
        return Err(HubError::Validation("File path is empty".to_string()));
    }
    if normalized.starts_with('/') {
        return Err(HubError::Validation(format!(
            "File path '{}' must be relative to the repo root",
            path
        )));
    }
    if normalized
        .split('/')
        .any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(HubError::Validation(format!(
            "File path '{}' has an empty, '.' or '..' component",
            path
        )));
    }
    Ok(normalized.to_string())
}

/// Validate and normalize the path of `op`.
pub fn validate(op: PendingOperation) -> Result<PendingOperation> {
    let path = normalize_repo_path(op.path())?;
    Ok(op.with_path(path))
}

#[derive(Debug, Clone)]
struct Staged {
    op: PendingOperation,
    /// The first operation on this path in the session was an add.
    introduced: bool,
}

/// Ordered set of operations, at most one per path.
///
/// A later operation on a path replaces the earlier one and moves to the end,
/// carrying the latest content or the delete. The kind tracks whether the path
/// exists remotely: a path first added in this session stays an add through
/// later content changes and drops out entirely when deleted, while any other
/// path is committed as an update or a delete.
#[derive(Debug, Clone, Default)]
pub struct StagedSet {
    entries: Vec<Staged>,
}

impl StagedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, op: PendingOperation) {
        let prior = self
            .entries
            .iter()
            .position(|s| s.op.path() == op.path())
            .map(|index| self.entries.remove(index));

        let introduced = match &prior {
            Some(prior) => prior.introduced,
            None => matches!(op, PendingOperation::Add { .. }),
        };

        let effective = match (introduced, op) {
            (true, PendingOperation::Delete { .. }) => None,
            (true, PendingOperation::Add { path, source })
            | (true, PendingOperation::Update { path, source }) => {
                Some(PendingOperation::Add { path, source })
            }
            (false, PendingOperation::Add { path, source })
            | (false, PendingOperation::Update { path, source }) => {
                Some(PendingOperation::Update { path, source })
            }
            (false, op @ PendingOperation::Delete { .. }) => Some(op),
        };

        if let Some(op) = effective {
            self.entries.push(Staged { op, introduced });
        }
    }

    pub fn unstage(&mut self, path: &str) -> Option<PendingOperation> {
        let index = self.entries.iter().position(|s| s.op.path() == path)?;
        Some(self.entries.remove(index).op)
    }

    pub fn get(&self, path: &str) -> Option<&PendingOperation> {
        self.entries
            .iter()
            .find(|s| s.op.path() == path)
            .map(|s| &s.op)
    }

    pub fn operations(&self) -> Vec<PendingOperation> {
        self.entries.iter().map(|s| s.op.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
