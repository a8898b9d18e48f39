//! Domain types shared by every component.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{HubError, Result};

/// Kind of hosted repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoKind {
    Model,
    Dataset,
    Space,
}

impl RepoKind {
    pub const ALL: [RepoKind; 3] = [RepoKind::Model, RepoKind::Dataset, RepoKind::Space];

    pub fn as_str(&self) -> &'static str {
        match self {
            RepoKind::Model => "model",
            RepoKind::Dataset => "dataset",
            RepoKind::Space => "space",
        }
    }

    /// Plural segment used by the `/api/{kind}s` routes.
    pub fn api_segment(&self) -> &'static str {
        match self {
            RepoKind::Model => "models",
            RepoKind::Dataset => "datasets",
            RepoKind::Space => "spaces",
        }
    }

    /// Prefix for content and git routes (`/{prefix}{id}/resolve/...`).
    pub fn url_prefix(&self) -> &'static str {
        match self {
            RepoKind::Model => "",
            RepoKind::Dataset => "datasets/",
            RepoKind::Space => "spaces/",
        }
    }
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoKind {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "model" | "models" => Ok(RepoKind::Model),
            "dataset" | "datasets" => Ok(RepoKind::Dataset),
            "space" | "spaces" => Ok(RepoKind::Space),
            other => Err(HubError::Validation(format!("Unknown repo type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn from_private(private: bool) -> Self {
        if private {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Visibility::Private)
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        })
    }
}

impl FromStr for Visibility {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(Visibility::Public),
            "private" => Ok(Visibility::Private),
            other => Err(HubError::Validation(format!("Unknown visibility: {}", other))),
        }
    }
}

/// `namespace/name`, validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId(String);

impl RepoId {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        let mut parts = value.split('/');
        let (namespace, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(ns), Some(name), None) => (ns, name),
            _ => {
                return Err(HubError::Validation(format!(
                    "Repo id '{}' must look like namespace/name",
                    value
                )))
            }
        };
        if namespace.is_empty() || name.is_empty() {
            return Err(HubError::Validation(format!(
                "Repo id '{}' has an empty namespace or name",
                value
            )));
        }
        Ok(Self(value.to_string()))
    }

    /// Qualify a bare `name` with `owner`, or parse a full id.
    pub fn qualify(name: &str, owner: &str) -> Result<Self> {
        if name.contains('/') {
            Self::parse(name)
        } else {
            Self::parse(&format!("{}/{}", owner, name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn namespace(&self) -> &str {
        self.0.split_once('/').map(|(ns, _)| ns).unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.0.split_once('/').map(|(_, name)| name).unwrap_or_default()
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RepoId {
    type Error = HubError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<RepoId> for String {
    fn from(id: RepoId) -> Self {
        id.0
    }
}

/// Identity of a repository: `(kind, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoKey {
    pub kind: RepoKind,
    pub id: RepoId,
}

impl RepoKey {
    pub fn new(kind: RepoKind, id: RepoId) -> Self {
        Self { kind, id }
    }

    /// Compact `kind:namespace/name` form used in persisted favorites.
    pub fn to_token(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }

    pub fn from_token(token: &str) -> Result<Self> {
        match token.split_once(':') {
            Some((kind, id)) => Ok(Self::new(kind.parse()?, RepoId::parse(id)?)),
            // Bare ids predate repo kinds in the favorites list
            None => Ok(Self::new(RepoKind::Model, RepoId::parse(token)?)),
        }
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// One hosted repository as last reported by the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoDescriptor {
    pub id: RepoId,
    pub kind: RepoKind,
    pub visibility: Visibility,
    pub downloads: u64,
    pub likes: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// Local overlay, never sent to the hub.
    pub is_favorite: bool,
    pub sha: Option<String>,
    pub tags: Vec<String>,
}

impl RepoDescriptor {
    pub fn key(&self) -> RepoKey {
        RepoKey::new(self.kind, self.id.clone())
    }
}

/// A branch of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: String,
    pub is_default: bool,
    pub head_commit_id: String,
}

/// One file on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    pub size_bytes: u64,
    pub is_lfs: bool,
    pub last_commit_id: Option<String>,
}

/// Cache key for one branch of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeKey {
    pub repo: RepoKey,
    pub branch: String,
}

impl TreeKey {
    pub fn new(repo: RepoKey, branch: impl Into<String>) -> Self {
        Self {
            repo,
            branch: branch.into(),
        }
    }
}

impl fmt::Display for TreeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.repo.id, self.branch)
    }
}

/// Who the current credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    pub fullname: String,
    pub email: String,
    pub avatar_url: String,
    pub orgs: Vec<String>,
}
