//! Session-scoped local state: favorites and last-used selections.
//!
//! Nothing in here is ever sent to the hub. The settings collaborator persists
//! it across sessions through [`LocalStateIndex::snapshot`] and
//! [`LocalStateIndex::restore`].

use std::collections::BTreeSet;
use std::path::PathBuf;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::hub::{RepoDescriptor, RepoKey, RepoKind};

/// Serializable form of [`LocalStateIndex`], stored under `[session]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalStateSnapshot {
    /// Favorite repos as `kind:namespace/name` tokens.
    pub favorites: Vec<String>,
    pub last_repo_kind: Option<RepoKind>,
    pub favorites_only: bool,
    pub last_repo_id: Option<String>,
    pub last_upload_dir: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct LocalState {
    favorites: BTreeSet<RepoKey>,
    last_repo_kind: Option<RepoKind>,
    favorites_only: bool,
    last_repo_id: Option<String>,
    last_upload_dir: Option<PathBuf>,
}

/// In-memory index of favorites and UI-adjacent session state.
#[derive(Debug, Default)]
pub struct LocalStateIndex {
    state: RwLock<LocalState>,
}

impl LocalStateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the favorite flag for `repo`. Returns the new value.
    pub fn toggle_favorite(&self, repo: &RepoKey) -> bool {
        let mut state = self.state.write();
        if state.favorites.remove(repo) {
            false
        } else {
            state.favorites.insert(repo.clone());
            true
        }
    }

    pub fn is_favorite(&self, repo: &RepoKey) -> bool {
        self.state.read().favorites.contains(repo)
    }

    pub fn favorites(&self) -> Vec<RepoKey> {
        self.state.read().favorites.iter().cloned().collect()
    }

    pub fn last_repo_kind(&self) -> Option<RepoKind> {
        self.state.read().last_repo_kind
    }

    pub fn set_last_repo_kind(&self, kind: RepoKind) {
        self.state.write().last_repo_kind = Some(kind);
    }

    pub fn favorites_only(&self) -> bool {
        self.state.read().favorites_only
    }

    pub fn set_favorites_only(&self, enabled: bool) {
        self.state.write().favorites_only = enabled;
    }

    pub fn last_repo_id(&self) -> Option<String> {
        self.state.read().last_repo_id.clone()
    }

    pub fn set_last_repo_id(&self, id: impl Into<String>) {
        self.state.write().last_repo_id = Some(id.into());
    }

    pub fn last_upload_dir(&self) -> Option<PathBuf> {
        self.state.read().last_upload_dir.clone()
    }

    pub fn set_last_upload_dir(&self, dir: impl Into<PathBuf>) {
        self.state.write().last_upload_dir = Some(dir.into());
    }

    /// Overlay the local favorite flag onto descriptors fresh from the hub.
    pub fn annotate(&self, repos: &mut [RepoDescriptor]) {
        let state = self.state.read();
        for repo in repos.iter_mut() {
            repo.is_favorite = state.favorites.contains(&repo.key());
        }
    }

    /// Apply the favorites-only filter if it is switched on.
    pub fn filter_favorites(&self, repos: Vec<RepoDescriptor>) -> Vec<RepoDescriptor> {
        if !self.favorites_only() {
            return repos;
        }
        let state = self.state.read();
        repos
            .into_iter()
            .filter(|repo| state.favorites.contains(&repo.key()))
            .collect()
    }

    /// Drop every trace of a repo that no longer exists on the hub.
    pub fn forget(&self, repo: &RepoKey) {
        let mut state = self.state.write();
        state.favorites.remove(repo);
        if state.last_repo_id.as_deref() == Some(repo.id.as_str()) {
            state.last_repo_id = None;
        }
    }

    pub fn snapshot(&self) -> LocalStateSnapshot {
        let state = self.state.read();
        LocalStateSnapshot {
            favorites: state.favorites.iter().map(RepoKey::to_token).collect(),
            last_repo_kind: state.last_repo_kind,
            favorites_only: state.favorites_only,
            last_repo_id: state.last_repo_id.clone(),
            last_upload_dir: state.last_upload_dir.clone(),
        }
    }

    /// Replace the current state. Unparseable favorite tokens are skipped.
    pub fn restore(&self, snapshot: LocalStateSnapshot) {
        let favorites = snapshot
            .favorites
            .iter()
            .filter_map(|token| match RepoKey::from_token(token) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!("Dropping unreadable favorite '{}': {}", token, e);
                    None
                }
            })
            .collect();

        *self.state.write() = LocalState {
            favorites,
            last_repo_kind: snapshot.last_repo_kind,
            favorites_only: snapshot.favorites_only,
            last_repo_id: snapshot.last_repo_id,
            last_upload_dir: snapshot.last_upload_dir,
        };
    }
}
