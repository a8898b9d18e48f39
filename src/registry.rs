//! Repository enumeration and lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::auth::CredentialStore;
use crate::error::{HubError, Result};
use crate::file_tree::FileTreeCache;
use crate::hub::endpoints::{self, RepoWire};
use crate::hub::{RepoDescriptor, RepoId, RepoKey, RepoKind, Visibility};
use crate::local_state::LocalStateIndex;
use crate::transport::{fetch_all, Transport};

pub const DEFAULT_LIST_SORT: &str = "lastModified";

/// Optional knobs for [`RepoRegistry::list`].
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub search: Option<String>,
    pub sort: String,
    /// Stop after this many repos. `None` follows every page.
    pub limit: Option<usize>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            search: None,
            sort: DEFAULT_LIST_SORT.to_string(),
            limit: None,
        }
    }
}

pub struct RepoRegistry {
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialStore>,
    local: Arc<LocalStateIndex>,
    trees: Arc<FileTreeCache>,
    /// Last descriptor seen per repo, used to skip no-op visibility changes.
    known: RwLock<HashMap<RepoKey, RepoDescriptor>>,
}

impl RepoRegistry {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialStore>,
        local: Arc<LocalStateIndex>,
        trees: Arc<FileTreeCache>,
    ) -> Self {
        Self {
            transport,
            credentials,
            local,
            trees,
            known: RwLock::new(HashMap::new()),
        }
    }

    /// Every repo of `kind` owned by `owner` (up to `options.limit`), or an
    /// error. Paged answers are followed to the end; a failing page fails the
    /// whole listing.
    pub async fn list(
        &self,
        kind: RepoKind,
        owner: &str,
        options: &ListOptions,
    ) -> Result<Vec<RepoDescriptor>> {
        let request = endpoints::list_repos(
            kind,
            Some(owner),
            options.search.as_deref(),
            &options.sort,
            options.limit,
        );
        let wire: Vec<RepoWire> = fetch_all(&*self.transport, request, options.limit).await?;

        let mut repos = wire
            .into_iter()
            .map(|w| w.into_descriptor(kind))
            .collect::<Result<Vec<_>>>()?;
        self.local.annotate(&mut repos);
        self.local.set_last_repo_kind(kind);
        self.remember(&repos);

        tracing::debug!("Listed {} {} repos for {}", repos.len(), kind, owner);
        Ok(repos)
    }

    pub async fn info(&self, kind: RepoKind, id: &RepoId) -> Result<RepoDescriptor> {
        let key = RepoKey::new(kind, id.clone());
        let response = self.transport.execute(endpoints::repo_info(&key)).await?;
        let wire: RepoWire = response.json()?;

        let mut repo = [wire.into_descriptor(kind)?];
        self.local.annotate(&mut repo);
        self.remember(&repo);
        let [repo] = repo;
        Ok(repo)
    }

    /// Create a repo. A bare `name` is placed under the logged-in user.
    pub async fn create(
        &self,
        kind: RepoKind,
        name: &str,
        visibility: Visibility,
    ) -> Result<RepoDescriptor> {
        let id = match self.credentials.username() {
            Some(owner) => RepoId::qualify(name, &owner)?,
            None => RepoId::parse(name)?,
        };
        let key = RepoKey::new(kind, id.clone());

        self.transport
            .execute(endpoints::create_repo(&key, visibility))
            .await?;
        tracing::info!("Created {} {} ({})", kind, id, visibility);

        let repo = RepoDescriptor {
            id,
            kind,
            visibility,
            downloads: 0,
            likes: 0,
            last_modified: Some(chrono::Utc::now()),
            is_favorite: false,
            sha: None,
            tags: Vec::new(),
        };
        self.remember(std::slice::from_ref(&repo));
        Ok(repo)
    }

    /// Irreversible. Confirmation is the caller's job.
    pub async fn delete(&self, kind: RepoKind, id: &RepoId) -> Result<()> {
        let key = RepoKey::new(kind, id.clone());
        self.transport.execute(endpoints::delete_repo(&key)).await?;
        tracing::info!("Deleted {} {}", kind, id);

        self.known.write().remove(&key);
        self.local.forget(&key);
        self.trees.invalidate_repo(&key);
        Ok(())
    }

    /// Idempotent: a visibility already known to be in place costs no call.
    pub async fn set_visibility(
        &self,
        kind: RepoKind,
        id: &RepoId,
        visibility: Visibility,
    ) -> Result<RepoDescriptor> {
        let key = RepoKey::new(kind, id.clone());
        let known = self.known.read().get(&key).cloned();
        if let Some(repo) = known.as_ref().filter(|r| r.visibility == visibility) {
            tracing::debug!("{} is already {}", id, visibility);
            return Ok(repo.clone());
        }

        self.transport
            .execute(endpoints::update_visibility(&key, visibility))
            .await?;
        tracing::info!("Set {} {} to {}", kind, id, visibility);

        match known {
            Some(mut repo) => {
                repo.visibility = visibility;
                self.remember(std::slice::from_ref(&repo));
                Ok(repo)
            }
            None => self.info(kind, id).await,
        }
    }

    /// Last descriptor seen for `key`, if any.
    pub fn known(&self, key: &RepoKey) -> Option<RepoDescriptor> {
        self.known.read().get(key).cloned()
    }

    fn remember(&self, repos: &[RepoDescriptor]) {
        let mut known = self.known.write();
        for repo in repos {
            known.insert(repo.key(), repo.clone());
        }
    }

    /// Resolve the owner for listings: explicit, else the logged-in user.
    pub fn owner_or_current(&self, owner: Option<&str>) -> Result<String> {
        match owner {
            Some(owner) => Ok(owner.to_string()),
            None => self.credentials.username().ok_or_else(|| HubError::Auth {
                status: 401,
                message: "Not logged in".to_string(),
            }),
        }
    }
}
