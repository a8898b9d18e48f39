//! Branch and tag lookups.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{HubError, Result};
use crate::hub::endpoints::{self, RefsWire};
use crate::hub::{BranchRef, RepoKey};
use crate::transport::Transport;

/// Branch used when the hub marks no default.
pub const FALLBACK_DEFAULT_BRANCH: &str = "main";

/// Branches and tags of one repository.
#[derive(Debug, Clone, Serialize)]
pub struct Refs {
    pub branches: Vec<BranchRef>,
    pub tags: Vec<String>,
}

pub struct BranchResolver {
    transport: Arc<dyn Transport>,
}

impl BranchResolver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// All branches, with exactly one marked default.
    ///
    /// When the hub marks none, the branch named `main` is marked instead.
    /// If there is no `main` either, the list comes back with no default and
    /// [`resolve_default`](Self::resolve_default) reports the inconsistency.
    pub async fn list_branches(&self, repo: &RepoKey) -> Result<Vec<BranchRef>> {
        Ok(self.list_refs(repo).await?.branches)
    }

    pub async fn list_refs(&self, repo: &RepoKey) -> Result<Refs> {
        let response = self.transport.execute(endpoints::list_refs(repo)).await?;
        let wire: RefsWire = response.json()?;

        let mut branches: Vec<BranchRef> = wire.branches.into_iter().map(BranchRef::from).collect();
        mark_default(repo, &mut branches)?;

        Ok(Refs {
            branches,
            tags: wire.tags.into_iter().map(|t| t.name).collect(),
        })
    }

    pub async fn resolve_default(&self, repo: &RepoKey) -> Result<BranchRef> {
        self.list_branches(repo)
            .await?
            .into_iter()
            .find(|b| b.is_default)
            .ok_or_else(|| {
                HubError::InconsistentState(format!(
                    "{} reports no default branch and has no '{}' branch",
                    repo.id, FALLBACK_DEFAULT_BRANCH
                ))
            })
    }
}

fn mark_default(repo: &RepoKey, branches: &mut [BranchRef]) -> Result<()> {
    match branches.iter().filter(|b| b.is_default).count() {
        1 => Ok(()),
        0 => {
            if let Some(main) = branches
                .iter_mut()
                .find(|b| b.name == FALLBACK_DEFAULT_BRANCH)
            {
                tracing::debug!(
                    "{} marks no default branch, assuming '{}'",
                    repo.id,
                    FALLBACK_DEFAULT_BRANCH
                );
                main.is_default = true;
            }
            Ok(())
        }
        n => Err(HubError::InconsistentState(format!(
            "{} reports {} default branches",
            repo.id, n
        ))),
    }
}
