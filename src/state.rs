use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthenticatedTransport, Authenticator, CredentialStore};
use crate::branches::BranchResolver;
use crate::collections::CollectionStore;
use crate::commit::{CommitBuilder, CommitGate};
use crate::error::Result;
use crate::events::EventSink;
use crate::file_tree::FileTreeCache;
use crate::hub::RepoKey;
use crate::local_state::LocalStateIndex;
use crate::registry::RepoRegistry;
use crate::settings::HubSettings;
use crate::transport::{HttpTransport, RetryPolicy, RetryTransport, Transport};

/// One authenticated session: every component, wired to one transport stack.
pub struct HubState {
    pub credentials: Arc<CredentialStore>,
    pub local: Arc<LocalStateIndex>,
    pub auth: Authenticator,
    pub registry: RepoRegistry,
    pub branches: Arc<BranchResolver>,
    pub trees: Arc<FileTreeCache>,
    pub collections: CollectionStore,
    transport: Arc<dyn Transport>,
    gate: CommitGate,
    events: Arc<dyn EventSink>,
    ignore_patterns: Vec<String>,
}

impl HubState {
    /// Build the production stack from settings.
    pub fn new(settings: &HubSettings, events: Arc<dyn EventSink>) -> Result<Self> {
        let http = HttpTransport::new(
            &settings.hub.endpoint,
            Duration::from_secs(settings.hub.request_timeout_secs),
        )?;
        let mut state = Self::with_transport(
            Arc::new(http),
            settings.retry.to_policy(),
            &settings.hub.endpoint,
            events,
        );
        state.ignore_patterns = settings.upload.ignore_patterns.clone();
        Ok(state)
    }

    /// Build on top of an arbitrary bottom transport.
    pub fn with_transport(
        base: Arc<dyn Transport>,
        policy: RetryPolicy,
        web_base: &str,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let credentials = Arc::new(CredentialStore::new());
        let local = Arc::new(LocalStateIndex::new());

        let retrying = RetryTransport::new(base, policy).with_events(events.clone());
        let transport: Arc<dyn Transport> =
            Arc::new(AuthenticatedTransport::new(retrying, credentials.clone()));

        let branches = Arc::new(BranchResolver::new(transport.clone()));
        let trees = Arc::new(
            FileTreeCache::new(transport.clone(), branches.clone()).with_events(events.clone()),
        );

        Self {
            auth: Authenticator::new(transport.clone(), credentials.clone()),
            registry: RepoRegistry::new(
                transport.clone(),
                credentials.clone(),
                local.clone(),
                trees.clone(),
            ),
            collections: CollectionStore::new(transport.clone(), credentials.clone(), web_base),
            credentials,
            local,
            branches,
            trees,
            transport,
            gate: CommitGate::new(),
            events,
            ignore_patterns: crate::commit::default_ignore_patterns(),
        }
    }

    /// Start a staging session for `repo`.
    pub fn commit_builder(&self, repo: RepoKey) -> CommitBuilder {
        CommitBuilder::new(
            repo,
            self.transport.clone(),
            self.trees.clone(),
            self.gate.clone(),
        )
        .with_events(self.events.clone())
    }

    /// Folder-staging patterns from settings.
    pub fn ignore_patterns(&self) -> &[String] {
        &self.ignore_patterns
    }
}
