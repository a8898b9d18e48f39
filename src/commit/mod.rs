//! Atomic multi-file commits.
//!
//! A [`CommitBuilder`] is one staging session against one repository:
//!
//! ```text
//! Empty --stage--> Staged --submit--> Submitting --+--> Committed
//!                    ^                             |
//!                    +------ (resubmit) <-- Failed-+
//! ```
//!
//! Staging is purely local. Submission is serialized per `(repo, branch)` by a
//! shared [`CommitGate`]; a second submit on a key that is already submitting
//! fails with `Busy`.

pub mod folder;
pub mod ops;
pub(crate) mod upload;

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{HubError, Result};
use crate::events::{EventSink, HubEvent, NullSink};
use crate::file_tree::FileTreeCache;
use crate::hub::endpoints::{self, CommitWire};
use crate::hub::{RepoKey, TreeKey};
use crate::transport::Transport;

pub use folder::{collect_folder, default_ignore_patterns, DEFAULT_IGNORE_PATTERNS};
pub use ops::{FileSource, PendingOperation, StagedSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    Empty,
    Staged,
    Submitting,
    Committed,
    Failed,
}

/// An accepted commit. Immutable.
#[derive(Debug, Clone)]
pub struct Commit {
    pub repo: RepoKey,
    pub branch: String,
    pub message: String,
    pub description: Option<String>,
    pub operations: Vec<PendingOperation>,
    pub commit_id: String,
    pub commit_url: Option<String>,
}

/// Keys with a commit in flight, shared by every builder of a session.
#[derive(Debug, Clone, Default)]
pub struct CommitGate {
    active: Arc<DashMap<TreeKey, ()>>,
}

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or fail with `Busy` if a commit already holds it.
    pub fn try_acquire(&self, key: &TreeKey) -> Result<GateGuard> {
        match self.active.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(HubError::Busy {
                repo: key.repo.id.to_string(),
                branch: key.branch.clone(),
            }),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(());
                Ok(GateGuard {
                    active: self.active.clone(),
                    key: key.clone(),
                })
            }
        }
    }

    pub fn is_busy(&self, key: &TreeKey) -> bool {
        self.active.contains_key(key)
    }
}

/// Releases its key on drop.
#[derive(Debug)]
pub struct GateGuard {
    active: Arc<DashMap<TreeKey, ()>>,
    key: TreeKey,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.active.remove(&self.key);
    }
}

pub struct CommitBuilder {
    repo: RepoKey,
    transport: Arc<dyn Transport>,
    trees: Arc<FileTreeCache>,
    gate: CommitGate,
    events: Arc<dyn EventSink>,
    staged: StagedSet,
    state: CommitState,
    cancel: CancellationToken,
}

impl CommitBuilder {
    pub fn new(
        repo: RepoKey,
        transport: Arc<dyn Transport>,
        trees: Arc<FileTreeCache>,
        gate: CommitGate,
    ) -> Self {
        Self {
            repo,
            transport,
            trees,
            gate,
            events: Arc::new(NullSink),
            staged: StagedSet::new(),
            state: CommitState::Empty,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn repo(&self) -> &RepoKey {
        &self.repo
    }

    pub fn state(&self) -> CommitState {
        self.state
    }

    /// Cancelling this token before submission makes `submit` fail with
    /// `Cancelled` without touching the network.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Staged operations in commit order.
    pub fn operations(&self) -> Vec<PendingOperation> {
        self.staged.operations()
    }

    /// Stage one operation, superseding any earlier one on the same path.
    pub fn stage(&mut self, op: PendingOperation) -> Result<()> {
        self.ensure_editable()?;
        let op = ops::validate(op)?;
        tracing::debug!("Staged {} {}", op.verb(), op.path());
        self.staged.stage(op);
        self.sync_state();
        Ok(())
    }

    pub fn add(&mut self, path: &str, source: impl Into<FileSource>) -> Result<()> {
        self.stage(PendingOperation::add(path, source))
    }

    pub fn update(&mut self, path: &str, source: impl Into<FileSource>) -> Result<()> {
        self.stage(PendingOperation::update(path, source))
    }

    pub fn delete(&mut self, path: &str) -> Result<()> {
        self.stage(PendingOperation::delete(path))
    }

    /// Stage every file under `local_dir` as an add beneath `path_in_repo`.
    /// Returns how many files were staged.
    pub fn stage_folder(
        &mut self,
        local_dir: &Path,
        path_in_repo: &str,
        ignore_patterns: &[String],
    ) -> Result<usize> {
        self.ensure_editable()?;
        let files = collect_folder(local_dir, path_in_repo, ignore_patterns)?;
        let count = files.len();
        for (repo_path, local_path) in files {
            self.stage(PendingOperation::add(repo_path, local_path))?;
        }
        tracing::debug!("Staged {} files from {}", count, local_dir.display());
        Ok(count)
    }

    pub fn unstage(&mut self, path: &str) -> Result<Option<PendingOperation>> {
        self.ensure_editable()?;
        let removed = self.staged.unstage(path);
        self.sync_state();
        Ok(removed)
    }

    /// Drop everything staged. Nothing was sent, so nothing is undone remotely.
    pub fn abandon(&mut self) -> Result<()> {
        self.ensure_editable()?;
        self.staged.clear();
        self.sync_state();
        Ok(())
    }

    pub async fn submit(&mut self, message: &str, branch: &str) -> Result<Commit> {
        self.submit_with_description(message, None, branch).await
    }

    /// Send every staged operation as one commit on `branch`.
    ///
    /// Validation failures leave the session untouched and make no call.
    /// A remote failure moves the session to `Failed`; the operations stay
    /// inspectable and a fresh `submit` retries them all.
    pub async fn submit_with_description(
        &mut self,
        message: &str,
        description: Option<&str>,
        branch: &str,
    ) -> Result<Commit> {
        match self.state {
            CommitState::Submitting | CommitState::Committed => {
                return Err(HubError::Validation(
                    "This session was already submitted".to_string(),
                ))
            }
            CommitState::Empty => {
                return Err(HubError::Validation("Nothing staged to commit".to_string()))
            }
            CommitState::Staged | CommitState::Failed => {}
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(HubError::Validation("Commit message is empty".to_string()));
        }
        let branch = branch.trim();
        if branch.is_empty() {
            return Err(HubError::Validation("Branch name is empty".to_string()));
        }

        let operations = self.staged.operations();
        let prepared = upload::materialize(&operations).await?;
        if self.cancel.is_cancelled() {
            return Err(HubError::Cancelled);
        }

        let key = TreeKey::new(self.repo.clone(), branch);
        let _guard = self.gate.try_acquire(&key)?;
        self.state = CommitState::Submitting;
        self.events.emit(HubEvent::CommitStarted {
            repo: self.repo.id.to_string(),
            branch: branch.to_string(),
            operations: operations.len(),
        });

        match self.push(&key, message, description, &prepared).await {
            Ok(wire) => {
                self.state = CommitState::Committed;
                self.trees.invalidate(&key);
                tracing::info!(
                    "Committed {} operations to {} ({})",
                    operations.len(),
                    key,
                    wire.commit_oid
                );
                self.events.emit(HubEvent::CommitCompleted {
                    repo: self.repo.id.to_string(),
                    branch: branch.to_string(),
                    commit_id: wire.commit_oid.clone(),
                });
                Ok(Commit {
                    repo: self.repo.clone(),
                    branch: branch.to_string(),
                    message: message.to_string(),
                    description: description.map(str::to_string),
                    operations,
                    commit_id: wire.commit_oid,
                    commit_url: wire.commit_url,
                })
            }
            Err(e) => {
                self.state = CommitState::Failed;
                tracing::warn!("Commit to {} failed: {}", key, e);
                self.events.emit(HubEvent::CommitFailed {
                    repo: self.repo.id.to_string(),
                    branch: branch.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn push(
        &self,
        key: &TreeKey,
        message: &str,
        description: Option<&str>,
        prepared: &[upload::Prepared],
    ) -> Result<CommitWire> {
        let lfs = upload::lfs_paths(&*self.transport, &key.repo, &key.branch, prepared).await?;

        upload::upload_lfs(&self.transport, &self.events, &key.repo, prepared, &lfs).await?;

        let lines = upload::commit_lines(message, description, prepared, &lfs).await?;
        let response = self
            .transport
            .execute(endpoints::commit(&key.repo, &key.branch, lines))
            .await?;
        let wire: CommitWire = response.json()?;
        if wire.commit_oid.is_empty() {
            return Err(HubError::InconsistentState(
                "Hub accepted the commit but returned no commit id".to_string(),
            ));
        }
        Ok(wire)
    }

    fn ensure_editable(&self) -> Result<()> {
        match self.state {
            CommitState::Empty | CommitState::Staged => Ok(()),
            CommitState::Submitting => Err(HubError::Validation(
                "Cannot change a session while it is submitting".to_string(),
            )),
            CommitState::Committed | CommitState::Failed => Err(HubError::Validation(
                "This session is finished; start a new one".to_string(),
            )),
        }
    }

    fn sync_state(&mut self) {
        self.state = if self.staged.is_empty() {
            CommitState::Empty
        } else {
            CommitState::Staged
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::branches::BranchResolver;
    use crate::events::RecordingSink;
    use crate::hub::{RepoId, RepoKind};
    use crate::transport::fake::{logged_in, FakeHub};
    use crate::transport::TransportError;
    use reqwest::Method;

    struct Fixture {
        hub: Arc<FakeHub>,
        transport: Arc<dyn Transport>,
        trees: Arc<FileTreeCache>,
        gate: CommitGate,
    }

    impl Fixture {
        fn new() -> Self {
            let hub = Arc::new(FakeHub::new("alice", "t"));
            hub.add_repo("model", "alice/demo", &[("old.txt", b"old")]);
            let transport = logged_in(&hub);
            let resolver = Arc::new(BranchResolver::new(transport.clone()));
            let trees = Arc::new(FileTreeCache::new(transport.clone(), resolver));
            Self {
                hub,
                transport,
                trees,
                gate: CommitGate::new(),
            }
        }

        fn builder(&self) -> CommitBuilder {
            CommitBuilder::new(
                repo(),
                self.transport.clone(),
                self.trees.clone(),
                self.gate.clone(),
            )
        }
    }

    fn repo() -> RepoKey {
        RepoKey::new(RepoKind::Model, RepoId::parse("alice/demo").unwrap())
    }

    fn main_key() -> TreeKey {
        TreeKey::new(repo(), "main")
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let f = Fixture::new();
        let mut builder = f.builder();
        assert_eq!(builder.state(), CommitState::Empty);

        builder.add("a.txt", "a").unwrap();
        assert_eq!(builder.state(), CommitState::Staged);
        builder.unstage("a.txt").unwrap();
        assert_eq!(builder.state(), CommitState::Empty);

        builder.add("a.txt", "a").unwrap();
        builder.submit("add a", "main").await.unwrap();
        assert_eq!(builder.state(), CommitState::Committed);
        assert!(builder.add("b.txt", "b").is_err());
    }

    #[tokio::test]
    async fn test_validation_makes_no_calls() {
        let f = Fixture::new();
        let mut builder = f.builder();

        let err = builder.submit("msg", "main").await.unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));

        builder.add("a.txt", "a").unwrap();
        let err = builder.submit("   ", "main").await.unwrap_err();
        assert!(matches!(err, HubError::Validation(_)));
        assert_eq!(builder.state(), CommitState::Staged);

        assert!(builder.add("../escape", "x").is_err());
        assert_eq!(f.hub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mixed_commit_applies_everything() {
        let f = Fixture::new();
        f.trees.fetch(&main_key()).await.unwrap();

        let mut builder = f.builder();
        builder.add("new.txt", "new").unwrap();
        builder.delete("old.txt").unwrap();
        let commit = builder
            .submit_with_description("swap files", Some("longer text"), "main")
            .await
            .unwrap();

        assert_eq!(commit.operations.len(), 2);
        assert!(!commit.commit_id.is_empty());
        assert_eq!(commit.description.as_deref(), Some("longer text"));

        // The cached tree was dropped, so this round-trips.
        let entries = f.trees.fetch(&main_key()).await.unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["new.txt"]);
        assert_eq!(f.hub.count(Method::GET, "/tree/"), 2);
    }

    #[tokio::test]
    async fn test_large_files_go_through_lfs() {
        let f = Fixture::new();
        let sink = Arc::new(RecordingSink::new());
        let mut builder = f.builder().with_events(sink.clone());

        let big = vec![7u8; 4096];
        builder.add("weights.bin", big.clone()).unwrap();
        builder.add("config.json", "{}").unwrap();
        builder.submit("add weights", "main").await.unwrap();

        assert_eq!(f.hub.count(Method::PUT, "/upload/"), 1);
        assert_eq!(f.hub.count(Method::POST, "/verify"), 1);
        assert_eq!(
            f.hub.file_content("model", "alice/demo", "main", "weights.bin"),
            Some(big)
        );
        let entries = f.trees.fetch(&main_key()).await.unwrap();
        let weights = entries.iter().find(|e| e.path == "weights.bin").unwrap();
        assert!(weights.is_lfs);
        assert_eq!(weights.size_bytes, 4096);

        assert!(sink
            .events()
            .iter()
            .any(|e| matches!(e, HubEvent::LfsUploadCompleted { size: 4096, .. })));
    }

    #[tokio::test]
    async fn test_local_large_file_is_streamed_from_disk() {
        let f = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.bin");
        let big: Vec<u8> = (0..8192u32).map(|i| (i % 241) as u8).collect();
        std::fs::write(&path, &big).unwrap();

        let mut builder = f.builder();
        builder.add("weights.bin", path.clone()).unwrap();
        builder.submit("add weights", "main").await.unwrap();

        let put = f
            .hub
            .calls()
            .into_iter()
            .find(|r| r.method == Method::PUT && r.path().contains("/upload/"))
            .unwrap();
        assert_eq!(put.body, crate::transport::RequestBody::File(path));
        assert_eq!(
            f.hub.file_content("model", "alice/demo", "main", "weights.bin"),
            Some(big)
        );
    }

    #[tokio::test]
    async fn test_already_stored_lfs_object_is_not_reuploaded() {
        let f = Fixture::new();
        let big = vec![1u8; 2048];

        let mut first = f.builder();
        first.add("a.bin", big.clone()).unwrap();
        first.submit("first", "main").await.unwrap();

        let mut second = f.builder();
        second.add("b.bin", big).unwrap();
        second.submit("second", "main").await.unwrap();

        assert_eq!(f.hub.count(Method::PUT, "/upload/"), 1);
    }

    #[tokio::test]
    async fn test_failure_then_resubmit() {
        let f = Fixture::new();
        let mut builder = f.builder();
        builder.delete("missing.txt").unwrap();

        let err = builder.submit("remove", "main").await.unwrap_err();
        assert!(matches!(err, HubError::NotFound(_)));
        assert_eq!(builder.state(), CommitState::Failed);
        assert_eq!(builder.operations().len(), 1);
        assert!(builder.add("x.txt", "x").is_err());

        // A transient failure the first time, then a clean resubmission.
        let mut builder = f.builder();
        builder.add("x.txt", "x").unwrap();
        f.hub.inject([TransportError::from_status(400, "bad")]);
        assert!(builder.submit("add x", "main").await.is_err());
        let commit = builder.submit("add x", "main").await.unwrap();
        assert_eq!(builder.state(), CommitState::Committed);
        assert!(!commit.commit_id.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_submit() {
        let f = Fixture::new();
        let mut builder = f.builder();
        builder.add("a.txt", "a").unwrap();
        builder.cancel_token().cancel();

        let err = builder.submit("msg", "main").await.unwrap_err();
        assert!(matches!(err, HubError::Cancelled));
        assert_eq!(f.hub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_gate_rejects_second_holder() {
        let gate = CommitGate::new();
        let key = main_key();
        let guard = gate.try_acquire(&key).unwrap();
        assert!(matches!(gate.try_acquire(&key), Err(HubError::Busy { .. })));
        assert!(gate.try_acquire(&TreeKey::new(repo(), "dev")).is_ok());

        drop(guard);
        assert!(!gate.is_busy(&key));
        assert!(gate.try_acquire(&key).is_ok());
    }

    #[tokio::test]
    async fn test_events_for_commit() {
        let f = Fixture::new();
        let sink = Arc::new(RecordingSink::new());
        let mut builder = f.builder().with_events(sink.clone());
        builder.add("a.txt", "a").unwrap();
        builder.submit("msg", "main").await.unwrap();

        let events = sink.events();
        assert!(matches!(events.first(), Some(HubEvent::CommitStarted { operations: 1, .. })));
        assert!(matches!(events.last(), Some(HubEvent::CommitCompleted { .. })));
    }

    #[tokio::test]
    async fn test_stage_folder() {
        let f = Fixture::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::write(dir.path().join("b.pyc"), "b").unwrap();

        let mut builder = f.builder();
        let staged = builder
            .stage_folder(dir.path(), "data", &default_ignore_patterns())
            .unwrap();
        assert_eq!(staged, 1);
        builder.submit("upload folder", "main").await.unwrap();
        assert_eq!(
            f.hub.file_content("model", "alice/demo", "main", "data/a.txt"),
            Some(b"a".to_vec())
        );
    }
}
