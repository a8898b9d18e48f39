//! Per-branch file listings, cached for the session.
//!
//! Entries are keyed by [`TreeKey`] and only ever replaced wholesale. Every
//! key carries a generation counter: [`FileTreeCache::invalidate`] bumps it,
//! and a fetch that started under an older generation returns its result to
//! its caller without storing it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use parking_lot::RwLock;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::branches::BranchResolver;
use crate::error::{HubError, Result};
use crate::events::{EventSink, HubEvent, NullSink};
use crate::hub::endpoints::{self, TreeEntryWire};
use crate::hub::{BranchRef, FileEntry, RepoKey, TreeKey};
use crate::transport::{fetch_all, HubStream, Transport};

/// Largest file that may be loaded into an in-memory editable form.
pub const MAX_EDITABLE_BYTES: u64 = 10 * 1024 * 1024;

/// Reject files too large for inline editing.
pub fn check_editable(entry: &FileEntry) -> Result<()> {
    if entry.size_bytes > MAX_EDITABLE_BYTES {
        return Err(HubError::FileTooLarge {
            path: entry.path.clone(),
            size: entry.size_bytes,
            limit: MAX_EDITABLE_BYTES,
        });
    }
    Ok(())
}

#[derive(Default)]
struct TreeState {
    trees: HashMap<TreeKey, Arc<Vec<FileEntry>>>,
    generations: HashMap<TreeKey, u64>,
}

pub struct FileTreeCache {
    transport: Arc<dyn Transport>,
    resolver: Arc<BranchResolver>,
    state: RwLock<TreeState>,
    events: Arc<dyn EventSink>,
}

impl FileTreeCache {
    pub fn new(transport: Arc<dyn Transport>, resolver: Arc<BranchResolver>) -> Self {
        Self {
            transport,
            resolver,
            state: RwLock::new(TreeState::default()),
            events: Arc::new(NullSink),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// File listing for one branch, from cache when present.
    pub async fn fetch(&self, key: &TreeKey) -> Result<Arc<Vec<FileEntry>>> {
        let generation = {
            let mut state = self.state.write();
            if let Some(entries) = state.trees.get(key) {
                tracing::debug!("Tree cache hit for {}", key);
                return Ok(entries.clone());
            }
            *state.generations.entry(key.clone()).or_insert(0)
        };

        tracing::debug!("Tree cache miss for {}, fetching", key);
        let wire: Vec<TreeEntryWire> = fetch_all(
            &*self.transport,
            endpoints::list_tree(&key.repo, &key.branch),
            None,
        )
        .await?;

        let mut entries: Vec<FileEntry> = wire
            .into_iter()
            .filter_map(TreeEntryWire::into_file_entry)
            .collect();
        entries.sort_by_key(|e| e.path.to_lowercase());
        let entries = Arc::new(entries);

        let mut state = self.state.write();
        if state.generations.get(key).copied().unwrap_or(0) == generation {
            state.trees.insert(key.clone(), entries.clone());
        } else {
            tracing::debug!("Tree for {} was invalidated mid-fetch, not caching", key);
        }
        Ok(entries)
    }

    /// [`fetch`](Self::fetch), abandoned with no side effect if `cancel` fires first.
    pub async fn fetch_cancellable(
        &self,
        key: &TreeKey,
        cancel: &CancellationToken,
    ) -> Result<Arc<Vec<FileEntry>>> {
        tokio::select! {
            _ = cancel.cancelled() => Err(HubError::Cancelled),
            result = self.fetch(key) => result,
        }
    }

    /// Listing of the repo's default branch.
    pub async fn fetch_default(&self, repo: &RepoKey) -> Result<(BranchRef, Arc<Vec<FileEntry>>)> {
        let branch = self.resolver.resolve_default(repo).await?;
        let entries = self.fetch(&TreeKey::new(repo.clone(), &branch.name)).await?;
        Ok((branch, entries))
    }

    /// Cached listing without touching the network.
    pub fn cached(&self, key: &TreeKey) -> Option<Arc<Vec<FileEntry>>> {
        self.state.read().trees.get(key).cloned()
    }

    /// Force the next fetch of `key` to round-trip.
    pub fn invalidate(&self, key: &TreeKey) {
        {
            let mut state = self.state.write();
            state.trees.remove(key);
            *state.generations.entry(key.clone()).or_insert(0) += 1;
        }
        tracing::debug!("Invalidated tree cache for {}", key);
        self.events.emit(HubEvent::CacheInvalidated {
            repo: key.repo.id.to_string(),
            branch: key.branch.clone(),
        });
    }

    /// Drop every branch of `repo`.
    pub fn invalidate_repo(&self, repo: &RepoKey) {
        let keys: Vec<TreeKey> = {
            let state = self.state.read();
            state
                .generations
                .keys()
                .filter(|k| k.repo == *repo)
                .cloned()
                .collect()
        };
        for key in keys {
            self.invalidate(&key);
        }
    }

    /// Load a file's text for inline editing.
    ///
    /// Files above [`MAX_EDITABLE_BYTES`] fail with `FileTooLarge` before any
    /// content is requested. Invalid UTF-8 is replaced, not rejected.
    pub async fn read_for_edit(&self, key: &TreeKey, path: &str) -> Result<String> {
        let entries = self.fetch(key).await?;
        let entry = entries
            .iter()
            .find(|e| e.path == path)
            .ok_or_else(|| HubError::NotFound(format!("{} in {}", path, key)))?;
        check_editable(entry)?;

        let response = self
            .transport
            .execute(endpoints::resolve_file(&key.repo, &key.branch, path))
            .await?;
        Ok(String::from_utf8_lossy(&response.body).into_owned())
    }

    /// Stream a file's content into `sink`. Returns the number of bytes written.
    pub async fn download<W>(&self, key: &TreeKey, path: &str, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let stream = self.open_content(key, path).await?;
        self.write_stream(path, stream, sink).await
    }

    /// Download into a new file at `destination`.
    ///
    /// The file is only created once the hub has answered, and removed again
    /// if the transfer breaks off.
    pub async fn download_to(&self, key: &TreeKey, path: &str, destination: &Path) -> Result<u64> {
        let stream = self.open_content(key, path).await?;
        let mut file = tokio::fs::File::create(destination).await?;
        match self.write_stream(path, stream, &mut file).await {
            Ok(written) => Ok(written),
            Err(e) => {
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(destination).await {
                    tracing::warn!(
                        "Failed to remove partial download {}: {}",
                        destination.display(),
                        cleanup
                    );
                }
                Err(e)
            }
        }
    }

    async fn open_content(&self, key: &TreeKey, path: &str) -> Result<HubStream> {
        let stream = self
            .transport
            .execute_stream(endpoints::resolve_file(&key.repo, &key.branch, path))
            .await?;
        tracing::debug!(
            "Downloading {} from {} ({:?} bytes announced)",
            path,
            key,
            stream.content_length
        );
        Ok(stream)
    }

    /// Copy chunks into `sink` as they arrive, reporting every tenth of the total.
    async fn write_stream<W>(&self, path: &str, mut stream: HubStream, sink: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let total = stream.content_length;
        let step = total.map(|t| (t / 10).max(1)).unwrap_or(u64::MAX);
        let mut downloaded: u64 = 0;
        let mut reported: u64 = 0;

        while let Some(chunk) = stream.body.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if downloaded >= reported.saturating_add(step) {
                reported = downloaded;
                self.report_progress(path, downloaded, total);
            }
        }
        sink.flush().await?;

        if reported != downloaded || downloaded == 0 {
            self.report_progress(path, downloaded, total);
        }
        Ok(downloaded)
    }

    fn report_progress(&self, path: &str, downloaded: u64, total: Option<u64>) {
        self.events.emit(HubEvent::DownloadProgress {
            path: path.to_string(),
            downloaded,
            total,
        });
    }
}
