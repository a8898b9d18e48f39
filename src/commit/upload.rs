//! Wire side of a commit: large-object routing, uploads, and the NDJSON body.

use std::collections::HashSet;
use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;
use futures::future::try_join_all;
use reqwest::Method;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use tokio::io::AsyncReadExt;

use crate::error::{HubError, Result};
use crate::events::{EventSink, HubEvent};
use crate::hub::endpoints::{self, LfsBatchWire, LfsObjectWire, PreuploadWire};
use crate::hub::RepoKey;
use crate::transport::{HubRequest, RequestBody, Transport};

use super::ops::{FileSource, PendingOperation};

/// Bytes of each file sent to the hub so it can sniff the content type.
const SAMPLE_BYTES: usize = 512;

/// Read buffer for hashing local files.
const HASH_CHUNK: usize = 64 * 1024;

/// What the hub needs to know about one file before it is sent.
#[derive(Debug, Clone)]
pub(crate) struct Content {
    pub source: FileSource,
    pub size: u64,
    /// Hex sha256, the large-object id.
    pub oid: String,
    pub sample: Bytes,
}

impl Content {
    /// Upload body. Local files are streamed from disk, not loaded.
    fn body(&self) -> RequestBody {
        match &self.source {
            FileSource::Bytes(data) => RequestBody::Bytes(data.clone()),
            FileSource::Local(path) => RequestBody::File(path.clone()),
        }
    }
}

/// An operation with its content described.
#[derive(Debug, Clone)]
pub(crate) struct Prepared {
    pub path: String,
    /// `None` for deletions.
    pub content: Option<Content>,
}

pub(crate) async fn materialize(ops: &[PendingOperation]) -> Result<Vec<Prepared>> {
    let mut prepared = Vec::with_capacity(ops.len());
    for op in ops {
        let content = match op.source() {
            Some(source) => Some(describe(source).await?),
            None => None,
        };
        prepared.push(Prepared {
            path: op.path().to_string(),
            content,
        });
    }
    Ok(prepared)
}

/// Size, hash and sample of `source`. Local files are read once, in chunks.
pub(crate) async fn describe(source: &FileSource) -> Result<Content> {
    let path = match source {
        FileSource::Bytes(data) => {
            return Ok(Content {
                source: source.clone(),
                size: data.len() as u64,
                oid: sha256_hex(data),
                sample: data.slice(..data.len().min(SAMPLE_BYTES)),
            })
        }
        FileSource::Local(path) => path,
    };

    let unreadable = |e: std::io::Error| {
        HubError::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    };
    let mut file = tokio::fs::File::open(path).await.map_err(unreadable)?;
    let mut hasher = Sha256::new();
    let mut sample = Vec::with_capacity(SAMPLE_BYTES);
    let mut size: u64 = 0;
    let mut buf = vec![0u8; HASH_CHUNK];
    loop {
        let read = file.read(&mut buf).await.map_err(unreadable)?;
        if read == 0 {
            break;
        }
        let chunk = &buf[..read];
        hasher.update(chunk);
        if sample.len() < SAMPLE_BYTES {
            let take = (SAMPLE_BYTES - sample.len()).min(read);
            sample.extend_from_slice(&chunk[..take]);
        }
        size += read as u64;
    }

    Ok(Content {
        source: source.clone(),
        size,
        oid: hex::encode(hasher.finalize()),
        sample: Bytes::from(sample),
    })
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Ask the hub which of the files must travel through large-object storage.
pub(crate) async fn lfs_paths(
    transport: &dyn Transport,
    repo: &RepoKey,
    branch: &str,
    files: &[Prepared],
) -> Result<HashSet<String>> {
    let descriptors: Vec<Value> = files
        .iter()
        .filter_map(|f| f.content.as_ref().map(|c| (f, c)))
        .map(|(f, content)| {
            json!({
                "path": f.path,
                "size": content.size,
                "sample": base64::engine::general_purpose::STANDARD.encode(&content.sample),
            })
        })
        .collect();
    if descriptors.is_empty() {
        return Ok(HashSet::new());
    }

    let response = transport
        .execute(endpoints::preupload(repo, branch, descriptors))
        .await?;
    let wire: PreuploadWire = response.json()?;
    Ok(wire
        .files
        .into_iter()
        .filter(|f| f.upload_mode == "lfs")
        .map(|f| f.path)
        .collect())
}

/// Upload every large object the hub does not already hold.
pub(crate) async fn upload_lfs(
    transport: &Arc<dyn Transport>,
    events: &Arc<dyn EventSink>,
    repo: &RepoKey,
    files: &[Prepared],
    lfs: &HashSet<String>,
) -> Result<()> {
    let objects: Vec<(&str, &Content)> = files
        .iter()
        .filter(|f| lfs.contains(&f.path))
        .filter_map(|f| Some((f.path.as_str(), f.content.as_ref()?)))
        .collect();
    if objects.is_empty() {
        return Ok(());
    }

    let batch: Vec<Value> = objects
        .iter()
        .map(|(_, content)| json!({ "oid": content.oid, "size": content.size }))
        .collect();
    let response = transport.execute(endpoints::lfs_batch(repo, batch)).await?;
    let wire: LfsBatchWire = response.json()?;

    let uploads = wire.objects.into_iter().filter_map(|object| {
        let (path, content) = objects.iter().find(|(_, c)| c.oid == object.oid)?;
        Some(upload_object(
            transport.clone(),
            events.clone(),
            path.to_string(),
            (*content).clone(),
            object,
        ))
    });
    try_join_all(uploads).await?;
    Ok(())
}

async fn upload_object(
    transport: Arc<dyn Transport>,
    events: Arc<dyn EventSink>,
    path: String,
    content: Content,
    object: LfsObjectWire,
) -> Result<()> {
    if let Some(error) = object.error {
        return Err(HubError::Rejected {
            status: error.code,
            message: format!("{}: {}", path, error.message),
        });
    }
    let Some(actions) = object.actions else {
        tracing::debug!("{} already stored on the hub", path);
        return Ok(());
    };

    let size = content.size;
    if let Some(upload) = actions.upload {
        let mut request = HubRequest::absolute(Method::PUT, upload.href).body(content.body());
        for (key, value) in upload.header {
            request = request.header(&key, value);
        }
        transport.execute(request).await?;
    }
    if let Some(verify) = actions.verify {
        let mut request = HubRequest::absolute(Method::POST, verify.href)
            .json(json!({ "oid": object.oid, "size": size }));
        for (key, value) in verify.header {
            request = request.header(&key, value);
        }
        transport.execute(request).await?;
    }

    tracing::debug!("Uploaded large object for {} ({} bytes)", path, size);
    events.emit(HubEvent::LfsUploadCompleted { path, size });
    Ok(())
}

/// Build the NDJSON commit body. Only small files are loaded, to be inlined.
pub(crate) async fn commit_lines(
    summary: &str,
    description: Option<&str>,
    files: &[Prepared],
    lfs: &HashSet<String>,
) -> Result<Vec<Value>> {
    let mut lines = vec![json!({
        "key": "header",
        "value": {
            "summary": summary,
            "description": description.unwrap_or_default(),
        }
    })];

    for file in files {
        let line = match &file.content {
            None => json!({
                "key": "deletedFile",
                "value": { "path": file.path }
            }),
            Some(content) if lfs.contains(&file.path) => json!({
                "key": "lfsFile",
                "value": {
                    "path": file.path,
                    "algo": "sha256",
                    "oid": content.oid,
                    "size": content.size,
                }
            }),
            Some(content) => {
                let data = content.source.load().await?;
                json!({
                    "key": "file",
                    "value": {
                        "path": file.path,
                        "content": base64::engine::general_purpose::STANDARD.encode(&data),
                        "encoding": "base64",
                    }
                })
            }
        };
        lines.push(line);
    }
    Ok(lines)
}
