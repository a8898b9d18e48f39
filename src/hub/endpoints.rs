//! Request builders and response shapes for the hub's REST routes.
//!
//! This is the only place that knows route layouts and JSON field names.
//! Components build requests here and convert the wire structs into domain
//! types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::types::{
    BranchRef, FileEntry, Identity, RepoDescriptor, RepoId, RepoKey, RepoKind, Visibility,
};
use crate::transport::HubRequest;

/// Percent-encode one path segment (revisions may contain `/`).
pub fn encode_segment(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Encode a repo path segment by segment, keeping the separators.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn repo_api(repo: &RepoKey) -> String {
    format!("/api/{}/{}", repo.kind.api_segment(), repo.id)
}

/// Split `namespace/name` into the `{name, organization}` pair the create and
/// delete routes expect.
fn name_and_org(repo: &RepoKey) -> Value {
    json!({
        "name": repo.id.name(),
        "organization": repo.id.namespace(),
        "type": repo.kind.as_str(),
    })
}

// ----------------------------------------------------------------------------
// Requests
// ----------------------------------------------------------------------------

pub fn whoami() -> HubRequest {
    HubRequest::get("/api/whoami-v2")
}

pub fn list_repos(
    kind: RepoKind,
    author: Option<&str>,
    search: Option<&str>,
    sort: &str,
    limit: Option<usize>,
) -> HubRequest {
    let mut request = HubRequest::get(format!("/api/{}", kind.api_segment()))
        .query("sort", sort)
        .query("direction", -1);
    if let Some(limit) = limit {
        request = request.query("limit", limit);
    }
    if let Some(author) = author {
        request = request.query("author", author);
    }
    if let Some(search) = search {
        request = request.query("search", search);
    }
    request
}

pub fn repo_info(repo: &RepoKey) -> HubRequest {
    HubRequest::get(repo_api(repo))
}

pub fn create_repo(repo: &RepoKey, visibility: Visibility) -> HubRequest {
    let mut body = name_and_org(repo);
    body["private"] = json!(visibility.is_private());
    HubRequest::post("/api/repos/create").json(body)
}

pub fn delete_repo(repo: &RepoKey) -> HubRequest {
    HubRequest::delete("/api/repos/delete").json(name_and_org(repo))
}

pub fn update_visibility(repo: &RepoKey, visibility: Visibility) -> HubRequest {
    HubRequest::put(format!("{}/settings", repo_api(repo)))
        .json(json!({ "private": visibility.is_private() }))
}

pub fn list_refs(repo: &RepoKey) -> HubRequest {
    HubRequest::get(format!("{}/refs", repo_api(repo)))
}

pub fn list_tree(repo: &RepoKey, revision: &str) -> HubRequest {
    HubRequest::get(format!("{}/tree/{}", repo_api(repo), encode_segment(revision)))
        .query("recursive", true)
        .query("expand", true)
}

pub fn resolve_file(repo: &RepoKey, revision: &str, path: &str) -> HubRequest {
    HubRequest::get(format!(
        "/{}{}/resolve/{}/{}",
        repo.kind.url_prefix(),
        repo.id,
        encode_segment(revision),
        encode_path(path)
    ))
}

/// Ask the hub which files must go through large-object storage.
pub fn preupload(repo: &RepoKey, revision: &str, files: Vec<Value>) -> HubRequest {
    HubRequest::post(format!(
        "{}/preupload/{}",
        repo_api(repo),
        encode_segment(revision)
    ))
    .json(json!({ "files": files }))
}

/// Request upload actions for a batch of sha256-addressed objects.
pub fn lfs_batch(repo: &RepoKey, objects: Vec<Value>) -> HubRequest {
    HubRequest::post(format!(
        "/{}{}.git/info/lfs/objects/batch",
        repo.kind.url_prefix(),
        repo.id
    ))
    .header("Accept", "application/vnd.git-lfs+json")
    .json(json!({
        "operation": "upload",
        "transfers": ["basic"],
        "objects": objects,
        "hash_algo": "sha256",
    }))
}

pub fn commit(repo: &RepoKey, revision: &str, lines: Vec<Value>) -> HubRequest {
    HubRequest::post(format!(
        "{}/commit/{}",
        repo_api(repo),
        encode_segment(revision)
    ))
    .ndjson(lines)
}

pub fn list_collections(owner: &str) -> HubRequest {
    HubRequest::get("/api/collections").query("owner", owner)
}

pub fn get_collection(slug: &str) -> HubRequest {
    HubRequest::get(format!("/api/collections/{}", slug))
}

pub fn create_collection(
    title: &str,
    namespace: &str,
    description: &str,
    visibility: Visibility,
) -> HubRequest {
    HubRequest::post("/api/collections").json(json!({
        "title": title,
        "namespace": namespace,
        "description": description,
        "private": visibility.is_private(),
    }))
}

pub fn update_collection(slug: &str, patch: Value) -> HubRequest {
    HubRequest::patch(format!("/api/collections/{}", slug)).json(patch)
}

pub fn delete_collection(slug: &str) -> HubRequest {
    HubRequest::delete(format!("/api/collections/{}", slug))
}

pub fn add_collection_item(slug: &str, item_type: &str, item_id: &str, note: Option<&str>) -> HubRequest {
    let mut body = json!({ "item": { "type": item_type, "id": item_id } });
    if let Some(note) = note {
        body["note"] = json!(note);
    }
    HubRequest::post(format!("/api/collections/{}/items", slug)).json(body)
}

pub fn delete_collection_item(slug: &str, item_object_id: &str) -> HubRequest {
    HubRequest::delete(format!("/api/collections/{}/items/{}", slug, item_object_id))
}

// ----------------------------------------------------------------------------
// Responses
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhoAmIWire {
    pub name: String,
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub orgs: Vec<NamedWire>,
}

#[derive(Debug, Deserialize)]
pub struct NamedWire {
    #[serde(default)]
    pub name: String,
}

impl From<WhoAmIWire> for Identity {
    fn from(wire: WhoAmIWire) -> Self {
        Identity {
            username: wire.name,
            fullname: wire.fullname.unwrap_or_default(),
            email: wire.email.unwrap_or_default(),
            avatar_url: wire.avatar_url.unwrap_or_default(),
            orgs: wire.orgs.into_iter().map(|o| o.name).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoWire {
    pub id: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub downloads: Option<u64>,
    #[serde(default)]
    pub likes: Option<u64>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RepoWire {
    pub fn into_descriptor(self, kind: RepoKind) -> crate::error::Result<RepoDescriptor> {
        Ok(RepoDescriptor {
            id: RepoId::parse(&self.id)?,
            kind,
            visibility: Visibility::from_private(self.private),
            downloads: self.downloads.unwrap_or(0),
            likes: self.likes.unwrap_or(0),
            last_modified: self.last_modified,
            is_favorite: false,
            sha: self.sha,
            tags: self.tags,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefWire {
    pub name: String,
    #[serde(default)]
    pub target_commit: String,
    #[serde(default)]
    pub is_default: Option<bool>,
}

impl From<RefWire> for BranchRef {
    fn from(wire: RefWire) -> Self {
        BranchRef {
            name: wire.name,
            is_default: wire.is_default.unwrap_or(false),
            head_commit_id: wire.target_commit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefsWire {
    #[serde(default)]
    pub branches: Vec<RefWire>,
    #[serde(default)]
    pub tags: Vec<RefWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeEntryWire {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub lfs: Option<LfsPointerWire>,
    #[serde(default)]
    pub last_commit: Option<LastCommitWire>,
}

#[derive(Debug, Deserialize)]
pub struct LfsPointerWire {
    #[serde(default)]
    pub oid: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Deserialize)]
pub struct LastCommitWire {
    pub id: String,
}

impl TreeEntryWire {
    /// Directories have no [`FileEntry`].
    pub fn into_file_entry(self) -> Option<FileEntry> {
        if self.entry_type != "file" {
            return None;
        }
        let size_bytes = match &self.lfs {
            Some(lfs) if lfs.size > 0 => lfs.size,
            _ => self.size,
        };
        Some(FileEntry {
            path: self.path,
            size_bytes,
            is_lfs: self.lfs.is_some(),
            last_commit_id: self.last_commit.map(|c| c.id),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PreuploadWire {
    #[serde(default)]
    pub files: Vec<PreuploadFileWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreuploadFileWire {
    pub path: String,
    pub upload_mode: String,
}

#[derive(Debug, Deserialize)]
pub struct LfsBatchWire {
    #[serde(default)]
    pub objects: Vec<LfsObjectWire>,
}

#[derive(Debug, Deserialize)]
pub struct LfsObjectWire {
    pub oid: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub actions: Option<LfsActionsWire>,
    #[serde(default)]
    pub error: Option<LfsErrorWire>,
}

#[derive(Debug, Deserialize)]
pub struct LfsActionsWire {
    #[serde(default)]
    pub upload: Option<LfsActionWire>,
    #[serde(default)]
    pub verify: Option<LfsActionWire>,
}

#[derive(Debug, Deserialize)]
pub struct LfsActionWire {
    pub href: String,
    #[serde(default)]
    pub header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct LfsErrorWire {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitWire {
    pub commit_oid: String,
    #[serde(default)]
    pub commit_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CollectionWire {
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Either a bare name or an object with a `name` field.
    #[serde(default)]
    pub owner: Option<Value>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub items: Vec<CollectionItemWire>,
}

impl CollectionWire {
    pub fn owner_name(&self) -> String {
        match &self.owner {
            Some(Value::String(name)) => name.clone(),
            Some(Value::Object(map)) => map
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            _ => self
                .slug
                .split_once('/')
                .map(|(owner, _)| owner.to_string())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CollectionItemWire {
    #[serde(rename = "_id")]
    pub object_id: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub id: String,
    #[serde(default)]
    pub note: Option<NoteWire>,
    #[serde(default)]
    pub position: u32,
}

#[derive(Debug, Deserialize)]
pub struct NoteWire {
    #[serde(default)]
    pub text: String,
}
