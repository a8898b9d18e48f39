//! In-process stand-ins for the remote hub.
//!
//! `ScriptedTransport` replays a fixed failure script; `FakeHub` keeps enough
//! repository, branch, file and collection state to answer every route the
//! core uses.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::{json, Value};

use crate::auth::{AuthenticatedTransport, Credential, CredentialStore};
use crate::commit::upload::sha256_hex;
use crate::hub::Identity;

use super::{HubRequest, HubResponse, HubStream, RequestBody, Transport, TransportError};

pub(crate) const FAKE_LFS_HOST: &str = "https://lfs.fake";

const FAKE_HUB_HOST: &str = "https://hub.fake";

/// Streamed bodies are cut into chunks of this size.
pub(crate) const FAKE_CHUNK: usize = 1024;

/// Fails `failures` times with `error`, then answers `response` forever.
pub(crate) struct ScriptedTransport {
    failures: usize,
    error: TransportError,
    response: Option<HubResponse>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn always_failing(error: TransportError) -> Self {
        Self {
            failures: usize::MAX,
            error,
            response: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_then_ok(failures: usize, error: TransportError, response: HubResponse) -> Self {
        Self {
            failures,
            error,
            response: Some(response),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, _request: HubRequest) -> Result<HubResponse, TransportError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Some(response) if call >= self.failures => Ok(response.clone()),
            _ => Err(self.error.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeFile {
    pub content: Vec<u8>,
    pub lfs_oid: Option<String>,
    pub last_commit: String,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeBranch {
    pub head: String,
    pub files: BTreeMap<String, FakeFile>,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeRepo {
    pub private: bool,
    pub downloads: u64,
    pub likes: u64,
    pub branches: BTreeMap<String, FakeBranch>,
    pub tags: Vec<String>,
    /// Whether the refs answer marks the default branch.
    pub mark_default: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeItem {
    pub object_id: String,
    pub item_type: String,
    pub id: String,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct FakeCollection {
    pub title: String,
    pub description: String,
    pub owner: String,
    pub private: bool,
    pub items: Vec<FakeItem>,
}

#[derive(Default)]
struct FakeState {
    repos: BTreeMap<(String, String), FakeRepo>,
    collections: BTreeMap<String, FakeCollection>,
    lfs_objects: HashMap<String, Vec<u8>>,
    counter: u64,
}

impl FakeState {
    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("{:040x}", self.counter)
    }
}

/// Stateful fake of the hub's REST surface.
pub(crate) struct FakeHub {
    username: String,
    token: String,
    state: Mutex<FakeState>,
    calls: Mutex<Vec<HubRequest>>,
    injected: Mutex<VecDeque<TransportError>>,
    /// Files at or above this size are routed through large-object storage.
    pub lfs_threshold: u64,
    commit_delay: Mutex<Option<Duration>>,
    /// When set, listings are split into pages of this many entries.
    page_size: Mutex<Option<usize>>,
}

impl FakeHub {
    pub fn new(username: &str, token: &str) -> Self {
        Self {
            username: username.to_string(),
            token: token.to_string(),
            state: Mutex::new(FakeState::default()),
            calls: Mutex::new(Vec::new()),
            injected: Mutex::new(VecDeque::new()),
            lfs_threshold: 1024,
            commit_delay: Mutex::new(None),
            page_size: Mutex::new(None),
        }
    }

    /// Seed a repository with a `main` branch.
    pub fn add_repo(&self, kind: &str, id: &str, files: &[(&str, &[u8])]) {
        let mut state = self.state.lock();
        let head = state.next_id();
        let mut branch = FakeBranch {
            head: head.clone(),
            files: BTreeMap::new(),
        };
        for (path, content) in files {
            branch.files.insert(
                path.to_string(),
                FakeFile {
                    content: content.to_vec(),
                    lfs_oid: None,
                    last_commit: head.clone(),
                },
            );
        }
        let mut branches = BTreeMap::new();
        branches.insert("main".to_string(), branch);
        state.repos.insert(
            (kind.to_string(), id.to_string()),
            FakeRepo {
                private: false,
                downloads: 10,
                likes: 2,
                branches,
                tags: Vec::new(),
                mark_default: true,
            },
        );
    }

    pub fn with_repo<R>(&self, kind: &str, id: &str, f: impl FnOnce(&mut FakeRepo) -> R) -> R {
        let mut state = self.state.lock();
        let repo = state
            .repos
            .get_mut(&(kind.to_string(), id.to_string()))
            .expect("repo seeded");
        f(repo)
    }

    pub fn file_content(&self, kind: &str, id: &str, branch: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state.lock();
        let file = state
            .repos
            .get(&(kind.to_string(), id.to_string()))?
            .branches
            .get(branch)?
            .files
            .get(path)?
            .clone();
        match file.lfs_oid {
            Some(oid) => state.lfs_objects.get(&oid).cloned(),
            None => Some(file.content),
        }
    }

    pub fn add_collection(&self, slug: &str, title: &str, items: &[(&str, &str)]) {
        let mut state = self.state.lock();
        let mut fake_items = Vec::new();
        for (item_type, id) in items {
            let object_id = state.next_id();
            fake_items.push(FakeItem {
                object_id,
                item_type: item_type.to_string(),
                id: id.to_string(),
                note: None,
            });
        }
        let owner = slug.split('/').next().unwrap_or_default().to_string();
        state.collections.insert(
            slug.to_string(),
            FakeCollection {
                title: title.to_string(),
                description: String::new(),
                owner,
                private: false,
                items: fake_items,
            },
        );
    }

    pub fn collection_len(&self, slug: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(slug)
            .map(|c| c.items.len())
            .unwrap_or(0)
    }

    pub fn has_repo(&self, kind: &str, id: &str) -> bool {
        self.state
            .lock()
            .repos
            .contains_key(&(kind.to_string(), id.to_string()))
    }

    /// Fail the next calls with these errors, in order.
    pub fn inject(&self, errors: impl IntoIterator<Item = TransportError>) {
        self.injected.lock().extend(errors);
    }

    /// Hold every commit call for `delay` before applying it.
    pub fn set_commit_delay(&self, delay: Duration) {
        *self.commit_delay.lock() = Some(delay);
    }

    /// Answer listings in pages linked with `Link: rel="next"`.
    pub fn set_page_size(&self, size: usize) {
        *self.page_size.lock() = Some(size);
    }

    /// Remove one collection item behind the client's back.
    pub fn remove_collection_item(&self, slug: &str, id: &str) {
        if let Some(collection) = self.state.lock().collections.get_mut(slug) {
            collection.items.retain(|i| i.id != id);
        }
    }

    fn paginate(&self, request: &HubRequest, items: Vec<Value>) -> HubResponse {
        let Some(size) = *self.page_size.lock() else {
            return HubResponse::json_value(Value::Array(items));
        };
        let offset = query(request, "cursor")
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        let page: Vec<Value> = items.iter().skip(offset).take(size).cloned().collect();
        let mut response = HubResponse::json_value(Value::Array(page));
        if offset + size < items.len() {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in request.query.iter().filter(|(k, _)| k != "cursor") {
                query.append_pair(key, value);
            }
            query.append_pair("cursor", &(offset + size).to_string());
            let link = format!("{}{}?{}", FAKE_HUB_HOST, request.path(), query.finish());
            response = response.with_header("Link", format!("<{}>; rel=\"next\"", link));
        }
        response
    }

    pub fn calls(&self) -> Vec<HubRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of recorded calls whose path contains `needle`.
    pub fn count(&self, method: Method, needle: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path().contains(needle))
            .count()
    }

    fn authorize(&self, request: &HubRequest) -> Result<(), TransportError> {
        match &request.bearer {
            Some(token) if *token == self.token => Ok(()),
            _ => Err(TransportError::from_status(401, "Invalid credentials")),
        }
    }

    fn route(&self, request: &HubRequest) -> Result<HubResponse, TransportError> {
        let path = request.path().to_string();

        if let Some(rest) = path.strip_prefix(FAKE_LFS_HOST) {
            return self.route_lfs_transfer(request, rest);
        }

        self.authorize(request)?;

        let segments: Vec<String> = path
            .trim_start_matches('/')
            .split('/')
            .map(decode)
            .collect();
        let seg: Vec<&str> = segments.iter().map(String::as_str).collect();

        if seg.first() == Some(&"api") {
            return match seg.get(1).copied() {
                Some("whoami-v2") => Ok(HubResponse::json_value(json!({
                    "name": self.username,
                    "fullname": "Test User",
                    "email": "test@example.com",
                    "avatarUrl": "",
                    "orgs": [{"name": "acme"}],
                }))),
                Some("repos") => self.route_repo_admin(request, seg.get(2).copied()),
                Some("collections") => self.route_collections(request, &seg[2..]),
                Some(kind_seg) => self.route_repo_api(request, kind_seg, &seg[2..]),
                None => Err(not_found("route")),
            };
        }

        let (kind, offset) = match seg.first().copied() {
            Some("datasets") => ("dataset", 1),
            Some("spaces") => ("space", 1),
            _ => ("model", 0),
        };
        let namespace = seg.get(offset).copied().unwrap_or_default();
        let name = seg.get(offset + 1).copied().unwrap_or_default();

        if let Some(name) = name.strip_suffix(".git") {
            return self.route_lfs_batch(request, kind, &format!("{}/{}", namespace, name));
        }

        if seg.get(offset + 2) == Some(&"resolve") {
            let id = format!("{}/{}", namespace, name);
            let revision = seg.get(offset + 3).copied().unwrap_or_default();
            let file_path = seg[offset + 4..].join("/");
            return match self.file_content(kind, &id, revision, &file_path) {
                Some(content) => Ok(HubResponse::new(200, content)),
                None => Err(not_found(&file_path)),
            };
        }

        Err(not_found(&path))
    }

    fn route_repo_admin(
        &self,
        request: &HubRequest,
        action: Option<&str>,
    ) -> Result<HubResponse, TransportError> {
        let body = json_body(request);
        let kind = body["type"].as_str().unwrap_or("model").to_string();
        let id = format!(
            "{}/{}",
            body["organization"].as_str().unwrap_or(&self.username),
            body["name"].as_str().unwrap_or_default()
        );
        let key = (kind, id.clone());

        let mut state = self.state.lock();
        match action {
            Some("create") => {
                if state.repos.contains_key(&key) {
                    return Err(TransportError::from_status(409, "You already created this repo"));
                }
                let head = state.next_id();
                let mut branches = BTreeMap::new();
                branches.insert(
                    "main".to_string(),
                    FakeBranch {
                        head,
                        files: BTreeMap::new(),
                    },
                );
                state.repos.insert(
                    key,
                    FakeRepo {
                        private: body["private"].as_bool().unwrap_or(false),
                        downloads: 0,
                        likes: 0,
                        branches,
                        tags: Vec::new(),
                        mark_default: true,
                    },
                );
                Ok(HubResponse::json_value(json!({
                    "url": format!("https://hub.fake/{}", id),
                    "name": id,
                })))
            }
            Some("delete") => match state.repos.remove(&key) {
                Some(_) => Ok(HubResponse::empty()),
                None => Err(not_found(&id)),
            },
            _ => Err(not_found("repos")),
        }
    }

    fn route_repo_api(
        &self,
        request: &HubRequest,
        kind_seg: &str,
        rest: &[&str],
    ) -> Result<HubResponse, TransportError> {
        let kind = kind_seg.trim_end_matches('s').to_string();

        if rest.is_empty() {
            let author = query(request, "author");
            let state = self.state.lock();
            let repos: Vec<Value> = state
                .repos
                .iter()
                .filter(|((k, id), _)| {
                    *k == kind
                        && author
                            .as_deref()
                            .map_or(true, |a| id.split('/').next() == Some(a))
                })
                .map(|((_, id), repo)| repo_json(id, repo))
                .collect();
            drop(state);
            return Ok(self.paginate(request, repos));
        }

        if rest.len() < 2 {
            return Err(not_found(kind_seg));
        }
        let id = format!("{}/{}", rest[0], rest[1]);
        let key = (kind.clone(), id.clone());
        let action = rest.get(2).copied();
        let revision = rest.get(3..).map(|r| r.join("/")).unwrap_or_default();

        if action == Some("commit") {
            return self.apply_commit(request, &key, &revision);
        }

        let mut state = self.state.lock();
        if !state.repos.contains_key(&key) {
            return Err(not_found(&id));
        }
        let lfs_sizes: HashMap<String, usize> = state
            .lfs_objects
            .iter()
            .map(|(oid, data)| (oid.clone(), data.len()))
            .collect();
        let lfs_threshold = self.lfs_threshold;
        let repo = state.repos.get_mut(&key).expect("checked above");

        match (request.method.clone(), action) {
            (Method::GET, None) => Ok(HubResponse::json_value(repo_json(&id, repo))),
            (Method::PUT, Some("settings")) => {
                if let Some(private) = json_body(request)["private"].as_bool() {
                    repo.private = private;
                }
                Ok(HubResponse::json_value(json!({})))
            }
            (Method::GET, Some("refs")) => {
                let branches: Vec<Value> = repo
                    .branches
                    .iter()
                    .map(|(name, branch)| {
                        let mut value = json!({
                            "name": name,
                            "ref": format!("refs/heads/{}", name),
                            "targetCommit": branch.head,
                        });
                        if repo.mark_default {
                            value["isDefault"] = json!(name == "main");
                        }
                        value
                    })
                    .collect();
                let tags: Vec<Value> = repo
                    .tags
                    .iter()
                    .map(|t| json!({"name": t, "targetCommit": "t"}))
                    .collect();
                Ok(HubResponse::json_value(
                    json!({"branches": branches, "tags": tags}),
                ))
            }
            (Method::GET, Some("tree")) => {
                let branch = repo
                    .branches
                    .get(&revision)
                    .ok_or_else(|| not_found(&revision))?;
                let mut entries = Vec::new();
                let mut dirs = HashSet::new();
                for (path, file) in &branch.files {
                    if let Some((dir, _)) = path.rsplit_once('/') {
                        if dirs.insert(dir.to_string()) {
                            entries.push(json!({"type": "directory", "path": dir, "size": 0}));
                        }
                    }
                    let mut entry = json!({
                        "type": "file",
                        "path": path,
                        "size": file.content.len(),
                        "lastCommit": {"id": file.last_commit},
                    });
                    if let Some(oid) = &file.lfs_oid {
                        let size = lfs_sizes.get(oid).copied().unwrap_or(0);
                        entry["lfs"] = json!({"oid": oid, "size": size});
                    }
                    entries.push(entry);
                }
                Ok(self.paginate(request, entries))
            }
            (Method::POST, Some("preupload")) => {
                let files: Vec<Value> = json_body(request)["files"]
                    .as_array()
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|f| {
                        let size = f["size"].as_u64().unwrap_or(0);
                        let mode = if size >= lfs_threshold { "lfs" } else { "regular" };
                        json!({"path": f["path"], "uploadMode": mode})
                    })
                    .collect();
                Ok(HubResponse::json_value(json!({ "files": files })))
            }
            _ => Err(not_found(&id)),
        }
    }

    fn apply_commit(
        &self,
        request: &HubRequest,
        key: &(String, String),
        revision: &str,
    ) -> Result<HubResponse, TransportError> {
        let lines = match &request.body {
            RequestBody::Ndjson(lines) => lines.clone(),
            _ => return Err(TransportError::from_status(400, "expected ndjson")),
        };

        let mut state = self.state.lock();
        let commit_id = state.next_id();
        let lfs_objects = state.lfs_objects.clone();
        let repo = state.repos.get_mut(key).ok_or_else(|| not_found(&key.1))?;
        let branch = repo
            .branches
            .get(revision)
            .ok_or_else(|| not_found(revision))?;

        // Work on a copy so a bad line leaves the branch untouched.
        let mut files = branch.files.clone();
        let mut saw_header = false;
        for line in lines {
            let value = &line["value"];
            let path = value["path"].as_str().unwrap_or_default().to_string();
            match line["key"].as_str() {
                Some("header") => {
                    saw_header = !value["summary"].as_str().unwrap_or_default().is_empty();
                }
                Some("file") => {
                    let content = base64::engine::general_purpose::STANDARD
                        .decode(value["content"].as_str().unwrap_or_default())
                        .map_err(|e| TransportError::from_status(400, e.to_string()))?;
                    files.insert(
                        path,
                        FakeFile {
                            content,
                            lfs_oid: None,
                            last_commit: commit_id.clone(),
                        },
                    );
                }
                Some("lfsFile") => {
                    let oid = value["oid"].as_str().unwrap_or_default().to_string();
                    if !lfs_objects.contains_key(&oid) {
                        return Err(TransportError::from_status(
                            422,
                            format!("LFS object {} was never uploaded", oid),
                        ));
                    }
                    files.insert(
                        path,
                        FakeFile {
                            content: Vec::new(),
                            lfs_oid: Some(oid),
                            last_commit: commit_id.clone(),
                        },
                    );
                }
                Some("deletedFile") => {
                    if files.remove(&path).is_none() {
                        return Err(not_found(&path));
                    }
                }
                _ => return Err(TransportError::from_status(400, "unknown line")),
            }
        }
        if !saw_header {
            return Err(TransportError::from_status(400, "missing commit summary"));
        }

        let branch = repo.branches.get_mut(revision).expect("checked above");
        branch.files = files;
        branch.head = commit_id.clone();

        Ok(HubResponse::json_value(json!({
            "commitOid": commit_id,
            "commitUrl": format!("https://hub.fake/{}/commit/{}", key.1, commit_id),
        })))
    }

    fn route_lfs_batch(
        &self,
        request: &HubRequest,
        kind: &str,
        id: &str,
    ) -> Result<HubResponse, TransportError> {
        if !self.has_repo(kind, id) {
            return Err(not_found(id));
        }
        let state = self.state.lock();
        let objects: Vec<Value> = json_body(request)["objects"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|o| {
                let oid = o["oid"].as_str().unwrap_or_default().to_string();
                if state.lfs_objects.contains_key(&oid) {
                    json!({"oid": oid, "size": o["size"]})
                } else {
                    json!({
                        "oid": oid,
                        "size": o["size"],
                        "actions": {
                            "upload": {
                                "href": format!("{}/upload/{}", FAKE_LFS_HOST, oid),
                                "header": {"X-Upload-Token": "signed"}
                            },
                            "verify": {"href": format!("{}/verify", FAKE_LFS_HOST)}
                        }
                    })
                }
            })
            .collect();
        Ok(HubResponse::json_value(json!({ "objects": objects })))
    }

    fn route_lfs_transfer(
        &self,
        request: &HubRequest,
        rest: &str,
    ) -> Result<HubResponse, TransportError> {
        if let Some(oid) = rest.strip_prefix("/upload/") {
            let data = match &request.body {
                RequestBody::Bytes(data) => data.to_vec(),
                RequestBody::File(path) => std::fs::read(path)
                    .map_err(|e| TransportError::Local(format!("{}: {}", path.display(), e)))?,
                _ => return Err(TransportError::from_status(400, "expected bytes")),
            };
            if sha256_hex(&data) != oid {
                return Err(TransportError::from_status(400, "checksum mismatch"));
            }
            self.state.lock().lfs_objects.insert(oid.to_string(), data);
            return Ok(HubResponse::empty());
        }
        if rest == "/verify" {
            let oid = json_body(request)["oid"].as_str().unwrap_or_default().to_string();
            return if self.state.lock().lfs_objects.contains_key(&oid) {
                Ok(HubResponse::empty())
            } else {
                Err(not_found(&oid))
            };
        }
        Err(not_found(rest))
    }

    fn route_collections(
        &self,
        request: &HubRequest,
        rest: &[&str],
    ) -> Result<HubResponse, TransportError> {
        let mut state = self.state.lock();
        match (request.method.clone(), rest.len()) {
            (Method::GET, 0) => {
                let owner = query(request, "owner").unwrap_or_default();
                let list: Vec<Value> = state
                    .collections
                    .iter()
                    .filter(|(_, c)| c.owner == owner)
                    .map(|(slug, c)| collection_json(slug, c))
                    .collect();
                drop(state);
                Ok(self.paginate(request, list))
            }
            (Method::POST, 0) => {
                let body = json_body(request);
                let title = body["title"].as_str().unwrap_or_default().to_string();
                let owner = body["namespace"].as_str().unwrap_or(&self.username).to_string();
                let suffix = state.next_id();
                let slug = format!(
                    "{}/{}-{}",
                    owner,
                    title.to_lowercase().replace(' ', "-"),
                    &suffix[suffix.len() - 6..]
                );
                if state.collections.values().any(|c| c.title == title && c.owner == owner) {
                    return Err(TransportError::from_status(409, "Collection already exists"));
                }
                let collection = FakeCollection {
                    title,
                    description: body["description"].as_str().unwrap_or_default().to_string(),
                    owner,
                    private: body["private"].as_bool().unwrap_or(false),
                    items: Vec::new(),
                };
                let json = collection_json(&slug, &collection);
                state.collections.insert(slug, collection);
                Ok(HubResponse::json_value(json))
            }
            (method, len) if len >= 2 => {
                let slug = format!("{}/{}", rest[0], rest[1]);
                let next_object_id = state.next_id();
                let collection = state
                    .collections
                    .get_mut(&slug)
                    .ok_or_else(|| not_found(&slug))?;
                match (method, rest.get(2).copied(), rest.get(3).copied()) {
                    (Method::GET, None, _) => {
                        Ok(HubResponse::json_value(collection_json(&slug, collection)))
                    }
                    (Method::PATCH, None, _) => {
                        let body = json_body(request);
                        if let Some(title) = body["title"].as_str() {
                            collection.title = title.to_string();
                        }
                        if let Some(description) = body["description"].as_str() {
                            collection.description = description.to_string();
                        }
                        if let Some(private) = body["private"].as_bool() {
                            collection.private = private;
                        }
                        Ok(HubResponse::json_value(collection_json(&slug, collection)))
                    }
                    (Method::DELETE, None, _) => {
                        state.collections.remove(&slug);
                        Ok(HubResponse::empty())
                    }
                    (Method::POST, Some("items"), None) => {
                        let body = json_body(request);
                        let item_type = body["item"]["type"].as_str().unwrap_or_default();
                        let id = body["item"]["id"].as_str().unwrap_or_default();
                        if collection
                            .items
                            .iter()
                            .any(|i| i.item_type == item_type && i.id == id)
                        {
                            return Err(TransportError::from_status(409, "Item already exists"));
                        }
                        collection.items.push(FakeItem {
                            object_id: next_object_id,
                            item_type: item_type.to_string(),
                            id: id.to_string(),
                            note: body["note"].as_str().map(str::to_string),
                        });
                        Ok(HubResponse::json_value(collection_json(&slug, collection)))
                    }
                    (Method::DELETE, Some("items"), Some(object_id)) => {
                        let before = collection.items.len();
                        collection.items.retain(|i| i.object_id != object_id);
                        if collection.items.len() == before {
                            return Err(not_found(object_id));
                        }
                        Ok(HubResponse::empty())
                    }
                    _ => Err(not_found(&slug)),
                }
            }
            _ => Err(not_found("collections")),
        }
    }
}

#[async_trait]
impl Transport for FakeHub {
    async fn execute(&self, request: HubRequest) -> Result<HubResponse, TransportError> {
        self.calls.lock().push(request.clone());

        if let Some(err) = self.injected.lock().pop_front() {
            return Err(err);
        }

        if request.path().contains("/commit/") {
            let delay = *self.commit_delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
        }

        self.route(&request)
    }

    async fn execute_stream(&self, request: HubRequest) -> Result<HubStream, TransportError> {
        let response = self.execute(request).await?;
        let chunks: Vec<Result<bytes::Bytes, TransportError>> = response
            .body
            .chunks(FAKE_CHUNK)
            .map(|c| Ok(bytes::Bytes::copy_from_slice(c)))
            .collect();
        Ok(HubStream {
            status: response.status,
            content_length: Some(response.body.len() as u64),
            body: Box::pin(futures::stream::iter(chunks)),
        })
    }
}

fn decode(segment: &str) -> String {
    url::form_urlencoded::parse(format!("s={}", segment).as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

fn not_found(what: &str) -> TransportError {
    TransportError::from_status(404, format!("{} not found", what))
}

fn json_body(request: &HubRequest) -> Value {
    match &request.body {
        RequestBody::Json(value) => value.clone(),
        _ => Value::Null,
    }
}

fn query(request: &HubRequest, key: &str) -> Option<String> {
    request
        .query
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.clone())
}

fn repo_json(id: &str, repo: &FakeRepo) -> Value {
    json!({
        "id": id,
        "private": repo.private,
        "downloads": repo.downloads,
        "likes": repo.likes,
        "lastModified": "2026-01-15T10:00:00.000Z",
        "sha": repo.branches.get("main").map(|b| b.head.clone()),
        "tags": ["test"],
    })
}

fn collection_json(slug: &str, collection: &FakeCollection) -> Value {
    let items: Vec<Value> = collection
        .items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let mut value = json!({
                "_id": item.object_id,
                "type": item.item_type,
                "id": item.id,
                "position": position,
            });
            if let Some(note) = &item.note {
                value["note"] = json!({ "text": note });
            }
            value
        })
        .collect();
    json!({
        "slug": slug,
        "title": collection.title,
        "description": collection.description,
        "owner": { "name": collection.owner },
        "private": collection.private,
        "items": items,
    })
}

/// Transport stack over `hub` with its token already in the store.
pub(crate) fn logged_in(hub: &Arc<FakeHub>) -> Arc<dyn Transport> {
    let store = Arc::new(CredentialStore::new());
    store.set(Credential::new(
        hub.token.clone(),
        Identity {
            username: hub.username.clone(),
            ..Default::default()
        },
    ));
    Arc::new(AuthenticatedTransport::new(hub.clone(), store))
}
