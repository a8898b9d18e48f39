//! Curated collections and their membership.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::auth::CredentialStore;
use crate::error::{HubError, Result};
use crate::hub::endpoints::{self, CollectionWire};
use crate::hub::{RepoKey, RepoKind, Visibility};
use crate::transport::{fetch_all, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Model,
    Dataset,
    Space,
    Paper,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Model => "model",
            ItemKind::Dataset => "dataset",
            ItemKind::Space => "space",
            ItemKind::Paper => "paper",
        }
    }
}

impl From<RepoKind> for ItemKind {
    fn from(kind: RepoKind) -> Self {
        match kind {
            RepoKind::Model => ItemKind::Model,
            RepoKind::Dataset => ItemKind::Dataset,
            RepoKind::Space => ItemKind::Space,
        }
    }
}

impl FromStr for ItemKind {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" | "papers" => Ok(ItemKind::Paper),
            other => other.parse::<RepoKind>().map(ItemKind::from),
        }
    }
}

/// What a collection item points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ItemRef {
    pub kind: ItemKind,
    pub id: String,
}

impl ItemRef {
    pub fn new(kind: ItemKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn paper(id: impl Into<String>) -> Self {
        Self::new(ItemKind::Paper, id)
    }
}

impl From<&RepoKey> for ItemRef {
    fn from(key: &RepoKey) -> Self {
        Self::new(key.kind.into(), key.id.as_str())
    }
}

/// `kind:id`, or a bare repo id taken as a model.
impl FromStr for ItemRef {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, id) = match s.trim().split_once(':') {
            Some((kind, id)) => (kind.parse::<ItemKind>()?, id.trim()),
            None => (ItemKind::Model, s.trim()),
        };
        if id.is_empty() {
            return Err(HubError::Validation("Item id must not be empty".to_string()));
        }
        Ok(Self::new(kind, id))
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.as_str(), self.id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionItem {
    /// Server-side handle used to remove the item.
    pub object_id: String,
    pub item: ItemRef,
    pub note: Option<String>,
    pub position: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Collection {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub owner: String,
    pub visibility: Visibility,
    /// In insertion order.
    pub items: Vec<CollectionItem>,
    pub url: String,
}

impl Collection {
    pub fn contains(&self, item: &ItemRef) -> bool {
        self.items.iter().any(|i| i.item == *item)
    }

    fn from_wire(wire: CollectionWire, web_base: &str) -> Self {
        let owner = wire.owner_name();
        let mut items: Vec<CollectionItem> = wire
            .items
            .into_iter()
            .filter_map(|item| match item.item_type.parse::<ItemKind>() {
                Ok(kind) => Some(CollectionItem {
                    object_id: item.object_id,
                    item: ItemRef::new(kind, item.id),
                    note: item.note.map(|n| n.text).filter(|t| !t.is_empty()),
                    position: item.position,
                }),
                Err(_) => {
                    tracing::debug!("Skipping collection item of type '{}'", item.item_type);
                    None
                }
            })
            .collect();
        items.sort_by_key(|i| i.position);

        Self {
            url: format!("{}/collections/{}", web_base.trim_end_matches('/'), wire.slug),
            slug: wire.slug,
            title: wire.title,
            description: wire.description.unwrap_or_default(),
            owner,
            visibility: Visibility::from_private(wire.private),
            items,
        }
    }
}

/// Fields to change in [`CollectionStore::update_metadata`]. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct CollectionPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub visibility: Option<Visibility>,
}

pub struct CollectionStore {
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialStore>,
    web_base: String,
    known: RwLock<HashMap<String, Collection>>,
}

impl CollectionStore {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<CredentialStore>,
        web_base: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            web_base: web_base.into(),
            known: RwLock::new(HashMap::new()),
        }
    }

    /// Every collection of `owner`, across all pages.
    pub async fn list(&self, owner: &str) -> Result<Vec<Collection>> {
        let wire: Vec<CollectionWire> =
            fetch_all(&*self.transport, endpoints::list_collections(owner), None).await?;
        Ok(wire
            .into_iter()
            .map(|w| Collection::from_wire(w, &self.web_base))
            .collect())
    }

    /// Fresh copy of one collection with all of its items.
    pub async fn get(&self, slug: &str) -> Result<Collection> {
        let response = self.transport.execute(endpoints::get_collection(slug)).await?;
        self.store(response.json()?)
    }

    pub async fn create(&self, title: &str, visibility: Visibility) -> Result<Collection> {
        self.create_in(None, title, "", visibility).await
    }

    /// Create under `namespace`, or under the logged-in user when `None`.
    pub async fn create_in(
        &self,
        namespace: Option<&str>,
        title: &str,
        description: &str,
        visibility: Visibility,
    ) -> Result<Collection> {
        let title = title.trim();
        if title.is_empty() {
            return Err(HubError::Validation("Collection title is empty".to_string()));
        }
        let namespace = match namespace {
            Some(ns) => ns.to_string(),
            None => self.credentials.username().ok_or_else(|| HubError::Auth {
                status: 401,
                message: "Not logged in".to_string(),
            })?,
        };

        let response = self
            .transport
            .execute(endpoints::create_collection(
                title,
                &namespace,
                description,
                visibility,
            ))
            .await?;
        let collection = self.store(response.json()?)?;
        tracing::info!("Created collection {}", collection.slug);
        Ok(collection)
    }

    /// Append `item`. Fails with `DuplicateItem` if it is already a member.
    ///
    /// Membership is checked against a fresh copy, never the session cache.
    pub async fn add_item(
        &self,
        slug: &str,
        item: &ItemRef,
        note: Option<&str>,
    ) -> Result<Collection> {
        let current = self.get(slug).await?;
        if current.contains(item) {
            return Err(HubError::DuplicateItem(item.to_string()));
        }

        let request = endpoints::add_collection_item(slug, item.kind.as_str(), &item.id, note);
        let response = match self.transport.execute(request).await {
            Ok(response) => response,
            // Someone else added it since our copy was fetched.
            Err(e) if e.status() == Some(409) => {
                self.known.write().remove(slug);
                return Err(HubError::DuplicateItem(item.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!("Added {} to {}", item, slug);
        self.store(response.json()?)
    }

    pub async fn remove_item(&self, slug: &str, item: &ItemRef) -> Result<()> {
        let current = self.get(slug).await?;
        let object_id = current
            .items
            .iter()
            .find(|i| i.item == *item)
            .map(|i| i.object_id.clone())
            .ok_or_else(|| HubError::NotFound(format!("{} in collection {}", item, slug)))?;

        self.transport
            .execute(endpoints::delete_collection_item(slug, &object_id))
            .await?;
        tracing::info!("Removed {} from {}", item, slug);

        if let Some(collection) = self.known.write().get_mut(slug) {
            collection.items.retain(|i| i.object_id != object_id);
        }
        Ok(())
    }

    /// Irreversible. Confirmation is the caller's job.
    pub async fn delete(&self, slug: &str) -> Result<()> {
        self.transport
            .execute(endpoints::delete_collection(slug))
            .await?;
        self.known.write().remove(slug);
        tracing::info!("Deleted collection {}", slug);
        Ok(())
    }

    pub async fn update_metadata(&self, slug: &str, patch: &CollectionPatch) -> Result<Collection> {
        let mut body = Map::new();
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(HubError::Validation("Collection title is empty".to_string()));
            }
            body.insert("title".into(), json!(title.trim()));
        }
        if let Some(description) = &patch.description {
            body.insert("description".into(), json!(description));
        }
        if let Some(visibility) = patch.visibility {
            body.insert("private".into(), json!(visibility.is_private()));
        }
        if body.is_empty() {
            return Err(HubError::Validation("Nothing to update".to_string()));
        }

        let response = self
            .transport
            .execute(endpoints::update_collection(slug, Value::Object(body)))
            .await?;
        self.store(response.json()?)
    }

    /// Last fetched copy of `slug`, if any.
    pub fn cached(&self, slug: &str) -> Option<Collection> {
        self.known.read().get(slug).cloned()
    }

    fn store(&self, wire: CollectionWire) -> Result<Collection> {
        let collection = Collection::from_wire(wire, &self.web_base);
        self.known
            .write()
            .insert(collection.slug.clone(), collection.clone());
        Ok(collection)
    }
}
