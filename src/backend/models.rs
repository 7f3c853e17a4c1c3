use serde::{Deserialize, de::DeserializeOwned};
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        ItemId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Image,
    Animation,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubPage {
    #[serde(rename = "previewUrl")]
    pub preview_url: String,
    #[serde(rename = "fullUrl")]
    pub full_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnimationFrame {
    pub file: String,
    #[serde(rename = "delay")]
    pub delay_ms: u32,
}

/// Frame timing and the archive holding the frames of an animation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnimationMetadata {
    #[serde(rename = "src")]
    pub archive_url: String,
    #[serde(default)]
    pub frames: Vec<AnimationFrame>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemMetadata {
    pub id: ItemId,
    pub owner_id: OwnerId,
    pub kind: ContentKind,
    pub title: String,
    pub tags: Vec<String>,
    pub pages: Vec<SubPage>,
    /// Present for every cached animation; `None` for static images.
    pub animation: Option<AnimationMetadata>,
}

impl ItemMetadata {
    pub fn is_animation(&self) -> bool {
        self.kind == ContentKind::Animation
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerMetadata {
    pub id: OwnerId,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// The single owner record every item with that owner points at. A re-fetch
/// replaces the contents in place so all holders observe it.
#[derive(Debug)]
pub struct SharedOwner(RwLock<OwnerMetadata>);

impl SharedOwner {
    pub fn new(owner: OwnerMetadata) -> Self {
        SharedOwner(RwLock::new(owner))
    }

    pub fn get(&self) -> OwnerMetadata {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn id(&self) -> OwnerId {
        self.0.read().unwrap_or_else(|e| e.into_inner()).id.clone()
    }

    pub(crate) fn replace(&self, owner: OwnerMetadata) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = owner;
    }
}

/// An item together with its owner, the unit handed to item callbacks.
#[derive(Debug, Clone)]
pub struct ResolvedItem {
    pub item: Arc<ItemMetadata>,
    pub owner: Arc<SharedOwner>,
}

impl ResolvedItem {
    pub fn id(&self) -> &ItemId {
        &self.item.id
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    error: bool,
    #[serde(default)]
    message: String,
    body: Option<T>,
}

/// Unwraps the host's `{error, message, body}` envelope.
pub fn parse_body<T: DeserializeOwned>(path: &str, value: serde_json::Value) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_value(value)?;
    if envelope.error {
        return Err(Error::Api {
            path: path.to_string(),
            message: envelope.message,
        });
    }
    envelope
        .body
        .ok_or_else(|| Error::MissingBody(path.to_string()))
}

#[derive(Debug, Deserialize)]
pub struct ItemData {
    id: ItemId,
    #[serde(rename = "ownerId")]
    owner_id: OwnerId,
    kind: ContentKind,
    #[serde(default)]
    title: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    pages: Vec<SubPage>,
}

impl ItemData {
    pub(crate) fn id(&self) -> &ItemId {
        &self.id
    }

    pub(crate) fn kind(&self) -> ContentKind {
        self.kind
    }

    pub(crate) fn into_metadata(self, animation: Option<AnimationMetadata>) -> ItemMetadata {
        ItemMetadata {
            id: self.id,
            owner_id: self.owner_id,
            kind: self.kind,
            title: self.title,
            tags: self.tags,
            pages: self.pages,
            animation,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OwnerData {
    id: OwnerId,
    #[serde(default)]
    name: String,
    #[serde(rename = "avatarUrl")]
    avatar_url: Option<String>,
}

impl From<OwnerData> for OwnerMetadata {
    fn from(data: OwnerData) -> Self {
        OwnerMetadata {
            id: data.id,
            name: data.name,
            avatar_url: data.avatar_url,
        }
    }
}
