use log::{debug, error, warn};
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::models::{
    AnimationMetadata, ContentKind, ItemData, ItemId, ItemMetadata, OwnerData, OwnerId,
    OwnerMetadata, ResolvedItem, SharedOwner, parse_body,
};
use super::transport::Transport;
use crate::Result;
use crate::settings::Endpoints;

pub type ItemCallback = Box<dyn FnOnce(ResolvedItem) + Send + 'static>;
pub type OwnerCallback = Box<dyn FnOnce(Arc<SharedOwner>) + Send + 'static>;

/// Item and owner metadata keyed by identifier.
///
/// Concurrent requests for the same key share one fetch. Callbacks are queued
/// and fire exactly once, after the item and its owner are both cached, and
/// never from inside the `request_*` call that registered them.
#[derive(Clone)]
pub struct ContentCache {
    inner: Arc<CacheShared>,
}

struct CacheShared {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    state: Mutex<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    items: HashMap<ItemId, Arc<ItemMetadata>>,
    owners: HashMap<OwnerId, Arc<SharedOwner>>,
    items_in_flight: HashSet<ItemId>,
    owners_in_flight: HashSet<OwnerId>,
    owner_hints: HashMap<ItemId, OwnerId>,
    pending: Vec<Pending>,
}

enum Pending {
    Item { id: ItemId, on_ready: ItemCallback },
    Owner { id: OwnerId, on_ready: OwnerCallback },
}

enum Ready {
    Item(ItemCallback, ResolvedItem),
    Owner(OwnerCallback, Arc<SharedOwner>),
}

impl ContentCache {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints) -> Self {
        Self {
            inner: Arc::new(CacheShared {
                transport,
                endpoints,
                state: Mutex::new(CacheInner::default()),
            }),
        }
    }

    /// Makes sure `id` is cached or being fetched, queueing `on_ready` for the
    /// first time the item and its owner are both available.
    pub async fn request_item(&self, id: ItemId, on_ready: Option<ItemCallback>) {
        let has_callback = on_ready.is_some();

        let (start_fetch, owner_id, cached) = {
            let mut inner = self.inner.state.lock().await;
            if let Some(on_ready) = on_ready {
                inner.pending.push(Pending::Item {
                    id: id.clone(),
                    on_ready,
                });
            }

            match inner.items.get(&id) {
                Some(item) => (false, Some(item.owner_id.clone()), true),
                None => {
                    let start_fetch = inner.items_in_flight.insert(id.clone());
                    let hint = if start_fetch {
                        inner.owner_hints.get(&id).cloned()
                    } else {
                        None
                    };
                    (start_fetch, hint, false)
                }
            }
        };

        // Either the cached item's owner, or a hinted owner fetched alongside
        // the item.
        if let Some(owner_id) = owner_id {
            self.request_owner(owner_id, None).await;
        }

        if start_fetch {
            debug!("fetching item {}", id);
            let cache = self.clone();
            tokio::spawn(async move { cache.fetch_item(id).await });
        }

        if cached && has_callback {
            self.defer_resolve();
        }
    }

    pub async fn request_owner(&self, id: OwnerId, on_ready: Option<OwnerCallback>) {
        let has_callback = on_ready.is_some();

        let (start_fetch, cached) = {
            let mut inner = self.inner.state.lock().await;
            if let Some(on_ready) = on_ready {
                inner.pending.push(Pending::Owner {
                    id: id.clone(),
                    on_ready,
                });
            }

            if inner.owners.contains_key(&id) {
                (false, true)
            } else {
                (inner.owners_in_flight.insert(id.clone()), false)
            }
        };

        if start_fetch {
            debug!("fetching owner {}", id);
            let cache = self.clone();
            tokio::spawn(async move { cache.fetch_owner(id).await });
        }

        if cached && has_callback {
            self.defer_resolve();
        }
    }

    /// Stores an item obtained elsewhere as if it had just been fetched. A
    /// fetch already running for the same id is left alone.
    pub async fn inject_item(&self, item: ItemMetadata) {
        let owner_id = {
            let mut inner = self.inner.state.lock().await;
            inner.insert_item(item)
        };
        self.request_owner(owner_id, None).await;
        self.resolve_pending().await;
    }

    pub async fn inject_owner(&self, owner: OwnerMetadata) {
        {
            let mut inner = self.inner.state.lock().await;
            inner.insert_owner(owner);
        }
        self.resolve_pending().await;
    }

    /// Hints that `item_id` belongs to `owner_id` so a later item request can
    /// fetch the owner in parallel. The item's own owner id wins once known.
    pub async fn note_owner_for_item(&self, item_id: ItemId, owner_id: OwnerId) {
        let mut inner = self.inner.state.lock().await;
        if !inner.items.contains_key(&item_id) {
            inner.owner_hints.insert(item_id, owner_id);
        }
    }

    pub async fn cached_item(&self, id: &ItemId) -> Option<ResolvedItem> {
        self.inner.state.lock().await.resolved_item(id)
    }

    pub async fn cached_owner(&self, id: &OwnerId) -> Option<Arc<SharedOwner>> {
        self.inner.state.lock().await.owners.get(id).cloned()
    }

    pub async fn is_fetching_item(&self, id: &ItemId) -> bool {
        self.inner.state.lock().await.items_in_flight.contains(id)
    }

    pub async fn is_fetching_owner(&self, id: &OwnerId) -> bool {
        self.inner.state.lock().await.owners_in_flight.contains(id)
    }

    async fn fetch_item(&self, id: ItemId) {
        let result = self.load_item(&id).await;

        let owner_id = {
            let mut inner = self.inner.state.lock().await;
            inner.items_in_flight.remove(&id);
            match result {
                Ok(item) => Some(inner.insert_item(item)),
                Err(e) => {
                    warn!("failed to fetch item {}: {}", id, e);
                    None
                }
            }
        };

        if let Some(owner_id) = owner_id {
            self.request_owner(owner_id, None).await;
            self.resolve_pending().await;
        }
    }

    async fn load_item(&self, id: &ItemId) -> Result<ItemMetadata> {
        let transport = &self.inner.transport;
        let endpoints = &self.inner.endpoints;

        let path = endpoints.item_path(id.as_str());
        let data: ItemData = parse_body(&path, transport.fetch_json(&path).await?)?;

        // Animations are only complete once their frame data is in.
        let animation = match data.kind() {
            ContentKind::Animation => {
                let path = endpoints.animation_path(data.id().as_str());
                let animation: AnimationMetadata =
                    parse_body(&path, transport.fetch_json(&path).await?)?;
                Some(animation)
            }
            ContentKind::Image => None,
        };

        Ok(data.into_metadata(animation))
    }

    async fn fetch_owner(&self, id: OwnerId) {
        let path = self.inner.endpoints.owner_path(id.as_str());
        let result = self
            .inner
            .transport
            .fetch_json(&path)
            .await
            .and_then(|value| parse_body::<OwnerData>(&path, value));

        let stored = {
            let mut inner = self.inner.state.lock().await;
            inner.owners_in_flight.remove(&id);
            match result {
                Ok(owner) => {
                    inner.insert_owner(owner.into());
                    true
                }
                Err(e) => {
                    warn!("failed to fetch owner {}: {}", id, e);
                    false
                }
            }
        };

        if stored {
            self.resolve_pending().await;
        }
    }

    fn defer_resolve(&self) {
        let cache = self.clone();
        tokio::spawn(async move { cache.resolve_pending().await });
    }

    /// Fires every queued callback whose data is now complete. Callbacks run
    /// after the lock is released so they may call back into the cache.
    async fn resolve_pending(&self) {
        let ready = {
            let mut inner = self.inner.state.lock().await;
            let pending = std::mem::take(&mut inner.pending);
            let mut ready = Vec::new();

            for entry in pending {
                match entry {
                    Pending::Item { id, on_ready } => match inner.resolved_item(&id) {
                        Some(resolved) => ready.push(Ready::Item(on_ready, resolved)),
                        None => inner.pending.push(Pending::Item { id, on_ready }),
                    },
                    Pending::Owner { id, on_ready } => match inner.owners.get(&id) {
                        Some(owner) => ready.push(Ready::Owner(on_ready, owner.clone())),
                        None => inner.pending.push(Pending::Owner { id, on_ready }),
                    },
                }
            }
            ready
        };

        for entry in ready {
            entry.fire();
        }
    }
}

impl CacheInner {
    fn insert_item(&mut self, item: ItemMetadata) -> OwnerId {
        let owner_id = item.owner_id.clone();
        self.owner_hints.remove(&item.id);
        self.items.insert(item.id.clone(), Arc::new(item));
        owner_id
    }

    fn insert_owner(&mut self, owner: OwnerMetadata) {
        match self.owners.get(&owner.id) {
            Some(shared) => shared.replace(owner),
            None => {
                self.owners
                    .insert(owner.id.clone(), Arc::new(SharedOwner::new(owner)));
            }
        }
    }

    fn resolved_item(&self, id: &ItemId) -> Option<ResolvedItem> {
        let item = self.items.get(id)?;
        let owner = self.owners.get(&item.owner_id)?;
        Some(ResolvedItem {
            item: item.clone(),
            owner: owner.clone(),
        })
    }
}

impl Ready {
    fn fire(self) {
        let (what, outcome) = match self {
            Ready::Item(on_ready, resolved) => (
                format!("item {}", resolved.id()),
                catch_unwind(AssertUnwindSafe(move || on_ready(resolved))),
            ),
            Ready::Owner(on_ready, owner) => (
                format!("owner {}", owner.id()),
                catch_unwind(AssertUnwindSafe(move || on_ready(owner))),
            ),
        };

        if outcome.is_err() {
            error!("ready callback for {} panicked", what);
        }
    }
}
