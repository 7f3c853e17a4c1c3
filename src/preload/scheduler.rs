use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::recent::RecentlyCompleted;
use super::task::{PreloadCandidate, PreloadTask};
use crate::Result;
use crate::backend::cache::ContentCache;
use crate::backend::models::{ItemId, ResolvedItem};
use crate::backend::mute::MuteFilter;
use crate::backend::transport::Transport;
use crate::settings::PreloadConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSlot {
    Current,
    Speculative,
}

#[derive(Debug, Clone)]
pub struct Target {
    pub id: ItemId,
    pub metadata: Option<ResolvedItem>,
}

/// The two preload targets. Candidates from `current` always come first.
#[derive(Debug, Clone, Default)]
pub struct Targets {
    pub current: Option<Target>,
    pub speculative: Option<Target>,
}

impl Targets {
    fn slot_mut(&mut self, slot: TargetSlot) -> &mut Option<Target> {
        match slot {
            TargetSlot::Current => &mut self.current,
            TargetSlot::Speculative => &mut self.speculative,
        }
    }

    /// Points `slot` at `id`, dropping any metadata held for the previous
    /// target. Returns false if the slot already holds `id`.
    pub fn retarget(&mut self, slot: TargetSlot, id: Option<ItemId>) -> bool {
        let entry = self.slot_mut(slot);
        if entry.as_ref().map(|t| &t.id) == id.as_ref() {
            return false;
        }
        *entry = id.map(|id| Target { id, metadata: None });
        true
    }

    /// False when the slot moved on since the request was made.
    pub fn resolve(&mut self, slot: TargetSlot, id: &ItemId, metadata: ResolvedItem) -> bool {
        match self.slot_mut(slot) {
            Some(target) if &target.id == id => {
                target.metadata = Some(metadata);
                true
            }
            _ => false,
        }
    }

    fn resolved(&self) -> impl Iterator<Item = &ResolvedItem> {
        [self.current.as_ref(), self.speculative.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|target| target.metadata.as_ref())
    }
}

pub fn is_muted(resolved: &ResolvedItem, mute: &dyn MuteFilter) -> bool {
    mute.is_item_muted(&resolved.item.tags) || mute.is_owner_muted(&resolved.item.owner_id)
}

/// What to preload for one item, most important first.
///
/// Animations preload their frame archive, then the first page's full image
/// as a fallback. Other items preload every preview, then only the first
/// page's full image.
pub fn derive_candidates(resolved: &ResolvedItem, mute: &dyn MuteFilter) -> Vec<PreloadCandidate> {
    if is_muted(resolved, mute) {
        return Vec::new();
    }

    let item = &resolved.item;
    let first_full = item
        .pages
        .first()
        .map(|page| PreloadCandidate::image(page.full_url.as_str()));

    if item.is_animation() {
        return item
            .animation
            .as_ref()
            .map(|animation| PreloadCandidate::resource(animation.archive_url.as_str()))
            .into_iter()
            .chain(first_full)
            .collect();
    }

    item.pages
        .iter()
        .map(|page| PreloadCandidate::image(page.preview_url.as_str()))
        .chain(first_full)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreloadState {
    Running,
    /// Asked to cancel, still waiting for the fetch to settle.
    Cancelling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEntry {
    pub task_id: u64,
    pub url: String,
    pub state: PreloadState,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub wanted: Vec<PreloadCandidate>,
    pub start: Option<PreloadCandidate>,
    pub cancel: Vec<u64>,
}

/// Decides which preload to start and which to cancel.
///
/// Only one preload runs at a time. An entry still cancelling keeps the slot
/// until it settles. `max_width` bounds how far past recently completed URLs
/// the list looks; it does not allow parallel fetches.
pub fn reconcile(
    candidates: Vec<PreloadCandidate>,
    recent: &RecentlyCompleted,
    active: &[ActiveEntry],
    max_width: usize,
) -> Plan {
    let wanted: Vec<PreloadCandidate> = candidates
        .into_iter()
        .filter(|candidate| !recent.contains(&candidate.url))
        .take(max_width)
        .collect();

    // Nothing left to do: let whatever is running finish.
    if wanted.is_empty() {
        return Plan::default();
    }

    let cancel = active
        .iter()
        .filter(|entry| entry.state == PreloadState::Running)
        .filter(|entry| !wanted.iter().any(|candidate| candidate.url == entry.url))
        .map(|entry| entry.task_id)
        .collect();

    let start = if active.is_empty() {
        wanted.first().cloned()
    } else {
        None
    };

    Plan {
        wanted,
        start,
        cancel,
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSnapshot {
    pub targets: Targets,
    pub active: Vec<ActiveEntry>,
    pub recently_completed: usize,
}

/// Preloads payloads for the current and speculative items, one at a time.
#[derive(Clone)]
pub struct PreloadScheduler {
    inner: Arc<SchedulerShared>,
}

struct SchedulerShared {
    cache: ContentCache,
    transport: Arc<dyn Transport>,
    mute: Arc<dyn MuteFilter>,
    config: PreloadConfig,
    next_task_id: AtomicU64,
    // Never held across an await.
    state: Mutex<SchedulerState>,
}

struct SchedulerState {
    targets: Targets,
    active: Vec<ActivePreload>,
    recent: RecentlyCompleted,
}

struct ActivePreload {
    entry: ActiveEntry,
    task: PreloadTask,
}

impl PreloadScheduler {
    pub fn new(
        cache: ContentCache,
        transport: Arc<dyn Transport>,
        mute: Arc<dyn MuteFilter>,
        config: PreloadConfig,
    ) -> Self {
        let recent = RecentlyCompleted::new(config.recent_capacity);
        Self {
            inner: Arc::new(SchedulerShared {
                cache,
                transport,
                mute,
                config,
                next_task_id: AtomicU64::new(1),
                state: Mutex::new(SchedulerState {
                    targets: Targets::default(),
                    active: Vec::new(),
                    recent,
                }),
            }),
        }
    }

    pub async fn set_current_target(&self, id: Option<ItemId>) {
        self.set_target(TargetSlot::Current, id).await;
    }

    pub async fn set_speculative_target(&self, id: Option<ItemId>) {
        self.set_target(TargetSlot::Speculative, id).await;
    }

    async fn set_target(&self, slot: TargetSlot, id: Option<ItemId>) {
        let changed = self.state().targets.retarget(slot, id.clone());
        if !changed {
            return;
        }
        debug!("{:?} target is now {:?}", slot, id);

        let Some(id) = id else {
            return;
        };

        let scheduler = self.clone();
        let requested = id.clone();
        self.inner
            .cache
            .request_item(
                id,
                Some(Box::new(move |item| {
                    scheduler.on_target_resolved(slot, requested, item)
                })),
            )
            .await;
    }

    /// Drops both targets and cancels every running preload. Cancelled
    /// preloads stay listed until they settle.
    pub fn clear(&self) {
        let mut state = self.state();
        state.targets = Targets::default();
        for active in &mut state.active {
            if active.entry.state == PreloadState::Running {
                active.entry.state = PreloadState::Cancelling;
                active.task.cancel();
            }
        }
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.state();
        SchedulerSnapshot {
            targets: state.targets.clone(),
            active: state.active.iter().map(|a| a.entry.clone()).collect(),
            recently_completed: state.recent.len(),
        }
    }

    pub fn recently_completed(&self, url: &str) -> bool {
        self.state().recent.contains(url)
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn on_target_resolved(&self, slot: TargetSlot, id: ItemId, item: ResolvedItem) {
        let fresh = self.state().targets.resolve(slot, &id, item.clone());
        if !fresh {
            debug!("discarding stale metadata for {} ({:?})", id, slot);
            return;
        }

        if self.inner.config.eager_previews {
            self.load_previews(&item);
        }
        self.reevaluate();
    }

    // Outside the one-at-a-time queue.
    fn load_previews(&self, resolved: &ResolvedItem) {
        if is_muted(resolved, self.inner.mute.as_ref()) {
            return;
        }

        for page in &resolved.item.pages {
            let task = PreloadTask::new(
                PreloadCandidate::image(page.preview_url.as_str()),
                self.inner.transport.clone(),
            );
            let url = page.preview_url.clone();
            let fetch = task.start();
            tokio::spawn(async move {
                if let Err(e) = fetch.await {
                    debug!("preview {} not loaded: {}", url, e);
                }
            });
        }
    }

    fn reevaluate(&self) {
        let mut state = self.state();

        let candidates: Vec<PreloadCandidate> = state
            .targets
            .resolved()
            .flat_map(|item| derive_candidates(item, self.inner.mute.as_ref()))
            .collect();
        let entries: Vec<ActiveEntry> = state.active.iter().map(|a| a.entry.clone()).collect();
        let plan = reconcile(
            candidates,
            &state.recent,
            &entries,
            self.inner.config.max_width,
        );

        for active in &mut state.active {
            if plan.cancel.contains(&active.entry.task_id) {
                debug!("cancelling preload {}", active.entry.url);
                active.entry.state = PreloadState::Cancelling;
                active.task.cancel();
            }
        }

        let Some(candidate) = plan.start else {
            return;
        };

        let task_id = self.inner.next_task_id.fetch_add(1, Ordering::SeqCst);
        let task = PreloadTask::new(candidate.clone(), self.inner.transport.clone());
        let fetch = task.start();
        state.active.push(ActivePreload {
            entry: ActiveEntry {
                task_id,
                url: candidate.url.clone(),
                state: PreloadState::Running,
            },
            task,
        });
        drop(state);

        debug!("preloading {} ({:?})", candidate.url, candidate.strategy);
        let scheduler = self.clone();
        tokio::spawn(async move {
            let result = fetch.await;
            scheduler.on_settled(task_id, candidate.url, result);
        });
    }

    fn on_settled(&self, task_id: u64, url: String, result: Result<()>) {
        match &result {
            Ok(()) => debug!("preloaded {}", url),
            Err(e) => debug!("preload {} ended: {}", url, e),
        }

        {
            let mut state = self.state();
            state.recent.insert(url);
            state.active.retain(|a| a.entry.task_id != task_id);
        }
        self.reevaluate();
    }
}
