//! Metadata cache and prioritized preloader for an image gallery viewer.
//!
//! [`ContentCache`] fetches item and owner metadata once per identifier and
//! hands fully resolved items to queued callbacks. [`PreloadScheduler`] follows
//! the item being viewed and the one likely to be viewed next, and preloads
//! their payloads one at a time, current item first.

pub mod backend;
pub mod error;
pub mod preload;
pub mod settings;

pub use backend::cache::{ContentCache, ItemCallback, OwnerCallback};
pub use backend::models::{
    AnimationFrame, AnimationMetadata, ContentKind, ItemId, ItemMetadata, OwnerId,
    OwnerMetadata, ResolvedItem, SharedOwner, SubPage,
};
pub use backend::mute::{MuteFilter, MuteList};
pub use backend::transport::{HttpTransport, Transport};
pub use error::{Error, Result};
pub use preload::recent::RecentlyCompleted;
pub use preload::scheduler::{PreloadScheduler, PreloadState, SchedulerSnapshot, TargetSlot};
pub use preload::task::{FetchStrategy, PreloadCandidate, PreloadTask};
pub use settings::{PreloadConfig, Settings};
