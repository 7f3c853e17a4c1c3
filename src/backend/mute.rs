use std::collections::HashSet;

use super::models::OwnerId;
use crate::settings::Settings;

/// Decides whether content is blocked and must not be fetched or preloaded.
pub trait MuteFilter: Send + Sync {
    fn is_item_muted(&self, tags: &[String]) -> bool;

    fn is_owner_muted(&self, owner_id: &OwnerId) -> bool;
}

/// Mutes from the settings file. Tags compare case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct MuteList {
    tags: HashSet<String>,
    owners: HashSet<String>,
}

impl MuteList {
    pub fn new<T, O>(tags: T, owners: O) -> Self
    where
        T: IntoIterator<Item = String>,
        O: IntoIterator<Item = String>,
    {
        MuteList {
            tags: tags.into_iter().map(|t| t.to_lowercase()).collect(),
            owners: owners.into_iter().collect(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.muted_tags.iter().cloned(),
            settings.muted_owners.iter().cloned(),
        )
    }
}

impl MuteFilter for MuteList {
    fn is_item_muted(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.tags.contains(&t.to_lowercase()))
    }

    fn is_owner_muted(&self, owner_id: &OwnerId) -> bool {
        self.owners.contains(owner_id.as_str())
    }
}
