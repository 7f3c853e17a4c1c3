use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "gallery-preload";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub user_agent: String,
    pub endpoints: Endpoints,
    pub preload: PreloadConfig,
    pub muted_tags: HashSet<String>,
    pub muted_owners: HashSet<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            base_url: "https://gallery.example.com".to_string(),
            user_agent: "gallery-preload/0.1.0".to_string(),
            endpoints: Endpoints::default(),
            preload: PreloadConfig::default(),
            muted_tags: HashSet::new(),
            muted_owners: HashSet::new(),
        }
    }
}

/// Path templates for metadata requests. `{id}` is replaced with the
/// URL-encoded identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub item: String,
    pub animation: String,
    pub owner: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            item: "/ajax/item/{id}".to_string(),
            animation: "/ajax/item/{id}/animation".to_string(),
            owner: "/ajax/owner/{id}".to_string(),
        }
    }
}

impl Endpoints {
    pub fn item_path(&self, id: &str) -> String {
        fill(&self.item, id)
    }

    pub fn animation_path(&self, id: &str) -> String {
        fill(&self.animation, id)
    }

    pub fn owner_path(&self, id: &str) -> String {
        fill(&self.owner, id)
    }
}

fn fill(template: &str, id: &str) -> String {
    template.replace("{id}", &urlencoding::encode(id))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
    /// How many candidates reconciliation looks at after dropping recently
    /// completed URLs. This does not control concurrency: one preload runs at
    /// a time.
    pub max_width: usize,
    pub recent_capacity: usize,
    pub eager_previews: bool,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        PreloadConfig {
            max_width: 5,
            recent_capacity: 1000,
            eager_previews: true,
        }
    }
}

fn get_settings_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR);

    if let Err(e) = fs::create_dir_all(&config_dir) {
        log::warn!("failed to create {}: {}", config_dir.display(), e);
    }
    config_dir.join("settings.json")
}

impl Settings {
    pub fn load() -> Self {
        Self::load_from(&get_settings_path())
    }

    /// Reads settings from `path`. A missing file is created with defaults;
    /// an unreadable or malformed one is left alone and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            let settings = Settings::default();
            if let Err(e) = settings.save_to(path) {
                log::warn!("could not write {}: {}", path.display(), e);
            }
            return settings;
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(settings) => return settings,
                Err(e) => log::warn!("ignoring malformed {}: {}", path.display(), e),
            },
            Err(e) => log::warn!("failed to read {}: {}", path.display(), e),
        }

        Settings::default()
    }

    pub fn save(&self) -> crate::Result<()> {
        self.save_to(&get_settings_path())
    }

    pub fn save_to(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}
