//! Reader configuration

use crate::layout::PageLayout;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main reader configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub reader: ViewerConfig,
    pub download: DownloadConfig,
    pub privacy: PrivacyConfig,
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub page_layout: PageLayout,
    pub reading_direction: ReadingDirection,
    /// Start loading previous/next chapters right after opening
    pub preload_adjacent: bool,
    /// Reopen an already read chapter at its first page on later sessions of the same process
    pub restart_read_chapters: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            page_layout: PageLayout::Single,
            reading_direction: ReadingDirection::RightToLeft,
            preload_adjacent: true,
            restart_read_chapters: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Chapters to keep downloaded ahead of the reading position (0 disables)
    pub download_ahead: usize,
    /// Delete the chapter this many places behind a completed one (-1 disables)
    pub remove_after_read_slots: i32,
    /// Manga in any of these categories never delete after reading
    pub remove_exclude_categories: Vec<i64>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_ahead: 0,
            remove_after_read_slots: -1,
            remove_exclude_categories: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Do not record history, nor progress of untracked manga
    pub incognito: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Report completed chapters to attached trackers
    pub update_on_read: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self { update_on_read: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadingDirection {
    #[serde(rename = "ltr")]
    LeftToRight,
    #[serde(rename = "rtl")]
    RightToLeft,
}

impl ReaderConfig {
    /// Load configuration from the default location
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config = Self::from_toml(&content)?;
            tracing::info!("Configuration loaded from {:?}", config_path);
            Ok(config)
        } else {
            tracing::info!("Using default configuration");
            Ok(Self::default())
        }
    }

    /// Parse configuration text; missing keys fall back to defaults
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        tracing::info!("Configuration saved to {:?}", config_path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("com", "MangaReader", "MangaReader")
            .map(|dirs| dirs.config_dir().join("reader.toml"))
            .unwrap_or_else(|| PathBuf::from("./reader.toml"))
    }

    /// Delete-after-read is active
    pub fn delete_after_read_enabled(&self) -> bool {
        self.download.remove_after_read_slots >= 0
    }
}
