// Application settings
// Loaded from ~/.config/sheetjoin/settings.json (or $SHEETJOIN_CONFIG)

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming an alternative settings file.
pub const CONFIG_ENV: &str = "SHEETJOIN_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Storage
    #[serde(rename = "storage.dataDir")]
    pub data_dir: Option<PathBuf>,  // None = platform data dir

    #[serde(rename = "storage.snapshotFile")]
    pub snapshot_file: String,

    // Server
    #[serde(rename = "server.bind")]
    pub bind: String,

    #[serde(rename = "server.maxMessageBytes")]
    pub max_message_bytes: usize,

    #[serde(rename = "server.fileRoot")]
    pub file_root: Option<PathBuf>,  // None = storage.dataDir

    // Paging
    #[serde(rename = "view.pageSize")]
    pub page_size: usize,

    #[serde(rename = "view.maxPageSize")]
    pub max_page_size: usize,

    // Logging
    #[serde(rename = "log.level")]
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            snapshot_file: "tables.db".to_string(),
            bind: "127.0.0.1:7465".to_string(),
            max_message_bytes: 8 * 1024 * 1024,
            file_root: None,
            page_size: 50,
            max_page_size: 1000,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sheetjoin")
            .join("settings.json")
    }

    /// Load settings from the configured path.
    pub fn try_load() -> Result<Self, String> {
        Self::try_load_from(&Self::config_path())
    }

    /// Load from an explicit path. A missing file gives defaults; an
    /// unreadable or invalid one is an error naming the path.
    pub fn try_load_from(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {}", path.display(), e))?;
        Self::parse(&contents).map_err(|e| format!("Error parsing {}: {}", path.display(), e))
    }

    /// Parse settings JSON. Lines starting with `//` are comments.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");
        let settings: Settings = serde_json::from_str(&cleaned).map_err(|e| e.to_string())?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 || self.max_page_size == 0 {
            return Err("view.pageSize and view.maxPageSize must be positive".to_string());
        }
        if self.snapshot_file.trim().is_empty() {
            return Err("storage.snapshotFile must not be empty".to_string());
        }
        Ok(())
    }

    /// Save current settings to the configured path
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Directory holding the registry snapshot.
    pub fn data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("sheetjoin"),
        }
    }

    /// Directory that table server clients may read from and export into.
    pub fn file_root(&self) -> PathBuf {
        self.file_root.clone().unwrap_or_else(|| self.data_dir())
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir().join(&self.snapshot_file)
    }

    /// Requested page size, defaulted and clamped to `view.maxPageSize`.
    pub fn clamp_page_size(&self, requested: Option<usize>) -> usize {
        requested
            .filter(|&n| n > 0)
            .unwrap_or(self.page_size)
            .min(self.max_page_size)
    }

    /// Get the config file path for display
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}
