//! Configuration loading and validation

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use todoist_sync::fs;
use todoist_sync::SyncSettings;

/// Daemon configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Todoist API token (usually supplied via TODOIST_API_TOKEN instead)
    #[serde(default)]
    pub api_token: String,

    /// Vault folder mirroring the project hierarchy
    #[serde(default = "default_project_folder")]
    pub project_folder: String,

    /// Vault folder receiving notes of deleted projects
    #[serde(default = "default_archive_folder")]
    pub archive_folder: String,

    /// Seconds between passes; 0 disables periodic sync
    #[serde(default = "default_sync_frequency")]
    pub sync_frequency_seconds: u64,

    /// Hostname of the only device allowed to sync (empty = any device)
    #[serde(default)]
    pub primary_sync_device: String,

    /// Add a task linking back to each newly created note
    #[serde(default = "default_true")]
    pub create_breadcrumb_tasks: bool,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Vault name for breadcrumb links (defaults to the vault directory name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_name: Option<String>,
}

fn default_project_folder() -> String {
    "Projects".to_string()
}

fn default_archive_folder() -> String {
    "Archive".to_string()
}

fn default_sync_frequency() -> u64 {
    300 // 5 minutes
}

fn default_true() -> bool {
    true
}

fn default_api_base_url() -> String {
    "https://api.todoist.com/rest/v2".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            project_folder: default_project_folder(),
            archive_folder: default_archive_folder(),
            sync_frequency_seconds: default_sync_frequency(),
            primary_sync_device: String::new(),
            create_breadcrumb_tasks: true,
            api_base_url: default_api_base_url(),
            vault_name: None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a relative folder inside the vault without '..', got {value:?}")]
    InvalidFolder { key: &'static str, value: String },

    #[error("project_folder ({project:?}) and archive_folder ({archive:?}) must not contain one another")]
    NestedFolders { project: String, archive: String },

    #[error("No Todoist API token configured (set TODOIST_API_TOKEN or api_token)")]
    MissingToken,
}

impl Config {
    /// `~/.config/todoist-sync/config.json`
    pub fn default_path() -> PathBuf {
        expand_tilde("~/.config/todoist-sync/config.json")
    }

    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the defaults, which are also written out for
    /// reference.
    pub fn load(config_file: &Path) -> Result<Self> {
        if config_file.exists() {
            let content = std::fs::read_to_string(config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {:?}", config_file))?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            return Ok(config);
        }

        tracing::info!("No config file found at {:?}, using defaults", config_file);
        let config = Config::default();

        if let Some(dir) = config_file.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {:?}", dir))?;
        }
        let content = serde_json::to_string_pretty(&config)?;
        std::fs::write(config_file, content)
            .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
        tracing::info!("Created default config at {:?}", config_file);

        Ok(config)
    }

    /// Check folder settings and the presence of a token.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        check_folder("project_folder", &self.project_folder)?;
        check_folder("archive_folder", &self.archive_folder)?;

        let project = self.project_folder.trim_matches('/');
        let archive = self.archive_folder.trim_matches('/');
        if fs::is_within(project, archive) || fs::is_within(archive, project) {
            return Err(ConfigError::NestedFolders {
                project: self.project_folder.clone(),
                archive: self.archive_folder.clone(),
            });
        }

        if self.api_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_frequency_seconds)
    }

    /// Engine settings for a vault at `vault_path`.
    pub fn settings(&self, vault_path: &Path) -> SyncSettings {
        let vault_name = self.vault_name.clone().unwrap_or_else(|| {
            vault_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("vault")
                .to_string()
        });

        SyncSettings {
            project_folder: self.project_folder.trim_matches('/').to_string(),
            archive_folder: self.archive_folder.trim_matches('/').to_string(),
            vault_name,
            create_breadcrumb_tasks: self.create_breadcrumb_tasks,
        }
    }
}

fn check_folder(key: &'static str, value: &str) -> std::result::Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidFolder {
        key,
        value: value.to_string(),
    };

    let trimmed = value.trim_matches('/');
    if trimmed.is_empty() || value.starts_with('/') || value.contains('\\') {
        return Err(invalid());
    }
    let escapes = Path::new(trimmed)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(invalid());
    }
    Ok(())
}

/// Expand ~ or ~/ prefix to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"))
    } else if let Some(rest) = path.strip_prefix("~/") {
        dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path))
    } else {
        PathBuf::from(path)
    }
}
