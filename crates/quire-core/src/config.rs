use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `[index] path`.
pub const INDEX_PATH_ENV: &str = "QUIRE_INDEX_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuireConfig {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// SQLite database path. Relative paths resolve against the project root.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    /// Events processed between worker `Progress` messages.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            progress_interval: default_progress_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Timeout for a single fetch attempt, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            attempts: default_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Capacity of the indexing event broadcast channel.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// Load `.quire/config.toml` under `project_root`, falling back to defaults
/// when the file is absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_project_config(project_root: &Path) -> Result<QuireConfig> {
    let path = project_root.join(".quire/config.toml");
    if !path.exists() {
        return Ok(QuireConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<QuireConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load the project config, apply environment overrides, and make the index
/// path absolute.
///
/// # Errors
///
/// Returns an error if the project config cannot be read or parsed.
pub fn resolve_config(project_root: &Path) -> Result<QuireConfig> {
    let mut config = load_project_config(project_root)?;
    apply_overrides(&mut config, project_root, env::var(INDEX_PATH_ENV).ok());
    Ok(config)
}

fn apply_overrides(config: &mut QuireConfig, project_root: &Path, index_path: Option<String>) {
    if let Some(path) = index_path.filter(|p| !p.trim().is_empty()) {
        config.index.path = PathBuf::from(path);
    }
    if config.index.path.is_relative() {
        config.index.path = project_root.join(&config.index.path);
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from(".quire/index.sqlite3")
}

const fn default_progress_interval() -> usize {
    100
}

const fn default_timeout_ms() -> u64 {
    5_000
}

const fn default_attempts() -> u32 {
    3
}

const fn default_channel_capacity() -> usize {
    64
}
