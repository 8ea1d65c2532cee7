use nutriscan_api::Timeouts;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that points the scanner at a different service
pub const API_URL_ENV: &str = "NUTRISCAN_API_URL";

/// Main configuration structure
///
/// Loaded from the config file, then environment, then CLI flags.
/// Later sources win.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

impl Config {
    /// Load config from the default location, falling back to defaults
    pub fn load() -> crate::Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)
                .map_err(|e| crate::Error::ConfigError(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> crate::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> crate::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::ConfigError(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// `<config dir>/nutriscan/config.toml`
    pub fn config_path() -> crate::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| crate::Error::ConfigError("Could not find config directory".into()))?
            .join("nutriscan");

        Ok(config_dir.join("config.toml"))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api.base_url = url;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    /// Base URL of the product service, e.g. http://10.0.0.5/api
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_lookup_timeout")]
    pub lookup_timeout_secs: u64,

    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,

    #[serde(default = "default_sync_timeout")]
    pub sync_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost/api".to_string()
}

fn default_lookup_timeout() -> u64 {
    5
}

fn default_health_timeout() -> u64 {
    3
}

fn default_submit_timeout() -> u64 {
    10
}

fn default_sync_timeout() -> u64 {
    5
}

impl ApiConfig {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            lookup: Duration::from_secs(self.lookup_timeout_secs),
            health: Duration::from_secs(self.health_timeout_secs),
            submit: Duration::from_secs(self.submit_timeout_secs),
            sync: Duration::from_secs(self.sync_timeout_secs),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            lookup_timeout_secs: default_lookup_timeout(),
            health_timeout_secs: default_health_timeout(),
            submit_timeout_secs: default_submit_timeout(),
            sync_timeout_secs: default_sync_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CacheConfig {
    /// Where the SQLite file lives. Defaults to the platform data dir.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl CacheConfig {
    pub fn resolved_db_path(&self) -> crate::Result<PathBuf> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(dirs::data_dir()
                .ok_or_else(|| crate::Error::ConfigError("Could not find data directory".into()))?
                .join("nutriscan")
                .join("nutrition_cache.db")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureConfig {
    /// How long the same barcode stays suppressed in continuous mode
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Empty frames between "no barcode" hints. 0 disables hints.
    #[serde(default = "default_hint_frames")]
    pub no_barcode_hint_frames: u32,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Pacing for scripted sources, roughly 30 fps
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

fn default_cooldown_ms() -> u64 {
    2000
}

fn default_hint_frames() -> u32 {
    30
}

fn default_event_capacity() -> usize {
    32
}

fn default_frame_interval_ms() -> u64 {
    33
}

impl CaptureConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: default_cooldown_ms(),
            no_barcode_hint_frames: default_hint_frames(),
            event_capacity: default_event_capacity(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}
