//! Persistent bridge configuration model and defaults.

use std::path::{Path, PathBuf};

use log::info;

use crate::backends::SearchLimits;

/// File name of the configuration inside the user's config directory.
pub const CONFIG_FILE_NAME: &str = "tunebridge.toml";

/// Root configuration persisted to `tunebridge.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    #[serde(default)]
    /// Content session start-up settings.
    pub session: SessionConfig,
    #[serde(default)]
    /// Audio delivery behavior.
    pub audio: AudioConfig,
    #[serde(default)]
    /// Browse and search behavior.
    pub browse: BrowseConfig,
    #[serde(default)]
    /// Shutdown timeouts.
    pub shutdown: ShutdownConfig,
}

/// Settings handed to the content session when it is created.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Session cache directory. Empty selects `<cache dir>/tunebridge`.
    #[serde(default)]
    pub cache_location: String,
}

/// Audio delivery behavior.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AudioConfig {
    /// Buffers allowed in the pipe's audio queue before delivery pushes back.
    #[serde(default = "default_queue_watermark")]
    pub queue_watermark: usize,
}

/// Browse and search behavior.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct BrowseConfig {
    #[serde(default = "default_search_limit")]
    pub search_track_limit: usize,
    #[serde(default = "default_search_limit")]
    pub search_album_limit: usize,
    #[serde(default = "default_search_limit")]
    pub search_artist_limit: usize,
    /// Default for list requests on artist URIs: flat track listing instead
    /// of the section directory.
    #[serde(default)]
    pub expand_artist_albums: bool,
}

/// Shutdown timeouts.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ShutdownConfig {
    #[serde(default = "default_logout_timeout_ms")]
    pub logout_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            cache_location: String::new(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            queue_watermark: default_queue_watermark(),
        }
    }
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            search_track_limit: default_search_limit(),
            search_album_limit: default_search_limit(),
            search_artist_limit: default_search_limit(),
            expand_artist_albums: false,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            logout_timeout_ms: default_logout_timeout_ms(),
        }
    }
}

impl BrowseConfig {
    pub fn search_limits(&self) -> SearchLimits {
        SearchLimits {
            tracks: self.search_track_limit,
            albums: self.search_album_limit,
            artists: self.search_artist_limit,
        }
    }
}

impl SessionConfig {
    /// Resolved cache directory for the session.
    pub fn cache_dir(&self) -> PathBuf {
        if !self.cache_location.trim().is_empty() {
            return PathBuf::from(self.cache_location.trim());
        }
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("tunebridge")
    }
}

fn default_user_agent() -> String {
    format!("tunebridge/{}", env!("CARGO_PKG_VERSION"))
}

fn default_queue_watermark() -> usize {
    100
}

fn default_search_limit() -> usize {
    250
}

fn default_logout_timeout_ms() -> u64 {
    5_000
}

/// Clamps values that would stall delivery or make searches useless.
pub fn sanitize_config(config: Config) -> Config {
    Config {
        session: SessionConfig {
            user_agent: if config.session.user_agent.trim().is_empty() {
                default_user_agent()
            } else {
                config.session.user_agent.trim().to_string()
            },
            cache_location: config.session.cache_location,
        },
        audio: AudioConfig {
            queue_watermark: config.audio.queue_watermark.clamp(1, 10_000),
        },
        browse: BrowseConfig {
            search_track_limit: config.browse.search_track_limit.clamp(1, 1_000),
            search_album_limit: config.browse.search_album_limit.clamp(1, 1_000),
            search_artist_limit: config.browse.search_artist_limit.clamp(1, 1_000),
            expand_artist_albums: config.browse.expand_artist_albums,
        },
        shutdown: ShutdownConfig {
            logout_timeout_ms: config.shutdown.logout_timeout_ms.clamp(100, 60_000),
        },
    }
}

/// Default config location under the user's config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Loads the config file, writing defaults first when it does not exist.
pub fn load_or_create(path: &Path) -> Result<Config, String> {
    if !path.exists() {
        info!(
            "Config file not found. Creating default config. path={}",
            path.display()
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|err| format!("failed to create {}: {}", parent.display(), err))?;
        }
        let text = toml::to_string(&Config::default())
            .map_err(|err| format!("failed to serialize default config: {}", err))?;
        std::fs::write(path, text)
            .map_err(|err| format!("failed to write {}: {}", path.display(), err))?;
    }

    let content = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {}", path.display(), err))?;
    let config = toml::from_str::<Config>(&content).unwrap_or_else(|err| {
        log::warn!(
            "Config file is invalid, using defaults. path={} error={}",
            path.display(),
            err
        );
        Config::default()
    });
    Ok(sanitize_config(config))
}
