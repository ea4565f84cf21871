use std::path::PathBuf;

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults, the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory of reference songs to match hums against.
    pub songs_dir: Option<PathBuf>,
    /// Custom feature cache path (overrides XDG default).
    pub cache_path: Option<PathBuf>,
    /// Play corpus JSON (overrides XDG default).
    pub plays_path: Option<PathBuf>,
    /// Latent vectors JSON (overrides XDG default).
    pub latents_path: Option<PathBuf>,
    /// Cache reuse tolerance when comparing file modification times, seconds.
    pub mtime_tolerance_secs: f64,
    /// Sample rate audio is decoded to before feature extraction.
    pub target_sample_rate: u32,
    /// Number of parallel workers. 0 = auto-detect (cores / 2, min 1).
    pub workers: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            songs_dir: None,
            cache_path: None,
            plays_path: None,
            latents_path: None,
            mtime_tolerance_secs: 1.0,
            target_sample_rate: 22050,
            workers: 0,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/pitchmatch/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        let config_path = Self::config_path();
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Resolve worker count: 0 → auto-detect (cores / 2, min 1).
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            let cores = std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2);
            (cores / 2).max(1)
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve a default path in the XDG data directory.
fn default_data_path(file_name: &str) -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join(file_name)
    } else {
        // Fallback: current directory
        PathBuf::from(file_name)
    }
}

/// Default feature cache path.
pub fn default_cache_path() -> PathBuf {
    default_data_path("feature_cache.json")
}

/// Default play corpus path.
pub fn default_plays_path() -> PathBuf {
    default_data_path("plays.json")
}

/// Default latent vectors path.
pub fn default_latents_path() -> PathBuf {
    default_data_path("play_latents.json")
}
