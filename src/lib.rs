pub mod audio;
pub mod cache;
pub mod config;
pub mod library;
pub mod matcher;
pub mod plays;
pub mod similarity;
pub mod vector;

/// Audio file extensions accepted as corpus entries or query clips.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "mp4", "m4a", "ogg"];

/// Application name for XDG paths
pub const APP_NAME: &str = "pitchmatch";
