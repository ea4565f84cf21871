//! Song library loading: scan the dataset directory, reuse cached feature
//! vectors when the source file is unchanged, extract the rest in parallel,
//! and garbage-collect cache entries for files that disappeared.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use thiserror::Error;
use walkdir::WalkDir;

use crate::SUPPORTED_EXTENSIONS;
use crate::audio::{self, ExtractError, Method};
use crate::cache::{CacheRecord, CacheStore, cache_key};

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("cache error: {0}")]
    Cache(#[from] crate::cache::CacheError),
    #[error("extraction unavailable: {0}")]
    Unavailable(String),
}

/// One indexed song with its feature vector.
#[derive(Debug, Clone)]
pub struct SongEntry {
    pub filename: String,
    pub title: String,
    pub artist: String,
    pub vector: Vec<f64>,
}

/// Counters from a refresh pass.
#[derive(Debug, Default, Clone)]
pub struct RefreshStats {
    pub cached: usize,
    pub extracted: usize,
    pub skipped: usize,
    pub removed: usize,
    pub dataset_missing: bool,
}

#[derive(Debug, Default)]
pub struct SongLibrary {
    pub songs: Vec<SongEntry>,
    pub stats: RefreshStats,
}

/// Derive `(artist, title)` from a song filename.
///
/// `Artist - Title.mp3` splits on the first dash. `Artist_Name_Title.mp3`
/// falls back to the last underscore, with the artist's underscores read as
/// spaces. Anything else keeps the whole stem as the title.
pub fn parse_song_name(filename: &str) -> (String, String) {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => filename,
    };

    if let Some((artist, title)) = stem.split_once('-') {
        let artist = artist.trim();
        let title = title.trim();
        if !artist.is_empty() && !title.is_empty() {
            return (artist.to_string(), title.to_string());
        }
    }

    if let Some((artist, title)) = stem.rsplit_once('_') {
        let artist = artist.trim().replace('_', " ");
        let title = title.trim();
        if !artist.is_empty() && !title.is_empty() {
            return (artist, title.to_string());
        }
    }

    ("Unknown Artist".to_string(), stem.trim().to_string())
}

/// Load the song library for a method, refreshing the feature cache.
pub fn load_song_library(
    dataset_dir: &Path,
    method: Method,
    cache_path: &Path,
    tolerance_secs: f64,
    target_rate: u32,
    workers: usize,
) -> Result<SongLibrary, LibraryError> {
    load_song_library_with(dataset_dir, method, cache_path, tolerance_secs, workers, |path| {
        audio::extract_vector(path, method, target_rate)
    })
}

/// Same as [`load_song_library`] but with an injectable extractor, so cache
/// behavior can be exercised without real audio files.
pub fn load_song_library_with<F>(
    dataset_dir: &Path,
    method: Method,
    cache_path: &Path,
    tolerance_secs: f64,
    workers: usize,
    extractor: F,
) -> Result<SongLibrary, LibraryError>
where
    F: Fn(&Path) -> Result<Vec<f64>, ExtractError> + Sync,
{
    let mut stats = RefreshStats::default();

    if !dataset_dir.is_dir() {
        log::warn!("Song dataset directory not found: {}", dataset_dir.display());
        stats.dataset_missing = true;
        return Ok(SongLibrary {
            songs: Vec::new(),
            stats,
        });
    }

    let mut cache = CacheStore::load(cache_path);
    let mut dirty = false;

    let mut files = collect_audio_files(dataset_dir);
    files.sort_by(|a, b| a.0.cmp(&b.0));

    let mut songs: Vec<SongEntry> = Vec::with_capacity(files.len());
    let mut current_keys: HashSet<String> = HashSet::with_capacity(files.len());
    // (corpus position, filename, path) still needing extraction.
    let mut pending: Vec<(usize, String, PathBuf)> = Vec::new();

    for (filename, path) in files {
        let key = cache_key(&filename, method);
        current_keys.insert(key.clone());

        let mtime = match file_mtime_secs(&path) {
            Some(m) => m,
            None => {
                log::warn!("Cannot stat {}, skipping", path.display());
                stats.skipped += 1;
                continue;
            }
        };

        let (artist, title) = parse_song_name(&filename);

        if let Some(record) = cache.get(&key) {
            if (record.mtime - mtime).abs() < tolerance_secs {
                songs.push(SongEntry {
                    filename,
                    title: record.title.clone(),
                    artist,
                    vector: record.vector.clone(),
                });
                stats.cached += 1;
                continue;
            }
            log::info!("File changed, re-extracting: {filename}");
        }

        songs.push(SongEntry {
            filename: filename.clone(),
            title,
            artist,
            vector: Vec::new(),
        });
        pending.push((songs.len() - 1, filename, path));
    }

    if !pending.is_empty() {
        let extracted = extract_pending(&pending, workers, &extractor)?;

        let mut failed: Vec<usize> = Vec::new();
        for ((position, filename, path), result) in pending.into_iter().zip(extracted) {
            match result {
                Ok(vector) => {
                    let mtime = file_mtime_secs(&path).unwrap_or(0.0);
                    let key = cache_key(&filename, method);
                    cache.insert(
                        key,
                        CacheRecord {
                            mtime,
                            title: songs[position].title.clone(),
                            vector: vector.clone(),
                        },
                    );
                    songs[position].vector = vector;
                    dirty = true;
                    stats.extracted += 1;
                }
                Err(e) => {
                    // The file is still present, so any cache record it has
                    // stays; only vanished files are garbage-collected.
                    log::warn!("Failed to extract features from {filename}: {e}");
                    failed.push(position);
                    stats.skipped += 1;
                }
            }
        }

        // Drop failed entries without disturbing the order of the rest.
        failed.sort_unstable();
        for position in failed.into_iter().rev() {
            songs.remove(position);
        }
    }

    let removed = cache.remove_stale(method, &current_keys);
    if removed > 0 {
        dirty = true;
        stats.removed = removed;
    }

    if dirty {
        cache.save(cache_path)?;
    }

    log::info!(
        "Song library loaded: {} songs ({} cached, {} extracted, {} skipped, {} removed)",
        songs.len(),
        stats.cached,
        stats.extracted,
        stats.skipped,
        stats.removed
    );

    Ok(SongLibrary { songs, stats })
}

/// Top-level audio files of the dataset directory, as `(filename, path)`.
fn collect_audio_files(dataset_dir: &Path) -> Vec<(String, PathBuf)> {
    WalkDir::new(dataset_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let path = entry.path().to_path_buf();
            let ext = path.extension()?.to_str()?.to_lowercase();
            if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
                return None;
            }
            let filename = path.file_name()?.to_str()?.to_string();
            Some((filename, path))
        })
        .collect()
}

fn file_mtime_secs(path: &Path) -> Option<f64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
    Some(since_epoch.as_secs_f64())
}

/// Run the extractor over pending files in a scoped rayon pool with a
/// progress bar.
fn extract_pending<F>(
    pending: &[(usize, String, PathBuf)],
    workers: usize,
    extractor: &F,
) -> Result<Vec<Result<Vec<f64>, ExtractError>>, LibraryError>
where
    F: Fn(&Path) -> Result<Vec<f64>, ExtractError> + Sync,
{
    let bar = ProgressBar::new(pending.len() as u64);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-"),
    );
    bar.set_message("extracting features");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| LibraryError::Unavailable(format!("thread pool: {e}")))?;

    let results = pool.install(|| {
        pending
            .par_iter()
            .map(|(_, _, path)| {
                let result = extractor(path);
                bar.inc(1);
                result
            })
            .collect::<Vec<_>>()
    });

    bar.finish_and_clear();
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn make_dataset(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for name in files {
            std::fs::write(dir.path().join(name), b"fake audio").unwrap();
        }
        dir
    }

    fn counting_extractor(calls: &AtomicUsize) -> impl Fn(&Path) -> Result<Vec<f64>, ExtractError> + Sync + '_ {
        move |_path| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    #[test]
    fn test_parse_song_name_dash() {
        let (artist, title) = parse_song_name("Queen - Bohemian Rhapsody.mp3");
        assert_eq!(artist, "Queen");
        assert_eq!(title, "Bohemian Rhapsody");
    }

    #[test]
    fn test_parse_song_name_underscore() {
        let (artist, title) = parse_song_name("Daft_Punk_Aerodynamic.flac");
        assert_eq!(artist, "Daft Punk");
        assert_eq!(title, "Aerodynamic");
    }

    #[test]
    fn test_parse_song_name_plain() {
        let (artist, title) = parse_song_name("melody.wav");
        assert_eq!(artist, "Unknown Artist");
        assert_eq!(title, "melody");
    }

    #[test]
    fn test_missing_dataset_dir() {
        let dir = tempfile::tempdir().unwrap();
        let lib = load_song_library_with(
            &dir.path().join("absent"),
            Method::Dsp,
            &dir.path().join("cache.json"),
            1.0,
            1,
            |_| Ok(vec![1.0]),
        )
        .unwrap();
        assert!(lib.songs.is_empty());
        assert!(lib.stats.dataset_missing);
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let dataset = make_dataset(&["a - one.mp3", "b - two.mp3"]);
        let cache_dir = tempfile::tempdir().unwrap();
        let cache_path = cache_dir.path().join("cache.json");
        let calls = AtomicUsize::new(0);

        let first = load_song_library_with(
            dataset.path(),
            Method::Dsp,
            &cache_path,
            1.0,
            1,
            counting_extractor(&calls),
        )
        .unwrap();
        assert_eq!(first.stats.extracted, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let snapshot = std::fs::read(&cache_path).unwrap();

        let second = load_song_library_with(
            dataset.path(),
            Method::Dsp,
            &cache_path,
            1.0,
            1,
            counting_extractor(&calls),
        )
        .unwrap();
        assert_eq!(second.stats.cached, 2);
        assert_eq!(second.stats.extracted, 0);
        // No second extraction, no rewrite.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(std::fs::read(&cache_path).unwrap(), snapshot);
    }

    #[test]
    fn test_songs_sorted_by_filename() {
        let dataset = make_dataset(&["zebra - z.mp3", "alpha - a.mp3"]);
        let cache_dir = tempfile::tempdir().unwrap();
        let lib = load_song_library_with(
            dataset.path(),
            Method::Dsp,
            &cache_dir.path().join("cache.json"),
            1.0,
            1,
            |_| Ok(vec![1.0]),
        )
        .unwrap();
        let names: Vec<&str> = lib.songs.iter().map(|s| s.filename.as_str()).collect();
        assert_eq!(names, vec!["alpha - a.mp3", "zebra - z.mp3"]);
    }

    #[test]
    fn test_mtime_within_tolerance_reuses_cache() {
        let dataset = make_dataset(&["a - one.mp3"]);
        let cache_dir = tempfile::tempdir().unwrap();
        let cache_path = cache_dir.path().join("cache.json");
        let calls = AtomicUsize::new(0);

        load_song_library_with(
            dataset.path(),
            Method::Dsp,
            &cache_path,
            1.0,
            1,
            counting_extractor(&calls),
        )
        .unwrap();

        // Nudge the stored mtime by less than the tolerance.
        let mut store = CacheStore::load(&cache_path);
        let key = cache_key("a - one.mp3", Method::Dsp);
        let mut rec = store.get(&key).unwrap().clone();
        rec.mtime += 0.5;
        store.insert(key, rec);
        store.save(&cache_path).unwrap();

        let lib = load_song_library_with(
            dataset.path(),
            Method::Dsp,
            &cache_path,
            1.0,
            1,
            counting_extractor(&calls),
        )
        .unwrap();
        assert_eq!(lib.stats.cached, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mtime_outside_tolerance_re_extracts() {
        let dataset = make_dataset(&["a - one.mp3"]);
        let cache_dir = tempfile::tempdir().unwrap();
        let cache_path = cache_dir.path().join("cache.json");
        let calls = AtomicUsize::new(0);

        load_song_library_with(
            dataset.path(),
            Method::Dsp,
            &cache_path,
            1.0,
            1,
            counting_extractor(&calls),
        )
        .unwrap();

        let mut store = CacheStore::load(&cache_path);
        let key = cache_key("a - one.mp3", Method::Dsp);
        let mut rec = store.get(&key).unwrap().clone();
        rec.mtime += 2.0;
        store.insert(key, rec);
        store.save(&cache_path).unwrap();

        let lib = load_song_library_with(
            dataset.path(),
            Method::Dsp,
            &cache_path,
            1.0,
            1,
            counting_extractor(&calls),
        )
        .unwrap();
        assert_eq!(lib.stats.extracted, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stale_entries_removed_per_method() {
        let dataset = make_dataset(&["a - one.mp3"]);
        let cache_dir = tempfile::tempdir().unwrap();
        let cache_path = cache_dir.path().join("cache.json");

        let mut store = CacheStore::default();
        store.insert(
            "vanished.mp3_dsp".into(),
            CacheRecord {
                mtime: 0.0,
                title: "Gone".into(),
                vector: vec![1.0],
            },
        );
        store.insert(
            "vanished.mp3_ai".into(),
            CacheRecord {
                mtime: 0.0,
                title: "Gone".into(),
                vector: vec![1.0],
            },
        );
        store.save(&cache_path).unwrap();

        let lib = load_song_library_with(
            dataset.path(),
            Method::Dsp,
            &cache_path,
            1.0,
            1,
            |_| Ok(vec![1.0]),
        )
        .unwrap();
        assert_eq!(lib.stats.removed, 1);

        let store = CacheStore::load(&cache_path);
        assert!(store.get("vanished.mp3_dsp").is_none());
        assert!(store.get("vanished.mp3_ai").is_some());
    }

    #[test]
    fn test_failed_extraction_skips_file() {
        let dataset = make_dataset(&["bad - clip.mp3", "good - clip.mp3"]);
        let cache_dir = tempfile::tempdir().unwrap();
        let lib = load_song_library_with(
            dataset.path(),
            Method::Dsp,
            &cache_dir.path().join("cache.json"),
            1.0,
            1,
            |path| {
                if path.file_name().is_some_and(|n| n.to_string_lossy().starts_with("bad")) {
                    Err(ExtractError::NoPitch)
                } else {
                    Ok(vec![1.0])
                }
            },
        )
        .unwrap();
        assert_eq!(lib.songs.len(), 1);
        assert_eq!(lib.songs[0].filename, "good - clip.mp3");
        assert_eq!(lib.stats.skipped, 1);
    }

    #[test]
    fn test_failed_re_extraction_keeps_cache_record() {
        let dataset = make_dataset(&["a - one.mp3"]);
        let cache_dir = tempfile::tempdir().unwrap();
        let cache_path = cache_dir.path().join("cache.json");

        // Stale record for a file that is still on disk.
        let mut store = CacheStore::default();
        store.insert(
            cache_key("a - one.mp3", Method::Dsp),
            CacheRecord {
                mtime: 0.0,
                title: "one".into(),
                vector: vec![1.0],
            },
        );
        store.save(&cache_path).unwrap();
        let snapshot = std::fs::read(&cache_path).unwrap();

        let lib = load_song_library_with(
            dataset.path(),
            Method::Dsp,
            &cache_path,
            1.0,
            1,
            |_| Err(ExtractError::NoPitch),
        )
        .unwrap();
        assert!(lib.songs.is_empty());
        assert_eq!(lib.stats.skipped, 1);
        assert_eq!(lib.stats.removed, 0);

        // Record survives and the snapshot is not rewritten.
        let store = CacheStore::load(&cache_path);
        assert!(store.get("a - one.mp3_dsp").is_some());
        assert_eq!(std::fs::read(&cache_path).unwrap(), snapshot);
    }

    #[test]
    fn test_non_audio_files_ignored() {
        let dataset = make_dataset(&["a - one.mp3", "notes.txt", "cover.jpg"]);
        let cache_dir = tempfile::tempdir().unwrap();
        let lib = load_song_library_with(
            dataset.path(),
            Method::Dsp,
            &cache_dir.path().join("cache.json"),
            1.0,
            1,
            |_| Ok(vec![1.0]),
        )
        .unwrap();
        assert_eq!(lib.songs.len(), 1);
    }
}
