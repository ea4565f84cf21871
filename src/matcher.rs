//! Hum-to-song matching: extract a query vector from a recorded clip and
//! rank the song library against it, independently per extraction method.
//!
//! A method failing (silent clip, model not installed) never takes down the
//! other method; each outcome carries either its ranked matches or an error
//! note, and the caller decides how to present partial results.

use std::path::Path;

use serde::Serialize;

use crate::audio::{self, Method};
use crate::library::{self, SongLibrary};
use crate::similarity::rank_top_k;

/// Which extraction methods a query should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodSelection {
    Dsp,
    Ai,
    Both,
}

impl MethodSelection {
    pub fn methods(&self) -> &'static [Method] {
        match self {
            MethodSelection::Dsp => &[Method::Dsp],
            MethodSelection::Ai => &[Method::Ai],
            MethodSelection::Both => &Method::ALL,
        }
    }
}

/// One ranked song match.
#[derive(Debug, Clone, Serialize)]
pub struct SongMatch {
    pub title: String,
    pub artist: String,
    pub filename: String,
    /// Cosine similarity rounded to 4 decimals for display.
    pub confidence: f64,
    pub method: String,
}

/// Result of one method's query: ranked matches, or why it produced none.
#[derive(Debug, Serialize)]
pub struct MethodOutcome {
    pub method: String,
    pub matches: Vec<SongMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MatchReport {
    pub outcomes: Vec<MethodOutcome>,
    pub ai_available: bool,
}

/// Library locations and tuning shared by every query.
#[derive(Debug, Clone)]
pub struct MatchParams<'a> {
    pub dataset_dir: &'a Path,
    pub cache_path: &'a Path,
    pub tolerance_secs: f64,
    pub target_rate: u32,
    pub workers: usize,
}

/// Match a hummed clip against the song library.
///
/// Ranking runs on full-precision vectors; only the reported confidence is
/// rounded.
pub fn find_matches(
    clip: &Path,
    params: &MatchParams,
    selection: MethodSelection,
    top_n: usize,
) -> MatchReport {
    let mut outcomes = Vec::new();

    for &method in selection.methods() {
        outcomes.push(run_method(clip, params, method, top_n));
    }

    MatchReport {
        outcomes,
        ai_available: audio::ai::is_available(),
    }
}

fn run_method(clip: &Path, params: &MatchParams, method: Method, top_n: usize) -> MethodOutcome {
    let query = match audio::extract_vector(clip, method, params.target_rate) {
        Ok(vector) => vector,
        Err(e) => {
            // An out-of-service method is expected degradation; a bad clip
            // is worth a warning.
            if e.is_unavailable() {
                log::info!("Method {method} unavailable: {e}");
            } else {
                log::warn!("Query extraction failed ({method}): {e}");
            }
            return MethodOutcome {
                method: method.to_string(),
                matches: Vec::new(),
                error: Some(e.to_string()),
            };
        }
    };

    let library = match library::load_song_library(
        params.dataset_dir,
        method,
        params.cache_path,
        params.tolerance_secs,
        params.target_rate,
        params.workers,
    ) {
        Ok(library) => library,
        Err(e) => {
            return MethodOutcome {
                method: method.to_string(),
                matches: Vec::new(),
                error: Some(e.to_string()),
            };
        }
    };

    MethodOutcome {
        method: method.to_string(),
        matches: rank_library(&query, &library, method, top_n),
        error: library_note(&library),
    }
}

/// Why a loaded library yields no matches, when it does not.
fn library_note(library: &SongLibrary) -> Option<String> {
    if library.stats.dataset_missing {
        Some("dataset directory not found".to_string())
    } else if library.songs.is_empty() {
        Some("song library is empty".to_string())
    } else {
        None
    }
}

fn rank_library(
    query: &[f64],
    library: &SongLibrary,
    method: Method,
    top_n: usize,
) -> Vec<SongMatch> {
    let corpus: Vec<(usize, &[f64])> = library
        .songs
        .iter()
        .enumerate()
        .map(|(i, song)| (i, song.vector.as_slice()))
        .collect();

    rank_top_k(query, &corpus, top_n, None)
        .into_iter()
        .map(|scored| {
            let song = &library.songs[scored.id];
            SongMatch {
                title: song.title.clone(),
                artist: song.artist.clone(),
                filename: song.filename.clone(),
                confidence: round4(scored.score),
                method: method.to_string(),
            }
        })
        .collect()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
