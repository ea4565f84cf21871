//! AI feature extraction via the external `basic-pitch` note-detection tool.
//!
//! The model is optional: when the executable is not installed the AI method
//! reports itself unavailable and the DSP path keeps serving. Detected notes
//! become a plain 128-bin MIDI histogram — no key normalization, no chroma —
//! so AI vectors live in their own cache namespace and are only compared
//! against other AI vectors.

use std::path::Path;
use std::process::Command;

use super::ExtractError;
use crate::vector::normalize_l2_in_place;

/// Fixed detection thresholds for the note-detection model.
const ONSET_THRESHOLD: &str = "0.5";
const FRAME_THRESHOLD: &str = "0.3";
/// Minimum note length in milliseconds (~11 model frames).
const MIN_NOTE_LENGTH_MS: &str = "127.7";
const MIN_FREQ_HZ: &str = "1";
const MAX_FREQ_HZ: &str = "3500";

const TOOL: &str = "basic-pitch";

/// Whether the external note-detection tool is installed.
pub fn is_available() -> bool {
    Command::new(TOOL)
        .arg("--help")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Run the note-detection model on an audio file and build the normalized
/// 128-bin pitch histogram from its note events.
pub fn extract(path: &Path) -> Result<Vec<f64>, ExtractError> {
    if !is_available() {
        return Err(ExtractError::Unavailable(format!(
            "{TOOL} executable not found (install with: pip install basic-pitch)"
        )));
    }

    // The tool writes its note-event CSV into an output directory.
    let out_dir = std::env::temp_dir().join(format!("pitchmatch_notes_{}", std::process::id()));
    std::fs::create_dir_all(&out_dir)?;

    let output = Command::new(TOOL)
        .arg(&out_dir)
        .arg(path)
        .args(["--save-note-events"])
        .args(["--onset-threshold", ONSET_THRESHOLD])
        .args(["--frame-threshold", FRAME_THRESHOLD])
        .args(["--minimum-note-length", MIN_NOTE_LENGTH_MS])
        .args(["--minimum-frequency", MIN_FREQ_HZ])
        .args(["--maximum-frequency", MAX_FREQ_HZ])
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        std::fs::remove_dir_all(&out_dir).ok();
        return Err(ExtractError::Tool(stderr));
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let csv_path = out_dir.join(format!("{stem}_basic_pitch.csv"));
    let csv = std::fs::read_to_string(&csv_path);
    std::fs::remove_dir_all(&out_dir).ok();

    let notes = parse_note_events(&csv.map_err(ExtractError::Io)?);
    histogram_from_notes(&notes).ok_or(ExtractError::NoNotes)
}

/// Parse MIDI pitches from the tool's note-event CSV
/// (`start_time_s,end_time_s,pitch_midi,velocity,pitch_bend`).
fn parse_note_events(csv: &str) -> Vec<i64> {
    let mut lines = csv.lines();
    let pitch_col = lines
        .next()
        .map(|header| {
            header
                .split(',')
                .position(|col| col.trim() == "pitch_midi")
                .unwrap_or(2)
        })
        .unwrap_or(2);

    lines
        .filter_map(|line| {
            line.split(',')
                .nth(pitch_col)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .map(|p| p.round() as i64)
        })
        .collect()
}

/// Plain occurrence histogram over MIDI notes, L2-normalized; a zero-norm
/// histogram is returned unnormalized. None when no notes land in range.
fn histogram_from_notes(notes: &[i64]) -> Option<Vec<f64>> {
    let mut hist = vec![0.0f64; 128];
    let mut any = false;
    for &note in notes {
        if (0..128).contains(&note) {
            hist[note as usize] += 1.0;
            any = true;
        }
    }
    if !any {
        return None;
    }
    normalize_l2_in_place(&mut hist);
    Some(hist)
}
