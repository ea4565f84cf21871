pub mod ai;
pub mod decode;
pub mod dsp;

use std::path::Path;
use thiserror::Error;

/// Feature extraction method. Each method has its own cache namespace and its
/// own fixed output dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Pitch histogram + chroma from in-process DSP.
    Dsp,
    /// Pitch histogram from the external note-detection model.
    Ai,
}

impl Method {
    pub const ALL: [Method; 2] = [Method::Dsp, Method::Ai];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Dsp => "dsp",
            Method::Ai => "ai",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("audio too quiet (peak amplitude below silence floor)")]
    TooQuiet,
    #[error("no pitch content detected")]
    NoPitch,
    #[error("no notes detected by the note-detection model")]
    NoNotes,
    #[error("AI note detection unavailable: {0}")]
    Unavailable(String),
    #[error("note-detection tool failed: {0}")]
    Tool(String),
    #[error("decode error: {0}")]
    Decode(#[from] decode::DecodeError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExtractError {
    /// True when the whole extraction method is out of service, as opposed to
    /// a single input being unusable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, ExtractError::Unavailable(_))
    }
}

/// Extract a feature vector from an audio file with the given method.
///
/// DSP decodes in-process and runs the pitch/chroma pipeline; AI hands the
/// file to the external note-detection tool. Both return a fixed-length
/// L2-normalized vector (zero-norm inputs stay unnormalized).
pub fn extract_vector(
    path: &Path,
    method: Method,
    target_rate: u32,
) -> Result<Vec<f64>, ExtractError> {
    match method {
        Method::Dsp => {
            let (samples, rate) = decode::decode(path, target_rate)?;
            dsp::extract(&samples, rate)
        }
        Method::Ai => ai::extract(path),
    }
}
