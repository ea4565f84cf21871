//! DSP feature extraction: pitch histogram + chroma fusion.
//!
//! The pipeline mirrors what works for hummed melodies: a YIN F0 contour
//! restricted to the vocal range feeds a smoothed 128-bin MIDI histogram,
//! which is circularly rotated so its mode lands on middle C (key
//! normalization — the same melody hummed in a different key produces the
//! same histogram). A 12-bin chroma vector from the short-time power
//! spectrum adds harmonic context. Pitch content dominates the fused vector.

use rustfft::{FftPlanner, num_complex::Complex};

use super::ExtractError;
use crate::vector::normalize_l2_in_place;

/// Peak amplitude below this fraction of full scale is treated as silence.
const SILENCE_FLOOR: f32 = 1e-3;

/// YIN analysis frame and hop sizes (samples at the decode target rate).
const FRAME_LENGTH: usize = 2048;
const HOP_LENGTH: usize = 256;

/// Vocal-range band for pitch tracking: C2..C7.
const FMIN_HZ: f64 = 65.406;
const FMAX_HZ: f64 = 2093.005;

/// CMND threshold for accepting a pitch candidate, and the ceiling above
/// which a frame counts as unvoiced.
const YIN_THRESHOLD: f64 = 0.1;
const YIN_UNVOICED_CEIL: f64 = 0.5;

/// Chroma STFT parameters.
const CHROMA_FFT: usize = 4096;
const CHROMA_HOP: usize = 512;

const MIDI_BINS: usize = 128;
/// Key normalization rotates the histogram mode onto this bin (middle C).
const REFERENCE_BIN: i64 = 60;

/// Fusion weights: pitch is the dominant melodic cue.
const PITCH_WEIGHT: f64 = 1.5;
const CHROMA_WEIGHT: f64 = 1.0;

/// Dimensionality of the fused DSP feature vector.
pub const DSP_DIM: usize = MIDI_BINS + 12;

/// Extract the fused 140-dimensional DSP feature vector from mono samples.
pub fn extract(samples: &[f32], sample_rate: u32) -> Result<Vec<f64>, ExtractError> {
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if samples.is_empty() || peak < SILENCE_FLOOR {
        return Err(ExtractError::TooQuiet);
    }

    let pitch_hist = pitch_histogram(samples, sample_rate).ok_or(ExtractError::NoPitch)?;
    let chroma = chroma_vector(samples, sample_rate);

    let mut fused: Vec<f64> = Vec::with_capacity(DSP_DIM);
    fused.extend(pitch_hist.iter().map(|v| v * PITCH_WEIGHT));
    fused.extend(chroma.iter().map(|v| v * CHROMA_WEIGHT));
    normalize_l2_in_place(&mut fused);

    Ok(fused)
}

/// Build the key-normalized pitch histogram from the YIN F0 contour.
/// Returns None when no voiced frames survive.
fn pitch_histogram(samples: &[f32], sample_rate: u32) -> Option<Vec<f64>> {
    let mut notes: Vec<i64> = Vec::new();
    let mut start = 0;
    while start + FRAME_LENGTH <= samples.len() {
        if let Some(f0) = yin_frame(&samples[start..start + FRAME_LENGTH], sample_rate) {
            notes.push(hz_to_midi(f0).round() as i64);
        }
        start += HOP_LENGTH;
    }
    histogram_from_midi(&notes)
}

/// Smoothed, key-normalized, L2-normalized 128-bin histogram over MIDI note
/// numbers. Notes outside [0, 127] are discarded; None when nothing remains.
pub(crate) fn histogram_from_midi(notes: &[i64]) -> Option<Vec<f64>> {
    let mut hist = vec![0.0f64; MIDI_BINS];
    let mut any = false;
    for &note in notes {
        if (0..MIDI_BINS as i64).contains(&note) {
            hist[note as usize] += 1.0;
            any = true;
        }
    }
    if !any {
        return None;
    }

    // 3-tap smoothing flattens semitone jitter around the sung pitch.
    let mut smoothed = vec![0.0f64; MIDI_BINS];
    for i in 0..MIDI_BINS {
        let left = if i > 0 { hist[i - 1] } else { 0.0 };
        let right = if i + 1 < MIDI_BINS { hist[i + 1] } else { 0.0 };
        smoothed[i] = 0.25 * left + 0.5 * hist[i] + 0.25 * right;
    }

    // Key normalization: rotate the mode onto the reference bin.
    let mode = smoothed
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal).then(b.0.cmp(&a.0)))
        .map(|(i, _)| i as i64)
        .unwrap_or(REFERENCE_BIN);
    let shift = REFERENCE_BIN - mode;
    let mut rotated = vec![0.0f64; MIDI_BINS];
    for (i, &v) in smoothed.iter().enumerate() {
        let j = (i as i64 + shift).rem_euclid(MIDI_BINS as i64) as usize;
        rotated[j] = v;
    }

    normalize_l2_in_place(&mut rotated);
    Some(rotated)
}

/// Single-frame YIN pitch estimate, or None for unvoiced frames.
///
/// Classic difference function over a fixed comparison window, cumulative
/// mean normalization, absolute threshold with local-minimum walk, parabolic
/// refinement of the chosen lag.
fn yin_frame(frame: &[f32], sample_rate: u32) -> Option<f64> {
    let sr = sample_rate as f64;
    let tau_min = ((sr / FMAX_HZ).floor() as usize).max(2);
    let tau_max = ((sr / FMIN_HZ).ceil() as usize).min(frame.len() / 2);
    if tau_max <= tau_min {
        return None;
    }
    let window = frame.len() - tau_max;

    let mut diff = vec![0.0f64; tau_max + 1];
    for tau in 1..=tau_max {
        let mut sum = 0.0f64;
        for j in 0..window {
            let d = (frame[j] - frame[j + tau]) as f64;
            sum += d * d;
        }
        diff[tau] = sum;
    }

    // Cumulative mean normalized difference.
    let mut cmnd = vec![1.0f64; tau_max + 1];
    let mut running = 0.0f64;
    for tau in 1..=tau_max {
        running += diff[tau];
        cmnd[tau] = if running > 0.0 {
            diff[tau] * tau as f64 / running
        } else {
            1.0
        };
    }

    let mut tau = tau_min;
    let mut chosen = None;
    while tau <= tau_max {
        if cmnd[tau] < YIN_THRESHOLD {
            while tau + 1 <= tau_max && cmnd[tau + 1] < cmnd[tau] {
                tau += 1;
            }
            chosen = Some(tau);
            break;
        }
        tau += 1;
    }

    let tau = match chosen {
        Some(t) => t,
        None => {
            // No dip under the threshold: fall back to the global minimum,
            // but treat a shallow one as unvoiced.
            let (best, &value) = cmnd[tau_min..=tau_max]
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
            if value > YIN_UNVOICED_CEIL {
                return None;
            }
            best + tau_min
        }
    };

    // Parabolic interpolation around the chosen lag.
    let refined = if tau > tau_min && tau < tau_max {
        let (a, b, c) = (cmnd[tau - 1], cmnd[tau], cmnd[tau + 1]);
        let denom = a - 2.0 * b + c;
        if denom.abs() > 1e-12 {
            tau as f64 + 0.5 * (a - c) / denom
        } else {
            tau as f64
        }
    } else {
        tau as f64
    };

    let f0 = sr / refined;
    if (FMIN_HZ..=FMAX_HZ).contains(&f0) {
        Some(f0)
    } else {
        None
    }
}

/// 12-bin chroma: power spectrum per STFT frame projected onto pitch
/// classes, then a per-bin median across frames (robust to transient
/// noise), then L2 normalization.
fn chroma_vector(samples: &[f32], sample_rate: u32) -> Vec<f64> {
    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(CHROMA_FFT);

    // Hann window to reduce spectral leakage.
    let window: Vec<f64> = (0..CHROMA_FFT)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (CHROMA_FFT as f64 - 1.0)).cos())
        })
        .collect();

    let mut per_frame: Vec<[f64; 12]> = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + CHROMA_FFT).min(samples.len());
        if start >= samples.len() {
            break;
        }
        let mut buffer: Vec<Complex<f64>> = Vec::with_capacity(CHROMA_FFT);
        for (i, &s) in samples[start..end].iter().enumerate() {
            buffer.push(Complex::new(s as f64 * window[i], 0.0));
        }
        buffer.resize(CHROMA_FFT, Complex::new(0.0, 0.0));
        fft.process(&mut buffer);

        let mut frame_chroma = [0.0f64; 12];
        let bin_width = sample_rate as f64 / CHROMA_FFT as f64;
        for (k, value) in buffer.iter().enumerate().take(CHROMA_FFT / 2 + 1).skip(1) {
            let freq = k as f64 * bin_width;
            if freq < 20.0 {
                continue;
            }
            let class = (hz_to_midi(freq).round() as i64).rem_euclid(12) as usize;
            frame_chroma[class] += value.norm_sqr();
        }
        per_frame.push(frame_chroma);

        if end == samples.len() {
            break;
        }
        start += CHROMA_HOP;
    }

    let mut chroma = vec![0.0f64; 12];
    for (class, out) in chroma.iter_mut().enumerate() {
        let mut values: Vec<f64> = per_frame.iter().map(|f| f[class]).collect();
        *out = median(&mut values);
    }
    normalize_l2_in_place(&mut chroma);
    chroma
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        0.5 * (values[mid - 1] + values[mid])
    }
}

fn hz_to_midi(hz: f64) -> f64 {
    69.0 + 12.0 * (hz / 440.0).log2()
}
