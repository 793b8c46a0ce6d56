//! Summary statistics over per-frame pitch results.

use loqa_engine::RawPitchTrack;

use crate::types::{ClipResult, FrameResult, PitchTrack};

/// Median of `values`; averages the two middle elements for even counts.
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some(((sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0) as f32)
    }
}

pub fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    Some((sum / values.len() as f64) as f32)
}

/// Population standard deviation; `None` below two values.
pub fn std_dev(values: &[f32]) -> Option<f32> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mu = values.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = values.iter().map(|&v| (v as f64 - mu).powi(2)).sum::<f64>() / n;
    Some(var.sqrt() as f32)
}

impl ClipResult {
    /// Summarizes `frames`, keeping them in the result.
    pub fn from_frames(frames: Vec<FrameResult>) -> Self {
        let voiced: Vec<&FrameResult> = frames.iter().filter(|f| f.is_voiced).collect();
        let pitches: Vec<f32> = voiced.iter().filter_map(|f| f.frequency).collect();
        let confidences: Vec<f32> = voiced.iter().map(|f| f.confidence).collect();
        let probabilities: Vec<f32> = frames.iter().map(|f| f.voiced_probability).collect();

        ClipResult {
            frame_count: frames.len(),
            voiced_frame_count: voiced.len(),
            median_pitch: median(&pitches),
            mean_pitch: mean(&pitches),
            pitch_std_dev: std_dev(&pitches),
            mean_confidence: mean(&confidences),
            mean_voiced_probability: mean(&probabilities).unwrap_or(0.0),
            frames,
        }
    }
}

impl From<RawPitchTrack> for PitchTrack {
    /// Summarizes a decoded track. Exact zeros are unvoiced frames.
    fn from(raw: RawPitchTrack) -> Self {
        let voiced: Vec<f32> = raw.pitch_track.iter().copied().filter(|&p| p != 0.0).collect();
        PitchTrack {
            frame_count: raw.pitch_track.len(),
            voiced_frame_count: voiced.len(),
            median_pitch: median(&voiced),
            mean_pitch: mean(&voiced),
            pitch_track: raw.pitch_track,
            voiced_probabilities: raw.voiced_probabilities,
            timestamps: raw.timestamps,
        }
    }
}
