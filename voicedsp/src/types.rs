//! Result types returned to callers. All are plain owned values.

use serde::Serialize;

pub use loqa_engine::{Formants, HarmonicDifference, Hnr, SpectralShape};

/// Pitch analysis of one frame.
///
/// `frequency` is present exactly when `is_voiced` is true.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameResult {
    pub frequency: Option<f32>,
    pub confidence: f32,
    pub is_voiced: bool,
    pub voiced_probability: f32,
}

/// Incremental analysis of a clip: every frame plus summary statistics.
///
/// Always built from `frames` by [`ClipResult::from_frames`].
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipResult {
    pub frames: Vec<FrameResult>,
    pub frame_count: usize,
    pub voiced_frame_count: usize,
    pub median_pitch: Option<f32>,
    pub mean_pitch: Option<f32>,
    pub pitch_std_dev: Option<f32>,
    pub mean_confidence: Option<f32>,
    pub mean_voiced_probability: f32,
}

/// Globally decoded pitch track of a whole buffer.
///
/// `pitch_track`, `voiced_probabilities` and `timestamps` are parallel. A
/// pitch of exactly `0.0` marks an unvoiced frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchTrack {
    pub pitch_track: Vec<f32>,
    pub voiced_probabilities: Vec<f32>,
    /// Seconds from the start of the buffer.
    pub timestamps: Vec<f32>,
    pub frame_count: usize,
    pub voiced_frame_count: usize,
    pub median_pitch: Option<f32>,
    pub mean_pitch: Option<f32>,
}

/// One-shot spectrum.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FftResult {
    pub magnitudes: Vec<f32>,
    pub frequencies: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phases: Option<Vec<f32>>,
    pub sample_rate: u32,
    pub fft_size: usize,
}
