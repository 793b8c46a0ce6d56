//! Plain value types exchanged with the analysis engine.
//!
//! These mirror the engine's result records field for field, minus the
//! `success` flag, which is folded into `Result`.

use serde::{Deserialize, Serialize};

/// Pitch estimator used by an analyzer for frame-by-frame processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchAlgorithm {
    /// Let the engine choose.
    Auto,
    /// Probabilistic YIN. Produces per-candidate probabilities.
    #[default]
    Pyin,
    /// Classic YIN.
    Yin,
    /// Plain autocorrelation.
    #[serde(alias = "autocorr")]
    Autocorrelation,
}

impl PitchAlgorithm {
    /// Wire value used by the engine's configuration record.
    pub fn code(self) -> u32 {
        match self {
            PitchAlgorithm::Auto => 0,
            PitchAlgorithm::Pyin => 1,
            PitchAlgorithm::Yin => 2,
            PitchAlgorithm::Autocorrelation => 3,
        }
    }
}

/// Window applied before a spectral transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Hann,
    Hamming,
    Blackman,
    /// No window.
    #[serde(alias = "none")]
    Rectangular,
}

/// Configuration of a long-lived analyzer instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerConfig {
    pub sample_rate: u32,
    pub frame_size: u32,
    pub hop_size: u32,
    pub min_frequency: f32,
    pub max_frequency: f32,
    pub algorithm: PitchAlgorithm,
    /// Detection threshold handed to YIN-family estimators.
    pub threshold: f32,
    /// Frames below this confidence are reported unvoiced.
    pub min_confidence: f32,
    /// Parabolic interpolation around the chosen lag.
    pub interpolate: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_size: 2048,
            hop_size: 512,
            min_frequency: 80.0,
            max_frequency: 400.0,
            algorithm: PitchAlgorithm::Pyin,
            threshold: 0.1,
            min_confidence: 0.5,
            interpolate: true,
        }
    }
}

impl AnalyzerConfig {
    /// Number of frames an analyzer emits for a buffer of `len` samples.
    pub fn frame_count(&self, len: usize) -> usize {
        let frame = self.frame_size as usize;
        let hop = self.hop_size.max(1) as usize;
        if frame == 0 || len < frame {
            return 0;
        }
        (len - frame) / hop + 1
    }
}

/// One pitch estimate as produced by the engine.
///
/// An unvoiced frame is reported with `frequency == 0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchEstimate {
    pub frequency: f32,
    pub confidence: f32,
    pub is_voiced: bool,
    pub voiced_probability: f32,
}

/// First three formants from linear-prediction analysis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Formants {
    pub f1: f32,
    pub f2: f32,
    pub f3: f32,
    pub confidence: f32,
}

/// Magnitude spectrum of one transform.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Spectrum {
    pub magnitudes: Vec<f32>,
    /// Bin center frequencies in Hz, parallel to `magnitudes`.
    pub frequencies: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phases: Option<Vec<f32>>,
    pub sample_rate: u32,
}

/// Summary shape of a magnitude spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpectralShape {
    /// Spectral centroid in Hz.
    pub centroid: f32,
    /// Frequency below which 95% of the energy lies.
    pub rolloff: f32,
    /// Spectral slope in dB per octave.
    pub tilt: f32,
}

/// Harmonics-to-noise ratio.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hnr {
    /// Ratio in dB.
    pub hnr: f32,
    pub f0: f32,
    pub is_voiced: bool,
}

/// Difference between the first two harmonic amplitudes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarmonicDifference {
    pub h1h2: f32,
    pub h1_db: f32,
    pub h2_db: f32,
    pub f0: f32,
}

/// Viterbi-decoded pitch track of a whole buffer.
///
/// The three sequences are parallel; a pitch of exactly `0.0` marks an
/// unvoiced frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawPitchTrack {
    pub pitch_track: Vec<f32>,
    pub voiced_probabilities: Vec<f32>,
    /// Seconds from the start of the buffer.
    pub timestamps: Vec<f32>,
}

impl RawPitchTrack {
    pub fn len(&self) -> usize {
        self.pitch_track.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pitch_track.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_count_follows_hop() {
        let cfg = AnalyzerConfig {
            frame_size: 2048,
            hop_size: 512,
            ..AnalyzerConfig::default()
        };
        assert_eq!(cfg.frame_count(0), 0);
        assert_eq!(cfg.frame_count(2047), 0);
        assert_eq!(cfg.frame_count(2048), 1);
        assert_eq!(cfg.frame_count(2048 + 511), 1);
        assert_eq!(cfg.frame_count(2048 + 512), 2);
        assert_eq!(cfg.frame_count(16000), 28);
    }

    #[test]
    fn algorithm_names_deserialize() {
        let a: PitchAlgorithm = serde_json::from_str("\"autocorr\"").unwrap();
        assert_eq!(a, PitchAlgorithm::Autocorrelation);
        let a: PitchAlgorithm = serde_json::from_str("\"pyin\"").unwrap();
        assert_eq!(a, PitchAlgorithm::Pyin);
        assert_eq!(PitchAlgorithm::default(), PitchAlgorithm::Pyin);
    }
}
