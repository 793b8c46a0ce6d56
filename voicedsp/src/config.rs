//! Call options as they arrive from bridges, and the validated session
//! configuration derived from them.
//!
//! Numeric options are `f64` on purpose: bridge callers pass untyped numbers,
//! and the validator is the one place that decides whether `2048.5` is an
//! acceptable frame size.

use loqa_engine::{AnalyzerConfig, PitchAlgorithm, WindowKind};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_FREQUENCY: f64 = 80.0;
pub const DEFAULT_MAX_FREQUENCY: f64 = 400.0;
pub const DEFAULT_FRAME_SIZE: f64 = 2048.0;
pub const DEFAULT_FFT_SIZE: f64 = 2048.0;
pub const DEFAULT_THRESHOLD: f64 = 0.1;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;
pub const DEFAULT_HNR_MIN_FREQUENCY: f64 = 75.0;
pub const DEFAULT_HNR_MAX_FREQUENCY: f64 = 500.0;

/// Options for creating a streaming session.
///
/// Everything except `sample_rate` is optional; missing values take the
/// documented defaults during validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOptions {
    pub sample_rate: f64,
    #[serde(default)]
    pub min_frequency: Option<f64>,
    #[serde(default)]
    pub max_frequency: Option<f64>,
    #[serde(default)]
    pub frame_size: Option<f64>,
    /// Defaults to a quarter of the frame size.
    #[serde(default)]
    pub hop_size: Option<f64>,
    #[serde(default)]
    pub algorithm: Option<PitchAlgorithm>,
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub min_confidence: Option<f64>,
    #[serde(default)]
    pub interpolate: Option<bool>,
}

impl SessionOptions {
    pub fn new(sample_rate: impl Into<f64>) -> Self {
        Self {
            sample_rate: sample_rate.into(),
            ..Self::default()
        }
    }

    pub fn frequency_range(mut self, min: f64, max: f64) -> Self {
        self.min_frequency = Some(min);
        self.max_frequency = Some(max);
        self
    }

    pub fn frame_size(mut self, size: f64) -> Self {
        self.frame_size = Some(size);
        self
    }

    pub fn hop_size(mut self, size: f64) -> Self {
        self.hop_size = Some(size);
        self
    }

    pub fn algorithm(mut self, algorithm: PitchAlgorithm) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Parses options from a JSON object as sent by a bridge.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Parses options from a YAML document.
    pub fn from_yaml(s: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(s)
    }
}

/// Validated, immutable configuration of one session.
///
/// Only produced by [`crate::validate::validate_session_config`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub(crate) sample_rate: u32,
    pub(crate) min_frequency: f32,
    pub(crate) max_frequency: f32,
    pub(crate) frame_size: u32,
    pub(crate) hop_size: u32,
    pub(crate) algorithm: PitchAlgorithm,
    pub(crate) threshold: f32,
    pub(crate) min_confidence: f32,
    pub(crate) interpolate: bool,
}

impl SessionConfig {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn min_frequency(&self) -> f32 {
        self.min_frequency
    }

    pub fn max_frequency(&self) -> f32 {
        self.max_frequency
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn hop_size(&self) -> u32 {
        self.hop_size
    }

    pub fn algorithm(&self) -> PitchAlgorithm {
        self.algorithm
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    pub fn interpolate(&self) -> bool {
        self.interpolate
    }

    /// The engine-side analyzer configuration for this session.
    pub fn analyzer_config(&self) -> AnalyzerConfig {
        AnalyzerConfig {
            sample_rate: self.sample_rate,
            frame_size: self.frame_size,
            hop_size: self.hop_size,
            min_frequency: self.min_frequency,
            max_frequency: self.max_frequency,
            algorithm: self.algorithm,
            threshold: self.threshold,
            min_confidence: self.min_confidence,
            interpolate: self.interpolate,
        }
    }
}

/// Options for one-shot pitch detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PitchOptions {
    pub min_frequency: Option<f64>,
    pub max_frequency: Option<f64>,
}

/// Options for a one-shot spectral transform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FftOptions {
    pub fft_size: Option<f64>,
    pub window_type: Option<WindowKind>,
    pub include_phase: bool,
}

/// Options for formant extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormantOptions {
    /// Defaults to `2 + sample_rate / 1000`.
    pub lpc_order: Option<f64>,
}

/// Options for harmonics-to-noise ratio.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HnrOptions {
    pub min_frequency: Option<f64>,
    pub max_frequency: Option<f64>,
}

/// Options for the H1-H2 harmonic amplitude difference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct H1H2Options {
    /// Known fundamental; detected by the engine when absent.
    pub f0: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_options_from_json() {
        let opts = SessionOptions::from_json(
            r#"{"sampleRate": 44100, "minFrequency": 60, "algorithm": "yin", "interpolate": false}"#,
        )
        .unwrap();
        assert_eq!(opts.sample_rate, 44100.0);
        assert_eq!(opts.min_frequency, Some(60.0));
        assert_eq!(opts.max_frequency, None);
        assert_eq!(opts.algorithm, Some(PitchAlgorithm::Yin));
        assert_eq!(opts.interpolate, Some(false));
    }

    #[test]
    fn session_options_require_sample_rate() {
        assert!(SessionOptions::from_json(r#"{"frameSize": 1024}"#).is_err());
    }

    #[test]
    fn session_options_from_yaml() {
        let opts = SessionOptions::from_yaml("sampleRate: 16000\nframeSize: 1024\nhopSize: 256\n").unwrap();
        assert_eq!(opts, SessionOptions::new(16000).frame_size(1024.0).hop_size(256.0));
    }

    #[test]
    fn one_shot_options_default_when_missing() {
        let fft: FftOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(fft, FftOptions::default());
        let fft: FftOptions = serde_json::from_str(r#"{"fftSize": 512, "windowType": "blackman"}"#).unwrap();
        assert_eq!(fft.fft_size, Some(512.0));
        assert_eq!(fft.window_type, Some(WindowKind::Blackman));
        assert!(!fft.include_phase);
    }
}
