//! Input validation.
//!
//! Pure and deterministic: the same input always yields the same decision
//! and the same error, whichever bridge runs it. Nothing here touches the
//! engine or the registry.

use loqa_engine::WindowKind;

use crate::config::{
    DEFAULT_FFT_SIZE, DEFAULT_FRAME_SIZE, DEFAULT_HNR_MAX_FREQUENCY, DEFAULT_HNR_MIN_FREQUENCY,
    DEFAULT_MAX_FREQUENCY, DEFAULT_MIN_CONFIDENCE, DEFAULT_MIN_FREQUENCY, DEFAULT_THRESHOLD,
    FftOptions, FormantOptions, H1H2Options, HnrOptions, PitchOptions, SessionConfig,
    SessionOptions,
};
use crate::error::ValidationError;

/// Largest buffer accepted by one-shot operations.
pub const MAX_ONE_SHOT_SAMPLES: usize = 16384;

pub const MIN_SAMPLE_RATE: u32 = 8000;
pub const MAX_SAMPLE_RATE: u32 = 48000;

pub const MIN_TRANSFORM_SIZE: usize = 256;
pub const MAX_TRANSFORM_SIZE: usize = 8192;

pub const MIN_LPC_ORDER: usize = 2;
pub const MAX_LPC_ORDER: usize = 64;

/// A validated `(min, max)` frequency pair with `0 < min < max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyRange {
    pub min: f32,
    pub max: f32,
}

/// Validated one-shot transform parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub size: usize,
    pub window: WindowKind,
    pub include_phases: bool,
}

/// Checks a sample buffer. `max_len` is `None` for whole-clip session calls.
pub fn validate_buffer(buf: &[f32], max_len: Option<usize>) -> Result<(), ValidationError> {
    if buf.is_empty() {
        return Err(ValidationError::EmptyBuffer);
    }
    if let Some(max) = max_len {
        if buf.len() > max {
            return Err(ValidationError::BufferTooLarge { len: buf.len(), max });
        }
    }
    if let Some(index) = buf.iter().position(|s| !s.is_finite()) {
        return Err(ValidationError::NonFiniteSample { index });
    }
    Ok(())
}

fn integer(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(ValidationError::NotInteger { field, value });
    }
    Ok(value)
}

fn in_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<f64, ValidationError> {
    if value < min || value > max {
        return Err(ValidationError::OutOfRange { field, value, min, max });
    }
    Ok(value)
}

fn positive(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_nan() || value <= 0.0 {
        return Err(ValidationError::NonPositive { field, value });
    }
    if value.is_infinite() {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: f64::MAX,
        });
    }
    Ok(value)
}

/// Positive value that survives narrowing to a normal, finite `f32`.
fn positive_f32(field: &'static str, value: f64) -> Result<f32, ValidationError> {
    let narrowed = positive(field, value)? as f32;
    if !narrowed.is_normal() {
        return Err(ValidationError::OutOfRange {
            field,
            value,
            min: f32::MIN_POSITIVE as f64,
            max: f32::MAX as f64,
        });
    }
    Ok(narrowed)
}

/// Accepts integral rates in `[8000, 48000]`, bounds inclusive.
pub fn validate_sample_rate(rate: f64) -> Result<u32, ValidationError> {
    let rate = integer("sampleRate", rate)?;
    let rate = in_range("sampleRate", rate, MIN_SAMPLE_RATE as f64, MAX_SAMPLE_RATE as f64)?;
    Ok(rate as u32)
}

/// Accepts powers of two in `[256, 8192]`.
pub fn validate_transform_size(size: f64) -> Result<usize, ValidationError> {
    const FIELD: &str = "fftSize";
    let size = integer(FIELD, size)?;
    if size < 1.0 {
        return Err(ValidationError::OutOfRange {
            field: FIELD,
            value: size,
            min: MIN_TRANSFORM_SIZE as f64,
            max: MAX_TRANSFORM_SIZE as f64,
        });
    }
    if size > u32::MAX as f64 {
        return Err(ValidationError::OutOfRange {
            field: FIELD,
            value: size,
            min: MIN_TRANSFORM_SIZE as f64,
            max: MAX_TRANSFORM_SIZE as f64,
        });
    }
    let n = size as u32;
    if !n.is_power_of_two() {
        return Err(ValidationError::NotPowerOfTwo { field: FIELD, value: size });
    }
    let size = in_range(FIELD, size, MIN_TRANSFORM_SIZE as f64, MAX_TRANSFORM_SIZE as f64)?;
    Ok(size as usize)
}

/// Accepts `0 < min < max`, checked on the `f32` values handed to the engine.
pub fn validate_frequency_range(min: f64, max: f64) -> Result<FrequencyRange, ValidationError> {
    let lo = positive_f32("minFrequency", min)?;
    let hi = positive_f32("maxFrequency", max)?;
    if lo >= hi {
        return Err(ValidationError::InvertedRange { min, max });
    }
    Ok(FrequencyRange { min: lo, max: hi })
}

fn positive_integer(field: &'static str, value: f64) -> Result<u32, ValidationError> {
    let value = integer(field, value)?;
    let value = positive(field, value)?;
    let value = in_range(field, value, 1.0, u32::MAX as f64)?;
    Ok(value as u32)
}

/// Resolves defaults and validates everything a session is created with.
pub fn validate_session_config(opts: &SessionOptions) -> Result<SessionConfig, ValidationError> {
    let sample_rate = validate_sample_rate(opts.sample_rate)?;
    let range = validate_frequency_range(
        opts.min_frequency.unwrap_or(DEFAULT_MIN_FREQUENCY),
        opts.max_frequency.unwrap_or(DEFAULT_MAX_FREQUENCY),
    )?;
    let frame_size = positive_integer("frameSize", opts.frame_size.unwrap_or(DEFAULT_FRAME_SIZE))?;
    let default_hop = (frame_size / 4).max(1) as f64;
    let hop_size = positive_integer("hopSize", opts.hop_size.unwrap_or(default_hop))?;

    let threshold = opts.threshold.unwrap_or(DEFAULT_THRESHOLD);
    let threshold = positive_f32("threshold", threshold)?;
    in_range("threshold", threshold as f64, 0.0, 1.0)?;
    let min_confidence = opts.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);
    if !min_confidence.is_finite() {
        return Err(ValidationError::OutOfRange {
            field: "minConfidence",
            value: min_confidence,
            min: 0.0,
            max: 1.0,
        });
    }
    let min_confidence = in_range("minConfidence", min_confidence, 0.0, 1.0)?;

    Ok(SessionConfig {
        sample_rate,
        min_frequency: range.min,
        max_frequency: range.max,
        frame_size,
        hop_size,
        algorithm: opts.algorithm.unwrap_or_default(),
        threshold,
        min_confidence: min_confidence as f32,
        interpolate: opts.interpolate.unwrap_or(true),
    })
}

pub fn validate_pitch_options(opts: &PitchOptions) -> Result<FrequencyRange, ValidationError> {
    validate_frequency_range(
        opts.min_frequency.unwrap_or(DEFAULT_MIN_FREQUENCY),
        opts.max_frequency.unwrap_or(DEFAULT_MAX_FREQUENCY),
    )
}

pub fn validate_hnr_options(opts: &HnrOptions) -> Result<FrequencyRange, ValidationError> {
    validate_frequency_range(
        opts.min_frequency.unwrap_or(DEFAULT_HNR_MIN_FREQUENCY),
        opts.max_frequency.unwrap_or(DEFAULT_HNR_MAX_FREQUENCY),
    )
}

pub fn validate_fft_options(opts: &FftOptions) -> Result<TransformParams, ValidationError> {
    Ok(TransformParams {
        size: validate_transform_size(opts.fft_size.unwrap_or(DEFAULT_FFT_SIZE))?,
        window: opts.window_type.unwrap_or_default(),
        include_phases: opts.include_phase,
    })
}

/// LPC order, defaulting to `2 + sample_rate / 1000`.
pub fn validate_formant_options(opts: &FormantOptions, sample_rate: u32) -> Result<usize, ValidationError> {
    let default = (2 + sample_rate / 1000) as f64;
    let order = integer("lpcOrder", opts.lpc_order.unwrap_or(default))?;
    let order = in_range("lpcOrder", order, MIN_LPC_ORDER as f64, MAX_LPC_ORDER as f64)?;
    Ok(order as usize)
}

pub fn validate_h1h2_options(opts: &H1H2Options) -> Result<Option<f32>, ValidationError> {
    opts.f0.map(|f0| positive_f32("f0", f0)).transpose()
}
