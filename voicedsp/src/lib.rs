//! Streaming voice-analysis session layer over the loqa DSP engine.
//!
//! [`VoiceDsp`] is the entry point bridges call. It offers:
//!
//! - one-shot analysis: spectrum, pitch, formants, spectral shape, HNR, H1-H2
//! - streaming sessions with two processing modes: incremental analysis
//!   ([`VoiceDsp::analyze_clip`], [`VoiceDsp::analyze_frame`]) whose smoothing
//!   state carries over between calls, and whole-buffer re-decoding
//!   ([`VoiceDsp::process_buffer`]) which does not
//!
//! Inputs are validated before the engine is reached. Failures carry a stable
//! [`Error::code`] and serialize through [`Error::report`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use loqa_voicedsp::{SessionOptions, VoiceDsp};
//!
//! let dsp = VoiceDsp::native();
//! let handle = dsp.create_session(SessionOptions::new(44100)).await?;
//! let clip = dsp.analyze_clip(handle.id, samples).await?;
//! println!("median pitch: {:?}", clip.median_pitch);
//! dsp.free_session(handle.id).await?;
//! ```

mod adapter;
mod aggregate;
mod api;
mod config;
mod error;
mod registry;
mod session;
mod types;
mod validate;

pub use adapter::{AnalyzerResource, EngineAdapter};
pub use aggregate::{mean, median, std_dev};
pub use api::VoiceDsp;
pub use config::{
    FftOptions, FormantOptions, H1H2Options, HnrOptions, PitchOptions, SessionConfig,
    SessionOptions,
};
pub use error::{CallContext, Error, ErrorReport, Result, ValidationError};
pub use registry::{SessionHandle, SessionId, SessionRegistry};
pub use session::{Session, SessionError, SessionState};
pub use types::{
    ClipResult, FftResult, Formants, FrameResult, HarmonicDifference, Hnr, PitchTrack,
    SpectralShape,
};
pub use validate::{
    FrequencyRange, MAX_ONE_SHOT_SAMPLES, MAX_SAMPLE_RATE, MAX_TRANSFORM_SIZE, MIN_SAMPLE_RATE,
    MIN_TRANSFORM_SIZE, TransformParams, validate_buffer, validate_frequency_range,
    validate_sample_rate, validate_session_config, validate_transform_size,
};

pub use loqa_engine::{Engine, EngineError, PitchAlgorithm, WindowKind};
