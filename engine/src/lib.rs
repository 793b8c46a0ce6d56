//! Call contract for the loqa voice DSP analysis engine.
//!
//! The engine (FFT, pYIN pitch estimation, LPC formants, HMM/Viterbi pitch
//! tracking, HNR, H1-H2) is consumed, not implemented, here. This crate
//! defines the narrow contract the session layer depends on:
//!
//! - [`Engine`]: stateless one-shot operations and the analyzer factory
//! - [`Analyzer`]: a long-lived analyzer instance; dropping it frees it
//! - [`EngineError`]: the three failure classes of an engine call
//!
//! # Backends
//!
//! - `native` feature: [`NativeEngine`], hand-written bindings to the
//!   pre-built `libloqa_voice_dsp` C ABI. Set `LOQA_VOICE_DSP_LIB_DIR` to the
//!   directory containing the library.
//! - `testing` feature: [`testing::FakeEngine`], a deterministic double for
//!   tests of code built on this contract.

mod engine;
mod error;
mod types;

#[cfg(feature = "native")]
mod ffi;
#[cfg(feature = "native")]
mod native;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use engine::{Analyzer, Engine};
pub use error::EngineError;
pub use types::{
    AnalyzerConfig, Formants, HarmonicDifference, Hnr, PitchAlgorithm, PitchEstimate,
    RawPitchTrack, SpectralShape, Spectrum, WindowKind,
};

#[cfg(feature = "native")]
pub use native::NativeEngine;
