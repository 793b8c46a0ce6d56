//! The analysis engine call contract.

use crate::error::EngineError;
use crate::types::{
    AnalyzerConfig, Formants, HarmonicDifference, Hnr, PitchEstimate, RawPitchTrack,
    SpectralShape, Spectrum, WindowKind,
};

/// Stateless operations of the analysis engine plus the analyzer factory.
///
/// Implementations must be safe to call from several threads at once; each
/// call is synchronous and may block for its whole duration. Inputs are
/// borrowed for the duration of the call only and outputs are fully owned.
pub trait Engine: Send + Sync {
    /// Short backend name for diagnostics.
    fn name(&self) -> &str;

    /// Magnitude spectrum of `samples` using a transform of `size` points.
    /// Shorter input is zero-padded, longer input truncated.
    fn transform(
        &self,
        samples: &[f32],
        sample_rate: u32,
        size: usize,
        window: WindowKind,
        include_phases: bool,
    ) -> Result<Spectrum, EngineError>;

    fn estimate_pitch(
        &self,
        samples: &[f32],
        sample_rate: u32,
        min_frequency: f32,
        max_frequency: f32,
    ) -> Result<PitchEstimate, EngineError>;

    fn extract_formants(
        &self,
        samples: &[f32],
        sample_rate: u32,
        lpc_order: usize,
    ) -> Result<Formants, EngineError>;

    fn analyze_spectral_shape(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<SpectralShape, EngineError>;

    fn harmonics_to_noise_ratio(
        &self,
        samples: &[f32],
        sample_rate: u32,
        min_frequency: f32,
        max_frequency: f32,
    ) -> Result<Hnr, EngineError>;

    /// `f0 == None` asks the engine to detect the fundamental itself.
    fn harmonic_amplitude_difference(
        &self,
        samples: &[f32],
        sample_rate: u32,
        f0: Option<f32>,
    ) -> Result<HarmonicDifference, EngineError>;

    /// Allocates a new analyzer. The returned box owns the engine resource;
    /// dropping it is the only way to release it.
    fn create_analyzer(&self, config: &AnalyzerConfig) -> Result<Box<dyn Analyzer>, EngineError>;
}

/// A long-lived, stateful analyzer instance.
///
/// Frame processing carries smoothing state from call to call until
/// [`Analyzer::reset`]. Whole-buffer processing is independent of that state.
pub trait Analyzer: Send {
    /// Processes exactly one frame, advancing the smoothing state.
    fn process_frame(&mut self, samples: &[f32]) -> Result<PitchEstimate, EngineError>;

    /// Splits `samples` into frames of the configured size and hop and
    /// processes them in order, advancing the smoothing state.
    /// At most `max_results` frames are produced.
    fn process_stream(
        &mut self,
        samples: &[f32],
        max_results: usize,
    ) -> Result<Vec<PitchEstimate>, EngineError>;

    /// Decodes the globally optimal pitch track over the whole buffer.
    ///
    /// Always uses the probabilistic estimator with Viterbi smoothing,
    /// whatever algorithm the analyzer was configured with, and leaves the
    /// frame-processing state untouched.
    fn process_buffer(&mut self, samples: &[f32]) -> Result<RawPitchTrack, EngineError>;

    /// Discards smoothing state. The next call behaves as on a fresh analyzer.
    fn reset(&mut self);
}
