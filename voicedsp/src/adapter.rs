//! Engine adapter: the only code that calls into the engine.
//!
//! Every call is timed and logged, and every output is checked before it
//! leaves: non-finite numbers where a value is required and mismatched
//! parallel arrays become `ComputationFailed`, while confidences and
//! probabilities are clamped to `[0, 1]`. Results are fully owned copies.

use std::sync::Arc;
use std::time::Instant;

use loqa_engine::{
    Analyzer, AnalyzerConfig, Engine, EngineError, Formants, HarmonicDifference, Hnr,
    PitchEstimate, RawPitchTrack, SpectralShape, Spectrum,
};
use tracing::{debug, warn};

use crate::types::{FftResult, FrameResult};
use crate::validate::{FrequencyRange, TransformParams};

fn timed<T>(op: &'static str, len: usize, f: impl FnOnce() -> Result<T, EngineError>) -> Result<T, EngineError> {
    let start = Instant::now();
    let result = f();
    let elapsed_us = start.elapsed().as_micros() as u64;
    match &result {
        Ok(_) => debug!(op, len, elapsed_us, "engine call"),
        Err(e) => warn!(op, len, elapsed_us, error = %e, "engine call failed"),
    }
    result
}

fn failed(what: impl Into<String>) -> EngineError {
    EngineError::ComputationFailed(what.into())
}

fn finite(name: &str, value: f32) -> Result<f32, EngineError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(failed(format!("engine returned non-finite {name}")))
    }
}

fn unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

/// Converts an engine pitch estimate into a frame result.
///
/// A frame reported voiced without a positive frequency is taken as
/// unvoiced.
fn frame_result(p: PitchEstimate) -> Result<FrameResult, EngineError> {
    let frequency = finite("frequency", p.frequency)?;
    let voiced = p.is_voiced && frequency > 0.0;
    Ok(FrameResult {
        frequency: voiced.then_some(frequency),
        confidence: unit(p.confidence),
        is_voiced: voiced,
        voiced_probability: unit(p.voiced_probability),
    })
}

fn check_track(raw: RawPitchTrack) -> Result<RawPitchTrack, EngineError> {
    let n = raw.pitch_track.len();
    if raw.voiced_probabilities.len() != n || raw.timestamps.len() != n {
        return Err(failed(format!(
            "pitch track arrays differ in length: {n}, {}, {}",
            raw.voiced_probabilities.len(),
            raw.timestamps.len()
        )));
    }
    let pitch_track = raw
        .pitch_track
        .into_iter()
        .map(|p| finite("pitch", p).map(|p| p.max(0.0)))
        .collect::<Result<Vec<_>, _>>()?;
    let timestamps = raw
        .timestamps
        .into_iter()
        .map(|t| finite("timestamp", t))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RawPitchTrack {
        pitch_track,
        voiced_probabilities: raw.voiced_probabilities.into_iter().map(unit).collect(),
        timestamps,
    })
}

/// Stateless one-shot engine operations.
#[derive(Clone)]
pub struct EngineAdapter {
    engine: Arc<dyn Engine>,
}

impl EngineAdapter {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn transform(&self, samples: &[f32], sample_rate: u32, params: TransformParams) -> Result<FftResult, EngineError> {
        let spectrum: Spectrum = timed("transform", samples.len(), || {
            self.engine
                .transform(samples, sample_rate, params.size, params.window, params.include_phases)
        })?;
        let bins = spectrum.magnitudes.len();
        if spectrum.frequencies.len() != bins {
            return Err(failed(format!(
                "spectrum has {bins} magnitudes but {} frequencies",
                spectrum.frequencies.len()
            )));
        }
        if let Some(phases) = &spectrum.phases {
            if phases.len() != bins {
                return Err(failed(format!("spectrum has {bins} magnitudes but {} phases", phases.len())));
            }
        }
        if spectrum.magnitudes.iter().any(|m| !m.is_finite()) {
            return Err(failed("engine returned non-finite magnitude"));
        }
        Ok(FftResult {
            magnitudes: spectrum.magnitudes,
            frequencies: spectrum.frequencies,
            phases: if params.include_phases { spectrum.phases } else { None },
            sample_rate,
            fft_size: params.size,
        })
    }

    pub fn estimate_pitch(&self, samples: &[f32], sample_rate: u32, range: FrequencyRange) -> Result<FrameResult, EngineError> {
        let p = timed("estimate_pitch", samples.len(), || {
            self.engine.estimate_pitch(samples, sample_rate, range.min, range.max)
        })?;
        frame_result(p)
    }

    pub fn extract_formants(&self, samples: &[f32], sample_rate: u32, lpc_order: usize) -> Result<Formants, EngineError> {
        let f = timed("extract_formants", samples.len(), || {
            self.engine.extract_formants(samples, sample_rate, lpc_order)
        })?;
        Ok(Formants {
            f1: finite("f1", f.f1)?,
            f2: finite("f2", f.f2)?,
            f3: finite("f3", f.f3)?,
            confidence: unit(f.confidence),
        })
    }

    pub fn analyze_spectral_shape(&self, samples: &[f32], sample_rate: u32) -> Result<SpectralShape, EngineError> {
        let s = timed("analyze_spectral_shape", samples.len(), || {
            self.engine.analyze_spectral_shape(samples, sample_rate)
        })?;
        Ok(SpectralShape {
            centroid: finite("centroid", s.centroid)?,
            rolloff: finite("rolloff", s.rolloff)?,
            tilt: finite("tilt", s.tilt)?,
        })
    }

    pub fn harmonics_to_noise_ratio(&self, samples: &[f32], sample_rate: u32, range: FrequencyRange) -> Result<Hnr, EngineError> {
        let h = timed("harmonics_to_noise_ratio", samples.len(), || {
            self.engine.harmonics_to_noise_ratio(samples, sample_rate, range.min, range.max)
        })?;
        Ok(Hnr {
            hnr: finite("hnr", h.hnr)?,
            f0: finite("f0", h.f0)?,
            is_voiced: h.is_voiced,
        })
    }

    pub fn harmonic_amplitude_difference(
        &self,
        samples: &[f32],
        sample_rate: u32,
        f0: Option<f32>,
    ) -> Result<HarmonicDifference, EngineError> {
        let d = timed("harmonic_amplitude_difference", samples.len(), || {
            self.engine.harmonic_amplitude_difference(samples, sample_rate, f0)
        })?;
        Ok(HarmonicDifference {
            h1h2: finite("h1h2", d.h1h2)?,
            h1_db: finite("h1_db", d.h1_db)?,
            h2_db: finite("h2_db", d.h2_db)?,
            f0: finite("f0", d.f0)?,
        })
    }
}

/// Owned engine analyzer of one session.
///
/// Not `Clone`. Dropping it is the only way the engine resource is freed.
pub struct AnalyzerResource {
    analyzer: Box<dyn Analyzer>,
    frame_size: usize,
    config: AnalyzerConfig,
}

impl AnalyzerResource {
    pub fn create(adapter: &EngineAdapter, config: &AnalyzerConfig) -> Result<Self, EngineError> {
        let analyzer = timed("create_analyzer", config.frame_size as usize, || {
            adapter.engine.create_analyzer(config)
        })?;
        Ok(Self {
            analyzer,
            frame_size: config.frame_size as usize,
            config: *config,
        })
    }

    pub fn process_frame(&mut self, samples: &[f32]) -> Result<FrameResult, EngineError> {
        let p = timed("process_frame", samples.len(), || self.analyzer.process_frame(samples))?;
        frame_result(p)
    }

    /// Processes every whole frame of `samples`, carrying smoothing state.
    pub fn process_stream(&mut self, samples: &[f32]) -> Result<Vec<FrameResult>, EngineError> {
        let expected = self.config.frame_count(samples.len());
        if expected == 0 {
            debug!(len = samples.len(), frame_size = self.frame_size, "buffer shorter than one frame");
            return Ok(Vec::new());
        }
        let estimates = timed("process_stream", samples.len(), || {
            self.analyzer.process_stream(samples, expected)
        })?;
        if estimates.len() > expected {
            return Err(failed(format!("engine returned {} frames, expected at most {expected}", estimates.len())));
        }
        estimates.into_iter().map(frame_result).collect()
    }

    /// Decodes the whole buffer; frame state is left as it was.
    pub fn process_buffer(&mut self, samples: &[f32]) -> Result<RawPitchTrack, EngineError> {
        if self.config.frame_count(samples.len()) == 0 {
            return Ok(RawPitchTrack::default());
        }
        let raw = timed("process_buffer", samples.len(), || self.analyzer.process_buffer(samples))?;
        check_track(raw)
    }

    pub fn reset(&mut self) {
        self.analyzer.reset();
        debug!(op = "reset", "engine call");
    }
}
