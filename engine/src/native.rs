//! Safe wrappers over the loqa voice DSP C ABI.

use std::os::raw::c_void;
use std::ptr::{self, NonNull};

use tracing::debug;

use crate::engine::{Analyzer, Engine};
use crate::error::EngineError;
use crate::ffi;
use crate::types::{
    AnalyzerConfig, Formants, HarmonicDifference, Hnr, PitchEstimate,
    RawPitchTrack, SpectralShape, Spectrum, WindowKind,
};

const MIN_SHAPE_FFT: usize = 256;
const MAX_SHAPE_FFT: usize = 8192;

/// Copies `len` engine-owned floats into a new vector.
///
/// # Safety
///
/// `ptr` must be valid for `len` reads when `len > 0`.
unsafe fn copy_floats(ptr: *const f32, len: usize) -> Vec<f32> {
    if len == 0 {
        return Vec::new();
    }
    let mut out = vec![0.0f32; len];
    unsafe { ptr::copy_nonoverlapping(ptr, out.as_mut_ptr(), len) };
    out
}

fn pitch_from_ffi(r: ffi::PitchResultFFI, op: &str) -> Result<PitchEstimate, EngineError> {
    if !r.success {
        return Err(EngineError::ComputationFailed(format!("{op}: engine reported failure")));
    }
    Ok(PitchEstimate {
        frequency: r.frequency,
        confidence: r.confidence,
        is_voiced: r.is_voiced,
        voiced_probability: r.voiced_probability,
    })
}

fn config_to_ffi(cfg: &AnalyzerConfig) -> ffi::AnalysisConfigFFI {
    ffi::AnalysisConfigFFI {
        sample_rate: cfg.sample_rate,
        frame_size: cfg.frame_size,
        hop_size: cfg.hop_size,
        min_frequency: cfg.min_frequency,
        max_frequency: cfg.max_frequency,
        algorithm: cfg.algorithm.code(),
        threshold: cfg.threshold,
        min_confidence: cfg.min_confidence,
        interpolate: cfg.interpolate,
    }
}

// ---------------------------------------------------------------------------
// Engine-owned result guards
// ---------------------------------------------------------------------------

/// Releases an FFT result on every exit path.
struct FftResult(ffi::FFTResultFFI);

impl FftResult {
    fn compute(samples: &[f32], sample_rate: u32, size: usize) -> Self {
        Self(unsafe { ffi::loqa_compute_fft(samples.as_ptr(), samples.len(), sample_rate, size) })
    }

    fn check(&self, op: &str) -> Result<(), EngineError> {
        if !self.0.success {
            return Err(EngineError::ComputationFailed(format!("{op}: engine reported failure")));
        }
        if self.0.length > 0 && (self.0.magnitudes_ptr.is_null() || self.0.frequencies_ptr.is_null()) {
            return Err(EngineError::AllocationFailed(format!(
                "{op}: engine returned {} bins without storage",
                self.0.length
            )));
        }
        Ok(())
    }
}

impl Drop for FftResult {
    fn drop(&mut self) {
        unsafe { ffi::loqa_free_fft_result(&mut self.0) };
    }
}

/// Releases a pitch track on every exit path.
struct PitchTrackResult(ffi::PitchTrackFFI);

impl Drop for PitchTrackResult {
    fn drop(&mut self) {
        unsafe { ffi::loqa_free_pitch_track(&mut self.0) };
    }
}

// ---------------------------------------------------------------------------
// NativeEngine
// ---------------------------------------------------------------------------

/// Analysis engine backed by the linked `libloqa_voice_dsp`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeEngine;

impl NativeEngine {
    pub fn new() -> Self {
        Self
    }
}

impl Engine for NativeEngine {
    fn name(&self) -> &str {
        "loqa-native"
    }

    fn transform(
        &self,
        samples: &[f32],
        sample_rate: u32,
        size: usize,
        window: WindowKind,
        _include_phases: bool,
    ) -> Result<Spectrum, EngineError> {
        if window != WindowKind::Hann {
            return Err(EngineError::InvalidInput(format!(
                "transform: window {window:?} not supported, native engine applies hann"
            )));
        }
        let fft = FftResult::compute(samples, sample_rate, size);
        fft.check("transform")?;
        let (magnitudes, frequencies) = unsafe {
            (
                copy_floats(fft.0.magnitudes_ptr, fft.0.length),
                copy_floats(fft.0.frequencies_ptr, fft.0.length),
            )
        };
        Ok(Spectrum {
            magnitudes,
            frequencies,
            phases: None,
            sample_rate: fft.0.sample_rate,
        })
    }

    fn estimate_pitch(
        &self,
        samples: &[f32],
        sample_rate: u32,
        min_frequency: f32,
        max_frequency: f32,
    ) -> Result<PitchEstimate, EngineError> {
        let r = unsafe {
            ffi::loqa_detect_pitch(samples.as_ptr(), samples.len(), sample_rate, min_frequency, max_frequency)
        };
        pitch_from_ffi(r, "estimate_pitch")
    }

    fn extract_formants(
        &self,
        samples: &[f32],
        sample_rate: u32,
        lpc_order: usize,
    ) -> Result<Formants, EngineError> {
        if lpc_order == 0 {
            return Err(EngineError::InvalidInput("extract_formants: lpc order must be positive".into()));
        }
        let r = unsafe { ffi::loqa_extract_formants(samples.as_ptr(), samples.len(), sample_rate, lpc_order) };
        if !r.success {
            return Err(EngineError::ComputationFailed("extract_formants: engine reported failure".into()));
        }
        Ok(Formants {
            f1: r.f1,
            f2: r.f2,
            f3: r.f3,
            confidence: r.confidence,
        })
    }

    fn analyze_spectral_shape(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<SpectralShape, EngineError> {
        let mut size = MIN_SHAPE_FFT;
        while size * 2 <= samples.len() && size * 2 <= MAX_SHAPE_FFT {
            size *= 2;
        }
        let fft = FftResult::compute(samples, sample_rate, size);
        fft.check("analyze_spectral_shape")?;
        let r = unsafe { ffi::loqa_analyze_spectrum(&fft.0) };
        if !r.success {
            return Err(EngineError::ComputationFailed(
                "analyze_spectral_shape: engine reported failure".into(),
            ));
        }
        Ok(SpectralShape {
            centroid: r.centroid,
            rolloff: r.rolloff_95,
            tilt: r.tilt,
        })
    }

    fn harmonics_to_noise_ratio(
        &self,
        samples: &[f32],
        sample_rate: u32,
        min_frequency: f32,
        max_frequency: f32,
    ) -> Result<Hnr, EngineError> {
        let r = unsafe {
            ffi::loqa_calculate_hnr(samples.as_ptr(), samples.len(), sample_rate, min_frequency, max_frequency)
        };
        if !r.success {
            return Err(EngineError::ComputationFailed("harmonics_to_noise_ratio: engine reported failure".into()));
        }
        Ok(Hnr {
            hnr: r.hnr,
            f0: r.f0,
            is_voiced: r.is_voiced,
        })
    }

    fn harmonic_amplitude_difference(
        &self,
        samples: &[f32],
        sample_rate: u32,
        f0: Option<f32>,
    ) -> Result<HarmonicDifference, EngineError> {
        let r = unsafe {
            ffi::loqa_calculate_h1h2(samples.as_ptr(), samples.len(), sample_rate, f0.unwrap_or(0.0))
        };
        if !r.success {
            return Err(EngineError::ComputationFailed(
                "harmonic_amplitude_difference: engine reported failure".into(),
            ));
        }
        Ok(HarmonicDifference {
            h1h2: r.h1h2,
            h1_db: r.h1_amplitude_db,
            h2_db: r.h2_amplitude_db,
            f0: r.f0,
        })
    }

    fn create_analyzer(&self, config: &AnalyzerConfig) -> Result<Box<dyn Analyzer>, EngineError> {
        let raw = unsafe { ffi::loqa_voice_analyzer_new(config_to_ffi(config)) };
        let ptr = NonNull::new(raw).ok_or_else(|| {
            EngineError::AllocationFailed("create_analyzer: engine returned null analyzer".into())
        })?;
        debug!(sample_rate = config.sample_rate, "native analyzer allocated");
        Ok(Box::new(NativeAnalyzer { ptr }))
    }
}

// ---------------------------------------------------------------------------
// NativeAnalyzer
// ---------------------------------------------------------------------------

/// Owns one engine-side analyzer. Dropping it frees the engine resource.
struct NativeAnalyzer {
    ptr: NonNull<c_void>,
}

// Safety: the analyzer is only reached through `&mut self`, so it is never
// touched by two threads at once.
unsafe impl Send for NativeAnalyzer {}

impl Analyzer for NativeAnalyzer {
    fn process_frame(&mut self, samples: &[f32]) -> Result<PitchEstimate, EngineError> {
        let r = unsafe {
            ffi::loqa_voice_analyzer_process_frame(self.ptr.as_ptr(), samples.as_ptr(), samples.len())
        };
        pitch_from_ffi(r, "process_frame")
    }

    fn process_stream(
        &mut self,
        samples: &[f32],
        max_results: usize,
    ) -> Result<Vec<PitchEstimate>, EngineError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }
        let empty = ffi::PitchResultFFI {
            success: false,
            frequency: 0.0,
            confidence: 0.0,
            is_voiced: false,
            voiced_probability: 0.0,
        };
        let mut out = vec![empty; max_results];
        let n = unsafe {
            ffi::loqa_voice_analyzer_process_stream(
                self.ptr.as_ptr(),
                samples.as_ptr(),
                samples.len(),
                out.as_mut_ptr(),
                max_results,
            )
        };
        out.truncate(n.min(max_results));
        out.into_iter().map(|r| pitch_from_ffi(r, "process_stream")).collect()
    }

    fn process_buffer(&mut self, samples: &[f32]) -> Result<RawPitchTrack, EngineError> {
        let track = PitchTrackResult(unsafe {
            ffi::loqa_voice_analyzer_process_buffer(self.ptr.as_ptr(), samples.as_ptr(), samples.len())
        });
        let t = &track.0;
        if !t.success {
            return Err(EngineError::ComputationFailed("process_buffer: engine reported failure".into()));
        }
        if t.length > 0
            && (t.pitch_track_ptr.is_null() || t.voiced_probs_ptr.is_null() || t.timestamps_ptr.is_null())
        {
            return Err(EngineError::AllocationFailed(format!(
                "process_buffer: engine returned {} frames without storage",
                t.length
            )));
        }
        let raw = unsafe {
            RawPitchTrack {
                pitch_track: copy_floats(t.pitch_track_ptr, t.length),
                voiced_probabilities: copy_floats(t.voiced_probs_ptr, t.length),
                timestamps: copy_floats(t.timestamps_ptr, t.length),
            }
        };
        Ok(raw)
    }

    fn reset(&mut self) {
        unsafe { ffi::loqa_voice_analyzer_reset(self.ptr.as_ptr()) };
    }
}

impl Drop for NativeAnalyzer {
    fn drop(&mut self) {
        unsafe { ffi::loqa_voice_analyzer_free(self.ptr.as_ptr()) };
        debug!("native analyzer freed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PitchAlgorithm;

    #[test]
    fn config_to_ffi_keeps_fields() {
        let cfg = AnalyzerConfig {
            sample_rate: 44100,
            algorithm: PitchAlgorithm::Yin,
            ..AnalyzerConfig::default()
        };
        let c = config_to_ffi(&cfg);
        assert_eq!(c.sample_rate, 44100);
        assert_eq!(c.frame_size, 2048);
        assert_eq!(c.hop_size, 512);
        assert_eq!(c.algorithm, 2);
        assert!(c.interpolate);
    }

    #[test]
    fn failed_pitch_is_computation_failure() {
        let r = ffi::PitchResultFFI {
            success: false,
            frequency: 0.0,
            confidence: 0.0,
            is_voiced: false,
            voiced_probability: 0.0,
        };
        assert!(matches!(pitch_from_ffi(r, "x"), Err(EngineError::ComputationFailed(_))));
    }

    #[test]
    #[ignore = "requires libloqa_voice_dsp"]
    fn native_pitch_of_sine() {
        let sr = 16000u32;
        let samples: Vec<f32> = (0..4096)
            .map(|i| (2.0 * std::f32::consts::PI * 220.0 * i as f32 / sr as f32).sin())
            .collect();
        let r = NativeEngine::new().estimate_pitch(&samples, sr, 80.0, 400.0).unwrap();
        assert!(r.is_voiced);
        assert!((r.frequency - 220.0).abs() < 5.0, "got {}", r.frequency);
    }
}
