//! Raw FFI bindings for the loqa voice DSP C ABI.
//!
//! These declarations match `loqa_voice_dsp.h` (v0.5). We hand-write them
//! for the subset we need, avoiding bindgen complexity.

use std::os::raw::{c_float, c_void};

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PitchResultFFI {
    pub success: bool,
    pub frequency: c_float,
    pub confidence: c_float,
    pub is_voiced: bool,
    pub voiced_probability: c_float,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FormantResultFFI {
    pub success: bool,
    pub f1: c_float,
    pub f2: c_float,
    pub f3: c_float,
    pub confidence: c_float,
}

/// Caller must release with `loqa_free_fft_result`.
#[repr(C)]
pub struct FFTResultFFI {
    pub success: bool,
    pub magnitudes_ptr: *mut c_float,
    pub frequencies_ptr: *mut c_float,
    pub length: usize,
    pub sample_rate: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SpectralFeaturesFFI {
    pub success: bool,
    pub centroid: c_float,
    pub tilt: c_float,
    pub rolloff_95: c_float,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HNRResultFFI {
    pub success: bool,
    pub hnr: c_float,
    pub f0: c_float,
    pub is_voiced: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct H1H2ResultFFI {
    pub success: bool,
    pub h1h2: c_float,
    pub h1_amplitude_db: c_float,
    pub h2_amplitude_db: c_float,
    pub f0: c_float,
}

/// Must match the engine's struct layout exactly.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AnalysisConfigFFI {
    pub sample_rate: u32,
    pub frame_size: u32,
    pub hop_size: u32,
    pub min_frequency: c_float,
    pub max_frequency: c_float,
    /// 0=Auto, 1=PYIN, 2=YIN, 3=Autocorr
    pub algorithm: u32,
    pub threshold: c_float,
    pub min_confidence: c_float,
    pub interpolate: bool,
}

/// Caller must release with `loqa_free_pitch_track`.
#[repr(C)]
pub struct PitchTrackFFI {
    pub success: bool,
    /// Hz per frame, 0.0 = unvoiced.
    pub pitch_track_ptr: *mut c_float,
    pub voiced_probs_ptr: *mut c_float,
    pub timestamps_ptr: *mut c_float,
    pub length: usize,
}

unsafe extern "C" {
    pub fn loqa_detect_pitch(
        audio_ptr: *const c_float,
        audio_len: usize,
        sample_rate: u32,
        min_frequency: c_float,
        max_frequency: c_float,
    ) -> PitchResultFFI;

    pub fn loqa_extract_formants(
        audio_ptr: *const c_float,
        audio_len: usize,
        sample_rate: u32,
        lpc_order: usize,
    ) -> FormantResultFFI;

    pub fn loqa_compute_fft(
        audio_ptr: *const c_float,
        audio_len: usize,
        sample_rate: u32,
        fft_size: usize,
    ) -> FFTResultFFI;

    pub fn loqa_free_fft_result(result: *mut FFTResultFFI);

    pub fn loqa_analyze_spectrum(fft_result: *const FFTResultFFI) -> SpectralFeaturesFFI;

    pub fn loqa_calculate_hnr(
        audio_ptr: *const c_float,
        audio_len: usize,
        sample_rate: u32,
        min_frequency: c_float,
        max_frequency: c_float,
    ) -> HNRResultFFI;

    /// Pass `f0 = 0.0` for auto-detection.
    pub fn loqa_calculate_h1h2(
        audio_ptr: *const c_float,
        audio_len: usize,
        sample_rate: u32,
        f0: c_float,
    ) -> H1H2ResultFFI;

    pub fn loqa_voice_analyzer_new(config: AnalysisConfigFFI) -> *mut c_void;

    pub fn loqa_voice_analyzer_process_frame(
        analyzer: *mut c_void,
        samples: *const c_float,
        len: usize,
    ) -> PitchResultFFI;

    pub fn loqa_voice_analyzer_process_stream(
        analyzer: *mut c_void,
        samples: *const c_float,
        len: usize,
        results_out: *mut PitchResultFFI,
        max_results: usize,
    ) -> usize;

    pub fn loqa_voice_analyzer_process_buffer(
        analyzer: *mut c_void,
        samples: *const c_float,
        len: usize,
    ) -> PitchTrackFFI;

    pub fn loqa_free_pitch_track(result: *mut PitchTrackFFI);

    pub fn loqa_voice_analyzer_reset(analyzer: *mut c_void);

    pub fn loqa_voice_analyzer_free(analyzer: *mut c_void);
}
