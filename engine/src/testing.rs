//! Deterministic engine double for tests.
//!
//! [`FakeEngine`] answers every contract call from simple signal statistics
//! (RMS energy gate, zero-crossing pitch, naive DFT) so that tests of the
//! session layer can assert exact outcomes without the native library.
//! Its analyzers smooth voiced frequencies exponentially across frames, which
//! is enough to observe state carried between calls and cleared by reset.

use std::f32::consts::PI;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::engine::{Analyzer, Engine};
use crate::error::EngineError;
use crate::types::{
    AnalyzerConfig, Formants, HarmonicDifference, Hnr, PitchEstimate, RawPitchTrack,
    SpectralShape, Spectrum, WindowKind,
};

/// Frames quieter than this RMS level are unvoiced.
pub const ENERGY_GATE: f32 = 0.01;

/// Weight of the previous frequency in the analyzer's smoothing.
pub const SMOOTHING: f32 = 0.5;

#[derive(Default)]
struct Shared {
    calls: AtomicUsize,
    live: AtomicUsize,
    fail_next: Mutex<Option<EngineError>>,
    delay: Mutex<Option<Duration>>,
}

impl Shared {
    fn enter(&self) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(d) = delay {
            std::thread::sleep(d);
        }
        match self.fail_next.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// In-process engine double. Cloning shares counters and injected failures.
#[derive(Clone, Default)]
pub struct FakeEngine {
    shared: Arc<Shared>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of contract calls made so far, analyzer calls included.
    pub fn calls(&self) -> usize {
        self.shared.calls.load(Ordering::SeqCst)
    }

    /// Number of analyzers allocated and not yet dropped.
    pub fn live_analyzers(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    /// Makes the next contract call fail with `err`.
    pub fn fail_next(&self, err: EngineError) {
        *self.shared.fail_next.lock() = Some(err);
    }

    /// Makes every contract call sleep for `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.shared.delay.lock() = delay;
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Frequency from the spacing of upward zero crossings.
fn zero_crossing_frequency(samples: &[f32], sample_rate: u32) -> f32 {
    let crossings: Vec<f32> = samples
        .windows(2)
        .enumerate()
        .filter(|(_, w)| w[0] < 0.0 && w[1] >= 0.0)
        .map(|(i, w)| i as f32 + w[0] / (w[0] - w[1]))
        .collect();
    match (crossings.first(), crossings.last()) {
        (Some(first), Some(last)) if crossings.len() >= 2 && last > first => {
            (crossings.len() - 1) as f32 * sample_rate as f32 / (last - first)
        }
        _ => 0.0,
    }
}

fn estimate(samples: &[f32], sample_rate: u32, min: f32, max: f32) -> PitchEstimate {
    let level = rms(samples);
    let freq = zero_crossing_frequency(samples, sample_rate);
    if level < ENERGY_GATE || freq < min || freq > max {
        return PitchEstimate {
            frequency: 0.0,
            confidence: 0.0,
            is_voiced: false,
            voiced_probability: 0.1,
        };
    }
    PitchEstimate {
        frequency: freq,
        confidence: (level * 4.0).min(1.0),
        is_voiced: true,
        voiced_probability: 0.9,
    }
}

fn window_coefficient(kind: WindowKind, i: usize, n: usize) -> f32 {
    if n <= 1 {
        return 1.0;
    }
    let x = 2.0 * PI * i as f32 / (n - 1) as f32;
    match kind {
        WindowKind::Hann => 0.5 - 0.5 * x.cos(),
        WindowKind::Hamming => 0.54 - 0.46 * x.cos(),
        WindowKind::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
        WindowKind::Rectangular => 1.0,
    }
}

/// Naive DFT over `size` points; returns (magnitude, phase) for bins 0..size/2.
fn dft(samples: &[f32], size: usize, window: WindowKind) -> Vec<(f32, f32)> {
    let used = samples.len().min(size);
    let frame: Vec<f32> = (0..size)
        .map(|i| if i < used { samples[i] * window_coefficient(window, i, used) } else { 0.0 })
        .collect();
    (0..size / 2)
        .map(|k| {
            let (mut re, mut im) = (0.0f64, 0.0f64);
            for (i, &s) in frame.iter().enumerate().take(used) {
                let angle = -2.0 * std::f64::consts::PI * (k * i) as f64 / size as f64;
                re += s as f64 * angle.cos();
                im += s as f64 * angle.sin();
            }
            (((re * re + im * im).sqrt()) as f32, im.atan2(re) as f32)
        })
        .collect()
}

/// Amplitude at one frequency, Goertzel style.
fn tone_amplitude(samples: &[f32], sample_rate: u32, freq: f32) -> f32 {
    let (mut re, mut im) = (0.0f64, 0.0f64);
    for (i, &s) in samples.iter().enumerate() {
        let angle = 2.0 * std::f64::consts::PI * freq as f64 * i as f64 / sample_rate as f64;
        re += s as f64 * angle.cos();
        im -= s as f64 * angle.sin();
    }
    (2.0 * (re * re + im * im).sqrt() / samples.len().max(1) as f64) as f32
}

fn to_db(amplitude: f32) -> f32 {
    20.0 * amplitude.max(1e-10).log10()
}

impl Engine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn transform(
        &self,
        samples: &[f32],
        sample_rate: u32,
        size: usize,
        window: WindowKind,
        include_phases: bool,
    ) -> Result<Spectrum, EngineError> {
        self.shared.enter()?;
        if size == 0 {
            return Err(EngineError::InvalidInput("transform size is zero".into()));
        }
        let bins = dft(samples, size, window);
        let frequencies = (0..bins.len())
            .map(|k| k as f32 * sample_rate as f32 / size as f32)
            .collect();
        Ok(Spectrum {
            magnitudes: bins.iter().map(|b| b.0).collect(),
            frequencies,
            phases: include_phases.then(|| bins.iter().map(|b| b.1).collect()),
            sample_rate,
        })
    }

    fn estimate_pitch(
        &self,
        samples: &[f32],
        sample_rate: u32,
        min_frequency: f32,
        max_frequency: f32,
    ) -> Result<PitchEstimate, EngineError> {
        self.shared.enter()?;
        Ok(estimate(samples, sample_rate, min_frequency, max_frequency))
    }

    fn extract_formants(
        &self,
        samples: &[f32],
        _sample_rate: u32,
        lpc_order: usize,
    ) -> Result<Formants, EngineError> {
        self.shared.enter()?;
        if samples.len() <= lpc_order {
            return Err(EngineError::InvalidInput(format!(
                "buffer of {} samples too short for lpc order {lpc_order}",
                samples.len()
            )));
        }
        let voiced = rms(samples) >= ENERGY_GATE;
        Ok(Formants {
            f1: 500.0,
            f2: 1500.0,
            f3: 2500.0,
            confidence: if voiced { 0.8 } else { 0.0 },
        })
    }

    fn analyze_spectral_shape(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<SpectralShape, EngineError> {
        self.shared.enter()?;
        let mut size = 256;
        while size * 2 <= samples.len() && size < 1024 {
            size *= 2;
        }
        let bins = dft(samples, size, WindowKind::Hann);
        let hz = |k: usize| k as f32 * sample_rate as f32 / size as f32;
        let total: f32 = bins.iter().map(|b| b.0).sum();
        if total <= 0.0 {
            return Ok(SpectralShape::default());
        }
        let centroid = bins.iter().enumerate().map(|(k, b)| hz(k) * b.0).sum::<f32>() / total;
        let energy: f32 = bins.iter().map(|b| b.0 * b.0).sum();
        let mut acc = 0.0;
        let mut rolloff = hz(bins.len() - 1);
        for (k, b) in bins.iter().enumerate() {
            acc += b.0 * b.0;
            if acc >= 0.95 * energy {
                rolloff = hz(k);
                break;
            }
        }
        Ok(SpectralShape {
            centroid,
            rolloff,
            tilt: 0.0,
        })
    }

    fn harmonics_to_noise_ratio(
        &self,
        samples: &[f32],
        sample_rate: u32,
        min_frequency: f32,
        max_frequency: f32,
    ) -> Result<Hnr, EngineError> {
        self.shared.enter()?;
        let p = estimate(samples, sample_rate, min_frequency, max_frequency);
        Ok(Hnr {
            hnr: if p.is_voiced { 20.0 } else { 0.0 },
            f0: p.frequency,
            is_voiced: p.is_voiced,
        })
    }

    fn harmonic_amplitude_difference(
        &self,
        samples: &[f32],
        sample_rate: u32,
        f0: Option<f32>,
    ) -> Result<HarmonicDifference, EngineError> {
        self.shared.enter()?;
        let f0 = match f0 {
            Some(f) => f,
            None => {
                let p = estimate(samples, sample_rate, 50.0, 1000.0);
                if !p.is_voiced {
                    return Err(EngineError::ComputationFailed("no fundamental found".into()));
                }
                p.frequency
            }
        };
        let h1_db = to_db(tone_amplitude(samples, sample_rate, f0));
        let h2_db = to_db(tone_amplitude(samples, sample_rate, 2.0 * f0));
        Ok(HarmonicDifference {
            h1h2: h1_db - h2_db,
            h1_db,
            h2_db,
            f0,
        })
    }

    fn create_analyzer(&self, config: &AnalyzerConfig) -> Result<Box<dyn Analyzer>, EngineError> {
        self.shared.enter()?;
        self.shared.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeAnalyzer {
            config: *config,
            smoothed: None,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct FakeAnalyzer {
    config: AnalyzerConfig,
    smoothed: Option<f32>,
    shared: Arc<Shared>,
}

impl FakeAnalyzer {
    fn step(&mut self, frame: &[f32]) -> PitchEstimate {
        let mut p = estimate(
            frame,
            self.config.sample_rate,
            self.config.min_frequency,
            self.config.max_frequency,
        );
        if p.is_voiced {
            let f = match self.smoothed {
                Some(prev) => SMOOTHING * prev + (1.0 - SMOOTHING) * p.frequency,
                None => p.frequency,
            };
            self.smoothed = Some(f);
            p.frequency = f;
        }
        p
    }

    fn frame_ranges(&self, len: usize) -> Vec<Range<usize>> {
        let frame = self.config.frame_size as usize;
        let hop = self.config.hop_size.max(1) as usize;
        (0..self.config.frame_count(len))
            .map(|i| i * hop..i * hop + frame)
            .collect()
    }
}

impl Analyzer for FakeAnalyzer {
    fn process_frame(&mut self, samples: &[f32]) -> Result<PitchEstimate, EngineError> {
        self.shared.enter()?;
        Ok(self.step(samples))
    }

    fn process_stream(
        &mut self,
        samples: &[f32],
        max_results: usize,
    ) -> Result<Vec<PitchEstimate>, EngineError> {
        self.shared.enter()?;
        let ranges = self.frame_ranges(samples.len());
        Ok(ranges
            .into_iter()
            .take(max_results)
            .map(|r| self.step(&samples[r]))
            .collect())
    }

    fn process_buffer(&mut self, samples: &[f32]) -> Result<RawPitchTrack, EngineError> {
        self.shared.enter()?;
        let hop = self.config.hop_size.max(1) as f32;
        let rate = self.config.sample_rate as f32;
        let mut track = RawPitchTrack::default();
        for (i, r) in self.frame_ranges(samples.len()).into_iter().enumerate() {
            let p = estimate(&samples[r], self.config.sample_rate, self.config.min_frequency, self.config.max_frequency);
            track.pitch_track.push(if p.is_voiced { p.frequency } else { 0.0 });
            track.voiced_probabilities.push(p.voiced_probability);
            track.timestamps.push(i as f32 * hop / rate);
        }
        Ok(track)
    }

    fn reset(&mut self) {
        self.smoothed = None;
    }
}

impl Drop for FakeAnalyzer {
    fn drop(&mut self) {
        self.shared.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// `len` samples of a sine at `freq` Hz with the given amplitude.
pub fn sine(freq: f32, sample_rate: u32, len: usize, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
        .collect()
}
