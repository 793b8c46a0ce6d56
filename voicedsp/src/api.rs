//! Public async call surface.
//!
//! Each call validates on the caller's task, then runs its engine work on a
//! blocking worker thread. Engine failures come back wrapped with the
//! parameters of the call.

use std::sync::Arc;

use loqa_engine::{Engine, EngineError, Formants, HarmonicDifference, Hnr, SpectralShape};
use tracing::{info, warn};

use crate::adapter::EngineAdapter;
use crate::config::{
    FftOptions, FormantOptions, H1H2Options, HnrOptions, PitchOptions, SessionConfig,
    SessionOptions,
};
use crate::error::{CallContext, Error, Result, ValidationError};
use crate::registry::{SessionHandle, SessionId, SessionRegistry};
use crate::session::SessionError;
use crate::types::{ClipResult, FftResult, FrameResult, PitchTrack};
use crate::validate::{
    MAX_ONE_SHOT_SAMPLES, validate_buffer, validate_fft_options, validate_formant_options,
    validate_h1h2_options, validate_hnr_options, validate_pitch_options, validate_sample_rate,
    validate_session_config,
};

/// Runs `f` on the blocking pool. A panic in `f` is reported as a
/// computation failure of the call described by `ctx`.
async fn on_worker<T, F>(ctx: CallContext, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(CallContext) -> Result<T> + Send + 'static,
{
    let panic_ctx = ctx.clone();
    match tokio::task::spawn_blocking(move || f(ctx)).await {
        Ok(result) => result,
        Err(e) => {
            warn!(context = %panic_ctx, error = %e, "worker task failed");
            Err(Error::engine(
                EngineError::ComputationFailed(format!("worker task failed: {e}")),
                panic_ctx,
            ))
        }
    }
}

fn session_error(err: SessionError, id: SessionId, ctx: CallContext) -> Error {
    match err {
        SessionError::Freed => ValidationError::HandleNotFound(id).into(),
        SessionError::Engine(source) => Error::engine(source, ctx),
    }
}

/// Entry point for bridges.
///
/// Cheap to clone; clones share the engine and the session registry.
#[derive(Clone)]
pub struct VoiceDsp {
    adapter: EngineAdapter,
    registry: Arc<SessionRegistry>,
}

impl VoiceDsp {
    /// Creates a call surface with its own empty registry.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self::with_registry(engine, Arc::new(SessionRegistry::new()))
    }

    pub fn with_registry(engine: Arc<dyn Engine>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            adapter: EngineAdapter::new(engine),
            registry,
        }
    }

    /// Call surface over the linked native engine.
    #[cfg(feature = "native")]
    pub fn native() -> Self {
        Self::new(Arc::new(loqa_engine::NativeEngine::new()))
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // One-shot operations
    // -----------------------------------------------------------------------

    /// Magnitude spectrum of `samples`. Shorter buffers are zero-padded to
    /// the transform size, longer ones truncated.
    pub async fn compute_fft(&self, samples: Vec<f32>, sample_rate: f64, opts: FftOptions) -> Result<FftResult> {
        validate_buffer(&samples, Some(MAX_ONE_SHOT_SAMPLES))?;
        let sample_rate = validate_sample_rate(sample_rate)?;
        let params = validate_fft_options(&opts)?;

        let ctx = CallContext::new("compute_fft")
            .sample_rate(sample_rate)
            .buffer_len(samples.len())
            .transform_size(params.size);
        let adapter = self.adapter.clone();
        on_worker(ctx, move |ctx| {
            adapter
                .transform(&samples, sample_rate, params)
                .map_err(|e| Error::engine(e, ctx))
        })
        .await
    }

    pub async fn detect_pitch(&self, samples: Vec<f32>, sample_rate: f64, opts: PitchOptions) -> Result<FrameResult> {
        validate_buffer(&samples, Some(MAX_ONE_SHOT_SAMPLES))?;
        let sample_rate = validate_sample_rate(sample_rate)?;
        let range = validate_pitch_options(&opts)?;

        let ctx = CallContext::new("detect_pitch")
            .sample_rate(sample_rate)
            .buffer_len(samples.len());
        let adapter = self.adapter.clone();
        on_worker(ctx, move |ctx| {
            adapter
                .estimate_pitch(&samples, sample_rate, range)
                .map_err(|e| Error::engine(e, ctx))
        })
        .await
    }

    pub async fn extract_formants(&self, samples: Vec<f32>, sample_rate: f64, opts: FormantOptions) -> Result<Formants> {
        validate_buffer(&samples, Some(MAX_ONE_SHOT_SAMPLES))?;
        let sample_rate = validate_sample_rate(sample_rate)?;
        let lpc_order = validate_formant_options(&opts, sample_rate)?;

        let ctx = CallContext::new("extract_formants")
            .sample_rate(sample_rate)
            .buffer_len(samples.len());
        let adapter = self.adapter.clone();
        on_worker(ctx, move |ctx| {
            adapter
                .extract_formants(&samples, sample_rate, lpc_order)
                .map_err(|e| Error::engine(e, ctx))
        })
        .await
    }

    /// Spectral centroid, rolloff and tilt.
    pub async fn analyze_spectrum(&self, samples: Vec<f32>, sample_rate: f64) -> Result<SpectralShape> {
        validate_buffer(&samples, Some(MAX_ONE_SHOT_SAMPLES))?;
        let sample_rate = validate_sample_rate(sample_rate)?;

        let ctx = CallContext::new("analyze_spectrum")
            .sample_rate(sample_rate)
            .buffer_len(samples.len());
        let adapter = self.adapter.clone();
        on_worker(ctx, move |ctx| {
            adapter
                .analyze_spectral_shape(&samples, sample_rate)
                .map_err(|e| Error::engine(e, ctx))
        })
        .await
    }

    pub async fn calculate_hnr(&self, samples: Vec<f32>, sample_rate: f64, opts: HnrOptions) -> Result<Hnr> {
        validate_buffer(&samples, Some(MAX_ONE_SHOT_SAMPLES))?;
        let sample_rate = validate_sample_rate(sample_rate)?;
        let range = validate_hnr_options(&opts)?;

        let ctx = CallContext::new("calculate_hnr")
            .sample_rate(sample_rate)
            .buffer_len(samples.len());
        let adapter = self.adapter.clone();
        on_worker(ctx, move |ctx| {
            adapter
                .harmonics_to_noise_ratio(&samples, sample_rate, range)
                .map_err(|e| Error::engine(e, ctx))
        })
        .await
    }

    pub async fn calculate_h1h2(
        &self,
        samples: Vec<f32>,
        sample_rate: f64,
        opts: H1H2Options,
    ) -> Result<HarmonicDifference> {
        validate_buffer(&samples, Some(MAX_ONE_SHOT_SAMPLES))?;
        let sample_rate = validate_sample_rate(sample_rate)?;
        let f0 = validate_h1h2_options(&opts)?;

        let ctx = CallContext::new("calculate_h1h2")
            .sample_rate(sample_rate)
            .buffer_len(samples.len());
        let adapter = self.adapter.clone();
        on_worker(ctx, move |ctx| {
            adapter
                .harmonic_amplitude_difference(&samples, sample_rate, f0)
                .map_err(|e| Error::engine(e, ctx))
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub async fn create_session(&self, opts: SessionOptions) -> Result<SessionHandle> {
        let config = validate_session_config(&opts)?;

        let ctx = CallContext::new("create_session").sample_rate(config.sample_rate());
        let adapter = self.adapter.clone();
        let registry = Arc::clone(&self.registry);
        on_worker(ctx, move |_| registry.create(&adapter, config)).await
    }

    /// Incremental analysis of a clip of any length. Smoothing state carries
    /// over from earlier calls on the same session until it is reset.
    pub async fn analyze_clip(&self, id: SessionId, samples: Vec<f32>) -> Result<ClipResult> {
        validate_buffer(&samples, None)?;
        let session = self.registry.get(id)?;

        let ctx = CallContext::new("analyze_clip")
            .session(id)
            .sample_rate(session.config().sample_rate())
            .buffer_len(samples.len());
        on_worker(ctx, move |ctx| {
            session
                .analyze_incremental(&samples)
                .map_err(|e| session_error(e, id, ctx))
        })
        .await
    }

    /// One frame through the session's analyzer.
    pub async fn analyze_frame(&self, id: SessionId, samples: Vec<f32>) -> Result<FrameResult> {
        validate_buffer(&samples, None)?;
        let session = self.registry.get(id)?;

        let ctx = CallContext::new("analyze_frame")
            .session(id)
            .sample_rate(session.config().sample_rate())
            .buffer_len(samples.len());
        on_worker(ctx, move |ctx| {
            session
                .analyze_frame(&samples)
                .map_err(|e| session_error(e, id, ctx))
        })
        .await
    }

    /// Whole-buffer re-decoding. Independent of earlier calls and of the
    /// session's configured algorithm.
    pub async fn process_buffer(&self, id: SessionId, samples: Vec<f32>) -> Result<PitchTrack> {
        validate_buffer(&samples, None)?;
        let session = self.registry.get(id)?;

        let ctx = CallContext::new("process_buffer")
            .session(id)
            .sample_rate(session.config().sample_rate())
            .buffer_len(samples.len());
        on_worker(ctx, move |ctx| {
            session
                .redecode(&samples)
                .map_err(|e| session_error(e, id, ctx))
        })
        .await
    }

    pub async fn reset_session(&self, id: SessionId) -> Result<()> {
        let session = self.registry.get(id)?;
        let ctx = CallContext::new("reset_session").session(id);
        on_worker(ctx, move |ctx| session.reset().map_err(|e| session_error(e, id, ctx))).await
    }

    /// Frees a session. Waits for an in-flight call on it to finish; a call
    /// that arrives after the free fails with `HandleNotFound`.
    pub async fn free_session(&self, id: SessionId) -> Result<()> {
        let session = self.registry.remove(id).ok_or(ValidationError::HandleNotFound(id))?;
        let ctx = CallContext::new("free_session").session(id);
        on_worker(ctx, move |_| {
            if session.free() {
                Ok(())
            } else {
                Err(ValidationError::HandleNotFound(id).into())
            }
        })
        .await
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.registry.ids()
    }

    pub fn session_config(&self, id: SessionId) -> Result<SessionConfig> {
        Ok(*self.registry.get(id)?.config())
    }

    /// Frees every live session and closes the registry. Returns how many
    /// were freed. Later `create_session` calls, including ones whose engine
    /// allocation was still running, fail with `REGISTRY_CLOSED`.
    pub async fn shutdown(&self) -> Result<usize> {
        let sessions = self.registry.close();
        let ctx = CallContext::new("shutdown");
        let freed = on_worker(ctx, move |_| Ok(sessions.iter().filter(|s| s.free()).count())).await?;
        info!(freed, "all sessions freed");
        Ok(freed)
    }
}

#[cfg(test)]
mod tests {
    use loqa_engine::testing::{FakeEngine, sine};
    use tokio_test::{assert_err, assert_ok, block_on};

    use super::*;

    fn dsp() -> (FakeEngine, VoiceDsp) {
        let engine = FakeEngine::new();
        (engine.clone(), VoiceDsp::new(Arc::new(engine)))
    }

    #[test]
    fn usable_from_blocking_callers() {
        let (_engine, dsp) = dsp();
        let handle = assert_ok!(block_on(dsp.create_session(SessionOptions::new(16000))));
        let clip = assert_ok!(block_on(dsp.analyze_clip(handle.id, sine(200.0, 16000, 4096, 0.5))));
        assert_eq!(clip.frame_count, 5);
        assert_ok!(block_on(dsp.free_session(handle.id)));
    }

    #[test]
    fn validation_precedes_registry_lookup() {
        let (engine, dsp) = dsp();
        let err = assert_err!(block_on(dsp.analyze_clip(SessionId::from_raw(5), Vec::new())));
        assert_eq!(err.code(), "EMPTY_BUFFER");
        assert_eq!(engine.calls(), 0);
    }

    #[test]
    fn freed_session_maps_to_handle_not_found() {
        let err = session_error(SessionError::Freed, SessionId::from_raw(3), CallContext::new("analyze_clip"));
        assert_eq!(err.code(), "HANDLE_NOT_FOUND");
        assert!(err.context().is_none());

        let err = session_error(
            SessionError::Engine(EngineError::ComputationFailed("x".into())),
            SessionId::from_raw(3),
            CallContext::new("analyze_clip").session(SessionId::from_raw(3)),
        );
        assert_eq!(err.context().and_then(|c| c.session_id), Some(SessionId::from_raw(3)));
    }

    #[test]
    fn shared_registry_sees_sessions_from_both_surfaces() {
        let engine = FakeEngine::new();
        let registry = Arc::new(SessionRegistry::new());
        let a = VoiceDsp::with_registry(Arc::new(engine.clone()), Arc::clone(&registry));
        let b = VoiceDsp::with_registry(Arc::new(engine), registry);

        let id = assert_ok!(block_on(a.create_session(SessionOptions::new(16000)))).id;
        assert_eq!(b.session_ids(), vec![id]);
        assert_ok!(block_on(b.free_session(id)));
        assert_eq!(a.session_count(), 0);
    }
}
