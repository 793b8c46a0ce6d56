//! Streaming session state machine.
//!
//! ```text
//! Created --analyze--> Active --free--> Freed
//!    |                   ^ |
//!    +-------free--------+-+--reset (self-transition)
//! ```
//!
//! Incremental analysis carries the analyzer's smoothing state from call to
//! call. Whole-buffer re-decoding does not: each call is independent and
//! leaves the incremental state as it was.
//!
//! Every method blocks for the duration of its engine call and holds the
//! session lock meanwhile, so `free` never overlaps an in-flight call on
//! the same session.

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use loqa_engine::EngineError;

use crate::adapter::AnalyzerResource;
use crate::config::SessionConfig;
use crate::registry::SessionId;
use crate::types::{ClipResult, FrameResult, PitchTrack};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Analyzer allocated, nothing processed yet.
    Created,
    /// At least one incremental call made.
    Active,
    /// Terminal.
    Freed,
}

/// Failure of a session-scoped call, before context is attached.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("session has been freed")]
    Freed,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

struct SessionInner {
    state: SessionState,
    analyzer: Option<AnalyzerResource>,
}

/// One live analyzer plus its immutable configuration.
pub struct Session {
    id: SessionId,
    config: SessionConfig,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub(crate) fn new(id: SessionId, config: SessionConfig, analyzer: AnalyzerResource) -> Self {
        Self {
            id,
            config,
            inner: Mutex::new(SessionInner {
                state: SessionState::Created,
                analyzer: Some(analyzer),
            }),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    fn with_analyzer<T>(
        &self,
        f: impl FnOnce(&mut AnalyzerResource) -> Result<T, EngineError>,
        activates: bool,
    ) -> Result<T, SessionError> {
        let mut inner = self.inner.lock();
        let analyzer = inner.analyzer.as_mut().ok_or(SessionError::Freed)?;
        let out = f(analyzer)?;
        if activates {
            inner.state = SessionState::Active;
        }
        Ok(out)
    }

    /// Frame-by-frame analysis of a clip, continuing from earlier calls.
    pub fn analyze_incremental(&self, samples: &[f32]) -> Result<ClipResult, SessionError> {
        let frames = self.with_analyzer(|a| a.process_stream(samples), true)?;
        Ok(ClipResult::from_frames(frames))
    }

    /// Exactly one frame, continuing from earlier calls.
    pub fn analyze_frame(&self, samples: &[f32]) -> Result<FrameResult, SessionError> {
        self.with_analyzer(|a| a.process_frame(samples), true)
    }

    /// Globally optimal pitch track of the whole buffer.
    pub fn redecode(&self, samples: &[f32]) -> Result<PitchTrack, SessionError> {
        let raw = self.with_analyzer(|a| a.process_buffer(samples), false)?;
        Ok(PitchTrack::from(raw))
    }

    /// Discards smoothing state; the next incremental call behaves as on a
    /// fresh session.
    pub fn reset(&self) -> Result<(), SessionError> {
        self.with_analyzer(
            |a| {
                a.reset();
                Ok(())
            },
            false,
        )?;
        info!(session = %self.id, "session reset");
        Ok(())
    }

    /// Frees the analyzer. Returns `false` if it was already freed.
    ///
    /// Waits for any in-flight call on this session to finish first.
    pub fn free(&self) -> bool {
        let analyzer = {
            let mut inner = self.inner.lock();
            inner.state = SessionState::Freed;
            inner.analyzer.take()
        };
        match analyzer {
            Some(analyzer) => {
                drop(analyzer);
                info!(session = %self.id, "session freed");
                true
            }
            None => false,
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.inner.get_mut().analyzer.is_some() {
            warn!(session = %self.id, "session dropped without being freed");
        }
    }
}
