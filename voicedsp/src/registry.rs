//! Session registry.
//!
//! Maps opaque [`SessionId`]s to live [`Session`]s. One lock guards the id
//! counter and the map together; it is never held across an engine call.
//! Tearing down a removed session is the caller's job, see
//! [`Session::free`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adapter::{AnalyzerResource, EngineAdapter};
use crate::config::SessionConfig;
use crate::error::{CallContext, Error, Result, ValidationError};
use crate::session::Session;

/// Opaque session identifier handed to callers.
///
/// Issued from a monotonically increasing counter starting at 1; an id is
/// never reused within one registry, even after its session is freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Wraps a raw id received from a bridge.
    pub fn from_raw(raw: u64) -> Self {
        SessionId(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a caller gets back from session creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHandle {
    pub id: SessionId,
    pub config: SessionConfig,
}

struct RegistryInner {
    next_id: u64,
    sessions: HashMap<SessionId, Arc<Session>>,
    closed: bool,
}

/// Concurrency-safe store of live sessions.
///
/// Injectable: create one per [`crate::VoiceDsp`] or share one between
/// several. Dropping the registry drops every session still in it, which
/// frees their analyzers.
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_id: 1,
                sessions: HashMap::new(),
                closed: false,
            }),
        }
    }

    /// Allocates an analyzer for `config` and registers it under a fresh id.
    ///
    /// Blocking: the engine allocation happens on the calling thread, outside
    /// the registry lock. Fails with [`Error::RegistryClosed`] once
    /// [`SessionRegistry::close`] has run, even if the allocation was already
    /// in flight; the analyzer is then freed again.
    pub fn create(&self, adapter: &EngineAdapter, config: SessionConfig) -> Result<SessionHandle> {
        if self.inner.lock().closed {
            return Err(Error::RegistryClosed);
        }
        let analyzer = AnalyzerResource::create(adapter, &config.analyzer_config()).map_err(|source| {
            Error::EngineCreationFailed {
                source,
                context: CallContext::new("create_session").sample_rate(config.sample_rate()),
            }
        })?;

        let id = {
            let mut inner = self.inner.lock();
            if inner.closed {
                drop(inner);
                drop(analyzer);
                warn!(engine = adapter.engine_name(), "registry closed during session creation");
                return Err(Error::RegistryClosed);
            }
            let id = SessionId(inner.next_id);
            inner.next_id += 1;
            inner.sessions.insert(id, Arc::new(Session::new(id, config, analyzer)));
            id
        };
        info!(
            session = %id,
            engine = adapter.engine_name(),
            sample_rate = config.sample_rate(),
            frame_size = config.frame_size(),
            hop_size = config.hop_size(),
            "session created"
        );
        Ok(SessionHandle { id, config })
    }

    /// Looks up a live session.
    pub fn get(&self, id: SessionId) -> std::result::Result<Arc<Session>, ValidationError> {
        self.inner
            .lock()
            .sessions
            .get(&id)
            .cloned()
            .ok_or(ValidationError::HandleNotFound(id))
    }

    /// Unregisters a session and hands it back; `None` if `id` is unknown.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        let removed = self.inner.lock().sessions.remove(&id);
        if removed.is_some() {
            debug!(session = %id, "session unregistered");
        }
        removed
    }

    /// Stops accepting sessions and unregisters every live one.
    pub fn close(&self) -> Vec<Arc<Session>> {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.sessions.drain().map(|(_, s)| s).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all live sessions, ascending.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.inner.lock().sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
