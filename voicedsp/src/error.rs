//! Error taxonomy of the session layer.
//!
//! Two families, never mixed:
//!
//! - [`ValidationError`]: caught in this layer before the engine is reached,
//!   including unknown or already-freed session handles.
//! - Engine failures: one of the three [`EngineError`] classes, re-wrapped
//!   with the parameters of the call that produced them.
//!
//! Bridges report errors through [`Error::report`], whose `code` is stable
//! across implementations.

use std::fmt;

use loqa_engine::EngineError;
use serde::Serialize;
use thiserror::Error;

use crate::registry::SessionId;

/// Result type alias for the session layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Rejected input, detected without touching the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("buffer is empty")]
    EmptyBuffer,

    #[error("buffer of {len} samples exceeds the limit of {max}")]
    BufferTooLarge { len: usize, max: usize },

    #[error("sample at index {index} is not finite")]
    NonFiniteSample { index: usize },

    #[error("{field} must be an integer, got {value}")]
    NotInteger { field: &'static str, value: f64 },

    #[error("{field} must be within [{min}, {max}], got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must be a power of two, got {value}")]
    NotPowerOfTwo { field: &'static str, value: f64 },

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("minimum frequency {min} must be below maximum frequency {max}")]
    InvertedRange { min: f64, max: f64 },

    #[error("session {0} not found")]
    HandleNotFound(SessionId),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::EmptyBuffer => "EMPTY_BUFFER",
            ValidationError::BufferTooLarge { .. } => "BUFFER_TOO_LARGE",
            ValidationError::NonFiniteSample { .. } => "NON_FINITE_SAMPLE",
            ValidationError::NotInteger { .. } => "NOT_INTEGER",
            ValidationError::OutOfRange { .. } => "OUT_OF_RANGE",
            ValidationError::NotPowerOfTwo { .. } => "NOT_POWER_OF_TWO",
            ValidationError::NonPositive { .. } => "NON_POSITIVE",
            ValidationError::InvertedRange { .. } => "INVERTED_RANGE",
            ValidationError::HandleNotFound(_) => "HANDLE_NOT_FOUND",
        }
    }
}

/// Parameters of the call that failed, attached to engine errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallContext {
    pub operation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transform_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl CallContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            ..Self::default()
        }
    }

    pub fn sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn buffer_len(mut self, len: usize) -> Self {
        self.buffer_len = Some(len);
        self
    }

    pub fn transform_size(mut self, size: usize) -> Self {
        self.transform_size = Some(size);
        self
    }

    pub fn session(mut self, id: SessionId) -> Self {
        self.session_id = Some(id);
        self
    }
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.operation)?;
        let mut sep = "";
        if let Some(id) = self.session_id {
            write!(f, "{sep}session={id}")?;
            sep = ", ";
        }
        if let Some(rate) = self.sample_rate {
            write!(f, "{sep}sample_rate={rate}")?;
            sep = ", ";
        }
        if let Some(len) = self.buffer_len {
            write!(f, "{sep}buffer_len={len}")?;
            sep = ", ";
        }
        if let Some(size) = self.transform_size {
            write!(f, "{sep}transform_size={size}")?;
        }
        write!(f, ")")
    }
}

/// Error type for every public call.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{context}: session creation failed: {source}")]
    EngineCreationFailed {
        source: EngineError,
        context: CallContext,
    },

    #[error("{context}: {source}")]
    Engine {
        source: EngineError,
        context: CallContext,
    },

    /// The registry was shut down; no new sessions are accepted.
    #[error("session registry is closed")]
    RegistryClosed,
}

impl Error {
    pub(crate) fn engine(source: EngineError, context: CallContext) -> Self {
        Error::Engine { source, context }
    }

    /// Stable, language-neutral error code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(e) => e.code(),
            Error::EngineCreationFailed { .. } => "ENGINE_CREATION_FAILED",
            Error::RegistryClosed => "REGISTRY_CLOSED",
            Error::Engine { source, .. } => match source {
                EngineError::InvalidInput(_) => "ENGINE_INVALID_INPUT",
                EngineError::ComputationFailed(_) => "ENGINE_COMPUTATION_FAILED",
                EngineError::AllocationFailed(_) => "ENGINE_ALLOCATION_FAILED",
            },
        }
    }

    /// The engine failure, if this error came from the engine.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Error::Validation(_) | Error::RegistryClosed => None,
            Error::EngineCreationFailed { source, .. } | Error::Engine { source, .. } => Some(source),
        }
    }

    pub fn context(&self) -> Option<&CallContext> {
        match self {
            Error::Validation(_) | Error::RegistryClosed => None,
            Error::EngineCreationFailed { context, .. } | Error::Engine { context, .. } => Some(context),
        }
    }

    pub fn is_handle_not_found(&self) -> bool {
        matches!(self, Error::Validation(ValidationError::HandleNotFound(_)))
    }

    /// The single reported form handed to bridges.
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            code: self.code(),
            message: self.to_string(),
            context: self.context().cloned(),
        }
    }
}

/// Serializable error as seen by bridge callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<CallContext>,
}
