//! Error taxonomy for the voice input controller.

use std::fmt;

use parley_core::error::ParleyError;

use crate::engine::EngineErrorCode;
use crate::state::RecognitionState;

/// Which engine primitive failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOperation {
    Configure,
    Start,
    Stop,
}

impl fmt::Display for EngineOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineOperation::Configure => write!(f, "configure"),
            EngineOperation::Start => write!(f, "start"),
            EngineOperation::Stop => write!(f, "stop"),
        }
    }
}

/// Errors raised while driving a recognition session.
///
/// None of these reach the caller of `start`/`stop`/`toggle`: the controller
/// turns each one into a spoken and visual notice and resets its state.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("speech recognition is not supported by this host")]
    UnsupportedEnvironment,
    #[error("speech recognition engine is unavailable")]
    EngineUnavailable,
    #[error("microphone permission denied: {reason}")]
    PermissionDenied { reason: String },
    #[error("recognition engine reported {code}")]
    Engine { code: EngineErrorCode },
    #[error("engine {operation} failed: {message}")]
    EngineFault {
        operation: EngineOperation,
        message: String,
    },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: RecognitionState,
        to: RecognitionState,
    },
}

impl VoiceError {
    pub fn fault(operation: EngineOperation, message: impl Into<String>) -> Self {
        VoiceError::EngineFault {
            operation,
            message: message.into(),
        }
    }
}

impl From<VoiceError> for ParleyError {
    fn from(err: VoiceError) -> Self {
        ParleyError::Voice(err.to_string())
    }
}
