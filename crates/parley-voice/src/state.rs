//! Recognition session state machine.
//!
//! Valid transitions:
//! - Uninitialized -> Idle (capability configured)
//! - Idle -> Active (engine started)
//! - Active -> Idle (stop, engine ended, watchdog)
//! - Active -> Errored, Idle -> Errored (engine error)
//! - Errored -> Idle (errors are transient)
//! - Idle -> Uninitialized (re-initialization found no capability)

use std::fmt;

use serde::Serialize;

use crate::error::VoiceError;

/// Lifecycle state of a recognition controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecognitionState {
    /// No capability configured yet.
    Uninitialized,
    /// Ready to start a session.
    Idle,
    /// The engine is capturing audio.
    Active,
    /// An engine error is being handled.
    Errored,
}

impl fmt::Display for RecognitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionState::Uninitialized => write!(f, "Uninitialized"),
            RecognitionState::Idle => write!(f, "Idle"),
            RecognitionState::Active => write!(f, "Active"),
            RecognitionState::Errored => write!(f, "Errored"),
        }
    }
}

impl RecognitionState {
    /// Returns whether a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: &RecognitionState) -> bool {
        matches!(
            (self, target),
            (RecognitionState::Uninitialized, RecognitionState::Idle)
                | (RecognitionState::Idle, RecognitionState::Active)
                | (RecognitionState::Active, RecognitionState::Idle)
                | (RecognitionState::Active, RecognitionState::Errored)
                | (RecognitionState::Idle, RecognitionState::Errored)
                | (RecognitionState::Errored, RecognitionState::Idle)
                | (RecognitionState::Idle, RecognitionState::Uninitialized)
        )
    }
}

/// Validating wrapper around `RecognitionState`.
///
/// Owned by the controller task, so no locking is involved.
#[derive(Debug, Clone)]
pub struct StateMachine {
    state: RecognitionState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Create a new state machine in `Uninitialized`.
    pub fn new() -> Self {
        Self {
            state: RecognitionState::Uninitialized,
        }
    }

    /// Returns the current state.
    pub fn current(&self) -> RecognitionState {
        self.state
    }

    /// Attempt to transition to the target state.
    pub fn transition(&mut self, target: RecognitionState) -> Result<(), VoiceError> {
        if self.state.can_transition_to(&target) {
            tracing::debug!("Recognition state: {} -> {}", self.state, target);
            self.state = target;
            Ok(())
        } else {
            Err(VoiceError::InvalidTransition {
                from: self.state,
                to: target,
            })
        }
    }

    /// Force the state machine back to Idle (used for error recovery).
    pub fn reset(&mut self) {
        tracing::debug!("Recognition state machine reset to Idle from {}", self.state);
        self.state = RecognitionState::Idle;
    }
}
