//! Error types shared by the practice tools.

use thiserror::Error;

use crate::theory::NotePitch;

/// Errors produced by the tuner, drone and click track.
///
/// `AcquisitionFailed` and `DecodeFailed` are retryable: the owning tool
/// drops into its error state and schedules one deferred retry.
/// `DuplicateVoiceRejected` is never shown to the user; callers treat it as
/// a no-op.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PracticeError {
    /// Microphone or audio output unavailable (or blocked pending a user gesture).
    #[error("Audio device unavailable: {0}")]
    AcquisitionFailed(String),

    /// A sound asset could not be decoded.
    #[error("Failed to load sound '{id}': {reason}")]
    DecodeFailed { id: String, reason: String },

    /// The change would create a second voice at the same pitch.
    #[error("Voice {0} is already sounding")]
    DuplicateVoiceRejected(NotePitch),

    /// A sound switch is still in flight.
    #[error("Sound switch in progress")]
    SwitchInProgress,

    /// The operation is not valid in the component's current state.
    #[error("Cannot {op} while {state}")]
    InvalidState {
        op: &'static str,
        state: &'static str,
    },

    /// An argument was outside its accepted range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be parsed or validated.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PracticeError {
    /// Whether the owning component should schedule a deferred retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PracticeError::AcquisitionFailed(_) | PracticeError::DecodeFailed { .. }
        )
    }
}

/// Result type for practice-tool operations.
pub type PracticeResult<T> = Result<T, PracticeError>;
