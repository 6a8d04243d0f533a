use patchproof_core::StateError;
use thiserror::Error;

/// Engine error taxonomy.
///
/// Automated-check failures (quality, confidence, record mismatch) are state
/// transitions, not errors; only missing definitions, malformed input and
/// internal invariant breaks travel on this channel.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing change/evidence/record definition. Never retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// Evidence bytes are not a valid image.
    #[error("undecodable evidence: {0}")]
    Decode(String),

    /// An optional collaborator is unreachable. Recovered locally via a
    /// deterministic fallback for advice; fatal for required collaborators.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// A bounded wait expired under a policy that terminates it.
    #[error("wait expired: {0}")]
    Expired(String),

    /// Persistence layer failure.
    #[error("storage: {0}")]
    Storage(String),

    /// Internal invariant break; a programming error, not a runtime
    /// condition.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl From<StateError> for EngineError {
    fn from(err: StateError) -> Self {
        EngineError::Invariant(err.to_string())
    }
}
