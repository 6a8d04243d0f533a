//! Orchestration engine: drives one change's steps through the state
//! machine, blocking on external signals and calling collaborators through
//! an injected bundle.

pub mod collaborators;
pub mod error;
pub mod orchestrator;
pub mod signals;

pub use collaborators::Collaborators;
pub use error::EngineError;
pub use orchestrator::{
    ApprovalExpiry, ChangeOutcome, ChangeRunReport, Orchestrator, OrchestratorConfig,
};
pub use signals::SignalHub;
