//! Domain models, step state machine and proof-pack logic for patchproof.
//!
//! Everything in this crate is pure: no I/O, no clocks beyond `now_ms`, no
//! async. The orchestration layers build on these functions and persist the
//! snapshots they return.

pub mod model;
pub mod policy;
pub mod proofpack;
pub mod state;
pub mod time;
pub mod validate;

pub use model::*;
pub use proofpack::{update_proofpack, EvidenceRef, ProofPack, ProofSummary};
pub use state::{
    apply_extraction, apply_quality, apply_validation, approve_override, on_evidence_uploaded,
    start_step, StateError,
};
pub use time::{now_ms, EpochMs};
pub use validate::{validate_observed, Endpoint, ExpectedMapping};
