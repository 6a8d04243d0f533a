//! Seam between the orchestrator and everything with side effects.
//!
//! The orchestrator only touches the outside world through this bundle, so
//! tests drive whole runs with scripted in-memory implementations and the
//! daemon wires in the live vision pipeline and stores.

use patchproof_core::{
    ChangeRequest, ExpectedMapping, ExtractionOutput, QualityResult, StepDefinition, StepResult,
};

use crate::error::EngineError;

/// External capabilities of one orchestrated change run.
///
/// The advice methods (`step_prompt`, `retake_advice`, `escalation_advice`)
/// are best-effort: the orchestrator recovers from their errors with a local
/// fallback and records the failure on the step's audit trail. Everything
/// else is load-bearing and aborts the run on error.
pub trait Collaborators: Send + Sync + 'static {
    /// Fetch the ordered step plan for a change.
    fn load_change(
        &self,
        change_id: &str,
    ) -> impl std::future::Future<Output = Result<ChangeRequest, EngineError>> + Send;

    /// Run the deterministic image-quality gate against stored evidence.
    fn quality_gate(
        &self,
        change_id: &str,
        step_id: &str,
        evidence_id: &str,
    ) -> impl std::future::Future<Output = Result<QualityResult, EngineError>> + Send;

    /// Extract identifier readings from already-gated evidence.
    fn extract(
        &self,
        change_id: &str,
        step_id: &str,
        evidence_id: &str,
    ) -> impl std::future::Future<Output = Result<ExtractionOutput, EngineError>> + Send;

    /// Look up the record-of-truth mapping this step must match.
    fn expected_mapping(
        &self,
        change_id: &str,
        step_id: &str,
    ) -> impl std::future::Future<Output = Result<ExpectedMapping, EngineError>> + Send;

    /// Produce a technician-facing prompt for a step about to run.
    fn step_prompt(
        &self,
        change: &ChangeRequest,
        step: &StepDefinition,
    ) -> impl std::future::Future<Output = Result<String, EngineError>> + Send;

    /// Produce retake guidance for a step that failed its checks.
    fn retake_advice(
        &self,
        step: &StepResult,
    ) -> impl std::future::Future<Output = Result<Vec<String>, EngineError>> + Send;

    /// Summarize a blocked step for the approver.
    fn escalation_advice(
        &self,
        step: &StepResult,
    ) -> impl std::future::Future<Output = Result<String, EngineError>> + Send;

    /// Open (or reuse) an approval request for a blocked step; returns its id.
    fn request_approval(
        &self,
        change_id: &str,
        step_id: &str,
        reason: &str,
    ) -> impl std::future::Future<Output = Result<String, EngineError>> + Send;

    /// Persist a step snapshot and fold it into the change's proof pack.
    fn persist(
        &self,
        change_id: &str,
        step: &StepResult,
        evidence_id: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), EngineError>> + Send;
}
