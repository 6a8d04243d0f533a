//! Proof pack: the durable, auditable summary of one change's verification.

use serde::{Deserialize, Serialize};

use crate::model::{Id, StepResult, StepStatus};
use crate::time::{now_ms, EpochMs};

/// Reference to one uploaded evidence artifact. Created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub evidence_id: Id,
    pub locator: Option<String>,
    pub sha256: Option<String>,
    pub captured_at_ms: Option<EpochMs>,
}

/// Derived completion accounting. Always recomputable from `steps`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProofSummary {
    pub verified_steps: u32,
    pub blocked_steps: u32,
    pub retake_requests: u32,
    pub total_steps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofPack {
    pub change_id: Id,
    pub started_at_ms: Option<EpochMs>,
    pub completed_at_ms: Option<EpochMs>,
    #[serde(default)]
    pub summary: ProofSummary,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    #[serde(default)]
    pub evidence_index: Vec<EvidenceRef>,
}

fn recompute_summary(steps: &[StepResult]) -> ProofSummary {
    let count = |pred: fn(StepStatus) -> bool| {
        steps.iter().filter(|s| pred(s.status)).count() as u32
    };
    ProofSummary {
        verified_steps: count(|s| matches!(s, StepStatus::Verified | StepStatus::Overridden)),
        blocked_steps: count(|s| s == StepStatus::Blocked),
        retake_requests: count(|s| s == StepStatus::NeedsRetake),
        total_steps: steps.len() as u32,
    }
}

/// Fold one step result (and optionally its evidence) into the pack.
///
/// The latest result replaces any previous one for the same step id; the
/// evidence index is deduplicated by evidence id; summary counts are
/// recomputed from scratch. The completion timestamp is set the first time
/// every step is terminal and never changed afterwards. Safe to call
/// repeatedly with the same inputs.
pub fn update_proofpack(
    existing: Option<&ProofPack>,
    change_id: &str,
    step_result: &StepResult,
    evidence_ref: Option<&EvidenceRef>,
) -> ProofPack {
    let mut steps = existing.map(|p| p.steps.clone()).unwrap_or_default();
    let mut evidence_index = existing.map(|p| p.evidence_index.clone()).unwrap_or_default();
    let started_at_ms = existing.and_then(|p| p.started_at_ms).or_else(|| Some(now_ms()));
    let mut completed_at_ms = existing.and_then(|p| p.completed_at_ms);

    match steps.iter_mut().find(|s| s.step_id == step_result.step_id) {
        Some(slot) => *slot = step_result.clone(),
        None => steps.push(step_result.clone()),
    }

    if let Some(evidence) = evidence_ref {
        if !evidence_index.iter().any(|e| e.evidence_id == evidence.evidence_id) {
            evidence_index.push(evidence.clone());
        }
    }

    let all_done = steps.iter().all(|s| s.status.is_terminal());
    if completed_at_ms.is_none() && all_done {
        completed_at_ms = Some(now_ms());
    }

    ProofPack {
        change_id: change_id.to_string(),
        started_at_ms,
        completed_at_ms,
        summary: recompute_summary(&steps),
        steps,
        evidence_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(step_id: &str, status: StepStatus) -> StepResult {
        StepResult::new("CHG-001", step_id, status)
    }

    fn evidence(id: &str) -> EvidenceRef {
        EvidenceRef {
            evidence_id: id.to_string(),
            locator: Some(format!("evidence/{id}")),
            sha256: None,
            captured_at_ms: None,
        }
    }

    #[test]
    fn replaces_step_by_id_and_dedups_evidence() {
        let pack = update_proofpack(None, "CHG-001", &step("S1", StepStatus::NeedsRetake), Some(&evidence("E1")));
        let pack = update_proofpack(Some(&pack), "CHG-001", &step("S1", StepStatus::Verified), Some(&evidence("E1")));
        assert_eq!(pack.steps.len(), 1);
        assert_eq!(pack.steps[0].status, StepStatus::Verified);
        assert_eq!(pack.evidence_index.len(), 1);
    }

    #[test]
    fn summary_counts_are_recomputable_from_steps() {
        let mut pack = update_proofpack(None, "CHG-001", &step("S1", StepStatus::Verified), None);
        pack = update_proofpack(Some(&pack), "CHG-001", &step("S2", StepStatus::Overridden), None);
        pack = update_proofpack(Some(&pack), "CHG-001", &step("S3", StepStatus::Blocked), None);
        pack = update_proofpack(Some(&pack), "CHG-001", &step("S4", StepStatus::NeedsRetake), None);

        assert_eq!(pack.summary, recompute_summary(&pack.steps));
        assert_eq!(pack.summary.verified_steps, 2);
        assert_eq!(pack.summary.blocked_steps, 1);
        assert_eq!(pack.summary.retake_requests, 1);
        assert_eq!(pack.summary.total_steps, 4);
    }

    #[test]
    fn completion_timestamp_is_set_once_and_kept() {
        let pack = update_proofpack(None, "CHG-001", &step("S1", StepStatus::NeedsRetake), None);
        assert!(pack.completed_at_ms.is_none());

        let done = update_proofpack(Some(&pack), "CHG-001", &step("S1", StepStatus::Verified), None);
        let completed = done.completed_at_ms.expect("completed once all steps terminal");

        let again = update_proofpack(Some(&done), "CHG-001", &step("S1", StepStatus::Verified), None);
        assert_eq!(again.completed_at_ms, Some(completed));
    }

    #[test]
    fn update_is_idempotent_for_identical_inputs() {
        let s = step("S1", StepStatus::Verified);
        let e = evidence("E1");
        let once = update_proofpack(None, "CHG-001", &s, Some(&e));
        let twice = update_proofpack(Some(&once), "CHG-001", &s, Some(&e));
        assert_eq!(once.steps.len(), twice.steps.len());
        assert_eq!(once.evidence_index.len(), twice.evidence_index.len());
        assert_eq!(once.summary, twice.summary);
    }
}
