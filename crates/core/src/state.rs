//! Step state machine transitions.
//!
//! Each transition takes the previous [`StepResult`] snapshot and returns a
//! new one; callers persist every returned snapshot. Two policy rules hold
//! everywhere: a step reaches `Verified` only through [`apply_validation`]
//! with a positive match, and it leaves `Blocked` only through
//! [`approve_override`].

use thiserror::Error;

use crate::model::{
    ExtractionOutput, QualityResult, StepDefinition, StepResult, StepStatus, ValidationResult,
    VerificationRequirement,
};
use crate::policy::dedup_guidance;
use crate::time::now_ms;

#[derive(Debug, Error)]
pub enum StateError {
    /// Programming error, not a runtime condition: the caller attempted a
    /// transition the state machine does not define.
    #[error("approve_override is only legal from blocked, not {from:?}")]
    InvalidTransition { from: StepStatus },
}

/// Initial status when a step starts.
pub fn start_step(def: &StepDefinition) -> StepStatus {
    match &def.evidence {
        Some(req) if req.count > 0 => StepStatus::AwaitingEvidence,
        _ => StepStatus::Verifying,
    }
}

/// Record a delivered evidence id and move to `Verifying`.
///
/// Idempotent on replay: redelivering an already-recorded evidence id does
/// not duplicate the entry, but still produces the status transition.
pub fn on_evidence_uploaded(prev: &StepResult, evidence_id: &str) -> StepResult {
    let mut evidence_ids = prev.evidence_ids.clone();
    if !evidence_ids.iter().any(|id| id == evidence_id) {
        evidence_ids.push(evidence_id.to_string());
    }
    StepResult {
        status: StepStatus::Verifying,
        evidence_ids,
        updated_at_ms: now_ms(),
        ..prev.clone()
    }
}

/// Apply a quality-gate verdict: pass records the metrics and stays in
/// `Verifying`; fail moves to `NeedsRetake` carrying the gate's guidance.
pub fn apply_quality(prev: &StepResult, gate: &QualityResult) -> StepResult {
    if gate.pass {
        return StepResult {
            status: StepStatus::Verifying,
            quality: gate.metrics.clone(),
            quality_fail_reason: None,
            updated_at_ms: now_ms(),
            ..prev.clone()
        };
    }
    StepResult {
        status: StepStatus::NeedsRetake,
        guidance: dedup_guidance(gate.guidance.iter().cloned()),
        quality: gate.metrics.clone(),
        quality_fail_reason: Some(
            gate.fail_reason
                .clone()
                .unwrap_or_else(|| "Image quality below threshold".to_string()),
        ),
        updated_at_ms: now_ms(),
        ..prev.clone()
    }
}

fn default_verify() -> VerificationRequirement {
    VerificationRequirement {
        requires_port_label: true,
        requires_cable_tag: true,
        min_confidence: crate::policy::DEFAULT_MIN_CONFIDENCE,
    }
}

/// Apply extractor output.
///
/// A required field is missing when its value is absent or its confidence is
/// below the step's minimum. Any missing required field means
/// `NeedsRetake`; otherwise the observed fields are recorded and the step
/// stays in `Verifying` for record validation. Combined confidence is the
/// minimum over the required fields: the step is never more confident than
/// its weakest required signal.
pub fn apply_extraction(
    def: &StepDefinition,
    prev: &StepResult,
    out: &ExtractionOutput,
) -> StepResult {
    let verify = def.verify.clone().unwrap_or_else(default_verify);
    let min_conf = verify.min_confidence;

    let port_missing = out.port.value.is_none() || out.port.confidence < min_conf;
    let cable_missing = out.cable.value.is_none() || out.cable.confidence < min_conf;

    let mut needs_retake = false;
    let mut guidance: Vec<String> = prev.guidance.clone();
    if verify.requires_port_label && port_missing {
        needs_retake = true;
        guidance.extend(out.port.guidance.iter().cloned());
    }
    if verify.requires_cable_tag && cable_missing {
        needs_retake = true;
        guidance.extend(out.cable.guidance.iter().cloned());
    }

    let combined = match (verify.requires_port_label, verify.requires_cable_tag) {
        (true, true) => out.port.confidence.min(out.cable.confidence),
        (true, false) => out.port.confidence,
        (false, true) => out.cable.confidence,
        (false, false) => out.port.confidence.max(out.cable.confidence),
    };

    if needs_retake {
        // A field can read above the global floor yet below the step's own
        // minimum; those readings carry no per-field guidance, and a retake
        // request with no tips is not actionable.
        let mut guidance = dedup_guidance(guidance);
        if guidance.is_empty() {
            guidance.push(crate::policy::TIP_MOVE_CLOSER.to_string());
        }
        return StepResult {
            status: StepStatus::NeedsRetake,
            observed_panel_id: out.panel_id.clone(),
            observed_port_label: out.port.value.clone(),
            observed_cable_tag: out.cable.value.clone(),
            confidence: Some(combined),
            guidance,
            notes: Some("Low confidence or missing required fields".to_string()),
            updated_at_ms: now_ms(),
            ..prev.clone()
        };
    }

    StepResult {
        status: StepStatus::Verifying,
        observed_panel_id: out.panel_id.clone(),
        observed_port_label: out.port.value.clone(),
        observed_cable_tag: out.cable.value.clone(),
        confidence: Some(combined),
        guidance: Vec::new(),
        updated_at_ms: now_ms(),
        ..prev.clone()
    }
}

/// Apply the record-of-truth verdict: match means `Verified`, mismatch means
/// `Blocked` with the reason recorded and a note saying whether an approval
/// gate can unblock it.
pub fn apply_validation(
    def: &StepDefinition,
    prev: &StepResult,
    verdict: &ValidationResult,
) -> StepResult {
    if verdict.matched {
        return StepResult {
            status: StepStatus::Verified,
            record_match: Some(true),
            record_reason: Some(verdict.reason.clone()),
            updated_at_ms: now_ms(),
            ..prev.clone()
        };
    }
    let suffix = if def.approval_required() {
        " (approval required)"
    } else {
        ""
    };
    StepResult {
        status: StepStatus::Blocked,
        record_match: Some(false),
        record_reason: Some(verdict.reason.clone()),
        notes: Some(format!("Record mismatch: {}{}", verdict.reason, suffix)),
        updated_at_ms: now_ms(),
        ..prev.clone()
    }
}

/// Human override out of `Blocked`. Any other source state is an invariant
/// violation and a hard error.
pub fn approve_override(prev: &StepResult, approver: &str) -> Result<StepResult, StateError> {
    if prev.status != StepStatus::Blocked {
        return Err(StateError::InvalidTransition { from: prev.status });
    }
    Ok(StepResult {
        status: StepStatus::Overridden,
        approver: Some(approver.to_string()),
        notes: Some(format!("Override approved by {approver}")),
        updated_at_ms: now_ms(),
        ..prev.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ApprovalGate, EvidenceKind, EvidenceRequirement, FieldReading};

    fn verify_step(port: bool, cable: bool) -> StepDefinition {
        StepDefinition {
            step_id: "S1".into(),
            description: "verify the patched port".into(),
            step_type: Default::default(),
            evidence: Some(EvidenceRequirement { kind: EvidenceKind::Photo, count: 1 }),
            verify: Some(VerificationRequirement {
                requires_port_label: port,
                requires_cable_tag: cable,
                min_confidence: 0.75,
            }),
            approval: Some(ApprovalGate { required: true, on_blocked: true }),
        }
    }

    fn reading(value: Option<&str>, conf: f64) -> FieldReading {
        FieldReading { value: value.map(str::to_string), confidence: conf, guidance: vec![] }
    }

    fn extraction(port: FieldReading, cable: FieldReading) -> ExtractionOutput {
        ExtractionOutput {
            panel_id: Some("PANEL-A".into()),
            port,
            cable,
            raw_text: String::new(),
        }
    }

    #[test]
    fn start_without_evidence_requirement_never_awaits() {
        let mut def = verify_step(true, true);
        def.evidence = None;
        assert_eq!(start_step(&def), StepStatus::Verifying);
        def.evidence = Some(EvidenceRequirement { kind: EvidenceKind::Photo, count: 0 });
        assert_eq!(start_step(&def), StepStatus::Verifying);
    }

    #[test]
    fn start_with_evidence_requirement_awaits() {
        assert_eq!(start_step(&verify_step(true, true)), StepStatus::AwaitingEvidence);
    }

    #[test]
    fn evidence_upload_is_idempotent_by_id() {
        let initial = StepResult::new("CHG-001", "S1", StepStatus::AwaitingEvidence);
        let once = on_evidence_uploaded(&initial, "E1");
        let twice = on_evidence_uploaded(&once, "E1");
        assert_eq!(twice.status, StepStatus::Verifying);
        assert_eq!(twice.evidence_ids, vec!["E1".to_string()]);
        let third = on_evidence_uploaded(&twice, "E2");
        assert_eq!(third.evidence_ids, vec!["E1".to_string(), "E2".to_string()]);
    }

    #[test]
    fn low_confidence_on_both_fields_needs_retake_with_min_confidence() {
        let def = verify_step(true, true);
        let prev = StepResult::new("CHG-001", "S1", StepStatus::Verifying);
        let out = extraction(
            FieldReading { guidance: vec!["Tap to focus / hold steady".into()], ..reading(Some("24"), 0.5) },
            reading(Some("MDF-01-R12-P24"), 0.6),
        );
        let next = apply_extraction(&def, &prev, &out);
        assert_eq!(next.status, StepStatus::NeedsRetake);
        assert_eq!(next.confidence, Some(0.5));
        assert!(!next.guidance.is_empty());
    }

    #[test]
    fn retake_between_global_floor_and_step_minimum_still_carries_guidance() {
        let mut def = verify_step(true, true);
        def.verify.as_mut().unwrap().min_confidence = 0.9;
        let prev = StepResult::new("CHG-001", "S1", StepStatus::Verifying);
        // Above the 0.75 global floor, below the step's 0.9 minimum; per-field
        // guidance is empty in this band.
        let out = extraction(reading(Some("24"), 0.855), reading(Some("MDF-01-R12-P24"), 0.855));
        let next = apply_extraction(&def, &prev, &out);
        assert_eq!(next.status, StepStatus::NeedsRetake);
        assert_eq!(next.guidance, vec![crate::policy::TIP_MOVE_CLOSER.to_string()]);
    }

    #[test]
    fn confident_extraction_records_observed_fields_and_clears_guidance() {
        let def = verify_step(true, true);
        let mut prev = StepResult::new("CHG-001", "S1", StepStatus::NeedsRetake);
        prev.guidance = vec!["Increase lighting".into()];
        let out = extraction(reading(Some("24"), 0.95), reading(Some("MDF-01-R12-P24"), 0.96));
        let next = apply_extraction(&def, &prev, &out);
        assert_eq!(next.status, StepStatus::Verifying);
        assert_eq!(next.observed_port_label.as_deref(), Some("24"));
        assert_eq!(next.observed_cable_tag.as_deref(), Some("MDF-01-R12-P24"));
        assert_eq!(next.confidence, Some(0.95));
        assert!(next.guidance.is_empty());
    }

    #[test]
    fn single_required_field_uses_that_fields_confidence() {
        let def = verify_step(true, false);
        let prev = StepResult::new("CHG-001", "S1", StepStatus::Verifying);
        let out = extraction(reading(Some("7"), 0.88), reading(None, 0.3));
        let next = apply_extraction(&def, &prev, &out);
        assert_eq!(next.status, StepStatus::Verifying);
        assert_eq!(next.confidence, Some(0.88));
    }

    #[test]
    fn validation_match_yields_verified_regardless_of_prior_confidence() {
        let def = verify_step(true, true);
        let mut prev = StepResult::new("CHG-001", "S1", StepStatus::Verifying);
        prev.confidence = Some(0.2);
        let verdict = ValidationResult {
            matched: true,
            reason: "Observed matches expected.".into(),
            confidence: 0.99,
        };
        let next = apply_validation(&def, &prev, &verdict);
        assert_eq!(next.status, StepStatus::Verified);
        assert_eq!(next.record_match, Some(true));
    }

    #[test]
    fn validation_mismatch_yields_blocked_with_reason_in_notes() {
        let def = verify_step(true, true);
        let prev = StepResult::new("CHG-001", "S1", StepStatus::Verifying);
        let verdict = ValidationResult {
            matched: false,
            reason: "Expected (PANEL-A, 24, X) but got (PANEL-A, 99, X)".into(),
            confidence: 0.99,
        };
        let next = apply_validation(&def, &prev, &verdict);
        assert_eq!(next.status, StepStatus::Blocked);
        assert_eq!(next.record_match, Some(false));
        let notes = next.notes.unwrap();
        assert!(notes.contains("24") && notes.contains("99"));
        assert!(notes.contains("approval required"));
    }

    #[test]
    fn override_only_legal_from_blocked() {
        let mut blocked = StepResult::new("CHG-001", "S1", StepStatus::Blocked);
        blocked.observed_port_label = Some("99".into());
        blocked.confidence = Some(0.9);
        let next = approve_override(&blocked, "alice").unwrap();
        assert_eq!(next.status, StepStatus::Overridden);
        assert_eq!(next.approver.as_deref(), Some("alice"));
        assert_eq!(next.observed_port_label.as_deref(), Some("99"));
        assert_eq!(next.confidence, Some(0.9));

        let verifying = StepResult::new("CHG-001", "S1", StepStatus::Verifying);
        assert!(approve_override(&verifying, "alice").is_err());
    }

    #[test]
    fn quality_fail_moves_to_retake_and_keeps_reason_distinct() {
        let prev = StepResult::new("CHG-001", "S1", StepStatus::Verifying);
        let gate = QualityResult {
            pass: false,
            metrics: None,
            guidance: vec!["Upload a valid photo".into()],
            fail_reason: Some("undecodable image bytes".into()),
        };
        let next = apply_quality(&prev, &gate);
        assert_eq!(next.status, StepStatus::NeedsRetake);
        assert_eq!(next.quality_fail_reason.as_deref(), Some("undecodable image bytes"));
    }
}
