//! Wire-format tests for the documents the daemon reads and writes.

use patchproof_core::{
    update_proofpack, ChangeRequest, ProofPack, StepResult, StepStatus,
};

#[test]
fn change_definition_parses_with_defaults_filled_in() {
    let json = r#"{
        "change_id": "CHG-001",
        "title": "Move uplink from port 12 to port 24",
        "steps": [
            { "step_id": "S1", "description": "Power down the spare uplink" },
            {
                "step_id": "S2",
                "description": "Patch and photograph",
                "step_type": "port_verify",
                "evidence": { "kind": "photo" },
                "verify": { "requires_port_label": true, "requires_cable_tag": true },
                "approval": { "required": true }
            }
        ]
    }"#;

    let change: ChangeRequest = serde_json::from_str(json).unwrap();
    assert_eq!(change.steps.len(), 2);

    let action = &change.steps[0];
    assert!(action.evidence.is_none());
    assert!(action.verify.is_none());
    assert!(!action.approval_required());

    let verify = &change.steps[1];
    assert_eq!(verify.evidence.as_ref().unwrap().count, 1);
    let req = verify.verify.as_ref().unwrap();
    assert!((req.min_confidence - 0.75).abs() < 1e-9);
    assert!(verify.approval_required());
}

#[test]
fn step_status_uses_snake_case_on_the_wire() {
    let step = StepResult::new("CHG-001", "S1", StepStatus::AwaitingEvidence);
    let json = serde_json::to_string(&step).unwrap();
    assert!(json.contains(r#""status":"awaiting_evidence""#));

    let back: StepResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.status, StepStatus::AwaitingEvidence);
}

#[test]
fn proofpack_survives_serialization_with_summary_intact() {
    let verified = StepResult::new("CHG-001", "S1", StepStatus::Verified);
    let pack = update_proofpack(None, "CHG-001", &verified, None);

    let json = serde_json::to_string_pretty(&pack).unwrap();
    let back: ProofPack = serde_json::from_str(&json).unwrap();
    assert_eq!(back.summary.verified_steps, 1);
    assert_eq!(back.summary.total_steps, 1);
    assert!(back.completed_at_ms.is_some());
}

#[test]
fn step_result_tolerates_missing_optional_collections() {
    let json = r#"{
        "change_id": "CHG-001",
        "step_id": "S1",
        "status": "pending",
        "observed_panel_id": null,
        "observed_port_label": null,
        "observed_cable_tag": null,
        "confidence": null,
        "record_match": null,
        "record_reason": null,
        "notes": null,
        "approver": null,
        "quality": null,
        "quality_fail_reason": null,
        "created_at_ms": 1700000000000,
        "updated_at_ms": 1700000000000
    }"#;
    let step: StepResult = serde_json::from_str(json).unwrap();
    assert!(step.evidence_ids.is_empty());
    assert!(step.guidance.is_empty());
    assert!(step.tool_calls.is_empty());
}
