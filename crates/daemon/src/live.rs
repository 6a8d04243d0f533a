//! Live collaborator bundle: wires the vision pipeline, fixture library and
//! file stores into the engine's collaborator seam.

use anyhow::Result;

use patchproof_core::policy::TIP_VALID_PHOTO;
use patchproof_core::{
    ChangeRequest, EvidenceRef, ExpectedMapping, ExtractionOutput, FieldReading, ProofPack,
    QualityResult, StepDefinition, StepResult, update_proofpack,
};
use patchproof_engine::{Collaborators, EngineError};
use patchproof_vision::{
    evaluate_gate, extract_identifiers, MockOcrBackend, QualityThresholds, VisionError,
};

use crate::advice::AdviceClient;
use crate::config::DaemonConfig;
use crate::stores::{EscalationLog, EvidenceMeta, EvidenceStore, FixtureLibrary, ProofStore};

pub struct LiveCollaborators {
    fixtures: FixtureLibrary,
    evidence: EvidenceStore,
    proofs: ProofStore,
    escalations: EscalationLog,
    ocr: MockOcrBackend,
    thresholds: QualityThresholds,
    advice: AdviceClient,
}

impl LiveCollaborators {
    pub async fn new(config: &DaemonConfig) -> Result<Self> {
        let fixtures = FixtureLibrary::new(&config.fixtures_root);
        let ocr = fixtures.load_ocr_backend().await?;
        let advice = match &config.advisor_url {
            Some(url) => AdviceClient::remote(url),
            None => AdviceClient::local(),
        };
        Ok(Self {
            fixtures,
            evidence: EvidenceStore::new(&config.data_root),
            proofs: ProofStore::new(&config.data_root),
            escalations: EscalationLog::new(&config.data_root),
            ocr,
            thresholds: QualityThresholds::default(),
            advice,
        })
    }

    /// Store uploaded evidence bytes; used by the API layer before it
    /// signals the orchestrator.
    pub async fn store_evidence(
        &self,
        change_id: &str,
        step_id: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<EvidenceMeta> {
        self.evidence.put(change_id, step_id, content_type, bytes).await
    }

    pub async fn load_proofpack(&self, change_id: &str) -> Result<Option<ProofPack>> {
        self.proofs.load(change_id).await
    }
}

fn storage(err: anyhow::Error) -> EngineError {
    EngineError::Storage(format!("{err:#}"))
}

fn undecodable_gate() -> QualityResult {
    QualityResult {
        pass: false,
        metrics: None,
        guidance: vec![TIP_VALID_PHOTO.to_string()],
        fail_reason: Some("undecodable image bytes".to_string()),
    }
}

/// Extraction output for bytes the decoder rejects: both fields absent with
/// zero confidence, which drives a retake instead of an engine failure.
fn undecodable_extraction() -> ExtractionOutput {
    let reading = FieldReading {
        value: None,
        confidence: 0.0,
        guidance: vec![TIP_VALID_PHOTO.to_string()],
    };
    ExtractionOutput { panel_id: None, port: reading.clone(), cable: reading, raw_text: String::new() }
}

impl Collaborators for LiveCollaborators {
    async fn load_change(&self, change_id: &str) -> Result<ChangeRequest, EngineError> {
        self.fixtures
            .load_change(change_id)
            .await
            .map_err(storage)?
            .ok_or_else(|| EngineError::NotFound(format!("change {change_id}")))
    }

    async fn quality_gate(
        &self,
        _change_id: &str,
        _step_id: &str,
        evidence_id: &str,
    ) -> Result<QualityResult, EngineError> {
        let bytes = self.evidence.read_bytes(evidence_id).await.map_err(storage)?;
        match evaluate_gate(&bytes, &self.thresholds) {
            Ok(result) => Ok(result),
            Err(VisionError::Decode(_)) => Ok(undecodable_gate()),
        }
    }

    async fn extract(
        &self,
        _change_id: &str,
        _step_id: &str,
        evidence_id: &str,
    ) -> Result<ExtractionOutput, EngineError> {
        let bytes = self.evidence.read_bytes(evidence_id).await.map_err(storage)?;
        match extract_identifiers(&bytes, &self.ocr, Some(evidence_id), None, &self.thresholds) {
            Ok(out) => Ok(out),
            Err(VisionError::Decode(_)) => Ok(undecodable_extraction()),
        }
    }

    async fn expected_mapping(
        &self,
        change_id: &str,
        _step_id: &str,
    ) -> Result<ExpectedMapping, EngineError> {
        self.fixtures.load_mapping(change_id).await.map_err(storage)
    }

    async fn step_prompt(
        &self,
        change: &ChangeRequest,
        step: &StepDefinition,
    ) -> Result<String, EngineError> {
        self.advice
            .step_prompt(change, step)
            .await
            .map_err(|e| EngineError::Unavailable(format!("{e:#}")))
    }

    async fn retake_advice(&self, step: &StepResult) -> Result<Vec<String>, EngineError> {
        self.advice
            .retake_advice(step)
            .await
            .map_err(|e| EngineError::Unavailable(format!("{e:#}")))
    }

    async fn escalation_advice(&self, step: &StepResult) -> Result<String, EngineError> {
        self.advice
            .escalation_summary(step)
            .await
            .map_err(|e| EngineError::Unavailable(format!("{e:#}")))
    }

    async fn request_approval(
        &self,
        change_id: &str,
        step_id: &str,
        reason: &str,
    ) -> Result<String, EngineError> {
        self.escalations.open_request(change_id, step_id, reason).await.map_err(storage)
    }

    async fn persist(
        &self,
        change_id: &str,
        step: &StepResult,
        evidence_id: Option<&str>,
    ) -> Result<(), EngineError> {
        let evidence_ref = match evidence_id {
            Some(id) => {
                let meta = self.evidence.read_meta(id).await.map_err(storage)?;
                Some(EvidenceRef {
                    evidence_id: meta.evidence_id.clone(),
                    locator: Some(self.evidence.locator(&meta.evidence_id)),
                    sha256: Some(meta.sha256),
                    captured_at_ms: Some(meta.captured_at_ms),
                })
            }
            None => None,
        };
        let existing = self.proofs.load(change_id).await.map_err(storage)?;
        let pack = update_proofpack(existing.as_ref(), change_id, step, evidence_ref.as_ref());
        self.proofs.save(&pack).await.map_err(storage)?;
        self.proofs.append_step_log(change_id, step).await.map_err(storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchproof_core::StepStatus;
    use std::path::Path;

    async fn collaborators(dir: &Path) -> LiveCollaborators {
        let config = DaemonConfig {
            listen: "127.0.0.1:0".into(),
            data_root: dir.join("data"),
            fixtures_root: dir.join("fixtures"),
            advisor_url: None,
            evidence_wait_secs: 60,
            approval_wait_secs: 60,
            wait_on_approval_expiry: false,
            max_upload_bytes: 1024 * 1024,
        };
        LiveCollaborators::new(&config).await.unwrap()
    }

    #[tokio::test]
    async fn missing_change_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let live = collaborators(dir.path()).await;
        let err = live.load_change("CHG-404").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn undecodable_evidence_fails_the_gate_instead_of_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let live = collaborators(dir.path()).await;
        let meta = live.store_evidence("CHG-001", "S1", None, b"not an image").await.unwrap();

        let gate = live.quality_gate("CHG-001", "S1", &meta.evidence_id).await.unwrap();
        assert!(!gate.pass);
        assert!(gate.metrics.is_none());
        assert_eq!(gate.fail_reason.as_deref(), Some("undecodable image bytes"));

        let out = live.extract("CHG-001", "S1", &meta.evidence_id).await.unwrap();
        assert!(out.port.value.is_none());
        assert_eq!(out.port.confidence, 0.0);
    }

    #[tokio::test]
    async fn persist_folds_the_step_and_evidence_into_the_pack() {
        let dir = tempfile::tempdir().unwrap();
        let live = collaborators(dir.path()).await;
        let meta = live.store_evidence("CHG-001", "S1", Some("image/png"), b"x").await.unwrap();

        let mut step = StepResult::new("CHG-001", "S1", StepStatus::Verified);
        step.evidence_ids.push(meta.evidence_id.clone());
        live.persist("CHG-001", &step, Some(&meta.evidence_id)).await.unwrap();

        let pack = live.load_proofpack("CHG-001").await.unwrap().unwrap();
        assert_eq!(pack.steps.len(), 1);
        assert_eq!(pack.evidence_index.len(), 1);
        assert_eq!(pack.evidence_index[0].sha256.as_deref(), Some(meta.sha256.as_str()));
        assert_eq!(pack.summary.verified_steps, 1);
    }
}
