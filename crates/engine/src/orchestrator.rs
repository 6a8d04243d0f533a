//! Drives one change's steps through the verification state machine.
//!
//! Each step runs to a terminal status before the next starts. The run
//! blocks on external signals (evidence uploads, approvals) delivered
//! through a [`SignalHub`], persists every state transition through the
//! collaborator bundle, and publishes the live step snapshot on a watch
//! channel for the API layer.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use patchproof_core::policy::dedup_guidance;
use patchproof_core::{
    apply_extraction, apply_quality, apply_validation, approve_override, now_ms,
    on_evidence_uploaded, start_step, validate_observed, ChangeRequest, Endpoint, StepDefinition,
    StepResult, StepStatus,
};

use crate::collaborators::Collaborators;
use crate::error::EngineError;
use crate::signals::SignalHub;

/// What to do when a blocked step's approval wait expires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApprovalExpiry {
    /// Keep waiting indefinitely, one bounded wait at a time.
    Wait,
    /// Leave the step blocked and halt the run.
    #[default]
    Deny,
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bound for one evidence wait; expiry logs and re-waits.
    pub evidence_wait: Duration,
    /// Bound for one approval wait; expiry behavior is `approval_expiry`.
    pub approval_wait: Duration,
    pub approval_expiry: ApprovalExpiry,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            evidence_wait: Duration::from_secs(60 * 60),
            approval_wait: Duration::from_secs(24 * 60 * 60),
            approval_expiry: ApprovalExpiry::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Every step ended `Verified` or `Overridden`.
    Verified,
    /// A step ended `Blocked` or `Failed`; later steps never ran.
    Blocked,
}

/// Final report for one change run.
#[derive(Debug, Clone)]
pub struct ChangeRunReport {
    pub change_id: String,
    pub outcome: ChangeOutcome,
    pub steps: Vec<StepResult>,
}

pub struct Orchestrator<C: Collaborators> {
    collab: Arc<C>,
    signals: Arc<SignalHub>,
    config: OrchestratorConfig,
    snapshot: watch::Sender<Option<StepResult>>,
}

impl<C: Collaborators> Orchestrator<C> {
    pub fn new(collab: Arc<C>, signals: Arc<SignalHub>, config: OrchestratorConfig) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self { collab, signals, config, snapshot }
    }

    /// Live view of the step currently being processed.
    pub fn subscribe(&self) -> watch::Receiver<Option<StepResult>> {
        self.snapshot.subscribe()
    }

    /// Run a change to completion. Returns once every step is terminal or a
    /// step ends blocked.
    pub async fn run(&self, change_id: &str) -> Result<ChangeRunReport, EngineError> {
        let change = self.collab.load_change(change_id).await?;
        info!(change_id, steps = change.steps.len(), "change run started");

        let mut steps = Vec::with_capacity(change.steps.len());
        let mut outcome = ChangeOutcome::Verified;
        for def in &change.steps {
            let result = self.run_step(&change, def).await?;
            let halted = matches!(result.status, StepStatus::Blocked | StepStatus::Failed);
            steps.push(result);
            if halted {
                warn!(change_id, step_id = %def.step_id, "run halted on blocked step");
                outcome = ChangeOutcome::Blocked;
                break;
            }
        }

        info!(change_id, ?outcome, "change run finished");
        Ok(ChangeRunReport { change_id: change_id.to_string(), outcome, steps })
    }

    async fn run_step(
        &self,
        change: &ChangeRequest,
        def: &StepDefinition,
    ) -> Result<StepResult, EngineError> {
        let change_id = change.change_id.as_str();
        let step_id = def.step_id.as_str();
        info!(change_id, step_id, "step started");

        let mut result = StepResult::new(change_id, step_id, start_step(def));
        result = self.prompt_step(change, def, result).await;
        self.checkpoint(change_id, &result, None).await?;

        if result.status == StepStatus::AwaitingEvidence {
            let evidence_id = self.await_evidence(step_id).await;
            result = on_evidence_uploaded(&result, &evidence_id);
            self.checkpoint(change_id, &result, Some(&evidence_id)).await?;
        }

        if def.verify.is_none() {
            result = complete_action_step(result);
            let evidence_id = result.last_evidence_id().map(str::to_string);
            self.checkpoint(change_id, &result, evidence_id.as_deref()).await?;
            return Ok(result);
        }

        let mut evidence_id = result
            .last_evidence_id()
            .map(str::to_string)
            .ok_or_else(|| {
                EngineError::Invariant(format!("verification step {step_id} has no evidence"))
            })?;

        // Quality gate, with retakes until the image passes.
        loop {
            let gate = self.collab.quality_gate(change_id, step_id, &evidence_id).await?;
            let pass = gate.pass;
            let detail = gate
                .fail_reason
                .clone()
                .unwrap_or_else(|| if pass { "pass".into() } else { "fail".into() });
            result = apply_quality(&result, &gate).with_tool_call("quality_gate", pass, detail);
            self.checkpoint(change_id, &result, Some(&evidence_id)).await?;
            if pass {
                break;
            }
            debug!(change_id, step_id, %evidence_id, "quality gate failed, waiting for retake");
            evidence_id = self.await_evidence(step_id).await;
            result = on_evidence_uploaded(&result, &evidence_id);
            self.checkpoint(change_id, &result, Some(&evidence_id)).await?;
        }

        // Extraction, with retakes until the required fields read out with
        // enough confidence. Retake images skip the quality gate: a fresh
        // image that still reads poorly fails here anyway.
        loop {
            let out = self.collab.extract(change_id, step_id, &evidence_id).await?;
            result = apply_extraction(def, &result, &out).with_tool_call(
                "extract",
                true,
                format!("raw: {}", out.raw_text),
            );
            if result.status != StepStatus::NeedsRetake {
                self.checkpoint(change_id, &result, Some(&evidence_id)).await?;
                break;
            }
            result = self.refine_retake_guidance(result).await;
            self.checkpoint(change_id, &result, Some(&evidence_id)).await?;
            debug!(change_id, step_id, "extraction below threshold, waiting for retake");
            evidence_id = self.await_evidence(step_id).await;
            result = on_evidence_uploaded(&result, &evidence_id);
            self.checkpoint(change_id, &result, Some(&evidence_id)).await?;
        }

        // Record-of-truth validation.
        let mapping = self.collab.expected_mapping(change_id, step_id).await?;
        let observed = Endpoint {
            panel_id: result.observed_panel_id.clone().unwrap_or_default(),
            port_label: result.observed_port_label.clone().unwrap_or_default(),
            cable_tag: result.observed_cable_tag.clone().unwrap_or_default(),
        };
        let verdict = validate_observed(&mapping, &observed);
        result = apply_validation(def, &result, &verdict).with_tool_call(
            "validate_record",
            verdict.matched,
            verdict.reason.clone(),
        );
        self.checkpoint(change_id, &result, Some(&evidence_id)).await?;

        if result.status == StepStatus::Blocked && def.approval_required() {
            result = self.escalate(change_id, def, result, &evidence_id).await?;
        }

        info!(change_id, step_id, status = ?result.status, "step finished");
        Ok(result)
    }

    /// Escalate a blocked step for human override and wait for the decision.
    async fn escalate(
        &self,
        change_id: &str,
        def: &StepDefinition,
        mut result: StepResult,
        evidence_id: &str,
    ) -> Result<StepResult, EngineError> {
        let step_id = def.step_id.as_str();

        let reason = match self.collab.escalation_advice(&result).await {
            Ok(summary) => {
                result = result.with_tool_call("escalation_advice", true, summary.clone());
                summary
            }
            Err(err) => {
                warn!(change_id, step_id, %err, "escalation advice failed, using local summary");
                let fallback = result
                    .record_reason
                    .clone()
                    .unwrap_or_else(|| "Record mismatch".to_string());
                result = result.with_tool_call("escalation_advice", false, err.to_string());
                fallback
            }
        };

        let request_id = self.collab.request_approval(change_id, step_id, &reason).await?;
        result = result.with_tool_call("request_approval", true, request_id);
        self.checkpoint(change_id, &result, Some(evidence_id)).await?;

        loop {
            match self.signals.wait_approval(step_id, self.config.approval_wait).await {
                Some(approver) => {
                    result = approve_override(&result, &approver)?;
                    self.checkpoint(change_id, &result, Some(evidence_id)).await?;
                    return Ok(result);
                }
                None => match self.config.approval_expiry {
                    ApprovalExpiry::Wait => {
                        debug!(change_id, step_id, "approval wait expired, re-waiting");
                    }
                    ApprovalExpiry::Deny => {
                        warn!(change_id, step_id, "approval wait expired, step stays blocked");
                        return Ok(result);
                    }
                },
            }
        }
    }

    /// Ask for a technician prompt; fall back to the step description when
    /// the advisor is unreachable.
    async fn prompt_step(
        &self,
        change: &ChangeRequest,
        def: &StepDefinition,
        result: StepResult,
    ) -> StepResult {
        match self.collab.step_prompt(change, def).await {
            Ok(prompt) => result.with_tool_call("step_prompt", true, prompt),
            Err(err) => {
                debug!(step_id = %def.step_id, %err, "step prompt failed, using description");
                result
                    .with_tool_call("step_prompt", false, err.to_string())
                    .with_tool_call("step_prompt_fallback", true, def.description.clone())
            }
        }
    }

    /// Replace locally computed guidance with advisor guidance when the
    /// advisor has anything better to say.
    async fn refine_retake_guidance(&self, mut result: StepResult) -> StepResult {
        match self.collab.retake_advice(&result).await {
            Ok(tips) if !tips.is_empty() => {
                result.guidance = dedup_guidance(tips.into_iter());
                result.updated_at_ms = now_ms();
                result.with_tool_call("retake_advice", true, "advisor guidance applied")
            }
            Ok(_) => result,
            Err(err) => {
                debug!(%err, "retake advice failed, keeping local guidance");
                result.with_tool_call("retake_advice", false, err.to_string())
            }
        }
    }

    /// One bounded evidence wait at a time, forever. Evidence has no deny
    /// policy; a change waits as long as the field work takes.
    async fn await_evidence(&self, step_id: &str) -> String {
        loop {
            match self.signals.wait_evidence(step_id, self.config.evidence_wait).await {
                Some(evidence_id) => return evidence_id,
                None => debug!(step_id, "evidence wait expired, re-waiting"),
            }
        }
    }

    /// Persist a snapshot and publish it to watchers.
    async fn checkpoint(
        &self,
        change_id: &str,
        result: &StepResult,
        evidence_id: Option<&str>,
    ) -> Result<(), EngineError> {
        self.collab.persist(change_id, result, evidence_id).await?;
        self.snapshot.send_replace(Some(result.clone()));
        Ok(())
    }
}

fn complete_action_step(prev: StepResult) -> StepResult {
    StepResult {
        status: StepStatus::Verified,
        notes: Some("Non-verification step completed".to_string()),
        updated_at_ms: now_ms(),
        ..prev
    }
}
