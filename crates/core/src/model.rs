use crate::time::{now_ms, EpochMs};
use serde::{Deserialize, Serialize};

/// A globally unique identifier (ULID as string by convention).
pub type Id = String;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Check,
    Capture,
    PortVerify,
    CableVerify,
    #[default]
    Action,
    Approval,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    #[default]
    Photo,
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRequirement {
    #[serde(default)]
    pub kind: EvidenceKind,
    #[serde(default = "default_evidence_count")]
    pub count: u32,
}

fn default_evidence_count() -> u32 {
    1
}

/// Which extracted fields a step must produce before record validation runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequirement {
    #[serde(default)]
    pub requires_port_label: bool,
    #[serde(default)]
    pub requires_cable_tag: bool,
    /// Minimum acceptable per-field confidence in [0, 1].
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_min_confidence() -> f64 {
    crate::policy::DEFAULT_MIN_CONFIDENCE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalGate {
    #[serde(default)]
    pub required: bool,
    /// Whether a blocked result may be overridden (vs. halting the run).
    #[serde(default = "default_true")]
    pub on_blocked: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub step_id: Id,
    pub description: String,
    #[serde(default)]
    pub step_type: StepType,
    #[serde(default)]
    pub evidence: Option<EvidenceRequirement>,
    #[serde(default)]
    pub verify: Option<VerificationRequirement>,
    #[serde(default)]
    pub approval: Option<ApprovalGate>,
}

impl StepDefinition {
    /// True when a blocked result on this step can be escalated for override.
    pub fn approval_required(&self) -> bool {
        self.approval
            .as_ref()
            .is_some_and(|gate| gate.required && gate.on_blocked)
    }
}

/// An ordered plan of steps for one physical change. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub change_id: Id,
    pub title: String,
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    AwaitingEvidence,
    Verifying,
    Verified,
    NeedsRetake,
    Blocked,
    Overridden,
    Failed,
}

impl StepStatus {
    /// Terminal for completion accounting. `Blocked` counts as terminal here;
    /// leaving it again is only possible through an explicit override.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StepStatus::Verified | StepStatus::Overridden | StepStatus::Blocked | StepStatus::Failed
        )
    }
}

/// Audit record for one collaborator call made while processing a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub ok: bool,
    pub detail: String,
    pub at_ms: EpochMs,
}

/// Deterministic image-quality measurements for one evidence item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityMetrics {
    pub blur_score: f64,
    pub brightness: f64,
    pub glare_score: f64,
    pub width: u32,
    pub height: u32,
    pub is_too_blurry: bool,
    pub is_too_dark: bool,
    pub is_too_glary: bool,
    pub is_low_res: bool,
}

/// Full snapshot of one step's verification state.
///
/// Transitions replace the whole value; no field is mutated in place except
/// via the append-only helpers, so every persisted version is a complete,
/// independently inspectable snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub change_id: Id,
    pub step_id: Id,
    pub status: StepStatus,
    #[serde(default)]
    pub evidence_ids: Vec<String>,
    pub observed_panel_id: Option<String>,
    pub observed_port_label: Option<String>,
    pub observed_cable_tag: Option<String>,
    /// Combined confidence of the last extraction, min over required fields.
    pub confidence: Option<f64>,
    pub record_match: Option<bool>,
    pub record_reason: Option<String>,
    #[serde(default)]
    pub guidance: Vec<String>,
    pub notes: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    pub approver: Option<String>,
    pub quality: Option<QualityMetrics>,
    pub quality_fail_reason: Option<String>,
    pub created_at_ms: EpochMs,
    pub updated_at_ms: EpochMs,
}

impl StepResult {
    pub fn new(change_id: &str, step_id: &str, status: StepStatus) -> Self {
        let now = now_ms();
        Self {
            change_id: change_id.to_string(),
            step_id: step_id.to_string(),
            status,
            evidence_ids: Vec::new(),
            observed_panel_id: None,
            observed_port_label: None,
            observed_cable_tag: None,
            confidence: None,
            record_match: None,
            record_reason: None,
            guidance: Vec::new(),
            notes: None,
            tool_calls: Vec::new(),
            approver: None,
            quality: None,
            quality_fail_reason: None,
            created_at_ms: now,
            updated_at_ms: now,
        }
    }

    /// Append an audit record for a collaborator call.
    pub fn with_tool_call(mut self, tool: &str, ok: bool, detail: impl Into<String>) -> Self {
        self.tool_calls.push(ToolCallRecord {
            tool: tool.to_string(),
            ok,
            detail: detail.into(),
            at_ms: now_ms(),
        });
        self.updated_at_ms = now_ms();
        self
    }

    pub fn last_evidence_id(&self) -> Option<&str> {
        self.evidence_ids.last().map(String::as_str)
    }
}

/// Quality-gate verdict for one evidence item.
///
/// `metrics` is `None` only when the bytes could not be decoded at all;
/// that case carries its own `fail_reason` and is never conflated with a
/// too-dark or too-blurry image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityResult {
    pub pass: bool,
    pub metrics: Option<QualityMetrics>,
    #[serde(default)]
    pub guidance: Vec<String>,
    pub fail_reason: Option<String>,
}

/// One extracted field: normalized value (if any) and its final confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldReading {
    pub value: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub guidance: Vec<String>,
}

impl FieldReading {
    pub fn absent(confidence: f64) -> Self {
        Self { value: None, confidence, guidance: Vec::new() }
    }
}

/// Combined extractor output, shared by the mock and live code paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionOutput {
    pub panel_id: Option<String>,
    pub port: FieldReading,
    pub cable: FieldReading,
    pub raw_text: String,
}

/// Record-of-truth verdict. Exact-match, not probabilistic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub matched: bool,
    pub reason: String,
    pub confidence: f64,
}
