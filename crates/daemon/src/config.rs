use std::path::PathBuf;

use tokio::time::Duration;

use patchproof_engine::{ApprovalExpiry, OrchestratorConfig};

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub listen: String,

    /// Root for everything the daemon writes: proof packs, step logs,
    /// evidence files, escalation tickets.
    pub data_root: PathBuf,

    /// Root for read-only fixtures: change plans, expected mappings and
    /// recognition outputs.
    pub fixtures_root: PathBuf,

    /// Optional remote advisor base URL. Unset means local advice only.
    pub advisor_url: Option<String>,

    pub evidence_wait_secs: u64,
    pub approval_wait_secs: u64,

    /// When true, an expired approval wait re-waits instead of leaving the
    /// step blocked.
    pub wait_on_approval_expiry: bool,

    /// Max evidence upload size after base64 decoding.
    pub max_upload_bytes: usize,
}

impl DaemonConfig {
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            evidence_wait: Duration::from_secs(self.evidence_wait_secs),
            approval_wait: Duration::from_secs(self.approval_wait_secs),
            approval_expiry: if self.wait_on_approval_expiry {
                ApprovalExpiry::Wait
            } else {
                ApprovalExpiry::Deny
            },
        }
    }
}
