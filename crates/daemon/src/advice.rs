//! Technician-facing wording: step prompts, retake tips and escalation
//! summaries.
//!
//! With an advisor URL configured these come from a remote service; without
//! one, deterministic local wording is produced from the step state. The
//! orchestrator treats every advice failure as recoverable, so the remote
//! path never needs its own retry logic.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use patchproof_core::{ChangeRequest, StepDefinition, StepResult};

#[derive(Debug, Clone)]
pub struct AdviceClient {
    remote: Option<Remote>,
}

#[derive(Debug, Clone)]
struct Remote {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct PromptRequest<'a> {
    change_id: &'a str,
    change_title: &'a str,
    step_id: &'a str,
    description: &'a str,
}

#[derive(Debug, Deserialize)]
struct PromptResponse {
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct RetakeResponse {
    #[serde(default)]
    tips: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EscalationResponse {
    summary: String,
}

impl AdviceClient {
    pub fn local() -> Self {
        Self { remote: None }
    }

    pub fn remote(base_url: &str) -> Self {
        Self {
            remote: Some(Remote {
                client: reqwest::Client::new(),
                base_url: base_url.trim_end_matches('/').to_string(),
            }),
        }
    }

    pub async fn step_prompt(&self, change: &ChangeRequest, step: &StepDefinition) -> Result<String> {
        let Some(remote) = &self.remote else {
            return Ok(format!("[{}] Next step: {}", change.title, step.description));
        };
        let resp: PromptResponse = remote
            .post(
                "/v1/advice/step-prompt",
                &PromptRequest {
                    change_id: &change.change_id,
                    change_title: &change.title,
                    step_id: &step.step_id,
                    description: &step.description,
                },
            )
            .await?;
        Ok(resp.prompt)
    }

    /// Local mode returns no tips: the state machine's own guidance is
    /// already technician-facing, and empty advice leaves it untouched.
    pub async fn retake_advice(&self, step: &StepResult) -> Result<Vec<String>> {
        let Some(remote) = &self.remote else {
            return Ok(Vec::new());
        };
        let resp: RetakeResponse = remote.post("/v1/advice/retake", step).await?;
        Ok(resp.tips)
    }

    pub async fn escalation_summary(&self, step: &StepResult) -> Result<String> {
        let Some(remote) = &self.remote else {
            let reason = step.record_reason.as_deref().unwrap_or("record mismatch");
            return Ok(format!(
                "Step {} observed ({}, {}, {}) and needs review: {}",
                step.step_id,
                step.observed_panel_id.as_deref().unwrap_or("?"),
                step.observed_port_label.as_deref().unwrap_or("?"),
                step.observed_cable_tag.as_deref().unwrap_or("?"),
                reason
            ));
        };
        let resp: EscalationResponse = remote.post("/v1/advice/escalation", step).await?;
        Ok(resp.summary)
    }
}

impl Remote {
    async fn post<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?
            .error_for_status()
            .with_context(|| format!("POST {url}"))?;
        resp.json().await.with_context(|| format!("decode response from {url}"))
    }
}
