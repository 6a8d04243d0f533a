//! HTTP API handlers.
//!
//! Uploads and approvals are signals: they are acknowledged as soon as they
//! are durably stored, and the orchestrator consumes them on its own clock.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use base64::prelude::{Engine, BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use tracing::info;

use patchproof_core::{ProofPack, StepResult};

use crate::state::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub change_id: String,
    pub started: bool,
}

pub async fn start_change(
    State(state): State<Arc<AppState>>,
    Path(change_id): Path<String>,
) -> Result<Json<StartResponse>, ApiError> {
    state.start_run(&change_id)?;
    info!(%change_id, "change run started via api");
    Ok(Json(StartResponse { change_id, started: true }))
}

#[derive(Debug, Deserialize)]
pub struct EvidenceUploadRequest {
    #[serde(default)]
    pub content_type: Option<String>,
    /// Image bytes, base64 (standard alphabet, padded).
    pub data_base64: String,
}

#[derive(Debug, Serialize)]
pub struct EvidenceUploadResponse {
    pub evidence_id: String,
    pub sha256: String,
}

pub async fn upload_evidence(
    State(state): State<Arc<AppState>>,
    Path((change_id, step_id)): Path<(String, String)>,
    Json(req): Json<EvidenceUploadRequest>,
) -> Result<Json<EvidenceUploadResponse>, ApiError> {
    let handle = state
        .run_handle(&change_id)
        .ok_or_else(|| ApiError::not_found(format!("change {change_id} is not running")))?;

    let bytes = BASE64_STANDARD.decode(&req.data_base64).map_err(ApiError::bad_request)?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("empty evidence payload".into()));
    }
    if bytes.len() > state.config.max_upload_bytes {
        return Err(ApiError::BadRequest(format!(
            "evidence exceeds {} bytes",
            state.config.max_upload_bytes
        )));
    }

    let meta = state
        .collab
        .store_evidence(&change_id, &step_id, req.content_type.as_deref(), &bytes)
        .await
        .map_err(ApiError::internal)?;

    handle.hub.evidence_uploaded(&step_id, &meta.evidence_id);
    info!(%change_id, %step_id, evidence_id = %meta.evidence_id, size = bytes.len(), "evidence uploaded");

    Ok(Json(EvidenceUploadResponse { evidence_id: meta.evidence_id, sha256: meta.sha256 }))
}

#[derive(Debug, Deserialize)]
pub struct ApproveRequest {
    pub approver: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApproveResponse {
    pub accepted: bool,
}

pub async fn approve_step(
    State(state): State<Arc<AppState>>,
    Path((change_id, step_id)): Path<(String, String)>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<ApproveResponse>, ApiError> {
    if req.approver.trim().is_empty() {
        return Err(ApiError::BadRequest("approver must be non-empty".into()));
    }
    let handle = state
        .run_handle(&change_id)
        .ok_or_else(|| ApiError::not_found(format!("change {change_id} is not running")))?;

    handle.hub.approval_granted(&step_id, &req.approver);
    info!(%change_id, %step_id, approver = %req.approver, note = ?req.note, "approval recorded");
    Ok(Json(ApproveResponse { accepted: true }))
}

#[derive(Debug, Serialize)]
pub struct CurrentStepResponse {
    pub step: Option<StepResult>,
}

pub async fn current_step(
    State(state): State<Arc<AppState>>,
    Path(change_id): Path<String>,
) -> Result<Json<CurrentStepResponse>, ApiError> {
    let handle = state
        .run_handle(&change_id)
        .ok_or_else(|| ApiError::not_found(format!("change {change_id} is not running")))?;
    let step = handle.snapshot.borrow().clone();
    Ok(Json(CurrentStepResponse { step }))
}

pub async fn proofpack(
    State(state): State<Arc<AppState>>,
    Path(change_id): Path<String>,
) -> Result<Json<ProofPack>, ApiError> {
    state
        .collab
        .load_proofpack(&change_id)
        .await
        .map_err(ApiError::internal)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no proof pack for change {change_id}")))
}
