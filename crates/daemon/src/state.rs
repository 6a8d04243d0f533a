use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::IntoResponse;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info};

use patchproof_core::StepResult;
use patchproof_engine::{Orchestrator, SignalHub};

use crate::config::DaemonConfig;
use crate::live::LiveCollaborators;

/// Per-change run context: the signal hub the API writes to and the live
/// step snapshot the API reads from.
#[derive(Clone)]
pub struct RunHandle {
    pub hub: Arc<SignalHub>,
    pub snapshot: watch::Receiver<Option<StepResult>>,
}

pub struct AppState {
    pub config: DaemonConfig,
    pub collab: Arc<LiveCollaborators>,
    runs: Mutex<HashMap<String, RunHandle>>,
}

impl AppState {
    pub fn new(config: DaemonConfig, collab: LiveCollaborators) -> Arc<Self> {
        Arc::new(Self { config, collab: Arc::new(collab), runs: Mutex::new(HashMap::new()) })
    }

    pub fn run_handle(&self, change_id: &str) -> Option<RunHandle> {
        self.runs.lock().expect("runs lock").get(change_id).cloned()
    }

    /// Start orchestrating a change in the background. A change runs at most
    /// once per daemon lifetime; a second start is a conflict.
    pub fn start_run(&self, change_id: &str) -> Result<(), ApiError> {
        let mut runs = self.runs.lock().expect("runs lock");
        if runs.contains_key(change_id) {
            return Err(ApiError::Conflict(format!("change {change_id} already started")));
        }

        let hub = Arc::new(SignalHub::new());
        let orchestrator =
            Orchestrator::new(self.collab.clone(), hub.clone(), self.config.orchestrator());
        let snapshot = orchestrator.subscribe();

        let id = change_id.to_string();
        tokio::spawn(async move {
            match orchestrator.run(&id).await {
                Ok(report) => {
                    info!(change_id = %id, outcome = ?report.outcome, "change run finished")
                }
                Err(e) => error!(change_id = %id, err = %e, "change run failed"),
            }
        });

        runs.insert(change_id.to_string(), RunHandle { hub, snapshot });
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request<E: std::fmt::Display>(e: E) -> Self {
        Self::BadRequest(e.to_string())
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (code, msg) = match self {
            ApiError::BadRequest(m) => (axum::http::StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (axum::http::StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (axum::http::StatusCode::CONFLICT, m),
            ApiError::Internal(m) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (code, msg).into_response()
    }
}
