use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use patchproof_daemon::{api, config::DaemonConfig, live::LiveCollaborators, state::AppState};

#[derive(Debug, Parser)]
#[command(name = "patchproof-daemon", version, about = "Physical change verification daemon")]
struct Cli {
    /// Where the HTTP API will listen, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Root directory for proof packs, step logs and evidence files.
    #[arg(long, default_value = ".patchproof/data")]
    data_root: PathBuf,

    /// Root directory holding change plans, expected mappings and
    /// recognition fixtures.
    #[arg(long, default_value = "fixtures")]
    fixtures_root: PathBuf,

    /// Base URL of a remote advisor service for prompts and retake tips.
    #[arg(long)]
    advisor_url: Option<String>,

    /// Bound for one evidence wait, in seconds.
    #[arg(long, default_value_t = 3600)]
    evidence_wait_secs: u64,

    /// Bound for one approval wait, in seconds.
    #[arg(long, default_value_t = 24 * 3600)]
    approval_wait_secs: u64,

    /// Keep waiting for approval after the bound expires instead of leaving
    /// the step blocked.
    #[arg(long, default_value_t = false)]
    wait_on_approval_expiry: bool,

    /// Max evidence upload size in bytes, after base64 decoding.
    #[arg(long, default_value_t = 20 * 1024 * 1024)]
    max_upload_bytes: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = DaemonConfig {
        listen: cli.listen,
        data_root: cli.data_root,
        fixtures_root: cli.fixtures_root,
        advisor_url: cli.advisor_url,
        evidence_wait_secs: cli.evidence_wait_secs,
        approval_wait_secs: cli.approval_wait_secs,
        wait_on_approval_expiry: cli.wait_on_approval_expiry,
        max_upload_bytes: cli.max_upload_bytes,
    };
    info!("starting daemon with config: {:?}", config);

    tokio::fs::create_dir_all(&config.data_root).await?;
    let collab = LiveCollaborators::new(&config).await?;
    let state = AppState::new(config.clone(), collab);

    let app = Router::new()
        .route("/v1/changes/{change_id}/start", post(api::start_change))
        .route("/v1/changes/{change_id}/steps/{step_id}/evidence", post(api::upload_evidence))
        .route("/v1/changes/{change_id}/steps/{step_id}/approve", post(api::approve_step))
        .route("/v1/changes/{change_id}/steps/current", get(api::current_step))
        .route("/v1/changes/{change_id}/proofpack", get(api::proofpack))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = config.listen.parse()?;
    info!("listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
