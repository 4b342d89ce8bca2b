//! Runtime: the scheduled loop plus the HTTP trigger surface
//!
//! ## Table of Contents
//! - **Sentinel**: Owns the orchestrator, the loop, and the HTTP server
//! - **Handlers**: Manual run trigger, alert reads/acks, order analysis
//!
//! The HTTP surface is a thin trigger layer over the orchestrator. It
//! exists for operators and integrations, not for dashboards: every
//! mutation it offers maps one-to-one onto an orchestrator or store
//! operation, with conflicts surfacing as 409 and unknown ids as 404.

use crate::error::{Result, SentinelError};
use crate::order::OrderId;
use crate::pipeline::Orchestrator;
use crate::config::SentinelConfig;
use crate::types::{AlertId, RunId};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

/// The assembled runtime
pub struct Sentinel {
    orchestrator: Arc<Orchestrator>,
    config: Arc<SentinelConfig>,
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for Sentinel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sentinel").finish_non_exhaustive()
    }
}

impl Sentinel {
    /// Wrap an orchestrator into a runtime
    pub fn new(orchestrator: Arc<Orchestrator>, config: Arc<SentinelConfig>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            orchestrator,
            config,
            shutdown_tx,
        }
    }

    /// The orchestrator, for embedding without the HTTP surface
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Execute a single pipeline run
    pub async fn run_once(&self) -> Result<crate::pipeline::RunReport> {
        self.orchestrator.run_once().await
    }

    /// Signal every loop and the HTTP server to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Run the scheduled loop and HTTP surface until shutdown
    pub async fn serve(&self) -> Result<()> {
        let loop_handle = tokio::spawn(
            self.orchestrator
                .clone()
                .run_scheduled(self.shutdown_tx.subscribe()),
        );

        let listener = tokio::net::TcpListener::bind(self.config.http_addr).await?;
        info!(addr = %self.config.http_addr, "Trigger surface listening");

        let mut shutdown = self.shutdown_tx.subscribe();
        axum::serve(listener, router(self.orchestrator.clone()))
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        loop_handle
            .await
            .map_err(|e| SentinelError::runtime(format!("scheduled loop panicked: {}", e)))?;
        info!("Runtime stopped");
        Ok(())
    }
}

/// Build the trigger-surface router
pub fn router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/runs", post(trigger_run))
        .route("/api/v1/runs/:id", get(run_status))
        .route("/api/v1/alerts", get(list_alerts))
        .route("/api/v1/alerts/:id/acknowledge", post(acknowledge_alert))
        .route("/api/v1/orders/:id/analyze", post(analyze_order))
        .with_state(orchestrator)
}

/// Error wrapper mapping domain failures to HTTP statuses
struct ApiError(SentinelError);

impl From<SentinelError> for ApiError {
    fn from(err: SentinelError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SentinelError::Conflict(_) => StatusCode::CONFLICT,
            SentinelError::DataIntegrity(_) => StatusCode::NOT_FOUND,
            SentinelError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn health(State(orchestrator): State<Arc<Orchestrator>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "store": orchestrator.store().name(),
    }))
}

async fn trigger_run(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    // Fire-and-poll: the run continues in the background and is polled
    // through GET /api/v1/runs/:id
    let run_id = orchestrator.spawn_run()?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "run_id": run_id, "status": "started" })),
    ))
}

async fn run_status(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let run_id = RunId::from_uuid(id);
    let entries = orchestrator.store().logs_for_run(run_id).await?;
    Ok(Json(json!({ "run_id": run_id, "log_entries": entries })))
}

async fn list_alerts(
    State(orchestrator): State<Arc<Orchestrator>>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let alerts = orchestrator.store().open_alerts().await?;
    Ok(Json(alerts))
}

async fn acknowledge_alert(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    orchestrator
        .store()
        .acknowledge_alert(AlertId::from_uuid(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn analyze_order(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> std::result::Result<impl IntoResponse, ApiError> {
    let order = orchestrator.trigger_order(OrderId::from_uuid(id)).await?;
    Ok(Json(order))
}
