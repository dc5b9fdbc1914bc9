//! # Admin HTTP
//!
//! - `GET /health`  liveness
//! - `GET /metrics` Prometheus text, reconciler and runtime metrics
//! - `GET /jobs`    every committed container with its instances

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use trigger_reconciler::{Provenance, TriggerContainerManager, TriggerReconciliationApi};

/// Build the admin router.
pub fn router(manager: Arc<TriggerContainerManager>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/jobs", get(jobs))
        .with_state(manager)
}

/// Serve `router` on `addr` until `shutdown` flips.
pub async fn serve(
    addr: SocketAddr,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Admin server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "trigger-runtime",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics() -> impl IntoResponse {
    match trigger_telemetry::encode_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn jobs(State(manager): State<Arc<TriggerContainerManager>>) -> impl IntoResponse {
    let ids = match manager.jobs() {
        Ok(ids) => ids,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    let mut body = Vec::with_capacity(ids.len());
    for job in ids {
        let container = match manager.container(&job) {
            Ok(Some(container)) => container,
            Ok(None) => continue,
            Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
        };
        let triggers: Vec<_> = container
            .instances()
            .iter()
            .map(|instance| {
                serde_json::json!({
                    "id": instance.id().to_string(),
                    "kind": instance.kind().as_str(),
                    "config": instance.spec().config(),
                    "state": instance.state().to_string(),
                    "provenance": match instance.provenance() {
                        Provenance::Managed => "managed",
                        Provenance::External => "external",
                    },
                })
            })
            .collect();
        body.push(serde_json::json!({ "job": job.as_str(), "triggers": triggers }));
    }
    body.sort_by(|a, b| a["job"].as_str().cmp(&b["job"].as_str()));

    Json(serde_json::Value::Array(body)).into_response()
}
