//! JSON HTTP surface over the polling controller.
//!
//! Localhost-only and unauthenticated, like the device it fronts.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

use crate::controller::{ControllerStatus, PollingController, TriggerOutcome, TriggerReason};
use crate::feed::FeedClient;

type Shared<C> = State<Arc<PollingController<C>>>;

async fn snapshot<C: FeedClient>(State(controller): Shared<C>) -> Response {
    match controller.latest() {
        Some(snapshot) => Json(snapshot.as_ref()).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "no snapshot published yet"})),
        )
            .into_response(),
    }
}

async fn controller_status<C: FeedClient>(State(controller): Shared<C>) -> Json<ControllerStatus> {
    Json(controller.status())
}

async fn refresh<C: FeedClient>(State(controller): Shared<C>) -> Response {
    outcome_response(controller.trigger(TriggerReason::UserRefresh).await)
}

async fn run<C: FeedClient>(State(controller): Shared<C>) -> Response {
    outcome_response(controller.trigger(TriggerReason::UserRun).await)
}

fn outcome_response(outcome: TriggerOutcome) -> Response {
    let status = match outcome {
        TriggerOutcome::Dropped => StatusCode::CONFLICT,
        TriggerOutcome::Completed | TriggerOutcome::Failed(_) => StatusCode::OK,
    };
    (status, Json(outcome)).into_response()
}

/// Build the `/api` router.
pub fn router<C: FeedClient>(controller: Arc<PollingController<C>>) -> Router {
    Router::new()
        .route("/api/snapshot", get(snapshot::<C>))
        .route("/api/controller", get(controller_status::<C>))
        .route("/api/refresh", post(refresh::<C>))
        .route("/api/run", post(run::<C>))
        .with_state(controller)
}

/// Serve until `shutdown` fires.
pub async fn serve<C: FeedClient>(
    controller: Arc<PollingController<C>>,
    addr: SocketAddr,
    mut shutdown: watch::Receiver<()>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("[HTTP] listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(controller))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;

    log::info!("[HTTP] server shut down gracefully");
    Ok(())
}
