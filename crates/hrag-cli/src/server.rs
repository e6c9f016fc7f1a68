//! HTTP front end: `POST /query` and `GET /health`

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use hrag_core::{Error, QueryError, QueryRequest, RAGEngine, Result};

use crate::session::error_json;

/// Shared handler state. The engine lives for the whole process.
#[derive(Clone)]
pub struct ServerState {
    engine: Arc<dyn RAGEngine>,
}

/// Build the router around an engine.
pub fn create_router(engine: Arc<dyn RAGEngine>) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/health", get(health_handler))
        .with_state(ServerState { engine })
}

/// HTTP status for a failed query.
pub fn status_for(error: &QueryError) -> StatusCode {
    match error {
        QueryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        QueryError::Retrieval(Error::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        QueryError::Retrieval(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: &QueryError) -> Response {
    (status_for(error), Json(error_json(error))).into_response()
}

async fn query_handler(
    State(state): State<ServerState>,
    payload: std::result::Result<Json<QueryRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "rejected request body");
            return error_response(&QueryError::InvalidInput(format!(
                "malformed request: {}",
                rejection.body_text()
            )));
        }
    };

    match state.engine.query(&request).await {
        Ok(outcome) => {
            for degradation in &outcome.degradations {
                debug!(?degradation, "query degraded");
            }
            (StatusCode::OK, Json(outcome.response)).into_response()
        }
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "query failed");
            error_response(&e)
        }
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(engine: Arc<dyn RAGEngine>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, create_router(engine))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
