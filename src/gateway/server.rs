//! Axum HTTP server for the gateway.
//!
//! Handles the chat endpoint, simulator control, and health.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, header},
    routing::{get, post},
};
use tokio::sync::oneshot;
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::coach::Coach;
use crate::db::Database;
use crate::error::{DatabaseError, Error, GatewayError};
use crate::gateway::handlers::chat::chat_send_handler;
use crate::gateway::handlers::personas::{
    clone_user_handler, personas_list_handler, personas_seed_handler,
};
use crate::gateway::handlers::runs::{
    runs_create_handler, runs_detail_handler, runs_end_handler, runs_evaluate_handler,
    runs_list_handler, runs_start_handler, runs_stop_handler, runs_turn_handler,
};
use crate::gateway::types::HealthResponse;
use crate::llm::CompletionProvider;
use crate::sim::Simulator;

/// Shared state for all gateway handlers.
pub struct GatewayState {
    /// Datastore for reads the handlers do themselves.
    pub db: Arc<dyn Database>,
    /// Production coach for the chat endpoint.
    pub coach: Coach,
    /// Run lifecycle service.
    pub simulator: Simulator,
    /// Server startup time for uptime reporting.
    pub startup_time: std::time::Instant,
    /// Shutdown signal sender.
    pub shutdown_tx: tokio::sync::RwLock<Option<oneshot::Sender<()>>>,
}

impl GatewayState {
    pub fn new(db: Arc<dyn Database>, llm: Arc<dyn CompletionProvider>) -> Self {
        Self {
            coach: Coach::new(llm.clone()),
            simulator: Simulator::new(db.clone(), llm),
            db,
            startup_time: std::time::Instant::now(),
            shutdown_tx: tokio::sync::RwLock::new(None),
        }
    }

    /// Trigger graceful shutdown of the server, if it is running.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.write().await.take() {
            let _ = tx.send(());
        }
    }
}

/// Map a service error onto an HTTP status code and message.
///
/// Missing entities are 404, run state violations 400, everything else
/// 500 with the error's message.
pub(crate) fn error_response(err: Error) -> (StatusCode, String) {
    match &err {
        Error::Database(DatabaseError::NotFound { .. }) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        Error::Run(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        _ => {
            tracing::error!("Request failed: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// Start the gateway HTTP server.
///
/// Returns the actual bound `SocketAddr` (useful when binding to port 0).
pub async fn start_server(
    addr: SocketAddr,
    state: Arc<GatewayState>,
) -> Result<SocketAddr, GatewayError> {
    let listener =
        tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::StartupFailed {
                name: "gateway".to_string(),
                reason: format!("Failed to bind to {}: {}", addr, e),
            })?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| GatewayError::StartupFailed {
            name: "gateway".to_string(),
            reason: format!("Failed to get local addr: {}", e),
        })?;

    // CORS: restrict to same-origin by default. Only localhost/127.0.0.1
    // origins are allowed, since the gateway is a local-first service.
    let cors = CorsLayer::new()
        .allow_origin([
            format!("http://{}:{}", bound_addr.ip(), bound_addr.port())
                .parse()
                .expect("valid origin"),
            format!("http://localhost:{}", bound_addr.port())
                .parse()
                .expect("valid origin"),
        ])
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE]));

    let app = Router::new()
        .route("/api/health", get(health_handler))
        // Chat
        .route("/api/chat/send", post(chat_send_handler))
        // Personas
        .route("/api/sim/personas", get(personas_list_handler))
        .route("/api/sim/personas/seed", post(personas_seed_handler))
        .route("/api/sim/clone-user", post(clone_user_handler))
        // Runs
        .route("/api/sim/runs", get(runs_list_handler).post(runs_create_handler))
        .route("/api/sim/runs/{id}", get(runs_detail_handler))
        .route("/api/sim/runs/{id}/start", post(runs_start_handler))
        .route("/api/sim/runs/{id}/turn", post(runs_turn_handler))
        .route("/api/sim/runs/{id}/end", post(runs_end_handler))
        .route("/api/sim/runs/{id}/stop", post(runs_stop_handler))
        .route("/api/sim/runs/{id}/evaluate", post(runs_evaluate_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .layer(cors)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            header::HeaderValue::from_static("nosniff"),
        ))
        .with_state(state.clone());

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    *state.shutdown_tx.write().await = Some(shutdown_tx);

    tracing::info!("Gateway listening on {}", bound_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Gateway shutting down");
            })
            .await
        {
            tracing::error!("Gateway server error: {}", e);
        }
    });

    Ok(bound_addr)
}

// --- Health ---

async fn health_handler(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "compass",
        uptime_secs: state.startup_time.elapsed().as_secs(),
    })
}
