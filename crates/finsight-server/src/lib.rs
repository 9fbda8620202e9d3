//! Finsight Web Server
//!
//! Axum-based JSON API that hands the current analytics snapshot to the
//! dashboard and accepts new transaction data.
//!
//! - Snapshot reads never wait on a recomputation
//! - At most one recomputation in flight; a newer ingestion supersedes a pending one
//! - Upload size limits and sanitized error responses

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use finsight_core::AnalyticsFacade;

mod handlers;
mod state;

pub use state::{IngestError, IngestGate};

/// Maximum upload size (10 MB)
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

/// Shared application state
pub struct AppState {
    pub gate: IngestGate,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(facade: AnalyticsFacade, config: ServerConfig) -> Self {
        Self {
            gate: IngestGate::new(facade),
            config,
        }
    }
}

/// Create the application router
pub fn create_router(facade: AnalyticsFacade, config: ServerConfig) -> Router {
    create_router_with_state(Arc::new(AppState::new(facade, config)))
}

/// Create the application router around existing state (for testing)
pub fn create_router_with_state(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/snapshot", get(handlers::get_snapshot))
        .route("/ingest", post(handlers::ingest))
        .route("/ingest/upload", post(handlers::ingest_upload))
        .route("/config", get(handlers::get_config));

    // Build CORS layer
    let cors = if state.config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the server and block until it stops
pub async fn serve_with_config(
    facade: AnalyticsFacade,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.allowed_origins.is_empty() {
        info!(origins = ?config.allowed_origins, "CORS origins allowed");
    }

    let snapshot = facade.current_snapshot();
    info!(
        source = %snapshot.source,
        transactions = snapshot.transaction_count,
        "Initial snapshot ready"
    );

    let app = create_router(facade, config);
    let addr = format!("{}:{}", host, port);

    if host != "127.0.0.1" && host != "localhost" {
        warn!("Listening on {} - the API has no authentication", host);
    }
    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn new(status: StatusCode, kind: &'static str, msg: &str) -> Self {
        Self {
            status,
            kind,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn bad_request(msg: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", msg)
    }

    pub fn superseded() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "superseded",
            "Ingestion superseded by a newer request",
        )
    }

    pub fn payload_too_large() -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            &format!("File too large. Maximum size is {} MB", MAX_UPLOAD_SIZE / 1024 / 1024),
        )
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal",
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message,
            "kind": self.kind,
        }));

        (self.status, body).into_response()
    }
}

impl From<finsight_core::Error> for AppError {
    fn from(err: finsight_core::Error) -> Self {
        use finsight_core::Error;
        match err {
            Error::EmptyOrInvalidInput(_) | Error::Csv(_) => Self::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "empty_or_invalid_input",
                &err.to_string(),
            ),
            other => Self::internal(other.into()),
        }
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Superseded => Self::superseded(),
            IngestError::Rejected(e) => e.into(),
            IngestError::Failed(e) => Self::internal(e.into()),
        }
    }
}
