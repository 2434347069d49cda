//! HTTP server for the complaint diagnosis service.
//!
//! Features:
//! - Per-IP rate limiting with automatic eviction when the map exceeds 10k entries
//! - JSONL access logging with size-based rotation (configurable via `max_access_log_bytes`)
//! - Model loaded once at startup; a missing artifact keeps the service up
//!   with diagnosis requests answered 503 until the artifact is present
//! - Structured logging via [`tracing`]

pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod types;

pub use handlers::MAX_BODY_BYTES;
pub use logging::{RecordEvent, UsageMetrics};
pub use types::{
    DiagnoseRequest, DiagnoseResponse, DiagnosedIssue, EndpointStats, ErrorResponse,
    HealthResponse, RequestStats, ServerConfig, SeverityStats, StatsResponse, SuppressionInfo,
    SuppressionStats, TranscriptionResponse, MAX_COMPLAINT_CHARS,
};

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use eyre::Result;
use lru::LruCache;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::model::{Classifier, LinearModel};
use crate::transcribe::Transcriber;

// ---------------------------------------------------------------------------
// Server state
// ---------------------------------------------------------------------------

pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub rate_limiters: Mutex<LruCache<IpAddr, Arc<middleware::IpRateLimiter>>>,
    pub usage: UsageMetrics,
    /// Loaded classifier; `None` when the artifact failed to load at startup.
    pub classifier: Option<Arc<dyn Classifier>>,
    /// SHA-256 of the loaded artifact, when known.
    pub model_hash: Option<String>,
    /// Optional speech-to-text backend.
    pub transcriber: Option<Arc<dyn Transcriber>>,
}

impl ServerState {
    /// Build state by loading the model artifact named in `config`. A load
    /// failure is logged and leaves the service degraded rather than dead:
    /// health checks keep answering and diagnosis requests get 503.
    pub fn new(config: ServerConfig) -> Self {
        let (classifier, model_hash): (Option<Arc<dyn Classifier>>, Option<String>) =
            match LinearModel::load(&config.model_path) {
                Ok(model) => {
                    info!(
                        path = %config.model_path.display(),
                        classes = model.class_labels().len(),
                        vocabulary = model.vocabulary_size(),
                        hash = model.artifact_hash().unwrap_or("unknown"),
                        "classifier loaded"
                    );
                    let hash = model.artifact_hash().map(|h| h.to_string());
                    (Some(Arc::new(model)), hash)
                }
                Err(e) => {
                    warn!(
                        path = %config.model_path.display(),
                        error = %e,
                        "classifier unavailable; diagnosis requests will be rejected until the artifact is present"
                    );
                    (None, None)
                }
            };

        Self::build(config, classifier, model_hash)
    }

    /// Build state around an already-constructed classifier. Used by tests
    /// and embedders that assemble the collaborator themselves.
    pub fn with_classifier(config: ServerConfig, classifier: Arc<dyn Classifier>) -> Self {
        Self::build(config, Some(classifier), None)
    }

    fn build(
        config: ServerConfig,
        classifier: Option<Arc<dyn Classifier>>,
        model_hash: Option<String>,
    ) -> Self {
        let usage = UsageMetrics::new(&config.access_log_path, config.max_access_log_bytes);
        Self {
            start_time: Instant::now(),
            rate_limiters: middleware::new_rate_limiter_cache(),
            usage,
            classifier,
            model_hash,
            transcriber: None,
            config,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP server
// ---------------------------------------------------------------------------

pub fn router(state: Arc<ServerState>) -> axum::Router {
    use axum::extract::DefaultBodyLimit;
    use axum::routing::{get, post};
    use tower_http::cors::{Any, CorsLayer};

    // Allow any origin: the API serves browser frontends on other hosts.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    axum::Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/stats", get(handlers::stats_handler))
        .route("/api/v1/diagnose", post(handlers::diagnose_handler))
        .route("/api/v1/transcribe", post(handlers::transcribe_handler))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Run the HTTP server (blocking).
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let bind_addr = config.bind_addr;
    let rate_limit_rpm = config.rate_limit_rpm;
    let access_log = config.access_log_path.clone();
    let state = Arc::new(ServerState::new(config));

    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(bind = %bind_addr, "faultline diagnosis server listening");
    info!("Endpoints: GET /health, GET /stats, POST /api/v1/diagnose, POST /api/v1/transcribe");
    if rate_limit_rpm > 0 {
        info!(rate_limit_rpm, "rate limiting enabled");
    } else {
        info!("rate limiting disabled");
    }
    info!(access_log = %access_log);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        #[cfg(unix)]
        let sigterm_recv = sigterm.recv();
        #[cfg(not(unix))]
        let sigterm_recv = std::future::pending::<Option<()>>();

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down gracefully"),
            _ = sigterm_recv => info!("received SIGTERM, shutting down gracefully"),
        }
    })
    .await?;
    Ok(())
}
