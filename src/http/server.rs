//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (tracing, limits, request ID, CORS, timeout)
//! - Bind server to listener with graceful shutdown
//! - Hold the shared request pipeline state

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::schema::{CorsConfig, ServiceConfig};
use crate::http::handlers;
use crate::pipeline::RequestPipeline;
use crate::transform::MattingSession;

/// Slack on top of the upload policy limit for multipart framing and the
/// non-file form fields. The hard body cap sits at twice the policy limit so
/// moderately oversized uploads still reach the validator and receive the
/// descriptive 413 instead of a bare rejection.
const MULTIPART_SLACK_BYTES: usize = 64 * 1024;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RequestPipeline>,
}

/// HTTP server for the background-removal service.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
    pipeline: Arc<RequestPipeline>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and matting
    /// session.
    pub fn new(config: ServiceConfig, session: Box<dyn MattingSession>) -> Self {
        let pipeline = Arc::new(RequestPipeline::new(&config, session));
        let state = AppState {
            pipeline: pipeline.clone(),
        };
        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            pipeline,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        let body_limit = config
            .upload
            .max_file_size
            .saturating_mul(2)
            .saturating_add(MULTIPART_SLACK_BYTES);

        Router::new()
            .route("/", get(handlers::root))
            .route("/health", get(handlers::health))
            .route("/remove-background", post(handlers::remove_background))
            .with_state(state)
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )))
            .layer(cors_layer(&config.cors))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            "HTTP server starting"
        );

        // Periodic sweep keeps the rate-limit map bounded by clients active
        // within the window.
        let pipeline = self.pipeline.clone();
        let sweep_every = Duration::from_secs(self.config.rate_limit.window_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                pipeline.limiter().evict_idle();
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
