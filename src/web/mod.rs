//! HTTP server: dashboard pages, database management and the JSON API

pub mod api;
pub mod chart;
pub mod metrics;
pub mod pages;
pub mod templates;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use minijinja::Environment;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::dashboard::WeatherService;
use crate::{Result, WeatherError};

/// Form posts on the management page are tiny
const BODY_LIMIT_BYTES: usize = 64 * 1024;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub service: WeatherService,
    pub templates: Arc<Environment<'static>>,
}

impl AppState {
    pub fn new(service: WeatherService) -> Result<Self> {
        let templates = templates::environment()
            .map_err(|e| WeatherError::config(format!("Failed to load templates: {e}")))?;
        Ok(Self {
            service,
            templates: Arc::new(templates),
        })
    }
}

pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(pages::dashboard))
        .route("/db", get(pages::database))
        .route("/db/readings/{id}/conditions", post(pages::update_reading))
        .route("/db/readings/{id}/delete", post(pages::delete_reading))
        .route(
            "/db/queries/{session_id}/{query_ts}/location",
            post(pages::update_query),
        )
        .route(
            "/db/queries/{session_id}/{query_ts}/delete",
            post(pages::delete_query),
        )
        .route("/db/locations/{id}/delete", post(pages::delete_location))
        .nest("/api", api::router())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_seconds.into()),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run(state: AppState, config: &ServerConfig) -> Result<()> {
    let app = router(state, config);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| WeatherError::config(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!("Web server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| WeatherError::config(format!("Server error: {e}")))?;

    tracing::info!("Web server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
