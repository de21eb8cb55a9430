//! HTTP surface of the remediation hub
//!
//! Accepts pub/sub delivery envelopes over HTTP and runs each one through
//! the [`Remediator`](crate::orchestrator::Remediator). Requests are handled
//! concurrently; every request is an independent run.
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `POST /api/v1/notifications` - Process a delivery envelope

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::HealthResponse;

#[cfg(feature = "api")]
use axum::{
    Router,
    routing::{get, post},
};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::info;

use crate::{config::ApiSection, util};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    pub auth_token: Option<String>,

    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080),
            auth_token: None,
            enable_cors: true,
        }
    }
}

impl ApiConfig {
    /// Merge the config file section with the environment
    ///
    /// `REMEDIATION_ADDR`/`REMEDIATION_PORT` apply when the file names no bind
    /// address; `REMEDIATION_SECRET` wins over the file token.
    pub fn from_section(section: Option<&ApiSection>) -> Self {
        let bind_addr = section
            .and_then(|s| s.bind)
            .unwrap_or_else(|| SocketAddr::new(util::get_addr(), util::get_port()));
        let auth_token =
            util::get_secret().or_else(|| section.and_then(|s| s.token.clone()));

        Self {
            bind_addr,
            auth_token,
            ..Default::default()
        }
    }
}

/// Build the router without binding it
#[cfg(feature = "api")]
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route(
            "/api/v1/notifications",
            post(routes::notifications::receive_notification),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
