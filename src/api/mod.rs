//! Read-only REST API over the poller's state
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Storage health, never authenticated
//! - `GET /api/v1/hosts` - Every configured host with its latest status
//! - `GET /api/v1/hosts/:name` - One host
//! - `GET /api/v1/hosts/:name/uptime` - Bucketed uptime window
//! - `POST /api/v1/commands` - Answer a `!status`/`!uptime` chat command
//!
//! When an auth token is configured every route except health requires
//! `Authorization: Bearer <token>`.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{CommandRequest, CommandResponse, HealthResponse, HostInfo, HostsResponse, UptimeResponse};

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub auth_token: Option<String>,
}

pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    let mut protected = Router::new()
        .route("/api/v1/hosts", get(routes::hosts::list_hosts))
        .route("/api/v1/hosts/:name", get(routes::hosts::get_host))
        .route("/api/v1/hosts/:name/uptime", get(routes::hosts::get_uptime))
        .route("/api/v1/commands", post(routes::commands::run_command));

    if let Some(token) = config.auth_token.clone() {
        protected = protected.route_layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::require_token,
        ));
    }

    Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind and serve the API in a background task, returning the bound address
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
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
