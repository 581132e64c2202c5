//! Host status endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::Deserialize;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{HostInfo, HostsResponse, UptimeResponse},
};
use crate::config::Host;
use crate::storage::DISPLAY_BUCKETS;

/// Longest history a single request may ask for (one week of hourly buckets)
const MAX_BUCKETS: usize = 168;

#[derive(Debug, Deserialize)]
pub struct UptimeQuery {
    buckets: Option<usize>,
}

async fn host_info(state: &ApiState, host: &Host) -> HostInfo {
    HostInfo {
        name: host.name.clone(),
        address: host.address.clone(),
        local: host.is_local(),
        status: state.board.get(&host.name).await,
    }
}

fn find<'a>(state: &'a ApiState, name: &str) -> ApiResult<&'a Host> {
    state
        .host(name)
        .ok_or_else(|| ApiError::NotFound(format!("host '{name}' not found")))
}

/// GET /api/v1/hosts
pub async fn list_hosts(State(state): State<ApiState>) -> Json<HostsResponse> {
    let mut hosts = Vec::with_capacity(state.hosts.len());
    for host in state.hosts.iter() {
        hosts.push(host_info(&state, host).await);
    }

    Json(HostsResponse {
        total: hosts.len(),
        hosts,
    })
}

/// GET /api/v1/hosts/:name
pub async fn get_host(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> ApiResult<Json<HostInfo>> {
    let host = find(&state, &name)?;
    Ok(Json(host_info(&state, host).await))
}

/// GET /api/v1/hosts/:name/uptime?buckets=48
pub async fn get_uptime(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<UptimeQuery>,
) -> ApiResult<Json<UptimeResponse>> {
    let host = find(&state, &name)?;

    let count = query.buckets.unwrap_or(DISPLAY_BUCKETS);
    if count == 0 || count > MAX_BUCKETS {
        return Err(ApiError::InvalidRequest(format!(
            "buckets must be between 1 and {MAX_BUCKETS}"
        )));
    }

    let window = state.store.window(&host.name, count, Utc::now()).await?;
    Ok(Json(UptimeResponse::from_window(&host.name, window)))
}
