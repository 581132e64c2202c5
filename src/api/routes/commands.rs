//! Chat command endpoint for a gateway adapter

use axum::{Json, extract::State};
use chrono::Utc;
use tracing::{info, instrument};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::{CommandRequest, CommandResponse},
};

/// POST /api/v1/commands
///
/// Answers `{"content": "!status web1"}` with the reply messages. When a
/// `channel_id` is given the replies are also posted there.
#[instrument(skip_all)]
pub async fn run_command(
    State(state): State<ApiState>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<Json<CommandResponse>> {
    if request.content.trim().is_empty() {
        return Err(ApiError::InvalidRequest("content must not be empty".into()));
    }

    let replies = state.commands.answer(&request.content, Utc::now()).await;

    let mut delivered = 0;
    if let Some(channel_id) = request.channel_id {
        let discord = state.discord.as_ref().ok_or_else(|| {
            ApiError::InvalidRequest("reply delivery is not configured".into())
        })?;
        for reply in &replies {
            discord.send_message(channel_id, reply).await?;
            delivered += 1;
        }
        info!("delivered {delivered} replies to channel {channel_id}");
    }

    Ok(Json(CommandResponse { replies, delivered }))
}
