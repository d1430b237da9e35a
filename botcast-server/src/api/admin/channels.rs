use axum::{Json, extract::Path, response::IntoResponse};
use botcast_sdk::objects::admin::ChannelMembershipResponse;
use uuid::Uuid;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `GET /bots/{bot_id}/channels` — channels the bot participates in.
pub async fn list_channels(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Path(bot_id): Path<Uuid>,
) -> Result<impl IntoResponse, AdminApiError> {
    Ok(Json(state.bots.channels_of(bot_id).await?))
}

/// `PUT /bots/{bot_id}/channels/{channel_id}` — add the bot to a channel.
///
/// The bot receives `JOINED` only when it was not a member yet.
pub async fn join_channel(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Path((bot_id, channel_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AdminApiError> {
    let changed = state.bots.join(bot_id, channel_id).await?;
    Ok(Json(ChannelMembershipResponse {
        bot_id,
        channel_id,
        changed,
    }))
}

/// `DELETE /bots/{bot_id}/channels/{channel_id}` — remove the bot from a channel.
pub async fn leave_channel(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Path((bot_id, channel_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AdminApiError> {
    let changed = state.bots.leave(bot_id, channel_id).await?;
    Ok(Json(ChannelMembershipResponse {
        bot_id,
        channel_id,
        changed,
    }))
}
