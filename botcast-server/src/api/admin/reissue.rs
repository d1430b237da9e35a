use axum::{Json, extract::Path, response::IntoResponse};
use botcast_sdk::objects::admin::ReissueResponse;
use uuid::Uuid;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::AdminApiError;

/// `POST /bots/{bot_id}/reissue` — rotate the verification token, bot code
/// and access token. The bot is paused until activated again.
pub async fn reissue(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Path(bot_id): Path<Uuid>,
) -> Result<impl IntoResponse, AdminApiError> {
    let credentials = state.bots.reissue(bot_id).await?;
    tracing::info!(bot_id = %bot_id, "Bot credentials reissued by admin");

    Ok(Json(ReissueResponse {
        verification_token: credentials.bot.verification_token.clone(),
        bot_code: credentials.bot.bot_code.clone(),
        access_token_id: credentials.access_token.id,
        access_token: credentials.access_token.access_token,
    }))
}
