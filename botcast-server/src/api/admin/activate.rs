use axum::{Json, extract::Path, response::IntoResponse};
use botcast_sdk::objects::admin::ActivateResponse;
use uuid::Uuid;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::{AdminApiError, bot_to_admin_response};

/// `POST /bots/{bot_id}/activate` — ping the bot.
///
/// A successful ping activates the bot, a failed one pauses it. Either way
/// the response carries the resulting bot and the ping outcome; only a ping
/// that is already running for the same bot is rejected.
pub async fn activate(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Path(bot_id): Path<Uuid>,
) -> Result<impl IntoResponse, AdminApiError> {
    let result = state.bots.activate(bot_id).await?;

    Ok(Json(ActivateResponse {
        bot: bot_to_admin_response(&result.bot),
        code: result.report.outcome.status_code(),
        error: result.report.outcome.error().map(str::to_owned),
    }))
}
