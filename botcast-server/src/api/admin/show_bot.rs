use axum::{Json, extract::Path, response::IntoResponse};
use uuid::Uuid;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::{AdminApiError, bot_to_admin_response};

/// `GET /bots/{bot_id}` — show a bot without its secrets.
pub async fn show_bot(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Path(bot_id): Path<Uuid>,
) -> Result<impl IntoResponse, AdminApiError> {
    let bot = state.bots.get(bot_id).await?;
    Ok(Json(bot_to_admin_response(&bot)))
}
