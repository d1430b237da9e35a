use axum::{Json, extract::Path, response::IntoResponse};
use botcast_sdk::objects::admin::SetStateRequest;
use uuid::Uuid;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::{AdminApiError, bot_to_admin_response};

/// `PUT /bots/{bot_id}/state` — operator override of the liveness state.
pub async fn set_state(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Path(bot_id): Path<Uuid>,
    Json(request): Json<SetStateRequest>,
) -> Result<impl IntoResponse, AdminApiError> {
    let bot = state.bots.set_state(bot_id, request.state.into()).await?;
    Ok(Json(bot_to_admin_response(&bot)))
}
