use axum::{
    Json,
    extract::{Path, Query},
    response::IntoResponse,
};
use botcast_sdk::objects::admin::{ListEventLogsQuery, clamp_pagination};
use uuid::Uuid;

use crate::api::extractors::AdminAuth;
use crate::state::AppState;

use super::{AdminApiError, log_to_response};

/// `GET /bots/{bot_id}/logs` — delivery records of a bot, newest first.
pub async fn list_logs(
    state: axum::extract::State<AppState>,
    _auth: AdminAuth,
    Path(bot_id): Path<Uuid>,
    Query(query): Query<ListEventLogsQuery>,
) -> Result<impl IntoResponse, AdminApiError> {
    let (limit, offset) = clamp_pagination(query.limit, query.offset);

    let logs = state.bots.event_logs(bot_id, limit, offset).await?;

    Ok(Json(
        logs.into_iter().map(log_to_response).collect::<Vec<_>>(),
    ))
}
