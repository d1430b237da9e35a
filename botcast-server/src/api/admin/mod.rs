//! Admin API handlers.
//!
//! These endpoints require the `Botcast-Admin-Authorization` header with the
//! plaintext admin secret.
//!
//! # Endpoints
//!
//! - `GET  /bots/{bot_id}`          – show a bot
//! - `GET  /bots/{bot_id}/logs`     – list delivery records, newest first
//! - `POST /bots/{bot_id}/activate` – ping the bot and update its state
//! - `PUT  /bots/{bot_id}/state`    – set the liveness state
//! - `POST /bots/{bot_id}/reissue`  – rotate the bot's credentials
//! - `GET  /bots/{bot_id}/channels` – list the bot's channels
//! - `PUT  /bots/{bot_id}/channels/{channel_id}` – join a channel
//! - `DELETE /bots/{bot_id}/channels/{channel_id}` – leave a channel

use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use botcast_core::bot::BotError;

use crate::state::AppState;

mod activate;
mod channels;
mod list_logs;
mod reissue;
mod set_state;
mod show_bot;

/// Build the Admin API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/bots/{bot_id}", get(show_bot::show_bot))
        .route("/bots/{bot_id}/logs", get(list_logs::list_logs))
        .route("/bots/{bot_id}/activate", post(activate::activate))
        .route("/bots/{bot_id}/state", put(set_state::set_state))
        .route("/bots/{bot_id}/reissue", post(reissue::reissue))
        .route("/bots/{bot_id}/channels", get(channels::list_channels))
        .route(
            "/bots/{bot_id}/channels/{channel_id}",
            put(channels::join_channel).delete(channels::leave_channel),
        )
}

// ---------------------------------------------------------------------------
// Shared error type
// ---------------------------------------------------------------------------

/// Errors that can occur in Admin API handlers.
#[derive(Debug)]
pub(crate) struct AdminApiError(BotError);

impl From<BotError> for AdminApiError {
    fn from(e: BotError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AdminApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            BotError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            BotError::NotFound(_) => StatusCode::NOT_FOUND,
            BotError::AlreadyExists | BotError::ActivationInProgress => StatusCode::CONFLICT,
            BotError::Encode | BotError::Store(_) => {
                tracing::error!(error = %self.0, "Admin API internal error");
                return (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
                    .into_response();
            }
        };
        (status, self.0.to_string()).into_response()
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

use botcast_core::entities::bot::Bot;
use botcast_core::entities::event_log::BotEventLog;
use botcast_sdk::objects::admin::{AdminBotResponse, EventLogResponse};

pub(crate) fn bot_to_admin_response(bot: &Bot) -> AdminBotResponse {
    AdminBotResponse {
        id: bot.id,
        bot_user_id: bot.bot_user_id,
        description: bot.description.clone(),
        post_url: bot.post_url.clone(),
        subscribe_events: bot.subscribe_events.clone(),
        privileged: bot.privileged,
        state: bot.state.into(),
        creator_id: bot.creator_id,
        created_at: bot.created_at.unix_timestamp(),
        updated_at: bot.updated_at.unix_timestamp(),
    }
}

pub(crate) fn log_to_response(log: BotEventLog) -> EventLogResponse {
    EventLogResponse {
        request_id: log.request_id,
        bot_id: log.bot_id,
        event: log.event,
        code: log.code,
        latency_ns: log.latency,
        body: log.body,
        error: log.error,
        date_time: log.date_time.unix_timestamp(),
    }
}
