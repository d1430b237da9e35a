//! Admin API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::{BotEventKind, BotEventKinds, BotState};

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// One delivery attempt as recorded in the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogResponse {
    pub request_id: Uuid,
    pub bot_id: Uuid,
    pub event: BotEventKind,
    /// 0 when no HTTP status was received.
    pub code: i32,
    pub latency_ns: i64,
    pub body: Option<String>,
    pub error: Option<String>,
    pub date_time: i64,
}

/// Bot detail for the admin API. Secrets are never included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminBotResponse {
    pub id: Uuid,
    pub bot_user_id: Uuid,
    pub description: String,
    pub post_url: String,
    pub subscribe_events: BotEventKinds,
    pub privileged: bool,
    pub state: BotState,
    pub creator_id: Uuid,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Returned once after a reissue; the caller must hand these to the bot owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReissueResponse {
    pub verification_token: String,
    pub bot_code: String,
    pub access_token_id: Uuid,
    pub access_token: String,
}

/// Outcome of the activation ping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivateResponse {
    pub bot: AdminBotResponse,
    /// 0 when no HTTP status was received.
    pub code: i32,
    pub error: Option<String>,
}

/// Result of a join or leave. `changed` is false when the membership
/// already was as requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMembershipResponse {
    pub bot_id: Uuid,
    pub channel_id: Uuid,
    pub changed: bool,
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetStateRequest {
    pub state: BotState,
}

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 200;
const MAX_OFFSET: i64 = 100_000;

/// Query parameters for listing a bot's event log.
#[derive(Debug, Clone, Deserialize)]
pub struct ListEventLogsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

/// Clamp limit and offset to safe maximums.
pub fn clamp_pagination(limit: i64, offset: i64) -> (i64, i64) {
    (limit.clamp(1, MAX_LIMIT), offset.clamp(0, MAX_OFFSET))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_clamped() {
        assert_eq!(clamp_pagination(0, -5), (1, 0));
        assert_eq!(clamp_pagination(20, 40), (20, 40));
        assert_eq!(clamp_pagination(1_000, 1_000_000), (200, 100_000));
    }

    #[test]
    fn query_defaults() {
        let query: ListEventLogsQuery = serde_json::from_str("{}").unwrap();
        assert_eq!((query.limit, query.offset), (20, 0));
    }

    #[test]
    fn set_state_body() {
        let req: SetStateRequest = serde_json::from_str(r#"{"state":"paused"}"#).unwrap();
        assert_eq!(req.state, BotState::Paused);
    }
}
