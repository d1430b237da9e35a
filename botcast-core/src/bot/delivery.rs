//! One outbound webhook call.
//!
//! The response body is read chunk by chunk and never past
//! `content_limit + 1` bytes; `Content-Length` is not consulted since chunked
//! responses do not carry it.

use super::codec::EncodedPayload;
use crate::entities::bot::Bot;
use crate::entities::event_log::BotEventLog;
use botcast_sdk::headers::{
    BOT_EVENT_HEADER, BOT_REQUEST_ID_HEADER, BOT_TOKEN_HEADER, JSON_CONTENT_TYPE,
};
use botcast_sdk::objects::BotEventKind;
use bytes::{Bytes, BytesMut};
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CONTENT_LIMIT: usize = 5 * 1024 * 1024;
pub const DEFAULT_USER_AGENT: &str = concat!("botcast/", env!("CARGO_PKG_VERSION"));

pub const TOO_BIG_RESPONSE: &str = "too big response";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Total time for connect, send and reading the response.
    pub timeout: Duration,
    pub content_limit: usize,
    pub user_agent: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            content_limit: DEFAULT_CONTENT_LIMIT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// How a single delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// No usable response. `status` is set when the failure happened while
    /// reading the body of an otherwise received response.
    Network {
        status: Option<u16>,
        error: String,
        body: Bytes,
    },
    /// The body exceeded the content limit; `body` is the partial read.
    Oversize { status: u16, body: Bytes },
    NonSuccess { status: u16, body: Bytes },
    Success { status: u16, body: Bytes },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Success { .. })
    }

    /// HTTP status, 0 when none was received.
    pub fn status_code(&self) -> i32 {
        match self {
            DeliveryOutcome::Network { status, .. } => status.map_or(0, i32::from),
            DeliveryOutcome::Oversize { status, .. }
            | DeliveryOutcome::NonSuccess { status, .. }
            | DeliveryOutcome::Success { status, .. } => i32::from(*status),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            DeliveryOutcome::Network { error, .. } => Some(error),
            DeliveryOutcome::Oversize { .. } => Some(TOO_BIG_RESPONSE),
            DeliveryOutcome::NonSuccess { .. } | DeliveryOutcome::Success { .. } => None,
        }
    }

    pub fn body(&self) -> &Bytes {
        match self {
            DeliveryOutcome::Network { body, .. }
            | DeliveryOutcome::Oversize { body, .. }
            | DeliveryOutcome::NonSuccess { body, .. }
            | DeliveryOutcome::Success { body, .. } => body,
        }
    }
}

/// Everything recorded about one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub request_id: Uuid,
    pub bot_id: Uuid,
    pub kind: BotEventKind,
    pub outcome: DeliveryOutcome,
    pub latency: Duration,
    pub date_time: OffsetDateTime,
}

impl DeliveryReport {
    pub fn to_log(&self) -> BotEventLog {
        let body = self.outcome.body();
        BotEventLog {
            request_id: self.request_id,
            bot_id: self.bot_id,
            event: self.kind,
            body: (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned()),
            error: self.outcome.error().map(str::to_string),
            code: self.outcome.status_code(),
            latency: i64::try_from(self.latency.as_nanos()).unwrap_or(i64::MAX),
            date_time: self.date_time,
        }
    }
}

/// Performs deliveries over one shared, pooled HTTP client.
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: reqwest::Client,
    config: DeliveryConfig,
}

impl HttpDelivery {
    pub fn new(config: DeliveryConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    /// POST `payload` to the bot. Never fails; every problem is folded into
    /// the returned outcome.
    pub async fn deliver(&self, bot: &Bot, payload: &EncodedPayload) -> DeliveryReport {
        let request_id = Uuid::now_v7();
        let kind = payload.kind();
        let date_time = OffsetDateTime::now_utc();
        let started = Instant::now();
        let outcome = self.send(bot, request_id, payload).await;
        let latency = started.elapsed();

        match &outcome {
            DeliveryOutcome::Success { body, .. } if !body.is_empty() => {
                // Reserved for bot initiated commands; not acted upon.
                debug!(
                    bot_id = %bot.id,
                    request_id = %request_id,
                    body = %String::from_utf8_lossy(body),
                    "Ignoring inline response body"
                );
            }
            DeliveryOutcome::Success { .. } => {}
            failure => {
                warn!(
                    bot_id = %bot.id,
                    request_id = %request_id,
                    event = %kind,
                    status = failure.status_code(),
                    error = failure.error().unwrap_or("non-2xx status"),
                    "Bot event delivery failed"
                );
            }
        }

        DeliveryReport {
            request_id,
            bot_id: bot.id,
            kind,
            outcome,
            latency,
            date_time,
        }
    }

    async fn send(&self, bot: &Bot, request_id: Uuid, payload: &EncodedPayload) -> DeliveryOutcome {
        let mut request = self
            .client
            .post(&bot.post_url)
            .header(USER_AGENT, &self.config.user_agent)
            .header(BOT_EVENT_HEADER, payload.kind().as_str())
            .header(BOT_REQUEST_ID_HEADER, request_id.to_string())
            .header(BOT_TOKEN_HEADER, &bot.verification_token);
        if !payload.is_empty() {
            request = request
                .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
                .body(payload.bytes().clone());
        }

        let mut response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return DeliveryOutcome::Network {
                    status: None,
                    error: e.to_string(),
                    body: Bytes::new(),
                };
            }
        };
        let status = response.status().as_u16();

        let limit = self.config.content_limit;
        let mut body = BytesMut::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let room = limit + 1 - body.len();
                    body.extend_from_slice(&chunk[..chunk.len().min(room)]);
                    if body.len() > limit {
                        return DeliveryOutcome::Oversize {
                            status,
                            body: body.freeze(),
                        };
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    return DeliveryOutcome::Network {
                        status: Some(status),
                        error: e.to_string(),
                        body: body.freeze(),
                    };
                }
            }
        }

        let body = body.freeze();
        if response.status().is_success() {
            DeliveryOutcome::Success { status, body }
        } else {
            DeliveryOutcome::NonSuccess { status, body }
        }
    }
}
