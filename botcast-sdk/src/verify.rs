//! Authenticate and decode an inbound bot event request.
//!
//! ```ignore
//! let event = IncomingEvent::parse(|name| headers.get(name)?.to_str().ok(), &body, TOKEN)?;
//! match event.payload.map(|p| p.body) {
//!     Some(EventPayload::MessageCreated(m)) => reply(m.message.channel_id),
//!     _ => {}
//! }
//! ```

use uuid::Uuid;

use crate::headers::{BOT_EVENT_HEADER, BOT_REQUEST_ID_HEADER, BOT_TOKEN_HEADER};
use crate::objects::event::{BotEventKind, UnknownEventKind};
use crate::objects::payload::{Envelope, EventPayload, PayloadDecodeError};

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    #[error("verification token mismatch")]
    TokenMismatch,
    #[error(transparent)]
    UnknownEvent(#[from] UnknownEventKind),
    #[error("invalid request id: {0}")]
    InvalidRequestId(#[from] uuid::Error),
    #[error("invalid body: {0}")]
    Body(#[from] PayloadDecodeError),
}

/// A verified event delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingEvent {
    pub kind: BotEventKind,
    pub request_id: Uuid,
    /// `None` when the request had an empty body.
    pub payload: Option<Envelope<EventPayload>>,
}

impl IncomingEvent {
    /// Verify the protocol headers and decode the body.
    ///
    /// `header` looks a header value up by name. Senders use the exact case
    /// from [`crate::headers`], but intermediaries may not, so the lookup
    /// should be case-insensitive.
    pub fn parse<'a, F>(header: F, body: &[u8], verification_token: &str) -> Result<Self, VerifyError>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let token = header(BOT_TOKEN_HEADER).ok_or(VerifyError::MissingHeader(BOT_TOKEN_HEADER))?;
        verify_token(token, verification_token)?;
        let kind: BotEventKind = header(BOT_EVENT_HEADER)
            .ok_or(VerifyError::MissingHeader(BOT_EVENT_HEADER))?
            .parse()?;
        let request_id = header(BOT_REQUEST_ID_HEADER)
            .ok_or(VerifyError::MissingHeader(BOT_REQUEST_ID_HEADER))?
            .parse::<Uuid>()?;
        let payload = if body.is_empty() {
            None
        } else {
            Some(EventPayload::decode(kind, body)?)
        };
        Ok(Self {
            kind,
            request_id,
            payload,
        })
    }
}

/// Constant-time token check: the expected token is turned into an HMAC tag
/// and `ring` verifies the received token against it.
fn verify_token(received: &str, expected: &str) -> Result<(), VerifyError> {
    let key = ring::hmac::Key::new(ring::hmac::HMAC_SHA256, expected.as_bytes());
    let tag = ring::hmac::sign(&key, expected.as_bytes());
    ring::hmac::verify(&key, received.as_bytes(), tag.as_ref())
        .map_err(|_| VerifyError::TokenMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'m>(map: &'m HashMap<String, String>) -> impl Fn(&str) -> Option<&'m str> + 'm {
        move |name: &str| map.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    fn headers(kind: &str, token: &str) -> HashMap<String, String> {
        HashMap::from([
            ("x-traq-bot-event".to_string(), kind.to_string()),
            (
                "x-traq-bot-request-id".to_string(),
                "9a1e2f4c-0d8b-4e8f-9c55-7a2c2c1f7e10".to_string(),
            ),
            ("x-traq-bot-token".to_string(), token.to_string()),
        ])
    }

    #[test]
    fn accepts_ping() {
        let map = headers("PING", "secret");
        let body = br#"{"eventTime":"2024-05-06T07:08:09.123Z"}"#;
        let event = IncomingEvent::parse(lookup(&map), body, "secret").unwrap();
        assert_eq!(event.kind, BotEventKind::Ping);
        assert_eq!(
            event.request_id.to_string(),
            "9a1e2f4c-0d8b-4e8f-9c55-7a2c2c1f7e10"
        );
        assert!(matches!(
            event.payload.map(|p| p.body),
            Some(EventPayload::Ping(_))
        ));
    }

    #[test]
    fn empty_body_has_no_payload() {
        let map = headers("LEFT", "secret");
        let event = IncomingEvent::parse(lookup(&map), b"", "secret").unwrap();
        assert!(event.payload.is_none());
    }

    #[test]
    fn rejects_wrong_token() {
        let map = headers("PING", "secreT");
        let err = IncomingEvent::parse(lookup(&map), b"", "secret").unwrap_err();
        assert!(matches!(err, VerifyError::TokenMismatch));

        let map = headers("PING", "secret-but-longer");
        let err = IncomingEvent::parse(lookup(&map), b"", "secret").unwrap_err();
        assert!(matches!(err, VerifyError::TokenMismatch));

        let map = headers("PING", "");
        let err = IncomingEvent::parse(lookup(&map), b"", "secret").unwrap_err();
        assert!(matches!(err, VerifyError::TokenMismatch));
    }

    #[test]
    fn rejects_unknown_kind_and_missing_headers() {
        let map = headers("MESSAGE_UPDATED", "secret");
        let err = IncomingEvent::parse(lookup(&map), b"", "secret").unwrap_err();
        assert!(matches!(err, VerifyError::UnknownEvent(_)));

        let mut map = headers("PING", "secret");
        map.remove("x-traq-bot-request-id");
        let err = IncomingEvent::parse(lookup(&map), b"", "secret").unwrap_err();
        assert!(matches!(
            err,
            VerifyError::MissingHeader(BOT_REQUEST_ID_HEADER)
        ));
    }

    #[test]
    fn rejects_body_of_another_kind() {
        let map = headers("USER_CREATED", "secret");
        let body = br#"{"eventTime":"2024-05-06T07:08:09Z"}"#;
        let err = IncomingEvent::parse(lookup(&map), body, "secret").unwrap_err();
        assert!(matches!(err, VerifyError::Body(_)));
    }
}
