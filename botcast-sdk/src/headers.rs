//! Protocol header names.
//!
//! Names are sent exactly as written here. Receivers must compare them
//! case-insensitively (HTTP/2 and most HTTP/1 stacks lowercase them).

/// Carries the canonical event kind, e.g. `MESSAGE_CREATED`.
pub const BOT_EVENT_HEADER: &str = "X-TRAQ-BOT-EVENT";

/// A fresh UUID per delivery attempt.
pub const BOT_REQUEST_ID_HEADER: &str = "X-TRAQ-BOT-REQUEST-ID";

/// The bot's verification token.
pub const BOT_TOKEN_HEADER: &str = "X-TRAQ-BOT-Token";

/// Header name for admin API authentication (plaintext secret).
pub const ADMIN_AUTH_HEADER: &str = "Botcast-Admin-Authorization";

/// Content type of every non-empty event body.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";
