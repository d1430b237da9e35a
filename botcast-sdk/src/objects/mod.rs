pub mod admin;
pub mod event;
pub mod payload;

pub use event::{BotEventKind, BotEventKinds, BotState, UnknownEventKind};
pub use payload::{Envelope, EventPayload};
