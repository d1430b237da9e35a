//! Event type definitions for the platform event bus.
//!
//! Each bus event name has its own struct and its own channel. Events carry
//! identifiers where the handler has to re-read current state anyway, and
//! full records where the publisher already holds them.

use crate::entities::platform::{Message, User};
use uuid::Uuid;

/// A message type published on the platform event bus.
pub trait BusEvent: std::fmt::Debug + Send + 'static {
    /// Topic name on the bus, e.g. `message.created`.
    const NAME: &'static str;
}

/// A bot was added to a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotJoined {
    pub bot_id: Uuid,
    pub channel_id: Uuid,
}

impl BusEvent for BotJoined {
    const NAME: &'static str = "bot.joined";
}

/// A bot was removed from a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotLeft {
    pub bot_id: Uuid,
    pub channel_id: Uuid,
}

impl BusEvent for BotLeft {
    const NAME: &'static str = "bot.left";
}

/// An operator asked for the liveness handshake of a bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BotPingRequest {
    pub bot_id: Uuid,
}

impl BusEvent for BotPingRequest {
    const NAME: &'static str = "bot.ping_request";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCreated {
    pub message: Message,
}

impl BusEvent for MessageCreated {
    const NAME: &'static str = "message.created";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCreated {
    pub user: User,
}

impl BusEvent for UserCreated {
    const NAME: &'static str = "user.created";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCreated {
    pub channel_id: Uuid,
    pub private: bool,
}

impl BusEvent for ChannelCreated {
    const NAME: &'static str = "channel.created";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTopicUpdated {
    pub channel_id: Uuid,
    pub topic: String,
    pub updater_id: Uuid,
}

impl BusEvent for ChannelTopicUpdated {
    const NAME: &'static str = "channel.topic_updated";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StampCreated {
    pub stamp_id: Uuid,
}

impl BusEvent for StampCreated {
    const NAME: &'static str = "stamp.created";
}
