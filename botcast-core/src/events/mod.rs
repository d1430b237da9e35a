//! Typed platform event bus.
//!
//! The platform publishes its domain events here; the bot ingress loop
//! consumes them and turns each into a targeted delivery.
//!
//! # Topics
//!
//! | Topic | Struct |
//! |---|---|
//! | `bot.joined` / `bot.left` | [`BotJoined`] / [`BotLeft`] |
//! | `bot.ping_request` | [`BotPingRequest`] |
//! | `message.created` | [`MessageCreated`] |
//! | `user.created` | [`UserCreated`] |
//! | `channel.created` | [`ChannelCreated`] |
//! | `channel.topic_updated` | [`ChannelTopicUpdated`] |
//! | `stamp.created` | [`StampCreated`] |

pub mod channels;
pub mod types;

pub use channels::{DEFAULT_CHANNEL_BUFFER, EventReceivers, EventSenders, event_bus};

pub use types::{
    BotJoined, BotLeft, BotPingRequest, BusEvent, ChannelCreated, ChannelTopicUpdated,
    MessageCreated, StampCreated, UserCreated,
};
