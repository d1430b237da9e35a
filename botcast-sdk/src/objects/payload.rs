//! JSON bodies of the bot event webhooks.
//!
//! Every body is an [`Envelope`]: the `eventTime` of the event plus the
//! fields of the kind specific payload, flattened into one object.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::event::BotEventKind;

/// A user as seen by bots.
///
/// `Default` is the all-zero user emitted when the referenced user no longer
/// exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub icon_id: Uuid,
    pub bot: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPayload {
    pub id: Uuid,
    pub name: String,
    /// Hierarchical path with a leading `#`, e.g. `#general/random`.
    pub path: String,
    /// Nil for top level channels.
    pub parent_id: Uuid,
    pub creator: UserPayload,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// One embed extracted from a message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedInfo {
    pub raw: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub id: Uuid,
    pub user: UserPayload,
    pub channel_id: Uuid,
    pub text: String,
    pub plain_text: String,
    pub embedded: Vec<EmbeddedInfo>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// `PING` carries nothing but the envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {}

/// `JOINED` and `LEFT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinedOrLeft {
    pub channel: ChannelPayload,
}

/// `MESSAGE_CREATED` and `DIRECT_MESSAGE_CREATED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCreated {
    pub message: MessagePayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCreated {
    pub channel: ChannelPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTopicChanged {
    pub channel: ChannelPayload,
    pub topic: String,
    pub updater: UserPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    pub user: UserPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StampCreated {
    pub id: Uuid,
    pub name: String,
    pub file_id: Uuid,
    /// Zero value for system stamps.
    pub creator: UserPayload,
}

/// A kind specific payload, before the `eventTime` is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Ping(Ping),
    Joined(JoinedOrLeft),
    Left(JoinedOrLeft),
    MessageCreated(MessageCreated),
    DirectMessageCreated(MessageCreated),
    ChannelCreated(ChannelCreated),
    ChannelTopicChanged(ChannelTopicChanged),
    UserCreated(UserCreated),
    StampCreated(StampCreated),
}

impl EventPayload {
    /// The event kind this payload is delivered as.
    pub fn kind(&self) -> BotEventKind {
        match self {
            EventPayload::Ping(_) => BotEventKind::Ping,
            EventPayload::Joined(_) => BotEventKind::Joined,
            EventPayload::Left(_) => BotEventKind::Left,
            EventPayload::MessageCreated(_) => BotEventKind::MessageCreated,
            EventPayload::DirectMessageCreated(_) => BotEventKind::DirectMessageCreated,
            EventPayload::ChannelCreated(_) => BotEventKind::ChannelCreated,
            EventPayload::ChannelTopicChanged(_) => BotEventKind::ChannelTopicChanged,
            EventPayload::UserCreated(_) => BotEventKind::UserCreated,
            EventPayload::StampCreated(_) => BotEventKind::StampCreated,
        }
    }

    /// Decode a JSON body sent with the given event kind header.
    pub fn decode(kind: BotEventKind, body: &[u8]) -> Result<Envelope<Self>, PayloadDecodeError> {
        fn parse<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<Envelope<T>, PayloadDecodeError> {
            Ok(serde_json::from_slice(body)?)
        }
        let envelope = match kind {
            BotEventKind::Ping => parse(body)?.map(EventPayload::Ping),
            BotEventKind::Joined => parse(body)?.map(EventPayload::Joined),
            BotEventKind::Left => parse(body)?.map(EventPayload::Left),
            BotEventKind::MessageCreated => parse(body)?.map(EventPayload::MessageCreated),
            BotEventKind::DirectMessageCreated => {
                parse(body)?.map(EventPayload::DirectMessageCreated)
            }
            BotEventKind::ChannelCreated => parse(body)?.map(EventPayload::ChannelCreated),
            BotEventKind::ChannelTopicChanged => {
                parse(body)?.map(EventPayload::ChannelTopicChanged)
            }
            BotEventKind::UserCreated => parse(body)?.map(EventPayload::UserCreated),
            BotEventKind::StampCreated => parse(body)?.map(EventPayload::StampCreated),
            BotEventKind::MentionMessageCreated => {
                return Err(PayloadDecodeError::NotDelivered(kind));
            }
        };
        Ok(envelope)
    }
}

/// Wire form of every event body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    #[serde(with = "time::serde::rfc3339")]
    pub event_time: OffsetDateTime,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Envelope<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            event_time: self.event_time,
            body: f(self.body),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadDecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} is a subscription kind and is never delivered on its own")]
    NotDelivered(BotEventKind),
}
