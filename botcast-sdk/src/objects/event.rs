//! Event kinds and bot lifecycle states.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The closed set of event kinds a bot can receive or subscribe to.
///
/// The string form is the value of the `X-TRAQ-BOT-EVENT` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotEventKind {
    Ping,
    Joined,
    Left,
    MessageCreated,
    DirectMessageCreated,
    MentionMessageCreated,
    ChannelCreated,
    ChannelTopicChanged,
    UserCreated,
    StampCreated,
}

impl BotEventKind {
    pub const ALL: [BotEventKind; 10] = [
        BotEventKind::Ping,
        BotEventKind::Joined,
        BotEventKind::Left,
        BotEventKind::MessageCreated,
        BotEventKind::DirectMessageCreated,
        BotEventKind::MentionMessageCreated,
        BotEventKind::ChannelCreated,
        BotEventKind::ChannelTopicChanged,
        BotEventKind::UserCreated,
        BotEventKind::StampCreated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BotEventKind::Ping => "PING",
            BotEventKind::Joined => "JOINED",
            BotEventKind::Left => "LEFT",
            BotEventKind::MessageCreated => "MESSAGE_CREATED",
            BotEventKind::DirectMessageCreated => "DIRECT_MESSAGE_CREATED",
            BotEventKind::MentionMessageCreated => "MENTION_MESSAGE_CREATED",
            BotEventKind::ChannelCreated => "CHANNEL_CREATED",
            BotEventKind::ChannelTopicChanged => "CHANNEL_TOPIC_CHANGED",
            BotEventKind::UserCreated => "USER_CREATED",
            BotEventKind::StampCreated => "STAMP_CREATED",
        }
    }
}

impl fmt::Display for BotEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not one of the canonical event names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown bot event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for BotEventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BotEventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_owned()))
    }
}

impl TryFrom<String> for BotEventKind {
    type Error = UnknownEventKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A set of subscribed event kinds.
///
/// Serialized as a JSON array; persisted as a space separated string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BotEventKinds(BTreeSet<BotEventKind>);

impl BotEventKinds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, kind: BotEventKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn insert(&mut self, kind: BotEventKind) -> bool {
        self.0.insert(kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = BotEventKind> + '_ {
        self.0.iter().copied()
    }

    /// Parse the persisted space separated form. Empty segments are skipped.
    pub fn parse_space_separated(s: &str) -> Result<Self, UnknownEventKind> {
        s.split(' ')
            .filter(|segment| !segment.is_empty())
            .map(BotEventKind::from_str)
            .collect()
    }
}

impl fmt::Display for BotEventKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(kind.as_str())?;
            first = false;
        }
        Ok(())
    }
}

impl TryFrom<String> for BotEventKinds {
    type Error = UnknownEventKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_space_separated(&value)
    }
}

impl FromIterator<BotEventKind> for BotEventKinds {
    fn from_iter<I: IntoIterator<Item = BotEventKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[BotEventKind; N]> for BotEventKinds {
    fn from(kinds: [BotEventKind; N]) -> Self {
        kinds.into_iter().collect()
    }
}

/// Bot liveness state for API responses.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `botcast-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotState {
    Inactive,
    Active,
    Paused,
}

impl fmt::Display for BotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotState::Inactive => write!(f, "inactive"),
            BotState::Active => write!(f, "active"),
            BotState::Paused => write!(f, "paused"),
        }
    }
}
