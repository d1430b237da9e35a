//! Event channel factories and handles.
//!
//! Every bus event name is its own bounded mpsc channel. Publishers hold an
//! [`EventSenders`]; the ingress loop owns the matching [`EventReceivers`].

use super::types::{
    BotJoined, BotLeft, BotPingRequest, ChannelCreated, ChannelTopicUpdated, MessageCreated,
    StampCreated, UserCreated,
};
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// This provides enough buffer to handle bursts while keeping memory bounded.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

pub type BotJoinedSender = mpsc::Sender<BotJoined>;
pub type BotJoinedReceiver = mpsc::Receiver<BotJoined>;

pub type BotLeftSender = mpsc::Sender<BotLeft>;
pub type BotLeftReceiver = mpsc::Receiver<BotLeft>;

pub type BotPingRequestSender = mpsc::Sender<BotPingRequest>;
pub type BotPingRequestReceiver = mpsc::Receiver<BotPingRequest>;

pub type MessageCreatedSender = mpsc::Sender<MessageCreated>;
pub type MessageCreatedReceiver = mpsc::Receiver<MessageCreated>;

pub type UserCreatedSender = mpsc::Sender<UserCreated>;
pub type UserCreatedReceiver = mpsc::Receiver<UserCreated>;

pub type ChannelCreatedSender = mpsc::Sender<ChannelCreated>;
pub type ChannelCreatedReceiver = mpsc::Receiver<ChannelCreated>;

pub type ChannelTopicUpdatedSender = mpsc::Sender<ChannelTopicUpdated>;
pub type ChannelTopicUpdatedReceiver = mpsc::Receiver<ChannelTopicUpdated>;

pub type StampCreatedSender = mpsc::Sender<StampCreated>;
pub type StampCreatedReceiver = mpsc::Receiver<StampCreated>;

/// Sender half of every bus topic.
///
/// Cloning is cheap; every field is an mpsc sender.
#[derive(Clone)]
pub struct EventSenders {
    pub bot_joined: BotJoinedSender,
    pub bot_left: BotLeftSender,
    pub bot_ping_request: BotPingRequestSender,
    pub message_created: MessageCreatedSender,
    pub user_created: UserCreatedSender,
    pub channel_created: ChannelCreatedSender,
    pub channel_topic_updated: ChannelTopicUpdatedSender,
    pub stamp_created: StampCreatedSender,
}

/// Receiver half of every bus topic, consumed by the ingress loop.
pub struct EventReceivers {
    pub bot_joined: BotJoinedReceiver,
    pub bot_left: BotLeftReceiver,
    pub bot_ping_request: BotPingRequestReceiver,
    pub message_created: MessageCreatedReceiver,
    pub user_created: UserCreatedReceiver,
    pub channel_created: ChannelCreatedReceiver,
    pub channel_topic_updated: ChannelTopicUpdatedReceiver,
    pub stamp_created: StampCreatedReceiver,
}

/// Create one channel per bus topic with [`DEFAULT_CHANNEL_BUFFER`] slots each.
pub fn event_bus() -> (EventSenders, EventReceivers) {
    let (bot_joined_tx, bot_joined_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
    let (bot_left_tx, bot_left_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
    let (ping_tx, ping_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
    let (message_tx, message_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
    let (user_tx, user_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
    let (channel_tx, channel_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
    let (topic_tx, topic_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
    let (stamp_tx, stamp_rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);

    (
        EventSenders {
            bot_joined: bot_joined_tx,
            bot_left: bot_left_tx,
            bot_ping_request: ping_tx,
            message_created: message_tx,
            user_created: user_tx,
            channel_created: channel_tx,
            channel_topic_updated: topic_tx,
            stamp_created: stamp_tx,
        },
        EventReceivers {
            bot_joined: bot_joined_rx,
            bot_left: bot_left_rx,
            bot_ping_request: ping_rx,
            message_created: message_rx,
            user_created: user_rx,
            channel_created: channel_rx,
            channel_topic_updated: topic_rx,
            stamp_created: stamp_rx,
        },
    )
}
