//! Bot liveness state machine.
//!
//! ```text
//!   create ──▶ inactive ──ping ok──▶ active ◀──ping ok── paused
//!                 │                    │                  ▲
//!                 └──────ping fail─────┴────ping fail─────┘
//! ```
//!
//! Only the outcome of a `PING` delivery moves a bot between states. A
//! failed delivery of any other kind is logged and nothing else: one bad
//! post does not disable a bot that answers its pings. Operators may set
//! any state directly; reissuing credentials always pauses.

use super::delivery::DeliveryReport;
use super::dispatcher::Dispatcher;
use super::registry::BotRegistry;
use crate::entities::BotState;
use crate::entities::bot::Bot;
use crate::store::StoreError;
use botcast_sdk::objects::{BotEventKind, EventPayload};
use botcast_sdk::objects::payload::Ping;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessTrigger {
    PingSucceeded,
    PingFailed,
    /// Explicit operator action.
    Admin(BotState),
    Reissued,
}

/// The state a bot in `current` moves to on `trigger`, or `None` when it
/// stays where it is.
pub fn transition(current: BotState, trigger: LivenessTrigger) -> Option<BotState> {
    let next = match trigger {
        LivenessTrigger::PingSucceeded => BotState::Active,
        LivenessTrigger::PingFailed => BotState::Paused,
        LivenessTrigger::Admin(state) => state,
        LivenessTrigger::Reissued => BotState::Paused,
    };
    (next != current).then_some(next)
}

/// The trigger a finished delivery raises. Only pings raise one.
pub fn delivery_trigger(kind: BotEventKind, success: bool) -> Option<LivenessTrigger> {
    match (kind, success) {
        (BotEventKind::Ping, true) => Some(LivenessTrigger::PingSucceeded),
        (BotEventKind::Ping, false) => Some(LivenessTrigger::PingFailed),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum LivenessError {
    #[error("bot not found")]
    NotFound,

    #[error("activation already in progress")]
    InProgress,

    #[error("failed to encode ping payload")]
    Encode,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct PingResult {
    pub report: DeliveryReport,
    /// The bot right after the outcome was applied.
    pub bot: Arc<Bot>,
}

/// Runs ping handshakes and applies their outcome.
pub struct Liveness {
    registry: Arc<BotRegistry>,
    dispatcher: Dispatcher,
    in_flight: Mutex<HashSet<Uuid>>,
}

/// Marks a bot as being pinged until dropped.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    bot_id: Uuid,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.bot_id);
    }
}

impl Liveness {
    pub fn new(registry: Arc<BotRegistry>, dispatcher: Dispatcher) -> Self {
        Self {
            registry,
            dispatcher,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Ping the bot and move it to `active` or `paused` accordingly.
    ///
    /// At most one ping per bot runs at a time; a second concurrent call
    /// fails with [`LivenessError::InProgress`] without sending anything.
    pub async fn ping(&self, bot_id: Uuid) -> Result<PingResult, LivenessError> {
        let _in_flight = self.begin(bot_id)?;
        let bot = self
            .registry
            .get(bot_id)
            .await
            .ok_or(LivenessError::NotFound)?;

        let report = self
            .dispatcher
            .unicast(&EventPayload::Ping(Ping {}), &bot)
            .await
            .ok_or(LivenessError::Encode)?;
        // The state may have moved while the ping was out, so the registry
        // applies the trigger to whatever is current.
        let bot = match delivery_trigger(report.kind, report.outcome.is_success()) {
            Some(trigger) => self.registry.apply(bot_id, trigger).await?,
            None => bot,
        };
        info!(
            bot_id = %bot_id,
            status = report.outcome.status_code(),
            state = %bot.state,
            "Bot ping handled"
        );
        Ok(PingResult { report, bot })
    }

    fn begin(&self, bot_id: Uuid) -> Result<InFlight<'_>, LivenessError> {
        let mut set = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !set.insert(bot_id) {
            return Err(LivenessError::InProgress);
        }
        Ok(InFlight {
            set: &self.in_flight,
            bot_id,
        })
    }
}
