//! Targeting predicates over bot snapshots.

use crate::entities::BotState;
use crate::entities::bot::Bot;
use botcast_sdk::objects::BotEventKind;
use std::sync::Arc;
use uuid::Uuid;

/// One predicate of a filter chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotFilter {
    /// Liveness state equals the given one.
    State(BotState),
    /// Bot may see platform wide events.
    Privileged,
    /// The event kind is in the bot's subscriptions.
    SubscribesTo(BotEventKind),
    /// Excludes the bot whose shadow user is the given user.
    BotUserIdNot(Uuid),
}

impl BotFilter {
    pub fn matches(&self, bot: &Bot) -> bool {
        match *self {
            BotFilter::State(state) => bot.state == state,
            BotFilter::Privileged => bot.privileged,
            BotFilter::SubscribesTo(kind) => bot.subscribe_events.contains(kind),
            BotFilter::BotUserIdNot(user_id) => bot.bot_user_id != user_id,
        }
    }
}

/// True when every predicate holds. Stops at the first failing one.
pub fn matches_all(bot: &Bot, filters: &[BotFilter]) -> bool {
    filters.iter().all(|f| f.matches(bot))
}

/// The subset of `bots` passing every filter, in input order.
pub fn filter_bots(bots: Vec<Arc<Bot>>, filters: &[BotFilter]) -> Vec<Arc<Bot>> {
    bots.into_iter()
        .filter(|bot| matches_all(bot, filters))
        .collect()
}
