//! Bot event dispatch.
//!
//! A platform event flows through these pieces in order:
//!
//! 1. [`ingress::BotIngress`] receives it from the event bus and hands it to
//!    the matching [`handlers::BotEventHandlers`] processor.
//! 2. [`resolver::TargetResolver`] picks the target bots from the
//!    [`registry::BotRegistry`] through [`filter::BotFilter`] chains.
//! 3. [`dispatcher::Dispatcher`] encodes the payload once with
//!    [`codec::PayloadCodec`] and fans it out over [`delivery::HttpDelivery`].
//! 4. Every delivery is recorded in the [`event_log::EventLog`]; ping
//!    outcomes additionally drive [`liveness`].
//!
//! Administrative changes go through [`service::BotService`], which keeps the
//! registry and storage in step.

pub mod codec;
pub mod delivery;
pub mod dispatcher;
pub mod event_log;
pub mod filter;
pub mod handlers;
pub mod ingress;
pub mod liveness;
pub mod registry;
pub mod resolver;
pub mod service;

pub use codec::{CodecError, EncodedPayload, PayloadCodec};
pub use delivery::{DeliveryConfig, DeliveryOutcome, DeliveryReport, HttpDelivery};
pub use dispatcher::Dispatcher;
pub use event_log::EventLog;
pub use filter::BotFilter;
pub use handlers::{BotEventHandlers, HandlerError};
pub use ingress::BotIngress;
pub use liveness::{Liveness, LivenessTrigger};
pub use registry::{BotRegistry, RegistryChange};
pub use resolver::TargetResolver;
pub use service::{
    BotCredentials, BotError, BotPolicy, BotService, CreateBotRequest, UpdateBotRequest,
};

#[cfg(test)]
pub(crate) mod tests {
    use crate::entities::BotState;
    use crate::entities::bot::Bot;
    use botcast_sdk::objects::{BotEventKind, BotEventKinds};
    use time::OffsetDateTime;
    use uuid::Uuid;

    /// Shadow user id of [`bot_fixture`]`(n)`.
    pub fn bot_user_of(n: u128) -> Uuid {
        Uuid::from_u128(0x1000 + n)
    }

    /// An active bot subscribed to every kind, with ids derived from `n`.
    pub fn bot_fixture(n: u128) -> Bot {
        let created_at = OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(n as i64);
        Bot {
            id: Uuid::from_u128(n),
            bot_user_id: bot_user_of(n),
            description: format!("bot {n}"),
            verification_token: format!("token-{n}"),
            post_url: format!("http://bot-{n}.invalid/"),
            subscribe_events: BotEventKind::ALL.into_iter().collect::<BotEventKinds>(),
            privileged: false,
            state: BotState::Active,
            bot_code: format!("code-{n}"),
            creator_id: Uuid::from_u128(0xC0DE),
            created_at,
            updated_at: created_at,
        }
    }
}
