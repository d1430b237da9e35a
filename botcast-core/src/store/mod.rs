//! Storage seams of the dispatch core.
//!
//! The registry, the ingress handlers and the admin operations only talk to
//! storage through these traits. [`PgStore`] is the Postgres implementation
//! built from the query processors in [`crate::entities`].

mod postgres;

#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use postgres::PgStore;

use crate::entities::BotState;
use crate::entities::access_token::IssuedToken;
use crate::entities::bot::Bot;
use crate::entities::bot_channel::BotChannel;
use crate::entities::event_log::BotEventLog;
use crate::entities::platform::{Channel, NewShadowUser, Stamp, User};
use async_trait::async_trait;
use rand::Rng;
use rand::distr::Alphanumeric;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// A unique constraint rejected the write.
    #[error("record already exists")]
    Conflict,

    #[error("record not found")]
    NotFound,
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Database(e),
        }
    }
}

/// Durable form of bots and their channel memberships.
#[async_trait]
pub trait BotStore: Send + Sync {
    async fn list_bots(&self) -> Result<Vec<Bot>, StoreError>;

    async fn list_bot_channels(&self) -> Result<Vec<BotChannel>, StoreError>;

    /// Shadow user, access token and bot are written atomically.
    async fn create_bot(
        &self,
        bot: &Bot,
        user: &NewShadowUser,
        token: &IssuedToken,
    ) -> Result<(), StoreError>;

    async fn update_bot(&self, bot: &Bot, display_name: Option<&str>) -> Result<(), StoreError>;

    async fn set_bot_state(&self, bot_id: Uuid, state: BotState) -> Result<(), StoreError>;

    /// Stores the new verification token and bot code of `bot`, pauses it and
    /// swaps its access tokens for `token`.
    async fn reissue_bot(&self, bot: &Bot, token: &IssuedToken) -> Result<(), StoreError>;

    async fn delete_bot(&self, bot_id: Uuid, bot_user_id: Uuid) -> Result<(), StoreError>;

    /// Returns false when the bot already was a member.
    async fn add_bot_channel(&self, bot_id: Uuid, channel_id: Uuid) -> Result<bool, StoreError>;

    /// Returns false when the bot was not a member.
    async fn remove_bot_channel(&self, bot_id: Uuid, channel_id: Uuid)
    -> Result<bool, StoreError>;
}

#[async_trait]
pub trait EventLogStore: Send + Sync {
    async fn append_event_log(&self, log: &BotEventLog) -> Result<(), StoreError>;

    /// Newest first. `limit: None` returns everything after `offset`.
    async fn list_event_logs(
        &self,
        bot_id: Uuid,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<BotEventLog>, StoreError>;
}

/// Read-only view of platform users, channels and stamps.
#[async_trait]
pub trait PlatformStore: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>, StoreError>;

    /// Path without the leading `#`.
    async fn get_channel_path(&self, id: Uuid) -> Result<String, StoreError>;

    async fn get_dm_channel_members(&self, channel_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    async fn get_stamp(&self, id: Uuid) -> Result<Option<Stamp>, StoreError>;
}

/// Mints access credentials for bot shadow users.
pub trait TokenIssuer: Send + Sync {
    fn issue_token(&self, user_id: Uuid, scopes: &[&str], expires_in: i32) -> IssuedToken;
}

/// Issues opaque random bearer tokens.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomTokenIssuer;

impl TokenIssuer for RandomTokenIssuer {
    fn issue_token(&self, user_id: Uuid, scopes: &[&str], expires_in: i32) -> IssuedToken {
        let access_token = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(36)
            .map(char::from)
            .collect();
        IssuedToken {
            id: Uuid::now_v7(),
            user_id,
            access_token,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            expires_in,
            created_at: time::OffsetDateTime::now_utc(),
        }
    }
}

/// Produces the icon file of a new bot shadow user.
#[async_trait]
pub trait IconGenerator: Send + Sync {
    async fn generate(&self, salt: &str) -> Result<Uuid, StoreError>;
}

/// Hands out one preconfigured icon file to every bot.
#[derive(Debug, Clone, Copy)]
pub struct StaticIcon(pub Uuid);

#[async_trait]
impl IconGenerator for StaticIcon {
    async fn generate(&self, _salt: &str) -> Result<Uuid, StoreError> {
        Ok(self.0)
    }
}
