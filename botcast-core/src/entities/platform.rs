//! Read models of the messaging platform.
//!
//! Users, channels and stamps are owned by the platform; the dispatch core
//! only reads them to fill outgoing payloads. The one exception is the bot
//! shadow user, which is created and deactivated together with its bot.

use crate::framework::{DatabaseAccessor, DatabaseProcessor};
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

/// Role assigned to every bot shadow user.
pub const BOT_ROLE: &str = "bot";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub icon_file_id: Uuid,
    pub bot: bool,
    pub active: bool,
}

impl User {
    /// Name shown to other users; falls back to the login name.
    pub fn response_display_name(&self) -> &str {
        if self.display_name.is_empty() {
            &self.name
        } else {
            &self.display_name
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub creator_id: Option<Uuid>,
    pub topic: String,
    pub is_public: bool,
    pub is_dm: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Stamp {
    pub id: Uuid,
    pub name: String,
    pub file_id: Uuid,
    /// Nil for system stamps.
    pub creator_id: Uuid,
}

/// A posted message, as carried on the event bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub user_id: Uuid,
    pub channel_id: Uuid,
    pub text: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct GetUser {
    pub id: Uuid,
}

impl Processor<GetUser> for DatabaseProcessor {
    type Output = Option<User>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetUser")]
    async fn process(&self, query: GetUser) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, name, display_name, icon_file_id, bot, active
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetChannel {
    pub id: Uuid,
}

impl Processor<GetChannel> for DatabaseProcessor {
    type Output = Option<Channel>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetChannel")]
    async fn process(&self, query: GetChannel) -> Result<Option<Channel>, sqlx::Error> {
        sqlx::query_as::<_, Channel>(
            r#"
            SELECT id, name, parent_id, creator_id, topic, is_public, is_dm, created_at, updated_at
            FROM channels
            WHERE id = $1
            "#,
        )
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Slash separated names from the root channel down to this one, without
/// the leading `#`.
pub struct GetChannelPath {
    pub id: Uuid,
}

impl Processor<GetChannelPath> for DatabaseProcessor {
    type Output = Option<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetChannelPath")]
    async fn process(&self, query: GetChannelPath) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, Option<String>>(
            r#"
            WITH RECURSIVE ancestors AS (
                SELECT id, name, parent_id, 0 AS depth
                FROM channels
                WHERE id = $1
                UNION ALL
                SELECT c.id, c.name, c.parent_id, a.depth + 1
                FROM channels c
                JOIN ancestors a ON c.id = a.parent_id
            )
            SELECT string_agg(name, '/' ORDER BY depth DESC)
            FROM ancestors
            "#,
        )
        .bind(query.id)
        .fetch_one(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetDmChannelMembers {
    pub channel_id: Uuid,
}

impl Processor<GetDmChannelMembers> for DatabaseProcessor {
    type Output = Vec<Uuid>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetDmChannelMembers")]
    async fn process(&self, query: GetDmChannelMembers) -> Result<Vec<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT user_id FROM dm_channel_members
            WHERE channel_id = $1
            ORDER BY user_id
            "#,
        )
        .bind(query.channel_id)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct GetStamp {
    pub id: Uuid,
}

impl Processor<GetStamp> for DatabaseProcessor {
    type Output = Option<Stamp>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetStamp")]
    async fn process(&self, query: GetStamp) -> Result<Option<Stamp>, sqlx::Error> {
        sqlx::query_as::<_, Stamp>(
            r#"
            SELECT id, name, file_id, creator_id
            FROM stamps
            WHERE id = $1
            "#,
        )
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await
    }
}

/// Shadow user row written together with a new bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewShadowUser {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub icon_file_id: Uuid,
}

pub(crate) async fn insert_shadow_user(
    db: &mut impl DatabaseAccessor,
    user: &NewShadowUser,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (id, name, display_name, icon_file_id, bot, active, role)
        VALUES ($1, $2, $3, $4, TRUE, TRUE, $5)
        "#,
    )
    .bind(user.id)
    .bind(&user.name)
    .bind(&user.display_name)
    .bind(user.icon_file_id)
    .bind(BOT_ROLE)
    .execute(db.acquire())
    .await?;
    Ok(())
}

pub(crate) async fn update_display_name(
    db: &mut impl DatabaseAccessor,
    user_id: Uuid,
    display_name: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET display_name = $2 WHERE id = $1")
        .bind(user_id)
        .bind(display_name)
        .execute(db.acquire())
        .await?;
    Ok(())
}

pub(crate) async fn deactivate_user(
    db: &mut impl DatabaseAccessor,
    user_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
        .bind(user_id)
        .execute(db.acquire())
        .await?;
    Ok(())
}
