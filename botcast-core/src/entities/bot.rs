use crate::entities::BotState;
use crate::entities::access_token::{IssuedToken, delete_tokens_of_user, insert_token};
use crate::entities::bot_channel::delete_channels_of_bot;
use crate::entities::platform::{
    NewShadowUser, deactivate_user, insert_shadow_user, update_display_name,
};
use crate::framework::{DatabaseAccessor, DatabaseProcessor};
use botcast_sdk::objects::BotEventKinds;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Bot {
    pub id: Uuid,
    pub bot_user_id: Uuid,
    pub description: String,
    pub verification_token: String,
    pub post_url: String,
    #[sqlx(try_from = "String")]
    pub subscribe_events: BotEventKinds,
    pub privileged: bool,
    pub state: BotState,
    pub bot_code: String,
    pub creator_id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const BOT_COLUMNS: &str = "id, bot_user_id, description, verification_token, post_url, \
    subscribe_events, privileged, state, bot_code, creator_id, created_at, updated_at";

#[derive(Debug, Clone)]
/// Every bot, for the registry warm start.
pub struct ListBots;

impl Processor<ListBots> for DatabaseProcessor {
    type Output = Vec<Bot>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListBots")]
    async fn process(&self, _query: ListBots) -> Result<Vec<Bot>, sqlx::Error> {
        sqlx::query_as::<_, Bot>(&format!("SELECT {BOT_COLUMNS} FROM bots ORDER BY created_at"))
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Create the shadow user, its access token and the bot in one transaction.
///
/// Fails with a unique violation when the shadow user name is taken.
pub struct CreateBot {
    pub bot: Bot,
    pub user: NewShadowUser,
    pub token: IssuedToken,
}

impl Processor<CreateBot> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CreateBot")]
    async fn process(&self, create: CreateBot) -> Result<(), sqlx::Error> {
        let CreateBot { bot, user, token } = create;
        let mut tx = self.begin().await?;
        insert_shadow_user(&mut tx, &user).await?;
        insert_token(&mut tx, &token).await?;
        insert_bot(&mut tx, &bot).await?;
        tx.commit().await
    }
}

async fn insert_bot(db: &mut impl DatabaseAccessor, bot: &Bot) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO bots ({BOT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
    ))
    .bind(bot.id)
    .bind(bot.bot_user_id)
    .bind(&bot.description)
    .bind(&bot.verification_token)
    .bind(&bot.post_url)
    .bind(bot.subscribe_events.to_string())
    .bind(bot.privileged)
    .bind(bot.state)
    .bind(&bot.bot_code)
    .bind(bot.creator_id)
    .bind(bot.created_at)
    .bind(bot.updated_at)
    .execute(db.acquire())
    .await?;
    Ok(())
}

#[derive(Debug, Clone)]
/// Persist the mutable attributes of a bot, and optionally the display name
/// of its shadow user.
pub struct UpdateBot {
    pub bot: Bot,
    pub display_name: Option<String>,
}

impl Processor<UpdateBot> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateBot")]
    async fn process(&self, update: UpdateBot) -> Result<u64, sqlx::Error> {
        let UpdateBot { bot, display_name } = update;
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE bots
            SET description = $2, post_url = $3, subscribe_events = $4,
                privileged = $5, state = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(bot.id)
        .bind(&bot.description)
        .bind(&bot.post_url)
        .bind(bot.subscribe_events.to_string())
        .bind(bot.privileged)
        .bind(bot.state)
        .bind(bot.updated_at)
        .execute(tx.acquire())
        .await?;
        if let Some(display_name) = display_name {
            update_display_name(&mut tx, bot.bot_user_id, &display_name).await?;
        }
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
pub struct SetBotState {
    pub id: Uuid,
    pub state: BotState,
}

impl Processor<SetBotState> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:SetBotState")]
    async fn process(&self, update: SetBotState) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE bots SET state = $2, updated_at = now() WHERE id = $1")
            .bind(update.id)
            .bind(update.state)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Replace the verification token and bot code, pause the bot, revoke the
/// old access tokens and store the new one.
pub struct ReissueBot {
    pub bot_id: Uuid,
    pub bot_user_id: Uuid,
    pub verification_token: String,
    pub bot_code: String,
    pub token: IssuedToken,
}

impl Processor<ReissueBot> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ReissueBot")]
    async fn process(&self, reissue: ReissueBot) -> Result<u64, sqlx::Error> {
        let mut tx = self.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE bots
            SET verification_token = $2, bot_code = $3, state = $4, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(reissue.bot_id)
        .bind(&reissue.verification_token)
        .bind(&reissue.bot_code)
        .bind(BotState::Paused)
        .execute(tx.acquire())
        .await?;
        delete_tokens_of_user(&mut tx, reissue.bot_user_id).await?;
        insert_token(&mut tx, &reissue.token).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
/// Deactivate the shadow user, clear memberships and tokens, then drop the
/// bot row.
pub struct DeleteBot {
    pub bot_id: Uuid,
    pub bot_user_id: Uuid,
}

impl Processor<DeleteBot> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteBot")]
    async fn process(&self, delete: DeleteBot) -> Result<u64, sqlx::Error> {
        let mut tx = self.begin().await?;
        deactivate_user(&mut tx, delete.bot_user_id).await?;
        delete_channels_of_bot(&mut tx, delete.bot_id).await?;
        delete_tokens_of_user(&mut tx, delete.bot_user_id).await?;
        let result = sqlx::query("DELETE FROM bots WHERE id = $1")
            .bind(delete.bot_id)
            .execute(tx.acquire())
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
