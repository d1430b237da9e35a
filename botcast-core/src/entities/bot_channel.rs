use crate::framework::{DatabaseAccessor, DatabaseProcessor};
use kanau::processor::Processor;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct BotChannel {
    pub bot_id: Uuid,
    pub channel_id: Uuid,
}

#[derive(Debug, Clone)]
/// Every membership row, for the registry warm start.
pub struct ListBotChannels;

impl Processor<ListBotChannels> for DatabaseProcessor {
    type Output = Vec<BotChannel>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListBotChannels")]
    async fn process(&self, _query: ListBotChannels) -> Result<Vec<BotChannel>, sqlx::Error> {
        sqlx::query_as::<_, BotChannel>("SELECT bot_id, channel_id FROM bots_user_channels")
            .fetch_all(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
/// Returns the number of inserted rows; 0 when the bot was already a member.
pub struct InsertBotChannel {
    pub bot_id: Uuid,
    pub channel_id: Uuid,
}

impl Processor<InsertBotChannel> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertBotChannel")]
    async fn process(&self, insert: InsertBotChannel) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO bots_user_channels (bot_id, channel_id)
            VALUES ($1, $2)
            ON CONFLICT (bot_id, channel_id) DO NOTHING
            "#,
        )
        .bind(insert.bot_id)
        .bind(insert.channel_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, Clone)]
pub struct DeleteBotChannel {
    pub bot_id: Uuid,
    pub channel_id: Uuid,
}

impl Processor<DeleteBotChannel> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteBotChannel")]
    async fn process(&self, delete: DeleteBotChannel) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM bots_user_channels WHERE bot_id = $1 AND channel_id = $2")
                .bind(delete.bot_id)
                .bind(delete.channel_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

pub(crate) async fn delete_channels_of_bot(
    db: &mut impl DatabaseAccessor,
    bot_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM bots_user_channels WHERE bot_id = $1")
        .bind(bot_id)
        .execute(db.acquire())
        .await?;
    Ok(result.rows_affected())
}
