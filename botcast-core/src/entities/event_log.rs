use crate::framework::DatabaseProcessor;
use botcast_sdk::objects::BotEventKind;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

/// One delivery attempt. Rows are never updated.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct BotEventLog {
    pub request_id: Uuid,
    pub bot_id: Uuid,
    #[sqlx(try_from = "String")]
    pub event: BotEventKind,
    /// Response body excerpt, at most the content limit plus one byte.
    pub body: Option<String>,
    pub error: Option<String>,
    /// HTTP status, or 0 when none was received.
    pub code: i32,
    /// Nanoseconds from just before the request to the outcome.
    pub latency: i64,
    pub date_time: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct InsertBotEventLog {
    pub log: BotEventLog,
}

impl Processor<InsertBotEventLog> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertBotEventLog")]
    async fn process(&self, insert: InsertBotEventLog) -> Result<(), sqlx::Error> {
        let log = insert.log;
        sqlx::query(
            r#"
            INSERT INTO bot_event_logs
                (request_id, bot_id, event, body, error, code, latency, date_time)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(log.request_id)
        .bind(log.bot_id)
        .bind(log.event.as_str())
        .bind(log.body)
        .bind(log.error)
        .bind(log.code)
        .bind(log.latency)
        .bind(log.date_time)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
/// Newest first. `None` means no limit.
pub struct ListBotEventLogs {
    pub bot_id: Uuid,
    pub limit: Option<i64>,
    pub offset: i64,
}

impl Processor<ListBotEventLogs> for DatabaseProcessor {
    type Output = Vec<BotEventLog>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListBotEventLogs")]
    async fn process(&self, query: ListBotEventLogs) -> Result<Vec<BotEventLog>, sqlx::Error> {
        sqlx::query_as::<_, BotEventLog>(
            r#"
            SELECT request_id, bot_id, event, body, error, code, latency, date_time
            FROM bot_event_logs
            WHERE bot_id = $1
            ORDER BY date_time DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(query.bot_id)
        .bind(query.limit)
        .bind(query.offset)
        .fetch_all(&self.pool)
        .await
    }
}
