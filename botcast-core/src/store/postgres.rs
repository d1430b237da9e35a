use super::{BotStore, EventLogStore, PlatformStore, StoreError};
use crate::entities::BotState;
use crate::entities::access_token::IssuedToken;
use crate::entities::bot::{Bot, CreateBot, DeleteBot, ListBots, ReissueBot, SetBotState, UpdateBot};
use crate::entities::bot_channel::{BotChannel, DeleteBotChannel, InsertBotChannel, ListBotChannels};
use crate::entities::event_log::{BotEventLog, InsertBotEventLog, ListBotEventLogs};
use crate::entities::platform::{
    Channel, GetChannel, GetChannelPath, GetDmChannelMembers, GetStamp, GetUser, NewShadowUser,
    Stamp, User,
};
use crate::framework::DatabaseProcessor;
use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;
use uuid::Uuid;

/// Every storage seam backed by one Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    db: DatabaseProcessor,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }
}

fn expect_one(rows: u64) -> Result<(), StoreError> {
    if rows == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl BotStore for PgStore {
    async fn list_bots(&self) -> Result<Vec<Bot>, StoreError> {
        Ok(self.db.process(ListBots).await?)
    }

    async fn list_bot_channels(&self) -> Result<Vec<BotChannel>, StoreError> {
        Ok(self.db.process(ListBotChannels).await?)
    }

    async fn create_bot(
        &self,
        bot: &Bot,
        user: &NewShadowUser,
        token: &IssuedToken,
    ) -> Result<(), StoreError> {
        self.db
            .process(CreateBot {
                bot: bot.clone(),
                user: user.clone(),
                token: token.clone(),
            })
            .await?;
        Ok(())
    }

    async fn update_bot(&self, bot: &Bot, display_name: Option<&str>) -> Result<(), StoreError> {
        let rows = self
            .db
            .process(UpdateBot {
                bot: bot.clone(),
                display_name: display_name.map(str::to_owned),
            })
            .await?;
        expect_one(rows)
    }

    async fn set_bot_state(&self, bot_id: Uuid, state: BotState) -> Result<(), StoreError> {
        let rows = self.db.process(SetBotState { id: bot_id, state }).await?;
        expect_one(rows)
    }

    async fn reissue_bot(&self, bot: &Bot, token: &IssuedToken) -> Result<(), StoreError> {
        let rows = self
            .db
            .process(ReissueBot {
                bot_id: bot.id,
                bot_user_id: bot.bot_user_id,
                verification_token: bot.verification_token.clone(),
                bot_code: bot.bot_code.clone(),
                token: token.clone(),
            })
            .await?;
        expect_one(rows)
    }

    async fn delete_bot(&self, bot_id: Uuid, bot_user_id: Uuid) -> Result<(), StoreError> {
        let rows = self.db.process(DeleteBot { bot_id, bot_user_id }).await?;
        expect_one(rows)
    }

    async fn add_bot_channel(&self, bot_id: Uuid, channel_id: Uuid) -> Result<bool, StoreError> {
        let rows = self
            .db
            .process(InsertBotChannel { bot_id, channel_id })
            .await?;
        Ok(rows > 0)
    }

    async fn remove_bot_channel(
        &self,
        bot_id: Uuid,
        channel_id: Uuid,
    ) -> Result<bool, StoreError> {
        let rows = self
            .db
            .process(DeleteBotChannel { bot_id, channel_id })
            .await?;
        Ok(rows > 0)
    }
}

#[async_trait]
impl EventLogStore for PgStore {
    async fn append_event_log(&self, log: &BotEventLog) -> Result<(), StoreError> {
        self.db
            .process(InsertBotEventLog { log: log.clone() })
            .await?;
        Ok(())
    }

    async fn list_event_logs(
        &self,
        bot_id: Uuid,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<BotEventLog>, StoreError> {
        Ok(self
            .db
            .process(ListBotEventLogs {
                bot_id,
                limit,
                offset,
            })
            .await?)
    }
}

#[async_trait]
impl PlatformStore for PgStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.db.process(GetUser { id }).await?)
    }

    async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>, StoreError> {
        Ok(self.db.process(GetChannel { id }).await?)
    }

    async fn get_channel_path(&self, id: Uuid) -> Result<String, StoreError> {
        self.db
            .process(GetChannelPath { id })
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn get_dm_channel_members(&self, channel_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        Ok(self.db.process(GetDmChannelMembers { channel_id }).await?)
    }

    async fn get_stamp(&self, id: Uuid) -> Result<Option<Stamp>, StoreError> {
        Ok(self.db.process(GetStamp { id }).await?)
    }
}
