//! In-memory storage for tests.

#![allow(clippy::unwrap_used)]

use super::{BotStore, EventLogStore, PlatformStore, StoreError};
use crate::entities::BotState;
use crate::entities::access_token::IssuedToken;
use crate::entities::bot::Bot;
use crate::entities::bot_channel::BotChannel;
use crate::entities::event_log::BotEventLog;
use crate::entities::platform::{Channel, NewShadowUser, Stamp, User};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    bots: HashMap<Uuid, Bot>,
    bot_channels: BTreeSet<(Uuid, Uuid)>,
    users: HashMap<Uuid, User>,
    channels: HashMap<Uuid, Channel>,
    channel_paths: HashMap<Uuid, String>,
    dm_members: HashMap<Uuid, Vec<Uuid>>,
    stamps: HashMap<Uuid, Stamp>,
    tokens: HashMap<Uuid, IssuedToken>,
    logs: Vec<BotEventLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Makes every platform read fail, to exercise handler error paths.
    pub fail_platform_reads: AtomicBool,
    /// Milliseconds every bot update and state write takes, like a slow
    /// database round trip.
    pub write_delay_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_user(&self, user: User) {
        self.tables.lock().unwrap().users.insert(user.id, user);
    }

    pub fn put_channel(&self, channel: Channel, path: &str) {
        let mut tables = self.tables.lock().unwrap();
        tables.channel_paths.insert(channel.id, path.to_string());
        tables.channels.insert(channel.id, channel);
    }

    pub fn put_dm_members(&self, channel_id: Uuid, members: Vec<Uuid>) {
        self.tables
            .lock()
            .unwrap()
            .dm_members
            .insert(channel_id, members);
    }

    pub fn put_stamp(&self, stamp: Stamp) {
        self.tables.lock().unwrap().stamps.insert(stamp.id, stamp);
    }

    pub fn put_bot(&self, bot: Bot) {
        self.tables.lock().unwrap().bots.insert(bot.id, bot);
    }

    pub fn put_bot_channel(&self, bot_id: Uuid, channel_id: Uuid) {
        self.tables
            .lock()
            .unwrap()
            .bot_channels
            .insert((bot_id, channel_id));
    }

    pub fn bot(&self, id: Uuid) -> Option<Bot> {
        self.tables.lock().unwrap().bots.get(&id).cloned()
    }

    pub fn user(&self, id: Uuid) -> Option<User> {
        self.tables.lock().unwrap().users.get(&id).cloned()
    }

    pub fn logs(&self) -> Vec<BotEventLog> {
        self.tables.lock().unwrap().logs.clone()
    }

    pub fn tokens_of(&self, user_id: Uuid) -> Vec<IssuedToken> {
        self.tables
            .lock()
            .unwrap()
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn memberships(&self) -> Vec<(Uuid, Uuid)> {
        self.tables
            .lock()
            .unwrap()
            .bot_channels
            .iter()
            .copied()
            .collect()
    }

    async fn write_latency(&self) {
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    fn check_platform(&self) -> Result<(), StoreError> {
        if self.fail_platform_reads.load(Ordering::SeqCst) {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl BotStore for MemoryStore {
    async fn list_bots(&self) -> Result<Vec<Bot>, StoreError> {
        Ok(self.tables.lock().unwrap().bots.values().cloned().collect())
    }

    async fn list_bot_channels(&self) -> Result<Vec<BotChannel>, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .bot_channels
            .iter()
            .map(|&(bot_id, channel_id)| BotChannel { bot_id, channel_id })
            .collect())
    }

    async fn create_bot(
        &self,
        bot: &Bot,
        user: &NewShadowUser,
        token: &IssuedToken,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.values().any(|u| u.name == user.name) {
            return Err(StoreError::Conflict);
        }
        tables.users.insert(
            user.id,
            User {
                id: user.id,
                name: user.name.clone(),
                display_name: user.display_name.clone(),
                icon_file_id: user.icon_file_id,
                bot: true,
                active: true,
            },
        );
        tables.tokens.insert(token.id, token.clone());
        tables.bots.insert(bot.id, bot.clone());
        Ok(())
    }

    async fn update_bot(&self, bot: &Bot, display_name: Option<&str>) -> Result<(), StoreError> {
        self.write_latency().await;
        let mut tables = self.tables.lock().unwrap();
        let stored = tables.bots.get_mut(&bot.id).ok_or(StoreError::NotFound)?;
        *stored = bot.clone();
        if let Some(name) = display_name
            && let Some(user) = tables.users.get_mut(&bot.bot_user_id)
        {
            user.display_name = name.to_string();
        }
        Ok(())
    }

    async fn set_bot_state(&self, bot_id: Uuid, state: BotState) -> Result<(), StoreError> {
        self.write_latency().await;
        let mut tables = self.tables.lock().unwrap();
        let stored = tables.bots.get_mut(&bot_id).ok_or(StoreError::NotFound)?;
        stored.state = state;
        Ok(())
    }

    async fn reissue_bot(&self, bot: &Bot, token: &IssuedToken) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let stored = tables.bots.get_mut(&bot.id).ok_or(StoreError::NotFound)?;
        stored.verification_token = bot.verification_token.clone();
        stored.bot_code = bot.bot_code.clone();
        stored.state = BotState::Paused;
        tables.tokens.retain(|_, t| t.user_id != bot.bot_user_id);
        tables.tokens.insert(token.id, token.clone());
        Ok(())
    }

    async fn delete_bot(&self, bot_id: Uuid, bot_user_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(user) = tables.users.get_mut(&bot_user_id) {
            user.active = false;
        }
        tables.bot_channels.retain(|(b, _)| *b != bot_id);
        tables.tokens.retain(|_, t| t.user_id != bot_user_id);
        tables
            .bots
            .remove(&bot_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn add_bot_channel(&self, bot_id: Uuid, channel_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .bot_channels
            .insert((bot_id, channel_id)))
    }

    async fn remove_bot_channel(
        &self,
        bot_id: Uuid,
        channel_id: Uuid,
    ) -> Result<bool, StoreError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .bot_channels
            .remove(&(bot_id, channel_id)))
    }
}

#[async_trait]
impl EventLogStore for MemoryStore {
    async fn append_event_log(&self, log: &BotEventLog) -> Result<(), StoreError> {
        self.tables.lock().unwrap().logs.push(log.clone());
        Ok(())
    }

    async fn list_event_logs(
        &self,
        bot_id: Uuid,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<BotEventLog>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let mut logs: Vec<_> = tables
            .logs
            .iter()
            .filter(|l| l.bot_id == bot_id)
            .cloned()
            .collect();
        logs.sort_by(|a, b| b.date_time.cmp(&a.date_time));
        let limit = limit.map_or(usize::MAX, |l| l as usize);
        Ok(logs
            .into_iter()
            .skip(offset as usize)
            .take(limit)
            .collect())
    }
}

#[async_trait]
impl PlatformStore for MemoryStore {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.check_platform()?;
        Ok(self.tables.lock().unwrap().users.get(&id).cloned())
    }

    async fn get_channel(&self, id: Uuid) -> Result<Option<Channel>, StoreError> {
        self.check_platform()?;
        Ok(self.tables.lock().unwrap().channels.get(&id).cloned())
    }

    async fn get_channel_path(&self, id: Uuid) -> Result<String, StoreError> {
        self.check_platform()?;
        self.tables
            .lock()
            .unwrap()
            .channel_paths
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_dm_channel_members(&self, channel_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        self.check_platform()?;
        Ok(self
            .tables
            .lock()
            .unwrap()
            .dm_members
            .get(&channel_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_stamp(&self, id: Uuid) -> Result<Option<Stamp>, StoreError> {
        self.check_platform()?;
        Ok(self.tables.lock().unwrap().stamps.get(&id).cloned())
    }
}
