//! In-memory registry of bots and their channel memberships.
//!
//! Three indexes are kept, each behind its own `RwLock`:
//!
//! | Index | Key | Value |
//! |---|---|---|
//! | `by_id` | bot id | bot snapshot |
//! | `by_bot_user_id` | shadow user id | bot snapshot |
//! | `by_channel` | channel id | ids of member bots |
//!
//! Locks are always taken in the order of the table, by readers and writers
//! alike. Bot snapshots are immutable `Arc<Bot>`s; a mutation replaces the
//! snapshot instead of editing it, so a dispatch keeps a consistent view of
//! every bot it resolved.
//!
//! Every mutation commits to storage first, then swaps all indexes while
//! holding all three write locks, then publishes a [`RegistryChange`].
//! Mutations are serialized by a write gate so the storage order and the
//! index order agree.

use super::liveness::{LivenessTrigger, transition};
use crate::entities::BotState;
use crate::entities::access_token::IssuedToken;
use crate::entities::bot::Bot;
use crate::entities::platform::NewShadowUser;
use crate::events::{BotJoined, BotLeft, EventSenders};
use crate::store::{BotStore, StoreError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockWriteGuard, broadcast};
use tracing::{error, info, warn};
use uuid::Uuid;

const CHANGE_BUFFER: usize = 256;

/// Published after every committed registry mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryChange {
    Created { bot_id: Uuid },
    Updated { bot_id: Uuid },
    StateChanged {
        bot_id: Uuid,
        from: BotState,
        to: BotState,
    },
    Joined { bot_id: Uuid, channel_id: Uuid },
    Left { bot_id: Uuid, channel_id: Uuid },
    Deleted { bot_id: Uuid },
}

type BotIndex = HashMap<Uuid, Arc<Bot>>;
type ChannelIndex = HashMap<Uuid, HashSet<Uuid>>;

pub struct BotRegistry {
    store: Arc<dyn BotStore>,
    bus: EventSenders,
    by_id: RwLock<BotIndex>,
    by_bot_user_id: RwLock<BotIndex>,
    by_channel: RwLock<ChannelIndex>,
    write_gate: Mutex<()>,
    changes: broadcast::Sender<RegistryChange>,
}

/// All three indexes, write locked in order.
struct Indexes<'a> {
    by_id: RwLockWriteGuard<'a, BotIndex>,
    by_bot_user_id: RwLockWriteGuard<'a, BotIndex>,
    by_channel: RwLockWriteGuard<'a, ChannelIndex>,
}

impl Indexes<'_> {
    fn put(&mut self, bot: Arc<Bot>) {
        self.by_bot_user_id.insert(bot.bot_user_id, bot.clone());
        self.by_id.insert(bot.id, bot);
    }

    fn remove(&mut self, bot: &Bot) {
        self.by_id.remove(&bot.id);
        self.by_bot_user_id.remove(&bot.bot_user_id);
        self.by_channel.retain(|_, members| {
            members.remove(&bot.id);
            !members.is_empty()
        });
    }
}

fn sort_bots(bots: &mut [Arc<Bot>]) {
    bots.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
}

impl BotRegistry {
    /// An empty registry. Call [`BotRegistry::load`] before serving.
    pub fn new(store: Arc<dyn BotStore>, bus: EventSenders) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            store,
            bus,
            by_id: RwLock::new(HashMap::new()),
            by_bot_user_id: RwLock::new(HashMap::new()),
            by_channel: RwLock::new(HashMap::new()),
            write_gate: Mutex::new(()),
            changes,
        }
    }

    /// Replace the indexes with the current contents of storage.
    pub async fn load(&self) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        let bots = self.store.list_bots().await?;
        let memberships = self.store.list_bot_channels().await?;

        let mut indexes = self.lock_all().await;
        indexes.by_id.clear();
        indexes.by_bot_user_id.clear();
        indexes.by_channel.clear();

        let bot_count = bots.len();
        for bot in bots {
            indexes.put(Arc::new(bot));
        }
        let mut membership_count = 0usize;
        for membership in memberships {
            if !indexes.by_id.contains_key(&membership.bot_id) {
                warn!(
                    bot_id = %membership.bot_id,
                    channel_id = %membership.channel_id,
                    "Skipping channel membership of unknown bot"
                );
                continue;
            }
            indexes
                .by_channel
                .entry(membership.channel_id)
                .or_default()
                .insert(membership.bot_id);
            membership_count += 1;
        }
        info!(
            bots = bot_count,
            memberships = membership_count,
            "Bot registry loaded"
        );
        Ok(())
    }

    /// Sending half of the event bus. Platform services publish their events
    /// here for the ingress loop to deliver to bots.
    pub fn events(&self) -> &EventSenders {
        &self.bus
    }

    /// Subscribe to committed changes.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.changes.subscribe()
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Bot>> {
        self.by_id.read().await.get(&id).cloned()
    }

    pub async fn get_by_bot_user_id(&self, bot_user_id: Uuid) -> Option<Arc<Bot>> {
        self.by_bot_user_id.read().await.get(&bot_user_id).cloned()
    }

    pub async fn get_by_code(&self, code: &str) -> Option<Arc<Bot>> {
        self.by_id
            .read()
            .await
            .values()
            .find(|bot| bot.bot_code == code)
            .cloned()
    }

    pub async fn list_by_creator(&self, creator_id: Uuid) -> Vec<Arc<Bot>> {
        let mut bots: Vec<_> = self
            .by_id
            .read()
            .await
            .values()
            .filter(|bot| bot.creator_id == creator_id)
            .cloned()
            .collect();
        sort_bots(&mut bots);
        bots
    }

    /// Every bot, oldest first.
    pub async fn all(&self) -> Vec<Arc<Bot>> {
        let mut bots: Vec<_> = self.by_id.read().await.values().cloned().collect();
        sort_bots(&mut bots);
        bots
    }

    /// Member bots of a channel, oldest first.
    pub async fn in_channel(&self, channel_id: Uuid) -> Vec<Arc<Bot>> {
        let by_id = self.by_id.read().await;
        let by_channel = self.by_channel.read().await;
        let Some(members) = by_channel.get(&channel_id) else {
            return Vec::new();
        };
        let mut bots: Vec<_> = members
            .iter()
            .filter_map(|id| by_id.get(id).cloned())
            .collect();
        sort_bots(&mut bots);
        bots
    }

    /// Channels the bot participates in, sorted.
    pub async fn channels_of(&self, bot_id: Uuid) -> Vec<Uuid> {
        let mut channels: Vec<_> = self
            .by_channel
            .read()
            .await
            .iter()
            .filter(|(_, members)| members.contains(&bot_id))
            .map(|(channel_id, _)| *channel_id)
            .collect();
        channels.sort();
        channels
    }

    pub async fn insert(
        &self,
        bot: Bot,
        user: &NewShadowUser,
        token: &IssuedToken,
    ) -> Result<Arc<Bot>, StoreError> {
        let _gate = self.write_gate.lock().await;
        self.store.create_bot(&bot, user, token).await?;

        let bot = Arc::new(bot);
        self.lock_all().await.put(bot.clone());
        info!(bot_id = %bot.id, bot_user_id = %bot.bot_user_id, "Bot created");
        self.publish(RegistryChange::Created { bot_id: bot.id });
        Ok(bot)
    }

    /// Apply `edit` to the current snapshot and persist the result. The
    /// edit runs under the write gate, so it never works on a stale bot.
    /// It must not change the id or the shadow user id.
    pub async fn update<F>(
        &self,
        bot_id: Uuid,
        display_name: Option<&str>,
        edit: F,
    ) -> Result<Arc<Bot>, StoreError>
    where
        F: FnOnce(&Bot) -> Bot,
    {
        let _gate = self.write_gate.lock().await;
        let previous = self.get(bot_id).await.ok_or(StoreError::NotFound)?;
        let bot = Bot {
            id: previous.id,
            bot_user_id: previous.bot_user_id,
            updated_at: time::OffsetDateTime::now_utc(),
            ..edit(previous.as_ref())
        };
        self.store.update_bot(&bot, display_name).await?;

        let bot = Arc::new(bot);
        self.lock_all().await.put(bot.clone());
        info!(bot_id = %bot.id, "Bot updated");
        self.publish(RegistryChange::Updated { bot_id: bot.id });
        if previous.state != bot.state {
            self.publish(RegistryChange::StateChanged {
                bot_id: bot.id,
                from: previous.state,
                to: bot.state,
            });
        }
        Ok(bot)
    }

    /// Set the liveness state on operator request.
    pub async fn set_state(&self, bot_id: Uuid, state: BotState) -> Result<Arc<Bot>, StoreError> {
        self.apply(bot_id, LivenessTrigger::Admin(state)).await
    }

    /// Move the bot along the liveness state machine from its current state.
    /// A trigger that leaves the state unchanged touches neither storage nor
    /// subscribers.
    pub async fn apply(
        &self,
        bot_id: Uuid,
        trigger: LivenessTrigger,
    ) -> Result<Arc<Bot>, StoreError> {
        let _gate = self.write_gate.lock().await;
        let previous = self.get(bot_id).await.ok_or(StoreError::NotFound)?;
        let Some(state) = transition(previous.state, trigger) else {
            return Ok(previous);
        };
        self.store.set_bot_state(bot_id, state).await?;

        let bot = Arc::new(Bot {
            state,
            updated_at: time::OffsetDateTime::now_utc(),
            ..(*previous).clone()
        });
        self.lock_all().await.put(bot.clone());
        info!(bot_id = %bot_id, from = %previous.state, to = %state, "Bot state changed");
        self.publish(RegistryChange::StateChanged {
            bot_id,
            from: previous.state,
            to: state,
        });
        Ok(bot)
    }

    /// Store new credentials. The bot ends up paused.
    pub async fn reissue(
        &self,
        bot_id: Uuid,
        verification_token: String,
        bot_code: String,
        token: &IssuedToken,
    ) -> Result<Arc<Bot>, StoreError> {
        let _gate = self.write_gate.lock().await;
        let previous = self.get(bot_id).await.ok_or(StoreError::NotFound)?;
        let next_state = transition(previous.state, LivenessTrigger::Reissued);
        let bot = Bot {
            verification_token,
            bot_code,
            state: next_state.unwrap_or(previous.state),
            updated_at: time::OffsetDateTime::now_utc(),
            ..(*previous).clone()
        };
        self.store.reissue_bot(&bot, token).await?;

        let bot = Arc::new(bot);
        self.lock_all().await.put(bot.clone());
        info!(bot_id = %bot_id, "Bot credentials reissued");
        self.publish(RegistryChange::Updated { bot_id });
        if let Some(to) = next_state {
            self.publish(RegistryChange::StateChanged {
                bot_id,
                from: previous.state,
                to,
            });
        }
        Ok(bot)
    }

    pub async fn delete(&self, bot_id: Uuid) -> Result<(), StoreError> {
        let _gate = self.write_gate.lock().await;
        let bot = self.get(bot_id).await.ok_or(StoreError::NotFound)?;
        self.store.delete_bot(bot.id, bot.bot_user_id).await?;

        self.lock_all().await.remove(&bot);
        info!(bot_id = %bot_id, "Bot deleted");
        self.publish(RegistryChange::Deleted { bot_id });
        Ok(())
    }

    /// Add the bot to a channel. Returns false when it already was a member;
    /// only an actual join notifies the bot.
    pub async fn join(&self, bot_id: Uuid, channel_id: Uuid) -> Result<bool, StoreError> {
        {
            let _gate = self.write_gate.lock().await;
            if self.get(bot_id).await.is_none() {
                return Err(StoreError::NotFound);
            }
            if !self.store.add_bot_channel(bot_id, channel_id).await? {
                return Ok(false);
            }
            self.lock_all()
                .await
                .by_channel
                .entry(channel_id)
                .or_default()
                .insert(bot_id);
        }
        info!(bot_id = %bot_id, channel_id = %channel_id, "Bot joined channel");
        self.publish(RegistryChange::Joined { bot_id, channel_id });
        if let Err(e) = self
            .bus
            .bot_joined
            .send(BotJoined { bot_id, channel_id })
            .await
        {
            error!(error = %e, bot_id = %bot_id, "Failed to publish bot.joined");
        }
        Ok(true)
    }

    /// Remove the bot from a channel. Returns false when it was not a member.
    pub async fn leave(&self, bot_id: Uuid, channel_id: Uuid) -> Result<bool, StoreError> {
        {
            let _gate = self.write_gate.lock().await;
            if self.get(bot_id).await.is_none() {
                return Err(StoreError::NotFound);
            }
            if !self.store.remove_bot_channel(bot_id, channel_id).await? {
                return Ok(false);
            }
            let mut indexes = self.lock_all().await;
            if let Some(members) = indexes.by_channel.get_mut(&channel_id) {
                members.remove(&bot_id);
                if members.is_empty() {
                    indexes.by_channel.remove(&channel_id);
                }
            }
        }
        info!(bot_id = %bot_id, channel_id = %channel_id, "Bot left channel");
        self.publish(RegistryChange::Left { bot_id, channel_id });
        if let Err(e) = self
            .bus
            .bot_left
            .send(BotLeft { bot_id, channel_id })
            .await
        {
            error!(error = %e, bot_id = %bot_id, "Failed to publish bot.left");
        }
        Ok(true)
    }

    async fn lock_all(&self) -> Indexes<'_> {
        let by_id = self.by_id.write().await;
        let by_bot_user_id = self.by_bot_user_id.write().await;
        let by_channel = self.by_channel.write().await;
        Indexes {
            by_id,
            by_bot_user_id,
            by_channel,
        }
    }

    fn publish(&self, change: RegistryChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::tests::{bot_fixture, bot_user_of};
    use crate::events::{BotPingRequest, EventReceivers, event_bus};
    use crate::store::memory::MemoryStore;
    use crate::store::{RandomTokenIssuer, TokenIssuer};

    fn registry_with(store: Arc<MemoryStore>) -> (BotRegistry, EventReceivers) {
        let (senders, receivers) = event_bus();
        (BotRegistry::new(store, senders), receivers)
    }

    fn shadow_user(n: u128) -> NewShadowUser {
        NewShadowUser {
            id: bot_user_of(n),
            name: format!("BOT_{n}"),
            display_name: format!("bot {n}"),
            icon_file_id: Uuid::nil(),
        }
    }

    #[tokio::test]
    async fn load_builds_all_indexes() {
        let store = Arc::new(MemoryStore::new());
        let channel = Uuid::from_u128(0xCC);
        store.put_bot(bot_fixture(1));
        store.put_bot(bot_fixture(2));
        store.put_bot_channel(Uuid::from_u128(2), channel);
        store.put_bot_channel(Uuid::from_u128(99), channel);

        let (registry, _rx) = registry_with(store);
        registry.load().await.unwrap();

        assert_eq!(registry.all().await.len(), 2);
        assert_eq!(
            registry.get_by_bot_user_id(bot_user_of(1)).await.unwrap().id,
            Uuid::from_u128(1)
        );
        let members = registry.in_channel(channel).await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, Uuid::from_u128(2));
        assert_eq!(registry.channels_of(Uuid::from_u128(2)).await, vec![channel]);
        assert_eq!(
            registry.get_by_code("code-1").await.unwrap().id,
            Uuid::from_u128(1)
        );
    }

    #[tokio::test]
    async fn insert_commits_then_indexes() {
        let store = Arc::new(MemoryStore::new());
        let (registry, _rx) = registry_with(store.clone());
        let mut changes = registry.subscribe();

        let bot = bot_fixture(3);
        let token = RandomTokenIssuer.issue_token(bot.bot_user_id, &["bot"], i32::MAX);
        registry
            .insert(bot.clone(), &shadow_user(3), &token)
            .await
            .unwrap();

        assert_eq!(store.bot(bot.id), Some(bot.clone()));
        assert!(registry.get(bot.id).await.is_some());
        assert_eq!(
            changes.recv().await.unwrap(),
            RegistryChange::Created { bot_id: bot.id }
        );
    }

    #[tokio::test]
    async fn failed_commit_leaves_indexes_untouched() {
        let store = Arc::new(MemoryStore::new());
        let (registry, _rx) = registry_with(store.clone());
        let bot = bot_fixture(4);
        let token = RandomTokenIssuer.issue_token(bot.bot_user_id, &["bot"], i32::MAX);
        registry
            .insert(bot.clone(), &shadow_user(4), &token)
            .await
            .unwrap();

        let mut twin = bot_fixture(5);
        twin.bot_user_id = Uuid::from_u128(0xFFFF);
        let err = registry
            .insert(twin.clone(), &shadow_user(4), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        assert!(registry.get(twin.id).await.is_none());
    }

    #[tokio::test]
    async fn set_state_publishes_only_real_changes() {
        let store = Arc::new(MemoryStore::new());
        store.put_bot(bot_fixture(1));
        let (registry, _rx) = registry_with(store.clone());
        registry.load().await.unwrap();
        let mut changes = registry.subscribe();
        let id = Uuid::from_u128(1);

        registry.set_state(id, BotState::Active).await.unwrap();
        let bot = registry.set_state(id, BotState::Paused).await.unwrap();
        assert_eq!(bot.state, BotState::Paused);
        assert_eq!(store.bot(id).unwrap().state, BotState::Paused);
        assert_eq!(
            registry.get_by_bot_user_id(bot_user_of(1)).await.unwrap().state,
            BotState::Paused
        );

        assert_eq!(
            changes.recv().await.unwrap(),
            RegistryChange::StateChanged {
                bot_id: id,
                from: BotState::Active,
                to: BotState::Paused,
            }
        );
        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshots_survive_updates() {
        let store = Arc::new(MemoryStore::new());
        store.put_bot(bot_fixture(1));
        let (registry, _rx) = registry_with(store);
        registry.load().await.unwrap();

        let before = registry.get(Uuid::from_u128(1)).await.unwrap();
        registry
            .set_state(before.id, BotState::Inactive)
            .await
            .unwrap();
        assert_eq!(before.state, BotState::Active);
        assert_eq!(
            registry.get(before.id).await.unwrap().state,
            BotState::Inactive
        );
    }

    #[tokio::test]
    async fn join_and_leave_notify_the_bus() {
        let store = Arc::new(MemoryStore::new());
        store.put_bot(bot_fixture(1));
        let (registry, mut rx) = registry_with(store.clone());
        registry.load().await.unwrap();
        let bot_id = Uuid::from_u128(1);
        let channel_id = Uuid::from_u128(0xCC);

        assert!(registry.join(bot_id, channel_id).await.unwrap());
        assert!(!registry.join(bot_id, channel_id).await.unwrap());
        assert_eq!(
            rx.bot_joined.recv().await.unwrap(),
            BotJoined { bot_id, channel_id }
        );
        assert!(rx.bot_joined.try_recv().is_err());
        assert_eq!(registry.in_channel(channel_id).await.len(), 1);
        assert_eq!(store.memberships(), vec![(bot_id, channel_id)]);

        assert!(registry.leave(bot_id, channel_id).await.unwrap());
        assert!(!registry.leave(bot_id, channel_id).await.unwrap());
        assert_eq!(
            rx.bot_left.recv().await.unwrap(),
            BotLeft { bot_id, channel_id }
        );
        assert!(registry.in_channel(channel_id).await.is_empty());
        assert!(store.memberships().is_empty());
    }

    #[tokio::test]
    async fn platform_events_reach_the_bus() {
        let (registry, mut rx) = registry_with(Arc::new(MemoryStore::new()));
        let bot_id = Uuid::from_u128(1);
        registry
            .events()
            .bot_ping_request
            .send(BotPingRequest { bot_id })
            .await
            .unwrap();
        assert_eq!(rx.bot_ping_request.recv().await.unwrap().bot_id, bot_id);
    }

    #[tokio::test]
    async fn reissue_pauses_through_the_state_machine() {
        let store = Arc::new(MemoryStore::new());
        store.put_bot(bot_fixture(1));
        let (registry, _rx) = registry_with(store.clone());
        registry.load().await.unwrap();
        let mut changes = registry.subscribe();
        let id = Uuid::from_u128(1);

        let token = RandomTokenIssuer.issue_token(bot_user_of(1), &["bot"], i32::MAX);
        let bot = registry
            .reissue(id, "v".repeat(30), "c".repeat(30), &token)
            .await
            .unwrap();
        assert_eq!(bot.state, BotState::Paused);
        assert_eq!(changes.recv().await.unwrap(), RegistryChange::Updated { bot_id: id });
        assert_eq!(
            changes.recv().await.unwrap(),
            RegistryChange::StateChanged {
                bot_id: id,
                from: BotState::Active,
                to: BotState::Paused,
            }
        );
    }

    #[tokio::test]
    async fn join_unknown_bot_is_not_found() {
        let (registry, _rx) = registry_with(Arc::new(MemoryStore::new()));
        let err = registry
            .join(Uuid::from_u128(7), Uuid::from_u128(0xCC))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn delete_clears_every_index() {
        let store = Arc::new(MemoryStore::new());
        let channel_id = Uuid::from_u128(0xCC);
        store.put_bot(bot_fixture(1));
        store.put_bot_channel(Uuid::from_u128(1), channel_id);
        let (registry, _rx) = registry_with(store.clone());
        registry.load().await.unwrap();

        registry.delete(Uuid::from_u128(1)).await.unwrap();
        assert!(registry.get(Uuid::from_u128(1)).await.is_none());
        assert!(registry.get_by_bot_user_id(bot_user_of(1)).await.is_none());
        assert!(registry.in_channel(channel_id).await.is_empty());
        assert!(store.bot(Uuid::from_u128(1)).is_none());
        assert!(store.memberships().is_empty());
    }

    #[tokio::test]
    async fn listings_are_ordered_by_creation() {
        let store = Arc::new(MemoryStore::new());
        for n in [3, 1, 2] {
            store.put_bot(bot_fixture(n));
        }
        let mut foreign = bot_fixture(4);
        foreign.creator_id = Uuid::from_u128(0xBEEF);
        store.put_bot(foreign);
        let (registry, _rx) = registry_with(store);
        registry.load().await.unwrap();

        let ids: Vec<_> = registry.all().await.iter().map(|b| b.id.as_u128()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        let ids: Vec<_> = registry
            .list_by_creator(Uuid::from_u128(0xC0DE))
            .await
            .iter()
            .map(|b| b.id.as_u128())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }
}
