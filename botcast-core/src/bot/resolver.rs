//! Who receives what.
//!
//! | Event | Candidates | Filters |
//! |---|---|---|
//! | `MESSAGE_CREATED` | channel members, mentioned bots | active, subscribed, not the author |
//! | `DIRECT_MESSAGE_CREATED` | bots among the DM participants | active, subscribed, not the author |
//! | `USER_CREATED`, `CHANNEL_CREATED` | every bot | privileged, active, subscribed |
//! | `CHANNEL_TOPIC_CHANGED` | channel members | active, subscribed |
//! | `STAMP_CREATED` | every bot | active, subscribed |
//! | `JOINED`, `LEFT` | the bot itself | active |
//! | `PING` | the bot itself | none |
//!
//! Mentioned bots qualify through `MENTION_MESSAGE_CREATED` and then receive
//! the same `MESSAGE_CREATED` delivery as channel members. Every result is
//! deduplicated by bot id.

use super::filter::{BotFilter, filter_bots};
use super::registry::BotRegistry;
use crate::entities::BotState;
use crate::entities::bot::Bot;
use botcast_sdk::objects::BotEventKind;
use itertools::Itertools;
use std::sync::Arc;
use uuid::Uuid;

const ACTIVE: BotFilter = BotFilter::State(BotState::Active);

#[derive(Clone)]
pub struct TargetResolver {
    registry: Arc<BotRegistry>,
}

impl TargetResolver {
    pub fn new(registry: Arc<BotRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<BotRegistry> {
        &self.registry
    }

    /// Targets of a message posted in a public channel.
    pub async fn message_created(
        &self,
        channel_id: Uuid,
        author_id: Uuid,
        mentioned_user_ids: &[Uuid],
    ) -> Vec<Arc<Bot>> {
        let members = filter_bots(
            self.registry.in_channel(channel_id).await,
            &[ACTIVE, BotFilter::SubscribesTo(BotEventKind::MessageCreated)],
        );
        let mentioned = filter_bots(
            self.bots_of_users(mentioned_user_ids).await,
            &[
                ACTIVE,
                BotFilter::SubscribesTo(BotEventKind::MentionMessageCreated),
            ],
        );
        let candidates = members
            .into_iter()
            .chain(mentioned)
            .unique_by(|bot| bot.id)
            .collect();
        filter_bots(candidates, &[BotFilter::BotUserIdNot(author_id)])
    }

    /// Targets of a message posted in a DM channel with the given
    /// participants.
    pub async fn direct_message_created(
        &self,
        participant_ids: &[Uuid],
        author_id: Uuid,
    ) -> Vec<Arc<Bot>> {
        filter_bots(
            self.bots_of_users(participant_ids).await,
            &[
                ACTIVE,
                BotFilter::SubscribesTo(BotEventKind::DirectMessageCreated),
                BotFilter::BotUserIdNot(author_id),
            ],
        )
    }

    pub async fn user_created(&self) -> Vec<Arc<Bot>> {
        self.privileged(BotEventKind::UserCreated).await
    }

    /// Private channel creations reach nobody.
    pub async fn channel_created(&self, private: bool) -> Vec<Arc<Bot>> {
        if private {
            return Vec::new();
        }
        self.privileged(BotEventKind::ChannelCreated).await
    }

    pub async fn channel_topic_changed(&self, channel_id: Uuid) -> Vec<Arc<Bot>> {
        filter_bots(
            self.registry.in_channel(channel_id).await,
            &[
                ACTIVE,
                BotFilter::SubscribesTo(BotEventKind::ChannelTopicChanged),
            ],
        )
    }

    pub async fn stamp_created(&self) -> Vec<Arc<Bot>> {
        filter_bots(
            self.registry.all().await,
            &[ACTIVE, BotFilter::SubscribesTo(BotEventKind::StampCreated)],
        )
    }

    /// The bot whose membership changed, if it is active.
    pub async fn membership_changed(&self, bot_id: Uuid) -> Option<Arc<Bot>> {
        self.registry
            .get(bot_id)
            .await
            .filter(|bot| ACTIVE.matches(bot))
    }

    /// The bot to ping, whatever its state.
    pub async fn ping(&self, bot_id: Uuid) -> Option<Arc<Bot>> {
        self.registry.get(bot_id).await
    }

    async fn privileged(&self, kind: BotEventKind) -> Vec<Arc<Bot>> {
        filter_bots(
            self.registry.all().await,
            &[BotFilter::Privileged, ACTIVE, BotFilter::SubscribesTo(kind)],
        )
    }

    async fn bots_of_users(&self, user_ids: &[Uuid]) -> Vec<Arc<Bot>> {
        let mut bots = Vec::new();
        for user_id in user_ids.iter().unique() {
            if let Some(bot) = self.registry.get_by_bot_user_id(*user_id).await {
                bots.push(bot);
            }
        }
        bots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::tests::{bot_fixture, bot_user_of};
    use crate::events::event_bus;
    use crate::store::memory::MemoryStore;
    use botcast_sdk::objects::BotEventKinds;

    const CHANNEL: Uuid = Uuid::from_u128(0xC0);
    const HUMAN: Uuid = Uuid::from_u128(0xAA);

    async fn resolver(bots: Vec<Bot>, members: &[u128]) -> TargetResolver {
        let store = Arc::new(MemoryStore::new());
        for bot in bots {
            store.put_bot(bot);
        }
        for &n in members {
            store.put_bot_channel(Uuid::from_u128(n), CHANNEL);
        }
        let (senders, _receivers) = event_bus();
        let registry = Arc::new(BotRegistry::new(store, senders));
        registry.load().await.unwrap();
        TargetResolver::new(registry)
    }

    fn subscribed(n: u128, kinds: &[BotEventKind]) -> Bot {
        Bot {
            subscribe_events: kinds.iter().copied().collect::<BotEventKinds>(),
            ..bot_fixture(n)
        }
    }

    fn ids(bots: &[Arc<Bot>]) -> Vec<u128> {
        bots.iter().map(|b| b.id.as_u128()).collect()
    }

    #[tokio::test]
    async fn public_message_fan_out() {
        let resolver = resolver(
            vec![
                subscribed(1, &[BotEventKind::MessageCreated]),
                subscribed(2, &[BotEventKind::MessageCreated]),
                subscribed(3, &[BotEventKind::MentionMessageCreated]),
            ],
            &[1],
        )
        .await;

        let targets = resolver
            .message_created(CHANNEL, HUMAN, &[bot_user_of(3)])
            .await;
        assert_eq!(ids(&targets), vec![1, 3]);
    }

    #[tokio::test]
    async fn member_and_mention_receive_once() {
        let resolver = resolver(
            vec![subscribed(
                1,
                &[
                    BotEventKind::MessageCreated,
                    BotEventKind::MentionMessageCreated,
                ],
            )],
            &[1],
        )
        .await;

        let targets = resolver
            .message_created(CHANNEL, HUMAN, &[bot_user_of(1), bot_user_of(1)])
            .await;
        assert_eq!(ids(&targets), vec![1]);
    }

    #[tokio::test]
    async fn author_never_receives_its_own_message() {
        let resolver = resolver(vec![bot_fixture(1)], &[1]).await;
        let targets = resolver
            .message_created(CHANNEL, bot_user_of(1), &[bot_user_of(1)])
            .await;
        assert!(targets.is_empty());
    }

    #[tokio::test]
    async fn mention_without_subscription_is_ignored() {
        let resolver = resolver(vec![subscribed(2, &[BotEventKind::MessageCreated])], &[]).await;
        let targets = resolver
            .message_created(CHANNEL, HUMAN, &[bot_user_of(2)])
            .await;
        assert!(targets.is_empty());
    }

    #[tokio::test]
    async fn direct_message_reaches_the_participating_bot() {
        let resolver = resolver(
            vec![
                subscribed(1, &[BotEventKind::DirectMessageCreated]),
                subscribed(2, &[BotEventKind::MessageCreated]),
            ],
            &[],
        )
        .await;

        let targets = resolver
            .direct_message_created(&[HUMAN, bot_user_of(1)], HUMAN)
            .await;
        assert_eq!(ids(&targets), vec![1]);

        // The bot writing in its own DM does not get it back.
        let targets = resolver
            .direct_message_created(&[HUMAN, bot_user_of(1)], bot_user_of(1))
            .await;
        assert!(targets.is_empty());

        let targets = resolver
            .direct_message_created(&[HUMAN, bot_user_of(2)], HUMAN)
            .await;
        assert!(targets.is_empty());
    }

    #[tokio::test]
    async fn platform_wide_events_need_privilege() {
        let mut privileged = bot_fixture(1);
        privileged.privileged = true;
        let mut paused = bot_fixture(2);
        paused.privileged = true;
        paused.state = BotState::Paused;
        let resolver = resolver(vec![privileged, paused, bot_fixture(3)], &[]).await;

        assert_eq!(ids(&resolver.user_created().await), vec![1]);
        assert_eq!(ids(&resolver.channel_created(false).await), vec![1]);
        assert!(resolver.channel_created(true).await.is_empty());
        // Stamps need no privilege.
        assert_eq!(ids(&resolver.stamp_created().await), vec![1, 3]);
    }

    #[tokio::test]
    async fn topic_changes_reach_members_only() {
        let mut paused = bot_fixture(2);
        paused.state = BotState::Paused;
        let resolver = resolver(vec![bot_fixture(1), paused, bot_fixture(3)], &[1, 2]).await;
        assert_eq!(ids(&resolver.channel_topic_changed(CHANNEL).await), vec![1]);
    }

    #[tokio::test]
    async fn single_bot_events() {
        let mut inactive = bot_fixture(1);
        inactive.state = BotState::Inactive;
        let resolver = resolver(vec![inactive, bot_fixture(2)], &[]).await;

        assert!(resolver.membership_changed(Uuid::from_u128(1)).await.is_none());
        assert!(resolver.membership_changed(Uuid::from_u128(2)).await.is_some());
        assert!(resolver.ping(Uuid::from_u128(1)).await.is_some());
        assert!(resolver.ping(Uuid::from_u128(9)).await.is_none());
    }
}
