//! Bus event handlers.
//!
//! [`BotEventHandlers`] is a `Processor` of every bus event. Each handler
//! resolves its targets first and only reads the platform for payload data
//! when somebody is going to receive it.

use super::codec::{channel_payload, message_payload, stamp_payload, user_payload};
use super::delivery::DeliveryReport;
use super::dispatcher::Dispatcher;
use super::liveness::{Liveness, LivenessError};
use super::resolver::TargetResolver;
use crate::entities::platform::{Channel, User};
use crate::events::{
    BotJoined, BotLeft, BotPingRequest, ChannelCreated, ChannelTopicUpdated, MessageCreated,
    StampCreated, UserCreated,
};
use crate::message::MessageParser;
use crate::store::{PlatformStore, StoreError};
use botcast_sdk::objects::EventPayload;
use botcast_sdk::objects::payload::{self, ChannelPayload, JoinedOrLeft};
use kanau::processor::Processor;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("channel not found: {0}")]
    ChannelNotFound(Uuid),

    #[error("stamp not found: {0}")]
    StampNotFound(Uuid),

    #[error("ping failed: {0}")]
    Ping(#[from] LivenessError),
}

#[derive(Clone)]
pub struct BotEventHandlers {
    resolver: TargetResolver,
    dispatcher: Dispatcher,
    liveness: Arc<Liveness>,
    platform: Arc<dyn PlatformStore>,
    parser: Arc<MessageParser>,
}

impl BotEventHandlers {
    pub fn new(
        resolver: TargetResolver,
        dispatcher: Dispatcher,
        liveness: Arc<Liveness>,
        platform: Arc<dyn PlatformStore>,
        parser: Arc<MessageParser>,
    ) -> Self {
        Self {
            resolver,
            dispatcher,
            liveness,
            platform,
            parser,
        }
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>, HandlerError> {
        if id.is_nil() {
            return Ok(None);
        }
        Ok(self.platform.get_user(id).await?)
    }

    async fn channel(&self, id: Uuid) -> Result<Channel, HandlerError> {
        self.platform
            .get_channel(id)
            .await?
            .ok_or(HandlerError::ChannelNotFound(id))
    }

    async fn channel_payload(&self, channel: &Channel) -> Result<ChannelPayload, HandlerError> {
        let path = self.platform.get_channel_path(channel.id).await?;
        let creator = match channel.creator_id {
            Some(id) => self.user(id).await?,
            None => None,
        };
        Ok(channel_payload(channel, &path, creator.as_ref()))
    }

    async fn membership_changed(
        &self,
        bot_id: Uuid,
        channel_id: Uuid,
        wrap: fn(JoinedOrLeft) -> EventPayload,
    ) -> Result<Vec<DeliveryReport>, HandlerError> {
        let Some(bot) = self.resolver.membership_changed(bot_id).await else {
            return Ok(Vec::new());
        };
        let channel = self.channel(channel_id).await?;
        let payload = wrap(JoinedOrLeft {
            channel: self.channel_payload(&channel).await?,
        });
        Ok(self
            .dispatcher
            .unicast(&payload, &bot)
            .await
            .into_iter()
            .collect())
    }
}

impl Processor<MessageCreated> for BotEventHandlers {
    type Output = Vec<DeliveryReport>;
    type Error = HandlerError;
    #[tracing::instrument(skip_all, name = "Bot:MessageCreated", fields(message_id = %event.message.id))]
    async fn process(&self, event: MessageCreated) -> Result<Vec<DeliveryReport>, HandlerError> {
        let message = event.message;
        let channel = self.channel(message.channel_id).await?;
        let parsed = self.parser.parse(&message.text);

        let (targets, wrap): (_, fn(payload::MessageCreated) -> EventPayload) = if channel.is_dm {
            let participants = self.platform.get_dm_channel_members(channel.id).await?;
            (
                self.resolver
                    .direct_message_created(&participants, message.user_id)
                    .await,
                EventPayload::DirectMessageCreated,
            )
        } else {
            (
                self.resolver
                    .message_created(channel.id, message.user_id, &parsed.mentions)
                    .await,
                EventPayload::MessageCreated,
            )
        };
        if targets.is_empty() {
            debug!(message_id = %message.id, "No bot receives this message");
            return Ok(Vec::new());
        }

        let author = self.user(message.user_id).await?;
        let payload = wrap(payload::MessageCreated {
            message: message_payload(&message, author.as_ref(), &parsed),
        });
        Ok(self.dispatcher.multicast(&payload, targets).await)
    }
}

impl Processor<BotJoined> for BotEventHandlers {
    type Output = Vec<DeliveryReport>;
    type Error = HandlerError;
    #[tracing::instrument(skip_all, name = "Bot:Joined", fields(bot_id = %event.bot_id))]
    async fn process(&self, event: BotJoined) -> Result<Vec<DeliveryReport>, HandlerError> {
        self.membership_changed(event.bot_id, event.channel_id, EventPayload::Joined)
            .await
    }
}

impl Processor<BotLeft> for BotEventHandlers {
    type Output = Vec<DeliveryReport>;
    type Error = HandlerError;
    #[tracing::instrument(skip_all, name = "Bot:Left", fields(bot_id = %event.bot_id))]
    async fn process(&self, event: BotLeft) -> Result<Vec<DeliveryReport>, HandlerError> {
        self.membership_changed(event.bot_id, event.channel_id, EventPayload::Left)
            .await
    }
}

impl Processor<BotPingRequest> for BotEventHandlers {
    type Output = Vec<DeliveryReport>;
    type Error = HandlerError;
    #[tracing::instrument(skip_all, name = "Bot:PingRequest", fields(bot_id = %event.bot_id))]
    async fn process(&self, event: BotPingRequest) -> Result<Vec<DeliveryReport>, HandlerError> {
        if self.resolver.ping(event.bot_id).await.is_none() {
            return Ok(Vec::new());
        }
        let result = self.liveness.ping(event.bot_id).await?;
        Ok(vec![result.report])
    }
}

impl Processor<UserCreated> for BotEventHandlers {
    type Output = Vec<DeliveryReport>;
    type Error = HandlerError;
    #[tracing::instrument(skip_all, name = "Bot:UserCreated", fields(user_id = %event.user.id))]
    async fn process(&self, event: UserCreated) -> Result<Vec<DeliveryReport>, HandlerError> {
        let targets = self.resolver.user_created().await;
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let payload = EventPayload::UserCreated(payload::UserCreated {
            user: user_payload(Some(&event.user)),
        });
        Ok(self.dispatcher.multicast(&payload, targets).await)
    }
}

impl Processor<ChannelCreated> for BotEventHandlers {
    type Output = Vec<DeliveryReport>;
    type Error = HandlerError;
    #[tracing::instrument(skip_all, name = "Bot:ChannelCreated", fields(channel_id = %event.channel_id))]
    async fn process(&self, event: ChannelCreated) -> Result<Vec<DeliveryReport>, HandlerError> {
        let targets = self.resolver.channel_created(event.private).await;
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let channel = self.channel(event.channel_id).await?;
        let payload = EventPayload::ChannelCreated(payload::ChannelCreated {
            channel: self.channel_payload(&channel).await?,
        });
        Ok(self.dispatcher.multicast(&payload, targets).await)
    }
}

impl Processor<ChannelTopicUpdated> for BotEventHandlers {
    type Output = Vec<DeliveryReport>;
    type Error = HandlerError;
    #[tracing::instrument(skip_all, name = "Bot:ChannelTopicUpdated", fields(channel_id = %event.channel_id))]
    async fn process(
        &self,
        event: ChannelTopicUpdated,
    ) -> Result<Vec<DeliveryReport>, HandlerError> {
        let targets = self.resolver.channel_topic_changed(event.channel_id).await;
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let channel = self.channel(event.channel_id).await?;
        let updater = self.user(event.updater_id).await?;
        let payload = EventPayload::ChannelTopicChanged(payload::ChannelTopicChanged {
            channel: self.channel_payload(&channel).await?,
            topic: event.topic,
            updater: user_payload(updater.as_ref()),
        });
        Ok(self.dispatcher.multicast(&payload, targets).await)
    }
}

impl Processor<StampCreated> for BotEventHandlers {
    type Output = Vec<DeliveryReport>;
    type Error = HandlerError;
    #[tracing::instrument(skip_all, name = "Bot:StampCreated", fields(stamp_id = %event.stamp_id))]
    async fn process(&self, event: StampCreated) -> Result<Vec<DeliveryReport>, HandlerError> {
        let targets = self.resolver.stamp_created().await;
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let stamp = self
            .platform
            .get_stamp(event.stamp_id)
            .await?
            .ok_or(HandlerError::StampNotFound(event.stamp_id))?;
        let creator = self.user(stamp.creator_id).await?;
        let payload = EventPayload::StampCreated(stamp_payload(&stamp, creator.as_ref()));
        Ok(self.dispatcher.multicast(&payload, targets).await)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::bot::codec::PayloadCodec;
    use crate::bot::delivery::{DeliveryConfig, HttpDelivery};
    use crate::bot::event_log::EventLog;
    use crate::bot::registry::BotRegistry;
    use crate::bot::tests::{bot_fixture, bot_user_of};
    use crate::entities::BotState;
    use crate::entities::bot::Bot;
    use crate::entities::platform::{Message, Stamp};
    use crate::events::event_bus;
    use crate::store::memory::MemoryStore;
    use botcast_sdk::headers::BOT_EVENT_HEADER;
    use botcast_sdk::objects::{BotEventKind, BotEventKinds};
    use std::sync::atomic::Ordering;
    use time::OffsetDateTime;
    use time::macros::datetime;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub const ORIGIN: &str = "http://localhost:3000";
    pub const PUBLIC: Uuid = Uuid::from_u128(0xC1);
    pub const DM: Uuid = Uuid::from_u128(0xD1);
    pub const HUMAN: Uuid = Uuid::from_u128(0xAA);

    pub struct Fixture {
        pub server: MockServer,
        pub store: Arc<MemoryStore>,
        pub registry: Arc<BotRegistry>,
        pub handlers: BotEventHandlers,
    }

    pub fn human() -> User {
        User {
            id: HUMAN,
            name: "alice".to_string(),
            display_name: "Alice".to_string(),
            icon_file_id: Uuid::from_u128(0xF1),
            bot: false,
            active: true,
        }
    }

    fn channel(id: Uuid, name: &str, is_dm: bool) -> Channel {
        let at = datetime!(2024-01-01 00:00:00 UTC);
        Channel {
            id,
            name: name.to_string(),
            parent_id: None,
            creator_id: (!is_dm).then_some(HUMAN),
            topic: String::new(),
            is_public: !is_dm,
            is_dm,
            created_at: at,
            updated_at: at,
        }
    }

    /// A bot delivering to `<server>/bot/<n>`.
    pub fn hosted_bot(server: &MockServer, n: u128, kinds: &[BotEventKind]) -> Bot {
        Bot {
            post_url: format!("{}/bot/{n}", server.uri()),
            subscribe_events: kinds.iter().copied().collect::<BotEventKinds>(),
            ..bot_fixture(n)
        }
    }

    pub async fn fixture(bots: impl FnOnce(&MockServer) -> Vec<Bot>, members: &[u128]) -> Fixture {
        let server = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        store.put_user(human());
        store.put_channel(channel(PUBLIC, "general", false), "general");
        store.put_channel(channel(DM, "dm", true), "dm");
        for bot in bots(&server) {
            store.put_user(User {
                id: bot.bot_user_id,
                name: format!("BOT_{}", bot.id.as_u128()),
                display_name: String::new(),
                icon_file_id: Uuid::nil(),
                bot: true,
                active: true,
            });
            store.put_bot(bot);
        }
        for &n in members {
            store.put_bot_channel(Uuid::from_u128(n), PUBLIC);
        }

        let (senders, _receivers) = event_bus();
        let registry = Arc::new(BotRegistry::new(store.clone(), senders));
        registry.load().await.unwrap();
        let dispatcher = Dispatcher::new(
            Arc::new(PayloadCodec::new()),
            HttpDelivery::new(DeliveryConfig::default()).unwrap(),
            EventLog::new(store.clone()),
        );
        let liveness = Arc::new(Liveness::new(registry.clone(), dispatcher.clone()));
        let handlers = BotEventHandlers::new(
            TargetResolver::new(registry.clone()),
            dispatcher,
            liveness,
            store.clone(),
            Arc::new(MessageParser::new(ORIGIN).unwrap()),
        );
        Fixture {
            server,
            store,
            registry,
            handlers,
        }
    }

    pub fn message(author: Uuid, channel_id: Uuid, text: &str) -> MessageCreated {
        let at = OffsetDateTime::now_utc();
        MessageCreated {
            message: Message {
                id: Uuid::now_v7(),
                user_id: author,
                channel_id,
                text: text.to_string(),
                created_at: at,
                updated_at: at,
            },
        }
    }

    fn mention(n: u128) -> String {
        format!(
            r#"!{{"type":"user","raw":"@BOT_{n}","id":"{}"}}"#,
            bot_user_of(n)
        )
    }

    async fn respond_ok(server: &MockServer) {
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(server)
            .await;
    }

    fn bodies_of(requests: &[wiremock::Request]) -> Vec<serde_json::Value> {
        requests
            .iter()
            .map(|r| serde_json::from_slice(&r.body).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn public_message_fan_out() {
        let f = fixture(
            |s| {
                vec![
                    hosted_bot(s, 1, &[BotEventKind::MessageCreated]),
                    hosted_bot(s, 2, &[BotEventKind::MessageCreated]),
                    hosted_bot(s, 3, &[BotEventKind::MentionMessageCreated]),
                ]
            },
            &[1],
        )
        .await;
        respond_ok(&f.server).await;

        let text = format!("hi {}", mention(3));
        let reports = f
            .handlers
            .process(message(HUMAN, PUBLIC, &text))
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);

        let requests = f.server.received_requests().await.unwrap();
        let mut paths: Vec<_> = requests.iter().map(|r| r.url.path().to_string()).collect();
        paths.sort();
        assert_eq!(paths, vec!["/bot/1", "/bot/3"]);
        assert!(requests.iter().all(|r| {
            r.headers.get(BOT_EVENT_HEADER).unwrap().to_str().unwrap() == "MESSAGE_CREATED"
        }));

        let bodies = bodies_of(&requests);
        assert_eq!(bodies[0]["eventTime"], bodies[1]["eventTime"]);
        let message = &bodies[0]["message"];
        assert_eq!(message["plainText"], "hi @BOT_3");
        assert_eq!(message["user"]["name"], "alice");
        assert_eq!(message["channelId"], PUBLIC.to_string());
        assert_eq!(message["embedded"][0]["type"], "user");
        assert_eq!(f.store.logs().len(), 2);
    }

    #[tokio::test]
    async fn dm_routing() {
        let f = fixture(
            |s| {
                vec![
                    hosted_bot(
                        s,
                        1,
                        &[
                            BotEventKind::DirectMessageCreated,
                            BotEventKind::MessageCreated,
                        ],
                    ),
                    hosted_bot(s, 2, &[BotEventKind::MessageCreated]),
                ]
            },
            &[1, 2],
        )
        .await;
        f.store.put_dm_members(DM, vec![HUMAN, bot_user_of(1)]);
        respond_ok(&f.server).await;

        f.handlers
            .process(message(HUMAN, DM, "hi"))
            .await
            .unwrap();

        let requests = f.server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.path(), "/bot/1");
        assert_eq!(
            requests[0].headers.get(BOT_EVENT_HEADER).unwrap(),
            "DIRECT_MESSAGE_CREATED"
        );
        let logs = f.store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event, BotEventKind::DirectMessageCreated);
    }

    #[tokio::test]
    async fn self_suppression() {
        let f = fixture(|s| vec![hosted_bot(s, 1, &BotEventKind::ALL)], &[1]).await;
        respond_ok(&f.server).await;

        let text = format!("hello {}", mention(1));
        let reports = f
            .handlers
            .process(message(bot_user_of(1), PUBLIC, &text))
            .await
            .unwrap();
        assert!(reports.is_empty());
        assert!(f.server.received_requests().await.unwrap().is_empty());
        assert!(f.store.logs().is_empty());
        assert_eq!(f.handlers.dispatcher.codec().stats().encoded, 0);
    }

    #[tokio::test]
    async fn ping_activation() {
        let f = fixture(
            |s| {
                vec![Bot {
                    state: BotState::Inactive,
                    ..hosted_bot(s, 1, &[])
                }]
            },
            &[],
        )
        .await;
        respond_ok(&f.server).await;

        let bot_id = Uuid::from_u128(1);
        let reports = f.handlers.process(BotPingRequest { bot_id }).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(f.registry.get(bot_id).await.unwrap().state, BotState::Active);
        let logs = f.store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].code, 204);
    }

    #[tokio::test]
    async fn ping_failure() {
        let f = fixture(|s| vec![hosted_bot(s, 1, &[])], &[]).await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&f.server)
            .await;

        let bot_id = Uuid::from_u128(1);
        f.handlers.process(BotPingRequest { bot_id }).await.unwrap();
        assert_eq!(f.registry.get(bot_id).await.unwrap().state, BotState::Paused);
        let logs = f.store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].code, 500);
    }

    #[tokio::test]
    async fn oversize_response_leaves_state_alone() {
        let f = fixture(
            |s| vec![hosted_bot(s, 1, &[BotEventKind::MessageCreated])],
            &[1],
        )
        .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'z'; 6 * 1024 * 1024]))
            .mount(&f.server)
            .await;

        f.handlers
            .process(message(HUMAN, PUBLIC, "hi"))
            .await
            .unwrap();

        let logs = f.store.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].code, 200);
        assert_eq!(logs[0].error.as_deref(), Some("too big response"));
        assert_eq!(
            f.registry.get(Uuid::from_u128(1)).await.unwrap().state,
            BotState::Active
        );
    }

    #[tokio::test]
    async fn non_ping_failure_does_not_pause() {
        let f = fixture(
            |s| vec![hosted_bot(s, 1, &[BotEventKind::MessageCreated])],
            &[1],
        )
        .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&f.server)
            .await;

        f.handlers
            .process(message(HUMAN, PUBLIC, "hi"))
            .await
            .unwrap();
        assert_eq!(f.store.logs()[0].code, 503);
        assert_eq!(
            f.registry.get(Uuid::from_u128(1)).await.unwrap().state,
            BotState::Active
        );
    }

    #[tokio::test]
    async fn joined_carries_the_channel() {
        let f = fixture(|s| vec![hosted_bot(s, 1, &[])], &[]).await;
        Mock::given(method("POST"))
            .and(path("/bot/1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&f.server)
            .await;

        f.handlers
            .process(BotJoined {
                bot_id: Uuid::from_u128(1),
                channel_id: PUBLIC,
            })
            .await
            .unwrap();

        let requests = f.server.received_requests().await.unwrap();
        assert_eq!(requests[0].headers.get(BOT_EVENT_HEADER).unwrap(), "JOINED");
        let body = &bodies_of(&requests)[0];
        assert_eq!(body["channel"]["path"], "#general");
        assert_eq!(body["channel"]["creator"]["id"], HUMAN.to_string());
    }

    #[tokio::test]
    async fn left_skips_inactive_bots() {
        let f = fixture(
            |s| {
                vec![Bot {
                    state: BotState::Paused,
                    ..hosted_bot(s, 1, &[])
                }]
            },
            &[],
        )
        .await;
        let reports = f
            .handlers
            .process(BotLeft {
                bot_id: Uuid::from_u128(1),
                channel_id: PUBLIC,
            })
            .await
            .unwrap();
        assert!(reports.is_empty());
        assert!(f.store.logs().is_empty());
    }

    #[tokio::test]
    async fn platform_wide_events() {
        let f = fixture(
            |s| {
                vec![
                    Bot {
                        privileged: true,
                        ..hosted_bot(s, 1, &BotEventKind::ALL)
                    },
                    hosted_bot(s, 2, &BotEventKind::ALL),
                ]
            },
            &[],
        )
        .await;
        respond_ok(&f.server).await;
        f.store.put_stamp(Stamp {
            id: Uuid::from_u128(0x57),
            name: "blobcat".to_string(),
            file_id: Uuid::from_u128(0xF2),
            creator_id: Uuid::nil(),
        });

        let reports = f.handlers.process(UserCreated { user: human() }).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].bot_id, Uuid::from_u128(1));

        let reports = f
            .handlers
            .process(ChannelCreated {
                channel_id: PUBLIC,
                private: true,
            })
            .await
            .unwrap();
        assert!(reports.is_empty());

        let reports = f
            .handlers
            .process(StampCreated {
                stamp_id: Uuid::from_u128(0x57),
            })
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);

        let requests = f.server.received_requests().await.unwrap();
        let stamp = bodies_of(&requests)
            .into_iter()
            .find(|b| b.get("fileId").is_some())
            .unwrap();
        assert_eq!(stamp["name"], "blobcat");
        assert_eq!(stamp["creator"]["id"], Uuid::nil().to_string());
    }

    #[tokio::test]
    async fn topic_change_reaches_members() {
        let f = fixture(
            |s| {
                vec![
                    hosted_bot(s, 1, &[BotEventKind::ChannelTopicChanged]),
                    hosted_bot(s, 2, &[BotEventKind::ChannelTopicChanged]),
                ]
            },
            &[1],
        )
        .await;
        respond_ok(&f.server).await;

        let reports = f
            .handlers
            .process(ChannelTopicUpdated {
                channel_id: PUBLIC,
                topic: "release day".to_string(),
                updater_id: HUMAN,
            })
            .await
            .unwrap();
        assert_eq!(reports.len(), 1);
        let requests = f.server.received_requests().await.unwrap();
        let body = &bodies_of(&requests)[0];
        assert_eq!(body["topic"], "release day");
        assert_eq!(body["updater"]["displayName"], "Alice");
    }

    #[tokio::test]
    async fn storage_failures_surface_as_errors() {
        let f = fixture(
            |s| vec![hosted_bot(s, 1, &[BotEventKind::MessageCreated])],
            &[1],
        )
        .await;
        f.store.fail_platform_reads.store(true, Ordering::SeqCst);

        let result = f.handlers.process(message(HUMAN, PUBLIC, "hi")).await;
        assert!(matches!(result, Err(HandlerError::Store(_))));
        assert!(f.store.logs().is_empty());
    }

    #[tokio::test]
    async fn unknown_channel() {
        let f = fixture(|_| Vec::new(), &[]).await;
        let missing = Uuid::from_u128(0xDEAD);
        let result = f.handlers.process(message(HUMAN, missing, "hi")).await;
        assert!(matches!(result, Err(HandlerError::ChannelNotFound(id)) if id == missing));
    }
}
