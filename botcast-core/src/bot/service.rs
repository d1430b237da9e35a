//! Administrative bot operations.
//!
//! Everything that changes a bot goes through [`BotService`], which validates
//! the request, mints credentials and applies the change through the
//! [`BotRegistry`] so storage and the in-memory indexes stay in step.

use super::event_log::EventLog;
use super::liveness::{Liveness, LivenessError, PingResult};
use super::registry::BotRegistry;
use crate::entities::BotState;
use crate::entities::access_token::IssuedToken;
use crate::entities::bot::Bot;
use crate::entities::event_log::BotEventLog;
use crate::entities::platform::NewShadowUser;
use crate::store::{IconGenerator, PlatformStore, StoreError, TokenIssuer};
use botcast_sdk::objects::BotEventKinds;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::info;
use url::{Host, Url};
use uuid::Uuid;

pub const BOT_USER_PREFIX: &str = "BOT_";
pub const BOT_TOKEN_SCOPE: &str = "bot";
const MAX_NAME_LEN: usize = 20;
const MAX_DISPLAY_NAME_LEN: usize = 32;
const CREDENTIAL_LEN: usize = 30;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("bot name already in use")]
    AlreadyExists,

    #[error("activation already in progress")]
    ActivationInProgress,

    #[error("failed to encode ping payload")]
    Encode,

    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for BotError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => BotError::AlreadyExists,
            StoreError::NotFound => BotError::NotFound("bot"),
            e => BotError::Store(e),
        }
    }
}

impl From<LivenessError> for BotError {
    fn from(e: LivenessError) -> Self {
        match e {
            LivenessError::NotFound => BotError::NotFound("bot"),
            LivenessError::InProgress => BotError::ActivationInProgress,
            LivenessError::Encode => BotError::Encode,
            LivenessError::Store(e) => e.into(),
        }
    }
}

/// Reloadable rules applied to bot endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotPolicy {
    /// Accept post URLs on loopback, private and link-local hosts.
    pub allow_private_endpoints: bool,
}

#[derive(Debug, Clone)]
pub struct CreateBotRequest {
    /// Becomes the shadow user name `BOT_<name>`.
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub post_url: String,
    pub subscribe_events: BotEventKinds,
    pub privileged: bool,
    pub creator_id: Uuid,
}

/// Fields left `None` are kept.
#[derive(Debug, Clone, Default)]
pub struct UpdateBotRequest {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub post_url: Option<String>,
    pub subscribe_events: Option<BotEventKinds>,
    pub privileged: Option<bool>,
}

/// A created or reissued bot together with its fresh access token.
#[derive(Debug, Clone)]
pub struct BotCredentials {
    pub bot: Arc<Bot>,
    pub access_token: IssuedToken,
}

pub struct BotService {
    registry: Arc<BotRegistry>,
    liveness: Arc<Liveness>,
    event_log: EventLog,
    platform: Arc<dyn PlatformStore>,
    tokens: Arc<dyn TokenIssuer>,
    icons: Arc<dyn IconGenerator>,
    policy: RwLock<BotPolicy>,
}

fn random_credential() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CREDENTIAL_LEN)
        .map(char::from)
        .collect()
}

fn validate_name(name: &str) -> Result<(), BotError> {
    let valid = (1..=MAX_NAME_LEN).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(BotError::InvalidArgument(format!(
            "name must be 1-{MAX_NAME_LEN} characters of A-Z, a-z, 0-9, _ or -"
        )))
    }
}

fn validate_display_name(display_name: &str) -> Result<(), BotError> {
    let len = display_name.chars().count();
    if (1..=MAX_DISPLAY_NAME_LEN).contains(&len) {
        Ok(())
    } else {
        Err(BotError::InvalidArgument(format!(
            "display name must be 1-{MAX_DISPLAY_NAME_LEN} characters"
        )))
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_private_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}

fn is_private_host(host: Host<&str>) -> bool {
    match host {
        Host::Ipv4(ip) => is_private_v4(ip),
        Host::Ipv6(ip) => is_private_v6(ip),
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
    }
}

fn validate_post_url(raw: &str, policy: &BotPolicy) -> Result<(), BotError> {
    let invalid = |reason: &str| BotError::InvalidArgument(format!("post url {reason}"));
    let url = Url::parse(raw).map_err(|e| invalid(&format!("is malformed: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("must use http or https"));
    }
    let host = url.host().ok_or_else(|| invalid("has no host"))?;
    if !policy.allow_private_endpoints && is_private_host(host) {
        return Err(invalid("points to a private address"));
    }
    Ok(())
}

impl BotService {
    pub fn new(
        registry: Arc<BotRegistry>,
        liveness: Arc<Liveness>,
        event_log: EventLog,
        platform: Arc<dyn PlatformStore>,
        tokens: Arc<dyn TokenIssuer>,
        icons: Arc<dyn IconGenerator>,
        policy: BotPolicy,
    ) -> Self {
        Self {
            registry,
            liveness,
            event_log,
            platform,
            tokens,
            icons,
            policy: RwLock::new(policy),
        }
    }

    pub fn registry(&self) -> &Arc<BotRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> BotPolicy {
        self.policy
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_policy(&self, policy: BotPolicy) {
        *self.policy.write().unwrap_or_else(PoisonError::into_inner) = policy;
    }

    pub async fn get(&self, bot_id: Uuid) -> Result<Arc<Bot>, BotError> {
        self.registry
            .get(bot_id)
            .await
            .ok_or(BotError::NotFound("bot"))
    }

    /// The bot owning the given shadow user.
    pub async fn get_by_bot_user_id(&self, bot_user_id: Uuid) -> Result<Arc<Bot>, BotError> {
        self.registry
            .get_by_bot_user_id(bot_user_id)
            .await
            .ok_or(BotError::NotFound("bot"))
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Arc<Bot>, BotError> {
        self.registry
            .get_by_code(code)
            .await
            .ok_or(BotError::NotFound("bot"))
    }

    pub async fn list_by_creator(&self, creator_id: Uuid) -> Vec<Arc<Bot>> {
        self.registry.list_by_creator(creator_id).await
    }

    pub async fn channels_of(&self, bot_id: Uuid) -> Result<Vec<Uuid>, BotError> {
        self.get(bot_id).await?;
        Ok(self.registry.channels_of(bot_id).await)
    }

    /// Register a bot. It starts out inactive until its first successful
    /// activation.
    pub async fn create(&self, request: CreateBotRequest) -> Result<BotCredentials, BotError> {
        validate_name(&request.name)?;
        validate_display_name(&request.display_name)?;
        validate_post_url(&request.post_url, &self.policy())?;

        let user_name = format!("{BOT_USER_PREFIX}{}", request.name);
        let icon_file_id = self.icons.generate(&user_name).await?;
        let user = NewShadowUser {
            id: Uuid::now_v7(),
            name: user_name,
            display_name: request.display_name,
            icon_file_id,
        };
        let access_token = self
            .tokens
            .issue_token(user.id, &[BOT_TOKEN_SCOPE], i32::MAX);
        let now = OffsetDateTime::now_utc();
        let bot = Bot {
            id: Uuid::now_v7(),
            bot_user_id: user.id,
            description: request.description,
            verification_token: random_credential(),
            post_url: request.post_url,
            subscribe_events: request.subscribe_events,
            privileged: request.privileged,
            state: BotState::Inactive,
            bot_code: random_credential(),
            creator_id: request.creator_id,
            created_at: now,
            updated_at: now,
        };

        let bot = self.registry.insert(bot, &user, &access_token).await?;
        Ok(BotCredentials { bot, access_token })
    }

    /// Apply the given changes. Moving the endpoint pauses the bot until it
    /// is activated again.
    pub async fn update(&self, bot_id: Uuid, request: UpdateBotRequest) -> Result<Arc<Bot>, BotError> {
        if let Some(display_name) = &request.display_name {
            validate_display_name(display_name)?;
        }
        if let Some(post_url) = &request.post_url {
            validate_post_url(post_url, &self.policy())?;
        }
        let UpdateBotRequest {
            display_name,
            description,
            post_url,
            subscribe_events,
            privileged,
        } = request;

        let bot = self
            .registry
            .update(bot_id, display_name.as_deref(), |current| {
                let mut bot = current.clone();
                if let Some(post_url) = post_url
                    && post_url != bot.post_url
                {
                    bot.post_url = post_url;
                    bot.state = BotState::Paused;
                }
                if let Some(description) = description {
                    bot.description = description;
                }
                if let Some(subscribe_events) = subscribe_events {
                    bot.subscribe_events = subscribe_events;
                }
                if let Some(privileged) = privileged {
                    bot.privileged = privileged;
                }
                bot
            })
            .await?;
        Ok(bot)
    }

    /// Operator override of the liveness state.
    pub async fn set_state(&self, bot_id: Uuid, state: BotState) -> Result<Arc<Bot>, BotError> {
        Ok(self.registry.set_state(bot_id, state).await?)
    }

    /// New verification token, bot code and access token. The old access
    /// tokens are revoked and the bot is paused.
    pub async fn reissue(&self, bot_id: Uuid) -> Result<BotCredentials, BotError> {
        let current = self.get(bot_id).await?;
        let access_token =
            self.tokens
                .issue_token(current.bot_user_id, &[BOT_TOKEN_SCOPE], i32::MAX);
        let bot = self
            .registry
            .reissue(bot_id, random_credential(), random_credential(), &access_token)
            .await?;
        Ok(BotCredentials { bot, access_token })
    }

    pub async fn delete(&self, bot_id: Uuid) -> Result<(), BotError> {
        Ok(self.registry.delete(bot_id).await?)
    }

    /// Ping the bot and activate or pause it by the outcome.
    pub async fn activate(&self, bot_id: Uuid) -> Result<PingResult, BotError> {
        let result = self.liveness.ping(bot_id).await?;
        info!(
            bot_id = %bot_id,
            state = %result.bot.state,
            "Bot activation finished"
        );
        Ok(result)
    }

    /// Add the bot to a channel. Returns false when it already was a member.
    pub async fn join(&self, bot_id: Uuid, channel_id: Uuid) -> Result<bool, BotError> {
        self.get(bot_id).await?;
        let channel = self
            .platform
            .get_channel(channel_id)
            .await?
            .ok_or(BotError::NotFound("channel"))?;
        if channel.is_dm {
            return Err(BotError::InvalidArgument(
                "bots cannot join direct message channels".to_string(),
            ));
        }
        Ok(self.registry.join(bot_id, channel_id).await?)
    }

    /// Remove the bot from a channel. Returns false when it was not a member.
    pub async fn leave(&self, bot_id: Uuid, channel_id: Uuid) -> Result<bool, BotError> {
        self.get(bot_id).await?;
        Ok(self.registry.leave(bot_id, channel_id).await?)
    }

    /// Delivery records of the bot, newest first.
    pub async fn event_logs(
        &self,
        bot_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<BotEventLog>, BotError> {
        self.get(bot_id).await?;
        Ok(self.event_log.list(bot_id, limit, offset).await?)
    }
}
