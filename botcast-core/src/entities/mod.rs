pub mod access_token;
pub mod bot;
pub mod bot_channel;
pub mod event_log;
pub mod platform;

use botcast_sdk::objects::BotState as SdkBotState;

/// Bot liveness state for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `botcast_sdk::objects::BotState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "bot_state")]
pub enum BotState {
    Inactive,
    Active,
    Paused,
}

impl From<BotState> for SdkBotState {
    fn from(value: BotState) -> Self {
        match value {
            BotState::Inactive => SdkBotState::Inactive,
            BotState::Active => SdkBotState::Active,
            BotState::Paused => SdkBotState::Paused,
        }
    }
}

impl From<SdkBotState> for BotState {
    fn from(value: SdkBotState) -> Self {
        match value {
            SdkBotState::Inactive => BotState::Inactive,
            SdkBotState::Active => BotState::Active,
            SdkBotState::Paused => BotState::Paused,
        }
    }
}

impl std::fmt::Display for BotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        SdkBotState::from(*self).fmt(f)
    }
}
