//! TOML file configuration structures.
//!
//! These structs directly map to the `botcast-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use uuid::Uuid;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub bots: BotsConfig,
    pub message: MessageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Admin configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    /// The admin secret. If this is plaintext (doesn't start with `$argon2`),
    /// it will be hashed and the config file will be rewritten.
    pub secret: String,
}

/// Outbound event delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Largest response body read from a bot, in bytes.
    #[serde(default = "default_content_limit")]
    pub content_limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            content_limit: default_content_limit(),
            user_agent: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_content_limit() -> usize {
    5 * 1024 * 1024
}

/// Rules for bot registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotsConfig {
    /// Accept post URLs on loopback and private networks.
    #[serde(default)]
    pub allow_private_endpoints: bool,
    /// Icon file given to new bot users.
    #[serde(default)]
    pub default_icon: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageConfig {
    /// Public origin of the platform; URL embeds are recognised under it.
    pub origin: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

impl FileConfig {
    /// Check if the admin secret is already hashed (argon2 format).
    pub fn is_admin_secret_hashed(&self) -> bool {
        self.admin.secret.starts_with("$argon2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config_parsing() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:3000"

[admin]
secret = "test-secret"

[delivery]
timeout_secs = 3
content_limit = 1024
user_agent = "custom/1.0"

[bots]
allow_private_endpoints = true
default_icon = "01890a5d-ac96-774b-bcce-b302099a8057"

[message]
origin = "https://q.example.com"

[logging]
json = true
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 3000);
        assert_eq!(config.delivery.timeout_secs, 3);
        assert_eq!(config.delivery.content_limit, 1024);
        assert_eq!(config.delivery.user_agent.as_deref(), Some("custom/1.0"));
        assert!(config.bots.allow_private_endpoints);
        assert_eq!(config.message.origin, "https://q.example.com");
        assert!(config.logging.json);
        assert!(!config.is_admin_secret_hashed());
    }

    #[test]
    fn test_minimal_config_defaults() {
        let toml_str = r#"
[admin]
secret = "$argon2id$v=19$m=19456,t=2,p=1$abc123"

[message]
origin = "https://q.example.com"
"#;
        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, default_listen_addr());
        assert_eq!(config.delivery.timeout_secs, 5);
        assert_eq!(config.delivery.content_limit, 5 * 1024 * 1024);
        assert!(config.delivery.user_agent.is_none());
        assert!(!config.bots.allow_private_endpoints);
        assert!(config.bots.default_icon.is_nil());
        assert!(!config.logging.json);
        assert!(config.is_admin_secret_hashed());
    }
}
