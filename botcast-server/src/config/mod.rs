//! Configuration module for botcast-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{AdminConfig, LoggingConfig, ServerConfig};
use botcast_core::bot::{BotPolicy, DeliveryConfig};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub delivery: DeliveryConfig,
    pub policy: BotPolicy,
    pub default_icon: Uuid,
    pub message_origin: String,
    pub logging: LoggingConfig,
    /// The file held a plaintext secret and has been rewritten.
    pub secret_rehashed: bool,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        self.validate(&file_config)?;

        let secret_rehashed = !file_config.is_admin_secret_hashed();
        if secret_rehashed {
            file_config.admin.secret = self.hash_secret(&file_config.admin.secret)?;
            self.rewrite_config(&file_config)?;
        }

        Ok(build_loaded_config(file_config, secret_rehashed))
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.admin.secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "admin secret must not be empty".to_string(),
            ));
        }
        if config.delivery.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "delivery timeout must be at least one second".to_string(),
            ));
        }
        let origin = url::Url::parse(&config.message.origin).map_err(|e| {
            ConfigError::ValidationError(format!("message origin is not a URL: {e}"))
        })?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError(
                "message origin must be an http(s) URL".to_string(),
            ));
        }
        Ok(())
    }

    fn hash_secret(&self, plaintext: &str) -> Result<String, ConfigError> {
        use argon2::{
            Argon2, PasswordHasher,
            password_hash::{SaltString, rand_core::OsRng},
        };

        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ConfigError::HashError(e.to_string()))
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write to a temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn build_loaded_config(file_config: FileConfig, secret_rehashed: bool) -> LoadedConfig {
    let mut delivery = DeliveryConfig {
        timeout: Duration::from_secs(file_config.delivery.timeout_secs),
        content_limit: file_config.delivery.content_limit,
        ..DeliveryConfig::default()
    };
    if let Some(user_agent) = file_config.delivery.user_agent {
        delivery.user_agent = user_agent;
    }

    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        admin: AdminConfig::new(file_config.admin.secret),
        delivery,
        policy: BotPolicy {
            allow_private_endpoints: file_config.bots.allow_private_endpoints,
        },
        default_icon: file_config.bots.default_icon,
        message_origin: file_config.message.origin,
        logging: LoggingConfig {
            json: file_config.logging.json,
        },
        secret_rehashed,
    }
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("botcast-config-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    const PLAINTEXT: &str = r#"
[admin]
secret = "hunter2"

[delivery]
timeout_secs = 2
user_agent = "probe/1"

[bots]
allow_private_endpoints = true

[message]
origin = "https://q.example.com"
"#;

    #[test]
    fn plaintext_secret_is_hashed_and_rewritten() {
        let path = write_config("botcast-config.toml", PLAINTEXT);
        let loader = ConfigLoader::new(&path, None);

        let loaded = loader.load().unwrap();
        assert!(loaded.secret_rehashed);
        assert!(loaded.admin.verify_secret("hunter2"));
        assert_eq!(loaded.delivery.timeout, Duration::from_secs(2));
        assert_eq!(loaded.delivery.user_agent, "probe/1");
        assert!(loaded.policy.allow_private_endpoints);

        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains("$argon2"));
        assert!(!rewritten.contains("hunter2"));

        let reloaded = loader.reload().unwrap();
        assert!(!reloaded.secret_rehashed);
        assert!(reloaded.admin.verify_secret("hunter2"));
    }

    #[test]
    fn listen_override_wins() {
        let path = write_config("botcast-config.toml", PLAINTEXT);
        let listen: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        let loaded = ConfigLoader::new(&path, Some(listen)).load().unwrap();
        assert_eq!(loaded.server.listen, listen);
    }

    #[test]
    fn invalid_origin_is_rejected() {
        let path = write_config(
            "botcast-config.toml",
            r#"
[admin]
secret = "hunter2"

[message]
origin = "not a url"
"#,
        );
        let result = ConfigLoader::new(&path, None).load();
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
