//! Conference Controller configuration.
//!
//! Configuration is loaded from environment variables. The media platform
//! password is held as a [`SecretString`] and redacted in Debug output.

use common::secret::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default join code length in digits (matches a 7-digit phone prompt).
pub const DEFAULT_JOIN_CODE_LENGTH: u32 = 7;

/// Largest join code length accepted (10^9 still fits in a `u32`).
pub const MAX_JOIN_CODE_LENGTH: u32 = 9;

/// Default participant cleanup timeout in seconds (4 hours).
pub const DEFAULT_PARTICIPANT_CLEANUP_SECONDS: u64 = 14_400;

/// Default drain period in seconds before shutdown.
pub const DEFAULT_DRAIN_SECONDS: u64 = 5;

/// Default CC instance ID prefix.
pub const DEFAULT_CC_ID_PREFIX: &str = "cc";

/// Conference Controller configuration.
#[derive(Clone)]
pub struct Config {
    /// HTTP server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Unique identifier for this CC instance.
    pub instance_id: String,

    /// Base URL of the media platform REST API.
    pub platform_api_url: String,

    /// Account identifier on the media platform.
    pub platform_account_id: String,

    /// Media platform API username.
    pub platform_username: String,

    /// Media platform API password.
    pub platform_password: SecretString,

    /// URL the platform posts participant events to.
    pub platform_callback_url: String,

    /// WebSocket URL handed to web clients alongside their device token.
    pub device_websocket_url: String,

    /// Number of digits in a join code (1-9, default 7).
    pub join_code_length: u32,

    /// Safety-net timeout after which an admitted participant is removed.
    pub participant_cleanup_seconds: u64,

    /// Seconds to wait after marking not-ready before shutting down.
    pub drain_seconds: u64,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("instance_id", &self.instance_id)
            .field("platform_api_url", &self.platform_api_url)
            .field("platform_account_id", &self.platform_account_id)
            .field("platform_username", &self.platform_username)
            .field("platform_password", &"[REDACTED]")
            .field("platform_callback_url", &self.platform_callback_url)
            .field("device_websocket_url", &self.device_websocket_url)
            .field("join_code_length", &self.join_code_length)
            .field(
                "participant_cleanup_seconds",
                &self.participant_cleanup_seconds,
            )
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |name: &str| -> Result<String, ConfigError> {
            vars.get(name)
                .filter(|v| !v.trim().is_empty())
                .cloned()
                .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
        };

        let platform_api_url = required("PLATFORM_API_URL")?
            .trim_end_matches('/')
            .to_string();
        let platform_account_id = required("PLATFORM_ACCOUNT_ID")?;
        let platform_username = required("PLATFORM_USERNAME")?;
        let platform_password = SecretString::from(required("PLATFORM_PASSWORD")?);
        let platform_callback_url = required("PLATFORM_CALLBACK_URL")?;
        let device_websocket_url = required("DEVICE_WEBSOCKET_URL")?;

        let bind_address = vars
            .get("CC_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let instance_id = vars
            .get("CC_INSTANCE_ID")
            .cloned()
            .unwrap_or_else(generate_instance_id);

        let join_code_length = if let Some(value_str) = vars.get("CC_JOIN_CODE_LENGTH") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidValue(format!(
                    "CC_JOIN_CODE_LENGTH must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;

            if value == 0 || value > MAX_JOIN_CODE_LENGTH {
                return Err(ConfigError::InvalidValue(format!(
                    "CC_JOIN_CODE_LENGTH must be between 1 and {MAX_JOIN_CODE_LENGTH}, got {value}"
                )));
            }

            value
        } else {
            DEFAULT_JOIN_CODE_LENGTH
        };

        let participant_cleanup_seconds =
            if let Some(value_str) = vars.get("CC_PARTICIPANT_CLEANUP_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidValue(format!(
                        "CC_PARTICIPANT_CLEANUP_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidValue(
                        "CC_PARTICIPANT_CLEANUP_SECONDS must be greater than 0".to_string(),
                    ));
                }

                value
            } else {
                DEFAULT_PARTICIPANT_CLEANUP_SECONDS
            };

        let drain_seconds = vars
            .get("CC_DRAIN_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DRAIN_SECONDS);

        Ok(Config {
            bind_address,
            instance_id,
            platform_api_url,
            platform_account_id,
            platform_username,
            platform_password,
            platform_callback_url,
            device_websocket_url,
            join_code_length,
            participant_cleanup_seconds,
            drain_seconds,
        })
    }

    /// Cleanup timeout as a `Duration`.
    pub fn participant_cleanup_after(&self) -> Duration {
        Duration::from_secs(self.participant_cleanup_seconds)
    }

    /// Exposes the platform password for building the HTTP client.
    pub fn platform_password(&self) -> &str {
        self.platform_password.expose_secret()
    }
}

/// Generate a unique instance ID: `cc-{hostname}-{uuid8}`.
fn generate_instance_id() -> String {
    let hostname = env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
    let suffix = uuid::Uuid::new_v4().to_string();
    let short = suffix.get(..8).unwrap_or(&suffix);
    format!("{DEFAULT_CC_ID_PREFIX}-{hostname}-{short}")
}
