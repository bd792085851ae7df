//! Configuration for the gateway and its protocol adapter.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::error::{BridgeError, BridgeResult};

/// Images above this size are rejected.
pub const MAX_IMAGE_SIZE: u64 = 10 * 1024 * 1024;
/// Every other category is capped here.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Backend connection settings.
    pub backend: BackendConfig,
    /// Attachment upload settings.
    pub upload: UploadConfig,
    /// Upload cache settings.
    pub cache: CacheConfig,
    /// Bot envelope settings.
    pub bot: BotConfig,
    /// HTTP surface settings.
    pub server: ServerConfig,
}

impl GatewayConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load defaults and apply `BRIDGE_*` environment overrides.
    ///
    /// # Errors
    /// Returns an error if an override cannot be parsed or the result is invalid.
    pub fn from_env() -> BridgeResult<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("BRIDGE_BASE_URL") {
            config.backend.base_url = url;
        }
        if let Ok(cookie) = std::env::var("BRIDGE_COOKIE") {
            config.backend.cookie = cookie;
        }
        if let Ok(uid) = std::env::var("BRIDGE_BOT_UID") {
            config.bot.bot_uid = uid;
        }
        if let Ok(flag) = std::env::var("BRIDGE_CUSTOM_BOT") {
            config.bot.custom_bot_mode = parse_env("BRIDGE_CUSTOM_BOT", &flag)?;
        }
        if let Ok(token) = std::env::var("BRIDGE_BEARER_TOKEN") {
            config.server.bearer_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Ok(host) = std::env::var("BRIDGE_HOST") {
            config.server.host = parse_env("BRIDGE_HOST", &host)?;
        }
        if let Ok(port) = std::env::var("BRIDGE_PORT") {
            config.server.port = parse_env("BRIDGE_PORT", &port)?;
        }
        if let Ok(limit) = std::env::var("BRIDGE_MAX_CONCURRENT_UPLOADS") {
            config.upload.max_concurrent_uploads =
                parse_env("BRIDGE_MAX_CONCURRENT_UPLOADS", &limit)?;
        }
        if let Ok(secs) = std::env::var("BRIDGE_UPLOAD_TIMEOUT_SECS") {
            config.upload.upload_timeout =
                Duration::from_secs(parse_env("BRIDGE_UPLOAD_TIMEOUT_SECS", &secs)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> BridgeResult<()> {
        Url::parse(&self.backend.base_url)?;

        if self.upload.max_concurrent_uploads == 0 {
            return Err(BridgeError::Config(
                "upload.max_concurrent_uploads must be > 0".to_string(),
            ));
        }
        if self.upload.poll_retries == 0 {
            return Err(BridgeError::Config(
                "upload.poll_retries must be > 0".to_string(),
            ));
        }
        if self.upload.upload_timeout.is_zero() {
            return Err(BridgeError::Config(
                "upload.upload_timeout must be > 0".to_string(),
            ));
        }
        if self.upload.max_image_size > self.upload.max_file_size {
            return Err(BridgeError::Config(
                "upload.max_image_size must not exceed upload.max_file_size".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(BridgeError::Config(
                "cache.max_entries must be > 0".to_string(),
            ));
        }
        if self.bot.custom_bot_mode && self.bot.bot_uid.is_empty() {
            return Err(BridgeError::Config(
                "bot.bot_uid is required in custom bot mode".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> BridgeResult<T> {
    raw.trim()
        .parse()
        .map_err(|_| BridgeError::Config(format!("{name} has an invalid value: {raw}")))
}

/// Backend connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendConfig {
    /// API base URL; endpoint paths are appended to it.
    pub base_url: String,
    /// Session cookie sent with every backend call.
    pub cookie: String,
    /// User agent for backend calls.
    pub user_agent: String,
    /// Per-request timeout.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.monica.im/api".to_string(),
            cookie: String::new(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl BackendConfig {
    /// Join an endpoint path onto the base URL.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Attachment upload settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Shared deadline for all uploads of one message.
    #[serde(with = "duration_serde")]
    pub upload_timeout: Duration,
    /// Maximum simultaneous uploads per message.
    pub max_concurrent_uploads: usize,
    /// Fixed delay between indexing polls.
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,
    /// Maximum number of indexing polls.
    pub poll_retries: u32,
    /// Wall-clock cap on the whole indexing wait.
    #[serde(with = "duration_serde")]
    pub max_index_wait: Duration,
    /// Size ceiling for images (bytes).
    pub max_image_size: u64,
    /// Size ceiling for everything else (bytes).
    pub max_file_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_timeout: Duration::from_secs(60),
            max_concurrent_uploads: 5,
            poll_interval: Duration::from_secs(2),
            poll_retries: 10,
            max_index_wait: Duration::from_secs(30),
            max_image_size: MAX_IMAGE_SIZE,
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

impl UploadConfig {
    /// Set the shared upload deadline.
    #[must_use]
    pub const fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    /// Set the upload concurrency bound.
    #[must_use]
    pub const fn with_max_concurrent_uploads(mut self, limit: usize) -> Self {
        self.max_concurrent_uploads = limit;
        self
    }

    /// Set the polling schedule.
    #[must_use]
    pub const fn with_polling(mut self, interval: Duration, retries: u32) -> Self {
        self.poll_interval = interval;
        self.poll_retries = retries;
        self
    }
}

/// Upload cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether caching is enabled.
    pub enabled: bool,
    /// TTL for cached uploads (seconds).
    pub ttl_seconds: u64,
    /// Maximum number of cached uploads.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 86400, // 24 hours
            max_entries: 1000,
        }
    }
}

/// Bot envelope settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BotConfig {
    /// Send chats through the named custom bot instead of the generic bot chat.
    pub custom_bot_mode: bool,
    /// Custom bot identifier.
    pub bot_uid: String,
    /// Locale for the custom bot envelope.
    pub locale: String,
    /// Response language hint for the custom bot.
    pub response_language: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            custom_bot_mode: false,
            bot_uid: String::new(),
            locale: "zh_CN".to_string(),
            response_language: "Chinese (Simplified)".to_string(),
        }
    }
}

impl BotConfig {
    /// Enable custom bot mode with the given bot.
    #[must_use]
    pub fn with_custom_bot(mut self, bot_uid: impl Into<String>) -> Self {
        self.custom_bot_mode = true;
        self.bot_uid = bot_uid.into();
        self
    }
}

/// HTTP surface settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address.
    pub host: IpAddr,
    /// Listen port.
    pub port: u16,
    /// Bearer token required on `/v1/*` when set.
    pub bearer_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            bearer_token: None,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind.
    #[must_use]
    pub const fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
