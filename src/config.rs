//! Configuration for the media scanner client

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::ClientError;
use crate::models::MediaTypeFlag;

/// Default provider authority
pub const DEFAULT_AUTHORITY: &str = "com.zhonghong.scanner.provider";

/// Default path of the media table
pub const DEFAULT_MEDIA_PATH: &str = "media";

/// Default path of the scan state table
pub const DEFAULT_SCAN_STATE_PATH: &str = "scanstate";

/// Default action that asks the scanner service for a full scan
pub const DEFAULT_SCAN_ALL_ACTION: &str = "zhonghong.intent.action.MEDIA_SCANNER_SCAN_ALL";

/// Default provider change polling interval (ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 200;

/// Default wait on a locked provider database (ms)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 2000;

/// When listeners hear about scan state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyPolicy {
    /// Only on an idle/scanning transition
    #[default]
    Transitions,
    /// On every change notification, based on the freshly queried state
    EveryChange,
}

/// Configuration for the client and the SQLite provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Provider authority used to build resource URIs
    pub authority: String,

    /// Path of the media table under the authority
    pub media_path: String,

    /// Path of the scan state table under the authority
    pub scan_state_path: String,

    /// Broadcast action requesting a full scan
    pub scan_all_action: String,

    /// Media type flag active on a new client
    pub default_media_type_flag: MediaTypeFlag,

    /// Listener notification policy
    pub notify_policy: NotifyPolicy,

    /// How often the SQLite provider checks for changes (ms)
    pub poll_interval_ms: u64,

    /// How long a provider query waits on a locked database (ms)
    pub busy_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            authority: DEFAULT_AUTHORITY.to_string(),
            media_path: DEFAULT_MEDIA_PATH.to_string(),
            scan_state_path: DEFAULT_SCAN_STATE_PATH.to_string(),
            scan_all_action: DEFAULT_SCAN_ALL_ACTION.to_string(),
            default_media_type_flag: MediaTypeFlag::AUDIO,
            notify_policy: NotifyPolicy::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    /// Create a config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Load a config from a JSON file; absent fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self, ClientError> {
        let text = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// URI of the media catalog
    pub fn media_uri(&self) -> String {
        content_uri(&self.authority, &self.media_path)
    }

    /// URI of the scan state resource
    pub fn scan_state_uri(&self) -> String {
        content_uri(&self.authority, &self.scan_state_path)
    }

    /// Provider polling interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Provider busy timeout
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn content_uri(authority: &str, path: &str) -> String {
    format!("content://{}/{}", authority, path.trim_start_matches('/'))
}

/// Builder for ClientConfig
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the provider authority
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.config.authority = authority.into();
        self
    }

    /// Set the media table path
    pub fn media_path(mut self, path: impl Into<String>) -> Self {
        self.config.media_path = path.into();
        self
    }

    /// Set the scan state table path
    pub fn scan_state_path(mut self, path: impl Into<String>) -> Self {
        self.config.scan_state_path = path.into();
        self
    }

    /// Set the full scan broadcast action
    pub fn scan_all_action(mut self, action: impl Into<String>) -> Self {
        self.config.scan_all_action = action.into();
        self
    }

    /// Set the initial media type flag
    pub fn default_media_type_flag(mut self, flag: MediaTypeFlag) -> Self {
        self.config.default_media_type_flag = flag;
        self
    }

    /// Set the notification policy
    pub fn notify_policy(mut self, policy: NotifyPolicy) -> Self {
        self.config.notify_policy = policy;
        self
    }

    /// Set the provider polling interval
    pub fn poll_interval_ms(mut self, interval: u64) -> Self {
        self.config.poll_interval_ms = interval;
        self
    }

    /// Set the provider busy timeout
    pub fn busy_timeout_ms(mut self, timeout: u64) -> Self {
        self.config.busy_timeout_ms = timeout;
        self
    }

    /// Build the config
    pub fn build(self) -> ClientConfig {
        self.config
    }
}
