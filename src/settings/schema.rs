//! Settings schema definitions for hubdesk.
//!
//! All settings structs use `#[serde(default)]` to allow partial configuration files.
//! Missing fields are filled with sensible defaults.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::commit::default_ignore_patterns;
use crate::local_state::LocalStateSnapshot;
use crate::transport::{
    RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_ENDPOINT, DEFAULT_MAX_DELAY_MS,
    DEFAULT_MAX_RETRIES,
};

/// Root settings structure.
///
/// Loaded from `~/.hubdesk/settings.toml` with environment variable interpolation support.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubSettings {
    /// Schema version for migrations
    pub version: u32,

    /// Remote hub connection
    pub hub: HubConnectionSettings,

    /// Retry and backoff for transient failures
    pub retry: RetrySettings,

    /// Folder upload behavior
    pub upload: UploadSettings,

    /// Favorites and last selections, restored at session start
    pub session: LocalStateSnapshot,

    /// Window state owned by the UI
    pub window: WindowSettings,
}

/// Remote hub connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConnectionSettings {
    /// Base URL of the hub
    pub endpoint: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// Access token (supports $ENV_VAR syntax)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Retry policy for network failures and 5xx answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry, doubled each time
    pub base_delay_ms: u64,

    /// Upper bound on a single delay
    pub max_delay_ms: u64,

    /// Add random jitter to each delay
    pub jitter: bool,
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

/// Folder upload behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Glob patterns skipped when staging a folder
    pub ignore_patterns: Vec<String>,
}

/// Opaque window state. The core never interprets these.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WindowSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Anything else the UI wants to keep
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

// =============================================================================
// Default implementations
// =============================================================================

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            version: 1,
            hub: HubConnectionSettings::default(),
            retry: RetrySettings::default(),
            upload: UploadSettings::default(),
            session: LocalStateSnapshot::default(),
            window: WindowSettings::default(),
        }
    }
}

impl Default for HubConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: 60,
            token: None,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: true,
        }
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            ignore_patterns: default_ignore_patterns(),
        }
    }
}
