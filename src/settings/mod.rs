//! TOML-based settings for hubdesk.
//!
//! Settings are loaded from `~/.hubdesk/settings.toml` with environment
//! variable interpolation support. This is the settings collaborator the core
//! talks to: the session snapshot of the local state index and the stored
//! token are the only things the core persists through it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use hubdesk_lib::settings::SettingsManager;
//!
//! let manager = SettingsManager::new().await?;
//! let settings = manager.resolved().await;
//! let endpoint = &settings.hub.endpoint;
//! ```

pub mod loader;
pub mod schema;

pub use loader::{settings_path, SettingsManager};
pub use schema::{
    HubConnectionSettings, HubSettings, RetrySettings, UploadSettings, WindowSettings,
};
