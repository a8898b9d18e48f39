//! Settings loading, saving, and environment variable interpolation.
//!
//! The `SettingsManager` handles:
//! - Loading settings from `~/.hubdesk/settings.toml`
//! - Resolving `$VAR` and `${VAR}` environment variable references
//! - Atomic file writes with temp file + rename
//! - First-run template generation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::sync::RwLock;

use super::schema::HubSettings;
use crate::local_state::{LocalStateIndex, LocalStateSnapshot};

/// Embedded template for first-run generation.
const TEMPLATE: &str = include_str!("template.toml");

/// Get the path to the global settings file.
pub fn settings_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".hubdesk")
        .join("settings.toml")
}

/// Manages settings loading, interpolation, and persistence.
pub struct SettingsManager {
    /// Cached settings as written on disk
    settings: RwLock<HubSettings>,

    /// Path to the settings file
    path: PathBuf,
}

impl SettingsManager {
    /// Create a new SettingsManager, loading from disk if available.
    pub async fn new() -> Result<Self> {
        Self::with_path(settings_path()).await
    }

    /// Load from an explicit location.
    pub async fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = Self::load_from_path(&path).await?;

        Ok(Self {
            settings: RwLock::new(settings),
            path,
        })
    }

    async fn load_from_path(path: &Path) -> Result<HubSettings> {
        if !path.exists() {
            tracing::debug!("Settings file not found at {:?}, using defaults", path);
            return Ok(HubSettings::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read settings file")?;

        let settings: HubSettings =
            toml::from_str(&contents).context("Failed to deserialize settings")?;

        tracing::debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Get the current settings (read-only).
    ///
    /// Env var references are left as written so that saving never bakes a
    /// secret into the file; use [`resolved`](Self::resolved) to read them.
    pub async fn get(&self) -> HubSettings {
        self.settings.read().await.clone()
    }

    /// Current settings with `$ENV_VAR` references resolved.
    pub async fn resolved(&self) -> HubSettings {
        let mut settings = self.get().await;
        if let Some(token) = &settings.hub.token {
            if let Some(value) = resolve_env_ref(token) {
                settings.hub.token = Some(value);
            }
        }
        settings
    }

    /// Update settings and persist to disk.
    pub async fn update(&self, new_settings: HubSettings) -> Result<()> {
        *self.settings.write().await = new_settings.clone();

        let toml_string =
            toml::to_string_pretty(&new_settings).context("Failed to serialize settings")?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, &toml_string).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;

        tracing::debug!("Saved settings to {:?}", self.path);
        Ok(())
    }

    /// Get a specific setting by dot-notation key (e.g., "retry.max_retries").
    pub async fn get_value(&self, key: &str) -> Result<serde_json::Value> {
        let settings = self.settings.read().await;
        let json = serde_json::to_value(&*settings)?;

        let mut current = &json;
        for part in key.split('.') {
            current = current
                .get(part)
                .ok_or_else(|| anyhow::anyhow!("Setting '{}' not found", key))?;
        }

        Ok(current.clone())
    }

    /// Set a specific setting by dot-notation key.
    pub async fn set_value(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut settings = self.settings.write().await;
        let mut json = serde_json::to_value(&*settings)?;

        let parts: Vec<&str> = key.split('.').collect();
        set_nested_value(&mut json, &parts, value)?;

        *settings = serde_json::from_value(json)?;
        drop(settings);

        self.update(self.get().await).await
    }

    /// Load the persisted session into `index`.
    pub async fn restore_session(&self, index: &LocalStateIndex) {
        index.restore(self.settings.read().await.session.clone());
    }

    /// Persist `index` as the session snapshot. Skips the write if unchanged.
    pub async fn save_session(&self, index: &LocalStateIndex) -> Result<()> {
        let snapshot: LocalStateSnapshot = index.snapshot();
        let mut settings = self.get().await;
        if settings.session == snapshot {
            return Ok(());
        }
        settings.session = snapshot;
        self.update(settings).await
    }

    /// Get the settings file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure settings file exists, creating from template if needed.
    ///
    /// Returns `true` if a new file was created.
    pub async fn ensure_settings_file(&self) -> Result<bool> {
        if self.path.exists() {
            return Ok(false);
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&self.path, TEMPLATE).await?;
        tracing::info!("Generated settings template at {:?}", self.path);
        Ok(true)
    }

    /// Reload settings from disk.
    pub async fn reload(&self) -> Result<()> {
        let settings = Self::load_from_path(&self.path).await?;
        *self.settings.write().await = settings;
        Ok(())
    }
}

/// Set a value in a nested JSON object using a key path.
fn set_nested_value(
    json: &mut serde_json::Value,
    parts: &[&str],
    value: serde_json::Value,
) -> Result<()> {
    let Some((last, parents)) = parts.split_last() else {
        return Err(anyhow::anyhow!("Empty key path"));
    };

    let mut current = json;
    for part in parents {
        current = current
            .get_mut(*part)
            .ok_or_else(|| anyhow::anyhow!("Setting path '{}' not found", parts.join(".")))?;
    }

    match current.as_object_mut() {
        Some(obj) => {
            obj.insert((*last).to_string(), value);
            Ok(())
        }
        None => Err(anyhow::anyhow!("Cannot set value on non-object")),
    }
}

/// Resolve a $ENV_VAR or ${ENV_VAR} reference.
///
/// Returns `Some(resolved)` if the value starts with `$` and the env var exists.
/// Returns `None` if no env var reference or env var not set.
fn resolve_env_ref(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let name = trimmed.strip_prefix('$')?;
    let name = name
        .strip_prefix('{')
        .and_then(|n| n.strip_suffix('}'))
        .unwrap_or(name);
    std::env::var(name).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{RepoId, RepoKey, RepoKind};

    #[test]
    fn test_resolve_env_ref_formats() {
        std::env::set_var("HUBDESK_TEST_VAR_1", "value_1");

        assert_eq!(resolve_env_ref("$HUBDESK_TEST_VAR_1"), Some("value_1".to_string()));
        assert_eq!(resolve_env_ref("${HUBDESK_TEST_VAR_1}"), Some("value_1".to_string()));

        std::env::remove_var("HUBDESK_TEST_VAR_1");
    }

    #[test]
    fn test_resolve_env_ref_no_match() {
        assert_eq!(resolve_env_ref("regular_value"), None);
        assert_eq!(resolve_env_ref("$NONEXISTENT_VAR_XYZ_12345"), None);
    }

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::with_path(dir.path().join("settings.toml"))
            .await
            .unwrap();

        assert!(!manager.path().exists());
        let value = manager.get_value("retry.max_retries").await.unwrap();
        assert_eq!(value, serde_json::json!(3));
        assert!(manager.get_value("retry.nope").await.is_err());
    }

    #[tokio::test]
    async fn test_set_value_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.toml");
        let manager = SettingsManager::with_path(&path).await.unwrap();

        manager
            .set_value("hub.endpoint", serde_json::json!("https://hub.test"))
            .await
            .unwrap();
        assert!(path.exists());

        let reloaded = SettingsManager::with_path(&path).await.unwrap();
        assert_eq!(reloaded.get().await.hub.endpoint, "https://hub.test");
    }

    #[tokio::test]
    async fn test_token_env_reference_stays_unresolved_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "[hub]\ntoken = \"$HUBDESK_TEST_TOKEN\"\n").unwrap();
        std::env::set_var("HUBDESK_TEST_TOKEN", "hf_secret");

        let manager = SettingsManager::with_path(&path).await.unwrap();
        assert_eq!(manager.resolved().await.hub.token.as_deref(), Some("hf_secret"));

        manager.set_value("retry.jitter", serde_json::json!(false)).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("$HUBDESK_TEST_TOKEN"));
        assert!(!text.contains("hf_secret"));

        std::env::remove_var("HUBDESK_TEST_TOKEN");
    }

    #[tokio::test]
    async fn test_session_save_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let manager = SettingsManager::with_path(&path).await.unwrap();

        let index = LocalStateIndex::new();
        let repo = RepoKey::new(RepoKind::Dataset, RepoId::parse("alice/data").unwrap());
        index.toggle_favorite(&repo);
        manager.save_session(&index).await.unwrap();

        let reloaded = SettingsManager::with_path(&path).await.unwrap();
        let restored = LocalStateIndex::new();
        reloaded.restore_session(&restored).await;
        assert!(restored.is_favorite(&repo));
    }

    #[tokio::test]
    async fn test_template_parses() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SettingsManager::with_path(dir.path().join("settings.toml"))
            .await
            .unwrap();
        assert!(manager.ensure_settings_file().await.unwrap());
        assert!(!manager.ensure_settings_file().await.unwrap());

        manager.reload().await.unwrap();
        assert_eq!(manager.get().await.hub.endpoint, "https://huggingface.co");
    }
}
