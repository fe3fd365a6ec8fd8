//! Accessibility settings store
//!
//! One schema, one place that validates and persists it, and a broadcast of
//! every accepted change to whoever applies the settings.

use crate::error::{AuthzError, Result};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

/// Storage key of the accessibility settings
pub const SETTINGS_KEY: &str = "accessibility-settings";

/// Storage key of one principal's accessibility settings
pub fn settings_key(principal_id: &str) -> String {
    format!("{}:{}", SETTINGS_KEY, principal_id)
}

/// Languages the platform ships translations for
pub const SUPPORTED_LANGUAGES: &[&str] = &["pt", "en", "es"];

const FONT_SIZE_RANGE: RangeInclusive<u8> = 12..=24;
const FONT_SIZE_STEP: u8 = 2;
const LINE_SPACING_RANGE: RangeInclusive<f32> = 1.0..=3.0;
const LETTER_SPACING_RANGE: RangeInclusive<f32> = 0.0..=5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Persisted accessibility settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccessibilitySettings {
    /// Base font size in pixels
    pub font_size: u8,
    pub high_contrast: bool,
    pub line_spacing: f32,
    /// Letter spacing in pixels
    pub letter_spacing: f32,
    pub theme: Theme,
    pub language: String,
}

impl Default for AccessibilitySettings {
    fn default() -> Self {
        Self {
            font_size: 16,
            high_contrast: false,
            line_spacing: 1.5,
            letter_spacing: 0.0,
            theme: Theme::System,
            language: "pt".to_string(),
        }
    }
}

impl AccessibilitySettings {
    /// Reject values outside the supported ranges
    pub fn validate(&self) -> Result<()> {
        if !FONT_SIZE_RANGE.contains(&self.font_size) {
            return Err(AuthzError::Settings(format!(
                "fontSize {} outside {:?}",
                self.font_size, FONT_SIZE_RANGE
            )));
        }
        if (self.font_size - FONT_SIZE_RANGE.start()) % FONT_SIZE_STEP != 0 {
            return Err(AuthzError::Settings(format!(
                "fontSize {} is not a multiple of {} from {}",
                self.font_size,
                FONT_SIZE_STEP,
                FONT_SIZE_RANGE.start()
            )));
        }
        if !LINE_SPACING_RANGE.contains(&self.line_spacing) {
            return Err(AuthzError::Settings(format!(
                "lineSpacing {} outside {:?}",
                self.line_spacing, LINE_SPACING_RANGE
            )));
        }
        if !LETTER_SPACING_RANGE.contains(&self.letter_spacing) {
            return Err(AuthzError::Settings(format!(
                "letterSpacing {} outside {:?}",
                self.letter_spacing, LETTER_SPACING_RANGE
            )));
        }
        if !SUPPORTED_LANGUAGES.contains(&self.language.as_str()) {
            return Err(AuthzError::Settings(format!(
                "unsupported language {:?}",
                self.language
            )));
        }
        Ok(())
    }
}

/// Key/value persistence for settings documents
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>>;
    async fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// Volatile backend, mostly for tests
#[derive(Default)]
pub struct InMemorySettingsBackend {
    values: RwLock<HashMap<String, String>>,
}

impl InMemorySettingsBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsBackend for InMemorySettingsBackend {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON file per key inside a directory
pub struct JsonFileSettingsBackend {
    dir: PathBuf,
}

impl JsonFileSettingsBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File holding `key`; keys that could escape the directory are rejected
    fn path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':' | '@'));

        if !valid || key.contains("..") {
            return Err(AuthzError::Settings(format!("invalid settings key {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl SettingsBackend for JsonFileSettingsBackend {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path(key)?).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write then rename so a crash never leaves a truncated document
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Published after every accepted change
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsChange {
    pub settings: AccessibilitySettings,
    pub changed_at: DateTime<Utc>,
}

/// Validated, persisted accessibility settings with change notifications
pub struct SettingsStore {
    backend: Arc<dyn SettingsBackend>,
    key: String,
    current: RwLock<AccessibilitySettings>,
    events: broadcast::Sender<SettingsChange>,
}

impl SettingsStore {
    /// Load the settings stored under [`SETTINGS_KEY`]
    pub async fn load(backend: Arc<dyn SettingsBackend>) -> Result<Self> {
        Self::load_key(backend, SETTINGS_KEY).await
    }

    /// Load the settings stored under `key`
    ///
    /// A missing, unparsable or out-of-range document falls back to the
    /// defaults; backend I/O errors are returned.
    pub async fn load_key(backend: Arc<dyn SettingsBackend>, key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let settings = match backend.load(&key).await? {
            None => AccessibilitySettings::default(),
            Some(raw) => match serde_json::from_str::<AccessibilitySettings>(&raw) {
                Ok(settings) if settings.validate().is_ok() => settings,
                Ok(settings) => {
                    warn!(key = %key, ?settings, "Stored settings out of range, using defaults");
                    AccessibilitySettings::default()
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Stored settings unreadable, using defaults");
                    AccessibilitySettings::default()
                }
            },
        };

        let (events, _) = broadcast::channel(16);

        Ok(Self {
            backend,
            key,
            current: RwLock::new(settings),
            events,
        })
    }

    /// Current settings
    pub async fn get(&self) -> AccessibilitySettings {
        self.current.read().await.clone()
    }

    /// Receive every accepted change
    pub fn subscribe(&self) -> broadcast::Receiver<SettingsChange> {
        self.events.subscribe()
    }

    /// Apply `edit`, validate, persist and publish
    ///
    /// Rejected edits leave the stored settings untouched. Edits that change
    /// nothing are neither persisted nor published.
    pub async fn update<F>(&self, edit: F) -> Result<AccessibilitySettings>
    where
        F: FnOnce(&mut AccessibilitySettings),
    {
        let mut current = self.current.write().await;

        let mut next = current.clone();
        edit(&mut next);
        next.validate()?;

        if next == *current {
            return Ok(next);
        }

        let raw = serde_json::to_string(&next)?;
        self.backend.save(&self.key, &raw).await?;
        *current = next.clone();

        debug!(key = %self.key, settings = ?next, "Accessibility settings changed");

        // No subscribers is fine
        let _ = self.events.send(SettingsChange {
            settings: next.clone(),
            changed_at: Utc::now(),
        });

        Ok(next)
    }

    /// Replace all settings
    pub async fn set(&self, settings: AccessibilitySettings) -> Result<AccessibilitySettings> {
        self.update(move |current| *current = settings).await
    }

    /// Restore the defaults
    pub async fn reset(&self) -> Result<AccessibilitySettings> {
        self.set(AccessibilitySettings::default()).await
    }

    /// One step larger, capped at the maximum
    pub async fn increase_font_size(&self) -> Result<AccessibilitySettings> {
        self.update(|s| {
            s.font_size = s
                .font_size
                .saturating_add(FONT_SIZE_STEP)
                .min(*FONT_SIZE_RANGE.end())
        })
        .await
    }

    /// One step smaller, capped at the minimum
    pub async fn decrease_font_size(&self) -> Result<AccessibilitySettings> {
        self.update(|s| {
            s.font_size = s
                .font_size
                .saturating_sub(FONT_SIZE_STEP)
                .max(*FONT_SIZE_RANGE.start())
        })
        .await
    }

    pub async fn toggle_high_contrast(&self) -> Result<AccessibilitySettings> {
        self.update(|s| s.high_contrast = !s.high_contrast).await
    }
}

/// One [`SettingsStore`] per principal, loaded on first use
pub struct SettingsRegistry {
    backend: Arc<dyn SettingsBackend>,
    stores: DashMap<String, Arc<SettingsStore>>,
}

impl SettingsRegistry {
    pub fn new(backend: Arc<dyn SettingsBackend>) -> Self {
        Self {
            backend,
            stores: DashMap::new(),
        }
    }

    /// Store of `principal_id`, loading it from the backend if needed
    pub async fn for_principal(&self, principal_id: &str) -> Result<Arc<SettingsStore>> {
        if let Some(store) = self.stores.get(principal_id) {
            return Ok(store.clone());
        }

        let store = Arc::new(
            SettingsStore::load_key(self.backend.clone(), settings_key(principal_id)).await?,
        );

        // A concurrent first request may have won; keep whichever landed first
        Ok(self
            .stores
            .entry(principal_id.to_string())
            .or_insert(store)
            .clone())
    }

    /// Number of loaded stores
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SettingsStore {
        SettingsStore::load(Arc::new(InMemorySettingsBackend::new()))
            .await
            .unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = AccessibilitySettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.font_size, 16);
        assert_eq!(settings.line_spacing, 1.5);
    }

    #[test]
    fn test_validation_ranges() {
        let mut settings = AccessibilitySettings::default();
        settings.font_size = 30;
        assert!(settings.validate().is_err());

        let mut settings = AccessibilitySettings::default();
        settings.line_spacing = f32::NAN;
        assert!(settings.validate().is_err());

        let mut settings = AccessibilitySettings::default();
        settings.language = "fr".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_font_size_must_follow_step() {
        let mut settings = AccessibilitySettings::default();
        settings.font_size = 13;
        assert!(matches!(settings.validate(), Err(AuthzError::Settings(_))));

        settings.font_size = 14;
        assert!(settings.validate().is_ok());
    }

    #[tokio::test]
    async fn test_registry_isolates_principals() {
        let registry = SettingsRegistry::new(Arc::new(InMemorySettingsBackend::new()));

        let alice = registry.for_principal("alice").await.unwrap();
        alice.toggle_high_contrast().await.unwrap();

        let bob = registry.for_principal("bob").await.unwrap();
        assert!(!bob.get().await.high_contrast);

        let again = registry.for_principal("alice").await.unwrap();
        assert!(Arc::ptr_eq(&alice, &again));
        assert!(again.get().await.high_contrast);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_file_keys_cannot_escape_dir() {
        let backend = JsonFileSettingsBackend::new("/tmp/settings");

        assert!(backend.path(&settings_key("user-1@school")).is_ok());
        assert!(backend.path("../etc/passwd").is_err());
        assert!(backend.path(&settings_key("a/b")).is_err());
        assert!(backend.path("").is_err());
    }

    #[tokio::test]
    async fn test_font_size_clamped() {
        let store = store().await;

        for _ in 0..10 {
            store.increase_font_size().await.unwrap();
        }
        assert_eq!(store.get().await.font_size, 24);

        for _ in 0..10 {
            store.decrease_font_size().await.unwrap();
        }
        assert_eq!(store.get().await.font_size, 12);
    }

    #[tokio::test]
    async fn test_rejected_update_keeps_state() {
        let store = store().await;

        let result = store.update(|s| s.letter_spacing = 9.0).await;
        assert!(matches!(result, Err(AuthzError::Settings(_))));
        assert_eq!(store.get().await, AccessibilitySettings::default());
    }

    #[tokio::test]
    async fn test_changes_are_published() {
        let store = store().await;
        let mut rx = store.subscribe();

        store.toggle_high_contrast().await.unwrap();
        let change = rx.recv().await.unwrap();
        assert!(change.settings.high_contrast);

        // No-op edit is not published
        store.update(|_| {}).await.unwrap();
        assert!(rx.try_recv().is_err());
    }
}
