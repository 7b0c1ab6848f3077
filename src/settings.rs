//! Persisted key/value settings shared by the dispatcher and the popup.
//!
//! The whole persisted surface is three keys: `model_mode`, `pending_text` and
//! `pending_translate`. Missing keys read back as their defaults.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::api::DEFAULT_MODEL_MODE;
use crate::error::StoreError;
use crate::logger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model_mode: String,
    pub pending_text: String,
    pub pending_translate: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model_mode: DEFAULT_MODEL_MODE.to_string(),
            pending_text: String::new(),
            pending_translate: false,
        }
    }
}

impl Settings {
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(v) = &patch.model_mode {
            self.model_mode = v.clone();
        }
        if let Some(v) = &patch.pending_text {
            self.pending_text = v.clone();
        }
        if let Some(v) = patch.pending_translate {
            self.pending_translate = v;
        }
    }

    /// Stored mode, or the default when blank.
    pub fn effective_model_mode(&self) -> &str {
        if self.model_mode.trim().is_empty() {
            DEFAULT_MODEL_MODE
        } else {
            &self.model_mode
        }
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub model_mode: Option<String>,
    pub pending_text: Option<String>,
    pub pending_translate: Option<bool>,
}

impl SettingsPatch {
    pub fn model_mode(value: impl Into<String>) -> Self {
        Self {
            model_mode: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn pending(text: impl Into<String>) -> Self {
        Self {
            pending_text: Some(text.into()),
            pending_translate: Some(true),
            ..Self::default()
        }
    }

    pub fn consumed() -> Self {
        Self {
            pending_translate: Some(false),
            ..Self::default()
        }
    }
}

pub trait SettingsStore: Send + Sync {
    fn get(&self) -> impl Future<Output = Result<Settings, StoreError>> + Send;
    fn set(&self, patch: SettingsPatch) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Reads settings, logging and falling back to defaults on failure.
pub async fn get_or_default<S: SettingsStore>(store: &S) -> Settings {
    match store.get().await {
        Ok(s) => s,
        Err(e) => {
            logger::warn(&format!("Settings read failed, using defaults: {}", e));
            Settings::default()
        }
    }
}

/// Writes a patch, logging any failure.
pub async fn set_logged<S: SettingsStore>(store: &S, patch: SettingsPatch) -> bool {
    match store.set(patch).await {
        Ok(()) => true,
        Err(e) => {
            logger::warn(&format!("Settings write failed: {}", e));
            false
        }
    }
}

pub struct JsonFileStore {
    path: PathBuf,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Settings, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(s) if s.trim().is_empty() => Ok(Settings::default()),
            Ok(s) => Ok(serde_json::from_str(&s)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Settings::default()),
            Err(e) => Err(e.into()),
        }
    }
}

impl SettingsStore for JsonFileStore {
    async fn get(&self) -> Result<Settings, StoreError> {
        self.read().await
    }

    async fn set(&self, patch: SettingsPatch) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut current = match self.read().await {
            Ok(s) => s,
            Err(StoreError::Format(e)) => {
                logger::warn(&format!(
                    "Settings file {} is malformed, rewriting from defaults: {}",
                    self.path.display(),
                    e
                ));
                Settings::default()
            }
            Err(e) => return Err(e),
        };
        current.apply(&patch);
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }
        let s = serde_json::to_string_pretty(&current)?;
        // Readers never see a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, s).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// In-process store. `fail` makes every call error, for exercising fallbacks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Settings>,
    fail: AtomicBool,
}

impl MemoryStore {
    pub fn new(initial: Settings) -> Self {
        Self {
            inner: Mutex::new(initial),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Settings {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.fail.load(Ordering::Relaxed) {
            Err(StoreError::Io("memory store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SettingsStore for MemoryStore {
    async fn get(&self) -> Result<Settings, StoreError> {
        self.check()?;
        Ok(self.snapshot())
    }

    async fn set(&self, patch: SettingsPatch) -> Result<(), StoreError> {
        self.check()?;
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(&patch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));
        assert_eq!(store.get().await.unwrap(), Settings::default());
    }

    #[tokio::test]
    async fn partial_set_keeps_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested").join("settings.json"));
        store.set(SettingsPatch::model_mode("openai_only")).await.unwrap();
        store.set(SettingsPatch::pending("sinvadan")).await.unwrap();
        store.set(SettingsPatch::consumed()).await.unwrap();

        let s = store.get().await.unwrap();
        assert_eq!(s.model_mode, "openai_only");
        assert_eq!(s.pending_text, "sinvadan");
        assert!(!s.pending_translate);
    }

    #[tokio::test]
    async fn missing_keys_in_file_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"pending_text":"a"}"#).unwrap();
        let s = JsonFileStore::new(&path).get().await.unwrap();
        assert_eq!(s.model_mode, "default");
        assert_eq!(s.pending_text, "a");
    }

    #[tokio::test]
    async fn corrupt_file_errors_but_helper_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{broken").unwrap();
        let store = JsonFileStore::new(&path);
        assert!(matches!(store.get().await, Err(StoreError::Format(_))));
        assert_eq!(get_or_default(&store).await, Settings::default());
    }

    #[tokio::test]
    async fn truncated_file_is_replaced_on_next_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"model_mode":"vllm_on"#).unwrap();
        let store = JsonFileStore::new(&path);

        store.set(SettingsPatch::model_mode("openai_only")).await.unwrap();
        store.set(SettingsPatch::pending("kina")).await.unwrap();

        let s = store.get().await.unwrap();
        assert_eq!(s.model_mode, "openai_only");
        assert_eq!(s.pending_text, "kina");
        assert!(s.pending_translate);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn concurrent_writes_both_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));

        let (a, b) = tokio::join!(
            store.set(SettingsPatch::model_mode("vllm_only")),
            store.set(SettingsPatch::pending("kina")),
        );
        a.unwrap();
        b.unwrap();

        let s = store.get().await.unwrap();
        assert_eq!(s.model_mode, "vllm_only");
        assert_eq!(s.pending_text, "kina");
        assert!(s.pending_translate);
    }

    #[tokio::test]
    async fn failing_memory_store_falls_back_and_reports() {
        let store = MemoryStore::new(Settings {
            model_mode: "vllm_only".to_string(),
            ..Settings::default()
        });
        store.set_failing(true);
        assert_eq!(get_or_default(&store).await.model_mode, "default");
        assert!(!set_logged(&store, SettingsPatch::consumed()).await);
    }

    #[test]
    fn blank_model_mode_is_default() {
        let s = Settings {
            model_mode: "  ".to_string(),
            ..Settings::default()
        };
        assert_eq!(s.effective_model_mode(), "default");
    }
}
