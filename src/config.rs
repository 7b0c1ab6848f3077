use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::logger::exe_dir;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_CHAT_ENDPOINT: &str = "http://localhost:5678/webhook-test/paiwan-chat";
const TRANSLATE_PATH: &str = "/api/translate_simple";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base: String,
    pub chat_endpoint: String,
    pub settings_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    /// No timeout when unset; a hung request stays in its loading state.
    pub request_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            chat_endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            settings_path: None,
            log_path: None,
            request_timeout_secs: None,
        }
    }
}

impl Config {
    pub fn path() -> PathBuf {
        exe_dir().join("config.json")
    }

    pub fn load() -> Self {
        match fs::read_to_string(Self::path()) {
            Ok(s) => Self::from_json_str(&s),
            Err(_) => Self::default(),
        }
    }

    /// Malformed input falls back to defaults.
    pub fn from_json_str(s: &str) -> Self {
        serde_json::from_str::<Config>(s).unwrap_or_default()
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(v) = get("PAIWANTALK_API_BASE") {
            self.api_base = v;
        }
        if let Some(v) = get("PAIWANTALK_CHAT_URL") {
            self.chat_endpoint = v;
        }
        if let Some(v) = get("PAIWANTALK_SETTINGS") {
            self.settings_path = Some(PathBuf::from(v));
        }
    }

    pub fn translate_url(&self) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), TRANSLATE_PATH)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.settings_path
            .clone()
            .unwrap_or_else(|| exe_dir().join("settings.json"))
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| exe_dir().join("log.txt"))
    }
}
