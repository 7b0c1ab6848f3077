//! PaiwanTalk desktop companion: selection bubble, translate panel, context-menu
//! handoff and chat, all talking to the PaiwanTalk HTTP API.

pub mod api;
pub mod bubble;
pub mod chat;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logger;
pub mod popup;
pub mod settings;

pub use api::{ApiClient, ChatBackend, TranslationBackend};
pub use config::Config;
pub use error::{ClientError, StoreError};
pub use settings::{JsonFileStore, MemoryStore, Settings, SettingsStore};
