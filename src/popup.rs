//! Translate panel: manual input, model-mode selector and the pending-text handoff.

use std::sync::{Mutex, PoisonError};

use crate::api::{TranslateRequest, TranslateResponse, TranslationBackend, DEFAULT_MODEL_MODE};
use crate::error::ClientError;
use crate::logger;
use crate::settings::{self, SettingsPatch, SettingsStore};

pub const EMPTY_INPUT_MESSAGE: &str = "請先輸入要翻譯的文字。";
pub const TRANSLATING_MESSAGE: &str = "翻譯中...";
pub const FAILURE_MESSAGE: &str = "呼叫後端翻譯 API 失敗。";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupRequest {
    pub seq: u64,
    pub text: String,
    pub model_mode: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopupController {
    pub input: String,
    pub model_mode: String,
    pub result: String,
    pub thinking: String,
    busy: bool,
    seq: u64,
}

impl Default for PopupController {
    fn default() -> Self {
        Self {
            input: String::new(),
            model_mode: DEFAULT_MODEL_MODE.to_string(),
            result: String::new(),
            thinking: String::new(),
            busy: false,
            seq: 0,
        }
    }
}

impl PopupController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Starts a translation of `text`. Blank input shows the prompt message and
    /// issues nothing.
    pub fn begin(&mut self, text: &str) -> Option<PopupRequest> {
        let t = text.trim();
        if t.is_empty() {
            self.result = EMPTY_INPUT_MESSAGE.to_string();
            self.thinking.clear();
            return None;
        }
        self.seq += 1;
        self.busy = true;
        self.result = TRANSLATING_MESSAGE.to_string();
        self.thinking.clear();
        let model_mode = if self.model_mode.is_empty() {
            DEFAULT_MODEL_MODE.to_string()
        } else {
            self.model_mode.clone()
        };
        Some(PopupRequest {
            seq: self.seq,
            text: t.to_string(),
            model_mode,
        })
    }

    /// Renders a response into the result and thinking regions. Stale responses
    /// are dropped.
    pub fn complete(
        &mut self,
        req: &PopupRequest,
        outcome: Result<TranslateResponse, ClientError>,
    ) -> bool {
        if req.seq != self.seq {
            logger::log(&format!("Popup: dropping response #{} (latest #{})", req.seq, self.seq));
            return false;
        }
        self.busy = false;
        match outcome {
            Ok(resp) => {
                self.result = resp.display_translation().to_string();
                self.thinking = resp.display_thinking().to_string();
            }
            Err(e) => {
                logger::error(&format!("Popup translation failed: {}", e));
                self.result = format!("{} ({})", FAILURE_MESSAGE, e);
                self.thinking = e.to_string();
            }
        }
        true
    }
}

fn lock(ctrl: &Mutex<PopupController>) -> std::sync::MutexGuard<'_, PopupController> {
    ctrl.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Loads saved settings into the panel. When a handoff is pending, clears the
/// flag before returning the text to auto-translate.
pub async fn open<S: SettingsStore>(ctrl: &Mutex<PopupController>, store: &S) -> Option<String> {
    let saved = settings::get_or_default(store).await;
    {
        let mut c = lock(ctrl);
        c.model_mode = saved.effective_model_mode().to_string();
        if !saved.pending_text.is_empty() {
            c.input = saved.pending_text.clone();
        }
    }
    if saved.pending_translate && !saved.pending_text.is_empty() {
        settings::set_logged(store, SettingsPatch::consumed()).await;
        logger::log("Popup: consuming pending translation");
        return Some(saved.pending_text);
    }
    None
}

/// Persists the selector value immediately.
pub async fn change_model_mode<S: SettingsStore>(
    ctrl: &Mutex<PopupController>,
    store: &S,
    value: &str,
) {
    let value = if value.is_empty() { DEFAULT_MODEL_MODE } else { value };
    lock(ctrl).model_mode = value.to_string();
    settings::set_logged(store, SettingsPatch::model_mode(value)).await;
}

pub async fn translate<B: TranslationBackend>(
    ctrl: &Mutex<PopupController>,
    backend: &B,
    text: &str,
) -> bool {
    let begun = lock(ctrl).begin(text);
    let Some(req) = begun else {
        return false;
    };
    let outcome = backend
        .translate(&TranslateRequest::paiwan_to_zh(req.text.clone(), req.model_mode.clone()))
        .await;
    lock(ctrl).complete(&req, outcome)
}

pub async fn submit<B: TranslationBackend>(ctrl: &Mutex<PopupController>, backend: &B) -> bool {
    let text = lock(ctrl).input.clone();
    translate(ctrl, backend, &text).await
}

/// `open` followed by the auto-translate it may request.
pub async fn open_and_autotranslate<B, S>(ctrl: &Mutex<PopupController>, backend: &B, store: &S) -> bool
where
    B: TranslationBackend,
    S: SettingsStore,
{
    match open(ctrl, store).await {
        Some(text) => translate(ctrl, backend, &text).await,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiClient, EMPTY_TRANSLATION};
    use crate::config::Config;
    use crate::settings::{MemoryStore, Settings};
    use mockito::Matcher;
    use serde_json::json;

    struct Fail;
    impl TranslationBackend for Fail {
        async fn translate(&self, _req: &TranslateRequest) -> Result<TranslateResponse, ClientError> {
            Err(ClientError::Network("connection refused".to_string()))
        }
    }

    struct Reply(&'static str);
    impl TranslationBackend for Reply {
        async fn translate(&self, _req: &TranslateRequest) -> Result<TranslateResponse, ClientError> {
            Ok(serde_json::from_str(self.0).unwrap())
        }
    }

    fn pending_store(text: &str) -> MemoryStore {
        MemoryStore::new(Settings {
            model_mode: "vllm_only".to_string(),
            pending_text: text.to_string(),
            pending_translate: true,
        })
    }

    #[test]
    fn blank_input_shows_prompt_without_request() {
        let mut c = PopupController::new();
        c.thinking = "old".to_string();
        assert!(c.begin("   ").is_none());
        assert_eq!(c.result, EMPTY_INPUT_MESSAGE);
        assert_eq!(c.thinking, "");
        assert!(!c.is_busy());
    }

    #[test]
    fn begin_trims_and_shows_progress() {
        let mut c = PopupController::new();
        let req = c.begin("  kasiv ").unwrap();
        assert_eq!(req.text, "kasiv");
        assert_eq!(req.model_mode, "default");
        assert_eq!(c.result, TRANSLATING_MESSAGE);
        assert!(c.is_busy());
    }

    #[tokio::test]
    async fn renders_translation_and_thinking() {
        let ctrl = Mutex::new(PopupController::new());
        translate(&ctrl, &Reply(r#"{"translation":"hello","thinking":"because"}"#), "x").await;
        let c = ctrl.lock().unwrap();
        assert_eq!(c.result, "hello");
        assert_eq!(c.thinking, "because");
    }

    #[tokio::test]
    async fn renders_fallback_for_empty_translation() {
        let ctrl = Mutex::new(PopupController::new());
        translate(&ctrl, &Reply(r#"{"translation":""}"#), "x").await;
        assert_eq!(ctrl.lock().unwrap().result, EMPTY_TRANSLATION);
        translate(&ctrl, &Reply("{}"), "x").await;
        assert_eq!(ctrl.lock().unwrap().result, EMPTY_TRANSLATION);
    }

    #[tokio::test]
    async fn network_failure_shows_message_with_detail() {
        let ctrl = Mutex::new(PopupController::new());
        translate(&ctrl, &Fail, "x").await;
        let c = ctrl.lock().unwrap();
        assert!(c.result.starts_with(FAILURE_MESSAGE));
        assert!(c.result.contains("connection refused"));
        assert!(c.thinking.contains("connection refused"));
        assert!(!c.is_busy());
    }

    #[tokio::test]
    async fn open_consumes_pending_flag_even_if_translate_fails() {
        let store = pending_store("tjaljaljak");
        let ctrl = Mutex::new(PopupController::new());
        assert!(open_and_autotranslate(&ctrl, &Fail, &store).await);

        assert!(!store.snapshot().pending_translate);
        let c = ctrl.lock().unwrap();
        assert_eq!(c.input, "tjaljaljak");
        assert_eq!(c.model_mode, "vllm_only");
        assert!(c.result.starts_with(FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn reopen_does_not_translate_twice() {
        let store = pending_store("tjaljaljak");
        let ctrl = Mutex::new(PopupController::new());
        assert_eq!(open(&ctrl, &store).await.as_deref(), Some("tjaljaljak"));
        assert_eq!(open(&ctrl, &store).await, None);
        // text is still seeded into the input
        assert_eq!(ctrl.lock().unwrap().input, "tjaljaljak");
    }

    #[tokio::test]
    async fn flag_without_text_is_ignored() {
        let store = pending_store("");
        let ctrl = Mutex::new(PopupController::new());
        assert_eq!(open(&ctrl, &store).await, None);
        assert!(store.snapshot().pending_translate);
    }

    #[tokio::test]
    async fn open_with_failing_store_uses_defaults() {
        let store = pending_store("a");
        store.set_failing(true);
        let ctrl = Mutex::new(PopupController::new());
        assert_eq!(open(&ctrl, &store).await, None);
        assert_eq!(ctrl.lock().unwrap().model_mode, "default");
    }

    #[tokio::test]
    async fn model_mode_change_is_written_immediately() {
        let store = MemoryStore::default();
        let ctrl = Mutex::new(PopupController::new());
        change_model_mode(&ctrl, &store, "openai_only").await;
        assert_eq!(store.snapshot().model_mode, "openai_only");
        change_model_mode(&ctrl, &store, "").await;
        assert_eq!(store.snapshot().model_mode, "default");
        assert_eq!(ctrl.lock().unwrap().model_mode, "default");
    }

    #[test]
    fn stale_popup_response_is_dropped() {
        let mut c = PopupController::new();
        let first = c.begin("a").unwrap();
        let second = c.begin("b").unwrap();
        assert!(c.complete(&second, Ok(TranslateResponse {
            translation: Some("B".to_string()),
            thinking: None,
        })));
        assert!(!c.complete(&first, Ok(TranslateResponse {
            translation: Some("A".to_string()),
            thinking: None,
        })));
        assert_eq!(c.result, "B");
    }

    #[tokio::test]
    async fn submit_sends_selected_mode_over_http() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/translate_simple")
            .match_body(Matcher::Json(json!({
                "text": "masalu",
                "direction": "paiwan2zh",
                "model_mode": "openai_only"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"translation":"hello"}"#)
            .create_async()
            .await;
        let cfg = Config {
            api_base: server.url(),
            ..Config::default()
        };
        let client = ApiClient::new(&cfg).unwrap();

        let ctrl = Mutex::new(PopupController::new());
        {
            let mut c = ctrl.lock().unwrap();
            c.input = " masalu ".to_string();
            c.model_mode = "openai_only".to_string();
        }
        assert!(submit(&ctrl, &client).await);
        assert_eq!(ctrl.lock().unwrap().result, "hello");
        mock.assert_async().await;
    }
}
