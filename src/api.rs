//! HTTP client for the PaiwanTalk translation and chat endpoints.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::config::Config;
use crate::error::ClientError;

pub const EMPTY_TRANSLATION: &str = "(沒有取得翻譯結果)";
pub const EMPTY_REPLY: &str = "(空回覆)";
pub const DEFAULT_MODEL_MODE: &str = "default";

/// Model modes the backend router understands, with selector labels.
pub const MODEL_MODES: &[(&str, &str)] = &[
    ("default", "預設（vLLM 優先，失敗改用 OpenAI）"),
    ("vllm_only", "僅使用 vLLM"),
    ("openai_only", "僅使用 OpenAI"),
];

pub fn model_mode_label(mode: &str) -> &str {
    MODEL_MODES
        .iter()
        .find(|(id, _)| *id == mode)
        .map(|(_, label)| *label)
        .unwrap_or(mode)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "paiwan2zh")]
    Paiwan2Zh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslateRequest {
    pub text: String,
    pub direction: Direction,
    pub model_mode: String,
}

impl TranslateRequest {
    pub fn paiwan_to_zh(text: impl Into<String>, model_mode: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            direction: Direction::Paiwan2Zh,
            model_mode: model_mode.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TranslateResponse {
    #[serde(default)]
    pub translation: Option<String>,
    #[serde(default)]
    pub thinking: Option<String>,
}

impl TranslateResponse {
    pub fn display_translation(&self) -> &str {
        match self.translation.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => EMPTY_TRANSLATION,
        }
    }

    pub fn display_thinking(&self) -> &str {
        self.thinking.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub reply: Option<String>,
    #[serde(default)]
    pub thinking: Option<String>,
}

impl ChatResponse {
    pub fn display_reply(&self) -> &str {
        match self.reply.as_deref() {
            Some(r) if !r.is_empty() => r,
            _ => EMPTY_REPLY,
        }
    }
}

pub trait TranslationBackend: Send + Sync {
    fn translate(
        &self,
        req: &TranslateRequest,
    ) -> impl Future<Output = Result<TranslateResponse, ClientError>> + Send;
}

pub trait ChatBackend: Send + Sync {
    fn chat(&self, message: &str) -> impl Future<Output = Result<ChatResponse, ClientError>> + Send;
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    translate_url: String,
    chat_url: String,
}

impl ApiClient {
    pub fn new(cfg: &Config) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = cfg.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build()?;
        Ok(Self {
            http,
            translate_url: cfg.translate_url(),
            chat_url: cfg.chat_endpoint.clone(),
        })
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, ClientError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let resp = self.http.post(url).json(body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ClientError::Status(status.as_u16()));
        }
        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl TranslationBackend for ApiClient {
    async fn translate(&self, req: &TranslateRequest) -> Result<TranslateResponse, ClientError> {
        self.post_json(&self.translate_url, req).await
    }
}

impl ChatBackend for ApiClient {
    async fn chat(&self, message: &str) -> Result<ChatResponse, ClientError> {
        self.post_json(&self.chat_url, &ChatRequest { message }).await
    }
}
