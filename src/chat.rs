//! Chat panel state: message list, canned prompts and the thinking overlay.

use std::sync::{Mutex, PoisonError};

use crate::api::{ChatBackend, ChatResponse};
use crate::error::ClientError;
use crate::logger;

pub const PLACEHOLDER: &str = "思考中...";
pub const FAILURE_MESSAGE: &str = "呼叫後端失敗，請稍後再試。";

/// Canned prompts shown as chips above the input.
pub const CHIPS: &[(&str, &str)] = &[
    ("問候語", "請教我幾句排灣族語的日常問候語。"),
    ("masalu", "「masalu」是什麼意思？要怎麼使用？"),
    ("數字", "請用排灣族語從一數到十。"),
    ("家人稱謂", "排灣族語中爸爸、媽媽、祖父母怎麼說？"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub thinking: Option<String>,
}

impl ChatMessage {
    fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            text: text.to_string(),
            thinking: None,
        }
    }

    fn bot(text: &str) -> Self {
        Self {
            role: Role::Bot,
            text: text.to_string(),
            thinking: None,
        }
    }
}

/// Placeholder bot message awaiting its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReply {
    pub index: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct ChatController {
    pub input: String,
    messages: Vec<ChatMessage>,
    open_panel: Option<usize>,
    escape_armed: bool,
}

impl ChatController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Appends the user message and a placeholder; clears the input.
    pub fn send(&mut self) -> Option<PendingReply> {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return None;
        }
        self.input.clear();
        self.messages.push(ChatMessage::user(&text));
        self.messages.push(ChatMessage::bot(PLACEHOLDER));
        Some(PendingReply {
            index: self.messages.len() - 1,
            message: text,
        })
    }

    pub fn complete(&mut self, pending: &PendingReply, outcome: Result<ChatResponse, ClientError>) {
        let Some(slot) = self.messages.get_mut(pending.index) else {
            logger::warn(&format!("Chat: no placeholder at {}", pending.index));
            return;
        };
        match outcome {
            Ok(resp) => {
                slot.text = resp.display_reply().to_string();
                slot.thinking = resp.thinking.filter(|t| !t.trim().is_empty());
            }
            Err(ClientError::Status(code)) => {
                slot.text = format!("錯誤：{}", code);
            }
            Err(e) => {
                logger::error(&format!("Chat request failed: {}", e));
                slot.text = FAILURE_MESSAGE.to_string();
            }
        }
    }

    /// Enter submits; Shift+Enter is left to the text field.
    pub fn on_key_enter(&mut self, shift: bool) -> Option<PendingReply> {
        if shift {
            return None;
        }
        self.send()
    }

    pub fn apply_chip(&mut self, index: usize) -> Option<PendingReply> {
        let (_, prompt) = CHIPS.get(index)?;
        self.input = prompt.to_string();
        self.send()
    }

    pub fn open_panel(&self) -> Option<&str> {
        self.open_panel
            .and_then(|i| self.messages.get(i))
            .and_then(|m| m.thinking.as_deref())
    }

    /// Badge clicked. Only messages carrying a thinking payload have one.
    pub fn open_thinking(&mut self, index: usize) -> bool {
        let has_payload = self
            .messages
            .get(index)
            .map_or(false, |m| m.thinking.is_some());
        if has_payload {
            self.open_panel = Some(index);
            self.escape_armed = true;
        }
        has_payload
    }

    pub fn close_thinking(&mut self) {
        self.open_panel = None;
        self.escape_armed = false;
    }

    pub fn on_click_outside_panel(&mut self) {
        if self.open_panel.is_some() {
            self.close_thinking();
        }
    }

    /// One-shot: only the first Escape after opening is consumed.
    pub fn on_escape(&mut self) -> bool {
        if !self.escape_armed {
            return false;
        }
        self.close_thinking();
        true
    }
}

fn lock(ctrl: &Mutex<ChatController>) -> std::sync::MutexGuard<'_, ChatController> {
    ctrl.lock().unwrap_or_else(PoisonError::into_inner)
}

pub async fn deliver<B: ChatBackend>(ctrl: &Mutex<ChatController>, backend: &B, pending: PendingReply) {
    let outcome = backend.chat(&pending.message).await;
    lock(ctrl).complete(&pending, outcome);
}

/// Sends the current input and waits for the reply.
pub async fn send_and_wait<B: ChatBackend>(ctrl: &Mutex<ChatController>, backend: &B) -> bool {
    let pending = lock(ctrl).send();
    let Some(pending) = pending else {
        return false;
    };
    deliver(ctrl, backend, pending).await;
    true
}
