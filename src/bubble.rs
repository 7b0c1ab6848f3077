//! Selection-triggered translation bubble.
//!
//! One controller per document. It watches selection, mouse and scroll events,
//! keeps a single lazily created indicator positioned above the current
//! selection, and renders the translation in place when the indicator is
//! activated.

use std::borrow::Cow;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::api::{TranslateRequest, TranslateResponse, TranslationBackend};
use crate::error::ClientError;
use crate::logger;
use crate::settings::{self, SettingsStore};

pub const BUBBLE_ID: &str = "paiwantalk-translate-bubble";
pub const IDLE_LABEL: &str = "PT";
pub const BUBBLE_TITLE: &str = "使用 PaiwanTalk 翻譯";
pub const TRANSLATING_LABEL: &str = "翻譯中...";
pub const FAILED_LABEL: &str = "翻譯失敗";

/// Vertical lift so the indicator sits above the selection.
pub const ANCHOR_LIFT: f32 = 28.0;
/// Minimum distance from the scrolled viewport origin.
pub const EDGE_MARGIN: f32 = 4.0;
pub const SETTLE_DELAY: Duration = Duration::from_millis(10);
pub const MAX_RESULT_WIDTH: f32 = 260.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollOffset {
    pub x: f32,
    pub y: f32,
}

/// Viewport-relative bounding box of a selection range.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    /// Browsers report an all-zero box for ranges that are not laid out.
    pub fn is_degenerate(&self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.width == 0.0 && self.height == 0.0
    }
}

/// Document-space anchor for the indicator, clamped inside the scrolled viewport.
pub fn compute_anchor(rect: Rect, scroll: ScrollOffset) -> Point {
    let top = scroll.y + rect.y - ANCHOR_LIFT;
    let left = scroll.x + rect.x;
    Point {
        x: left.max(scroll.x + EDGE_MARGIN),
        y: top.max(scroll.y + EDGE_MARGIN),
    }
}

/// Lets the selection settle before it is read.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionDebounce {
    pending_since: Option<Instant>,
}

impl SelectionDebounce {
    pub fn trigger(&mut self, now: Instant) {
        self.pending_since = Some(now);
    }

    pub fn cancel(&mut self) {
        self.pending_since = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// True exactly once, after the delay has elapsed since the last trigger.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.pending_since {
            Some(t) if now.saturating_duration_since(t) >= SETTLE_DELAY => {
                self.pending_since = None;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BubbleContent {
    Idle,
    Translating,
    Translated(String),
    /// Carries the HTTP status when the backend answered with a non-OK code.
    Failed(Option<u16>),
}

impl BubbleContent {
    pub fn label(&self) -> Cow<'_, str> {
        match self {
            BubbleContent::Idle => Cow::Borrowed(IDLE_LABEL),
            BubbleContent::Translating => Cow::Borrowed(TRANSLATING_LABEL),
            BubbleContent::Translated(text) => Cow::Borrowed(text.as_str()),
            BubbleContent::Failed(None) => Cow::Borrowed(FAILED_LABEL),
            BubbleContent::Failed(Some(code)) => Cow::Owned(format!("{} ({})", FAILED_LABEL, code)),
        }
    }
}

/// The indicator element. Created on first show and reused for the page lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct Bubble {
    pub visible: bool,
    pub anchor: Point,
    pub content: BubbleContent,
    /// Result text wraps and is capped at [`MAX_RESULT_WIDTH`].
    pub wrap: bool,
    pub title: &'static str,
}

impl Bubble {
    fn new() -> Self {
        Self {
            visible: false,
            anchor: Point::default(),
            content: BubbleContent::Idle,
            wrap: false,
            title: BUBBLE_TITLE,
        }
    }

    pub fn label(&self) -> Cow<'_, str> {
        self.content.label()
    }

    pub fn max_width(&self) -> Option<f32> {
        self.wrap.then_some(MAX_RESULT_WIDTH)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleState {
    Hidden,
    Armed,
    Loading,
    Result,
    Failed,
}

/// A single in-flight translation issued from the bubble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub seq: u64,
    pub text: String,
}

#[derive(Debug)]
pub struct BubbleController {
    bubble: Option<Bubble>,
    state: BubbleState,
    current_text: String,
    seq: u64,
    debounce: SelectionDebounce,
}

impl Default for BubbleController {
    fn default() -> Self {
        Self::new()
    }
}

impl BubbleController {
    pub fn new() -> Self {
        Self {
            bubble: None,
            state: BubbleState::Hidden,
            current_text: String::new(),
            seq: 0,
            debounce: SelectionDebounce::default(),
        }
    }

    pub fn state(&self) -> BubbleState {
        self.state
    }

    pub fn bubble(&self) -> Option<&Bubble> {
        self.bubble.as_ref()
    }

    pub fn current_text(&self) -> &str {
        &self.current_text
    }

    pub fn is_visible(&self) -> bool {
        self.bubble.as_ref().map_or(false, |b| b.visible)
    }

    fn ensure_bubble(&mut self) -> &mut Bubble {
        self.bubble.get_or_insert_with(Bubble::new)
    }

    /// Hides the indicator and drops the snapshot. No-op when already hidden.
    pub fn hide(&mut self) {
        if let Some(b) = self.bubble.as_mut() {
            b.visible = false;
        }
        self.current_text.clear();
        self.state = BubbleState::Hidden;
    }

    /// Pointer released somewhere in the document. Clicks on the indicator itself
    /// are not selection changes.
    pub fn on_pointer_release(&mut self, on_bubble: bool, now: Instant) {
        if on_bubble && self.is_visible() {
            return;
        }
        self.debounce.trigger(now);
    }

    pub fn settle_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    /// Returns true when the debounced selection should be read now.
    pub fn poll_settled(&mut self, now: Instant) -> bool {
        self.debounce.poll(now)
    }

    /// Selection settled. `rect` is `None` when there is no range.
    pub fn on_selection_settled(&mut self, text: &str, rect: Option<Rect>, scroll: ScrollOffset) {
        if text.trim().is_empty() {
            self.hide();
            return;
        }
        let rect = match rect {
            Some(r) if !r.is_degenerate() => r,
            _ => {
                self.hide();
                return;
            }
        };
        let anchor = compute_anchor(rect, scroll);
        self.current_text = text.to_string();
        self.state = BubbleState::Armed;
        let bubble = self.ensure_bubble();
        bubble.anchor = anchor;
        bubble.content = BubbleContent::Idle;
        bubble.wrap = false;
        bubble.visible = true;
    }

    pub fn on_mouse_down(&mut self, on_bubble: bool, selection_text: &str) {
        if on_bubble && self.is_visible() {
            return;
        }
        if selection_text.trim().is_empty() {
            self.hide();
        }
    }

    /// The anchor is not re-derived on scroll, so any scroll invalidates it.
    pub fn on_scroll(&mut self) {
        self.debounce.cancel();
        self.hide();
    }

    /// Indicator clicked. Returns the request to issue, or `None` when there is
    /// nothing to translate.
    pub fn begin_activation(&mut self) -> Option<Activation> {
        if self.state == BubbleState::Hidden || !self.is_visible() {
            return None;
        }
        let text = self.current_text.trim().to_string();
        if text.is_empty() {
            self.hide();
            return None;
        }
        self.seq += 1;
        self.state = BubbleState::Loading;
        self.ensure_bubble().content = BubbleContent::Translating;
        Some(Activation { seq: self.seq, text })
    }

    /// Applies a response. Returns false when the response was stale and dropped.
    pub fn complete(
        &mut self,
        activation: &Activation,
        outcome: Result<TranslateResponse, ClientError>,
    ) -> bool {
        if activation.seq != self.seq || self.state != BubbleState::Loading {
            logger::log(&format!(
                "Bubble: dropping response #{} (latest #{}, state {:?})",
                activation.seq, self.seq, self.state
            ));
            return false;
        }
        let bubble = self.ensure_bubble();
        match outcome {
            Ok(resp) => {
                bubble.content = BubbleContent::Translated(resp.display_translation().to_string());
                bubble.wrap = true;
                self.state = BubbleState::Result;
            }
            Err(e) => {
                logger::error(&format!("PaiwanTalk translation failed: {}", e));
                let status = match e {
                    ClientError::Status(code) => Some(code),
                    _ => None,
                };
                bubble.content = BubbleContent::Failed(status);
                self.state = BubbleState::Failed;
            }
        }
        true
    }
}

fn lock(ctrl: &Mutex<BubbleController>) -> std::sync::MutexGuard<'_, BubbleController> {
    ctrl.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs one activation end to end. Returns whether a result was rendered.
pub async fn activate<B, S>(ctrl: &Mutex<BubbleController>, backend: &B, store: &S) -> bool
where
    B: TranslationBackend,
    S: SettingsStore,
{
    let begun = lock(ctrl).begin_activation();
    let Some(activation) = begun else {
        return false;
    };
    let model_mode = settings::get_or_default(store)
        .await
        .effective_model_mode()
        .to_string();
    logger::log(&format!(
        "Bubble: translating {} chars (#{}, mode {})",
        activation.text.chars().count(),
        activation.seq,
        model_mode
    ));
    let req = TranslateRequest::paiwan_to_zh(activation.text.clone(), model_mode);
    let outcome = backend.translate(&req).await;
    lock(ctrl).complete(&activation, outcome)
}
