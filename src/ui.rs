use crossbeam_channel::{Receiver, Sender};
use eframe::egui;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use paiwantalk::api::{model_mode_label, ApiClient, MODEL_MODES};
use paiwantalk::bubble::{self, BubbleController, Rect, ScrollOffset, BUBBLE_ID};
use paiwantalk::chat::{self, ChatController, Role, CHIPS};
use paiwantalk::dispatcher::{self, InMemoryMenus, MenuContext, PopupOpener};
use paiwantalk::logger;
use paiwantalk::popup::{self, PopupController};
use paiwantalk::settings::JsonFileStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiCommand {
    ShowPopup,
    ShowChat,
}

/// Opens the Translate panel by messaging the UI thread.
#[derive(Clone)]
pub struct ChannelOpener(pub Sender<UiCommand>);

impl PopupOpener for ChannelOpener {
    fn open_popup(&self) -> Result<(), String> {
        self.0.send(UiCommand::ShowPopup).map_err(|e| e.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tab {
    Reader,
    Translate,
    Chat,
}

pub struct Shared {
    pub rt: Arc<tokio::runtime::Runtime>,
    pub api: Arc<ApiClient>,
    pub store: Arc<JsonFileStore>,
    pub ui_tx: Sender<UiCommand>,
}

struct Selection {
    text: String,
    rect: Rect,
}

struct PaiwanApp {
    shared: Shared,
    rx: Receiver<UiCommand>,
    tab: Tab,
    menus: InMemoryMenus,
    reader_text: String,
    selection: Option<Selection>,
    scroll: ScrollOffset,
    viewport_origin: egui::Pos2,
    bubble: Arc<Mutex<BubbleController>>,
    bubble_rect: Option<egui::Rect>,
    popup: Arc<Mutex<PopupController>>,
    chat: Arc<Mutex<ChatController>>,
    panel_rect: Option<egui::Rect>,
    fonts_set: bool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl PaiwanApp {
    fn new(shared: Shared, rx: Receiver<UiCommand>) -> Self {
        let mut menus = InMemoryMenus::default();
        dispatcher::on_installed(&mut menus);
        Self {
            shared,
            rx,
            tab: Tab::Reader,
            menus,
            reader_text: String::new(),
            selection: None,
            scroll: ScrollOffset::default(),
            viewport_origin: egui::Pos2::ZERO,
            bubble: Arc::new(Mutex::new(BubbleController::new())),
            bubble_rect: None,
            popup: Arc::new(Mutex::new(PopupController::new())),
            chat: Arc::new(Mutex::new(ChatController::new())),
            panel_rect: None,
            fonts_set: false,
        }
    }

    fn spawn<F>(&self, ctx: &egui::Context, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ctx = ctx.clone();
        self.shared.rt.spawn(async move {
            fut.await;
            ctx.request_repaint();
        });
    }

    fn open_translate_tab(&mut self, ctx: &egui::Context) {
        self.tab = Tab::Translate;
        let (popup, api, store) = (
            Arc::clone(&self.popup),
            Arc::clone(&self.shared.api),
            Arc::clone(&self.shared.store),
        );
        self.spawn(ctx, async move {
            popup::open_and_autotranslate(&popup, &*api, &*store).await;
        });
    }

    fn ensure_fonts(&mut self, ctx: &egui::Context) {
        if self.fonts_set {
            return;
        }
        self.fonts_set = true;
        let candidates = [
            r"C:\Windows\Fonts\msjh.ttc",
            r"C:\Windows\Fonts\msyh.ttc",
            r"C:\Windows\Fonts\mingliu.ttc",
            "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
            "/usr/share/fonts/noto-cjk/NotoSansCJK-Regular.ttc",
            "/System/Library/Fonts/PingFang.ttc",
        ];
        let Some((path, bytes)) = candidates
            .iter()
            .find_map(|p| std::fs::read(p).ok().map(|b| (*p, b)))
        else {
            logger::warn("No CJK font found; Chinese text may render as squares");
            return;
        };
        let mut fonts = egui::FontDefinitions::default();
        fonts.font_data.insert("cjk".to_owned(), egui::FontData::from_owned(bytes));
        for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
            fonts.families.entry(family).or_default().insert(0, "cjk".to_owned());
        }
        ctx.set_fonts(fonts);
        logger::log(&format!("Loaded CJK font: {}", path));
    }

    fn drain_commands(&mut self, ctx: &egui::Context) {
        while let Ok(cmd) = self.rx.try_recv() {
            logger::log(&format!("UI: {:?}", cmd));
            ctx.send_viewport_cmd(egui::ViewportCommand::Visible(true));
            ctx.send_viewport_cmd(egui::ViewportCommand::Focus);
            match cmd {
                UiCommand::ShowPopup => self.open_translate_tab(ctx),
                UiCommand::ShowChat => self.tab = Tab::Chat,
            }
        }
    }

    fn stage_selection(&self, ctx: &egui::Context, menu_id: String, text: String) {
        let store = Arc::clone(&self.shared.store);
        let opener = ChannelOpener(self.shared.ui_tx.clone());
        self.spawn(ctx, async move {
            dispatcher::on_menu_clicked(&menu_id, Some(&text), &*store, &opener).await;
        });
    }

    fn reader_tab(&mut self, ui: &mut egui::Ui) {
        let ctx = ui.ctx().clone();
        let (pressed, released, pointer, scrolled) = ctx.input(|i| {
            (
                i.pointer.any_pressed(),
                i.pointer.any_released(),
                i.pointer.interact_pos(),
                i.raw_scroll_delta != egui::Vec2::ZERO,
            )
        });
        let on_bubble = matches!((pointer, self.bubble_rect), (Some(p), Some(r)) if r.contains(p));
        let selected_text = self.selection.as_ref().map(|s| s.text.clone()).unwrap_or_default();

        {
            let mut b = lock(&self.bubble);
            if scrolled {
                b.on_scroll();
            }
            if pressed {
                b.on_mouse_down(on_bubble, &selected_text);
            }
            if released {
                b.on_pointer_release(on_bubble, Instant::now());
            }
        }

        ui.label("貼上排灣語文字，選取後點擊 PT 翻譯；或按右鍵選擇選單。");
        let out = egui::ScrollArea::vertical()
            .id_source("reader")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                egui::TextEdit::multiline(&mut self.reader_text)
                    .desired_width(f32::INFINITY)
                    .desired_rows(24)
                    .show(ui)
            });
        self.viewport_origin = out.inner_rect.min;
        self.scroll = ScrollOffset {
            x: out.state.offset.x,
            y: out.state.offset.y,
        };
        let te = out.inner;
        self.selection = te.cursor_range.and_then(|range| {
            let chars = range.as_sorted_char_range();
            if chars.is_empty() {
                return None;
            }
            let text: String = self
                .reader_text
                .chars()
                .skip(chars.start)
                .take(chars.end - chars.start)
                .collect();
            let a = te.galley.pos_from_cursor(&range.primary);
            let b = te.galley.pos_from_cursor(&range.secondary);
            let screen = a.union(b).translate(te.galley_pos.to_vec2());
            let local = screen.translate(-self.viewport_origin.to_vec2());
            Some(Selection {
                text,
                rect: Rect::new(local.min.x, local.min.y, local.width(), local.height()),
            })
        });

        let menu_text = self.selection.as_ref().map(|s| s.text.clone());
        let entries: Vec<_> = self
            .menus
            .entries()
            .filter(|e| e.contexts.contains(&MenuContext::Selection))
            .cloned()
            .collect();
        te.response.context_menu(|ui| {
            let Some(text) = menu_text.as_ref().filter(|t| !t.trim().is_empty()) else {
                ui.label("（未選取文字）");
                return;
            };
            for entry in &entries {
                if ui.button(&entry.title).clicked() {
                    self.stage_selection(&ctx, entry.id.clone(), text.clone());
                    ui.close_menu();
                }
            }
        });

        let settle = lock(&self.bubble).poll_settled(Instant::now());
        if settle {
            let mut b = lock(&self.bubble);
            match &self.selection {
                Some(s) => b.on_selection_settled(&s.text, Some(s.rect), self.scroll),
                None => b.on_selection_settled("", None, self.scroll),
            }
        }
        if lock(&self.bubble).settle_pending() {
            ctx.request_repaint_after(bubble::SETTLE_DELAY);
        }
        self.show_bubble(&ctx);
    }

    fn show_bubble(&mut self, ctx: &egui::Context) {
        let view = lock(&self.bubble).bubble().filter(|b| b.visible).cloned();
        let Some(view) = view else {
            self.bubble_rect = None;
            return;
        };
        let pos = self.viewport_origin
            + egui::vec2(view.anchor.x - self.scroll.x, view.anchor.y - self.scroll.y);
        let resp = egui::Area::new(egui::Id::new(BUBBLE_ID))
            .order(egui::Order::Foreground)
            .fixed_pos(pos)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style())
                    .fill(egui::Color32::from_rgb(0x1f, 0x29, 0x33))
                    .show(ui, |ui| {
                        if let Some(w) = view.max_width() {
                            ui.set_max_width(w);
                        }
                        ui.add(
                            egui::Label::new(
                                egui::RichText::new(view.label()).color(egui::Color32::WHITE).size(12.0),
                            )
                            .wrap(view.wrap)
                            .sense(egui::Sense::click()),
                        )
                        .on_hover_text(view.title)
                    })
                    .inner
            });
        self.bubble_rect = Some(resp.response.rect);
        if resp.inner.clicked() {
            let (ctrl, api, store) = (
                Arc::clone(&self.bubble),
                Arc::clone(&self.shared.api),
                Arc::clone(&self.shared.store),
            );
            self.spawn(ctx, async move {
                bubble::activate(&ctrl, &*api, &*store).await;
            });
        }
    }

    fn translate_tab(&mut self, ui: &mut egui::Ui) {
        let ctx = ui.ctx().clone();
        let mut mode_changed = None;
        let mut submit = false;
        {
            let mut p = lock(&self.popup);
            let mut mode = p.model_mode.clone();
            egui::ComboBox::from_label("模型")
                .selected_text(model_mode_label(&mode).to_string())
                .show_ui(ui, |ui| {
                    for (id, label) in MODEL_MODES {
                        if ui.selectable_value(&mut mode, id.to_string(), *label).changed() {
                            mode_changed = Some(mode.clone());
                        }
                    }
                });
            ui.add(
                egui::TextEdit::multiline(&mut p.input)
                    .hint_text("輸入排灣語文字")
                    .desired_width(f32::INFINITY)
                    .desired_rows(6),
            );
            ui.horizontal(|ui| {
                submit = ui.add_enabled(!p.is_busy(), egui::Button::new("翻譯")).clicked();
            });
            ui.separator();
            ui.heading("翻譯結果");
            ui.label(&p.result);
            if !p.thinking.is_empty() {
                egui::CollapsingHeader::new("思考過程")
                    .default_open(false)
                    .show(ui, |ui| {
                        ui.label(egui::RichText::new(&p.thinking).weak());
                    });
            }
        }
        if let Some(mode) = mode_changed {
            let (popup, store) = (Arc::clone(&self.popup), Arc::clone(&self.shared.store));
            self.spawn(&ctx, async move {
                popup::change_model_mode(&popup, &*store, &mode).await;
            });
        }
        if submit {
            let (popup, api) = (Arc::clone(&self.popup), Arc::clone(&self.shared.api));
            self.spawn(&ctx, async move {
                popup::submit(&popup, &*api).await;
            });
        }
    }

    fn chat_tab(&mut self, ui: &mut egui::Ui) {
        let ctx = ui.ctx().clone();
        let mut pending = Vec::new();
        {
            let mut c = lock(&self.chat);
            ui.horizontal_wrapped(|ui| {
                for (i, (label, _)) in CHIPS.iter().enumerate() {
                    if ui.button(*label).clicked() {
                        pending.extend(c.apply_chip(i));
                    }
                }
            });
            ui.separator();
            let mut open_badge = None;
            egui::ScrollArea::vertical()
                .id_source("chat")
                .auto_shrink([false, false])
                .stick_to_bottom(true)
                .max_height(ui.available_height() - 40.0)
                .show(ui, |ui| {
                    for (i, m) in c.messages().iter().enumerate() {
                        let layout = match m.role {
                            Role::User => egui::Layout::right_to_left(egui::Align::TOP),
                            Role::Bot => egui::Layout::left_to_right(egui::Align::TOP),
                        };
                        ui.with_layout(layout, |ui| {
                            egui::Frame::group(ui.style()).show(ui, |ui| {
                                ui.set_max_width(420.0);
                                ui.label(&m.text);
                                if m.thinking.is_some() && ui.small_button("思考").clicked() {
                                    open_badge = Some(i);
                                }
                            });
                        });
                    }
                });
            if let Some(i) = open_badge {
                c.open_thinking(i);
            }
            ui.horizontal(|ui| {
                let resp = ui.add(
                    egui::TextEdit::singleline(&mut c.input)
                        .hint_text("輸入訊息，Enter 送出")
                        .desired_width(ui.available_width() - 60.0),
                );
                let (enter, shift) = ui.input(|i| (i.key_pressed(egui::Key::Enter), i.modifiers.shift));
                if resp.lost_focus() && enter {
                    pending.extend(c.on_key_enter(shift));
                    resp.request_focus();
                }
                if ui.button("送出").clicked() {
                    pending.extend(c.send());
                }
            });
        }
        for p in pending {
            let (chat_ctrl, api) = (Arc::clone(&self.chat), Arc::clone(&self.shared.api));
            self.spawn(&ctx, async move {
                chat::deliver(&chat_ctrl, &*api, p).await;
            });
        }
        self.thinking_panel(&ctx);
    }

    fn thinking_panel(&mut self, ctx: &egui::Context) {
        let (escape, pressed, pointer) = ctx.input(|i| {
            (
                i.key_pressed(egui::Key::Escape),
                i.pointer.any_pressed(),
                i.pointer.interact_pos(),
            )
        });
        let mut c = lock(&self.chat);
        if escape {
            c.on_escape();
        }
        if pressed {
            if let (Some(p), Some(r)) = (pointer, self.panel_rect) {
                if !r.contains(p) {
                    c.on_click_outside_panel();
                }
            }
        }
        let Some(text) = c.open_panel().map(str::to_owned) else {
            self.panel_rect = None;
            return;
        };
        let mut open = true;
        let shown = egui::Window::new("思考過程")
            .open(&mut open)
            .collapsible(false)
            .resizable(true)
            .default_width(360.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| ui.label(text));
            });
        self.panel_rect = shown.map(|r| r.response.rect);
        if !open {
            c.close_thinking();
        }
    }
}

impl eframe::App for PaiwanApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Poll the command channel even without user input
        ctx.request_repaint_after(Duration::from_millis(120));
        self.ensure_fonts(ctx);
        self.drain_commands(ctx);

        egui::TopBottomPanel::top("tabs").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("PaiwanTalk");
                ui.separator();
                ui.selectable_value(&mut self.tab, Tab::Reader, "閱讀");
                if ui
                    .selectable_label(self.tab == Tab::Translate, "翻譯")
                    .clicked()
                    && self.tab != Tab::Translate
                {
                    self.open_translate_tab(ctx);
                }
                ui.selectable_value(&mut self.tab, Tab::Chat, "聊天");
            });
        });

        if self.tab != Tab::Reader {
            lock(&self.bubble).hide();
            self.bubble_rect = None;
        }

        egui::CentralPanel::default().show(ctx, |ui| match self.tab {
            Tab::Reader => self.reader_tab(ui),
            Tab::Translate => self.translate_tab(ui),
            Tab::Chat => self.chat_tab(ui),
        });
    }
}

/// Runs the window on the calling thread until it closes.
pub fn run(shared: Shared, rx: Receiver<UiCommand>) -> anyhow::Result<()> {
    logger::log("Main UI: starting event loop");
    let app = PaiwanApp::new(shared, rx);
    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("PaiwanTalk")
            .with_inner_size([820.0, 600.0]),
        ..Default::default()
    };
    eframe::run_native("PaiwanTalk", native_options, Box::new(|_cc| Box::new(app)))
        .map_err(|e| anyhow::anyhow!("UI error: {}", e))?;
    logger::log("Main UI: event loop exited");
    Ok(())
}
