#![cfg_attr(target_os = "windows", windows_subsystem = "windows")]

use std::sync::Arc;

use paiwantalk::{logger, ApiClient, Config, JsonFileStore};

mod platform;
mod ui;

#[cfg(windows)]
mod tray {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crossbeam_channel::Sender;
    use tray_icon::menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem};
    use tray_icon::{Icon, TrayIcon, TrayIconBuilder};

    use paiwantalk::dispatcher::{self, MenuEntry, MenuRegistry, MENU_ID};
    use paiwantalk::{logger, JsonFileStore};

    use crate::ui::{ChannelOpener, UiCommand};

    const CHAT_ID: &str = "paiwantalk-chat";
    const QUIT_ID: &str = "paiwantalk-quit";

    /// Tray menu as a context-menu registry. Dispatcher entries go above the
    /// fixed Chat/Quit items.
    struct TrayMenus {
        menu: Menu,
        items: HashMap<String, MenuItem>,
    }

    impl MenuRegistry for TrayMenus {
        fn remove(&mut self, id: &str) {
            if let Some(item) = self.items.remove(id) {
                if let Err(e) = self.menu.remove(&item) {
                    logger::warn(&format!("Tray: remove {} failed: {}", id, e));
                }
            }
        }

        fn create(&mut self, entry: MenuEntry) -> Result<(), String> {
            if self.items.contains_key(&entry.id) {
                return Err(format!("duplicate menu id: {}", entry.id));
            }
            let item = MenuItem::with_id(entry.id.clone(), &entry.title, true, None);
            self.menu.insert(&item, 0).map_err(|e| e.to_string())?;
            self.items.insert(entry.id, item);
            Ok(())
        }
    }

    fn icon() -> anyhow::Result<Icon> {
        // 16x16 ochre dot
        let (w, h) = (16usize, 16usize);
        let mut rgba = vec![0u8; w * h * 4];
        for px in rgba.chunks_exact_mut(4) {
            px.copy_from_slice(&[0xC2, 0x7C, 0x0E, 0xFF]);
        }
        Ok(Icon::from_rgba(rgba, w as u32, h as u32)?)
    }

    fn build() -> anyhow::Result<(TrayIcon, TrayMenus)> {
        let menu = Menu::new();
        let chat = MenuItem::with_id(CHAT_ID, "Chat...", true, None);
        let quit = MenuItem::with_id(QUIT_ID, "Quit", true, None);
        menu.append_items(&[&chat, &PredefinedMenuItem::separator(), &quit])?;
        let tray = TrayIconBuilder::new()
            .with_tooltip("PaiwanTalk")
            .with_menu(Box::new(menu.clone()))
            .with_icon(icon()?)
            .build()?;
        Ok((tray, TrayMenus { menu, items: HashMap::new() }))
    }

    fn handle(
        event: MenuEvent,
        rt: &tokio::runtime::Runtime,
        store: &JsonFileStore,
        ui_tx: &Sender<UiCommand>,
    ) {
        let id = event.id.0.as_str();
        match id {
            MENU_ID => {
                // Desktop selections reach us through the clipboard
                let selection = crate::platform::read_clipboard_string();
                let opener = ChannelOpener(ui_tx.clone());
                let out = rt.block_on(dispatcher::on_menu_clicked(
                    id,
                    selection.as_deref(),
                    store,
                    &opener,
                ));
                logger::log(&format!("Tray: translate selection -> {:?}", out));
            }
            CHAT_ID => {
                let _ = ui_tx.send(UiCommand::ShowChat);
            }
            QUIT_ID => {
                logger::log("Tray: Quit clicked");
                std::process::exit(0);
            }
            _ => {}
        }
    }

    /// Tray icon and its message pump live on one thread; the icon is not Send.
    pub fn spawn(
        ui_tx: Sender<UiCommand>,
        rt: Arc<tokio::runtime::Runtime>,
        store: Arc<JsonFileStore>,
    ) {
        thread::spawn(move || {
            let (_tray, mut menus) = match build() {
                Ok(t) => t,
                Err(e) => {
                    logger::error(&format!("Tray failed: {}", e));
                    crate::platform::toast("PaiwanTalk", &format!("Tray failed: {}", e));
                    return;
                }
            };
            dispatcher::on_installed(&mut menus);
            logger::log("Tray created");
            let events = MenuEvent::receiver();
            loop {
                unsafe {
                    use windows::Win32::Foundation::HWND;
                    use windows::Win32::UI::WindowsAndMessaging as wm;
                    let mut msg = wm::MSG::default();
                    while wm::PeekMessageW(&mut msg, HWND(std::ptr::null_mut()), 0, 0, wm::PM_REMOVE).into() {
                        let _ = wm::TranslateMessage(&msg);
                        wm::DispatchMessageW(&msg);
                    }
                }
                while let Ok(event) = events.try_recv() {
                    handle(event, &rt, &store, &ui_tx);
                }
                thread::sleep(Duration::from_millis(25));
            }
        });
    }
}

fn main() -> anyhow::Result<()> {
    // Config: config.json next to the exe, env vars override
    let mut cfg = Config::load();
    cfg.apply_env_overrides();
    logger::init(&cfg.log_file());
    logger::log(&format!(
        "App starting (api {}, chat {})",
        cfg.api_base, cfg.chat_endpoint
    ));

    let rt = Arc::new(tokio::runtime::Runtime::new()?);
    let api = Arc::new(ApiClient::new(&cfg)?);
    let store = Arc::new(JsonFileStore::new(cfg.settings_file()));
    logger::log(&format!("Settings at {}", store.path().display()));

    let (ui_tx, ui_rx) = crossbeam_channel::unbounded::<ui::UiCommand>();

    #[cfg(windows)]
    tray::spawn(ui_tx.clone(), Arc::clone(&rt), Arc::clone(&store));

    platform::toast("PaiwanTalk", "Ready. Select text and click PT to translate.");

    let shared = ui::Shared { rt, api, store, ui_tx };
    ui::run(shared, ui_rx)
}
