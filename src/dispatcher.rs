//! Context-menu entry that hands the selected text to the Translate panel.

use std::collections::BTreeMap;

use crate::logger;
use crate::settings::{SettingsPatch, SettingsStore};

pub const MENU_ID: &str = "paiwantalk-translate";
pub const MENU_TITLE: &str = "使用 PaiwanTalk 翻譯選取文字";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuContext {
    Selection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuEntry {
    pub id: String,
    pub title: String,
    pub contexts: Vec<MenuContext>,
}

impl MenuEntry {
    pub fn translate_selection() -> Self {
        Self {
            id: MENU_ID.to_string(),
            title: MENU_TITLE.to_string(),
            contexts: vec![MenuContext::Selection],
        }
    }
}

pub trait MenuRegistry {
    /// Removing an id that is not registered is not an error.
    fn remove(&mut self, id: &str);
    fn create(&mut self, entry: MenuEntry) -> Result<(), String>;
}

pub trait PopupOpener {
    fn open_popup(&self) -> Result<(), String>;
}

#[derive(Debug, Default)]
pub struct InMemoryMenus {
    entries: BTreeMap<String, MenuEntry>,
    created: usize,
}

impl InMemoryMenus {
    pub fn entries(&self) -> impl Iterator<Item = &MenuEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total `create` calls, including replacements.
    pub fn created(&self) -> usize {
        self.created
    }
}

impl MenuRegistry for InMemoryMenus {
    fn remove(&mut self, id: &str) {
        self.entries.remove(id);
    }

    fn create(&mut self, entry: MenuEntry) -> Result<(), String> {
        if self.entries.contains_key(&entry.id) {
            return Err(format!("duplicate menu id: {}", entry.id));
        }
        self.created += 1;
        self.entries.insert(entry.id.clone(), entry);
        Ok(())
    }
}

/// Registers the entry; safe to call on every install/update event.
pub fn on_installed<R: MenuRegistry + ?Sized>(registry: &mut R) {
    registry.remove(MENU_ID);
    match registry.create(MenuEntry::translate_selection()) {
        Ok(()) => logger::log("Context menu registered"),
        Err(e) => logger::error(&format!("Context menu registration failed: {}", e)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    Ignored,
    Dispatched { stored: bool, opened: bool },
}

/// Stages the selection for the popup, then opens it. The write completes
/// before the popup reads, so the handoff cannot be missed.
pub async fn on_menu_clicked<S, O>(
    menu_id: &str,
    selection_text: Option<&str>,
    store: &S,
    opener: &O,
) -> ClickOutcome
where
    S: SettingsStore,
    O: PopupOpener + ?Sized,
{
    if menu_id != MENU_ID {
        return ClickOutcome::Ignored;
    }
    let text = selection_text.unwrap_or("");
    if text.trim().is_empty() {
        return ClickOutcome::Ignored;
    }

    let stored = match store.set(SettingsPatch::pending(text)).await {
        Ok(()) => true,
        Err(e) => {
            logger::error(&format!("Failed to stage pending_text: {}", e));
            false
        }
    };
    let opened = match opener.open_popup() {
        Ok(()) => true,
        Err(e) => {
            logger::error(&format!("Unable to open popup: {}", e));
            false
        }
    };
    ClickOutcome::Dispatched { stored, opened }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{MemoryStore, Settings};
    use std::cell::Cell;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingOpener {
        opens: Cell<u32>,
        fail: bool,
    }

    impl PopupOpener for CountingOpener {
        fn open_popup(&self) -> Result<(), String> {
            self.opens.set(self.opens.get() + 1);
            if self.fail {
                Err("no active window".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn repeated_install_keeps_single_entry() {
        let mut menus = InMemoryMenus::default();
        on_installed(&mut menus);
        on_installed(&mut menus);
        on_installed(&mut menus);
        assert_eq!(menus.len(), 1);
        let entry = menus.entries().next().unwrap();
        assert_eq!(entry.id, MENU_ID);
        assert_eq!(entry.title, MENU_TITLE);
        assert_eq!(entry.contexts, vec![MenuContext::Selection]);
        assert_eq!(menus.created(), 3);
    }

    #[tokio::test]
    async fn blank_selection_is_noop() {
        let store = MemoryStore::default();
        let opener = CountingOpener::default();
        for text in [None, Some(""), Some("  \t\n")] {
            let out = on_menu_clicked(MENU_ID, text, &store, &opener).await;
            assert_eq!(out, ClickOutcome::Ignored);
        }
        assert_eq!(opener.opens.get(), 0);
        assert_eq!(store.snapshot(), Settings::default());
    }

    #[tokio::test]
    async fn foreign_menu_id_is_ignored() {
        let store = MemoryStore::default();
        let opener = CountingOpener::default();
        let out = on_menu_clicked("other", Some("kina"), &store, &opener).await;
        assert_eq!(out, ClickOutcome::Ignored);
        assert_eq!(opener.opens.get(), 0);
    }

    #[tokio::test]
    async fn click_stages_text_before_opening() {
        struct Checking<'a> {
            store: &'a MemoryStore,
            seen: Mutex<Option<Settings>>,
        }
        impl PopupOpener for Checking<'_> {
            fn open_popup(&self) -> Result<(), String> {
                *self.seen.lock().unwrap() = Some(self.store.snapshot());
                Ok(())
            }
        }

        let store = MemoryStore::default();
        let opener = Checking {
            store: &store,
            seen: Mutex::new(None),
        };
        let out = on_menu_clicked(MENU_ID, Some("kina"), &store, &opener).await;
        assert_eq!(out, ClickOutcome::Dispatched { stored: true, opened: true });

        let seen = opener.seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.pending_text, "kina");
        assert!(seen.pending_translate);
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let store = MemoryStore::default();
        store.set_failing(true);
        let opener = CountingOpener {
            fail: true,
            ..CountingOpener::default()
        };
        let out = on_menu_clicked(MENU_ID, Some("kina"), &store, &opener).await;
        assert_eq!(out, ClickOutcome::Dispatched { stored: false, opened: false });
        assert_eq!(opener.opens.get(), 1);
    }
}
