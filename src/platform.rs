//! Clipboard and notification helpers. Windows only; no-ops elsewhere.

pub fn read_clipboard_string() -> Option<String> {
    #[cfg(windows)]
    {
        clipboard_win::get_clipboard_string().ok()
    }
    #[cfg(not(windows))]
    {
        None
    }
}

pub fn toast(title: &str, body: &str) {
    #[cfg(windows)]
    {
        let _ = winrt_notification::Toast::new("PaiwanTalk")
            .title(title)
            .text1(body)
            .show();
    }
    #[cfg(not(windows))]
    {
        paiwantalk::logger::log(&format!("{}: {}", title, body));
    }
}
