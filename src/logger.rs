use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

static LOG_FILE: Lazy<Mutex<Option<File>>> = Lazy::new(|| Mutex::new(None));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

pub(crate) fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn open_log(path: &Path) -> Option<File> {
    let mut f = OpenOptions::new().create(true).append(true).open(path).ok()?;
    let _ = writeln!(f, "===== PaiwanTalk start =====");
    Some(f)
}

/// Opens (or creates) the log file and routes every later call to it.
pub fn init(path: &Path) {
    if let Some(f) = open_log(path) {
        let mut guard = LOG_FILE.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(f);
    }
}

fn ts() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:03}", now.as_secs(), now.subsec_millis())
}

pub(crate) fn format_line(level: Level, msg: &str) -> String {
    format!("[{}] {} {}", ts(), level.tag(), msg)
}

fn append(f: &mut File, line: &str) {
    let _ = writeln!(f, "{}", line);
    let _ = f.flush();
}

pub fn write(level: Level, msg: &str) {
    let line = format_line(level, msg);
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(f) = guard.as_mut() {
            append(f, &line);
            return;
        }
    }
    fallback(&line);
}

/// Before init() the line goes to log.txt next to the executable.
#[cfg(not(test))]
fn fallback(line: &str) {
    let path = exe_dir().join("log.txt");
    if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&path) {
        append(&mut f, line);
    }
}

// Test binaries live under target/; keep them from leaving log.txt there.
#[cfg(test)]
fn fallback(_line: &str) {}

pub fn log(msg: &str) {
    write(Level::Info, msg);
}

pub fn warn(msg: &str) {
    write(Level::Warn, msg);
}

pub fn error(msg: &str) {
    write(Level::Error, msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_carries_level_tag_and_message() {
        let line = format_line(Level::Warn, "store unavailable");
        assert!(line.starts_with('['));
        assert!(line.ends_with("WARN store unavailable"));
    }

    #[test]
    fn opened_log_gets_banner_then_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let mut f = open_log(&path).unwrap();
        append(&mut f, &format_line(Level::Error, "request failed"));
        drop(f);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines[0], "===== PaiwanTalk start =====");
        assert!(lines[1].ends_with("ERROR request failed"));
    }

    #[test]
    fn unopenable_path_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_log(&dir.path().join("missing").join("log.txt")).is_none());
    }
}
