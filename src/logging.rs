//! Structured logging module for Haru
//!
//! Writes logs to ~/.haru/logs/ with categories:
//! - CONVERSATION: session lifecycle and turn handling
//! - EXTRACTION: collaborator calls and parsed results
//! - STORE: persistence reads/writes and self-healing
//! - NOTIFY: notification scheduling and cancellation
//! - ERROR: errors and degraded fallbacks

use chrono::{Local, Utc};
use once_cell::sync::Lazy;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// Log categories for structured logging
#[derive(Debug, Clone, Copy)]
pub enum LogCategory {
    Conversation,
    Extraction,
    Store,
    Notify,
    Error,
}

impl LogCategory {
    fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Conversation => "CONVERSATION",
            LogCategory::Extraction => "EXTRACTION",
            LogCategory::Store => "STORE",
            LogCategory::Notify => "NOTIFY",
            LogCategory::Error => "ERROR",
        }
    }
}

/// Set once by init_logging; file output stays off until then
static LOG_DIR: Lazy<Mutex<Option<PathBuf>>> = Lazy::new(|| Mutex::new(None));

fn default_log_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".haru/logs")
}

/// Today's log file inside the configured directory, if logging was initialized
fn current_log_file() -> Option<PathBuf> {
    let dir = LOG_DIR.lock().unwrap().clone()?;
    let today = Local::now().format("%Y-%m-%d").to_string();
    Some(dir.join(format!("haru-{}.log", today)))
}

/// Initialize the logging system - creates the log directory if needed
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_at(default_log_dir())
}

pub fn init_logging_at(dir: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }
    *LOG_DIR.lock().unwrap() = Some(dir);
    log(LogCategory::Conversation, None, "Haru logging initialized");
    Ok(())
}

/// Log a message with category and optional session context
pub fn log(category: LogCategory, session_id: Option<&str>, message: &str) {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let session_context = session_id
        .map(|id| format!("session={} | ", id.chars().take(13).collect::<String>()))
        .unwrap_or_default();

    let log_line = format!(
        "[{}] [{}] {}{}\n",
        timestamp,
        category.as_str(),
        session_context,
        message
    );

    // Always print to console (for dev)
    print!("{}", log_line);

    if let Some(log_path) = current_log_file() {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = file.write_all(log_line.as_bytes());
        }
    }
}

pub fn log_conversation(session_id: Option<&str>, message: &str) {
    log(LogCategory::Conversation, session_id, message);
}

pub fn log_extraction(session_id: Option<&str>, message: &str) {
    log(LogCategory::Extraction, session_id, message);
}

pub fn log_store(session_id: Option<&str>, message: &str) {
    log(LogCategory::Store, session_id, message);
}

pub fn log_notify(session_id: Option<&str>, message: &str) {
    log(LogCategory::Notify, session_id, message);
}

pub fn log_error(session_id: Option<&str>, message: &str) {
    log(LogCategory::Error, session_id, message);
}

/// Clean up old log files (keep last 7 days)
pub fn cleanup_old_logs() -> Result<usize, Box<dyn std::error::Error>> {
    let dir = match LOG_DIR.lock().unwrap().clone() {
        Some(dir) => dir,
        None => return Ok(0),
    };
    let mut deleted = 0;

    if !dir.exists() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(7);

    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let path = entry.path();

        if let Ok(metadata) = entry.metadata() {
            if let Ok(modified) = metadata.modified() {
                let modified_time: chrono::DateTime<Utc> = modified.into();
                if modified_time < cutoff && fs::remove_file(&path).is_ok() {
                    deleted += 1;
                }
            }
        }
    }

    Ok(deleted)
}
