//! Event log: one JSON line per bridge event, one file per UTC day.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, error};

/// How many `error` entries are kept in memory.
pub const ERROR_BUFFER_CAPACITY: usize = 10;

/// Kind of a logged event. Serialized as the entry's `type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Ready,
    Disconnected,
    Error,
    Warning,
    MessageReceived,
    MessageSent,
    BulkMessageSent,
    StateChange,
    AuthFailure,
    ReconnectAttempt,
    WebhookSet,
    ApiError,
    UncaughtException,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Warning => "warning",
            Self::MessageReceived => "message_received",
            Self::MessageSent => "message_sent",
            Self::BulkMessageSent => "bulk_message_sent",
            Self::StateChange => "state_change",
            Self::AuthFailure => "auth_failure",
            Self::ReconnectAttempt => "reconnect_attempt",
            Self::WebhookSet => "webhook_set",
            Self::ApiError => "api_error",
            Self::UncaughtException => "uncaught_exception",
        }
    }
}

/// A single log line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
}

/// Append-only event logger.
///
/// Never fails towards the caller: write errors are reported through
/// `tracing` and otherwise swallowed. Each entry is one short synchronous
/// append made on the calling thread, including from async handlers.
pub struct EventLogger {
    dir: PathBuf,
    recent_errors: Mutex<VecDeque<LogEntry>>,
}

impl EventLogger {
    /// Create a logger writing under `dir` (created on first write).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            recent_errors: Mutex::new(VecDeque::with_capacity(ERROR_BUFFER_CAPACITY)),
        }
    }

    /// Directory the daily files are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record an event stamped with the current time.
    pub fn log(&self, kind: EventKind, message: impl Into<String>) {
        self.log_at(Utc::now(), kind, message.into());
    }

    fn log_at(&self, now: DateTime<Utc>, kind: EventKind, message: String) {
        let entry = LogEntry {
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            kind,
            message,
        };

        if let Err(e) = self.append(&now, &entry) {
            error!("event log write failed: {e}");
        } else {
            debug!("event: [{}] {}", kind.as_str(), entry.message);
        }

        if kind == EventKind::Error {
            let mut buf = self
                .recent_errors
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            buf.push_back(entry);
            while buf.len() > ERROR_BUFFER_CAPACITY {
                buf.pop_front();
            }
        }
    }

    /// Path of the log file for the UTC day of `now`.
    pub fn file_for(&self, now: &DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("whatsapp_{}.log", now.format("%Y-%m-%d")))
    }

    fn append(&self, now: &DateTime<Utc>, entry: &LogEntry) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(now))?;
        file.write_all(line.as_bytes())
    }

    /// The last `n` buffered error entries, oldest first.
    pub fn recent_errors(&self, n: usize) -> Vec<LogEntry> {
        let buf = self
            .recent_errors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let skip = buf.len().saturating_sub(n);
        buf.iter().skip(skip).cloned().collect()
    }
}

/// First `max` characters of `s`, with `...` appended when cut.
pub fn preview(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_appends_json_lines_to_daily_file() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = EventLogger::new(tmp.path().join("logs"));
        let now = Utc.with_ymd_and_hms(2026, 3, 14, 9, 26, 53).unwrap();

        logger.log_at(now, EventKind::Ready, "client ready".to_string());
        logger.log_at(now, EventKind::MessageSent, "to: 5511".to_string());

        let path = tmp.path().join("logs/whatsapp_2026-03-14.log");
        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "ready");
        assert_eq!(lines[0]["message"], "client ready");
        assert_eq!(lines[0]["timestamp"], "2026-03-14T09:26:53.000Z");
        assert_eq!(lines[1]["type"], "message_sent");
    }

    #[test]
    fn test_new_day_starts_new_file() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = EventLogger::new(tmp.path());
        let late = Utc.with_ymd_and_hms(2026, 3, 14, 23, 59, 59).unwrap();
        let early = Utc.with_ymd_and_hms(2026, 3, 15, 0, 0, 1).unwrap();

        logger.log_at(late, EventKind::Warning, "a".to_string());
        logger.log_at(early, EventKind::Warning, "b".to_string());

        assert_eq!(read_lines(&logger.file_for(&late)).len(), 1);
        assert_eq!(read_lines(&logger.file_for(&early)).len(), 1);
    }

    #[test]
    fn test_error_buffer_keeps_last_ten() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = EventLogger::new(tmp.path());

        for i in 0..15 {
            logger.log(EventKind::Error, format!("failure {i}"));
        }

        let errors = logger.recent_errors(ERROR_BUFFER_CAPACITY);
        assert_eq!(errors.len(), 10);
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        let expected: Vec<String> = (5..15).map(|i| format!("failure {i}")).collect();
        assert_eq!(messages, expected);
    }

    #[test]
    fn test_non_error_entries_skip_buffer() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = EventLogger::new(tmp.path());
        logger.log(EventKind::Warning, "webhook test failed");
        logger.log(EventKind::Ready, "ready");
        assert!(logger.recent_errors(10).is_empty());
    }

    #[test]
    fn test_recent_errors_returns_tail() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = EventLogger::new(tmp.path());
        for i in 0..5 {
            logger.log(EventKind::Error, format!("e{i}"));
        }
        let last3: Vec<String> = logger
            .recent_errors(3)
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(last3, vec!["e2", "e3", "e4"]);
    }

    #[test]
    fn test_unwritable_dir_does_not_panic() {
        let tmp = tempfile::tempdir().unwrap();
        // A regular file where the directory should be.
        let blocker = tmp.path().join("logs");
        std::fs::write(&blocker, "not a dir").unwrap();

        let logger = EventLogger::new(&blocker);
        logger.log(EventKind::Error, "still buffered");
        assert_eq!(logger.recent_errors(10).len(), 1);
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 50), "short");
        assert_eq!(preview("abcdef", 3), "abc...");
        // Multi-byte characters are never split.
        assert_eq!(preview("ação rápida", 3), "açã...");
    }
}
