// Logging module - chat transcript logging for the demo app

use anyhow::Result;
use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use pawchat_types::Message;

/// Safely truncate a string to a maximum number of characters
pub fn safe_truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let trunc_chars = if max_chars >= 3 { max_chars - 3 } else { 0 };
        format!("{}...", s.chars().take(trunc_chars).collect::<String>())
    }
}

#[derive(Serialize)]
struct LogEntry {
    timestamp: String, // ISO-8601 local time
    entry: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    direction: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    preview: String,
}

/// Appends one JSON line per appended message or reported warning.
///
/// Failures degrade to disabled logging; the chat session never notices.
pub struct TranscriptLogger {
    file_path: PathBuf,
    file: Option<tokio::fs::File>,
}

impl TranscriptLogger {
    /// Create a new logger; the file name is derived from the current
    /// local time, under `<workspace>/logs/`.
    pub async fn new(workspace: &Path) -> Result<Self> {
        let logs_dir = workspace.join("logs");
        fs::create_dir_all(&logs_dir).await?;

        let filename = format!("pawchat-{}.jsonl", Local::now().format("%Y-%m-%d-%H%M%S"));
        let file_path = logs_dir.join(filename);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .await?;
        Ok(Self {
            file_path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// Log an appended message. Payload bytes stay out of the log; only
    /// the rendered preview goes in, truncated.
    pub async fn log_message(&mut self, message: &Message) {
        let entry = LogEntry {
            timestamp: Local::now().to_rfc3339(),
            entry: "message",
            message_id: Some(message.id.0),
            direction: Some(if message.from_user { "out" } else { "in" }),
            kind: Some(message.body.kind()),
            preview: safe_truncate(&message.render_text(), 120),
        };
        self.write(&entry).await;
    }

    /// Log a reported warning (storage trouble, denied microphone).
    pub async fn log_warning(&mut self, warning: &str) {
        let entry = LogEntry {
            timestamp: Local::now().to_rfc3339(),
            entry: "warning",
            message_id: None,
            direction: None,
            kind: None,
            preview: safe_truncate(warning, 200),
        };
        self.write(&entry).await;
    }

    async fn write(&mut self, entry: &LogEntry) {
        if let Some(file) = &mut self.file {
            if let Ok(json) = serde_json::to_string(entry) {
                if let Err(e) = file.write_all(json.as_bytes()).await {
                    eprintln!("[Logging error] {}", e);
                } else if let Err(e) = file.write_all(b"\n").await {
                    eprintln!("[Logging error] {}", e);
                }
            }
        }
    }

    /// Close the logger (explicit drop). Called on graceful shutdown.
    pub async fn shutdown(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.sync_all().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pawchat_types::{MessageBody, MessageId};
    use tempfile::TempDir;

    #[test]
    fn test_safe_truncate() {
        assert_eq!(safe_truncate("short", 10), "short");
        assert_eq!(safe_truncate("a longer string", 8), "a lon...");
        assert_eq!(safe_truncate("héllo wörld", 8), "héllo...");
    }

    #[tokio::test]
    async fn test_transcript_lines_are_json() {
        let dir = TempDir::new().unwrap();
        let mut logger = TranscriptLogger::new(dir.path()).await.unwrap();

        let message = Message::from_user(
            MessageId(7),
            MessageBody::Text {
                content: "hello there".to_string(),
            },
        );
        logger.log_message(&message).await;
        logger.log_warning("storage unavailable: disk full").await;
        logger.shutdown().await;

        let raw = std::fs::read_to_string(logger.path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["entry"], "message");
        assert_eq!(first["direction"], "out");
        assert_eq!(first["kind"], "text");
        assert_eq!(first["preview"], "hello there");

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["entry"], "warning");
    }
}
