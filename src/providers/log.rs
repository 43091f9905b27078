//! Sinks for the request log. Every resolved client receives the same sink
//! and writes one line per outgoing request.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[async_trait]
pub(crate) trait LogSink: Send + Sync {
    async fn write_log(&self, line: String);
}

pub(crate) type SharedLogSink = Arc<dyn LogSink>;

/// Forwards log lines to `tracing` at debug level.
pub(crate) struct TracingLogSink;

#[async_trait]
impl LogSink for TracingLogSink {
    async fn write_log(&self, line: String) {
        tracing::debug!(target: "modelres::requests", "{}", line);
    }
}

/// Appends log lines to a file.
pub(crate) struct FileLogSink {
    file: Mutex<File>,
}

impl FileLogSink {
    pub(crate) async fn open<P: AsRef<Path>>(path: P) -> std::io::Result<FileLogSink> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        Ok(FileLogSink {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl LogSink for FileLogSink {
    async fn write_log(&self, mut line: String) {
        line.push('\n');

        let mut file = self.file.lock().await;

        // A broken log must not break the request it describes
        if let Err(err) = file.write_all(line.as_bytes()).await {
            tracing::warn!("failed to write to the prompt log: {}", err);
        } else if let Err(err) = file.flush().await {
            tracing::warn!("failed to flush the prompt log: {}", err);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records every line it receives.
    #[derive(Default)]
    pub(crate) struct RecordingLogSink {
        pub lines: std::sync::Mutex<Vec<String>>,
    }

    impl RecordingLogSink {
        pub(crate) fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LogSink for RecordingLogSink {
        async fn write_log(&self, line: String) {
            self.lines.lock().unwrap().push(line);
        }
    }

    #[tokio::test]
    async fn test_file_log_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.log");

        {
            let sink = FileLogSink::open(&path).await.unwrap();
            sink.write_log("first".to_string()).await;
            sink.write_log("second".to_string()).await;
        }

        // Reopening must append, not truncate
        let sink = FileLogSink::open(&path).await.unwrap();
        sink.write_log("third".to_string()).await;

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\nthird\n");
    }
}
