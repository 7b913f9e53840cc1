//! JSON-lines sinks over byte streams: stdout, pipes and files.

use super::{EncodeOptions, Sink};
use crate::error::SinkError;
use crate::event::EnhancedEvent;
use async_trait::async_trait;
use serde::Deserialize;
use std::pin::Pin;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

/// `stdout:` receiver settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StdoutConfig {
    #[serde(flatten)]
    pub options: EncodeOptions,
}

/// `pipe:` receiver settings. The path is opened write-only and truncated,
/// which also works for FIFOs and `/dev/stdout`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PipeConfig {
    pub path: String,
    #[serde(flatten)]
    pub options: EncodeOptions,
}

/// `file:` receiver settings. Events are appended.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileConfig {
    pub path: String,
    #[serde(flatten)]
    pub options: EncodeOptions,
}

type Writer = Pin<Box<dyn AsyncWrite + Send>>;

/// Writes one JSON document per line to an async byte stream.
pub struct StreamSink {
    target: String,
    options: EncodeOptions,
    writer: Mutex<Writer>,
}

impl std::fmt::Debug for StreamSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSink")
            .field("target", &self.target)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl StreamSink {
    /// Wrap an arbitrary writer.
    pub fn new(
        target: impl Into<String>,
        writer: impl AsyncWrite + Send + 'static,
        options: EncodeOptions,
    ) -> Self {
        Self { target: target.into(), options, writer: Mutex::new(Box::pin(writer)) }
    }

    pub fn stdout(config: &StdoutConfig) -> Self {
        Self::new("stdout", tokio::io::stdout(), config.options.clone())
    }

    pub async fn pipe(config: &PipeConfig) -> Result<Self, SinkError> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&config.path)
            .await?;
        Ok(Self::new(config.path.clone(), file, config.options.clone()))
    }

    pub async fn file(config: &FileConfig) -> Result<Self, SinkError> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)
            .await?;
        Ok(Self::new(config.path.clone(), file, config.options.clone()))
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

#[async_trait]
impl Sink for StreamSink {
    async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError> {
        let line = self.options.encode_line(event)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&self) {
        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.shutdown().await {
            debug!(target_path = %self.target, error = %err, "closing sink stream failed");
        }
    }
}
