//! Delivery sinks.
//!
//! A [`Sink`] performs the I/O for one receiver. Sinks are driven by the
//! receiver's dedicated worker, one event at a time, and never mutate the
//! shared [`EnhancedEvent`]: transformations such as key de-dotting or
//! layouts run on a sink-owned copy.

pub mod layout;
mod memory;
mod stream;

pub use memory::MemorySink;
pub use stream::{FileConfig, PipeConfig, StdoutConfig, StreamSink};

use crate::error::{ConfigError, SinkError};
use crate::event::EnhancedEvent;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

/// Delivery endpoint bound to a receiver.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Deliver one event. May block on I/O.
    async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError>;

    /// Release resources. Best effort; called once after the last `send`.
    async fn close(&self) {}
}

/// Transformations shared by the serialising sinks.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeOptions {
    /// Replace `.` with `_` in label and annotation keys.
    #[serde(default)]
    pub de_dot: bool,
    /// Reshape the event through a layout template before serialising.
    #[serde(default)]
    pub layout: Option<serde_json::Value>,
}

impl EncodeOptions {
    /// Serialise `event` as one JSON line (newline included).
    pub fn encode_line(&self, event: &EnhancedEvent) -> Result<Vec<u8>, SinkError> {
        let dedotted;
        let event = if self.de_dot {
            dedotted = event.dedot();
            &dedotted
        } else {
            event
        };

        let mut line = match &self.layout {
            Some(layout) => serde_json::to_vec(&layout::render(layout, event)?)?,
            None => serde_json::to_vec(event)?,
        };
        line.push(b'\n');
        Ok(line)
    }
}

/// One entry of the `receivers` list: a name plus exactly one sink type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverConfig {
    pub name: String,
    #[serde(default)]
    pub stdout: Option<StdoutConfig>,
    #[serde(default)]
    pub pipe: Option<PipeConfig>,
    #[serde(default)]
    pub file: Option<FileConfig>,
}

impl ReceiverConfig {
    /// Number of sink types populated on this entry.
    pub fn sink_count(&self) -> usize {
        [self.stdout.is_some(), self.pipe.is_some(), self.file.is_some()]
            .into_iter()
            .filter(|set| *set)
            .count()
    }

    /// Build the sink selected by the populated type key.
    pub async fn build(&self) -> Result<Arc<dyn Sink>, ConfigError> {
        let wrap = |source: SinkError| ConfigError::Sink { name: self.name.clone(), source };
        match (&self.stdout, &self.pipe, &self.file) {
            (Some(cfg), None, None) => Ok(Arc::new(StreamSink::stdout(cfg))),
            (None, Some(cfg), None) => Ok(Arc::new(StreamSink::pipe(cfg).await.map_err(wrap)?)),
            (None, None, Some(cfg)) => Ok(Arc::new(StreamSink::file(cfg).await.map_err(wrap)?)),
            _ => Err(ConfigError::SinkTypeCount { name: self.name.clone(), found: self.sink_count() }),
        }
    }
}
