#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # eventrelay
//!
//! Pipeline that ships cluster events to configurable receivers.
//!
//! ## Pipeline
//!
//! ```text
//! notification -> AdmissionFilter -> Enricher -> Route -> ReceiverRegistry -> Sink
//! ```
//!
//! - [`AdmissionFilter`] drops events older than `maxEventAgeSeconds`.
//! - [`Enricher`] attaches involved-object labels and annotations through two
//!   adaptive-replacement [`MetadataCache`]s with negative caching.
//! - [`Route`] walks the match/drop rule tree and yields receiver names.
//! - [`ChannelReceiverRegistry`] gives each receiver its own bounded queue and
//!   worker so one slow sink never holds back another.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eventrelay::{Config, Engine, AtomicMetrics};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), eventrelay::ConfigError> {
//! let mut config = Config::from_yaml(r#"
//! route:
//!   routes:
//!     - match:
//!         - receiver: dump
//! receivers:
//!   - name: dump
//!     stdout: {}
//! "#)?;
//! config.validate()?;
//! let mut engine = Engine::from_config(&config, Arc::new(AtomicMetrics::new())).await?;
//! // feed events through an EventWatcher, then:
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod admission;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod event;
pub mod metrics;
pub mod ratelimit;
pub mod registry;
pub mod route;
pub mod sinks;
pub mod watcher;

// Re-exports
pub use admission::AdmissionFilter;
pub use cache::{MetadataCache, MetadataKind, ObjectLookup, ObjectMetadata};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, LeaderElectionConfig, LogFormat, LogLevel};
pub use engine::Engine;
pub use enrich::Enricher;
pub use error::{ConfigError, LookupError, RegistryError, SinkError};
pub use event::{EnhancedEvent, EnhancedObjectReference, Event, EventSource, Metadata, ObjectMeta, ObjectReference};
pub use metrics::{AtomicMetrics, MetricsRecorder, MetricsSnapshot, NoopMetrics};
pub use ratelimit::TokenBucket;
pub use registry::{BackpressurePolicy, ChannelReceiverRegistry, QueueConfig, ReceiverRegistry};
pub use route::{FieldMatcher, Route, Rule};
pub use sinks::{MemorySink, ReceiverConfig, Sink, StreamSink};
pub use watcher::{EventHandler, EventWatcher, Notification};
