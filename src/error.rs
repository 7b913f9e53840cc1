//! Error types for the event pipeline.
//!
//! Errors follow the pipeline's failure taxonomy: [`ConfigError`] is fatal and
//! aborts startup, [`LookupError`] and [`SinkError`] are recoverable per event,
//! and [`RegistryError`] covers receiver wiring mistakes.

use std::fmt;

/// Fatal configuration errors raised before the pipeline starts.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The document could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The document could not be parsed.
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// Both the deprecated and the current age setting were provided.
    #[error("cannot set both throttlePeriod (deprecated) and maxEventAgeSeconds")]
    ConflictingMaxEventAge,
    /// A negative age was configured.
    #[error("{field} must not be negative (got {value})")]
    NegativeAge {
        /// Offending key.
        field: &'static str,
        /// Configured value.
        value: i64,
    },
    /// `metricsNamePrefix` does not form a valid metric name prefix.
    #[error("metricsNamePrefix '{0}' should match the regex: ^[a-zA-Z][a-zA-Z0-9_:]*_$")]
    InvalidMetricsPrefix(String),
    /// Unknown log level.
    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),
    /// Unknown log format.
    #[error("unknown log format '{0}'")]
    InvalidLogFormat(String),
    /// A receiver has no name.
    #[error("receiver #{index} has an empty name")]
    EmptyReceiverName {
        /// Position in the `receivers` list.
        index: usize,
    },
    /// Two receivers share a name.
    #[error("duplicate receiver name '{0}'")]
    DuplicateReceiver(String),
    /// A receiver does not declare exactly one sink type.
    #[error("receiver '{name}' must configure exactly one sink type (found {found})")]
    SinkTypeCount {
        /// Receiver name.
        name: String,
        /// Number of sink keys populated.
        found: usize,
    },
    /// The route tree references a receiver that is not configured.
    #[error("route references unknown receiver '{0}'")]
    UnknownReceiver(String),
    /// Leader election is enabled without an identity.
    #[error("leaderElection.leaderElectionID is required when leader election is enabled")]
    MissingLeaderElectionId,
    /// A numeric setting is out of range.
    #[error("{field} is invalid: {reason}")]
    InvalidValue {
        /// Offending key.
        field: &'static str,
        /// Human readable explanation.
        reason: String,
    },
    /// A sink failed to initialise.
    #[error("cannot create sink for receiver '{name}': {source}")]
    Sink {
        /// Receiver name.
        name: String,
        /// Underlying failure.
        #[source]
        source: SinkError,
    },
}

/// Failure of the object-metadata lookup collaborator.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The object no longer exists; callers cache this outcome.
    #[error("object not found")]
    NotFound,
    /// Any other failure; never cached so the next occurrence retries.
    #[error("lookup failed: {0}")]
    Failed(String),
}

impl LookupError {
    /// Build a non-cacheable failure from any displayable error.
    pub fn failed(err: impl fmt::Display) -> Self {
        LookupError::Failed(err.to_string())
    }

    /// True when the object is known to be gone.
    pub fn is_not_found(&self) -> bool {
        matches!(self, LookupError::NotFound)
    }
}

/// Per-delivery sink failures.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum SinkError {
    /// I/O on the sink's destination failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// The event could not be serialised.
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    /// Sink-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Errors from receiver registration and dispatch.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RegistryError {
    /// A receiver with this name was already registered.
    #[error("receiver '{0}' is already registered")]
    Duplicate(String),
    /// No receiver with this name exists.
    #[error("receiver '{0}' is not registered")]
    UnknownReceiver(String),
    /// The receiver's queue was full and the event was dropped.
    #[error("queue of receiver '{0}' is full")]
    QueueFull(String),
    /// The registry was closed.
    #[error("receiver registry is closed")]
    Closed,
}
