//! Configuration document.
//!
//! The document is YAML with camelCase keys. Environment references (`$VAR`,
//! `${VAR}`) are expanded before parsing. [`Config::validate`] applies
//! defaults and rejects anything that would make the pipeline fail later.

use crate::cache::DEFAULT_CACHE_SIZE;
use crate::error::ConfigError;
use crate::registry::QueueConfig;
use crate::route::Route;
use crate::sinks::ReceiverConfig;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};

/// Maximum event age applied when neither age setting is present.
pub const DEFAULT_MAX_EVENT_AGE_SECONDS: i64 = 5;

const METRICS_PREFIX_PATTERN: &str = "^[a-zA-Z][a-zA-Z0-9_:]*_$";

/// Root configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub log_level: String,
    #[serde(default)]
    pub log_format: String,
    /// Deprecated alias of `maxEventAgeSeconds`.
    #[serde(default)]
    pub throttle_period: i64,
    #[serde(default)]
    pub max_event_age_seconds: i64,
    #[serde(default)]
    pub cluster_name: String,
    /// Restrict the event source to one namespace; empty watches all.
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub leader_election: LeaderElectionConfig,
    #[serde(default)]
    pub route: Route,
    #[serde(default)]
    pub receivers: Vec<ReceiverConfig>,
    #[serde(default = "default_kube_qps", rename = "kubeQPS")]
    pub kube_qps: f64,
    #[serde(default = "default_kube_burst")]
    pub kube_burst: u32,
    #[serde(default)]
    pub metrics_name_prefix: String,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    #[serde(default)]
    pub receiver_queue: QueueConfig,
}

fn default_kube_qps() -> f64 {
    5.0
}

fn default_kube_burst() -> u32 {
    10
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: String::new(),
            log_format: String::new(),
            throttle_period: 0,
            max_event_age_seconds: 0,
            cluster_name: String::new(),
            namespace: String::new(),
            leader_election: LeaderElectionConfig::default(),
            route: Route::default(),
            receivers: Vec::new(),
            kube_qps: default_kube_qps(),
            kube_burst: default_kube_burst(),
            metrics_name_prefix: String::new(),
            cache_size: DEFAULT_CACHE_SIZE,
            receiver_queue: QueueConfig::default(),
        }
    }
}

/// Lease-based leader election settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Name of the Lease object.
    #[serde(default, rename = "leaderElectionID")]
    pub leader_election_id: String,
    /// Namespace of the Lease; falls back to the pod namespace.
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_lease_duration")]
    pub lease_duration_seconds: u64,
    #[serde(default = "default_renew_deadline")]
    pub renew_deadline_seconds: u64,
    #[serde(default = "default_retry_period")]
    pub retry_period_seconds: u64,
}

fn default_lease_duration() -> u64 {
    15
}

fn default_renew_deadline() -> u64 {
    10
}

fn default_retry_period() -> u64 {
    2
}

impl Default for LeaderElectionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            leader_election_id: String::new(),
            namespace: None,
            lease_duration_seconds: default_lease_duration(),
            renew_deadline_seconds: default_renew_deadline(),
            retry_period_seconds: default_retry_period(),
        }
    }
}

/// Parsed `logLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Disabled,
}

impl LogLevel {
    /// Case-insensitive; empty selects `debug`, `fatal` and `panic` map to
    /// `error`.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "" | "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" | "fatal" | "panic" => Ok(LogLevel::Error),
            "disabled" | "off" => Ok(LogLevel::Disabled),
            _ => Err(ConfigError::InvalidLogLevel(raw.to_string())),
        }
    }

    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Disabled => LevelFilter::OFF,
        }
    }
}

/// Parsed `logFormat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl LogFormat {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(ConfigError::InvalidLogFormat(raw.to_string())),
        }
    }
}

impl Config {
    /// Read `path`, expand environment references and parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::from_yaml(&expand_env(&raw))
    }

    /// Parse an already expanded document.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        LogLevel::parse(&self.log_level)
    }

    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        LogFormat::parse(&self.log_format)
    }

    /// Leader election is enabled.
    pub fn leader_election_enabled(&self) -> bool {
        self.leader_election.enabled
    }

    /// Apply defaults and check the document. Stops at the first problem.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.validate_max_event_age()?;
        self.validate_metrics_name_prefix()?;
        self.validate_limits()?;
        self.validate_receivers()?;
        let known: HashSet<&str> = self.receivers.iter().map(|r| r.name.as_str()).collect();
        self.route.validate(|name| known.contains(name))?;
        self.validate_leader_election()
    }

    fn validate_max_event_age(&mut self) -> Result<(), ConfigError> {
        for (field, value) in
            [("throttlePeriod", self.throttle_period), ("maxEventAgeSeconds", self.max_event_age_seconds)]
        {
            if value < 0 {
                return Err(ConfigError::NegativeAge { field, value });
            }
        }

        match (self.throttle_period, self.max_event_age_seconds) {
            (0, 0) => {
                self.max_event_age_seconds = DEFAULT_MAX_EVENT_AGE_SECONDS;
                info!("set config.maxEventAgeSeconds=5 (default)");
            }
            (throttle, 0) => {
                info!("config.maxEventAgeSeconds={throttle}");
                warn!("config.throttlePeriod is depricated, consider using config.maxEventAgeSeconds instead");
                self.max_event_age_seconds = throttle;
            }
            (0, max_age) => {
                info!("config.maxEventAgeSeconds={max_age}");
            }
            _ => {
                error!("cannot set both throttlePeriod (depricated) and MaxEventAgeSeconds");
                return Err(ConfigError::ConflictingMaxEventAge);
            }
        }
        Ok(())
    }

    fn validate_metrics_name_prefix(&self) -> Result<(), ConfigError> {
        let prefix = &self.metrics_name_prefix;
        if prefix.is_empty() {
            warn!("metrics name prefix is empty, setting config.metricsNamePrefix='event_exporter_' is recommended");
            return Ok(());
        }
        if metrics_prefix_regex().is_match(prefix) {
            info!("config.metricsNamePrefix='{prefix}'");
            Ok(())
        } else {
            error!("config.metricsNamePrefix should match the regex: {METRICS_PREFIX_PATTERN}");
            Err(ConfigError::InvalidMetricsPrefix(prefix.clone()))
        }
    }

    fn validate_limits(&mut self) -> Result<(), ConfigError> {
        if self.cache_size == 0 {
            return Err(ConfigError::InvalidValue { field: "cacheSize", reason: "must be positive".into() });
        }
        if self.receiver_queue.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "receiverQueue.capacity",
                reason: "must be positive".into(),
            });
        }
        // zero means unset: fall back to the client defaults
        if self.kube_qps == 0.0 {
            self.kube_qps = default_kube_qps();
        }
        if self.kube_burst == 0 {
            self.kube_burst = default_kube_burst();
        }
        if !(self.kube_qps.is_finite() && self.kube_qps > 0.0) {
            return Err(ConfigError::InvalidValue {
                field: "kubeQPS",
                reason: format!("must be a positive number (got {})", self.kube_qps),
            });
        }
        Ok(())
    }

    fn validate_receivers(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, receiver) in self.receivers.iter().enumerate() {
            if receiver.name.is_empty() {
                return Err(ConfigError::EmptyReceiverName { index });
            }
            if !seen.insert(receiver.name.as_str()) {
                return Err(ConfigError::DuplicateReceiver(receiver.name.clone()));
            }
            let found = receiver.sink_count();
            if found != 1 {
                return Err(ConfigError::SinkTypeCount { name: receiver.name.clone(), found });
            }
        }
        Ok(())
    }

    fn validate_leader_election(&self) -> Result<(), ConfigError> {
        let le = &self.leader_election;
        if !le.enabled {
            return Ok(());
        }
        if le.leader_election_id.is_empty() {
            return Err(ConfigError::MissingLeaderElectionId);
        }
        if le.retry_period_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "leaderElection.retryPeriodSeconds",
                reason: "must be positive".into(),
            });
        }
        if le.renew_deadline_seconds <= le.retry_period_seconds {
            return Err(ConfigError::InvalidValue {
                field: "leaderElection.renewDeadlineSeconds",
                reason: "must be greater than retryPeriodSeconds".into(),
            });
        }
        if le.lease_duration_seconds <= le.renew_deadline_seconds {
            return Err(ConfigError::InvalidValue {
                field: "leaderElection.leaseDurationSeconds",
                reason: "must be greater than renewDeadlineSeconds".into(),
            });
        }
        Ok(())
    }
}

fn metrics_prefix_regex() -> &'static Regex {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    PREFIX.get_or_init(|| Regex::new(METRICS_PREFIX_PATTERN).unwrap_or_else(|_| unreachable!("static pattern")))
}

fn env_reference_regex() -> &'static Regex {
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    REFERENCE.get_or_init(|| {
        Regex::new(r"\$\{([^}]*)\}|\$([A-Za-z0-9_]+)").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// Replace `$VAR` and `${VAR}` with values from the process environment.
/// Unset variables expand to the empty string.
pub fn expand_env(text: &str) -> String {
    expand_with(text, |name| std::env::var(name).ok())
}

/// [`expand_env`] with an explicit variable source.
pub fn expand_with(text: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    env_reference_regex()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default();
            lookup(name).unwrap_or_default()
        })
        .into_owned()
}
