//! Lease-based leader election.
//!
//! One `coordination.k8s.io/v1` Lease names the active instance. The holder
//! renews it every retry period; any other instance takes it over once the
//! last renewal is older than the lease duration.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use eventrelay::LeaderElectionConfig;
use k8s_openapi::api::coordination::v1::Lease;
use kube::api::{Api, PostParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Failures talking to the Lease API.
#[derive(thiserror::Error, Debug)]
pub enum LeaseError {
    #[error("kubernetes: {0}")]
    Kube(#[from] kube::Error),
    #[error("lease decode: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The fields of a Lease spec the elector reads and writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder_identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_duration_seconds: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "micro_time")]
    pub acquire_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "micro_time")]
    pub renew_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_transitions: Option<i32>,
}

impl LeaseRecord {
    fn holder(&self) -> &str {
        self.holder_identity.as_deref().unwrap_or_default()
    }
}

/// What a candidate may do with the current lease.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseDecision {
    /// The lease is free or expired.
    Acquire,
    /// The candidate already holds it.
    Renew,
    /// Another live holder owns it.
    HeldBy(String),
}

/// Decide how `identity` may treat `record` at `now`.
pub fn decide(record: Option<&LeaseRecord>, identity: &str, now: DateTime<Utc>) -> LeaseDecision {
    let Some(record) = record else {
        return LeaseDecision::Acquire;
    };
    let holder = record.holder();
    if holder.is_empty() {
        return LeaseDecision::Acquire;
    }
    if holder == identity {
        return LeaseDecision::Renew;
    }
    let duration = ChronoDuration::seconds(i64::from(record.lease_duration_seconds.unwrap_or(0)));
    match record.renew_time.or(record.acquire_time) {
        Some(renewed) if renewed + duration > now => LeaseDecision::HeldBy(holder.to_string()),
        _ => LeaseDecision::Acquire,
    }
}

/// Record written by `identity` after a successful decision.
pub fn next_record(
    current: Option<&LeaseRecord>,
    decision: &LeaseDecision,
    identity: &str,
    lease_duration: Duration,
    now: DateTime<Utc>,
) -> LeaseRecord {
    let transitions = current.and_then(|r| r.lease_transitions).unwrap_or(0);
    let duration = i32::try_from(lease_duration.as_secs()).unwrap_or(i32::MAX);
    match decision {
        LeaseDecision::Renew => LeaseRecord {
            renew_time: Some(now),
            lease_duration_seconds: Some(duration),
            ..current.cloned().unwrap_or_default()
        },
        _ => {
            let changed = current.map(|r| r.holder() != identity && !r.holder().is_empty()).unwrap_or(false);
            LeaseRecord {
                holder_identity: Some(identity.to_string()),
                lease_duration_seconds: Some(duration),
                acquire_time: Some(now),
                renew_time: Some(now),
                lease_transitions: Some(if changed { transitions + 1 } else { transitions }),
            }
        }
    }
}

/// Why [`LeaderElector::hold`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadershipEnd {
    Cancelled,
    Lost,
}

/// Outcome of one election round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseAttempt {
    /// The lease is ours after this round.
    Held,
    /// Another instance holds a live lease.
    HeldBy(String),
    /// A concurrent writer updated the lease first.
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenewalStep {
    Renewed,
    Retry,
    Lost,
}

/// Decide what `hold` does after a renewal round. `None` is a failed round.
/// Only a live foreign holder ends leadership before the renew deadline.
fn renewal_step(attempt: Option<&LeaseAttempt>, since_renewal: Duration, renew_deadline: Duration) -> RenewalStep {
    match attempt {
        Some(LeaseAttempt::Held) => RenewalStep::Renewed,
        Some(LeaseAttempt::HeldBy(_)) => RenewalStep::Lost,
        Some(LeaseAttempt::Conflict) | None if since_renewal > renew_deadline => RenewalStep::Lost,
        Some(LeaseAttempt::Conflict) | None => RenewalStep::Retry,
    }
}

/// Acquires and renews one Lease.
pub struct LeaderElector {
    api: Api<Lease>,
    name: String,
    namespace: String,
    identity: String,
    lease_duration: Duration,
    renew_deadline: Duration,
    retry_period: Duration,
}

impl std::fmt::Debug for LeaderElector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderElector")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl LeaderElector {
    /// Elector for the Lease described by `config`.
    ///
    /// The namespace falls back to the client's default namespace.
    pub fn new(client: Client, config: &LeaderElectionConfig) -> Self {
        let namespace = config
            .namespace
            .clone()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| client.default_namespace().to_string());
        Self {
            api: Api::namespaced(client, &namespace),
            name: config.leader_election_id.clone(),
            namespace,
            identity: default_identity(),
            lease_duration: Duration::from_secs(config.lease_duration_seconds),
            renew_deadline: Duration::from_secs(config.renew_deadline_seconds),
            retry_period: Duration::from_secs(config.retry_period_seconds.max(1)),
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Block until the lease is held or `cancel` fires. Returns whether the
    /// lease was acquired.
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        info!(lease = %self.name, namespace = %self.namespace, identity = %self.identity, "attempting to acquire leader lease");
        loop {
            match self.try_acquire_or_renew().await {
                Ok(LeaseAttempt::Held) => {
                    info!(lease = %self.name, identity = %self.identity, "Leader election won");
                    return true;
                }
                Ok(_) => {}
                Err(err) => warn!(lease = %self.name, error = %err, "error acquiring lease"),
            }
            tokio::select! {
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.retry_period) => {}
            }
        }
    }

    /// Keep renewing until `cancel` fires, another instance takes the lease,
    /// or no renewal succeeds within the renew deadline.
    pub async fn hold(&self, cancel: &CancellationToken) -> LeadershipEnd {
        let mut last_renewal = Instant::now();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return LeadershipEnd::Cancelled,
                _ = tokio::time::sleep(self.retry_period) => {}
            }
            let attempt = match self.try_acquire_or_renew().await {
                Ok(attempt) => Some(attempt),
                Err(err) => {
                    warn!(lease = %self.name, error = %err, "error renewing lease");
                    None
                }
            };
            match renewal_step(attempt.as_ref(), last_renewal.elapsed(), self.renew_deadline) {
                RenewalStep::Renewed => last_renewal = Instant::now(),
                RenewalStep::Retry => debug!(lease = %self.name, "lease not renewed, retrying"),
                RenewalStep::Lost => return LeadershipEnd::Lost,
            }
        }
    }

    /// Give the lease up if still held. Errors are logged.
    pub async fn release(&self) {
        match self.try_release().await {
            Ok(()) => debug!(lease = %self.name, "leader lease released"),
            Err(err) => warn!(lease = %self.name, error = %err, "cannot release lease"),
        }
    }

    async fn try_release(&self) -> Result<(), LeaseError> {
        let Some(lease) = self.api.get_opt(&self.name).await? else {
            return Ok(());
        };
        let record = read_record(&lease)?.unwrap_or_default();
        if record.holder() != self.identity {
            return Ok(());
        }
        let released = LeaseRecord { holder_identity: None, lease_duration_seconds: Some(1), ..record };
        let lease = self.build(&released, lease.metadata.resource_version.clone())?;
        self.api.replace(&self.name, &PostParams::default(), &lease).await?;
        Ok(())
    }

    /// One round of the election.
    pub async fn try_acquire_or_renew(&self) -> Result<LeaseAttempt, LeaseError> {
        let now = Utc::now();
        let existing = self.api.get_opt(&self.name).await?;
        let Some(existing) = existing else {
            let record = next_record(None, &LeaseDecision::Acquire, &self.identity, self.lease_duration, now);
            let lease = self.build(&record, None)?;
            return match self.api.create(&PostParams::default(), &lease).await {
                Ok(_) => Ok(LeaseAttempt::Held),
                Err(err) if is_conflict(&err) => Ok(LeaseAttempt::Conflict),
                Err(err) => Err(err.into()),
            };
        };

        let current = read_record(&existing)?;
        let decision = decide(current.as_ref(), &self.identity, now);
        if let LeaseDecision::HeldBy(holder) = &decision {
            debug!(lease = %self.name, holder = %holder, "lease held by another instance");
            return Ok(LeaseAttempt::HeldBy(holder.clone()));
        }
        let record = next_record(current.as_ref(), &decision, &self.identity, self.lease_duration, now);
        let lease = self.build(&record, existing.metadata.resource_version.clone())?;
        match self.api.replace(&self.name, &PostParams::default(), &lease).await {
            Ok(_) => Ok(LeaseAttempt::Held),
            Err(err) if is_conflict(&err) => Ok(LeaseAttempt::Conflict),
            Err(err) => Err(err.into()),
        }
    }

    fn build(&self, record: &LeaseRecord, resource_version: Option<String>) -> Result<Lease, serde_json::Error> {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "coordination.k8s.io/v1",
            "kind": "Lease",
            "metadata": {
                "name": self.name,
                "namespace": self.namespace,
                "resourceVersion": resource_version,
            },
            "spec": record,
        }))
    }
}

fn read_record(lease: &Lease) -> Result<Option<LeaseRecord>, serde_json::Error> {
    lease
        .spec
        .as_ref()
        .map(|spec| serde_json::to_value(spec).and_then(serde_json::from_value))
        .transpose()
}

fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 409)
}

/// Pod name when running in-cluster, otherwise a per-process identity.
pub fn default_identity() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| format!("eventrelay-{}", std::process::id()))
}

mod micro_time {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}
