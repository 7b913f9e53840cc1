//! Event model flowing through the pipeline.
//!
//! [`Event`] mirrors the control plane's event object; [`EnhancedEvent`] is the
//! enriched, immutable record handed to receivers. Receivers share one
//! `Arc<EnhancedEvent>` per routed event.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label or annotation mapping.
pub type Metadata = BTreeMap<String, String>;

/// Object metadata carried by an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Metadata>,
}

/// Reference to the object an event concerns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub field_path: String,
}

impl ObjectReference {
    /// Stable cache identity: the control-plane UID, or `kind/namespace/name`
    /// for references that carry none.
    pub fn identity(&self) -> String {
        if self.uid.is_empty() {
            format!("{}/{}/{}", self.kind, self.namespace, self.name)
        } else {
            self.uid.clone()
        }
    }
}

/// Component that reported the event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub component: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host: String,
}

/// A raw cluster event as delivered by the event source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub involved_object: ObjectReference,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<DateTime<Utc>>,
    /// Coarse, second-resolution timestamp of the latest occurrence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub count: i32,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub type_: String,
    /// Fine-grained timestamp set by newer reporters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reporting_component: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reporting_instance: String,
}

impl Event {
    /// Timestamp used for age checks: `lastTimestamp` when set, else `eventTime`.
    pub fn reference_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp.or(self.event_time)
    }
}

/// Involved-object reference extended with the object's current metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedObjectReference {
    #[serde(flatten)]
    pub reference: ObjectReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Metadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Metadata>,
}

/// Enriched event handed to receivers.
///
/// Built once by the enricher and shared read-only between every receiver the
/// router selects. Sinks that need a transformed view work on a copy, see
/// [`EnhancedEvent::dedot`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedEvent {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub involved_object: EnhancedObjectReference,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(default)]
    pub source: EventSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub count: i32,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reporting_component: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reporting_instance: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,
}

impl From<Event> for EnhancedEvent {
    fn from(event: Event) -> Self {
        Self {
            metadata: event.metadata,
            involved_object: EnhancedObjectReference {
                reference: event.involved_object,
                labels: None,
                annotations: None,
            },
            reason: event.reason,
            message: event.message,
            source: event.source,
            first_timestamp: event.first_timestamp,
            last_timestamp: event.last_timestamp,
            count: event.count,
            type_: event.type_,
            event_time: event.event_time,
            action: event.action,
            reporting_component: event.reporting_component,
            reporting_instance: event.reporting_instance,
            cluster_name: String::new(),
        }
    }
}

impl EnhancedEvent {
    /// Copy of this event with `.` replaced by `_` in every label and
    /// annotation key, on the event and on the involved object.
    pub fn dedot(&self) -> EnhancedEvent {
        let mut copy = self.clone();
        dedot_map(&mut copy.metadata.labels);
        dedot_map(&mut copy.metadata.annotations);
        dedot_map(&mut copy.involved_object.labels);
        dedot_map(&mut copy.involved_object.annotations);
        copy
    }

    /// Reference timestamp: lastTimestamp, then eventTime, then firstTimestamp.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_timestamp.or(self.event_time).or(self.first_timestamp)
    }

    /// Reference timestamp as milliseconds since the epoch (0 when unset).
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp().map(|t| t.timestamp_millis()).unwrap_or_default()
    }

    /// Reference timestamp in RFC 3339 with millisecond precision.
    pub fn timestamp_iso8601(&self) -> String {
        self.timestamp()
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default()
    }
}

fn dedot_map(map: &mut Option<Metadata>) {
    if let Some(entries) = map.take() {
        *map = Some(entries.into_iter().map(|(k, v)| (k.replace('.', "_"), v)).collect());
    }
}
