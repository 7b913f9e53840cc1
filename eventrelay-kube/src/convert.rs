//! Conversion from API objects to the pipeline's event model.
//!
//! The pipeline model uses the same camelCase field names as the API, so
//! conversion goes through the JSON representation. This keeps it independent
//! of the timestamp types used by the generated bindings.

use eventrelay::Event;
use k8s_openapi::api::core::v1::Event as CoreEvent;

/// Convert a core/v1 Event. Unknown fields (managedFields, series, ...) are
/// dropped.
pub fn to_event(event: &CoreEvent) -> Result<Event, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(event)?)
}
