//! Routing engine: the route tree bound to a receiver registry.

use crate::config::Config;
use crate::error::{ConfigError, RegistryError};
use crate::event::EnhancedEvent;
use crate::metrics::MetricsRecorder;
use crate::registry::{ChannelReceiverRegistry, ReceiverRegistry};
use crate::route::Route;
use crate::sinks::Sink;
use crate::watcher::EventHandler;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Routes enriched events and hands them to their receivers.
pub struct Engine {
    route: Route,
    registry: Box<dyn ReceiverRegistry>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").field("route", &self.route).finish_non_exhaustive()
    }
}

impl Engine {
    /// Bind `route` to an already populated registry. Every receiver the
    /// route references must be registered; otherwise the registry is closed
    /// and the error returned.
    pub async fn new(route: Route, mut registry: impl ReceiverRegistry + 'static) -> Result<Self, ConfigError> {
        if let Err(err) = route.validate(|name| registry.contains(name)) {
            registry.close().await;
            return Err(err);
        }
        Ok(Self { route, registry: Box::new(registry) })
    }

    /// Build every configured sink, register it, and bind the route tree.
    pub async fn from_config(config: &Config, metrics: Arc<dyn MetricsRecorder>) -> Result<Self, ConfigError> {
        let mut registry = ChannelReceiverRegistry::new(config.receiver_queue, metrics);
        for receiver in &config.receivers {
            let sink: Arc<dyn Sink> = match receiver.build().await {
                Ok(sink) => sink,
                Err(err) => {
                    registry.close().await;
                    return Err(err);
                }
            };
            if let Err(err) = registry.register(&receiver.name, sink) {
                registry.close().await;
                return Err(match err {
                    RegistryError::Duplicate(name) => ConfigError::DuplicateReceiver(name),
                    other => ConfigError::InvalidValue { field: "receivers", reason: other.to_string() },
                });
            }
        }
        if let Err(err) = config.route.validate(|name| registry.contains(name)) {
            registry.close().await;
            return Err(err);
        }
        info!(receivers = config.receivers.len(), "engine ready");
        Ok(Self { route: config.route.clone(), registry: Box::new(registry) })
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Route `event` and enqueue it on every selected receiver. Returns the
    /// receivers selected.
    pub async fn dispatch(&self, event: EnhancedEvent) -> BTreeSet<String> {
        let receivers = self.route.route(&event);
        if receivers.is_empty() {
            debug!(reason = %event.reason, "event matched no receiver");
            return receivers;
        }

        let event = Arc::new(event);
        for name in &receivers {
            match self.registry.send_event(name, event.clone()).await {
                Ok(()) => {}
                // already counted and logged by the registry
                Err(RegistryError::QueueFull(_)) => {}
                Err(err) => warn!(receiver = %name, error = %err, "cannot hand event to receiver"),
            }
        }
        receivers
    }

    /// Drain every receiver and close the sinks.
    pub async fn stop(&mut self) {
        self.registry.close().await;
        info!("engine stopped");
    }
}

#[async_trait]
impl EventHandler for Engine {
    async fn on_event(&self, event: EnhancedEvent) {
        self.dispatch(event).await;
    }
}
