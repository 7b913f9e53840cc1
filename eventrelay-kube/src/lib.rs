//! Kubernetes collaborators for `eventrelay`.
//!
//! - [`event_notifications`] watches core/v1 Events and yields
//!   [`eventrelay::Notification`]s.
//! - [`KubeObjectLookup`] fetches involved-object labels and annotations for
//!   the metadata caches, rate limited by `kubeQPS` / `kubeBurst`.
//! - [`LeaderElector`] holds a `coordination.k8s.io/v1` Lease so only one
//!   instance exports at a time.

pub mod convert;
pub mod leader;
pub mod lookup;
pub mod source;

pub use convert::to_event;
pub use leader::{LeaderElector, LeadershipEnd, LeaseAttempt, LeaseDecision, LeaseError, LeaseRecord};
pub use lookup::KubeObjectLookup;
pub use source::{event_notifications, notifications, NotificationMapper};
