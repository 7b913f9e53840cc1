//! Watch-based event source.
//!
//! Wraps a `kube::runtime::watcher` over core/v1 Events and turns its
//! apply/delete stream into [`Notification`]s with informer semantics: the
//! first sighting of an event is `Added`, later sightings are `Updated`.

use crate::convert::to_event;
use eventrelay::Notification;
use futures::{future, Stream, StreamExt};
use k8s_openapi::api::core::v1::Event as CoreEvent;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use std::collections::HashSet;
use std::fmt::Display;
use tracing::debug;

/// Notifications for every Event in `namespace` (all namespaces when empty).
///
/// Watch errors surface as [`Notification::WatchError`]; the underlying
/// watcher reconnects with backoff, so the stream only ends when dropped.
pub fn event_notifications(client: Client, namespace: &str) -> impl Stream<Item = Notification> + Send {
    let api: Api<CoreEvent> = if namespace.is_empty() {
        Api::all(client)
    } else {
        Api::namespaced(client, namespace)
    };
    debug!(namespace = %namespace, "starting event watch");
    let raw = watcher(api, watcher::Config::default()).default_backoff();
    notifications(raw)
}

/// Map any watcher stream to notifications.
pub fn notifications<S, E>(raw: S) -> impl Stream<Item = Notification> + Send
where
    S: Stream<Item = Result<watcher::Event<CoreEvent>, E>> + Send,
    E: Display,
{
    raw.scan(NotificationMapper::default(), |mapper, item| future::ready(Some(mapper.map(item))))
        .filter_map(future::ready)
}

/// Tracks which events were already seen.
///
/// A re-list (`Init` .. `InitDone`) rebuilds the seen set, so events deleted
/// while the watch was down are forgotten.
#[derive(Debug, Default)]
pub struct NotificationMapper {
    seen: HashSet<String>,
    relist: Option<HashSet<String>>,
}

impl NotificationMapper {
    pub fn map<E: Display>(&mut self, item: Result<watcher::Event<CoreEvent>, E>) -> Option<Notification> {
        let event = match item {
            Ok(event) => event,
            Err(err) => return Some(Notification::WatchError(err.to_string())),
        };
        match event {
            watcher::Event::Init => {
                self.relist = Some(HashSet::new());
                None
            }
            watcher::Event::InitApply(obj) => {
                let key = key_of(&obj);
                if let Some(relist) = self.relist.as_mut() {
                    relist.insert(key.clone());
                }
                self.apply(key, &obj)
            }
            watcher::Event::InitDone => {
                if let Some(relist) = self.relist.take() {
                    self.seen = relist;
                }
                None
            }
            watcher::Event::Apply(obj) => {
                let key = key_of(&obj);
                self.apply(key, &obj)
            }
            watcher::Event::Delete(obj) => {
                self.seen.remove(&key_of(&obj));
                convert(&obj).map(Notification::Deleted)
            }
        }
    }

    fn apply(&mut self, key: String, obj: &CoreEvent) -> Option<Notification> {
        let first_sighting = self.seen.insert(key);
        let event = match to_event(obj) {
            Ok(event) => event,
            Err(err) => return Some(Notification::WatchError(format!("cannot decode event: {err}"))),
        };
        Some(if first_sighting { Notification::Added(event) } else { Notification::Updated(event) })
    }

    /// Number of events currently tracked.
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }
}

fn convert(obj: &CoreEvent) -> Option<eventrelay::Event> {
    to_event(obj).ok()
}

fn key_of(obj: &CoreEvent) -> String {
    let meta = &obj.metadata;
    match &meta.uid {
        Some(uid) if !uid.is_empty() => uid.clone(),
        _ => format!(
            "{}/{}",
            meta.namespace.as_deref().unwrap_or_default(),
            meta.name.as_deref().unwrap_or_default()
        ),
    }
}
