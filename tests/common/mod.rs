#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use eventrelay::{EnhancedEvent, Event, Metadata, ObjectReference};
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone)]
struct SharedWriter(Arc<Mutex<Vec<u8>>>);

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedGuard;
    fn make_writer(&'a self) -> Self::Writer {
        SharedGuard(self.0.clone())
    }
}

struct SharedGuard(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for SharedGuard {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Captured log output of the current thread.
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    _guard: DefaultGuard,
}

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8(self.buffer.lock().unwrap().clone()).unwrap()
    }
}

/// Route every log record of this thread into a buffer, down to `debug`.
pub fn capture_logs() -> LogCapture {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::fmt()
        .with_writer(BoxMakeWriter::new(SharedWriter(buffer.clone())))
        .with_target(true)
        .with_max_level(tracing::Level::DEBUG)
        .without_time()
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    LogCapture { buffer, _guard: guard }
}

pub fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
}

pub fn pod(namespace: &str, name: &str) -> ObjectReference {
    ObjectReference {
        kind: "Pod".into(),
        namespace: namespace.into(),
        name: name.into(),
        uid: format!("uid-{namespace}-{name}"),
        api_version: "v1".into(),
        ..Default::default()
    }
}

pub fn event(namespace: &str, reason: &str, type_: &str) -> Event {
    let mut ev = Event {
        involved_object: pod(namespace, "web-0"),
        reason: reason.into(),
        type_: type_.into(),
        last_timestamp: Some(at(10, 0, 0)),
        ..Default::default()
    };
    ev.metadata.namespace = namespace.into();
    ev.metadata.name = format!("web-0.{reason}");
    ev
}

pub fn enhanced(namespace: &str, reason: &str, type_: &str) -> EnhancedEvent {
    EnhancedEvent::from(event(namespace, reason, type_))
}

pub fn labels(pairs: &[(&str, &str)]) -> Metadata {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}
