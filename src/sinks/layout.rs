//! Layout templates: reshape an event into a caller-defined document.
//!
//! A layout is a nested mapping whose string leaves may contain `{{ ... }}`
//! actions. Supported actions:
//!
//! - `{{ .Reason }}`, `{{ .InvolvedObject.Kind }}`: field paths, matched
//!   case-insensitively. Object metadata (`.Name`, `.Namespace`, `.UID`, ...)
//!   is reachable from the top level.
//! - `{{ index .InvolvedObject.Labels "app" }}`: map indexing.
//! - `{{ .GetTimestampMs }}` and `{{ .GetTimestampISO8601 }}`.
//!
//! Unresolved references render as an empty string. Non-string leaves are
//! copied unchanged.

use crate::event::EnhancedEvent;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::OnceLock;

fn action_regex() -> &'static Regex {
    static ACTION: OnceLock<Regex> = OnceLock::new();
    ACTION.get_or_init(|| {
        Regex::new(r"\{\{-?\s*(.*?)\s*-?\}\}").unwrap_or_else(|_| unreachable!("static pattern"))
    })
}

/// Render `layout` against `event`.
pub fn render(layout: &Value, event: &EnhancedEvent) -> Result<Value, serde_json::Error> {
    let ctx = Context { event, doc: serde_json::to_value(event)? };
    Ok(ctx.render_value(layout))
}

struct Context<'a> {
    event: &'a EnhancedEvent,
    doc: Value,
}

impl Context<'_> {
    fn render_value(&self, node: &Value) -> Value {
        match node {
            Value::String(template) => Value::String(self.render_str(template)),
            Value::Object(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), self.render_value(v))).collect::<Map<_, _>>(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.render_value(v)).collect()),
            other => other.clone(),
        }
    }

    fn render_str(&self, template: &str) -> String {
        action_regex()
            .replace_all(template, |caps: &Captures<'_>| self.eval(&caps[1]))
            .into_owned()
    }

    fn eval(&self, action: &str) -> String {
        let words = split_words(action);
        match words.as_slice() {
            [] => String::new(),
            [single] => self.eval_operand(single).map(|v| display(&v)).unwrap_or_default(),
            [func, target, keys @ ..] if func == "index" => {
                let mut current = self.eval_operand(target);
                for key in keys {
                    let key = unquote(key).unwrap_or(key.as_str());
                    current = current.and_then(|v| v.get(key).cloned());
                }
                current.map(|v| display(&v)).unwrap_or_default()
            }
            _ => String::new(),
        }
    }

    fn eval_operand(&self, operand: &str) -> Option<Value> {
        if let Some(literal) = unquote(operand) {
            return Some(Value::String(literal.to_string()));
        }
        let path = operand.strip_prefix('.')?;
        match path {
            "" => Some(self.doc.clone()),
            "GetTimestampMs" => Some(Value::from(self.event.timestamp_millis())),
            "GetTimestampISO8601" => Some(Value::String(self.event.timestamp_iso8601())),
            _ => self.lookup(path),
        }
    }

    fn lookup(&self, path: &str) -> Option<Value> {
        let segments: Vec<&str> = path.split('.').collect();
        resolve(&self.doc, &segments).or_else(|| {
            let metadata = get_ci(&self.doc, "metadata")?;
            resolve(metadata, &segments)
        })
    }
}

fn resolve(root: &Value, segments: &[&str]) -> Option<Value> {
    let mut current = root;
    for segment in segments {
        current = get_ci(current, segment)?;
    }
    Some(current.clone())
}

fn get_ci<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    let map = value.as_object()?;
    map.get(key)
        .or_else(|| map.iter().find(|(k, _)| k.eq_ignore_ascii_case(key)).map(|(_, v)| v))
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn unquote(word: &str) -> Option<&str> {
    word.strip_prefix('"')
        .and_then(|w| w.strip_suffix('"'))
        .or_else(|| word.strip_prefix('`').and_then(|w| w.strip_suffix('`')))
}

/// Split on whitespace, keeping quoted strings whole.
fn split_words(action: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in action.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '`' => {
                quote = Some(c);
                current.push(c);
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, ObjectMeta, ObjectReference};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn event() -> EnhancedEvent {
        let mut ev = EnhancedEvent::from(Event {
            metadata: ObjectMeta {
                name: "web-0.17a".into(),
                namespace: "shop".into(),
                uid: "e-1".into(),
                ..Default::default()
            },
            involved_object: ObjectReference {
                kind: "Pod".into(),
                name: "web-0".into(),
                api_version: "v1".into(),
                ..Default::default()
            },
            reason: "BackOff".into(),
            message: "Back-off restarting failed container".into(),
            count: 4,
            last_timestamp: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
            ..Default::default()
        });
        ev.involved_object.labels =
            Some([("app".to_string(), "web".to_string())].into_iter().collect());
        ev
    }

    #[test]
    fn renders_paths_index_and_helpers() {
        let layout = json!({
            "msg": "{{ .Message }}",
            "where": "{{ .Namespace }}/{{ .InvolvedObject.Name }}",
            "kind": "{{ .InvolvedObject.Kind }}",
            "app": "{{ index .InvolvedObject.Labels \"app\" }}",
            "count": "{{ .Count }}",
            "ts": "{{ .GetTimestampMs }}",
            "iso": "{{ .GetTimestampISO8601 }}",
            "nested": { "uid": "{{ .UID }}", "apiVersion": "{{ .InvolvedObject.APIVersion }}" },
            "static": 7
        });
        let out = render(&layout, &event()).unwrap();

        assert_eq!(out["msg"], "Back-off restarting failed container");
        assert_eq!(out["where"], "shop/web-0");
        assert_eq!(out["kind"], "Pod");
        assert_eq!(out["app"], "web");
        assert_eq!(out["count"], "4");
        assert_eq!(out["ts"], "1709287200000");
        assert_eq!(out["iso"], "2024-03-01T10:00:00.000Z");
        assert_eq!(out["nested"]["uid"], "e-1");
        assert_eq!(out["nested"]["apiVersion"], "v1");
        assert_eq!(out["static"], 7);
    }

    #[test]
    fn unresolved_references_are_empty() {
        let layout = json!({
            "missing": "{{ .Nope.Deeper }}",
            "missing_key": "{{ index .InvolvedObject.Labels \"tier\" }}",
            "no_annotations": "{{ index .InvolvedObject.Annotations \"x\" }}",
            "text": "plain"
        });
        let out = render(&layout, &event()).unwrap();
        assert_eq!(out["missing"], "");
        assert_eq!(out["missing_key"], "");
        assert_eq!(out["no_annotations"], "");
        assert_eq!(out["text"], "plain");
    }

    #[test]
    fn quoted_words_stay_whole() {
        assert_eq!(
            split_words(r#"index .Labels "a b""#),
            vec!["index".to_string(), ".Labels".to_string(), "\"a b\"".to_string()]
        );
    }
}
