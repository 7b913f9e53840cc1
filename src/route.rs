//! Rule-tree routing.
//!
//! A [`Route`] is evaluated depth first. At each node:
//!
//! 1. if any `drop` rule matches, the node and its whole subtree are skipped;
//! 2. otherwise the node is active when it has no `match` rules or at least
//!    one of them matches. An active node contributes its own `receiver` and
//!    the `receiver` of every matching rule, then descends into `routes`;
//! 3. an inactive node contributes nothing and does not descend.
//!
//! The tree is built once from configuration and never mutated.

use crate::error::ConfigError;
use crate::event::{EnhancedEvent, Metadata};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Node of the routing tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    /// Disjunction of rules that activate this node; empty matches everything.
    #[serde(default, rename = "match")]
    pub match_rules: Vec<Rule>,
    /// Rules that discard the event for this node and all descendants.
    #[serde(default, rename = "drop")]
    pub drop_rules: Vec<Rule>,
    /// Receiver reached whenever this node is active.
    #[serde(default)]
    pub receiver: Option<String>,
    /// Child nodes refining this one.
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl Route {
    /// Receivers the event should be delivered to. May be empty.
    pub fn route(&self, event: &EnhancedEvent) -> BTreeSet<String> {
        let mut selected = BTreeSet::new();
        self.walk(event, &mut selected);
        selected
    }

    fn walk(&self, event: &EnhancedEvent, selected: &mut BTreeSet<String>) {
        if self.drop_rules.iter().any(|rule| rule.matches(event)) {
            return;
        }

        let mut active = self.match_rules.is_empty();
        for rule in &self.match_rules {
            if rule.matches(event) {
                active = true;
                if let Some(receiver) = &rule.receiver {
                    selected.insert(receiver.clone());
                }
            }
        }
        if !active {
            return;
        }

        if let Some(receiver) = &self.receiver {
            selected.insert(receiver.clone());
        }
        for child in &self.routes {
            child.walk(event, selected);
        }
    }

    /// Every receiver name referenced anywhere in the tree.
    pub fn receivers(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_receivers(&mut names);
        names
    }

    fn collect_receivers<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        if let Some(receiver) = &self.receiver {
            names.insert(receiver.as_str());
        }
        for rule in &self.match_rules {
            if let Some(receiver) = &rule.receiver {
                names.insert(receiver.as_str());
            }
        }
        for child in &self.routes {
            child.collect_receivers(names);
        }
    }

    /// Fail on the first referenced receiver that `is_known` rejects.
    pub fn validate(&self, is_known: impl Fn(&str) -> bool) -> Result<(), ConfigError> {
        match self.receivers().into_iter().find(|name| !is_known(name)) {
            Some(unknown) => Err(ConfigError::UnknownReceiver(unknown.to_string())),
            None => Ok(()),
        }
    }
}

/// Conjunction of criteria over one event. Unset criteria always hold.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub message: Option<FieldMatcher>,
    #[serde(default)]
    pub api_version: Option<FieldMatcher>,
    #[serde(default)]
    pub kind: Option<FieldMatcher>,
    #[serde(default)]
    pub namespace: Option<FieldMatcher>,
    /// Involved object name.
    #[serde(default)]
    pub name: Option<FieldMatcher>,
    #[serde(default)]
    pub reason: Option<FieldMatcher>,
    #[serde(default, rename = "type")]
    pub type_: Option<FieldMatcher>,
    #[serde(default)]
    pub component: Option<FieldMatcher>,
    #[serde(default)]
    pub host: Option<FieldMatcher>,
    /// Involved object labels.
    #[serde(default)]
    pub labels: BTreeMap<String, FieldMatcher>,
    /// Involved object annotations.
    #[serde(default)]
    pub annotations: BTreeMap<String, FieldMatcher>,
    /// Minimum repeat count; zero disables the check.
    #[serde(default)]
    pub min_count: i32,
    /// Receiver reached when this rule matches inside a `match` list.
    #[serde(default)]
    pub receiver: Option<String>,
}

impl Rule {
    pub fn matches(&self, event: &EnhancedEvent) -> bool {
        let object = &event.involved_object.reference;
        let scalars = [
            (&self.message, event.message.as_str()),
            (&self.api_version, object.api_version.as_str()),
            (&self.kind, object.kind.as_str()),
            (&self.namespace, event.metadata.namespace.as_str()),
            (&self.name, object.name.as_str()),
            (&self.reason, event.reason.as_str()),
            (&self.type_, event.type_.as_str()),
            (&self.component, event.source.component.as_str()),
            (&self.host, event.source.host.as_str()),
        ];
        for (criterion, value) in scalars {
            if let Some(matcher) = criterion {
                if !matcher.matches(Some(value).filter(|v| !v.is_empty())) {
                    return false;
                }
            }
        }

        if self.min_count > 0 && event.count < self.min_count {
            return false;
        }

        map_matches(&self.labels, event.involved_object.labels.as_ref())
            && map_matches(&self.annotations, event.involved_object.annotations.as_ref())
    }
}

fn map_matches(criteria: &BTreeMap<String, FieldMatcher>, actual: Option<&Metadata>) -> bool {
    criteria.iter().all(|(key, matcher)| {
        let value = actual.and_then(|m| m.get(key)).map(String::as_str);
        matcher.matches(value)
    })
}

/// Predicate over a single string value.
///
/// In YAML a plain scalar is an exact match, `{pattern: <regex>}` an
/// unanchored regular expression and `{exists: <bool>}` a presence check.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawMatcher")]
pub enum FieldMatcher {
    Exact(String),
    Pattern(Regex),
    Exists(bool),
}

impl FieldMatcher {
    pub fn exact(value: impl Into<String>) -> Self {
        FieldMatcher::Exact(value.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(FieldMatcher::Pattern)
    }

    /// `None` (or empty) values only satisfy `Exists(false)` and the empty
    /// exact match.
    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            FieldMatcher::Exact(expected) => value.unwrap_or_default() == expected.as_str(),
            FieldMatcher::Pattern(re) => value.is_some_and(|v| re.is_match(v)),
            FieldMatcher::Exists(expected) => value.is_some() == *expected,
        }
    }
}

impl PartialEq for FieldMatcher {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldMatcher::Exact(a), FieldMatcher::Exact(b)) => a == b,
            (FieldMatcher::Pattern(a), FieldMatcher::Pattern(b)) => a.as_str() == b.as_str(),
            (FieldMatcher::Exists(a), FieldMatcher::Exists(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMatcher {
    Text(String),
    Integer(i64),
    Bool(bool),
    Pattern { pattern: String },
    Exists { exists: bool },
}

impl TryFrom<RawMatcher> for FieldMatcher {
    type Error = regex::Error;

    fn try_from(raw: RawMatcher) -> Result<Self, Self::Error> {
        Ok(match raw {
            RawMatcher::Text(s) => FieldMatcher::Exact(s),
            RawMatcher::Integer(n) => FieldMatcher::Exact(n.to_string()),
            RawMatcher::Bool(b) => FieldMatcher::Exact(b.to_string()),
            RawMatcher::Pattern { pattern } => FieldMatcher::Pattern(Regex::new(&pattern)?),
            RawMatcher::Exists { exists } => FieldMatcher::Exists(exists),
        })
    }
}
