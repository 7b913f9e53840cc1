mod common;

use common::{enhanced, labels};
use eventrelay::{Config, Route};
use std::collections::BTreeSet;

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn drop_rule_wins_over_match_rule() {
    let route: Route = serde_yaml::from_str(
        r#"
routes:
  - drop:
      - minCount: 6
        apiVersion: v33
    match:
      - receiver: stdout
"#,
    )
    .unwrap();

    let mut ev = enhanced("default", "Created", "Normal");
    ev.involved_object.reference.api_version = "v33".into();

    ev.count = 6;
    assert!(route.route(&ev).is_empty());
    ev.count = 30;
    assert!(route.route(&ev).is_empty());

    ev.count = 5;
    assert_eq!(route.route(&ev), set(&["stdout"]));
}

#[test]
fn nested_routes_fan_out_and_deduplicate() {
    let mut config = Config::from_yaml(
        r#"
route:
  routes:
    - match:
        - receiver: dump
    - drop:
        - namespace: kube-system
      match:
        - type: Warning
          receiver: alerts
      routes:
        - match:
            - labels:
                team: payments
              receiver: payments
        - receiver: alerts
receivers:
  - name: dump
    stdout: {}
  - name: alerts
    stdout: {}
  - name: payments
    stdout: {}
"#,
    )
    .unwrap();
    config.validate().unwrap();
    let route = &config.route;

    let mut warning = enhanced("shop", "BackOff", "Warning");
    warning.involved_object.labels = Some(labels(&[("team", "payments")]));
    assert_eq!(route.route(&warning), set(&["alerts", "dump", "payments"]));

    let normal = enhanced("shop", "Pulled", "Normal");
    assert_eq!(route.route(&normal), set(&["dump"]));

    let system = enhanced("kube-system", "BackOff", "Warning");
    assert_eq!(route.route(&system), set(&["dump"]));
}

#[test]
fn routing_is_idempotent() {
    let route: Route = serde_yaml::from_str(
        r#"
routes:
  - match:
      - reason: "BackOff"
        receiver: a
      - reason:
          pattern: "^Back"
        receiver: b
"#,
    )
    .unwrap();
    let ev = enhanced("shop", "BackOff", "Warning");
    let first = route.route(&ev);
    assert_eq!(first, set(&["a", "b"]));
    for _ in 0..10 {
        assert_eq!(route.route(&ev), first);
    }
}
