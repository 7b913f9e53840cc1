use criterion::{black_box, criterion_group, criterion_main, Criterion};
use eventrelay::cache::ArcCache;
use eventrelay::{EnhancedEvent, Route};

fn route_tree() -> Route {
    serde_yaml::from_str(
        r#"
routes:
  - match:
      - receiver: dump
  - drop:
      - namespace: kube-system
      - minCount: 100
    match:
      - type: Warning
        receiver: alerts
    routes:
      - match:
          - labels:
              team: payments
            receiver: payments
          - reason:
              pattern: "^(BackOff|Failed)"
            receiver: crashes
"#,
    )
    .expect("valid route")
}

fn event(namespace: &str, reason: &str, type_: &str) -> EnhancedEvent {
    let mut ev = EnhancedEvent { reason: reason.into(), type_: type_.into(), count: 3, ..Default::default() };
    ev.metadata.namespace = namespace.into();
    ev.involved_object.reference.kind = "Pod".into();
    ev.involved_object.labels = Some([("team".to_string(), "payments".to_string())].into());
    ev
}

fn bench_route(c: &mut Criterion) {
    let route = route_tree();
    let warning = event("shop", "BackOff", "Warning");
    let normal = event("shop", "Pulled", "Normal");
    let dropped = event("kube-system", "BackOff", "Warning");

    c.bench_function("route_warning_fan_out", |b| b.iter(|| black_box(route.route(black_box(&warning)))));
    c.bench_function("route_normal", |b| b.iter(|| black_box(route.route(black_box(&normal)))));
    c.bench_function("route_dropped_subtree", |b| b.iter(|| black_box(route.route(black_box(&dropped)))));
}

fn bench_arc_cache(c: &mut Criterion) {
    c.bench_function("arc_cache_hit", |b| {
        let mut cache = ArcCache::new(1024);
        for i in 0..1024u32 {
            cache.put(i, i);
        }
        let mut i = 0u32;
        b.iter(|| {
            i = (i + 1) % 1024;
            black_box(cache.get(&i).copied())
        })
    });

    c.bench_function("arc_cache_churn", |b| {
        let mut cache = ArcCache::new(256);
        let mut i = 0u32;
        b.iter(|| {
            i = i.wrapping_add(1);
            if cache.get(&(i % 1024)).is_none() {
                cache.put(i % 1024, i);
            }
        })
    });
}

criterion_group!(benches, bench_route, bench_arc_cache);
criterion_main!(benches);
