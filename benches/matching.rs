//! Benchmarks for ruler rule matching
//!
//! Matching cost should follow the size of the event and the kinds of
//! patterns in use, not the number of stored rules. `rule_count` checks that
//! directly by matching the same event against machines of growing size.
//! `mixed_patterns` exercises every value interpretation at once (string,
//! suffix, numeric, CIDR and anything-but), and `add_delete_rule` measures
//! the writer path against a machine that already holds many rules.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ruler::Machine;

/// A machine holding `rules`, named `r0`, `r1`, ... in order.
fn machine_with<S: AsRef<str>>(rules: &[S]) -> Machine {
    let machine = Machine::new();
    for (i, rule) in rules.iter().enumerate() {
        machine
            .add_json_rule(format!("r{}", i), rule.as_ref())
            .unwrap();
    }
    machine
}

/// `count` two-field rules on `status` and `region`.
fn status_rules(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!(r#"{{"status": ["status_{}"], "region": ["eu-{}"]}}"#, i, i % 7))
        .collect()
}

fn bench_exact_match(c: &mut Criterion) {
    let machine = machine_with(&[r#"{"status": ["active"]}"#]);
    let event = r#"{"status": "active", "id": 123}"#;

    c.bench_function("exact_match", |b| {
        b.iter(|| machine.rules_for_json_event(black_box(event)).unwrap())
    });
}

fn bench_rule_count_independence(c: &mut Criterion) {
    let event = r#"{"status": "status_5", "region": "eu-5", "ignored": {"a": [1, 2, 3]}}"#;
    let mut group = c.benchmark_group("rule_count");
    for count in [10usize, 1_000, 10_000] {
        let machine = machine_with(&status_rules(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &event, |b, event| {
            b.iter(|| machine.rules_for_json_event(black_box(event)).unwrap())
        });
    }
    group.finish();
}

fn bench_mixed_patterns(c: &mut Criterion) {
    let machine = machine_with(&[
        r#"{"path": [{"prefix": "/api/"}]}"#,
        r#"{"path": [{"suffix": ".json"}]}"#,
        r#"{"path": [{"wildcard": "/api/*/orders/*"}]}"#,
        r#"{"method": [{"equals-ignore-case": "post"}]}"#,
        r#"{"latency": [{"numeric": [">", 100, "<=", 5000]}]}"#,
        r#"{"client": [{"cidr": "10.0.0.0/8"}]}"#,
        r#"{"env": [{"anything-but": ["test", "dev"]}]}"#,
    ]);
    let event = r#"{"path": "/api/v1/orders/17.json", "method": "POST", "latency": 250,
                    "client": "10.1.2.3", "env": "prod"}"#;

    c.bench_function("mixed_patterns", |b| {
        b.iter(|| machine.rules_for_json_event(black_box(event)).unwrap())
    });
}

fn bench_add_delete(c: &mut Criterion) {
    let ids: Vec<String> = (0..1_000).map(|i| format!(r#"{{"id": ["{}"]}}"#, i)).collect();
    let machine = machine_with(&ids);
    let rule = r#"{"id": [{"prefix": "42"}], "kind": ["x", "y"]}"#;
    let name = "tmp".to_string();

    c.bench_function("add_delete_rule", |b| {
        b.iter(|| {
            machine.add_json_rule(name.clone(), black_box(rule)).unwrap();
            machine.delete_json_rule(&name, black_box(rule)).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_exact_match,
    bench_rule_count_independence,
    bench_mixed_patterns,
    bench_add_delete
);
criterion_main!(benches);
