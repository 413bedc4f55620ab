use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use iz_core::{Dispatcher, Rule, RuleType};

fn rule_set(count: usize) -> Vec<Rule> {
    (0..count)
        .map(|i| {
            let mut rule = Rule::new(
                format!("rule-{i}"),
                format!("Rule {i}"),
                RuleType::Overrides,
                format!("https://api{i}.example.com/v?/*"),
            );
            rule.response_body = Some(format!("{{\"rule\":{i}}}"));
            rule
        })
        .collect()
}

fn bench_dispatch(c: &mut Criterion) {
    let rules = rule_set(200);
    let dispatcher = Dispatcher::new();

    // Warm the pattern cache so the steady state is measured
    dispatcher.find_matching_rules(&rules, "https://warm.example.com/", None);

    c.bench_function("first_match_hit", |b| {
        b.iter(|| dispatcher.first_match(black_box(&rules), black_box("https://api150.example.com/v1/users"), None))
    });

    c.bench_function("find_matching_miss", |b| {
        b.iter(|| {
            dispatcher.find_matching_rules(
                black_box(&rules),
                black_box("https://cdn.other.org/assets/app.js"),
                Some(RuleType::Overrides),
            )
        })
    });
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
