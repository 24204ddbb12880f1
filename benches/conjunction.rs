//! Candidate evaluation throughput for typical search filters.
#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dirfilter::{
    AliasDerefMode, Candidate, Dn, Entry, EntryId, EvaluatorBuilder, EvaluatorConfig, FilterNode,
    MemStore, SchemaRegistry,
};

const FAST_ENV_VAR: &str = "DIRFILTER_BENCH_FAST";
const DEFAULT_ENTRIES: usize = 10_000;
const FAST_ENTRIES: usize = 1_000;

struct Fixture {
    store: Arc<MemStore>,
    registry: Arc<SchemaRegistry>,
    suffix: EntryId,
    ids: Vec<EntryId>,
}

fn entry_count() -> usize {
    if std::env::var_os(FAST_ENV_VAR).is_some() {
        FAST_ENTRIES
    } else {
        DEFAULT_ENTRIES
    }
}

fn fixture(count: usize) -> Fixture {
    let registry = Arc::new(SchemaRegistry::with_core_schema());
    let store = Arc::new(MemStore::new());
    let oc = registry.lookup("objectClass").expect("objectClass");
    let ou = registry.lookup("ou").expect("ou");
    let cn = registry.lookup("cn").expect("cn");
    let mail = registry.lookup("mail").expect("mail");
    let uid_number = registry.lookup("uidNumber").expect("uidNumber");

    let suffix = store
        .add(Entry::new(Dn::parse("dc=example").expect("dn")).with(&oc, ["domain"]))
        .expect("suffix");
    store
        .add(Entry::new(Dn::parse("ou=people,dc=example").expect("dn")).with(&ou, ["people"]))
        .expect("ou");
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let dn = Dn::parse(&format!("cn=user{i},ou=people,dc=example")).expect("dn");
        let mut entry = Entry::new(dn)
            .with(&oc, ["top", "person"])
            .with(&cn, [format!("User {i}")])
            .with(&uid_number, [(i % 5_000).to_string()]);
        if i % 7 == 0 {
            entry.add(&mail, [format!("user{i}@example.com")]);
        }
        ids.push(store.add(entry).expect("entry"));
    }
    store.create_index(&mail);
    store.create_index(&oc);
    Fixture {
        store,
        registry,
        suffix,
        ids,
    }
}

fn filters(suffix: EntryId) -> Vec<(&'static str, FilterNode)> {
    vec![
        (
            "person_and_mail",
            FilterNode::and(vec![
                FilterNode::equality("objectClass", "person"),
                FilterNode::present("mail"),
            ]),
        ),
        (
            "scoped_substring",
            FilterNode::and(vec![
                FilterNode::subtree(
                    suffix,
                    Dn::parse("dc=example").expect("dn"),
                    AliasDerefMode::NeverDerefAliases,
                ),
                FilterNode::substring("cn", Some("user"), &["1"], None),
            ]),
        ),
        (
            "ordering_or_negation",
            FilterNode::or(vec![
                FilterNode::greater_eq("uidNumber", "4500"),
                FilterNode::not(FilterNode::present("mail")),
            ]),
        ),
    ]
}

fn bench_candidates(c: &mut Criterion) {
    let fx = fixture(entry_count());
    let builder = EvaluatorBuilder::new(
        Arc::clone(&fx.store),
        Arc::clone(&fx.registry),
        EvaluatorConfig::default(),
    );
    let mut group = c.benchmark_group("evaluate");
    group.throughput(Throughput::Elements(fx.ids.len() as u64));
    for (name, filter) in filters(fx.suffix) {
        let tx = fx.store.begin_read();
        let eval = builder.build(&filter, &tx).expect("build");
        group.bench_with_input(BenchmarkId::from_parameter(name), &fx.ids, |b, ids| {
            b.iter(|| {
                let mut hits = 0usize;
                for &id in ids {
                    if eval
                        .evaluate(&mut Candidate::new(id), &tx)
                        .expect("evaluate")
                        .matched()
                    {
                        hits += 1;
                    }
                }
                black_box(hits)
            });
        });
    }
    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let fx = fixture(16);
    let builder = EvaluatorBuilder::new(
        Arc::clone(&fx.store),
        Arc::clone(&fx.registry),
        EvaluatorConfig::default(),
    );
    let tx = fx.store.begin_read();
    let filters = filters(fx.suffix);
    c.bench_function("build", |b| {
        b.iter(|| {
            for (_, filter) in &filters {
                black_box(builder.build(filter, &tx).expect("build"));
            }
        });
    });
}

criterion_group!(benches, bench_candidates, bench_build);
criterion_main!(benches);
