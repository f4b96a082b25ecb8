//! Throughput Benchmark for FlashDir
//!
//! This benchmark measures the hot paths a request takes before it reaches
//! a backend: frame parsing, decoding, filter evaluation and route lookup.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use flashdir::directory::{Backend, Entry, Filter, LdifStore};
use flashdir::protocol::{
    decode_request, encode_request, parse_frame, Message, Request, SearchRequest, SearchScope,
};
use flashdir::router::{default_routes, RootDse};
use std::sync::Arc;

fn person(i: usize) -> Entry {
    Entry::new(format!("cn=user{},ou=people,dc=enterprise,dc=org", i))
        .with("objectClass", "top")
        .with("objectClass", "person")
        .with("cn", format!("user{}", i))
        .with("sn", format!("Surname{}", i % 100))
        .with("mail", format!("user{}@enterprise.org", i))
}

/// Benchmark filter parsing and evaluation
fn bench_filter(c: &mut Criterion) {
    let entries: Vec<Entry> = (0..1_000).map(person).collect();
    let text = "(&(objectClass=person)(|(sn=Surname4*)(mail=*@enterprise.org))(!(cn=user7)))";
    let filter: Filter = text.parse().unwrap();

    let mut group = c.benchmark_group("filter");

    group.bench_function("parse", |b| {
        b.iter(|| black_box(text).parse::<Filter>().unwrap());
    });

    group.throughput(Throughput::Elements(entries.len() as u64));
    group.bench_function("evaluate_1000_entries", |b| {
        b.iter(|| {
            entries
                .iter()
                .filter(|entry| filter.evaluate(entry).unwrap_or(false))
                .count()
        });
    });

    group.finish();
}

/// Benchmark route lookup against the default table
fn bench_routes(c: &mut Criterion) {
    let dir = std::env::temp_dir();
    let store: Arc<dyn Backend> = Arc::new(LdifStore::with_entries(dir, Vec::new()));
    let routes = default_routes(store, RootDse::new("dc=enterprise,dc=org"));

    let search = |base: &str, scope, filter: &str| {
        Request::Search(SearchRequest {
            base: base.to_string(),
            scope,
            filter: filter.parse().unwrap(),
            attributes: Vec::new(),
        })
    };
    let root_dse = search("", SearchScope::BaseObject, "(objectClass=*)");
    let subtree = search(
        "ou=people,dc=enterprise,dc=org",
        SearchScope::WholeSubtree,
        "(cn=user1)",
    );

    let mut group = c.benchmark_group("routes");
    group.throughput(Throughput::Elements(1));

    group.bench_function("find_root_dse", |b| {
        b.iter(|| routes.find(black_box(&root_dse)).is_some());
    });

    group.bench_function("find_store_search", |b| {
        b.iter(|| routes.find(black_box(&subtree)).is_some());
    });

    group.finish();
}

/// Benchmark the wire path: bytes -> frame -> typed message
fn bench_decode(c: &mut Criterion) {
    let message = Message {
        id: 42,
        request: Request::Search(SearchRequest {
            base: "dc=enterprise,dc=org".to_string(),
            scope: SearchScope::WholeSubtree,
            filter: "(&(objectClass=person)(cn=user*))".parse().unwrap(),
            attributes: vec!["cn".to_string(), "mail".to_string()],
        }),
    };
    let bytes = encode_request(&message).serialize();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(bytes.len() as u64));

    group.bench_function("search_request", |b| {
        b.iter(|| {
            let (frame, _) = parse_frame(black_box(&bytes)).unwrap().unwrap();
            decode_request(frame).unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_filter, bench_routes, bench_decode);
criterion_main!(benches);
