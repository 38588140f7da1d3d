//! # Policy Watcher Benchmarks
//!
//! | Path | Operation |
//! |------|-----------|
//! | Wire codec | encode / decode of one change message |
//! | Dispatch | decode + apply on an in-memory enforcer |
//! | Transport | publish on the in-memory broker with one subscriber |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use policy_bus::{ChannelTransport, InMemoryBroker};
use policy_store::{Enforcer, MemoryAdapter};
use policy_types::rule;
use policy_watcher::test_utils::RecordingLog;
use policy_watcher::{dispatch, ChangeMessage, PolicyChange};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn batch_message(size: usize) -> ChangeMessage {
    ChangeMessage::new(
        "bench",
        PolicyChange::AddPolicies {
            sec: "p".into(),
            ptype: "p".into(),
            rules: (0..size)
                .map(|i| rule(&[format!("user{i}"), "/data".into(), "read".into()]))
                .collect(),
        },
    )
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire-codec");

    for size in [1usize, 10, 100] {
        let msg = batch_message(size);
        let payload = msg.encode().expect("encode");

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &msg, |b, msg| {
            b.iter(|| black_box(msg.encode().expect("encode")))
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &payload, |b, payload| {
            b.iter(|| black_box(ChangeMessage::decode(payload).expect("decode")))
        });
    }

    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let enforcer = rt
        .block_on(Enforcer::new(Arc::new(MemoryAdapter::new())))
        .expect("enforcer");
    let log = RecordingLog::new();

    // Alternate add and remove so the model stays small.
    let add = ChangeMessage::new(
        "bench",
        PolicyChange::AddPolicy {
            sec: "p".into(),
            ptype: "p".into(),
            rule: rule(&["alice", "/data", "read"]),
        },
    )
    .encode()
    .expect("encode");
    let remove = ChangeMessage::new(
        "bench",
        PolicyChange::RemovePolicy {
            sec: "p".into(),
            ptype: "p".into(),
            rule: rule(&["alice", "/data", "read"]),
        },
    )
    .encode()
    .expect("encode");

    c.bench_function("dispatch_add_remove", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(dispatch(&enforcer, &log, &add).await);
            black_box(dispatch(&enforcer, &log, &remove).await);
        })
    });
}

fn bench_broker_publish(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let broker = InMemoryBroker::with_capacity(1 << 16);
    let _subscription = broker.subscription("bench");
    let payload = batch_message(1).encode().expect("encode");

    c.bench_function("broker_publish", |b| {
        b.to_async(&rt).iter(|| async {
            broker
                .publish("bench", payload.clone())
                .await
                .expect("publish");
        })
    });
}

criterion_group!(benches, bench_codec, bench_dispatch, bench_broker_publish);
criterion_main!(benches);
