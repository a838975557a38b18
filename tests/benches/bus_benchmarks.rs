//! # Bus Benchmarks
//!
//! Cost of one dispatch as the number of subscribers on a topic grows, and
//! of the decode step on its own.
//!
//! ```bash
//! cargo bench -p hub-tests
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hub_bus::MessageHub;
use hub_tests::fixtures::order_decoder;
use hub_types::MessageEnvelope;
use serde_json::json;

fn bench_dispatch_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_fan_out");

    for subscribers in [1usize, 10, 100] {
        let hub = MessageHub::loopback();
        let decoder = order_decoder();
        let handles: Vec<_> = (0..subscribers)
            .map(|_| {
                hub.subscribe("orders.created", decoder.clone(), |env| {
                    black_box(env);
                })
            })
            .collect();
        let envelope = MessageEnvelope::stamp("orders.created", json!({ "id": "o1", "total": 42 }));

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &envelope,
            |b, envelope| b.iter(|| hub.dispatch(black_box(envelope))),
        );

        for handle in handles {
            handle.unsubscribe();
        }
    }

    group.finish();
}

fn bench_rejected_payload(c: &mut Criterion) {
    let hub = MessageHub::loopback();
    let _sub = hub.subscribe_with_error(
        "orders.created",
        order_decoder(),
        |env| {
            black_box(env);
        },
        |raw, err| {
            black_box((raw, err));
        },
    );
    let envelope = MessageEnvelope::stamp("orders.created", json!({ "id": "o1" }));

    c.bench_function("dispatch_rejected", |b| {
        b.iter(|| hub.dispatch(black_box(&envelope)))
    });
}

criterion_group!(benches, bench_dispatch_fan_out, bench_rejected_payload);
criterion_main!(benches);
