//! Publish/express round trip through two wrappers on a loopback network.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use namewire::prelude::*;

fn roundtrip(c: &mut Criterion) {
    namewire::dev_tracing::init_tracing();

    let net = LoopbackNetwork::new();
    let opts = WrapperOptions::default()
        .with_key_source(KeySource::Ephemeral)
        .with_loop_yield(Duration::ZERO)
        .with_poll_timeout(Duration::from_millis(1));

    let producer = Wrapper::new(net.attach(), opts.clone()).unwrap();
    let consumer = Wrapper::new(net.attach(), opts).unwrap();
    producer.start().unwrap();
    consumer.start().unwrap();

    let handle = producer.handle();
    producer
        .register_filter("/bench", move |name: &Name| {
            let _ = handle.publish(name, "payload", Duration::ZERO);
        })
        .unwrap();

    let (tx, rx) = flume::unbounded();
    let mut seq = 0u64;

    c.bench_function("wrapper/interest_roundtrip", |b| {
        b.iter(|| {
            seq += 1;
            let tx = tx.clone();
            consumer
                .express_interest(format!("/bench/{seq}"), move |resp| {
                    let _ = tx.send(resp);
                })
                .unwrap();
            rx.recv_timeout(Duration::from_secs(1)).unwrap()
        });
    });

    c.bench_function("wrapper/publish_signed", |b| {
        b.iter(|| {
            seq += 1;
            producer
                .publish(format!("/store/{seq}"), "payload", Duration::ZERO)
                .unwrap()
        });
    });
}

criterion_group!(benches, roundtrip);
criterion_main!(benches);
