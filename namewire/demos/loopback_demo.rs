//! Two wrappers exchanging signed content over an in-process network.
//!
//! Run with: `RUST_LOG=debug cargo run --example loopback_demo`

use std::time::Duration;

use namewire::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    namewire::dev_tracing::init_tracing();

    let net = LoopbackNetwork::shared("demo");
    let opts = WrapperOptions::default()
        .with_key_source(KeySource::Ephemeral)
        .with_interest_lifetime(Duration::from_millis(500));

    let producer = Wrapper::new(net.attach(), opts.clone().with_thread_name("producer-loop"))?;
    let consumer = Wrapper::new(net.attach(), opts.with_thread_name("consumer-loop"))?;
    producer.start()?;
    consumer.start()?;

    println!("producer key: {}", producer.public_key_digest());
    println!("consumer key: {}", consumer.public_key_digest());

    // Answer every interest under /demo/clock with the requested name.
    let handle = producer.handle();
    producer.register_filter("/demo/clock", move |name: &Name| {
        let payload = format!("you asked for {name}");
        if let Err(e) = handle.publish(name, payload, Duration::from_secs(2)) {
            eprintln!("publish failed: {e}");
        }
    })?;

    let (tx, rx) = flume::unbounded();
    for i in 0..3 {
        let tx = tx.clone();
        consumer.express_interest(format!("/demo/clock/tick/{i}"), move |resp| {
            let _ = tx.send(resp);
        })?;
    }
    // Nobody serves this one; it expires.
    consumer.express_interest("/demo/void", move |resp| {
        let _ = tx.send(resp);
    })?;

    for _ in 0..4 {
        match rx.recv_timeout(Duration::from_secs(2))? {
            Response::Content(obj) => println!(
                "{} -> {:?} (signature valid: {})",
                obj.name(),
                String::from_utf8_lossy(obj.payload()),
                obj.verify()
            ),
            Response::Expired(name) => println!("{name} expired"),
            Response::Closed(name) => println!("{name} abandoned: handle closed"),
        }
    }

    consumer.stop();
    producer.stop();
    LoopbackNetwork::release_shared("demo");
    Ok(())
}
