use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;

use bulk_log_sink::noop_sink::NoopSink;
use bulk_log_sink::{Config, Connection, TelemetryChannel};

#[tokio::main]
async fn main() {
    let log = TelemetryChannel::new(Config {
        connection: Connection::Sink(Arc::new(NoopSink)),
        console: false,
        ..Config::default()
    })
    .expect("start indexer");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        log.error(format!("default load test error {i}"))
            .await
            .expect("enqueue");
    }

    let elapsed = start.elapsed();
    println!("default config: queued {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    log.close(Duration::from_secs(10)).await.expect("drain indexer");
    println!("{:?}", log.stats());
}
