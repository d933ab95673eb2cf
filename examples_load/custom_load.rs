use std::sync::Arc;
use std::time::Instant;
use tokio::time::Duration;

use bulk_log_sink::noop_sink::NoopSink;
use bulk_log_sink::{Config, Connection, LogLevel, TelemetryChannel};

#[tokio::main]
async fn main() {
    let config = Config {
        connection: Connection::Sink(Arc::new(NoopSink)),
        flush_bytes: 1_000_000,
        flush_interval: Duration::from_millis(200),
        num_workers: 8,
        queue_capacity: 50_000,
        console: false,
        ..Config::default()
    }
    .with_on_failure(|failure| eprintln!("failed to index into {}: {}", failure.index, failure.reason));

    let log = TelemetryChannel::new(config).expect("start indexer");
    let log = log.with_fields([("service", "load-test")]);

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        // Count what would have been dropped instead of waiting for room.
        let _ = log.try_log(LogLevel::Error, format!("custom load test error {i}"));
    }

    let elapsed = start.elapsed();
    println!("custom config: offered {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    log.close(Duration::from_secs(10)).await.expect("drain indexer");
    let stats = log.stats();
    println!("added={} rejected={} indexed={} requests={}",
        stats.num_added, stats.num_rejected, stats.num_indexed, stats.num_requests);
}
