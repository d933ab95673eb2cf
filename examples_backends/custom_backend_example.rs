use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bulk_log_sink::sink::ShipError;
use bulk_log_sink::{BulkItem, BulkSink, Config, Connection, ItemOutcome, TelemetryChannel};

/// Example of integrating a completely custom backend by implementing
/// the `BulkSink` trait directly. Imagine this talks to some
/// proprietary store for which this crate does not provide a built-in
/// sink.
struct MyCustomStoreSink;

#[async_trait]
impl BulkSink for MyCustomStoreSink {
    async fn ship_batch(&self, index: &str, items: &[BulkItem]) -> Result<Vec<ItemOutcome>, ShipError> {
        // Here you would call your own client library for the target store.
        // For the sake of example we just print the documents.
        for item in items {
            println!("[my-custom-store/{index}] {} {}", item.id, String::from_utf8_lossy(&item.body));
        }
        Ok(items
            .iter()
            .map(|item| ItemOutcome::indexed(item.id, index))
            .collect())
    }
}

#[tokio::main]
async fn main() {
    let _ = bulk_log_sink::init::init_console();

    let config = Config {
        connection: Connection::Sink(Arc::new(MyCustomStoreSink)),
        flush_interval: Duration::from_millis(500),
        ..Config::default()
    };
    let log = TelemetryChannel::new(config).expect("start indexer");

    log.info("custom backend example started").await.expect("enqueue");
    log.with_fields([("store", "my-custom-store")])
        .error("simulated error sent via custom backend")
        .await
        .expect("enqueue");

    log.close(Duration::from_secs(5)).await.expect("drain indexer");
}
