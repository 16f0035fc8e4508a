//! Creates the Chronicle events table.

use std::error::Error;

use chronicle_event_store::EventStoreConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = EventStoreConfig::from_env()?;
    tracing::info!(table = %config.events_table, "Preparing Chronicle event store");

    let log = config.event_log().await?;
    log.ensure_schema().await?;

    tracing::info!(table = %log.table(), "Event store schema is up to date");
    Ok(())
}
