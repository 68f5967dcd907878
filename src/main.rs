use std::sync::Arc;

use foreman::config::Config;
use foreman::dispatch::reaper::StallReaper;
use foreman::events::EventWriter;
use foreman::runs::queue::{InProcessQueue, RunQueue};
use foreman::store::LibSqlStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Arc::new(Config::from_env());

    let db_path =
        std::env::var("FOREMAN_DB_PATH").unwrap_or_else(|_| "./data/foreman.db".to_string());
    let store = LibSqlStore::open(std::path::Path::new(&db_path))
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to open database at {db_path}: {e}");
            std::process::exit(1);
        });

    eprintln!("Foreman v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {db_path}");
    eprintln!(
        "   Reaper: every {:?} (machine timeout {:?})",
        config.reaper_interval, config.machine_stall_timeout
    );

    let (events, events_task) = EventWriter::spawn(store.clone(), &config);

    // Run orchestration is driven by embedders that supply a ModelClient;
    // this daemon maintains the job tables: stall recovery and the event
    // audit trail.
    let (queue, _rx) = InProcessQueue::new();
    let reaper = StallReaper::new(
        store.clone(),
        events.clone(),
        Arc::clone(&queue) as Arc<dyn RunQueue>,
        Arc::clone(&config),
    );
    let reaper_handle = reaper.spawn();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    reaper_handle.abort();
    drop(events);
    events_task.join().await;

    Ok(())
}
