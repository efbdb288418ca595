use std::sync::Arc;

use tokio::sync::watch;

use workload_sync::config::{LinkMode, SyncConfig};
use workload_sync::diagnostics;
use workload_sync::engine::{ReconcileEngine, spawn_sync_loop};
use workload_sync::workspace::{NotionClient, WorkspaceApi};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = SyncConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export NOTION_API_KEY=secret_...");
        eprintln!("  export NOTION_SCHEDULE_DB_ID=... NOTION_WORKLOAD_DB_ID=...");
        std::process::exit(1);
    });

    eprintln!("📋 Workload Sync v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: {}", config.notion.base_url);
    eprintln!("   Schedule DB: {}", config.engine.schedule_db_id);
    eprintln!("   Workload DB: {}", config.engine.workload_db_id);
    eprintln!("   Interval: {}s", config.engine.poll_interval.as_secs());
    eprintln!(
        "   Link mode: {}\n",
        match config.engine.link_mode {
            LinkMode::Append => "append",
            LinkMode::AppendIfMissing => "append-if-missing",
        }
    );

    let client = NotionClient::new(&config.notion).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
    let api: Arc<dyn WorkspaceApi> = Arc::new(client);

    if config.diagnostics {
        diagnostics::log_schemas(
            api.as_ref(),
            &[
                config.engine.schedule_db_id.as_str(),
                config.engine.workload_db_id.as_str(),
            ],
        )
        .await;
    }

    let engine = Arc::new(ReconcileEngine::new(api, config.engine));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = spawn_sync_loop(engine, shutdown_rx);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received, shutting down...");
    let _ = shutdown_tx.send(true);
    handle.await?;

    Ok(())
}
