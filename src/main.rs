mod cli;
mod connectivity;
mod core;
mod events;
mod facade;
mod handlers;
mod storage;
mod sync;
mod transport;

use crate::cli::Commands;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor, TransportLivenessCheck};
use crate::core::config::REMOTE_TOKEN_ENV_VAR;
use crate::core::error::{ConfigError, HybridError, HybridResult, SyncError};
use crate::facade::HybridTaskStore;
use crate::handlers::AppContext;
use crate::storage::{LocalTaskStore, OfflineQueue, RemoteTaskStore};
use crate::sync::SyncEngine;
use crate::transport::{RemoteClient, Transport};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const CONNECTIVITY_POLL_INTERVAL: Duration = Duration::from_secs(30);
const PROBE_PATH: &str = "/boards";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> HybridResult<()> {
    let (cli, config) = cli::init_app()?;

    if let Err(e) = core::init_logging(&config) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    core::validate_config(&config)?;

    let config_path = cli.config.clone().unwrap_or_else(|| config.data_dir.join("config.toml"));

    let format = cli.format.clone().unwrap_or_else(|| config.output_format.clone());
    let quiet = cli.quiet;

    let local = Arc::new(LocalTaskStore::new(config.local_tasks_path()));

    let connectivity = Arc::new(ConnectivityMonitor::new());
    let queue = Arc::new(OfflineQueue::new(config.queue_path()));
    queue.load().await?;

    let (remote, engine): (Option<Arc<RemoteTaskStore>>, Option<Arc<SyncEngine>>) = if config.remote_enabled() {
        let board_id = config.remote.board_id.clone().ok_or(ConfigError::MissingRequired {
            key: "remote.boardId".to_string(),
        })?;
        let token = config.remote.token.clone().ok_or(ConfigError::MissingRequired {
            key: REMOTE_TOKEN_ENV_VAR.to_string(),
        })?;

        let client = RemoteClient::new(
            config.remote.base_url.clone(),
            &token,
            config.remote.max_concurrent,
            config.hybrid.timeout,
        )?;
        let transport: Arc<dyn Transport> = Arc::new(client);

        let remote = Arc::new(RemoteTaskStore::new(
            transport.clone(),
            board_id,
            config.remote.column_mapping.clone(),
            config.remote.cache_ttl,
        ));

        let liveness = Arc::new(TransportLivenessCheck::new(transport, PROBE_PATH));
        connectivity.clone().spawn_probe_loop(liveness, CONNECTIVITY_POLL_INTERVAL);

        let engine = Arc::new(SyncEngine::new(
            local.clone(),
            remote.clone(),
            queue.clone(),
            connectivity.clone(),
            config.hybrid.conflict_resolution,
        ));

        let reconnect_engine = engine.clone();
        connectivity.subscribe(move |event| {
            if event != ConnectivityEvent::Online {
                return;
            }
            let engine = reconnect_engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.drain_queue().await {
                    warn!(error = %e, "failed to drain offline queue after reconnect");
                }
                if let Err(e) = engine.sync_all().await {
                    warn!(error = %e, "full sync pass after reconnect failed");
                }
            });
        });

        if config.hybrid.auto_sync {
            let timer_engine = engine.clone();
            let interval = Duration::from_secs(config.hybrid.sync_interval);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
                loop {
                    ticker.tick().await;
                    match timer_engine.try_sync_all().await {
                        Ok(_) => {}
                        Err(HybridError::Sync(SyncError::PassInProgress)) => {
                            info!("auto-sync tick skipped, previous pass still in progress");
                        }
                        Err(e) => warn!(error = %e, "auto-sync pass failed"),
                    }
                }
            });
        }

        (Some(remote), Some(engine))
    } else {
        (None, None)
    };

    let facade = Arc::new(HybridTaskStore::new(
        local,
        remote,
        engine.clone(),
        config.hybrid.primary_provider,
        config.hybrid.sync_on_write,
    ));
    facade.wire_events();
    facade.subscribe(|event| {
        if let crate::facade::FacadeEvent::SyncError(message) = event {
            error!(%message, "sync error");
        }
    });

    let ctx = AppContext {
        facade,
        engine,
        queue,
        connectivity,
        config,
        config_path,
    };

    let Some(command) = cli.command else {
        info!("no subcommand given, nothing to do");
        return Ok(());
    };

    match command {
        Commands::Task { subcommand } => handlers::task::handle_task_commands(subcommand, &ctx, &format, quiet).await,
        Commands::Sync { subcommand } => handlers::sync::handle_sync_commands(subcommand, &ctx, &format, quiet).await,
        Commands::System { subcommand } => handlers::system::handle_system_commands(subcommand, &ctx, &format).await,
    }
}
