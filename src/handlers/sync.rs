use crate::cli::sync::{QueueCommands, SyncCommands};
use crate::core::conflict::ConflictResolution;
use crate::core::error::{HybridError, HybridResult, SyncError};
use crate::handlers::AppContext;
use std::str::FromStr;
use uuid::Uuid;

pub async fn handle_sync_commands(subcommand: SyncCommands, ctx: &AppContext, format: &str, quiet: bool) -> HybridResult<()> {
    match subcommand {
        SyncCommands::Run => {
            let engine = require_engine(ctx)?;
            let result = engine.sync_all().await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&result).unwrap());
            } else {
                println!(
                    "local->remote: {} created, {} updated, {} failed, {} skipped",
                    result.local_to_remote.created, result.local_to_remote.updated, result.local_to_remote.failed, result.local_to_remote.skipped
                );
                println!(
                    "remote->local: {} created, {} updated, {} failed, {} skipped",
                    result.remote_to_local.created, result.remote_to_local.updated, result.remote_to_local.failed, result.remote_to_local.skipped
                );
                println!(
                    "conflicts: {} detected, {} resolved, {} remaining",
                    result.conflicts.detected, result.conflicts.resolved, result.conflicts.remaining
                );
                println!("completed in {}ms", result.duration_ms);
            }
            Ok(())
        }
        SyncCommands::Task { id } => {
            let engine = require_engine(ctx)?;
            let result = engine.sync_task(id).await?;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&result).unwrap());
            } else {
                println!("task {}: {:?} (success={})", result.task_id, result.action, result.success);
                if let Some(conflict) = result.conflict {
                    println!("  conflict recorded, resolution: {:?}", conflict.resolution);
                }
            }
            Ok(())
        }
        SyncCommands::Status => {
            let status = ctx.connectivity.status().await;
            let queue_len = ctx.queue.len().await;
            let conflicts = match &ctx.engine {
                Some(engine) => engine.conflicts().await,
                None => Vec::new(),
            };
            if format == "json" {
                let payload = serde_json::json!({
                    "online": status.is_online,
                    "last_successful_at": status.last_successful_at,
                    "queue_length": queue_len,
                    "conflicts": conflicts.len(),
                });
                println!("{}", serde_json::to_string_pretty(&payload).unwrap());
            } else {
                println!("online: {}", status.is_online);
                println!("queue length: {queue_len}");
                println!("live conflicts: {}", conflicts.len());
                if !quiet {
                    for conflict in &conflicts {
                        println!("  task {} (detected {})", conflict.task_id, conflict.detected_at);
                    }
                }
            }
            Ok(())
        }
        SyncCommands::Resolve { id, strategy } => {
            let engine = require_engine(ctx)?;
            let resolution = ConflictResolution::from_str(&strategy)
                .map_err(|message| HybridError::Sync(SyncError::ResolutionFailed { message }))?;
            engine.resolve_conflict(id, resolution).await?;
            println!("Resolved conflict for task {id} using {strategy}");
            Ok(())
        }
        SyncCommands::Queue { subcommand } => handle_queue_commands(subcommand, ctx, format).await,
    }
}

async fn handle_queue_commands(subcommand: QueueCommands, ctx: &AppContext, format: &str) -> HybridResult<()> {
    match subcommand {
        QueueCommands::List => {
            let entries = ctx.queue.dead_letters().await;
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&entries).unwrap());
            } else if entries.is_empty() {
                println!("No dead-lettered entries.");
            } else {
                for entry in entries {
                    println!(
                        "{} task={} op={:?} retries={} last_error={}",
                        entry.id,
                        entry.task_id,
                        entry.operation,
                        entry.retry_count,
                        entry.last_error.as_deref().unwrap_or("-")
                    );
                }
            }
            Ok(())
        }
        QueueCommands::Requeue { id } => {
            let id = parse_entry_id(&id)?;
            ctx.queue.requeue(id).await?;
            println!("Requeued {id}");
            Ok(())
        }
        QueueCommands::Drop { id } => {
            let id = parse_entry_id(&id)?;
            ctx.queue.drop_dead_letter(id).await?;
            println!("Dropped {id}");
            Ok(())
        }
    }
}

fn require_engine(ctx: &AppContext) -> HybridResult<&std::sync::Arc<crate::sync::SyncEngine>> {
    ctx.engine.as_ref().ok_or_else(|| HybridError::Sync(SyncError::RemoteNotConfigured))
}

fn parse_entry_id(raw: &str) -> HybridResult<Uuid> {
    Uuid::from_str(raw).map_err(|_| HybridError::Sync(SyncError::InvalidQueueEntryId { id: raw.to_string() }))
}
