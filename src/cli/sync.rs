use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Run a full sync pass over both adapters.
    Run,
    /// Force-sync a single task.
    Task { id: i64 },
    /// Show connectivity, live conflicts, and offline-queue length.
    Status,
    /// Resolve a recorded conflict with an explicit strategy.
    Resolve { id: i64, strategy: String },
    /// Offline-queue dead-letter operator interface.
    Queue {
        #[command(subcommand)]
        subcommand: QueueCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// List dead-lettered entries.
    List,
    /// Move a dead-lettered entry back onto the active queue.
    Requeue { id: String },
    /// Permanently discard a dead-lettered entry.
    Drop { id: String },
}
