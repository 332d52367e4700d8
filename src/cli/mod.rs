pub mod system;
pub mod sync;
pub mod task;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub use system::SystemCommands;
pub use sync::SyncCommands;
pub use task::TaskCommands;

#[derive(Parser, Debug)]
#[command(name = "hybridtask", about = "Bidirectional task sync between a local store and a remote board", version)]
pub struct Cli {
    /// Path to a TOML config file; defaults to the platform config location.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format for commands that print data.
    #[arg(long, global = true)]
    pub format: Option<String>,

    #[arg(long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Task and subtask CRUD against the hybrid façade.
    Task {
        #[command(subcommand)]
        subcommand: TaskCommands,
    },
    /// Sync engine control: full passes, per-task force-sync, conflicts, queue.
    Sync {
        #[command(subcommand)]
        subcommand: SyncCommands,
    },
    /// Data directory and configuration management.
    System {
        #[command(subcommand)]
        subcommand: SystemCommands,
    },
}

/// Parse CLI arguments and load configuration, applying environment
/// overrides, mirroring the teacher's `init_app` composition step.
pub fn init_app() -> crate::core::error::HybridResult<(Cli, crate::core::config::AppConfig)> {
    let cli = Cli::parse();
    let config = crate::core::config::load_config(cli.config.clone())?;
    Ok((cli, config))
}
