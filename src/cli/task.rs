use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List tasks, optionally filtered by status or a search term.
    List {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Show a single task by id (bare integer) or subtask (`parentId.subId`).
    Get { id: String },
    /// Create a task on the configured primary adapter.
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Merge field updates onto an existing task.
    Update {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    /// Delete a task from both adapters.
    Delete { id: i64 },
    /// Subtask CRUD, scoped to a parent task.
    Subtask {
        #[command(subcommand)]
        subcommand: SubtaskCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum SubtaskCommands {
    List { parent_id: i64 },
    Add {
        parent_id: i64,
        title: String,
        #[arg(long)]
        description: Option<String>,
    },
    Update {
        parent_id: i64,
        sub_id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    Delete { parent_id: i64, sub_id: i64 },
}
