use crate::cli::task::{SubtaskCommands, TaskCommands};
use crate::core::error::{HybridResult, TaskError};
use crate::core::task::{Priority, SubtaskPatch, Task, TaskId, TaskPatch, TaskStatus};
use crate::handlers::AppContext;
use crate::storage::{NewSubtask, NewTask, TaskFilter};
use std::str::FromStr;

pub async fn handle_task_commands(subcommand: TaskCommands, ctx: &AppContext, format: &str, quiet: bool) -> HybridResult<()> {
    match subcommand {
        TaskCommands::List { status, search } => {
            let filter = TaskFilter {
                status: status.map(|s| TaskStatus::from_str(&s)).transpose()?,
                ids: None,
                search,
            };
            let tasks = ctx.facade.get_tasks(Some(filter)).await?;
            print_task_list(&tasks, format, quiet);
            Ok(())
        }
        TaskCommands::Get { id } => {
            let task_id = TaskId::from_str(&id)?;
            match task_id {
                TaskId::Task(id) => {
                    let task = ctx.facade.get_task(id).await?;
                    print_task(task.as_ref(), format, quiet);
                }
                TaskId::Subtask(parent_id, sub_id) => {
                    let subtasks = ctx.facade.get_subtasks(parent_id).await?;
                    let subtask = subtasks.into_iter().find(|s| s.sub_id == sub_id);
                    match subtask {
                        Some(subtask) if format == "json" => println!("{}", serde_json::to_string_pretty(&subtask).unwrap()),
                        Some(subtask) => println!("{}.{}: {} [{}]", subtask.parent_id, subtask.sub_id, subtask.title, subtask.status),
                        None if !quiet => println!("Subtask {id} not found."),
                        None => {}
                    }
                }
            }
            Ok(())
        }
        TaskCommands::Add {
            title,
            description,
            priority,
            status,
        } => {
            let task = ctx
                .facade
                .create_task(NewTask {
                    title,
                    description: description.unwrap_or_default(),
                    details: String::new(),
                    test_strategy: String::new(),
                    status: status.map(|s| TaskStatus::from_str(&s)).transpose()?,
                    priority: priority.map(|p| Priority::from_str(&p)).transpose()?,
                    dependencies: Default::default(),
                })
                .await?;
            println!("Created task {}: {}", task.id, task.title);
            Ok(())
        }
        TaskCommands::Update {
            id,
            title,
            description,
            priority,
            status,
        } => {
            let patch = TaskPatch {
                title,
                description,
                details: None,
                test_strategy: None,
                status: status.map(|s| TaskStatus::from_str(&s)).transpose()?,
                priority: priority.map(|p| Priority::from_str(&p)).transpose()?,
                dependencies: None,
            };
            let task = ctx.facade.update_task(id, patch).await?;
            println!("Updated task {}: {}", task.id, task.title);
            Ok(())
        }
        TaskCommands::Delete { id } => {
            let deleted = ctx.facade.delete_task(id).await?;
            if deleted {
                println!("Deleted task {id}");
            } else if !quiet {
                println!("Task {id} not found.");
            }
            Ok(())
        }
        TaskCommands::Subtask { subcommand } => handle_subtask_commands(subcommand, ctx, format, quiet).await,
    }
}

async fn handle_subtask_commands(subcommand: SubtaskCommands, ctx: &AppContext, format: &str, quiet: bool) -> HybridResult<()> {
    match subcommand {
        SubtaskCommands::List { parent_id } => {
            let subtasks = ctx.facade.get_subtasks(parent_id).await?;
            if subtasks.is_empty() && !quiet {
                println!("No subtasks for task {parent_id}.");
                return Ok(());
            }
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&subtasks).unwrap());
            } else {
                for sub in subtasks {
                    println!("{}.{} {:<30} [{}]", sub.parent_id, sub.sub_id, sub.title, sub.status);
                }
            }
            Ok(())
        }
        SubtaskCommands::Add { parent_id, title, description } => {
            let subtask = ctx
                .facade
                .create_subtask(
                    parent_id,
                    NewSubtask {
                        title,
                        description: description.unwrap_or_default(),
                        details: String::new(),
                        test_strategy: String::new(),
                        status: None,
                        priority: None,
                    },
                )
                .await?;
            println!("Created subtask {}.{}: {}", subtask.parent_id, subtask.sub_id, subtask.title);
            Ok(())
        }
        SubtaskCommands::Update { parent_id, sub_id, title, status } => {
            let patch = SubtaskPatch {
                title,
                description: None,
                details: None,
                test_strategy: None,
                status: status.map(|s| TaskStatus::from_str(&s)).transpose()?,
                priority: None,
            };
            let subtask = ctx.facade.update_subtask(parent_id, sub_id, patch).await?;
            println!("Updated subtask {}.{}: {}", subtask.parent_id, subtask.sub_id, subtask.title);
            Ok(())
        }
        SubtaskCommands::Delete { parent_id, sub_id } => {
            let deleted = ctx.facade.delete_subtask(parent_id, sub_id).await?;
            if deleted {
                println!("Deleted subtask {parent_id}.{sub_id}");
            } else {
                return Err(TaskError::NotFound {
                    id: format!("{parent_id}.{sub_id}"),
                }
                .into());
            }
            Ok(())
        }
    }
}

fn print_task(task: Option<&Task>, format: &str, quiet: bool) {
    match task {
        Some(task) if format == "json" => println!("{}", serde_json::to_string_pretty(task).unwrap()),
        Some(task) => {
            println!("Task {}: {}", task.id, task.title);
            println!("  Status: {}", task.status);
            println!("  Priority: {}", task.priority);
            println!("  Sync status: {}", format!("{:?}", task.sync_status).to_lowercase());
            if !task.description.is_empty() {
                println!("  Description: {}", task.description);
            }
        }
        None if !quiet => println!("Task not found."),
        None => {}
    }
}

fn print_task_list(tasks: &[Task], format: &str, quiet: bool) {
    if tasks.is_empty() {
        if !quiet {
            println!("No tasks found.");
        }
        return;
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(tasks).unwrap());
        return;
    }

    println!("{:<4} {:<30} {:<12} {:<10} {:<10}", "ID", "Title", "Status", "Priority", "Sync");
    for task in tasks {
        println!(
            "{:<4} {:<30} {:<12} {:<10} {:<10}",
            task.id,
            task.title.chars().take(30).collect::<String>(),
            task.status.to_string(),
            task.priority.to_string(),
            format!("{:?}", task.sync_status).to_lowercase(),
        );
    }
}
