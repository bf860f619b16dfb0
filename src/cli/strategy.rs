//! Strategy management commands.

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use serde_json::json;

use crate::cli::CliContext;
use crate::journal::{EventTracker, NewStrategy, RowId, Strategy, StrategyStore};

#[derive(Subcommand, Debug, Clone)]
pub enum StrategyCommand {
    /// List strategies, newest first
    List {
        /// Maximum number of strategies to show
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one strategy with its fields
    Show {
        /// Strategy id
        id: String,
    },

    /// Create a strategy from a JSON file ({"name", "description", "fields"})
    Create {
        /// Path to the strategy JSON
        #[arg(long)]
        file: PathBuf,
    },

    /// Replace a strategy's contents from a JSON file
    Update {
        /// Strategy id
        id: String,

        /// Path to the strategy JSON
        #[arg(long)]
        file: PathBuf,
    },

    /// Delete a strategy
    Delete {
        /// Strategy id
        id: String,
    },
}

async fn read_strategy(path: &PathBuf) -> anyhow::Result<NewStrategy> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not a valid strategy", path.display()))
}

fn print_strategy(strategy: &Strategy) {
    println!("{} (id {})", strategy.name, strategy.id);
    if let Some(description) = &strategy.description {
        println!("  {description}");
    }
    for (i, field) in strategy.fields.iter().enumerate() {
        println!("  {}. {}", i + 1, field.name);
        if !field.description.is_empty() {
            println!("     {}", field.description);
        }
        for input in &field.inputs {
            let required = if input.required { ", required" } else { "" };
            match &input.options {
                Some(options) => println!(
                    "     - {} ({:?}{required}): {}",
                    input.label,
                    input.input_type,
                    options.join(" / ")
                ),
                None => println!("     - {} ({:?}{required})", input.label, input.input_type),
            }
        }
    }
}

pub async fn run_strategy_command(ctx: &CliContext, cmd: StrategyCommand) -> anyhow::Result<()> {
    let client = ctx.connect().await?;
    let store = StrategyStore::new(client.clone());

    match cmd {
        StrategyCommand::List { limit } => ctx.emit(store.list(limit).await, |strategies| {
            if strategies.is_empty() {
                println!("No strategies yet.");
                println!("Create one: tradejournal strategy create --file strategy.json");
                return;
            }
            for s in strategies {
                println!(
                    "  {:>6}  {}  ({} fields)",
                    s.id.to_string(),
                    s.name,
                    s.fields.len()
                );
            }
        }),

        StrategyCommand::Show { id } => {
            let id = RowId::from(id.as_str());
            let result = store.get(&id).await;
            ctx.emit(result, |strategy| match strategy {
                Some(s) => print_strategy(s),
                None => println!("Strategy {id} not found."),
            })
        }

        StrategyCommand::Create { file } => {
            let strategy = read_strategy(&file).await?;
            let result = store.create(strategy).await;
            if let Ok(created) = &result {
                EventTracker::new(client)
                    .track("strategy_created", json!({ "strategy_id": created.id, "name": created.name }))
                    .await;
            }
            ctx.emit(result, |created| println!("Created strategy {} (id {})", created.name, created.id))
        }

        StrategyCommand::Update { id, file } => {
            let id = RowId::from(id.as_str());
            let strategy = read_strategy(&file).await?;
            ctx.emit(store.update(&id, strategy).await, |_| println!("Updated strategy {id}"))
        }

        StrategyCommand::Delete { id } => {
            let id = RowId::from(id.as_str());
            ctx.emit(store.delete(&id).await, |_| println!("Deleted strategy {id}"))
        }
    }
}
