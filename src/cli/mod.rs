//! Command-line interface.

mod analysis;
mod stats;
mod status;
mod strategy;

use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::ClientConfig;
use crate::db::{DataClient, Envelope};
use crate::error::DataError;

pub use analysis::{AnalysisCommand, run_analysis_command};
pub use stats::run_stats_command;
pub use status::{run_probe_command, run_status_command};
pub use strategy::{StrategyCommand, run_strategy_command};

#[derive(Parser, Debug)]
#[command(name = "tradejournal", version, about = "Trading journal backend client")]
pub struct Cli {
    /// Print raw `{data, error}` envelopes instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Telegram id of the session user (overrides TRADEJOURNAL_TELEGRAM_ID)
    #[arg(long, global = true)]
    pub telegram_id: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show configuration, endpoint binding, backend health and table reachability
    Status,

    /// Probe the candidate endpoints and report the one selected
    Probe,

    /// Manage strategies
    #[command(subcommand)]
    Strategy(StrategyCommand),

    /// Run and manage analyses
    #[command(subcommand)]
    Analysis(AnalysisCommand),

    /// Show strategy and analysis counts for the session user
    Stats,
}

/// Shared state for command handlers.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub config: ClientConfig,
    pub json: bool,
}

impl CliContext {
    pub fn new(mut config: ClientConfig, cli: &Cli) -> Self {
        if let Some(id) = cli.telegram_id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            config.telegram_id = Some(id.to_string());
        }
        Self {
            config,
            json: cli.json,
        }
    }

    /// Build a client and bind it to a working endpoint.
    pub async fn connect(&self) -> anyhow::Result<DataClient> {
        Ok(DataClient::connect(&self.config).await?)
    }

    /// Print `result` as an envelope (`--json`) or through `human`.
    ///
    /// In text mode an error is returned to the caller; in JSON mode it is
    /// part of the printed envelope.
    pub fn emit<T: Serialize>(
        &self,
        result: Result<T, DataError>,
        human: impl FnOnce(&T),
    ) -> anyhow::Result<()> {
        if self.json {
            let envelope = Envelope::from_result(result.map(Some));
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            return Ok(());
        }
        let value = result?;
        human(&value);
        Ok(())
    }
}

/// Dispatch a parsed command.
pub async fn run(cli: Cli, config: ClientConfig) -> anyhow::Result<()> {
    let ctx = CliContext::new(config, &cli);
    match cli.command {
        Command::Status => run_status_command(&ctx).await,
        Command::Probe => run_probe_command(&ctx).await,
        Command::Strategy(cmd) => run_strategy_command(&ctx, cmd).await,
        Command::Analysis(cmd) => run_analysis_command(&ctx, cmd).await,
        Command::Stats => run_stats_command(&ctx).await,
    }
}
