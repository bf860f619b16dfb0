//! `status` and `probe` commands.

use serde::Serialize;

use crate::cli::CliContext;
use crate::db::{DataClient, HealthStatus, ProbeSource, TableCheck};

#[derive(Debug, Serialize)]
struct StatusReport {
    transport: &'static str,
    candidates: Vec<String>,
    state: String,
    endpoint: Option<String>,
    probe_error: Option<String>,
    health: HealthStatus,
    tables: Vec<TableCheck>,
}

/// Print configuration, binding, health and table reachability.
///
/// Never fails on an unreachable backend; that is what it reports.
pub async fn run_status_command(ctx: &CliContext) -> anyhow::Result<()> {
    let client = DataClient::new(&ctx.config);
    let probe_error = client.reprobe().await.err().map(|e| e.to_string());
    let health = client.health_check().await;
    let tables = if client.base_url().is_some() {
        client.check_tables().await
    } else {
        Vec::new()
    };

    let report = StatusReport {
        transport: client.transport_name(),
        candidates: ctx.config.endpoints.clone(),
        state: client.state().to_string(),
        endpoint: client.base_url(),
        probe_error,
        health,
        tables,
    };

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Trade Journal Status");
    println!("====================\n");
    println!(
        "  Version:     {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    println!("  Transport:   {}", report.transport);
    println!("  Candidates:  {}", report.candidates.join(", "));
    println!(
        "  Session:     {}",
        ctx.config.telegram_id.as_deref().unwrap_or("not set")
    );
    println!("  Client:      {}", report.state);
    if let Some(err) = &report.probe_error {
        println!("  Probe:       failed ({err})");
    }

    print!("  Health:      ");
    if report.health.is_healthy() {
        let db = report.health.database.as_deref().unwrap_or("unknown");
        println!("{} (database: {db})", report.health.status);
    } else {
        println!(
            "{} ({})",
            report.health.status,
            report.health.error.as_deref().unwrap_or("no details")
        );
    }

    for check in &report.tables {
        match &check.error {
            None => println!("  Table:       {} ok", check.table),
            Some(err) => println!("  Table:       {} error ({err})", check.table),
        }
    }
    Ok(())
}

/// Probe candidates and print the selected endpoint.
pub async fn run_probe_command(ctx: &CliContext) -> anyhow::Result<()> {
    let client = DataClient::new(&ctx.config);
    let outcome = client.reprobe().await;
    let url = outcome.as_ref().ok().map(|o| o.url.clone());
    let source = outcome.as_ref().ok().map(|o| o.source.clone());

    ctx.emit(outcome.map(|o| o.url), |_| {
        if let (Some(url), Some(source)) = (&url, &source) {
            match source {
                ProbeSource::Live { index } => {
                    println!("Selected {url} (candidate {} of {})", index + 1, ctx.config.endpoints.len())
                }
                ProbeSource::Remembered => {
                    println!("No candidate answered; using remembered endpoint {url}")
                }
            }
        }
    })
}
