use crate::cli::CliContext;
use crate::db::{Envelope, UserStats};

/// Print strategy and analysis counts for the session user.
///
/// Without a session user there is nothing to count, so zeros are shown
/// and no request is made.
pub async fn run_stats_command(ctx: &CliContext) -> anyhow::Result<()> {
    let (user, envelope) = match ctx.config.telegram_id.as_deref() {
        Some(telegram_id) => {
            let client = ctx.connect().await?;
            (telegram_id, client.user_stats(telegram_id).await)
        }
        None => ("not set", Envelope::ok(UserStats::default())),
    };

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    }

    // Counts fall back to zero so the summary always renders.
    let stats = envelope.data.unwrap_or_default();
    println!("User {user}");
    print_stats(&stats);
    if let Some(err) = envelope.error {
        println!("  (stats unavailable: {err})");
    }
    Ok(())
}

fn print_stats(stats: &UserStats) {
    println!("  Strategies:  {}", stats.strategies);
    println!("  Analyses:    {}", stats.analyses);
}
