//! Analysis commands, including the interactive card-by-card run.

use std::io::{BufRead, Write};

use anyhow::{Context, bail};
use clap::Subcommand;
use serde_json::json;

use crate::cli::CliContext;
use crate::error::ValidationError;
use crate::journal::{
    AnalysisSession, AnalysisStore, Answer, EventTracker, Rating, RowId, SessionUser, StrategyStore, UserDirectory,
};

#[derive(Subcommand, Debug, Clone)]
pub enum AnalysisCommand {
    /// List saved analyses, newest first
    List {
        /// Maximum number of analyses to show
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Walk a strategy's fields interactively and save the scored result
    Run {
        /// Strategy id
        strategy_id: String,

        /// Asset being analysed (e.g. BTC)
        #[arg(long)]
        coin: String,
    },

    /// Delete an analysis
    Delete {
        /// Analysis id
        id: String,
    },
}

pub async fn run_analysis_command(ctx: &CliContext, cmd: AnalysisCommand) -> anyhow::Result<()> {
    let client = ctx.connect().await?;
    let store = AnalysisStore::new(client.clone());

    match cmd {
        AnalysisCommand::List { limit } => ctx.emit(store.list(limit).await, |analyses| {
            if analyses.is_empty() {
                println!("No analyses yet.");
                return;
            }
            for a in analyses {
                println!(
                    "  {:>6}  {:<8} {:>3}% ({}/{})  {}",
                    a.id.to_string(),
                    a.coin(),
                    a.percentage,
                    a.total_score,
                    a.max_score,
                    a.results.strategy_name
                );
            }
        }),

        AnalysisCommand::Delete { id } => {
            let id = RowId::from(id.as_str());
            ctx.emit(store.delete(&id).await, |_| println!("Deleted analysis {id}"))
        }

        AnalysisCommand::Run { strategy_id, coin } => {
            let strategy_id = RowId::from(strategy_id.as_str());
            let strategy = StrategyStore::new(client.clone())
                .get(&strategy_id)
                .await?
                .with_context(|| format!("strategy {strategy_id} not found"))?;

            // Resolve the owner first so a missing user fails before any cards.
            let telegram_id = ctx
                .config
                .telegram_id
                .as_deref()
                .ok_or(ValidationError::NoSessionUser)?;
            let user_id = UserDirectory::new(client.clone())
                .ensure(&SessionUser::new(telegram_id))
                .await?;

            let mut session = AnalysisSession::new(&strategy);
            let stdin = std::io::stdin();
            walk_cards(&mut session, &mut stdin.lock(), &mut std::io::stdout())?;

            let mut record = session.finish(&coin)?;
            record.user_id = Some(user_id);

            let score = session.score();
            let result = store.create(record).await;
            if let Ok(saved) = &result {
                EventTracker::new(client)
                    .track(
                        "analysis_completed",
                        json!({ "analysis_id": saved.id, "coin": saved.coin(), "percentage": saved.percentage }),
                    )
                    .await;
            }
            ctx.emit(result, |saved| {
                println!();
                println!(
                    "{} on {}: {}% ({} of {} rated conditions met)",
                    session.strategy_name(),
                    saved.coin(),
                    score.percentage(),
                    score.total_score(),
                    score.max_score()
                );
                println!("{}", score.recommendation());
                println!("Saved as analysis {}", saved.id);
            })
        }
    }
}

/// Prompt for every card until the session is complete.
///
/// At the rating prompt `<` steps back one card.
fn walk_cards(
    session: &mut AnalysisSession,
    input: &mut impl BufRead,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    while let Some(field) = session.current_field().cloned() {
        let (index, total) = session.position();
        writeln!(out, "\n[{}/{}] {}", index + 1, total, field.name)?;
        if !field.description.is_empty() {
            writeln!(out, "  {}", field.description)?;
        }

        let mut answers = Vec::with_capacity(field.inputs.len());
        for input_def in &field.inputs {
            match &input_def.options {
                Some(options) if !options.is_empty() => {
                    write!(out, "  {} [{}]: ", input_def.label, options.join("/"))?
                }
                _ => write!(out, "  {}: ", input_def.label)?,
            }
            out.flush()?;
            answers.push(Answer::new(input_def.label.clone(), read_line(input)?));
        }

        loop {
            write!(out, "  Rating (positive/neutral/negative, < to go back): ")?;
            out.flush()?;
            let line = read_line(input)?;
            if line == "<" {
                session.back();
                break;
            }
            match line.parse::<Rating>() {
                Ok(rating) => {
                    session.answer(answers, rating);
                    break;
                }
                Err(e) => writeln!(out, "  {e}")?,
            }
        }
    }
    Ok(())
}

fn read_line(input: &mut impl BufRead) -> anyhow::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        bail!("input ended before the analysis was complete");
    }
    Ok(line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{Field, Input, InputType, Strategy};

    fn strategy() -> Strategy {
        Strategy {
            id: RowId::Int(4),
            name: "Swing".into(),
            description: None,
            fields: vec![
                Field {
                    inputs: vec![Input::new(InputType::Text, "Level")],
                    ..Field::new("Support")
                },
                Field::new("Volume"),
            ],
            created_at: None,
        }
    }

    #[test]
    fn walks_every_card_with_back_and_retry() {
        let mut session = AnalysisSession::new(&strategy());
        let script = "100\npositive\n<\n95\n+\nmaybe\n-\n";
        let mut out = Vec::new();
        walk_cards(&mut session, &mut script.as_bytes(), &mut out).unwrap();

        assert!(session.is_complete());
        let record = session.finish("eth").unwrap();
        assert_eq!(record.results.positive_factors[0].answers, vec![Answer::new("Level", "95")]);
        assert_eq!(record.results.negative_factors[0].name, "Volume");

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("[1/2] Support"));
        assert!(printed.contains("unknown rating 'maybe'"));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut session = AnalysisSession::new(&strategy());
        let err = walk_cards(&mut session, &mut "100\n".as_bytes(), &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("input ended"));
    }
}
