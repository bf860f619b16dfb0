//! Guided analysis of an asset against a strategy, and its scoring.
//!
//! The user walks the strategy's fields one card at a time, fills in the
//! inputs and rates the field. Neutral ratings are recorded but excluded from
//! the score: `max_score` counts only positive and negative ratings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::db::{DataClient, SortDirection};
use crate::error::{DataError, ValidationError};
use crate::journal::strategy::{Field, Strategy};
use crate::journal::{RowId, decode_rows, null_as_default, require, to_payload};

const TABLE: &str = "analysis_results";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    Positive,
    Neutral,
    Negative,
}

impl std::str::FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" | "+" | "yes" => Ok(Self::Positive),
            "neutral" | "0" | "skip" => Ok(Self::Neutral),
            "negative" | "-" | "no" => Ok(Self::Negative),
            other => Err(format!("unknown rating '{other}'")),
        }
    }
}

/// One input's answer on a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub label: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: String,
}

impl Answer {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// A rated field, as stored in the result lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, PartialEq)]
struct CardAnswer {
    answers: Vec<Answer>,
    rating: Rating,
}

/// Rating tallies and the derived score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Score {
    pub positive: u32,
    pub neutral: u32,
    pub negative: u32,
}

impl Score {
    pub fn total_score(&self) -> u32 {
        self.positive
    }

    pub fn max_score(&self) -> u32 {
        self.positive + self.negative
    }

    /// Rounded share of positive ratings among non-neutral ones.
    pub fn percentage(&self) -> u32 {
        share(self.positive, self.max_score())
    }

    pub fn negative_percentage(&self) -> u32 {
        share(self.negative, self.max_score())
    }

    pub fn recommendation(&self) -> Recommendation {
        let positive = self.percentage();
        let negative = self.negative_percentage();
        if positive >= 70 {
            Recommendation::Enter
        } else if negative >= 60 {
            Recommendation::Avoid
        } else if positive > negative {
            Recommendation::Cautious
        } else {
            Recommendation::NeedsMoreAnalysis
        }
    }
}

fn share(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    (f64::from(part) * 100.0 / f64::from(whole)).round() as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Enter,
    Avoid,
    Cautious,
    NeedsMoreAnalysis,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Enter => "The trade looks attractive: most conditions are met.",
            Self::Avoid => "Stay out: too many conditions are missing.",
            Self::Cautious => "The trade can be considered, with caution.",
            Self::NeedsMoreAnalysis => "Needs more analysis: not enough conditions to enter.",
        };
        f.write_str(text)
    }
}

/// Card-by-card walk over a strategy's fields.
#[derive(Debug, Clone)]
pub struct AnalysisSession {
    strategy_id: RowId,
    strategy_name: String,
    fields: Vec<Field>,
    answers: Vec<Option<CardAnswer>>,
    cursor: usize,
}

impl AnalysisSession {
    pub fn new(strategy: &Strategy) -> Self {
        Self {
            strategy_id: strategy.id.clone(),
            strategy_name: strategy.name.clone(),
            fields: strategy.fields.clone(),
            answers: vec![None; strategy.fields.len()],
            cursor: 0,
        }
    }

    pub fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    /// The card awaiting an answer, or `None` once past the last one.
    pub fn current_field(&self) -> Option<&Field> {
        self.fields.get(self.cursor)
    }

    /// `(index, total)` of the current card, 0-based.
    pub fn position(&self) -> (usize, usize) {
        (self.cursor, self.fields.len())
    }

    /// Record the current card and move to the next one.
    ///
    /// Returns `false` (and records nothing) when there is no current card.
    pub fn answer(&mut self, answers: Vec<Answer>, rating: Rating) -> bool {
        let Some(slot) = self.answers.get_mut(self.cursor) else {
            return false;
        };
        *slot = Some(CardAnswer { answers, rating });
        self.cursor += 1;
        true
    }

    /// Step back one card, keeping its previous answer until overwritten.
    pub fn back(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    pub fn answered(&self) -> usize {
        self.answers.iter().filter(|a| a.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        !self.fields.is_empty() && self.answered() == self.fields.len()
    }

    pub fn score(&self) -> Score {
        self.answers
            .iter()
            .flatten()
            .fold(Score::default(), |mut score, card| {
                match card.rating {
                    Rating::Positive => score.positive += 1,
                    Rating::Neutral => score.neutral += 1,
                    Rating::Negative => score.negative += 1,
                }
                score
            })
    }

    fn factors(&self, rating: Rating) -> Vec<Factor> {
        self.fields
            .iter()
            .zip(&self.answers)
            .filter_map(|(field, answer)| match answer {
                Some(card) if card.rating == rating => Some(Factor {
                    name: field.name.clone(),
                    description: field.description.clone(),
                    answers: card
                        .answers
                        .iter()
                        .filter(|a| !a.value.trim().is_empty())
                        .cloned()
                        .collect(),
                }),
                _ => None,
            })
            .collect()
    }

    /// Close the session into a record ready to persist.
    pub fn finish(&self, coin: &str) -> Result<NewAnalysis, ValidationError> {
        if self.fields.is_empty() {
            return Err(ValidationError::EmptyStrategy {
                name: self.strategy_name.clone(),
            });
        }
        if !self.is_complete() {
            return Err(ValidationError::IncompleteAnalysis {
                answered: self.answered(),
                total: self.fields.len(),
            });
        }

        let score = self.score();
        let coin = coin.trim().to_uppercase();
        Ok(NewAnalysis {
            strategy_id: self.strategy_id.clone(),
            user_id: None,
            coin: coin.clone(),
            total_score: score.total_score(),
            max_score: score.max_score(),
            percentage: score.percentage(),
            results: AnalysisResults {
                strategy_name: self.strategy_name.clone(),
                coin,
                positive_factors: self.factors(Rating::Positive),
                negative_factors: self.factors(Rating::Negative),
                total_score: score.total_score(),
                max_score: score.max_score(),
                percentage: score.percentage(),
            },
        })
    }
}

/// The `results` JSON document stored with each analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResults {
    #[serde(default, deserialize_with = "null_as_default")]
    pub strategy_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub coin: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub positive_factors: Vec<Factor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub negative_factors: Vec<Factor>,
    #[serde(default)]
    pub total_score: u32,
    #[serde(default)]
    pub max_score: u32,
    #[serde(default)]
    pub percentage: u32,
}

impl AnalysisResults {
    pub fn score(&self) -> Score {
        Score {
            positive: self.positive_factors.len() as u32,
            neutral: 0,
            negative: self.negative_factors.len() as u32,
        }
    }
}

/// Analysis as written by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnalysis {
    pub strategy_id: RowId,
    #[serde(default)]
    pub user_id: Option<RowId>,
    pub coin: String,
    pub results: AnalysisResults,
    pub total_score: u32,
    pub max_score: u32,
    pub percentage: u32,
}

/// A persisted analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub id: RowId,
    #[serde(default)]
    pub strategy_id: Option<RowId>,
    #[serde(default)]
    pub user_id: Option<RowId>,
    #[serde(default)]
    pub coin: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub results: AnalysisResults,
    #[serde(default, deserialize_with = "null_as_default")]
    pub total_score: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub max_score: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub percentage: u32,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Analysis {
    pub fn coin(&self) -> &str {
        self.coin.as_deref().unwrap_or(&self.results.coin)
    }

    pub fn recommendation(&self) -> Recommendation {
        self.results.score().recommendation()
    }
}

/// CRUD over the `analysis_results` table.
#[derive(Debug, Clone)]
pub struct AnalysisStore {
    client: DataClient,
}

impl AnalysisStore {
    pub fn new(client: DataClient) -> Self {
        Self { client }
    }

    /// Most recent first.
    pub async fn list(&self, limit: Option<usize>) -> Result<Vec<Analysis>, DataError> {
        let mut query = self
            .client
            .from(TABLE)
            .select("*")
            .order("created_at", SortDirection::Descending);
        if let Some(n) = limit {
            query = query.limit(n);
        }
        decode_rows(query.try_execute().await)
    }

    pub async fn create(&self, analysis: NewAnalysis) -> Result<Analysis, DataError> {
        let payload = to_payload(&analysis)?;
        let result = self
            .client
            .from(TABLE)
            .insert(payload)
            .select("*")
            .single()
            .try_fetch::<Analysis>()
            .await;
        let saved = require(result, "analysis insert")?;
        tracing::info!(id = %saved.id, coin = %saved.coin(), percentage = saved.percentage, "Saved analysis");
        Ok(saved)
    }

    pub async fn delete(&self, id: &RowId) -> Result<(), DataError> {
        self.client.from(TABLE).delete().eq("id", id).try_execute().await?;
        Ok(())
    }
}
