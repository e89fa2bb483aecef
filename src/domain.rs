//! Domain models persisted through the store: questions, answers, scores,
//! profiles and the per-attempt usage log.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Evaluation axis label → 0..=100 sub-score. Keys are caller-defined.
pub type CriteriaScores = BTreeMap<String, i64>;

/// A question users answer. `evaluation_criteria` overrides the default rubric.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Question {
  pub id: i64,
  #[serde(default)] pub title: Option<String>,
  pub prompt: String,
  #[serde(default)] pub content: Option<String>,
  #[serde(default)] pub description: Option<String>,
  #[serde(default)] pub category: Option<String>,
  #[serde(default)] pub evaluation_criteria: Option<Vec<String>>,
  #[serde(default = "default_true")] pub is_active: bool,
  #[serde(default)] pub forum_enabled: bool,
  #[serde(default)] pub published_at: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  #[serde(default)] pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool { true }

impl Question {
  /// Text sent to the grader: the long-form content when present, else the prompt.
  pub fn text(&self) -> &str {
    match self.content.as_deref() {
      Some(c) if !c.trim().is_empty() => c,
      _ => &self.prompt,
    }
  }
}

/// A submitted answer. `user_id` is absent for anonymous submissions.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Answer {
  pub id: i64,
  #[serde(default)] pub user_id: Option<String>,
  pub question_id: i64,
  pub content: String,
  pub created_at: DateTime<Utc>,
}

/// One scoring of an answer. An answer may carry several.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Score {
  pub id: i64,
  pub answer_id: i64,
  pub score: i64,
  #[serde(default)] pub reason: Option<String>,
  pub created_at: DateTime<Utc>,
  #[serde(default)] pub scorer_id: Option<String>,
  #[serde(default)] pub is_ai_score: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Profile {
  pub id: String,
  #[serde(default)] pub display_name: Option<String>,
  /// Maintained outside this service; read only here.
  #[serde(default)] pub total_score: Option<i64>,
  pub created_at: DateTime<Utc>,
  #[serde(default)] pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
  pub fn total(&self) -> i64 { self.total_score.unwrap_or(0) }
}

/// Public face of a profile, embedded next to logs, posts and comments.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProfileBrief {
  pub id: String,
  #[serde(default)] pub display_name: Option<String>,
}

/// Lifecycle of a usage-log entry. Only `Pending` may transition.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
  Pending,
  Success,
  Error,
}

impl LogStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      LogStatus::Pending => "pending",
      LogStatus::Success => "success",
      LogStatus::Error => "error",
    }
  }
}

impl std::str::FromStr for LogStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "pending" => Ok(LogStatus::Pending),
      "success" => Ok(LogStatus::Success),
      "error" => Ok(LogStatus::Error),
      other => Err(format!("unknown log status '{other}'")),
    }
  }
}

/// One row per evaluation attempt (not per answer).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UsageLogEntry {
  pub id: i64,
  #[serde(default)] pub user_id: Option<String>,
  #[serde(default)] pub question_id: Option<i64>,
  #[serde(default)] pub answer_id: Option<i64>,
  pub prompt: String,
  pub model: String,
  #[serde(default)] pub response_text: Option<String>,
  #[serde(default)] pub score: Option<i64>,
  #[serde(default)] pub feedback: Option<String>,
  #[serde(default)] pub criteria_scores: Option<CriteriaScores>,
  #[serde(default)] pub tokens_used: Option<i64>,
  #[serde(default)] pub response_time_ms: Option<i64>,
  pub status: LogStatus,
  #[serde(default)] pub error_message: Option<String>,
  pub created_at: DateTime<Utc>,
  #[serde(default)] pub updated_at: Option<DateTime<Utc>>,
}
