//! Public protocol structs for HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::forum::PostSort;

pub const DEFAULT_RANKING_LIMIT: usize = 50;
pub const DEFAULT_LOG_PAGE: usize = 50;
pub const DEFAULT_ERROR_LIMIT: usize = 100;
pub const DEFAULT_FORUM_PAGE: usize = 50;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthOut {
    pub ok: bool,
    #[serde(rename = "evaluationEnabled")]
    pub evaluation_enabled: bool,
}

/// Free-form evaluation request. The caller is taken from `x-user-id` when present.
#[derive(Debug, Deserialize)]
pub struct EvaluateIn {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub criteria: Option<Vec<String>>,
    #[serde(default, rename = "questionId")]
    pub question_id: Option<i64>,
    #[serde(default, rename = "answerId")]
    pub answer_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct AnswerIn {
    pub question_id: i64,
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// `GET /forum/posts?category=&sort=recent|popular|all&question_id=&limit=`
#[derive(Debug, Default, Deserialize)]
pub struct ForumListQuery {
    pub category: Option<String>,
    #[serde(default)]
    pub sort: PostSort,
    pub question_id: Option<i64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedOut {
    pub success: bool,
}

/// `start_date` / `end_date` as RFC 3339 instants or plain `YYYY-MM-DD` days.
#[derive(Debug, Default, Deserialize)]
pub struct DateRangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl DateRangeQuery {
    /// A plain end day covers that whole day.
    pub fn bounds(&self) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), AppError> {
        let start = self
            .start_date
            .as_deref()
            .map(|s| parse_instant(s, NaiveTime::default()))
            .transpose()?;
        let end_of_day = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or_default();
        let end = self
            .end_date
            .as_deref()
            .map(|s| parse_instant(s, end_of_day))
            .transpose()?;
        Ok((start, end))
    }
}

fn parse_instant(raw: &str, day_time: NaiveTime) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|d| d.and_time(day_time).and_utc())
        .map_err(|_| AppError::InvalidInput(format!("invalid date: {raw}")))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupOut {
    pub message: String,
    pub deleted_count: usize,
}
