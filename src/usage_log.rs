//! Usage log: one record per evaluation attempt.
//!
//! Lifecycle writes (`create_pending`, `mark_success`, `mark_error`) are used by
//! the evaluation pipeline. Transitions are guarded by `status = pending` in the
//! update filter, so an entry that already left `pending` is never rewritten.
//!
//! Reporting reads (`by_user`, `by_status`, `stats`, `cleanup_older_than`) are a
//! single query each plus an in-memory reduction.

use std::time::Duration;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::domain::{CriteriaScores, LogStatus, ProfileBrief, UsageLogEntry};
use crate::error::AppError;
use crate::store::{Collection, Db, Embed, Filter, Query, StoreError};
use crate::util::round2;

/// Fields known before the LLM call.
#[derive(Clone, Debug, Serialize)]
pub struct NewLogEntry {
    pub user_id: Option<String>,
    pub question_id: Option<i64>,
    pub answer_id: Option<i64>,
    pub prompt: String,
    pub model: String,
    pub status: LogStatus,
}

/// Fields written on the pending → success transition.
#[derive(Clone, Debug, Serialize)]
pub struct SuccessPatch {
    pub response_text: String,
    pub score: i64,
    pub feedback: String,
    pub criteria_scores: CriteriaScores,
    pub tokens_used: Option<i64>,
    pub response_time_ms: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct QuestionBrief {
    pub id: i64,
    pub title: Option<String>,
    pub prompt: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AnswerBrief {
    pub id: i64,
    pub content: String,
}

/// A log entry with its related rows embedded for display.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UsageLogView {
    #[serde(flatten)]
    pub entry: UsageLogEntry,
    #[serde(default)]
    pub questions: Option<QuestionBrief>,
    #[serde(default)]
    pub answers: Option<AnswerBrief>,
    #[serde(default)]
    pub profiles: Option<ProfileBrief>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageStats {
    pub total_calls: u64,
    pub success_calls: u64,
    pub error_calls: u64,
    pub total_tokens: i64,
    /// Milliseconds, rounded to the nearest integer.
    pub avg_response_time: i64,
    /// Rounded to two decimals.
    pub avg_score: f64,
}

#[derive(Clone, Debug, Default)]
pub struct StatsFilter {
    pub user_id: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct UsageLogs {
    db: Db,
}

impl UsageLogs {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert a `pending` entry; returns its id.
    #[instrument(level = "debug", skip_all, fields(model = %entry.model))]
    pub async fn create_pending(&self, mut entry: NewLogEntry) -> Result<i64, StoreError> {
        entry.status = LogStatus::Pending;
        let row: UsageLogEntry = self.db.insert(Collection::UsageLogs, &entry).await?;
        Ok(row.id)
    }

    #[instrument(level = "debug", skip(self, patch), fields(score = patch.score))]
    pub async fn mark_success(&self, id: i64, patch: SuccessPatch) -> Result<(), StoreError> {
        let mut body = serde_json::to_value(&patch).map_err(|e| StoreError::Decode(e.to_string()))?;
        body["status"] = json!(LogStatus::Success);
        body["updated_at"] = json!(Utc::now());
        self.transition(id, body).await
    }

    #[instrument(level = "debug", skip(self, message))]
    pub async fn mark_error(&self, id: i64, message: &str, elapsed: Duration) -> Result<(), StoreError> {
        let body = json!({
            "status": LogStatus::Error,
            "error_message": message,
            "response_time_ms": elapsed.as_millis() as i64,
            "updated_at": Utc::now(),
        });
        self.transition(id, body).await
    }

    async fn transition(&self, id: i64, body: serde_json::Value) -> Result<(), StoreError> {
        let filters = [
            Filter::Eq("id".into(), json!(id)),
            Filter::Eq("status".into(), json!(LogStatus::Pending)),
        ];
        let updated: Vec<UsageLogEntry> = self.db.update(Collection::UsageLogs, &filters, &body).await?;
        if updated.is_empty() {
            warn!(target: "usage_log", id, "no pending log entry to transition");
            return Err(StoreError::NotFound { collection: format!("pending usage log {id}") });
        }
        Ok(())
    }

    /// Newest first, with question/answer/profile attached.
    #[instrument(level = "info", skip(self))]
    pub async fn by_user(&self, user_id: &str, limit: usize, offset: usize) -> Result<Vec<UsageLogView>, AppError> {
        let query = Query::new()
            .eq("user_id", user_id)
            .embed(Embed::left(Collection::Questions, "question_id", &["id", "title", "prompt"]))
            .embed(Embed::left(Collection::Answers, "answer_id", &["id", "content"]))
            .embed(Embed::left(Collection::Profiles, "user_id", &["id", "display_name"]))
            .order("created_at", false)
            .limit(limit)
            .offset(offset);
        Ok(self.db.fetch(Collection::UsageLogs, &query).await?)
    }

    #[instrument(level = "info", skip(self))]
    pub async fn by_status(&self, status: LogStatus, limit: usize) -> Result<Vec<UsageLogEntry>, AppError> {
        let query = Query::new()
            .eq("status", status.as_str())
            .order("created_at", false)
            .limit(limit);
        Ok(self.db.fetch(Collection::UsageLogs, &query).await?)
    }

    #[instrument(level = "info", skip(self))]
    pub async fn stats(&self, filter: &StatsFilter) -> Result<UsageStats, AppError> {
        if let (Some(start), Some(end)) = (filter.start, filter.end) {
            if start > end {
                return Err(AppError::InvalidInput("start_date is after end_date".into()));
            }
        }
        let mut query = Query::new();
        if let Some(user_id) = &filter.user_id {
            query = query.eq("user_id", user_id.as_str());
        }
        if let Some(start) = filter.start {
            query = query.gte("created_at", start.to_rfc3339());
        }
        if let Some(end) = filter.end {
            query = query.lte("created_at", end.to_rfc3339());
        }
        let entries: Vec<UsageLogEntry> = self.db.fetch(Collection::UsageLogs, &query).await?;
        Ok(summarize(&entries))
    }

    /// Delete entries created more than `days` days ago. `days` must be >= 1.
    ///
    /// A cutoff before year 1 (or past chrono's range) matches nothing, so it
    /// returns 0 without a store call.
    #[instrument(level = "info", skip(self))]
    pub async fn cleanup_older_than(&self, days: i64) -> Result<usize, AppError> {
        if days < 1 {
            return Err(AppError::InvalidInput(format!("days must be a positive integer, got {days}")));
        }
        let cutoff = chrono::Duration::try_days(days)
            .and_then(|d| Utc::now().checked_sub_signed(d))
            .filter(|c| c.year() >= 1);
        let Some(cutoff) = cutoff else {
            info!(target: "usage_log", days, "cleanup cutoff predates every timestamp; nothing to delete");
            return Ok(0);
        };
        let query = Query::new().lt("created_at", cutoff.to_rfc3339());
        let deleted = self.db.delete(Collection::UsageLogs, &query.filters).await?;
        info!(target: "usage_log", days, deleted, %cutoff, "old usage logs removed");
        Ok(deleted)
    }
}

/// Single pass over the rows. Means only count rows that carry the value.
pub fn summarize(entries: &[UsageLogEntry]) -> UsageStats {
    let mut stats = UsageStats::default();
    let (mut time_sum, mut time_n) = (0i64, 0i64);
    let (mut score_sum, mut score_n) = (0i64, 0i64);

    for e in entries {
        stats.total_calls += 1;
        match e.status {
            LogStatus::Success => stats.success_calls += 1,
            LogStatus::Error => stats.error_calls += 1,
            LogStatus::Pending => {}
        }
        if let Some(t) = e.tokens_used {
            stats.total_tokens += t;
        }
        if let Some(ms) = e.response_time_ms {
            time_sum += ms;
            time_n += 1;
        }
        if let Some(s) = e.score {
            score_sum += s;
            score_n += 1;
        }
    }

    if time_n > 0 {
        stats.avg_response_time = (time_sum as f64 / time_n as f64).round() as i64;
    }
    if score_n > 0 {
        stats.avg_score = round2(score_sum as f64 / score_n as f64);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Profile, Question};

    fn entry(status: LogStatus, tokens: Option<i64>, ms: Option<i64>, score: Option<i64>) -> UsageLogEntry {
        UsageLogEntry {
            id: 0,
            user_id: None,
            question_id: None,
            answer_id: None,
            prompt: String::new(),
            model: "m".into(),
            response_text: None,
            score,
            feedback: None,
            criteria_scores: None,
            tokens_used: tokens,
            response_time_ms: ms,
            status,
            error_message: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn new_entry(user: Option<&str>) -> NewLogEntry {
        NewLogEntry {
            user_id: user.map(str::to_string),
            question_id: None,
            answer_id: None,
            prompt: "p".into(),
            model: "gpt-5-nano".into(),
            status: LogStatus::Pending,
        }
    }

    async fn seed_log(db: &Db, created_at: DateTime<Utc>) {
        let _: UsageLogEntry = db
            .insert(
                Collection::UsageLogs,
                &json!({ "prompt": "p", "model": "m", "status": "success", "created_at": created_at }),
            )
            .await
            .unwrap();
    }

    #[test]
    fn summarize_reduces_in_one_pass() {
        let rows = vec![
            entry(LogStatus::Success, Some(100), Some(1000), Some(80)),
            entry(LogStatus::Success, Some(50), Some(1501), Some(75)),
            entry(LogStatus::Error, None, Some(300), None),
            entry(LogStatus::Pending, None, None, None),
        ];
        let s = summarize(&rows);
        assert_eq!(s.total_calls, 4);
        assert_eq!(s.success_calls, 2);
        assert_eq!(s.error_calls, 1);
        assert_eq!(s.total_tokens, 150);
        assert_eq!(s.avg_response_time, 934);
        assert_eq!(s.avg_score, 77.5);
    }

    #[test]
    fn summarize_empty_is_zeroed() {
        assert_eq!(summarize(&[]), UsageStats::default());
    }

    #[tokio::test]
    async fn lifecycle_is_pending_then_terminal_once() {
        let logs = UsageLogs::new(Db::memory());
        let id = logs.create_pending(new_entry(Some("u1"))).await.unwrap();

        logs.mark_error(id, "boom", Duration::from_millis(42)).await.unwrap();

        let again = logs
            .mark_success(
                id,
                SuccessPatch {
                    response_text: "{}".into(),
                    score: 1,
                    feedback: String::new(),
                    criteria_scores: CriteriaScores::new(),
                    tokens_used: None,
                    response_time_ms: 1,
                },
            )
            .await;
        assert!(again.is_err());

        let errors = logs.by_status(LogStatus::Error, 10).await.unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_message.as_deref(), Some("boom"));
        assert_eq!(errors[0].response_time_ms, Some(42));
        assert!(logs.by_status(LogStatus::Success, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn by_user_pages_newest_first_with_related_rows() {
        let db = Db::memory();
        let logs = UsageLogs::new(db.clone());
        let _: Profile = db
            .insert(Collection::Profiles, &json!({ "id": "u1", "display_name": "소크라테스" }))
            .await
            .unwrap();
        let _: Question = db
            .insert(Collection::Questions, &json!({ "prompt": "자유의지?" }))
            .await
            .unwrap();

        let base = Utc::now() - chrono::Duration::hours(1);
        for i in 0..3 {
            let _: UsageLogEntry = db
                .insert(
                    Collection::UsageLogs,
                    &json!({
                        "user_id": "u1", "question_id": 1, "prompt": format!("p{i}"), "model": "m",
                        "status": "success", "created_at": base + chrono::Duration::minutes(i)
                    }),
                )
                .await
                .unwrap();
        }
        let _: UsageLogEntry = db
            .insert(Collection::UsageLogs, &json!({ "user_id": "u2", "prompt": "x", "model": "m", "status": "success" }))
            .await
            .unwrap();

        let page = logs.by_user("u1", 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].entry.prompt, "p2");
        assert_eq!(page[1].entry.prompt, "p1");
        assert_eq!(page[0].profiles.as_ref().and_then(|p| p.display_name.as_deref()), Some("소크라테스"));
        assert_eq!(page[0].questions.as_ref().map(|q| q.prompt.as_str()), Some("자유의지?"));
        assert!(page[0].answers.is_none());

        let rest = logs.by_user("u1", 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].entry.prompt, "p0");
    }

    #[tokio::test]
    async fn stats_respect_user_and_date_range() {
        let db = Db::memory();
        let logs = UsageLogs::new(db.clone());
        let now = Utc::now();
        for (user, days_ago, score) in [("u1", 1, 80), ("u1", 10, 60), ("u2", 1, 10)] {
            let _: UsageLogEntry = db
                .insert(
                    Collection::UsageLogs,
                    &json!({
                        "user_id": user, "prompt": "p", "model": "m", "status": "success",
                        "score": score, "created_at": now - chrono::Duration::days(days_ago)
                    }),
                )
                .await
                .unwrap();
        }

        let all_u1 = logs
            .stats(&StatsFilter { user_id: Some("u1".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(all_u1.total_calls, 2);
        assert_eq!(all_u1.avg_score, 70.0);

        let recent = logs
            .stats(&StatsFilter { start: Some(now - chrono::Duration::days(2)), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(recent.total_calls, 2);
        assert_eq!(recent.avg_score, 45.0);

        let bad = logs
            .stats(&StatsFilter { start: Some(now), end: Some(now - chrono::Duration::days(1)), ..Default::default() })
            .await;
        assert!(matches!(bad, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn cleanup_deletes_only_old_rows_and_counts_them() {
        let db = Db::memory();
        let logs = UsageLogs::new(db.clone());
        let now = Utc::now();
        seed_log(&db, now - chrono::Duration::days(31)).await;
        seed_log(&db, now - chrono::Duration::days(45)).await;
        seed_log(&db, now - chrono::Duration::days(29)).await;
        seed_log(&db, now).await;

        assert_eq!(logs.cleanup_older_than(30).await.unwrap(), 2);
        assert_eq!(db.count(Collection::UsageLogs, &[]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn cleanup_rejects_non_positive_days_without_touching_storage() {
        let db = Db::memory();
        let logs = UsageLogs::new(db.clone());
        seed_log(&db, Utc::now() - chrono::Duration::days(400)).await;

        for days in [0, -1] {
            let res = logs.cleanup_older_than(days).await;
            assert!(matches!(res, Err(AppError::InvalidInput(_))));
        }
        assert_eq!(db.count(Collection::UsageLogs, &[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cleanup_with_an_enormous_day_count_deletes_nothing() {
        let db = Db::memory();
        let logs = UsageLogs::new(db.clone());
        seed_log(&db, Utc::now() - chrono::Duration::days(4000)).await;

        for days in [800_000, 9_999_999_999_999, i64::MAX] {
            assert_eq!(logs.cleanup_older_than(days).await.unwrap(), 0);
        }
        assert_eq!(db.count(Collection::UsageLogs, &[]).await.unwrap(), 1);
    }
}
