//! Thin data access for questions, answers, scores and profiles.
//!
//! These are straight pass-throughs to the store with input validation; the
//! ranking and evaluation modules read the same collections directly.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::domain::{Answer, Profile, Question, Score};
use crate::error::AppError;
use crate::store::{Collection, Db, Embed, Query};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewQuestion {
    pub prompt: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub evaluation_criteria: Option<Vec<String>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuestionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_criteria: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forum_enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewAnswer {
    #[serde(default)]
    pub user_id: Option<String>,
    pub question_id: i64,
    pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewScore {
    pub answer_id: i64,
    pub score: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub scorer_id: Option<String>,
    #[serde(default)]
    pub is_ai_score: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct Records {
    db: Db,
}

impl Records {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    // --- questions ---

    pub async fn active_questions(&self) -> Result<Vec<Question>, AppError> {
        let q = Query::new().eq("is_active", true).order("created_at", false);
        Ok(self.db.fetch(Collection::Questions, &q).await?)
    }

    pub async fn question(&self, id: i64) -> Result<Question, AppError> {
        Ok(self.db.fetch_one(Collection::Questions, Query::new().eq("id", id)).await?)
    }

    #[instrument(level = "info", skip_all)]
    pub async fn create_question(&self, new: NewQuestion) -> Result<Question, AppError> {
        if new.prompt.trim().is_empty() {
            return Err(AppError::InvalidInput("prompt must not be empty".into()));
        }
        let q: Question = self.db.insert(Collection::Questions, &new).await?;
        info!(target: "thinkscore", id = q.id, "question created");
        Ok(q)
    }

    #[instrument(level = "info", skip(self, patch))]
    pub async fn update_question(&self, id: i64, mut patch: QuestionPatch) -> Result<Question, AppError> {
        if matches!(patch.prompt.as_deref(), Some(p) if p.trim().is_empty()) {
            return Err(AppError::InvalidInput("prompt must not be empty".into()));
        }
        patch.updated_at = Some(Utc::now());
        let filters = Query::new().eq("id", id).filters;
        self.db
            .update::<Question>(Collection::Questions, &filters, &patch)
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("question {id}")))
    }

    /// Active questions in id order, rotated by day of year.
    pub async fn todays_question(&self, today: NaiveDate) -> Result<Question, AppError> {
        let active = self.active_by_id().await?;
        pick_for_day(&active, today)
            .cloned()
            .ok_or_else(|| AppError::NotFound("no active questions".into()))
    }

    pub async fn random_question(&self) -> Result<Question, AppError> {
        let active = self.active_by_id().await?;
        active
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or_else(|| AppError::NotFound("no active questions".into()))
    }

    async fn active_by_id(&self) -> Result<Vec<Question>, AppError> {
        let q = Query::new().eq("is_active", true).order("id", true);
        Ok(self.db.fetch(Collection::Questions, &q).await?)
    }

    // --- answers ---

    #[instrument(level = "info", skip_all, fields(question_id = new.question_id))]
    pub async fn create_answer(&self, new: NewAnswer) -> Result<Answer, AppError> {
        if new.content.trim().is_empty() {
            return Err(AppError::InvalidInput("answer content must not be empty".into()));
        }
        self.question(new.question_id).await?;
        Ok(self.db.insert(Collection::Answers, &new).await?)
    }

    pub async fn answer(&self, id: i64) -> Result<Answer, AppError> {
        Ok(self.db.fetch_one(Collection::Answers, Query::new().eq("id", id)).await?)
    }

    pub async fn answers_by_user(&self, user_id: &str) -> Result<Vec<Answer>, AppError> {
        let q = Query::new().eq("user_id", user_id).order("created_at", false);
        Ok(self.db.fetch(Collection::Answers, &q).await?)
    }

    pub async fn answers_by_question(&self, question_id: i64) -> Result<Vec<Answer>, AppError> {
        let q = Query::new().eq("question_id", question_id).order("created_at", false);
        Ok(self.db.fetch(Collection::Answers, &q).await?)
    }

    // --- scores ---

    /// Scores are integers in 0..=100; anything else is rejected before the write.
    #[instrument(level = "info", skip_all, fields(answer_id = new.answer_id, score = new.score))]
    pub async fn create_score(&self, new: NewScore) -> Result<Score, AppError> {
        if !(0..=100).contains(&new.score) {
            return Err(AppError::InvalidInput(format!("score must be within 0..=100, got {}", new.score)));
        }
        Ok(self.db.insert(Collection::Scores, &new).await?)
    }

    pub async fn score(&self, id: i64) -> Result<Score, AppError> {
        Ok(self.db.fetch_one(Collection::Scores, Query::new().eq("id", id)).await?)
    }

    pub async fn scores_by_answer(&self, answer_id: i64) -> Result<Vec<Score>, AppError> {
        let q = Query::new().eq("answer_id", answer_id).order("created_at", false);
        Ok(self.db.fetch(Collection::Scores, &q).await?)
    }

    /// Scores of every answer the user wrote, newest first.
    pub async fn scores_by_user(&self, user_id: &str) -> Result<Vec<Score>, AppError> {
        let q = Query::new()
            .embed(Embed::inner(Collection::Answers, "answer_id", &["user_id"]).eq("user_id", user_id))
            .order("created_at", false);
        Ok(self.db.fetch(Collection::Scores, &q).await?)
    }

    // --- profiles ---

    pub async fn profile(&self, id: &str) -> Result<Profile, AppError> {
        Ok(self.db.fetch_one(Collection::Profiles, Query::new().eq("id", id)).await?)
    }

    pub async fn create_profile(&self, new: NewProfile) -> Result<Profile, AppError> {
        Ok(self.db.insert(Collection::Profiles, &new).await?)
    }

    pub async fn update_profile(&self, id: &str, mut patch: ProfilePatch) -> Result<Profile, AppError> {
        patch.updated_at = Some(Utc::now());
        let filters = Query::new().eq("id", id).filters;
        self.db
            .update::<Profile>(Collection::Profiles, &filters, &patch)
            .await?
            .pop()
            .ok_or_else(|| AppError::NotFound(format!("profile {id}")))
    }
}

/// `questions` must already be in a stable order.
pub fn pick_for_day(questions: &[Question], day: NaiveDate) -> Option<&Question> {
    if questions.is_empty() {
        return None;
    }
    let idx = day.ordinal() as usize % questions.len();
    questions.get(idx)
}
