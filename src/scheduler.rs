//! Daily question publish job.
//!
//! Each run first claims `daily_publish:<YYYY-MM-DD>` by inserting a row into
//! `job_runs`. The store rejects a second row with the same id, so restarts and
//! parallel instances publish at most once per day.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::AppError;
use crate::records::{QuestionPatch, Records};
use crate::store::{Collection, Db, Filter, StoreError};

pub const DAILY_PUBLISH_JOB: &str = "daily_publish";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRun {
  pub id: String,
  pub job: String,
  pub run_date: NaiveDate,
  pub question_id: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
  Published { question_id: i64 },
  AlreadyRan,
  NoActiveQuestion,
}

pub fn run_key(day: NaiveDate) -> String {
  format!("{}:{}", DAILY_PUBLISH_JOB, day.format("%Y-%m-%d"))
}

#[derive(Clone)]
pub struct DailyPublisher {
  db: Db,
  records: Records,
}

impl DailyPublisher {
  pub fn new(db: Db) -> Self {
    Self { records: Records::new(db.clone()), db }
  }

  #[instrument(level = "info", skip_all, fields(%day))]
  pub async fn run_once(&self, day: NaiveDate) -> Result<PublishOutcome, AppError> {
    let question = match self.records.todays_question(day).await {
      Ok(q) => q,
      Err(AppError::NotFound(_)) => {
        warn!(target: "scheduler", "no active question to publish");
        return Ok(PublishOutcome::NoActiveQuestion);
      }
      Err(e) => return Err(e),
    };

    let key = run_key(day);
    let claim = JobRun {
      id: key.clone(),
      job: DAILY_PUBLISH_JOB.into(),
      run_date: day,
      question_id: question.id,
      created_at: None,
    };
    match self.db.insert::<JobRun>(Collection::JobRuns, &claim).await {
      Ok(_) => {}
      Err(StoreError::Conflict(_)) => {
        debug!(target: "scheduler", %key, "already ran");
        return Ok(PublishOutcome::AlreadyRan);
      }
      Err(e) => return Err(e.into()),
    }

    let patch = QuestionPatch {
      published_at: Some(Utc::now()),
      forum_enabled: Some(true),
      ..Default::default()
    };
    if let Err(e) = self.records.update_question(question.id, patch).await {
      // Release the claim so the next tick can retry.
      let filters = [Filter::Eq("id".into(), key.clone().into())];
      if let Err(release) = self.db.delete(Collection::JobRuns, &filters).await {
        error!(target: "scheduler", %key, error = %release, "could not release job claim");
      }
      return Err(e);
    }

    info!(target: "scheduler", %key, question_id = question.id, "published today's question");
    Ok(PublishOutcome::Published { question_id: question.id })
  }
}

/// Wake every `every` and try today's run. The first tick fires immediately.
pub fn spawn_daily_publish(publisher: DailyPublisher, every: Duration) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      match publisher.run_once(Utc::now().date_naive()).await {
        Ok(outcome) => debug!(target: "scheduler", ?outcome, "daily publish tick"),
        Err(e) => error!(target: "scheduler", error = %e, "daily publish failed"),
      }
    }
  })
}
