//! Answer evaluation pipeline.
//!
//! One call to `Evaluator::evaluate` is one attempt:
//!   1. pre-check the answer for bullet glyphs / emoji (short-circuits, no LLM call)
//!   2. build the scoring prompt (fixed rubric or caller-supplied axes)
//!   3. write a `pending` usage-log entry; abort if that write fails
//!   4. call the LLM exactly once and parse its JSON reply
//!   5. move the log entry to `success` or `error`
//!   6. on success, insert an AI score row for the answer (best effort)
//!
//! A successful return means the log write and the LLM call both succeeded.
//! A failed score insert is reported through `EvaluationOutcome::score_warning`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{AppConfig, EvaluationSettings, Prompts};
use crate::domain::{CriteriaScores, LogStatus};
use crate::error::AppError;
use crate::openai::{GenerateRequest, GenerationHints, LlmError, LlmGateway};
use crate::records::{NewScore, Records};
use crate::store::Db;
use crate::usage_log::{NewLogEntry, SuccessPatch, UsageLogs};
use crate::util::{fill_template, find_banned_char, trunc_for_log};

/// Fixed rubric axes and their weights.
pub const DEFAULT_AXES: [(&str, f64); 3] = [("논리적 사고", 0.4), ("창의적 사고", 0.3), ("일관성", 0.3)];

#[derive(Clone, Debug, Default)]
pub struct EvaluationRequest {
  pub question: String,
  pub answer: String,
  /// Axis labels; `None` or empty selects the fixed rubric.
  pub criteria: Option<Vec<String>>,
  pub user_id: Option<String>,
  pub question_id: Option<i64>,
  pub answer_id: Option<i64>,
}

/// The structured reply expected from the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
  pub score: i64,
  pub feedback: String,
  pub criteria_scores: CriteriaScores,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationOutcome {
  #[serde(flatten)]
  pub evaluation: Evaluation,
  /// True when the pre-check rejected the answer without calling the model.
  pub rejected: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub log_id: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub score_id: Option<i64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub score_warning: Option<String>,
}

/// Why a single attempt failed. Recorded in the usage log, never returned to callers.
#[derive(Debug, Error)]
pub enum EvaluationError {
  #[error(transparent)]
  Llm(#[from] LlmError),
  #[error("empty evaluation response")]
  Empty,
  #[error("malformed evaluation JSON: {0}")]
  Malformed(String),
  #[error("evaluation schema mismatch: {0}")]
  Schema(String),
}

#[derive(Clone)]
pub struct Evaluator {
  records: Records,
  logs: UsageLogs,
  llm: Option<Arc<dyn LlmGateway>>,
  prompts: Prompts,
  settings: EvaluationSettings,
}

impl Evaluator {
  pub fn new(db: Db, llm: Option<Arc<dyn LlmGateway>>, config: &AppConfig) -> Self {
    Self {
      records: Records::new(db.clone()),
      logs: UsageLogs::new(db),
      llm,
      prompts: config.prompts.clone(),
      settings: config.evaluation.clone(),
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.llm.is_some()
  }

  #[instrument(level = "info", skip(self, req), fields(question_id = ?req.question_id, answer_id = ?req.answer_id, answer_len = req.answer.len()))]
  pub async fn evaluate(&self, req: EvaluationRequest) -> Result<EvaluationOutcome, AppError> {
    if req.question.trim().is_empty() {
      return Err(AppError::InvalidInput("question must not be empty".into()));
    }
    if req.answer.trim().is_empty() {
      return Err(AppError::InvalidInput("answer must not be empty".into()));
    }
    let criteria: Option<Vec<String>> = req
      .criteria
      .as_ref()
      .map(|c| c.iter().map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect::<Vec<_>>())
      .filter(|c| !c.is_empty());

    if let Some(ch) = find_banned_char(&req.answer) {
      return Ok(self.reject(&req, criteria.as_deref(), ch).await);
    }

    let llm = self.llm.as_ref().ok_or(AppError::LlmUnavailable)?;
    let prompt = build_prompt(&self.prompts, &req.question, &req.answer, criteria.as_deref());

    let log_id = self
      .logs
      .create_pending(NewLogEntry {
        user_id: req.user_id.clone(),
        question_id: req.question_id,
        answer_id: req.answer_id,
        prompt: prompt.clone(),
        model: self.settings.model.clone(),
        status: LogStatus::Pending,
      })
      .await
      .map_err(|e| {
        error!(target: "evaluation", error = %e, "pending usage log write failed; not calling the model");
        AppError::from(e)
      })?;

    let started = Instant::now();
    let request = GenerateRequest {
      prompt,
      model: self.settings.model.clone(),
      hints: GenerationHints {
        reasoning_effort: self.settings.reasoning_effort.clone(),
        verbosity: self.settings.verbosity.clone(),
      },
    };
    let attempt = match llm.generate(&request).await {
      Ok(generation) => parse_evaluation(&generation.text).map(|ev| (ev, generation)),
      Err(e) => Err(EvaluationError::from(e)),
    };
    let elapsed = started.elapsed();

    let (evaluation, generation) = match attempt {
      Ok(ok) => ok,
      Err(e) => {
        error!(target: "evaluation", log_id, error = %e, elapsed_ms = elapsed.as_millis() as u64, "evaluation failed");
        if let Err(log_err) = self.logs.mark_error(log_id, &e.to_string(), elapsed).await {
          error!(target: "evaluation", log_id, error = %log_err, "could not record evaluation failure");
        }
        return Err(AppError::EvaluationFailed);
      }
    };

    let patch = SuccessPatch {
      response_text: generation.text,
      score: evaluation.score,
      feedback: evaluation.feedback.clone(),
      criteria_scores: evaluation.criteria_scores.clone(),
      tokens_used: generation.total_tokens.map(i64::from),
      response_time_ms: elapsed.as_millis() as i64,
    };
    if let Err(e) = self.logs.mark_success(log_id, patch).await {
      // The entry stays pending; this line is the only trace of the result.
      error!(
        target: "evaluation",
        log_id,
        score = evaluation.score,
        elapsed_ms = elapsed.as_millis() as u64,
        error = %e,
        "evaluation succeeded but its usage log could not be completed"
      );
      return Err(e.into());
    }
    if criteria.is_none() {
      let expected = weighted_total(&evaluation.criteria_scores);
      if expected != evaluation.score {
        debug!(target: "evaluation", log_id, score = evaluation.score, expected, "total differs from weighted rubric");
      }
    }
    info!(target: "evaluation", log_id, score = evaluation.score, elapsed_ms = elapsed.as_millis() as u64, "answer evaluated");

    let mut outcome = EvaluationOutcome {
      evaluation,
      rejected: false,
      log_id: Some(log_id),
      score_id: None,
      score_warning: None,
    };
    if let Some(answer_id) = req.answer_id {
      let new_score = NewScore {
        answer_id,
        score: outcome.evaluation.score,
        reason: Some(outcome.evaluation.feedback.clone()),
        scorer_id: None,
        is_ai_score: true,
      };
      match self.records.create_score(new_score).await {
        Ok(score) => outcome.score_id = Some(score.id),
        Err(e) => {
          warn!(target: "evaluation", answer_id, error = %e, "score row not saved; returning evaluation anyway");
          outcome.score_warning = Some(format!("score was not saved: {e}"));
        }
      }
    }
    Ok(outcome)
  }

  /// Evaluate an answer already in storage against its question's own criteria.
  pub async fn evaluate_stored_answer(&self, answer_id: i64) -> Result<EvaluationOutcome, AppError> {
    let answer = self.records.answer(answer_id).await?;
    let question = self.records.question(answer.question_id).await?;
    self
      .evaluate(EvaluationRequest {
        question: question.text().to_string(),
        answer: answer.content,
        criteria: question.evaluation_criteria,
        user_id: answer.user_id,
        question_id: Some(question.id),
        answer_id: Some(answer.id),
      })
      .await
  }

  async fn reject(&self, req: &EvaluationRequest, criteria: Option<&[String]>, ch: char) -> EvaluationOutcome {
    warn!(target: "evaluation", banned = %ch.escape_unicode(), "answer rejected by pre-check");
    let mut log_id = None;
    if self.settings.log_rejected_attempts {
      log_id = self.log_rejection(req, criteria, ch).await;
    }
    EvaluationOutcome {
      evaluation: Evaluation {
        score: 0,
        feedback: self.prompts.rejected_feedback.clone(),
        criteria_scores: zero_scores(criteria),
      },
      rejected: true,
      log_id,
      score_id: None,
      score_warning: None,
    }
  }

  async fn log_rejection(&self, req: &EvaluationRequest, criteria: Option<&[String]>, ch: char) -> Option<i64> {
    let entry = NewLogEntry {
      user_id: req.user_id.clone(),
      question_id: req.question_id,
      answer_id: req.answer_id,
      prompt: build_prompt(&self.prompts, &req.question, &req.answer, criteria),
      model: self.settings.model.clone(),
      status: LogStatus::Pending,
    };
    let message = format!("rejected by pre-check: {}", ch.escape_unicode());
    let written = match self.logs.create_pending(entry).await {
      Ok(id) => self.logs.mark_error(id, &message, Duration::ZERO).await.map(|_| id),
      Err(e) => Err(e),
    };
    match written {
      Ok(id) => Some(id),
      Err(e) => {
        warn!(target: "evaluation", error = %e, "could not record rejected attempt");
        None
      }
    }
  }
}

/// Fill the rubric or criteria template. Question and answer text go in verbatim.
pub fn build_prompt(prompts: &Prompts, question: &str, answer: &str, criteria: Option<&[String]>) -> String {
  match criteria {
    Some(axes) if !axes.is_empty() => {
      let list = axes
        .iter()
        .enumerate()
        .map(|(i, axis)| format!("{}. {}", i + 1, axis))
        .collect::<Vec<_>>()
        .join("\n");
      let json = format!(
        "{{ {} }}",
        axes
          .iter()
          .map(|axis| format!("{}: 점수", Value::from(axis.as_str())))
          .collect::<Vec<_>>()
          .join(", ")
      );
      fill_template(
        &prompts.criteria_template,
        &[("question", question), ("answer", answer), ("criteria_list", &list), ("criteria_json", &json)],
      )
    }
    _ => fill_template(&prompts.rubric_template, &[("question", question), ("answer", answer)]),
  }
}

/// Strict parse: the whole reply must be one JSON object with integer scores in 0..=100.
pub fn parse_evaluation(text: &str) -> Result<Evaluation, EvaluationError> {
  let trimmed = text.trim();
  if trimmed.is_empty() {
    return Err(EvaluationError::Empty);
  }
  let value: Value = serde_json::from_str(trimmed)
    .map_err(|e| EvaluationError::Malformed(format!("{e}; reply was {}", trunc_for_log(trimmed, 200))))?;
  let ev: Evaluation = serde_json::from_value(value).map_err(|e| EvaluationError::Schema(e.to_string()))?;
  if !(0..=100).contains(&ev.score) {
    return Err(EvaluationError::Schema(format!("score {} outside 0..=100", ev.score)));
  }
  if let Some((axis, s)) = ev.criteria_scores.iter().find(|(_, s)| !(0..=100).contains(*s)) {
    return Err(EvaluationError::Schema(format!("criteria score {axis}={s} outside 0..=100")));
  }
  Ok(ev)
}

/// Weighted total for the fixed rubric, rounded half away from zero.
pub fn weighted_total(scores: &CriteriaScores) -> i64 {
  DEFAULT_AXES
    .iter()
    .map(|(axis, w)| scores.get(*axis).copied().unwrap_or(0) as f64 * w)
    .sum::<f64>()
    .round() as i64
}

fn zero_scores(criteria: Option<&[String]>) -> CriteriaScores {
  match criteria {
    Some(axes) if !axes.is_empty() => axes.iter().map(|a| (a.clone(), 0)).collect(),
    _ => DEFAULT_AXES.iter().map(|(a, _)| (a.to_string(), 0)).collect(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  use crate::domain::{Score, UsageLogEntry};
  use crate::openai::scripted::ScriptedLlm;
  use crate::openai::Generation;
  use crate::store::{Collection, Filter, MemoryStore, Query, Row, Store, StoreError};

  const GOOD_REPLY: &str = r#"{"score":82,"feedback":"강점: 논증 구조가 명확합니다. 개선점: 반론을 더 다루세요.","criteriaScores":{"논리적 사고":85,"창의적 사고":75,"일관성":85}}"#;

  /// Memory store whose inserts (`failing`) or updates (`frozen`) fail for the given collections.
  struct FlakyStore {
    inner: MemoryStore,
    failing: HashSet<Collection>,
    frozen: HashSet<Collection>,
  }

  #[async_trait::async_trait]
  impl Store for FlakyStore {
    async fn select(&self, c: Collection, q: &Query) -> Result<Vec<Row>, StoreError> {
      self.inner.select(c, q).await
    }
    async fn count(&self, c: Collection, q: &Query) -> Result<usize, StoreError> {
      self.inner.count(c, q).await
    }
    async fn insert(&self, c: Collection, row: Row) -> Result<Row, StoreError> {
      if self.failing.contains(&c) {
        return Err(StoreError::Transport(format!("{c} unavailable")));
      }
      self.inner.insert(c, row).await
    }
    async fn update(&self, c: Collection, f: &[Filter], patch: Row) -> Result<Vec<Row>, StoreError> {
      if self.frozen.contains(&c) {
        return Err(StoreError::Transport(format!("{c} is read-only")));
      }
      self.inner.update(c, f, patch).await
    }
    async fn delete(&self, c: Collection, f: &[Filter]) -> Result<Vec<Row>, StoreError> {
      self.inner.delete(c, f).await
    }
  }

  fn flaky_db(failing: &[Collection]) -> Db {
    Db::new(Arc::new(FlakyStore {
      inner: MemoryStore::new(),
      failing: failing.iter().copied().collect(),
      frozen: HashSet::new(),
    }))
  }

  fn frozen_db(frozen: &[Collection]) -> Db {
    Db::new(Arc::new(FlakyStore {
      inner: MemoryStore::new(),
      failing: HashSet::new(),
      frozen: frozen.iter().copied().collect(),
    }))
  }

  fn evaluator(db: &Db, llm: Arc<ScriptedLlm>, config: &AppConfig) -> Evaluator {
    Evaluator::new(db.clone(), Some(llm as Arc<dyn LlmGateway>), config)
  }

  fn free_will(answer: &str) -> EvaluationRequest {
    EvaluationRequest {
      question: "Is free will real?".into(),
      answer: answer.into(),
      user_id: Some("u1".into()),
      question_id: Some(1),
      answer_id: Some(7),
      ..Default::default()
    }
  }

  async fn logs_in(db: &Db) -> Vec<UsageLogEntry> {
    db.fetch(Collection::UsageLogs, &Query::new()).await.unwrap()
  }

  #[tokio::test]
  async fn success_returns_reply_and_logs_pending_to_success() {
    let db = Db::memory();
    let llm = Arc::new(ScriptedLlm::replying(GOOD_REPLY));
    let ev = evaluator(&db, llm.clone(), &AppConfig::default());

    let out = ev
      .evaluate(free_will("자유의지는 결정론과 양립할 수 있다. 왜냐하면 선택은 이유에 반응하기 때문이다."))
      .await
      .unwrap();

    assert_eq!(llm.calls(), 1);
    assert_eq!(out.evaluation, parse_evaluation(GOOD_REPLY).unwrap());
    assert_eq!(out.evaluation.score, 82);
    assert_eq!(out.evaluation.criteria_scores["논리적 사고"], 85);
    assert!(!out.rejected);
    assert!(out.score_warning.is_none());

    let logs = logs_in(&db).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, LogStatus::Success);
    assert_eq!(logs[0].score, Some(82));
    assert_eq!(logs[0].tokens_used, Some(321));
    assert_eq!(logs[0].response_text.as_deref(), Some(GOOD_REPLY));
    assert!(logs[0].prompt.contains("Is free will real?"));
    assert_eq!(out.log_id, Some(logs[0].id));

    let scores: Vec<Score> = db.fetch(Collection::Scores, &Query::new()).await.unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!((scores[0].answer_id, scores[0].score, scores[0].is_ai_score), (7, 82, true));
    assert_eq!(out.score_id, Some(scores[0].id));
  }

  #[tokio::test]
  async fn llm_failure_is_logged_and_surfaced_generically() {
    let db = Db::memory();
    let llm = Arc::new(ScriptedLlm::failing(LlmError::Api { status: 429, message: "rate limited".into() }));
    let ev = evaluator(&db, llm.clone(), &AppConfig::default());

    let err = ev.evaluate(free_will("평범한 서술형 답변입니다.")).await.unwrap_err();
    assert!(matches!(err, AppError::EvaluationFailed));
    assert!(!err.to_string().contains("rate limited"));

    let logs = logs_in(&db).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, LogStatus::Error);
    assert!(logs[0].error_message.as_deref().unwrap_or_default().contains("rate limited"));
    assert!(logs[0].response_time_ms.is_some());

    let scores: Vec<Score> = db.fetch(Collection::Scores, &Query::new()).await.unwrap();
    assert!(scores.is_empty());
  }

  #[tokio::test]
  async fn unparseable_replies_fail_the_attempt() {
    for reply in [
      "not json at all",
      r#"{"score":82,"feedback":"ok"}"#,
      r#"{"score":120,"feedback":"ok","criteriaScores":{}}"#,
      r#"{"score":82.5,"feedback":"ok","criteriaScores":{}}"#,
      "   ",
    ] {
      let db = Db::memory();
      let ev = evaluator(&db, Arc::new(ScriptedLlm::replying(reply)), &AppConfig::default());
      let err = ev.evaluate(free_will("서술형 답변")).await.unwrap_err();
      assert!(matches!(err, AppError::EvaluationFailed), "reply {reply:?}");
      assert_eq!(logs_in(&db).await[0].status, LogStatus::Error);
    }
  }

  #[tokio::test]
  async fn banned_glyphs_short_circuit_without_calls_or_writes() {
    for answer in ["• point one", "좋은 생각이에요 😀"] {
      let db = Db::memory();
      let llm = Arc::new(ScriptedLlm::replying(GOOD_REPLY));
      let ev = evaluator(&db, llm.clone(), &AppConfig::default());

      let out = ev.evaluate(free_will(answer)).await.unwrap();
      assert!(out.rejected);
      assert_eq!(out.evaluation.score, 0);
      assert_eq!(out.evaluation.feedback, Prompts::default().rejected_feedback);
      assert_eq!(out.evaluation.criteria_scores.len(), 3);
      assert!(DEFAULT_AXES.iter().all(|(a, _)| out.evaluation.criteria_scores[*a] == 0));
      assert_eq!(llm.calls(), 0);
      assert!(logs_in(&db).await.is_empty());
    }
  }

  #[tokio::test]
  async fn rejected_attempts_can_be_audited() {
    let db = Db::memory();
    let mut config = AppConfig::default();
    config.evaluation.log_rejected_attempts = true;
    let llm = Arc::new(ScriptedLlm::replying(GOOD_REPLY));
    let ev = evaluator(&db, llm.clone(), &config);

    let mut req = free_will("• 첫째");
    req.criteria = Some(vec!["논증".into(), "표현".into()]);
    let out = ev.evaluate(req).await.unwrap();

    assert_eq!(llm.calls(), 0);
    assert_eq!(out.evaluation.criteria_scores.keys().collect::<Vec<_>>(), vec!["논증", "표현"]);
    let logs = logs_in(&db).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, LogStatus::Error);
    assert!(logs[0].error_message.as_deref().unwrap_or_default().starts_with("rejected by pre-check"));
    assert_eq!(out.log_id, Some(logs[0].id));
  }

  #[tokio::test]
  async fn failed_pending_write_means_no_model_call() {
    let db = flaky_db(&[Collection::UsageLogs]);
    let llm = Arc::new(ScriptedLlm::replying(GOOD_REPLY));
    let ev = evaluator(&db, llm.clone(), &AppConfig::default());

    let err = ev.evaluate(free_will("서술형 답변")).await.unwrap_err();
    assert!(matches!(err, AppError::Store(_)));
    assert_eq!(llm.calls(), 0);
  }

  #[tokio::test]
  async fn failed_success_transition_is_a_store_error_and_leaves_pending() {
    let db = frozen_db(&[Collection::UsageLogs]);
    let llm = Arc::new(ScriptedLlm::replying(GOOD_REPLY));
    let ev = evaluator(&db, llm.clone(), &AppConfig::default());

    let err = ev.evaluate(free_will("서술형 답변")).await.unwrap_err();
    assert!(matches!(err, AppError::Store(StoreError::Transport(_))));
    assert_eq!(llm.calls(), 1);

    let logs = logs_in(&db).await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].status, LogStatus::Pending);
    let scores: Vec<Score> = db.fetch(Collection::Scores, &Query::new()).await.unwrap();
    assert!(scores.is_empty());
  }

  #[tokio::test]
  async fn failed_score_insert_keeps_the_result() {
    let db = flaky_db(&[Collection::Scores]);
    let ev = evaluator(&db, Arc::new(ScriptedLlm::replying(GOOD_REPLY)), &AppConfig::default());

    let out = ev.evaluate(free_will("서술형 답변")).await.unwrap();
    assert_eq!(out.evaluation.score, 82);
    assert!(out.score_id.is_none());
    assert!(out.score_warning.as_deref().unwrap_or_default().contains("score was not saved"));
    assert_eq!(logs_in(&db).await[0].status, LogStatus::Success);
  }

  #[tokio::test]
  async fn missing_model_is_unavailable_and_blank_input_is_invalid() {
    let db = Db::memory();
    let ev = Evaluator::new(db.clone(), None, &AppConfig::default());
    assert!(matches!(ev.evaluate(free_will("답변")).await, Err(AppError::LlmUnavailable)));
    assert!(matches!(ev.evaluate(free_will("  ")).await, Err(AppError::InvalidInput(_))));
    assert!(logs_in(&db).await.is_empty());
  }

  #[tokio::test]
  async fn stored_answers_use_their_question_criteria() {
    let db = Db::memory();
    let _: serde_json::Value = db
      .insert(
        Collection::Questions,
        &serde_json::json!({ "prompt": "정의란 무엇인가?", "evaluation_criteria": ["명료성", "근거"] }),
      )
      .await
      .unwrap();
    let _: serde_json::Value = db
      .insert(Collection::Answers, &serde_json::json!({ "user_id": "u9", "question_id": 1, "content": "정의는 공정이다." }))
      .await
      .unwrap();
    let llm = Arc::new(ScriptedLlm::default());
    llm.push(Ok(Generation {
      text: r#"{"score":70,"feedback":"a. b.","criteriaScores":{"명료성":70,"근거":70}}"#.into(),
      total_tokens: None,
    }));
    let ev = evaluator(&db, llm.clone(), &AppConfig::default());

    let out = ev.evaluate_stored_answer(1).await.unwrap();
    assert_eq!(out.evaluation.score, 70);
    let prompt = llm.last_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("1. 명료성\n2. 근거"));
    assert!(prompt.contains(r#"{ "명료성": 점수, "근거": 점수 }"#));

    let logs = logs_in(&db).await;
    assert_eq!((logs[0].user_id.as_deref(), logs[0].answer_id), (Some("u9"), Some(1)));
    assert!(matches!(ev.evaluate_stored_answer(99).await, Err(AppError::NotFound(_))));
  }

  #[test]
  fn rubric_prompt_embeds_text_verbatim() {
    let p = build_prompt(&Prompts::default(), "질문 {answer}", "답변 \"인용\"", None);
    assert!(p.contains("**질문**: 질문 {answer}"));
    assert!(p.contains("**답변**: 답변 \"인용\""));
    assert!(p.contains("논리적 사고"));
  }

  #[test]
  fn weighted_total_rounds() {
    let scores: CriteriaScores =
      [("논리적 사고", 85), ("창의적 사고", 75), ("일관성", 85)].into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    // 34 + 22.5 + 25.5
    assert_eq!(weighted_total(&scores), 82);
  }
}
