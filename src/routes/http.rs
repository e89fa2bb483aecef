//! HTTP endpoint handlers. These are thin wrappers that forward to the services on `AppState`.
//! Each handler is instrumented and logs its parameters and basic result info.

use std::sync::Arc;

use axum::{
  extract::{Path, Query, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
  Json,
};
use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{Answer, LogStatus, Profile, Question, Score, UsageLogEntry};
use crate::error::AppError;
use crate::evaluation::{EvaluationOutcome, EvaluationRequest};
use crate::forum::{CommentView, ForumPost, LikeState, NewComment, NewPost, PostDetail, PostFilter, PostPatch, PostSummary};
use crate::protocol::*;
use crate::ranking::{QuestionRankingUser, RankingStats, RankingUser, UserRank};
use crate::records::{NewAnswer, NewProfile, NewQuestion, NewScore, ProfilePatch, QuestionPatch};
use crate::state::AppState;
use crate::usage_log::{StatsFilter, UsageLogView, UsageStats};

pub const USER_HEADER: &str = "x-user-id";

type ApiResult<T> = Result<Json<T>, AppError>;

/// Caller identity set by the upstream auth layer.
pub fn caller_id(headers: &HeaderMap) -> Result<String, AppError> {
  optional_caller_id(headers)?.ok_or_else(|| AppError::Unauthorized(format!("missing {USER_HEADER} header")))
}

fn optional_caller_id(headers: &HeaderMap) -> Result<Option<String>, AppError> {
  let Some(raw) = headers.get(USER_HEADER) else {
    return Ok(None);
  };
  let raw = raw
    .to_str()
    .map_err(|_| AppError::InvalidInput(format!("{USER_HEADER} is not valid text")))?;
  Uuid::parse_str(raw.trim())
    .map(|id| Some(id.to_string()))
    .map_err(|_| AppError::InvalidInput(format!("{USER_HEADER} is not a UUID")))
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, evaluation_enabled: state.evaluator.is_enabled() })
}

// --- evaluation ---

#[instrument(level = "info", skip_all, fields(question_id = ?body.question_id, answer_len = body.answer.len()))]
pub async fn http_post_evaluate(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<EvaluateIn>,
) -> ApiResult<EvaluationOutcome> {
  let user_id = optional_caller_id(&headers)?;
  let out = state
    .evaluator
    .evaluate(EvaluationRequest {
      question: body.question,
      answer: body.answer,
      criteria: body.criteria,
      user_id,
      question_id: body.question_id,
      answer_id: body.answer_id,
    })
    .await?;
  info!(target: "evaluation", score = out.evaluation.score, rejected = out.rejected, "HTTP evaluate done");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_post_answer_evaluate(
  State(state): State<Arc<AppState>>,
  Path(id): Path<i64>,
) -> ApiResult<EvaluationOutcome> {
  let out = state.evaluator.evaluate_stored_answer(id).await?;
  info!(target: "evaluation", answer_id = id, score = out.evaluation.score, "HTTP stored answer evaluated");
  Ok(Json(out))
}

// --- questions ---

#[instrument(level = "info", skip(state))]
pub async fn http_list_questions(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Question>> {
  Ok(Json(state.records.active_questions().await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_question(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<Question> {
  Ok(Json(state.records.question(id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_todays_question(State(state): State<Arc<AppState>>) -> ApiResult<Question> {
  let q = state.records.todays_question(Utc::now().date_naive()).await?;
  info!(target: "thinkscore", id = q.id, "HTTP today's question served");
  Ok(Json(q))
}

#[instrument(level = "info", skip(state))]
pub async fn http_random_question(State(state): State<Arc<AppState>>) -> ApiResult<Question> {
  Ok(Json(state.records.random_question().await?))
}

#[instrument(level = "info", skip_all)]
pub async fn http_create_question(
  State(state): State<Arc<AppState>>,
  Json(body): Json<NewQuestion>,
) -> Result<(StatusCode, Json<Question>), AppError> {
  let q = state.records.create_question(body).await?;
  Ok((StatusCode::CREATED, Json(q)))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_update_question(
  State(state): State<Arc<AppState>>,
  Path(id): Path<i64>,
  Json(body): Json<QuestionPatch>,
) -> ApiResult<Question> {
  Ok(Json(state.records.update_question(id, body).await?))
}

// --- answers ---

#[instrument(level = "info", skip_all, fields(question_id = body.question_id, content_len = body.content.len()))]
pub async fn http_create_answer(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<AnswerIn>,
) -> Result<(StatusCode, Json<Answer>), AppError> {
  let user_id = optional_caller_id(&headers)?;
  let answer = state
    .records
    .create_answer(NewAnswer { user_id, question_id: body.question_id, content: body.content })
    .await?;
  Ok((StatusCode::CREATED, Json(answer)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_answer(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<Answer> {
  Ok(Json(state.records.answer(id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_answers_by_user(
  State(state): State<Arc<AppState>>,
  Path(user_id): Path<String>,
) -> ApiResult<Vec<Answer>> {
  Ok(Json(state.records.answers_by_user(&user_id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_answers_by_question(
  State(state): State<Arc<AppState>>,
  Path(question_id): Path<i64>,
) -> ApiResult<Vec<Answer>> {
  Ok(Json(state.records.answers_by_question(question_id).await?))
}

// --- scores ---

#[instrument(level = "info", skip(state))]
pub async fn http_get_score(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<Score> {
  Ok(Json(state.records.score(id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_scores_by_answer(
  State(state): State<Arc<AppState>>,
  Path(answer_id): Path<i64>,
) -> ApiResult<Vec<Score>> {
  Ok(Json(state.records.scores_by_answer(answer_id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_scores_by_user(
  State(state): State<Arc<AppState>>,
  Path(user_id): Path<String>,
) -> ApiResult<Vec<Score>> {
  Ok(Json(state.records.scores_by_user(&user_id).await?))
}

#[instrument(level = "info", skip_all, fields(answer_id = body.answer_id, score = body.score))]
pub async fn http_create_score(
  State(state): State<Arc<AppState>>,
  Json(body): Json<NewScore>,
) -> Result<(StatusCode, Json<Score>), AppError> {
  let score = state.records.create_score(body).await?;
  Ok((StatusCode::CREATED, Json(score)))
}

// --- profiles ---

#[instrument(level = "info", skip(state))]
pub async fn http_get_profile(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult<Profile> {
  Ok(Json(state.records.profile(&id).await?))
}

#[instrument(level = "info", skip_all, fields(id = %body.id))]
pub async fn http_create_profile(
  State(state): State<Arc<AppState>>,
  Json(body): Json<NewProfile>,
) -> Result<(StatusCode, Json<Profile>), AppError> {
  let profile = state.records.create_profile(body).await?;
  Ok((StatusCode::CREATED, Json(profile)))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_update_profile(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<ProfilePatch>,
) -> ApiResult<Profile> {
  Ok(Json(state.records.update_profile(&id, body).await?))
}

// --- rankings ---

#[instrument(level = "info", skip(state))]
pub async fn http_overall_rankings(
  State(state): State<Arc<AppState>>,
  Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<RankingUser>> {
  let limit = q.limit.unwrap_or(DEFAULT_RANKING_LIMIT);
  let board = state.rankings.overall(limit).await?;
  info!(target: "ranking", limit, rows = board.len(), "HTTP overall rankings served");
  Ok(Json(board))
}

#[instrument(level = "info", skip(state))]
pub async fn http_question_rankings(
  State(state): State<Arc<AppState>>,
  Path(question_id): Path<i64>,
  Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<QuestionRankingUser>> {
  let limit = q.limit.unwrap_or(DEFAULT_RANKING_LIMIT);
  Ok(Json(state.rankings.for_question(question_id, limit).await?))
}

#[instrument(level = "info", skip_all)]
pub async fn http_my_overall_rank(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult<UserRank> {
  let user_id = caller_id(&headers)?;
  Ok(Json(state.rankings.my_overall_rank(&user_id).await?))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_my_question_rank(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(question_id): Path<i64>,
) -> ApiResult<UserRank> {
  let user_id = caller_id(&headers)?;
  Ok(Json(state.rankings.my_question_rank(&user_id, question_id).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_ranking_stats(State(state): State<Arc<AppState>>) -> ApiResult<RankingStats> {
  Ok(Json(state.rankings.stats().await?))
}

// --- usage logs ---

#[instrument(level = "info", skip(state, headers))]
pub async fn http_my_logs(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Query(q): Query<PageQuery>,
) -> ApiResult<Vec<UsageLogView>> {
  let user_id = caller_id(&headers)?;
  let logs = state
    .logs
    .by_user(&user_id, q.limit.unwrap_or(DEFAULT_LOG_PAGE), q.offset.unwrap_or(0))
    .await?;
  Ok(Json(logs))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_my_stats(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Query(q): Query<DateRangeQuery>,
) -> ApiResult<UsageStats> {
  let user_id = caller_id(&headers)?;
  let (start, end) = q.bounds()?;
  Ok(Json(state.logs.stats(&StatsFilter { user_id: Some(user_id), start, end }).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_system_stats(
  State(state): State<Arc<AppState>>,
  Query(q): Query<DateRangeQuery>,
) -> ApiResult<UsageStats> {
  let (start, end) = q.bounds()?;
  Ok(Json(state.logs.stats(&StatsFilter { user_id: None, start, end }).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_error_logs(
  State(state): State<Arc<AppState>>,
  Query(q): Query<LimitQuery>,
) -> ApiResult<Vec<UsageLogEntry>> {
  let limit = q.limit.unwrap_or(DEFAULT_ERROR_LIMIT);
  Ok(Json(state.logs.by_status(LogStatus::Error, limit).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_cleanup_logs(State(state): State<Arc<AppState>>, Path(days): Path<String>) -> ApiResult<CleanupOut> {
  let days: i64 = days
    .trim()
    .parse()
    .map_err(|_| AppError::InvalidInput(format!("days must be a positive integer, got {days:?}")))?;
  let deleted_count = state.logs.cleanup_older_than(days).await?;
  Ok(Json(CleanupOut {
    message: format!("Successfully deleted {deleted_count} log entries older than {days} days"),
    deleted_count,
  }))
}

// --- forum ---

#[instrument(level = "info", skip(state))]
pub async fn http_forum_posts(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ForumListQuery>,
) -> ApiResult<Vec<PostSummary>> {
  let filter = PostFilter {
    category: q.category,
    question_id: q.question_id,
    sort: q.sort,
    limit: q.limit.unwrap_or(DEFAULT_FORUM_PAGE),
  };
  Ok(Json(state.forum.posts(&filter).await?))
}

#[instrument(level = "info", skip_all, fields(title_len = body.title.len()))]
pub async fn http_create_forum_post(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<NewPost>,
) -> Result<(StatusCode, Json<ForumPost>), AppError> {
  let author = caller_id(&headers)?;
  let post = state.forum.create_post(body, &author).await?;
  Ok((StatusCode::CREATED, Json(post)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_forum_post(State(state): State<Arc<AppState>>, Path(id): Path<i64>) -> ApiResult<PostDetail> {
  Ok(Json(state.forum.post(id).await?))
}

#[instrument(level = "info", skip(state, headers, body))]
pub async fn http_update_forum_post(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(id): Path<i64>,
  Json(body): Json<PostPatch>,
) -> ApiResult<ForumPost> {
  let author = caller_id(&headers)?;
  Ok(Json(state.forum.update_post(id, body, &author).await?))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_delete_forum_post(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(id): Path<i64>,
) -> ApiResult<DeletedOut> {
  let author = caller_id(&headers)?;
  state.forum.delete_post(id, &author).await?;
  Ok(Json(DeletedOut { success: true }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_forum_comments(
  State(state): State<Arc<AppState>>,
  Path(id): Path<i64>,
) -> ApiResult<Vec<CommentView>> {
  Ok(Json(state.forum.comments(id).await?))
}

#[instrument(level = "info", skip_all, fields(post_id = body.post_id))]
pub async fn http_create_forum_comment(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<NewComment>,
) -> Result<(StatusCode, Json<CommentView>), AppError> {
  let author = caller_id(&headers)?;
  let comment = state.forum.create_comment(body, &author).await?;
  Ok((StatusCode::CREATED, Json(comment)))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_toggle_forum_like(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(id): Path<i64>,
) -> ApiResult<LikeState> {
  let user_id = caller_id(&headers)?;
  let like = state.forum.toggle_like(id, &user_id).await?;
  info!(target: "forum", post_id = id, liked = like.liked, likes = like.likes_count, "HTTP like toggled");
  Ok(Json(like))
}
