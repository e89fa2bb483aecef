//! Router assembly: HTTP endpoints, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    http::HeaderValue,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{warn, Level};

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - REST-ish API under `/api/v1/...`
/// - CORS (origins from `CORS_ORIGINS`, any origin when unset)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(http::http_health))
        // evaluation
        .route("/api/v1/evaluate", post(http::http_post_evaluate))
        .route("/api/v1/answers/:id/evaluate", post(http::http_post_answer_evaluate))
        // questions
        .route("/api/v1/questions", get(http::http_list_questions).post(http::http_create_question))
        .route("/api/v1/questions/today", get(http::http_todays_question))
        .route("/api/v1/questions/random", get(http::http_random_question))
        .route("/api/v1/questions/:id", get(http::http_get_question).put(http::http_update_question))
        // answers
        .route("/api/v1/answers", post(http::http_create_answer))
        .route("/api/v1/answers/:id", get(http::http_get_answer))
        .route("/api/v1/answers/user/:user_id", get(http::http_answers_by_user))
        .route("/api/v1/answers/question/:question_id", get(http::http_answers_by_question))
        // scores
        .route("/api/v1/scores", post(http::http_create_score))
        .route("/api/v1/scores/:id", get(http::http_get_score))
        .route("/api/v1/scores/answer/:answer_id", get(http::http_scores_by_answer))
        .route("/api/v1/scores/user/:user_id", get(http::http_scores_by_user))
        // profiles
        .route("/api/v1/profiles", post(http::http_create_profile))
        .route("/api/v1/profiles/:id", get(http::http_get_profile).put(http::http_update_profile))
        // rankings
        .route("/api/v1/rankings/overall", get(http::http_overall_rankings))
        .route("/api/v1/rankings/question/:question_id", get(http::http_question_rankings))
        .route("/api/v1/rankings/my-rank/overall", get(http::http_my_overall_rank))
        .route("/api/v1/rankings/my-rank/question/:question_id", get(http::http_my_question_rank))
        .route("/api/v1/rankings/stats", get(http::http_ranking_stats))
        // usage logs
        .route("/api/v1/openai-logs/my-logs", get(http::http_my_logs))
        .route("/api/v1/openai-logs/my-stats", get(http::http_my_stats))
        .route("/api/v1/openai-logs/system-stats", get(http::http_system_stats))
        .route("/api/v1/openai-logs/errors", get(http::http_error_logs))
        .route("/api/v1/openai-logs/cleanup/:days", delete(http::http_cleanup_logs))
        // forum
        .route("/api/v1/forum/posts", get(http::http_forum_posts).post(http::http_create_forum_post))
        .route(
            "/api/v1/forum/posts/:id",
            get(http::http_forum_post).patch(http::http_update_forum_post).delete(http::http_delete_forum_post),
        )
        .route("/api/v1/forum/posts/:id/comments", get(http::http_forum_comments))
        .route("/api/v1/forum/posts/:id/like", post(http::http_toggle_forum_like))
        .route("/api/v1/forum/comments", post(http::http_create_forum_comment))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(cors_layer(std::env::var("CORS_ORIGINS").ok().as_deref()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Comma separated origins; unset, empty or `*` allows any origin.
fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    let raw = origins.map(str::trim).unwrap_or("");
    if raw.is_empty() || raw == "*" {
        return base.allow_origin(Any);
    }
    let list: Vec<HeaderValue> = raw
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(target: "thinkscore", origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(list))
}
