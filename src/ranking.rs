//! Leaderboards and individual standing.
//!
//! Every operation is a handful of bulk reads followed by an in-memory
//! reduction; nothing here writes. Equal scores are ordered deterministically:
//!   - overall: equal averages go to the user whose first scored answer is older, then by user id
//!   - per question: equal scores go to the older score row
//!   - top scorer: equal totals go to the older profile

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::{Profile, Score};
use crate::error::AppError;
use crate::store::{Collection, Db, Embed, Query};
use crate::util::round2;

/// Profile exists but has no display name.
pub const HIDDEN_NAME: &str = "비공개";
/// No profile row for the user.
pub const GUEST_NAME: &str = "비회원";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankingUser {
    pub id: String,
    pub display_name: String,
    pub total_score: i64,
    pub average_score: f64,
    pub answer_count: usize,
    pub rank_position: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionRankingUser {
    pub id: Option<String>,
    pub display_name: String,
    pub question_score: i64,
    pub question_answer_count: usize,
    /// Always 0 here; callers fill it in if they need it.
    pub total_score: i64,
    pub rank_position: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserRank {
    pub rank_position: usize,
    pub total_users: usize,
    pub user_score: i64,
    pub percentile: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankingStats {
    pub total_users: usize,
    pub total_answers: usize,
    pub average_score: f64,
    pub top_scorer_name: Option<String>,
    pub top_score: Option<i64>,
}

/// A score row with its answer's owner embedded.
#[derive(Clone, Debug, Deserialize)]
struct ScoreWithAnswer {
    score: i64,
    created_at: DateTime<Utc>,
    answers: AnswerOwner,
}

#[derive(Clone, Debug, Deserialize)]
struct AnswerOwner {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

/// One scored answer attributed to a user.
#[derive(Clone, Debug)]
pub struct UserScore {
    pub user_id: String,
    pub score: i64,
    pub answered_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Rankings {
    db: Db,
}

impl Rankings {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn overall(&self, limit: usize) -> Result<Vec<RankingUser>, AppError> {
        let query = Query::new().embed(Embed::inner(Collection::Answers, "answer_id", &["user_id", "created_at"]));
        let scores: Vec<ScoreWithAnswer> = self.db.fetch(Collection::Scores, &query).await?;
        let profiles: Vec<Profile> = self.db.fetch(Collection::Profiles, &Query::new()).await?;

        let rows: Vec<UserScore> = scores
            .iter()
            .filter_map(|s| {
                Some(UserScore {
                    user_id: s.answers.user_id.clone()?,
                    score: s.score,
                    answered_at: s.answers.created_at.unwrap_or(s.created_at),
                })
            })
            .collect();
        debug!(target: "ranking", scores = scores.len(), attributed = rows.len(), profiles = profiles.len(), "overall inputs");

        Ok(rank_overall(&rows, &profile_names(&profiles), limit))
    }

    #[instrument(level = "info", skip(self))]
    pub async fn for_question(&self, question_id: i64, limit: usize) -> Result<Vec<QuestionRankingUser>, AppError> {
        let query = Query::new()
            .embed(Embed::inner(Collection::Answers, "answer_id", &["user_id"]).eq("question_id", question_id))
            .order("score", false)
            .order("created_at", true)
            .limit(limit);
        let scores: Vec<ScoreWithAnswer> = self.db.fetch(Collection::Scores, &query).await?;

        let user_ids: HashSet<String> = scores.iter().filter_map(|s| s.answers.user_id.clone()).collect();
        let profiles: Vec<Profile> = if user_ids.is_empty() {
            Vec::new()
        } else {
            self.db
                .fetch(Collection::Profiles, &Query::new().is_in("id", user_ids))
                .await?
        };
        let names = profile_names(&profiles);

        Ok(scores
            .into_iter()
            .enumerate()
            .map(|(i, s)| QuestionRankingUser {
                display_name: display_name(&names, s.answers.user_id.as_deref()),
                id: s.answers.user_id,
                question_score: s.score,
                question_answer_count: 1,
                total_score: 0,
                rank_position: i + 1,
            })
            .collect())
    }

    /// Rank by profile total_score among all profiles.
    #[instrument(level = "info", skip(self))]
    pub async fn my_overall_rank(&self, user_id: &str) -> Result<UserRank, AppError> {
        let me: Profile = self
            .db
            .fetch_optional(Collection::Profiles, Query::new().eq("id", user_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {user_id}")))?;
        let higher = self
            .db
            .count_matching(Collection::Profiles, &Query::new().gt("total_score", me.total()))
            .await?;
        let total = self.db.count(Collection::Profiles, &[]).await?;
        Ok(user_rank(higher, total, me.total()))
    }

    /// Rank of the caller's best score on a question among all score rows for it.
    #[instrument(level = "info", skip(self))]
    pub async fn my_question_rank(&self, user_id: &str, question_id: i64) -> Result<UserRank, AppError> {
        let on_question =
            || Embed::inner(Collection::Answers, "answer_id", &["question_id", "user_id"]).eq("question_id", question_id);

        let best: Option<Score> = self
            .db
            .fetch_optional(
                Collection::Scores,
                Query::new().embed(on_question().eq("user_id", user_id)).order("score", false),
            )
            .await?;
        let best = best
            .ok_or_else(|| AppError::NotFound(format!("no score for user {user_id} on question {question_id}")))?
            .score;

        let higher = self
            .db
            .count_matching(Collection::Scores, &Query::new().embed(on_question()).gt("score", best))
            .await?;
        let total = self
            .db
            .count_matching(Collection::Scores, &Query::new().embed(on_question()))
            .await?;
        Ok(user_rank(higher, total, best))
    }

    #[instrument(level = "info", skip(self))]
    pub async fn stats(&self) -> Result<RankingStats, AppError> {
        let profiles: Vec<Profile> = self.db.fetch(Collection::Profiles, &Query::new()).await?;
        let total_answers = self.db.count(Collection::Answers, &[]).await?;
        Ok(summarize_profiles(&profiles, total_answers))
    }
}

/// `round(((total - rank) / total) * 100, 2)`; 0 when there is nobody to compare against.
pub fn percentile(rank: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2((total as f64 - rank as f64) / total as f64 * 100.0)
}

fn user_rank(higher: usize, total: usize, user_score: i64) -> UserRank {
    let rank_position = higher + 1;
    let total_users = total.max(1);
    UserRank {
        rank_position,
        total_users,
        user_score,
        percentile: percentile(rank_position, total_users),
    }
}

/// id → display name, `None` when the profile exists without a name.
fn profile_names(profiles: &[Profile]) -> HashMap<String, Option<String>> {
    profiles
        .iter()
        .map(|p| {
            let name = p.display_name.clone().filter(|n| !n.trim().is_empty());
            (p.id.clone(), name)
        })
        .collect()
}

fn display_name(names: &HashMap<String, Option<String>>, user_id: Option<&str>) -> String {
    match user_id.and_then(|id| names.get(id)) {
        Some(Some(name)) => name.clone(),
        Some(None) => HIDDEN_NAME.to_string(),
        None => GUEST_NAME.to_string(),
    }
}

/// Group by user, rank by average score, cap at `limit`.
pub fn rank_overall(
    rows: &[UserScore],
    names: &HashMap<String, Option<String>>,
    limit: usize,
) -> Vec<RankingUser> {
    struct Acc {
        total: i64,
        count: usize,
        first_answer: DateTime<Utc>,
    }

    let mut per_user: HashMap<&str, Acc> = HashMap::new();
    for row in rows {
        let acc = per_user.entry(row.user_id.as_str()).or_insert(Acc {
            total: 0,
            count: 0,
            first_answer: row.answered_at,
        });
        acc.total += row.score;
        acc.count += 1;
        acc.first_answer = acc.first_answer.min(row.answered_at);
    }

    let mut ranked: Vec<(&str, Acc, f64)> = per_user
        .into_iter()
        .map(|(id, acc)| {
            let avg = acc.total as f64 / acc.count as f64;
            (id, acc, avg)
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(Ordering::Equal)
            .then(a.1.first_answer.cmp(&b.1.first_answer))
            .then(a.0.cmp(b.0))
    });

    ranked
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(i, (id, acc, avg))| RankingUser {
            id: id.to_string(),
            display_name: display_name(names, Some(id)),
            total_score: acc.total,
            average_score: avg,
            answer_count: acc.count,
            rank_position: i + 1,
        })
        .collect()
}

pub fn summarize_profiles(profiles: &[Profile], total_answers: usize) -> RankingStats {
    let positive: Vec<i64> = profiles.iter().map(Profile::total).filter(|&t| t > 0).collect();
    let average_score = if positive.is_empty() {
        0.0
    } else {
        round2(positive.iter().sum::<i64>() as f64 / positive.len() as f64)
    };
    let top = profiles
        .iter()
        .min_by(|a, b| b.total().cmp(&a.total()).then(a.created_at.cmp(&b.created_at)));

    RankingStats {
        total_users: profiles.len(),
        total_answers,
        average_score,
        top_scorer_name: top.map(|p| {
            p.display_name
                .clone()
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| HIDDEN_NAME.to_string())
        }),
        top_score: top.map(Profile::total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z").unwrap().with_timezone(&Utc) + Duration::minutes(minutes)
    }

    fn row(user: &str, score: i64, minute: i64) -> UserScore {
        UserScore { user_id: user.into(), score, answered_at: at(minute) }
    }

    async fn put(db: &Db, c: Collection, v: serde_json::Value) -> i64 {
        let row: serde_json::Value = db.insert(c, &v).await.unwrap();
        row["id"].as_i64().unwrap_or_default()
    }

    #[test]
    fn percentile_examples() {
        assert_eq!(percentile(1, 4), 75.0);
        assert_eq!(percentile(4, 4), 0.0);
        assert_eq!(percentile(1, 3), 66.67);
        assert_eq!(percentile(1, 0), 0.0);
    }

    #[test]
    fn overall_sorts_by_average_not_total() {
        let rows = vec![
            row("a", 50, 0),
            row("a", 50, 1),
            row("a", 50, 2),
            row("b", 90, 3),
            row("c", 70, 4),
            row("c", 80, 5),
        ];
        let names: HashMap<String, Option<String>> =
            [("a".to_string(), Some("Ann".to_string())), ("b".to_string(), None)].into_iter().collect();

        let out = rank_overall(&rows, &names, 10);
        let order: Vec<&str> = out.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(out.iter().map(|u| u.rank_position).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(out[1].average_score, 75.0);
        assert_eq!(out[2].total_score, 150);
        assert_eq!(out[2].answer_count, 3);
        assert_eq!(out[0].display_name, HIDDEN_NAME);
        assert_eq!(out[1].display_name, GUEST_NAME);
        assert_eq!(out[2].display_name, "Ann");

        assert_eq!(rank_overall(&rows, &names, 2).len(), 2);
        assert!(rank_overall(&[], &names, 10).is_empty());
    }

    #[test]
    fn overall_ties_prefer_the_earlier_first_answer() {
        let rows = vec![row("late", 80, 10), row("early", 80, 1), row("zed", 80, 1)];
        let out = rank_overall(&rows, &HashMap::new(), 10);
        let order: Vec<&str> = out.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(order, vec!["early", "zed", "late"]);
    }

    #[test]
    fn stats_on_empty_profiles_are_zeroed() {
        let s = summarize_profiles(&[], 0);
        assert_eq!(s.total_users, 0);
        assert_eq!(s.average_score, 0.0);
        assert!(s.top_scorer_name.is_none());
        assert!(s.top_score.is_none());
    }

    #[tokio::test]
    async fn stats_average_only_positive_totals() {
        let db = Db::memory();
        put(&db, Collection::Profiles, json!({ "id": "p1", "display_name": "A", "total_score": 90 })).await;
        put(&db, Collection::Profiles, json!({ "id": "p2", "total_score": 95 })).await;
        put(&db, Collection::Profiles, json!({ "id": "p3", "display_name": "C", "total_score": 0 })).await;
        put(&db, Collection::Answers, json!({ "question_id": 1, "content": "x" })).await;

        let s = Rankings::new(db).stats().await.unwrap();
        assert_eq!(s.total_users, 3);
        assert_eq!(s.total_answers, 1);
        assert_eq!(s.average_score, 92.5);
        assert_eq!(s.top_scorer_name.as_deref(), Some(HIDDEN_NAME));
        assert_eq!(s.top_score, Some(95));
    }

    #[tokio::test]
    async fn my_overall_rank_counts_strictly_higher_totals() {
        let db = Db::memory();
        for (id, total) in [("a", 300), ("b", 200), ("c", 200), ("d", 100)] {
            put(&db, Collection::Profiles, json!({ "id": id, "total_score": total })).await;
        }
        let rankings = Rankings::new(db);

        let top = rankings.my_overall_rank("a").await.unwrap();
        assert_eq!(top, UserRank { rank_position: 1, total_users: 4, user_score: 300, percentile: 75.0 });

        let tied = rankings.my_overall_rank("c").await.unwrap();
        assert_eq!((tied.rank_position, tied.percentile), (2, 50.0));

        assert!(matches!(rankings.my_overall_rank("ghost").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn question_rankings_and_my_question_rank() {
        let db = Db::memory();
        put(&db, Collection::Profiles, json!({ "id": "u1", "display_name": "하나" })).await;
        put(&db, Collection::Profiles, json!({ "id": "u2" })).await;
        let a1 = put(&db, Collection::Answers, json!({ "user_id": "u1", "question_id": 5, "content": "x" })).await;
        let a2 = put(&db, Collection::Answers, json!({ "user_id": "u2", "question_id": 5, "content": "y" })).await;
        let a3 = put(&db, Collection::Answers, json!({ "question_id": 5, "content": "anon" })).await;
        let other = put(&db, Collection::Answers, json!({ "user_id": "u1", "question_id": 6, "content": "z" })).await;
        put(&db, Collection::Scores, json!({ "answer_id": a1, "score": 70, "created_at": at(1) })).await;
        put(&db, Collection::Scores, json!({ "answer_id": a2, "score": 90, "created_at": at(2) })).await;
        put(&db, Collection::Scores, json!({ "answer_id": a3, "score": 70, "created_at": at(0) })).await;
        put(&db, Collection::Scores, json!({ "answer_id": other, "score": 100 })).await;

        let rankings = Rankings::new(db);
        let board = rankings.for_question(5, 10).await.unwrap();
        assert_eq!(board.len(), 3);
        assert_eq!((board[0].id.as_deref(), board[0].question_score), (Some("u2"), 90));
        assert_eq!(board[0].display_name, HIDDEN_NAME);
        // tie at 70: the older score row first
        assert_eq!((board[1].id.as_deref(), board[1].display_name.as_str()), (None, GUEST_NAME));
        assert_eq!(board[2].display_name, "하나");
        assert!(board.iter().all(|r| r.total_score == 0 && r.question_answer_count == 1));
        assert_eq!(rankings.for_question(5, 1).await.unwrap().len(), 1);
        assert!(rankings.for_question(404, 10).await.unwrap().is_empty());

        let mine = rankings.my_question_rank("u1", 5).await.unwrap();
        assert_eq!(mine, UserRank { rank_position: 2, total_users: 3, user_score: 70, percentile: 33.33 });
        assert!(matches!(rankings.my_question_rank("u2", 6).await, Err(AppError::NotFound(_))));
    }
}
