//! Discussion forum: posts, comments and likes.
//!
//! Writes that touch an existing post check the caller against `author_id`.
//! A post may hang off a question; that needs the question's forum to be open
//! (`forum_enabled`, set by the daily publish job).
//!
//! `likes_count` is recomputed from `forum_likes` after each toggle rather than
//! incremented, so concurrent toggles converge on the real count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::domain::{ProfileBrief, Question};
use crate::error::AppError;
use crate::store::{Collection, Db, Embed, Query};

pub const DEFAULT_CATEGORY: &str = "free";
/// Category value that disables the category filter.
pub const ALL_CATEGORIES: &str = "all";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ForumPost {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author_id: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub question_id: Option<i64>,
    #[serde(default)]
    pub views_count: i64,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ForumComment {
    pub id: i64,
    pub post_id: i64,
    pub content: String,
    pub author_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Post as listed: author embedded, comment count attached.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: ForumPost,
    #[serde(default, alias = "profiles")]
    pub author: Option<ProfileBrief>,
    #[serde(default)]
    pub comments_count: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: ForumComment,
    #[serde(default, alias = "profiles")]
    pub author: Option<ProfileBrief>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: ForumPost,
    pub author: Option<ProfileBrief>,
    pub comments: Vec<CommentView>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub question_id: Option<i64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PostPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewComment {
    pub post_id: i64,
    pub content: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSort {
    Recent,
    Popular,
    #[default]
    All,
}

#[derive(Clone, Debug, Default)]
pub struct PostFilter {
    pub category: Option<String>,
    pub question_id: Option<i64>,
    pub sort: PostSort,
    pub limit: usize,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LikeState {
    pub liked: bool,
    pub likes_count: i64,
}

#[derive(Clone)]
pub struct Forum {
    db: Db,
}

impl Forum {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    #[instrument(level = "info", skip(self, new), fields(question_id = ?new.question_id))]
    pub async fn create_post(&self, new: NewPost, author_id: &str) -> Result<ForumPost, AppError> {
        let title = required("title", &new.title)?;
        let content = required("content", &new.content)?;
        if let Some(question_id) = new.question_id {
            let question: Question = self
                .db
                .fetch_one(Collection::Questions, Query::new().eq("id", question_id))
                .await?;
            if !question.forum_enabled {
                return Err(AppError::InvalidInput(format!("forum is not open for question {question_id}")));
            }
        }
        let category = new
            .category
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(default_category);
        let row = json!({
            "title": title,
            "content": content,
            "author_id": author_id,
            "category": category,
            "question_id": new.question_id,
            "views_count": 0,
            "likes_count": 0,
            "is_pinned": false,
        });
        let post: ForumPost = self.db.insert(Collection::ForumPosts, &row).await?;
        info!(target: "forum", id = post.id, %category, "post created");
        Ok(post)
    }

    /// Pinned posts are not floated; ordering is by the chosen sort only.
    #[instrument(level = "info", skip(self))]
    pub async fn posts(&self, filter: &PostFilter) -> Result<Vec<PostSummary>, AppError> {
        let mut query = Query::new().embed(author_embed());
        if let Some(category) = filter.category.as_deref().filter(|c| *c != ALL_CATEGORIES) {
            query = query.eq("category", category);
        }
        if let Some(question_id) = filter.question_id {
            query = query.eq("question_id", question_id);
        }
        query = match filter.sort {
            PostSort::Popular => query.order("likes_count", false).order("created_at", false),
            PostSort::Recent | PostSort::All => query.order("created_at", false),
        };
        let mut posts: Vec<PostSummary> = self
            .db
            .fetch(Collection::ForumPosts, &query.limit(filter.limit))
            .await?;

        for p in &mut posts {
            p.comments_count = self
                .db
                .count(Collection::ForumComments, &Query::new().eq("post_id", p.post.id).filters)
                .await?;
        }
        Ok(posts)
    }

    /// Counts the view, then returns the post with its author and comments.
    #[instrument(level = "info", skip(self))]
    pub async fn post(&self, id: i64) -> Result<PostDetail, AppError> {
        let summary: PostSummary = self
            .db
            .fetch_one(Collection::ForumPosts, Query::new().eq("id", id).embed(author_embed()))
            .await?;
        let views = summary.post.views_count + 1;
        let _: Vec<ForumPost> = self
            .db
            .update(Collection::ForumPosts, &Query::new().eq("id", id).filters, &json!({ "views_count": views }))
            .await?;
        let comments = self.comments(id).await?;

        let mut post = summary.post;
        post.views_count = views;
        Ok(PostDetail { post, author: summary.author, comments })
    }

    #[instrument(level = "info", skip(self, patch))]
    pub async fn update_post(&self, id: i64, mut patch: PostPatch, author_id: &str) -> Result<ForumPost, AppError> {
        patch.title = patch.title.as_deref().map(|t| required("title", t).map(str::to_string)).transpose()?;
        patch.content = patch.content.as_deref().map(|c| required("content", c).map(str::to_string)).transpose()?;
        self.owned_post(id, author_id).await?;
        patch.updated_at = Some(Utc::now());
        let filters = Query::new().eq("id", id).eq("author_id", author_id).filters;
        let mut rows: Vec<ForumPost> = self.db.update(Collection::ForumPosts, &filters, &patch).await?;
        rows.pop().ok_or_else(|| AppError::NotFound(format!("forum post {id}")))
    }

    /// Removes the post with its comments and likes.
    #[instrument(level = "info", skip(self))]
    pub async fn delete_post(&self, id: i64, author_id: &str) -> Result<(), AppError> {
        self.owned_post(id, author_id).await?;
        let filters = Query::new().eq("id", id).eq("author_id", author_id).filters;
        if self.db.delete(Collection::ForumPosts, &filters).await? == 0 {
            return Err(AppError::NotFound(format!("forum post {id}")));
        }
        let children = Query::new().eq("post_id", id).filters;
        let comments = self.db.delete(Collection::ForumComments, &children).await?;
        let likes = self.db.delete(Collection::ForumLikes, &children).await?;
        info!(target: "forum", id, comments, likes, "post deleted");
        Ok(())
    }

    #[instrument(level = "info", skip(self, new), fields(post_id = new.post_id))]
    pub async fn create_comment(&self, new: NewComment, author_id: &str) -> Result<CommentView, AppError> {
        let content = required("content", &new.content)?;
        self.existing_post(new.post_id).await?;
        let row = json!({ "post_id": new.post_id, "content": content, "author_id": author_id });
        let comment: ForumComment = self.db.insert(Collection::ForumComments, &row).await?;
        Ok(self
            .db
            .fetch_one(Collection::ForumComments, Query::new().eq("id", comment.id).embed(author_embed()))
            .await?)
    }

    /// Oldest first.
    pub async fn comments(&self, post_id: i64) -> Result<Vec<CommentView>, AppError> {
        let query = Query::new()
            .eq("post_id", post_id)
            .embed(author_embed())
            .order("created_at", true)
            .order("id", true);
        Ok(self.db.fetch(Collection::ForumComments, &query).await?)
    }

    #[instrument(level = "info", skip(self))]
    pub async fn toggle_like(&self, post_id: i64, user_id: &str) -> Result<LikeState, AppError> {
        self.existing_post(post_id).await?;
        let mine = Query::new().eq("post_id", post_id).eq("user_id", user_id);
        let liked = if self.db.count_matching(Collection::ForumLikes, &mine).await? > 0 {
            self.db.delete(Collection::ForumLikes, &mine.filters).await?;
            false
        } else {
            let _: serde_json::Value = self
                .db
                .insert(Collection::ForumLikes, &json!({ "post_id": post_id, "user_id": user_id }))
                .await?;
            true
        };

        let likes_count = self
            .db
            .count(Collection::ForumLikes, &Query::new().eq("post_id", post_id).filters)
            .await? as i64;
        let _: Vec<ForumPost> = self
            .db
            .update(
                Collection::ForumPosts,
                &Query::new().eq("id", post_id).filters,
                &json!({ "likes_count": likes_count }),
            )
            .await?;
        Ok(LikeState { liked, likes_count })
    }

    async fn existing_post(&self, id: i64) -> Result<ForumPost, AppError> {
        self.db
            .fetch_optional(Collection::ForumPosts, Query::new().eq("id", id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("forum post {id}")))
    }

    async fn owned_post(&self, id: i64, author_id: &str) -> Result<ForumPost, AppError> {
        let post = self.existing_post(id).await?;
        if post.author_id != author_id {
            return Err(AppError::Forbidden(format!("forum post {id} belongs to another user")));
        }
        Ok(post)
    }
}

fn author_embed() -> Embed {
    Embed::left(Collection::Profiles, "author_id", &["id", "display_name"])
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, AppError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(v)
}
