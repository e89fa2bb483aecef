//! Persistence gateway: a generic tabular store addressed by collection name.
//!
//! The core never builds queries beyond filter/sort/limit selection, plus
//! to-one embeds of a related row (`answers!inner(user_id)` in PostgREST terms)
//! so joins stay on the database side. Rows are JSON objects; `Db` decodes
//! them into domain types.
//!
//! Two implementations:
//!   - `PostgrestStore` talks to a hosted Supabase/PostgREST endpoint
//!   - `MemoryStore` keeps rows in process (dev mode and tests)

use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub mod memory;
pub mod postgrest;

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;

pub type Row = Map<String, Value>;

/// Named record collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Collection {
    Questions,
    Answers,
    Scores,
    Profiles,
    UsageLogs,
    JobRuns,
    ForumPosts,
    ForumComments,
    ForumLikes,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Questions => "questions",
            Collection::Answers => "answers",
            Collection::Scores => "scores",
            Collection::Profiles => "profiles",
            Collection::UsageLogs => "openai_logs",
            Collection::JobRuns => "job_runs",
            Collection::ForumPosts => "forum_posts",
            Collection::ForumComments => "forum_comments",
            Collection::ForumLikes => "forum_likes",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
}

impl Filter {
    pub fn field(&self) -> &str {
        match self {
            Filter::Eq(f, _)
            | Filter::Gt(f, _)
            | Filter::Gte(f, _)
            | Filter::Lt(f, _)
            | Filter::Lte(f, _)
            | Filter::In(f, _) => f,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub field: String,
    pub ascending: bool,
}

/// A related row pulled in through a foreign key on this collection.
///
/// The embedded row lands under the related collection's name. With `inner`
/// set, rows without a related match (or whose match fails `filters`) are
/// dropped; otherwise they are kept with the embed set to null.
#[derive(Clone, Debug, PartialEq)]
pub struct Embed {
    pub collection: Collection,
    /// Column on this collection holding the related `id`.
    pub foreign_key: String,
    /// Empty means every column.
    pub columns: Vec<String>,
    pub inner: bool,
    pub filters: Vec<Filter>,
}

impl Embed {
    pub fn inner(collection: Collection, foreign_key: &str, columns: &[&str]) -> Self {
        Self {
            collection,
            foreign_key: foreign_key.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            inner: true,
            filters: Vec::new(),
        }
    }

    pub fn left(collection: Collection, foreign_key: &str, columns: &[&str]) -> Self {
        Self { inner: false, ..Self::inner(collection, foreign_key, columns) }
    }

    pub fn eq(mut self, field: &str, v: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(field.into(), v.into()));
        self
    }
}

/// Selection: filters are AND-ed; orders apply in sequence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub embeds: Vec<Embed>,
    pub orders: Vec<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, f: Filter) -> Self {
        self.filters.push(f);
        self
    }

    pub fn eq(self, field: &str, v: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(field.into(), v.into()))
    }

    pub fn gt(self, field: &str, v: impl Into<Value>) -> Self {
        self.filter(Filter::Gt(field.into(), v.into()))
    }

    pub fn gte(self, field: &str, v: impl Into<Value>) -> Self {
        self.filter(Filter::Gte(field.into(), v.into()))
    }

    pub fn lt(self, field: &str, v: impl Into<Value>) -> Self {
        self.filter(Filter::Lt(field.into(), v.into()))
    }

    pub fn lte(self, field: &str, v: impl Into<Value>) -> Self {
        self.filter(Filter::Lte(field.into(), v.into()))
    }

    pub fn is_in<V: Into<Value>>(self, field: &str, values: impl IntoIterator<Item = V>) -> Self {
        self.filter(Filter::In(field.into(), values.into_iter().map(Into::into).collect()))
    }

    pub fn embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn order(mut self, field: &str, ascending: bool) -> Self {
        self.orders.push(Order { field: field.into(), ascending });
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.offset = Some(n);
        self
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no matching row in {collection}")]
    NotFound { collection: String },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("store HTTP {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("store transport error: {0}")]
    Transport(String),
    #[error("store decode error: {0}")]
    Decode(String),
}

#[async_trait::async_trait]
pub trait Store: Send + Sync {
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Row>, StoreError>;

    /// Rows matching the filters and inner embeds; order and paging are ignored.
    async fn count(&self, collection: Collection, query: &Query) -> Result<usize, StoreError>;

    async fn insert(&self, collection: Collection, row: Row) -> Result<Row, StoreError>;

    /// Returns the rows after the patch was applied.
    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> Result<Vec<Row>, StoreError>;

    /// Returns the deleted rows.
    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<Vec<Row>, StoreError>;
}

/// Typed facade over a `Store`.
#[derive(Clone)]
pub struct Db {
    inner: Arc<dyn Store>,
}

impl Db {
    pub fn new(inner: Arc<dyn Store>) -> Self {
        Self { inner }
    }

    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub async fn fetch<T: DeserializeOwned>(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Vec<T>, StoreError> {
        let rows = self.inner.select(collection, query).await?;
        rows.into_iter().map(decode).collect()
    }

    /// Exactly one row expected; no match is `StoreError::NotFound`.
    pub async fn fetch_one<T: DeserializeOwned>(
        &self,
        collection: Collection,
        query: Query,
    ) -> Result<T, StoreError> {
        self.fetch_optional(collection, query)
            .await?
            .ok_or_else(|| StoreError::NotFound { collection: collection.to_string() })
    }

    pub async fn fetch_optional<T: DeserializeOwned>(
        &self,
        collection: Collection,
        query: Query,
    ) -> Result<Option<T>, StoreError> {
        let mut rows = self.inner.select(collection, &query.limit(1)).await?;
        match rows.pop() {
            Some(row) => decode(row).map(Some),
            None => Ok(None),
        }
    }

    pub async fn count(&self, collection: Collection, filters: &[Filter]) -> Result<usize, StoreError> {
        let query = Query { filters: filters.to_vec(), ..Query::default() };
        self.inner.count(collection, &query).await
    }

    pub async fn count_matching(&self, collection: Collection, query: &Query) -> Result<usize, StoreError> {
        self.inner.count(collection, query).await
    }

    pub async fn insert<T: DeserializeOwned>(
        &self,
        collection: Collection,
        record: &impl Serialize,
    ) -> Result<T, StoreError> {
        let row = encode(record)?;
        decode(self.inner.insert(collection, row).await?)
    }

    pub async fn update<T: DeserializeOwned>(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: &impl Serialize,
    ) -> Result<Vec<T>, StoreError> {
        let patch = encode(patch)?;
        let rows = self.inner.update(collection, filters, patch).await?;
        rows.into_iter().map(decode).collect()
    }

    pub async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<usize, StoreError> {
        Ok(self.inner.delete(collection, filters).await?.len())
    }
}

fn encode(record: &impl Serialize) -> Result<Row, StoreError> {
    match serde_json::to_value(record).map_err(|e| StoreError::Decode(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Decode(format!("expected a JSON object, got {other}"))),
    }
}

fn decode<T: DeserializeOwned>(row: Row) -> Result<T, StoreError> {
    serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::Decode(e.to_string()))
}
