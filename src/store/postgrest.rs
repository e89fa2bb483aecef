//! Minimal PostgREST client for the hosted Supabase database.
//!
//! Every call is a single HTTP request against `{base}/rest/v1/{table}`.
//! Filters become `field=op.value` query pairs, orders become `order=a.desc,b.asc`.
//! Embeds become `select=*,answers!inner(user_id)` with their filters prefixed
//! by the related table (`answers.question_id=eq.5`); PostgREST resolves the
//! relation from the foreign key, so `Embed::foreign_key` is not sent.
//! Writes ask for `return=representation` so callers get the affected rows back.
//!
//! NOTE: the service-role key is never logged.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, instrument};

use super::{Collection, Embed, Filter, Query, Row, Store, StoreError};

#[derive(Clone)]
pub struct PostgrestStore {
    client: reqwest::Client,
    rest_url: String,
    api_key: String,
}

impl PostgrestStore {
    /// `base_url` is the project URL (`https://<ref>.supabase.co`).
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            rest_url: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
        })
    }

    /// Construct from SUPABASE_URL / SUPABASE_SERVICE_ROLE_KEY; None if either is missing.
    pub fn from_env() -> Option<Result<Self, StoreError>> {
        let url = std::env::var("SUPABASE_URL").ok()?;
        let key = std::env::var("SUPABASE_SERVICE_ROLE_KEY").ok()?;
        Some(Self::new(&url, &key))
    }

    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    fn request(&self, method: Method, collection: Collection) -> RequestBuilder {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("thinkscore-backend/0.1"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.client
            .request(method, format!("{}/{}", self.rest_url, collection.as_str()))
            .headers(headers)
            .header("apikey", &self.api_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
    }

    async fn send_rows(&self, req: RequestBuilder) -> Result<Vec<Row>, StoreError> {
        let res = req.send().await.map_err(|e| StoreError::Transport(e.to_string()))?;
        let res = check_status(res).await?;
        let body = res.text().await.map_err(|e| StoreError::Transport(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str::<Vec<Row>>(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Store for PostgrestStore {
    #[instrument(level = "debug", skip_all, fields(%collection, filters = query.filters.len()))]
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Row>, StoreError> {
        let req = self
            .request(Method::GET, collection)
            .query(&[("select", select_clause(&query.embeds))])
            .query(&query_pairs(query));
        let rows = self.send_rows(req).await?;
        debug!(target: "store", %collection, rows = rows.len(), "select");
        Ok(rows)
    }

    #[instrument(level = "debug", skip_all, fields(%collection))]
    async fn count(&self, collection: Collection, query: &Query) -> Result<usize, StoreError> {
        let req = self
            .request(Method::HEAD, collection)
            .query(&[("select", select_clause(&query.embeds))])
            .query(&filter_pairs(query))
            .header("Prefer", "count=exact");
        let res = req.send().await.map_err(|e| StoreError::Transport(e.to_string()))?;
        let res = check_status(res).await?;
        let range = res
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Decode("missing Content-Range header".into()))?;
        parse_content_range_total(range)
    }

    #[instrument(level = "debug", skip_all, fields(%collection))]
    async fn insert(&self, collection: Collection, row: Row) -> Result<Row, StoreError> {
        let req = self
            .request(Method::POST, collection)
            .header("Prefer", "return=representation")
            .json(&row);
        self.send_rows(req)
            .await?
            .pop()
            .ok_or_else(|| StoreError::Decode(format!("insert into {collection} returned no row")))
    }

    #[instrument(level = "debug", skip_all, fields(%collection))]
    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> Result<Vec<Row>, StoreError> {
        let pairs: Vec<(String, String)> = filters.iter().map(filter_pair).collect();
        let req = self
            .request(Method::PATCH, collection)
            .query(&pairs)
            .header("Prefer", "return=representation")
            .json(&patch);
        self.send_rows(req).await
    }

    #[instrument(level = "debug", skip_all, fields(%collection))]
    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        let pairs: Vec<(String, String)> = filters.iter().map(filter_pair).collect();
        let req = self
            .request(Method::DELETE, collection)
            .query(&pairs)
            .header("Prefer", "return=representation");
        self.send_rows(req).await
    }
}

async fn check_status(res: Response) -> Result<Response, StoreError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    let (code, message) = extract_postgrest_error(&body).unwrap_or((None, body));
    error!(target: "store", status = status.as_u16(), code = ?code, %message, "PostgREST request failed");

    if status.as_u16() == 409 || code.as_deref() == Some("23505") {
        return Err(StoreError::Conflict(message));
    }
    if code.as_deref() == Some("PGRST116") {
        return Err(StoreError::NotFound { collection: message });
    }
    Err(StoreError::Api { status: status.as_u16(), code, message })
}

/// Try to extract `{code, message}` from a PostgREST error body.
fn extract_postgrest_error(body: &str) -> Option<(Option<String>, String)> {
    #[derive(Deserialize)]
    struct PgErr {
        #[serde(default)]
        code: Option<String>,
        message: String,
    }
    serde_json::from_str::<PgErr>(body).ok().map(|e| (e.code, e.message))
}

/// `0-24/3573` or `*/0` → total after the slash.
fn parse_content_range_total(range: &str) -> Result<usize, StoreError> {
    range
        .rsplit('/')
        .next()
        .and_then(|t| t.trim().parse::<usize>().ok())
        .ok_or_else(|| StoreError::Decode(format!("bad Content-Range '{range}'")))
}

/// `*` plus one `table!inner(cols)` / `table(cols)` item per embed.
fn select_clause(embeds: &[Embed]) -> String {
    let mut out = String::from("*");
    for e in embeds {
        let cols = if e.columns.is_empty() { "*".to_string() } else { e.columns.join(",") };
        let join = if e.inner { "!inner" } else { "" };
        out.push_str(&format!(",{}{join}({cols})", e.collection.as_str()));
    }
    out
}

/// Own filters, then embed filters keyed `table.field`.
fn filter_pairs(query: &Query) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = query.filters.iter().map(filter_pair).collect();
    for e in &query.embeds {
        for f in &e.filters {
            let (field, value) = filter_pair(f);
            pairs.push((format!("{}.{field}", e.collection.as_str()), value));
        }
    }
    pairs
}

fn query_pairs(query: &Query) -> Vec<(String, String)> {
    let mut pairs = filter_pairs(query);
    if !query.orders.is_empty() {
        let order = query
            .orders
            .iter()
            .map(|o| format!("{}.{}", o.field, if o.ascending { "asc" } else { "desc" }))
            .collect::<Vec<_>>()
            .join(",");
        pairs.push(("order".into(), order));
    }
    if let Some(limit) = query.limit {
        pairs.push(("limit".into(), limit.to_string()));
    }
    if let Some(offset) = query.offset {
        pairs.push(("offset".into(), offset.to_string()));
    }
    pairs
}

fn filter_pair(f: &Filter) -> (String, String) {
    let (op, value) = match f {
        Filter::Eq(_, v) => ("eq", literal(v)),
        Filter::Gt(_, v) => ("gt", literal(v)),
        Filter::Gte(_, v) => ("gte", literal(v)),
        Filter::Lt(_, v) => ("lt", literal(v)),
        Filter::Lte(_, v) => ("lte", literal(v)),
        Filter::In(_, vs) => {
            let items = vs.iter().map(in_item).collect::<Vec<_>>().join(",");
            ("in", format!("({items})"))
        }
    };
    (f.field().to_string(), format!("{op}.{value}"))
}

fn literal(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".into(),
        other => other.to_string(),
    }
}

/// Items inside `in.(...)` are quoted when they contain reserved chars.
fn in_item(v: &Value) -> String {
    let s = literal(v);
    if s.contains(&[',', '(', ')', '"', ' '][..]) {
        format!("\"{}\"", s.replace('"', "\\\""))
    } else {
        s
    }
}
