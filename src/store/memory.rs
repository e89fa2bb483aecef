//! In-process store with PostgREST-like semantics.
//!
//! - integer `id` assigned on insert when absent; ids are unique per collection
//! - `created_at` / `updated_at` default to now on insert
//! - comparisons follow SQL: a NULL never matches eq/neq/gt/..., and sorts as
//!   the largest value (last ascending, first descending)
//! - RFC 3339 strings compare as instants
//! - embeds look up the related row by `id` in the same store

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use super::{Collection, Embed, Filter, Query, Row, Store, StoreError};

#[derive(Default)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<Collection, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    #[instrument(level = "debug", skip_all, fields(%collection))]
    async fn select(&self, collection: Collection, query: &Query) -> Result<Vec<Row>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows = resolve(&tables, collection, query);

        if !query.orders.is_empty() {
            rows.sort_by(|a, b| {
                for o in &query.orders {
                    let ord = sort_cmp(a.get(&o.field), b.get(&o.field));
                    let ord = if o.ascending { ord } else { ord.reverse() };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, collection: Collection, query: &Query) -> Result<usize, StoreError> {
        let tables = self.tables.read().await;
        Ok(resolve(&tables, collection, query).len())
    }

    #[instrument(level = "debug", skip_all, fields(%collection))]
    async fn insert(&self, collection: Collection, mut row: Row) -> Result<Row, StoreError> {
        let mut tables = self.tables.write().await;
        let table = tables.entry(collection).or_default();

        match row.get("id") {
            None | Some(Value::Null) => {
                table.next_id += 1;
                row.insert("id".into(), Value::from(table.next_id));
            }
            Some(id) => {
                let id = id.clone();
                if table.rows.iter().any(|r| r.get("id") == Some(&id)) {
                    return Err(StoreError::Conflict(format!(
                        "duplicate key id={id} in {collection}"
                    )));
                }
                if let Some(n) = id.as_i64() {
                    table.next_id = table.next_id.max(n);
                }
            }
        }

        let now = Value::from(now_rfc3339());
        for key in ["created_at", "updated_at"] {
            if matches!(row.get(key), None | Some(Value::Null)) {
                row.insert(key.into(), now.clone());
            }
        }

        debug!(target: "store", %collection, "memory insert");
        table.rows.push(row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        collection: Collection,
        filters: &[Filter],
        patch: Row,
    ) -> Result<Vec<Row>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&collection) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for row in table.rows.iter_mut().filter(|r| matches_all(r, filters)) {
            for (k, v) in &patch {
                row.insert(k.clone(), v.clone());
            }
            out.push(row.clone());
        }
        Ok(out)
    }

    async fn delete(&self, collection: Collection, filters: &[Filter]) -> Result<Vec<Row>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(table) = tables.get_mut(&collection) else {
            return Ok(Vec::new());
        };
        let (gone, kept): (Vec<Row>, Vec<Row>) =
            table.rows.drain(..).partition(|r| matches_all(r, filters));
        table.rows = kept;
        Ok(gone)
    }
}

/// Filtered rows of `collection` with embeds attached, unordered.
fn resolve(tables: &HashMap<Collection, Table>, collection: Collection, query: &Query) -> Vec<Row> {
    let Some(table) = tables.get(&collection) else {
        return Vec::new();
    };
    table
        .rows
        .iter()
        .filter(|r| matches_all(r, &query.filters))
        .filter_map(|r| {
            let mut row = r.clone();
            for embed in &query.embeds {
                let related = related_row(tables, r, embed);
                if related.is_none() && embed.inner {
                    return None;
                }
                row.insert(embed.collection.as_str().into(), related.unwrap_or(Value::Null));
            }
            Some(row)
        })
        .collect()
}

/// The related row projected to the embed's columns, if it exists and passes the embed filters.
fn related_row(tables: &HashMap<Collection, Table>, row: &Row, embed: &Embed) -> Option<Value> {
    let key = row.get(&embed.foreign_key).filter(|v| !v.is_null())?;
    let found = tables
        .get(&embed.collection)?
        .rows
        .iter()
        .find(|r| r.get("id").and_then(|id| value_cmp(id, key)) == Some(Ordering::Equal))?;
    if !matches_all(found, &embed.filters) {
        return None;
    }
    let projected: Row = if embed.columns.is_empty() {
        found.clone()
    } else {
        embed
            .columns
            .iter()
            .map(|c| (c.clone(), found.get(c).cloned().unwrap_or(Value::Null)))
            .collect()
    };
    Some(Value::Object(projected))
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches(row, f))
}

fn matches(row: &Row, filter: &Filter) -> bool {
    let field = row.get(filter.field()).filter(|v| !v.is_null());
    match filter {
        Filter::In(_, values) => field.map_or(false, |v| {
            values.iter().any(|w| value_cmp(v, w) == Some(Ordering::Equal))
        }),
        Filter::Eq(_, w) => cmp_is(field, w, |o| o == Ordering::Equal),
        Filter::Gt(_, w) => cmp_is(field, w, |o| o == Ordering::Greater),
        Filter::Gte(_, w) => cmp_is(field, w, |o| o != Ordering::Less),
        Filter::Lt(_, w) => cmp_is(field, w, |o| o == Ordering::Less),
        Filter::Lte(_, w) => cmp_is(field, w, |o| o != Ordering::Greater),
    }
}

fn cmp_is(field: Option<&Value>, w: &Value, pred: impl Fn(Ordering) -> bool) -> bool {
    match field {
        Some(v) => value_cmp(v, w).map_or(false, pred),
        None => false,
    }
}

/// Compare two scalar JSON values; `None` when the types are incomparable.
fn value_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => {
            match (
                DateTime::parse_from_rfc3339(x),
                DateTime::parse_from_rfc3339(y),
            ) {
                (Ok(dx), Ok(dy)) => Some(dx.cmp(&dy)),
                _ => Some(x.cmp(y)),
            }
        }
        // Numeric ids sometimes arrive as strings from path params.
        (Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.parse::<f64>().ok()?),
        (Value::String(x), Value::Number(y)) => x.parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        _ => None,
    }
}

fn sort_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => value_cmp(x, y).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_assigns_ids_and_timestamps() {
        let store = MemoryStore::new();
        let a = store.insert(Collection::Scores, row(json!({ "score": 10 }))).await.unwrap();
        let b = store.insert(Collection::Scores, row(json!({ "score": 20 }))).await.unwrap();
        assert_eq!(a["id"], json!(1));
        assert_eq!(b["id"], json!(2));
        assert!(a["created_at"].is_string());

        let dup = store.insert(Collection::Scores, row(json!({ "id": 2 }))).await;
        assert!(matches!(dup, Err(StoreError::Conflict(_))));

        let c = store.insert(Collection::Scores, row(json!({ "id": 10 }))).await.unwrap();
        let d = store.insert(Collection::Scores, row(json!({}))).await.unwrap();
        assert_eq!(c["id"], json!(10));
        assert_eq!(d["id"], json!(11));
    }

    #[tokio::test]
    async fn filters_follow_sql_null_semantics() {
        let store = MemoryStore::new();
        store.insert(Collection::Profiles, row(json!({ "id": "a", "total_score": 5 }))).await.unwrap();
        store.insert(Collection::Profiles, row(json!({ "id": "b", "total_score": null }))).await.unwrap();
        store.insert(Collection::Profiles, row(json!({ "id": "c", "total_score": 9 }))).await.unwrap();

        let gt = Query::new().gt("total_score", 4);
        assert_eq!(store.select(Collection::Profiles, &gt).await.unwrap().len(), 2);

        let lt = Query::new().lt("total_score", 9);
        assert_eq!(store.count(Collection::Profiles, &lt).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn ordering_is_stable_and_nulls_sort_high() {
        let store = MemoryStore::new();
        for (name, s) in [("x", json!(3)), ("y", json!(null)), ("z", json!(3)), ("w", json!(7))] {
            store.insert(Collection::Scores, row(json!({ "name": name, "score": s }))).await.unwrap();
        }

        let desc = Query::new().order("score", false);
        let names: Vec<String> = store
            .select(Collection::Scores, &desc)
            .await
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["y", "w", "x", "z"]);

        let page = Query::new().order("score", true).offset(1).limit(2);
        let names: Vec<String> = store
            .select(Collection::Scores, &page)
            .await
            .unwrap()
            .iter()
            .map(|r| r["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["z", "w"]);
    }

    #[tokio::test]
    async fn timestamps_compare_as_instants() {
        let store = MemoryStore::new();
        store
            .insert(Collection::UsageLogs, row(json!({ "created_at": "2026-01-01T00:00:00+09:00" })))
            .await
            .unwrap();
        store
            .insert(Collection::UsageLogs, row(json!({ "created_at": "2026-01-01T00:00:00Z" })))
            .await
            .unwrap();

        let before = [Filter::Lt("created_at".into(), json!("2025-12-31T20:00:00Z"))];
        let gone = store.delete(Collection::UsageLogs, &before).await.unwrap();
        assert_eq!(gone.len(), 1);
        assert_eq!(store.count(Collection::UsageLogs, &Query::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_patches_only_matching_rows() {
        let store = MemoryStore::new();
        store.insert(Collection::UsageLogs, row(json!({ "status": "pending" }))).await.unwrap();
        store.insert(Collection::UsageLogs, row(json!({ "status": "success" }))).await.unwrap();

        let filters = [Filter::Eq("id".into(), json!(1)), Filter::Eq("status".into(), json!("pending"))];
        let out = store
            .update(Collection::UsageLogs, &filters, row(json!({ "status": "error" })))
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["status"], json!("error"));

        let again = store
            .update(Collection::UsageLogs, &filters, row(json!({ "status": "success" })))
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn embeds_join_on_the_foreign_key() {
        let store = MemoryStore::new();
        store.insert(Collection::Answers, row(json!({ "user_id": "u1", "question_id": 5 }))).await.unwrap();
        store.insert(Collection::Answers, row(json!({ "user_id": "u2", "question_id": 6 }))).await.unwrap();
        for (answer_id, score) in [(1, 70), (2, 90), (99, 50)] {
            store
                .insert(Collection::Scores, row(json!({ "answer_id": answer_id, "score": score })))
                .await
                .unwrap();
        }

        let inner = Query::new()
            .embed(Embed::inner(Collection::Answers, "answer_id", &["user_id"]).eq("question_id", 5));
        let rows = store.select(Collection::Scores, &inner).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["answers"], json!({ "user_id": "u1" }));
        assert_eq!(store.count(Collection::Scores, &inner).await.unwrap(), 1);

        let left = Query::new()
            .embed(Embed::left(Collection::Answers, "answer_id", &["question_id"]))
            .order("score", true);
        let rows = store.select(Collection::Scores, &left).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["answers"], Value::Null);
        assert_eq!(rows[2]["answers"], json!({ "question_id": 6 }));
    }
}
