use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{
    format_timestamp, parse_id, search_terms, Condition, DocumentStore, Filter, FindQuery,
    JsonObject, SortKey, StoreError, StoreResult,
};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(database_url)
        .await
}

/// Documents live in one table keyed by `(collection, id)`; `body` holds the
/// full JSON document including `id` and the timestamps.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn path_segments(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

/// `mood.value` + 3 becomes `{"mood": {"value": 3}}` for a `@>` containment check.
fn nest(path: &str, leaf: Value) -> Value {
    path.rsplit('.').fold(leaf, |inner, key| {
        let mut map = JsonObject::new();
        map.insert(key.to_string(), inner);
        Value::Object(map)
    })
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, collection: &str, filter: &Filter) {
    qb.push(" WHERE collection = ");
    qb.push_bind(collection.to_string());

    for condition in &filter.conditions {
        match condition {
            Condition::Eq { path, value } => {
                qb.push(" AND body @> ");
                qb.push_bind(Json(nest(path, value.clone())));
            }
            Condition::Contains { path, value } => {
                qb.push(" AND body @> ");
                qb.push_bind(Json(nest(path, Value::Array(vec![value.clone()]))));
            }
            Condition::Range { path, from, to } => {
                if let Some(from) = from {
                    qb.push(" AND (body #>> ");
                    qb.push_bind(path_segments(path));
                    qb.push("::text[])::timestamptz >= ");
                    qb.push_bind(*from);
                }
                if let Some(to) = to {
                    qb.push(" AND (body #>> ");
                    qb.push_bind(path_segments(path));
                    qb.push("::text[])::timestamptz <= ");
                    qb.push_bind(*to);
                }
            }
            Condition::Text { fields, terms } => {
                let terms = search_terms(terms);
                if terms.is_empty() || fields.is_empty() {
                    continue;
                }
                qb.push(" AND to_tsvector('english', ");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        qb.push(" || ' ' || ");
                    }
                    qb.push("coalesce(body #>> ");
                    qb.push_bind(path_segments(field));
                    qb.push("::text[], '')");
                }
                qb.push(") @@ websearch_to_tsquery('english', ");
                qb.push_bind(terms.join(" or "));
                qb.push(")");
            }
        }
    }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let field = db_err
                .constraint()
                .and_then(unique_field_from_constraint)
                .unwrap_or("value")
                .to_string();
            return StoreError::Duplicate { field };
        }
    }
    StoreError::Database(err)
}

/// Unique indexes are named `documents_<collection>_<field>_key`.
fn unique_field_from_constraint(constraint: &str) -> Option<&str> {
    let inner = constraint.strip_prefix("documents_")?.strip_suffix("_key")?;
    inner.split_once('_').map(|(_, field)| field)
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn insert(&self, collection: &str, mut doc: JsonObject) -> StoreResult<Value> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let stamp = format_timestamp(now);
        doc.insert("id".into(), Value::String(id.to_string()));
        doc.insert("createdAt".into(), Value::String(stamp.clone()));
        doc.insert("updatedAt".into(), Value::String(stamp));

        let Json(body) = sqlx::query_scalar::<_, Json<Value>>(
            r#"
            INSERT INTO documents (id, collection, body, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            RETURNING body
            "#,
        )
        .bind(id)
        .bind(collection)
        .bind(Json(Value::Object(doc)))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(body)
    }

    async fn find_by_id(&self, collection: &str, id: &str) -> StoreResult<Option<Value>> {
        let id = parse_id(id)?;
        let body = sqlx::query_scalar::<_, Json<Value>>(
            "SELECT body FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(body.map(|Json(v)| v))
    }

    async fn find(&self, collection: &str, query: &FindQuery) -> StoreResult<Vec<Value>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT body FROM documents");
        push_filter(&mut qb, collection, &query.filter);

        push_order(&mut qb, &query.sort);

        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if query.skip > 0 {
            qb.push(" OFFSET ");
            qb.push_bind(i64::try_from(query.skip).unwrap_or(i64::MAX));
        }

        let rows = qb
            .build_query_scalar::<Json<Value>>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|Json(v)| v).collect())
    }

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM documents");
        push_filter(&mut qb, collection, filter);
        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn update_by_id(
        &self,
        collection: &str,
        id: &str,
        mut changes: JsonObject,
    ) -> StoreResult<Option<Value>> {
        let id = parse_id(id)?;
        let now = Utc::now();
        changes.remove("id");
        changes.remove("createdAt");
        changes.insert("updatedAt".into(), Value::String(format_timestamp(now)));

        let body = sqlx::query_scalar::<_, Json<Value>>(
            r#"
            UPDATE documents SET
                body = body || $3,
                updated_at = $4
            WHERE collection = $1 AND id = $2
            RETURNING body
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(Value::Object(changes)))
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(body.map(|Json(v)| v))
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> StoreResult<bool> {
        let id = parse_id(id)?;
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}

/// Ties fall back to insertion order, reversed under a descending lead key.
fn push_order(qb: &mut QueryBuilder<'_, Postgres>, sort: &[SortKey]) {
    qb.push(" ORDER BY ");
    for key in sort {
        if key.path == "createdAt" {
            qb.push("created_at");
        } else {
            qb.push("body #> ");
            qb.push_bind(path_segments(key.path));
            qb.push("::text[]");
        }
        qb.push(if key.descending { " DESC NULLS LAST, " } else { " ASC NULLS FIRST, " });
    }
    let newest_first = sort.first().is_some_and(|k| k.descending);
    qb.push(if newest_first { "seq DESC" } else { "seq ASC" });
}
