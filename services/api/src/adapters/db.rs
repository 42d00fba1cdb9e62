//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DocumentStore` port from the `core` crate. Every collection is kept in a
//! single JSONB `documents` table, queried with `sqlx`.

use async_trait::async_trait;
use crm_core::ports::{
    Document, DocumentQuery, DocumentStore, PortError, PortResult, SortDirection, StoredDocument,
};
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DocumentStore` port.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    /// Creates a new `PgDocumentStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn map_sqlx(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::PoolTimedOut => PortError::Timeout("database pool timed out".to_string()),
        other => PortError::Unexpected(other.to_string()),
    }
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Builds the SELECT for a collection query. Ties, and unordered queries,
/// fall back to insertion order.
fn select_query(collection: &str, query: &DocumentQuery) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new("SELECT id, data FROM documents WHERE collection = ");
    qb.push_bind(collection.to_string());

    for (field, value) in &query.filters {
        qb.push(" AND data -> ");
        qb.push_bind(field.clone());
        qb.push(" = ");
        qb.push_bind(Json(value.clone()));
    }

    match &query.order_by {
        Some((field, direction)) => {
            qb.push(" ORDER BY data -> ");
            qb.push_bind(field.clone());
            qb.push(match direction {
                SortDirection::Ascending => " ASC NULLS FIRST, seq ASC",
                SortDirection::Descending => " DESC NULLS LAST, seq ASC",
            });
        }
        None => {
            qb.push(" ORDER BY seq ASC");
        }
    }

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(to_i64(limit));
    }
    if query.offset > 0 {
        qb.push(" OFFSET ");
        qb.push_bind(to_i64(query.offset));
    }
    qb
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>> {
        let data = sqlx::query_scalar::<_, Json<Document>>(
            "SELECT data FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(data.map(|Json(doc)| doc))
    }

    async fn query(
        &self,
        collection: &str,
        query: &DocumentQuery,
    ) -> PortResult<Vec<StoredDocument>> {
        let rows = select_query(collection, query)
            .build_query_as::<(String, Json<Document>)>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(rows
            .into_iter()
            .map(|(id, Json(data))| StoredDocument { id, data })
            .collect())
    }

    async fn add(&self, collection: &str, data: Document) -> PortResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
            .bind(collection)
            .bind(&id)
            .bind(Json(data))
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, data: Document) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(data))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE documents SET data = data || $3 WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(patch))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("{}/{}", collection, id)));
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}
