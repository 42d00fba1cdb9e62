//! crates/crm_core/src/memory.rs
//!
//! An in-process implementation of the `DocumentStore` port.
//!
//! Backs the `memory` store backend for local development and every test in
//! the workspace. Collections keep insertion order, which is also the order
//! unordered queries return.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::ports::{
    Document, DocumentQuery, DocumentStore, PortError, PortResult, SortDirection, StoredDocument,
};

#[derive(Default)]
pub struct InMemoryDocumentStore {
    collections: RwLock<HashMap<String, Vec<StoredDocument>>>,
    /// Mimics stores that need a composite index for "filter + order by".
    require_composite_index: bool,
    unavailable: AtomicBool,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that rejects ordered queries combined with equality filters.
    pub fn without_composite_indexes() -> Self {
        Self {
            require_composite_index: true,
            ..Self::default()
        }
    }

    /// Makes every subsequent call fail, or recover, to simulate an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Like `put`, but ignores a simulated outage.
    pub async fn seed(&self, collection: &str, id: &str, data: Document) {
        self.replace(collection, id, data).await;
    }

    async fn replace(&self, collection: &str, id: &str, data: Document) {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|d| d.id == id) {
            Some(existing) => existing.data = data,
            None => docs.push(StoredDocument {
                id: id.to_string(),
                data,
            }),
        }
    }

    /// Number of documents currently in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    fn check_available(&self) -> PortResult<()> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            Err(PortError::Unexpected("document store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Orders JSON values the way a document store orders mixed-type fields:
/// null < bool < number < string, everything else compared as text.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)).then_with(|| a.to_string().cmp(&b.to_string())),
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<Document>> {
        self.check_available()?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .map(|d| d.data.clone()))
    }

    async fn query(
        &self,
        collection: &str,
        query: &DocumentQuery,
    ) -> PortResult<Vec<StoredDocument>> {
        self.check_available()?;
        if self.require_composite_index && !query.filters.is_empty() && query.order_by.is_some() {
            return Err(PortError::IndexUnavailable(format!(
                "composite index required on {}",
                collection
            )));
        }

        let collections = self.collections.read().await;
        let mut matches: Vec<StoredDocument> = collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| {
                        query
                            .filters
                            .iter()
                            .all(|(field, wanted)| d.data.get(field) == Some(wanted))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some((field, direction)) = &query.order_by {
            matches.sort_by(|a, b| {
                let ord = compare_values(
                    a.data.get(field).unwrap_or(&Value::Null),
                    b.data.get(field).unwrap_or(&Value::Null),
                );
                match direction {
                    SortDirection::Ascending => ord,
                    SortDirection::Descending => ord.reverse(),
                }
            });
        }

        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matches.into_iter().skip(query.offset).take(limit).collect())
    }

    async fn add(&self, collection: &str, data: Document) -> PortResult<String> {
        self.check_available()?;
        let id = Uuid::new_v4().simple().to_string();
        let mut collections = self.collections.write().await;
        collections
            .entry(collection.to_string())
            .or_default()
            .push(StoredDocument {
                id: id.clone(),
                data,
            });
        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, data: Document) -> PortResult<()> {
        self.check_available()?;
        self.replace(collection, id, data).await;
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> PortResult<()> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
            .ok_or_else(|| PortError::NotFound(format!("{}/{}", collection, id)))?;
        doc.data.extend(patch);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> PortResult<()> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(collection) {
            docs.retain(|d| d.id != id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn add_get_update_delete() {
        let store = InMemoryDocumentStore::new();
        let id = store.add("students", doc(json!({"name": "Maria"}))).await.unwrap();

        store
            .update("students", &id, doc(json!({"status": "Applying"})))
            .await
            .unwrap();
        let fetched = store.get("students", &id).await.unwrap().unwrap();
        assert_eq!(fetched["name"], json!("Maria"));
        assert_eq!(fetched["status"], json!("Applying"));

        store.delete("students", &id).await.unwrap();
        assert!(store.get("students", &id).await.unwrap().is_none());

        store.put("users", "u1", doc(json!({"role": "viewer"}))).await.unwrap();
        store.put("users", "u1", doc(json!({"role": "admin"}))).await.unwrap();
        assert_eq!(store.count("users").await, 1);
        assert_eq!(store.get("users", "u1").await.unwrap().unwrap()["role"], json!("admin"));
        // Deleting again is a no-op.
        store.delete("students", &id).await.unwrap();
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let err = store
            .update("students", "nope", Document::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn query_filters_orders_and_pages() {
        let store = InMemoryDocumentStore::new();
        for (n, kind) in [(3, "note"), (1, "task"), (2, "note"), (5, "note")] {
            store
                .add("t", doc(json!({"n": n, "type": kind})))
                .await
                .unwrap();
        }
        let q = DocumentQuery::new()
            .where_eq("type", "note")
            .order_by("n", SortDirection::Descending)
            .offset(1)
            .limit(5);
        let ns: Vec<i64> = store
            .query("t", &q)
            .await
            .unwrap()
            .iter()
            .map(|d| d.data["n"].as_i64().unwrap())
            .collect();
        assert_eq!(ns, vec![3, 2]);
    }

    #[tokio::test]
    async fn composite_index_and_outage_simulation() {
        let store = InMemoryDocumentStore::without_composite_indexes();
        let q = DocumentQuery::new()
            .where_eq("type", "note")
            .order_by("created_at", SortDirection::Descending);
        assert!(matches!(
            store.query("t", &q).await,
            Err(PortError::IndexUnavailable(_))
        ));
        assert!(store.query("t", &q.unordered()).await.is_ok());

        store.set_unavailable(true);
        assert!(matches!(
            store.get("t", "x").await,
            Err(PortError::Unexpected(_))
        ));
        store.set_unavailable(false);
        assert!(store.get("t", "x").await.unwrap().is_none());
    }
}
