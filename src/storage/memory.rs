use super::filter::{matches, run_pipeline, sort_documents};
use super::store::{DataStore, StoreError, StoreResult};
use super::types::*;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A stored document plus its insertion sequence, used as the natural result order.
#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    doc: Document,
}

/// In-process document store: one concurrent map per collection.
///
/// Safe to share between every resource node; each map shard is locked only for the
/// duration of a single read or write, never across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Arc<DashMap<String, DashMap<String, Entry>>>,
    next_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Inserts a document verbatim, keeping its `_id` and timestamps. Used for seeding.
    pub fn insert_raw(&self, collection: &str, doc: Document) -> StoreResult<String> {
        let id = doc
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::InvalidQuery("Document must carry a string _id.".into()))?;
        self.store_local(collection, id.clone(), doc);
        Ok(id)
    }

    fn store_local(&self, collection: &str, id: String, doc: Document) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let collection_map = self
            .collections
            .entry(collection.to_string())
            .or_default();
        collection_map.insert(id, Entry { seq, doc });
    }

    /// Snapshot of a collection in insertion order.
    fn dump_collection(&self, collection: &str) -> Vec<Document> {
        let mut entries: Vec<Entry> = match self.collections.get(collection) {
            Some(collection_map) => collection_map.iter().map(|e| e.value().clone()).collect(),
            None => Vec::new(),
        };
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.doc).collect()
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        self.collections
            .get(collection)
            .map(|collection_map| collection_map.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn create(&self, collection: &str, mut doc: Document) -> StoreResult<Created> {
        let id = new_id();
        let created_at = now_secs();

        doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        doc.insert(CREATED_AT_FIELD.to_string(), Value::from(created_at));
        doc.insert(UPDATED_AT_FIELD.to_string(), Value::from(created_at));

        self.store_local(collection, id.clone(), doc);
        tracing::debug!("Stored document {} in collection {}", id, collection);

        Ok(Created { id, created_at })
    }

    async fn get_by_id(&self, collection: &str, id: &str) -> StoreResult<Document> {
        self.collections
            .get(collection)
            .and_then(|collection_map| collection_map.get(id).map(|entry| entry.doc.clone()))
            .ok_or(StoreError::NotFound)
    }

    async fn query(&self, collection: &str, spec: &QuerySpec) -> StoreResult<Vec<Document>> {
        let mut results = Vec::new();
        for doc in self.dump_collection(collection) {
            let keep = match &spec.filter {
                Some(filter) => matches(&doc, filter)?,
                None => true,
            };
            if keep {
                results.push(doc);
            }
        }

        if !spec.sort.is_empty() {
            sort_documents(&mut results, &spec.sort);
        }

        let skip = spec.skip.unwrap_or(0);
        let limit = spec.limit.filter(|l| *l > 0).unwrap_or(usize::MAX);
        Ok(results.into_iter().skip(skip).take(limit).collect())
    }

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> StoreResult<Vec<Document>> {
        run_pipeline(self.dump_collection(collection), pipeline)
    }

    async fn update(&self, collection: &str, id: &str, partial: Document) -> StoreResult<Updated> {
        let collection_map = self.collections.get(collection).ok_or(StoreError::NotFound)?;
        let mut entry = collection_map.get_mut(id).ok_or(StoreError::NotFound)?;

        let updated_at = now_secs();
        for (key, value) in partial {
            if key == ID_FIELD || key == CREATED_AT_FIELD {
                continue;
            }
            entry.doc.insert(key, value);
        }
        entry
            .doc
            .insert(UPDATED_AT_FIELD.to_string(), Value::from(updated_at));

        Ok(Updated { updated_at })
    }

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        self.collections
            .get(collection)
            .and_then(|collection_map| collection_map.remove(id))
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }
}
