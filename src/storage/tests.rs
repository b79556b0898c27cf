//! Storage Module Tests
//!
//! Validates the in-memory document store and the query evaluation it relies on.
//!
//! ## Test Scopes
//! - **MemoryStore**: CRUD semantics, reserved fields, merge updates and NotFound propagation.
//! - **Filter**: Operator evaluation, dotted paths and array-contains equality.
//! - **Pipeline**: Aggregation stages and their validation errors.
//! - **FileStore**: Blob storage and file name sanitizing.

#[cfg(test)]
mod tests {
    use crate::storage::files::{FileStore, MemoryFileStore, sanitize_file_name};
    use crate::storage::filter::{matches, parse_sort, run_pipeline};
    use crate::storage::memory::MemoryStore;
    use crate::storage::store::{DataStore, StoreError};
    use crate::storage::types::{Document, QuerySpec, SortOrder};
    use bytes::Bytes;
    use serde_json::{Value, json};

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn seeded_store() -> std::sync::Arc<MemoryStore> {
        let store = MemoryStore::new();
        for (title, votes, tags) in [
            ("alpha", 3, json!(["rust", "db"])),
            ("beta", 10, json!(["go"])),
            ("gamma", 7, json!(["rust"])),
        ] {
            store
                .create(
                    "posts",
                    doc(json!({"title": title, "votes": votes, "tags": tags, "meta": {"lang": "en"}})),
                )
                .await
                .unwrap();
        }
        store
    }

    // ============================================================
    // MEMORY STORE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_create_stamps_reserved_fields() {
        let store = MemoryStore::new();

        let created = store
            .create("comments", doc(json!({"text": "hello"})))
            .await
            .unwrap();

        let stored = store.get_by_id("comments", &created.id).await.unwrap();
        assert_eq!(stored["_id"], json!(created.id));
        assert_eq!(stored["createdAt"], json!(created.created_at));
        assert_eq!(stored["updatedAt"], json!(created.created_at));
        assert_eq!(stored["text"], json!("hello"));
    }

    #[tokio::test]
    async fn test_create_generates_unique_ids() {
        let store = MemoryStore::new();

        let a = store.create("c", Document::new()).await.unwrap();
        let b = store.create("c", Document::new()).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(store.document_count("c"), 2);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryStore::new();

        let result = store.get_by_id("posts", "nope").await;

        assert_eq!(result, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_update_merges_and_preserves_unspecified_fields() {
        let store = MemoryStore::new();
        let created = store
            .create("posts", doc(json!({"title": "a", "body": "b"})))
            .await
            .unwrap();

        store
            .update("posts", &created.id, doc(json!({"title": "changed"})))
            .await
            .unwrap();

        let stored = store.get_by_id("posts", &created.id).await.unwrap();
        assert_eq!(stored["title"], json!("changed"));
        assert_eq!(stored["body"], json!("b"));
    }

    #[tokio::test]
    async fn test_update_cannot_rewrite_identity() {
        let store = MemoryStore::new();
        let created = store.create("posts", Document::new()).await.unwrap();

        store
            .update("posts", &created.id, doc(json!({"_id": "hijack", "createdAt": 1})))
            .await
            .unwrap();

        let stored = store.get_by_id("posts", &created.id).await.unwrap();
        assert_eq!(stored["_id"], json!(created.id));
        assert_eq!(stored["createdAt"], json!(created.created_at));
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_are_not_found() {
        let store = MemoryStore::new();

        assert_eq!(
            store.update("posts", "x", Document::new()).await,
            Err(StoreError::NotFound)
        );
        assert_eq!(store.delete("posts", "x").await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_removes_document() {
        let store = MemoryStore::new();
        let created = store.create("posts", Document::new()).await.unwrap();

        store.delete("posts", &created.id).await.unwrap();

        assert_eq!(
            store.get_by_id("posts", &created.id).await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_query_keeps_insertion_order_without_sort() {
        let store = seeded_store().await;

        let results = store.query("posts", &QuerySpec::default()).await.unwrap();

        let titles: Vec<_> = results.iter().map(|d| d["title"].clone()).collect();
        assert_eq!(titles, vec![json!("alpha"), json!("beta"), json!("gamma")]);
    }

    #[tokio::test]
    async fn test_query_filter_sort_skip_limit() {
        let store = seeded_store().await;
        let spec = QuerySpec {
            filter: Some(doc(json!({"votes": {"$gte": 5}}))),
            sort: vec![("votes".to_string(), SortOrder::Descending)],
            skip: Some(1),
            limit: Some(5),
        };

        let results = store.query("posts", &spec).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["title"], json!("gamma"));
    }

    #[tokio::test]
    async fn test_query_unknown_collection_is_empty() {
        let store = MemoryStore::new();

        let results = store.query("ghosts", &QuerySpec::default()).await.unwrap();

        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_field_equals_helper_matches_dotted_path() {
        let store = seeded_store().await;

        let results = store
            .query("posts", &QuerySpec::field_equals("meta.lang", json!("en")))
            .await
            .unwrap();

        assert_eq!(results.len(), 3);
    }

    // ============================================================
    // FILTER TESTS
    // ============================================================

    #[test]
    fn test_filter_literal_and_array_contains() {
        let d = doc(json!({"name": "a", "tags": ["x", "y"]}));

        assert!(matches(&d, &doc(json!({"name": "a"}))).unwrap());
        assert!(matches(&d, &doc(json!({"tags": "y"}))).unwrap());
        assert!(!matches(&d, &doc(json!({"tags": "z"}))).unwrap());
    }

    #[test]
    fn test_filter_operators() {
        let d = doc(json!({"n": 5, "s": "m"}));

        assert!(matches(&d, &doc(json!({"n": {"$gt": 4, "$lt": 6}}))).unwrap());
        assert!(matches(&d, &doc(json!({"n": {"$in": [1, 5]}}))).unwrap());
        assert!(matches(&d, &doc(json!({"n": {"$nin": [1, 2]}}))).unwrap());
        assert!(matches(&d, &doc(json!({"s": {"$ne": "z"}}))).unwrap());
        assert!(matches(&d, &doc(json!({"missing": {"$exists": false}}))).unwrap());
        assert!(!matches(&d, &doc(json!({"n": {"$lte": 4}}))).unwrap());
    }

    #[test]
    fn test_filter_integer_and_float_compare_equal() {
        let d = doc(json!({"n": 5}));

        assert!(matches(&d, &doc(json!({"n": 5.0}))).unwrap());
    }

    #[test]
    fn test_filter_and_or() {
        let d = doc(json!({"a": 1, "b": 2}));

        assert!(matches(&d, &doc(json!({"$or": [{"a": 9}, {"b": 2}]}))).unwrap());
        assert!(!matches(&d, &doc(json!({"$and": [{"a": 1}, {"b": 3}]}))).unwrap());
    }

    #[test]
    fn test_filter_rejects_unknown_operator() {
        let d = doc(json!({"a": 1}));

        let result = matches(&d, &doc(json!({"a": {"$regex": "x"}})));

        assert!(matches!(result, Err(StoreError::InvalidQuery(_))));
    }

    #[test]
    fn test_parse_sort_directions() {
        let keys = parse_sort("-createdAt, title");

        assert_eq!(
            keys,
            vec![
                ("createdAt".to_string(), SortOrder::Descending),
                ("title".to_string(), SortOrder::Ascending),
            ]
        );
    }

    // ============================================================
    // PIPELINE TESTS
    // ============================================================

    #[tokio::test]
    async fn test_pipeline_match_sort_limit_project() {
        let store = seeded_store().await;
        let pipeline = vec![
            json!({"$match": {"tags": "rust"}}),
            json!({"$sort": {"votes": -1}}),
            json!({"$limit": 1}),
            json!({"$project": {"title": 1, "_id": 0}}),
        ];

        let results = store.aggregate("posts", &pipeline).await.unwrap();

        assert_eq!(results, vec![doc(json!({"title": "gamma"}))]);
    }

    #[test]
    fn test_pipeline_count() {
        let docs = vec![Document::new(), Document::new()];

        let results = run_pipeline(docs, &[json!({"$count": "total"})]).unwrap();

        assert_eq!(results, vec![doc(json!({"total": 2}))]);
    }

    #[test]
    fn test_pipeline_rejects_malformed_stage() {
        let result = run_pipeline(vec![], &[json!({"$skip": 1, "$limit": 2})]);

        assert!(matches!(result, Err(StoreError::InvalidQuery(_))));
    }

    // ============================================================
    // FILE STORE TESTS
    // ============================================================

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("my photo:/2024.png"), "myphoto2024.png");
    }

    #[tokio::test]
    async fn test_file_store_round_trip_with_name() {
        let files = MemoryFileStore::new();

        let stored = files
            .put(Some("a b.txt"), Some("text/plain".into()), Bytes::from_static(b"hi"))
            .await
            .unwrap();
        let fetched = files.get(&stored.id).await.unwrap();

        assert!(stored.id.ends_with("-ab.txt"));
        assert_eq!(fetched.bytes, Bytes::from_static(b"hi"));
        assert_eq!(files.get("missing").await, Err(StoreError::NotFound));
    }
}
