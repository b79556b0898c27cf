//! Document store contract.
//!
//! Every resource node talks to the store through this trait, so any implementation must
//! tolerate calls from many nodes at once. Each node only touches the collection bound to
//! its own class; the store performs no cross-collection coordination.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::types::{Created, Document, QuerySpec, Updated};
use crate::error::ApiError;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("item not found")]
    NotFound,
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::not_found("Item not found."),
            StoreError::InvalidQuery(message) => ApiError::BadRequest(message),
            StoreError::Backend(message) => ApiError::Internal(message),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Inserts `doc` under a freshly generated `_id`, stamping `createdAt` and `updatedAt`.
    async fn create(&self, collection: &str, doc: Document) -> StoreResult<Created>;

    async fn get_by_id(&self, collection: &str, id: &str) -> StoreResult<Document>;

    async fn query(&self, collection: &str, spec: &QuerySpec) -> StoreResult<Vec<Document>>;

    async fn aggregate(&self, collection: &str, pipeline: &[Value]) -> StoreResult<Vec<Document>>;

    /// Merges `partial` into the stored document, leaving unspecified fields untouched.
    async fn update(&self, collection: &str, id: &str, partial: Document) -> StoreResult<Updated>;

    async fn delete(&self, collection: &str, id: &str) -> StoreResult<()>;
}
