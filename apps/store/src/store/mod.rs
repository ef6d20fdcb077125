//! Store seam: everything the provisioning routine needs from a document store.
//!
//! `MongoStore` talks to a real deployment; `MemoryStore` enforces the same
//! contract in-process and backs the test suite and `init --dry-run`.
#![allow(dead_code)]

pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use bson::{oid::ObjectId, Document};
use serde::Serialize;

use crate::errors::StoreError;
use crate::schema::{CollectionSchema, IndexSpec};

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// Outcome of an idempotent provisioning call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provisioned {
    Created,
    Unchanged,
}

/// Access stage of a query's winning plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stage")]
pub enum QueryPlan {
    #[serde(rename = "IXSCAN")]
    IndexScan { index: String },
    #[serde(rename = "COLLSCAN")]
    CollectionScan,
}

impl QueryPlan {
    pub fn uses_index(&self, name: &str) -> bool {
        matches!(self, QueryPlan::IndexScan { index } if index == name)
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Defines a validated collection. Re-defining with an identical validator
    /// is `Unchanged`; a different validator is `CollectionAlreadyExists`.
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<Provisioned, StoreError>;

    /// Creates an index. An identical index is `Unchanged`; same keys with
    /// different options is `IndexConflict`.
    async fn create_index(&self, collection: &str, index: &IndexSpec)
        -> Result<Provisioned, StoreError>;

    async fn insert_one(&self, collection: &str, document: Document) -> Result<ObjectId, StoreError>;

    /// Equality filter on dotted paths; array fields match when they contain the value.
    async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, StoreError>;

    /// Secondary indexes only; the implicit `_id` index is omitted.
    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError>;

    async fn explain_find(&self, collection: &str, filter: Document) -> Result<QueryPlan, StoreError>;
}
