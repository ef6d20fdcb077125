use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, DateTime, Document};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::schema::validator::validate;
use crate::schema::{CollectionSchema, IndexSpec};
use crate::store::{DocumentStore, Provisioned, QueryPlan};

/// Matches the default `ttlMonitorSleepSecs` of a MongoDB deployment.
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(60);

struct MemoryCollection {
    schema: CollectionSchema,
    indexes: Vec<IndexSpec>,
    documents: Vec<Document>,
}

/// In-process document store with validator enforcement and a TTL reaper.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, MemoryCollection>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deletes every document whose TTL-indexed date is past its expiry at `now`.
    /// Returns the number of documents removed.
    pub async fn sweep_expired(&self, now: DateTime) -> usize {
        let mut collections = self.collections.write().await;
        let mut removed = 0;

        for (name, collection) in collections.iter_mut() {
            let ttl_indexes: Vec<(String, u64)> = collection
                .indexes
                .iter()
                .filter_map(|index| {
                    let seconds = index.expire_after_seconds?;
                    let field = index.leading_field()?;
                    Some((field.to_string(), seconds))
                })
                .collect();
            if ttl_indexes.is_empty() {
                continue;
            }

            let before = collection.documents.len();
            collection.documents.retain(|doc| {
                !ttl_indexes
                    .iter()
                    .any(|(field, seconds)| is_expired(doc, field, *seconds, now))
            });
            let swept = before - collection.documents.len();
            if swept > 0 {
                debug!("TTL sweep removed {swept} document(s) from '{name}'");
            }
            removed += swept;
        }

        removed
    }

    /// Runs `sweep_expired` every `interval` until the handle is aborted.
    pub fn spawn_reaper(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        info!("Starting TTL reaper (interval {}s)", interval.as_secs());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                store.sweep_expired(DateTime::now()).await;
            }
        })
    }
}

/// A document expires when the earliest date under `field` plus `seconds` is in the past.
/// Documents without a date there never expire.
fn is_expired(doc: &Document, field: &str, seconds: u64, now: DateTime) -> bool {
    let earliest = resolve_path(doc, field)
        .into_iter()
        .filter_map(|value| match value {
            Bson::DateTime(dt) => Some(dt.timestamp_millis()),
            _ => None,
        })
        .min();

    match earliest {
        Some(millis) => {
            let ttl_millis = i64::try_from(seconds)
                .unwrap_or(i64::MAX)
                .saturating_mul(1000);
            millis.saturating_add(ttl_millis) < now.timestamp_millis()
        }
        None => false,
    }
}

/// Every value reachable at a dotted path, descending through arrays of
/// sub-documents. A terminal array contributes itself and its elements.
fn resolve_path<'a>(doc: &'a Document, path: &str) -> Vec<&'a Bson> {
    let parts: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = parts.split_first() {
        if let Some(value) = doc.get(*head) {
            resolve(value, rest, &mut out);
        }
    }
    out
}

fn resolve<'a>(value: &'a Bson, path: &[&str], out: &mut Vec<&'a Bson>) {
    match path.split_first() {
        None => {
            out.push(value);
            if let Bson::Array(items) = value {
                out.extend(items.iter());
            }
        }
        Some((head, rest)) => match value {
            Bson::Document(doc) => {
                if let Some(next) = doc.get(*head) {
                    resolve(next, rest, out);
                }
            }
            Bson::Array(items) => {
                for item in items.iter().filter(|i| matches!(i, Bson::Document(_))) {
                    resolve(item, path, out);
                }
            }
            _ => {}
        },
    }
}

fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(path, expected)| {
        if path == "_id" {
            return doc.get("_id") == Some(expected);
        }
        resolve_path(doc, path).into_iter().any(|value| value == expected)
    })
}

impl MemoryStore {
    async fn with_collection<T>(
        &self,
        name: &str,
        f: impl FnOnce(&MemoryCollection) -> T,
    ) -> Result<T, StoreError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))?;
        Ok(f(collection))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<Provisioned, StoreError> {
        let mut collections = self.collections.write().await;

        if let Some(existing) = collections.get(&schema.name) {
            if existing.schema.validator == schema.validator {
                return Ok(Provisioned::Unchanged);
            }
            return Err(StoreError::CollectionAlreadyExists {
                collection: schema.name.clone(),
            });
        }

        collections.insert(
            schema.name.clone(),
            MemoryCollection {
                schema: schema.clone(),
                indexes: Vec::new(),
                documents: Vec::new(),
            },
        );
        Ok(Provisioned::Created)
    }

    async fn create_index(
        &self,
        collection: &str,
        index: &IndexSpec,
    ) -> Result<Provisioned, StoreError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let name = index.name();
        if let Some(existing) = target.indexes.iter().find(|i| i.name() == name) {
            if existing == index {
                return Ok(Provisioned::Unchanged);
            }
            return Err(StoreError::IndexConflict {
                collection: collection.to_string(),
                index: name,
            });
        }

        target.indexes.push(index.clone());
        Ok(Provisioned::Created)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<ObjectId, StoreError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        validate(&target.schema.validator, &document).map_err(|report| {
            StoreError::ValidationRejected {
                collection: collection.to_string(),
                report,
            }
        })?;

        let id = match document.get("_id") {
            Some(Bson::ObjectId(id)) => *id,
            Some(other) => {
                return Err(StoreError::Store(format!(
                    "unsupported _id value {other} in '{collection}'"
                )))
            }
            None => ObjectId::new(),
        };
        if target
            .documents
            .iter()
            .any(|d| d.get_object_id("_id").ok() == Some(id))
        {
            return Err(StoreError::Store(format!(
                "duplicate _id {id} in '{collection}'"
            )));
        }

        let mut stored = Document::new();
        stored.insert("_id", id);
        for (key, value) in document {
            if key != "_id" {
                stored.insert(key, value);
            }
        }
        target.documents.push(stored);

        Ok(id)
    }

    async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>, StoreError> {
        self.with_collection(collection, |c| {
            c.documents
                .iter()
                .filter(|doc| matches_filter(doc, &filter))
                .cloned()
                .collect()
        })
        .await
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        self.with_collection(collection, |c| {
            c.documents
                .iter()
                .filter(|doc| matches_filter(doc, &filter))
                .count() as u64
        })
        .await
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError> {
        self.with_collection(collection, |c| c.indexes.clone()).await
    }

    async fn explain_find(&self, collection: &str, filter: Document) -> Result<QueryPlan, StoreError> {
        self.with_collection(collection, |c| {
            c.indexes
                .iter()
                .find(|index| {
                    index
                        .leading_field()
                        .is_some_and(|field| filter.contains_key(field))
                })
                .map(|index| QueryPlan::IndexScan {
                    index: index.name(),
                })
                .unwrap_or(QueryPlan::CollectionScan)
        })
        .await
    }
}
