//! Store initialization: provisions every catalog collection, then its indexes.
//!
//! Safe to re-run: identical definitions come back `Unchanged`. Only a genuine
//! schema mismatch or a store that stays unreachable stops the run.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::errors::StoreError;
use crate::schema::CatalogSchema;
use crate::store::{DocumentStore, Provisioned};

/// Upper bound on a single backoff sleep.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Retries after the first attempt, for transient failures only.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles on each subsequent one.
    pub retry_delay: Duration,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub collection: String,
    pub outcome: Provisioned,
    pub indexes_created: usize,
    pub indexes_unchanged: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InitReport {
    pub collections: Vec<CollectionReport>,
}

impl InitReport {
    pub fn completed(&self) -> Vec<String> {
        self.collections.iter().map(|c| c.collection.clone()).collect()
    }
}

#[derive(Debug, Error)]
#[error("Initialization failed at '{failed}' after completing {completed:?}: {source}")]
pub struct InitError {
    pub failed: String,
    pub completed: Vec<String>,
    #[source]
    pub source: StoreError,
}

/// Provisions the catalog against `store`, one collection at a time.
pub async fn initialize(
    store: &dyn DocumentStore,
    catalog: &CatalogSchema,
    options: &InitOptions,
) -> Result<InitReport, InitError> {
    let mut report = InitReport::default();

    for schema in &catalog.collections {
        let fail = |report: &InitReport, source: StoreError| InitError {
            failed: schema.name.clone(),
            completed: report.completed(),
            source,
        };

        let outcome = with_retry(options, &schema.name, || store.create_collection(schema))
            .await
            .map_err(|e| fail(&report, e))?;

        let mut created = 0;
        let mut unchanged = 0;
        for index in &schema.indexes {
            let label = format!("{}.{}", schema.name, index.name());
            match with_retry(options, &label, || store.create_index(&schema.name, index))
                .await
                .map_err(|e| fail(&report, e))?
            {
                Provisioned::Created => created += 1,
                Provisioned::Unchanged => unchanged += 1,
            }
        }

        info!(
            "Collection '{}' {:?} (indexes: {} created, {} unchanged)",
            schema.name, outcome, created, unchanged
        );
        report.collections.push(CollectionReport {
            collection: schema.name.clone(),
            outcome,
            indexes_created: created,
            indexes_unchanged: unchanged,
        });
    }

    Ok(report)
}

/// Runs `op`, retrying transient failures with exponential backoff.
pub async fn with_retry<T, F, Fut>(
    options: &InitOptions,
    label: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Err(e) if e.is_transient() && attempt < options.max_retries => {
                let delay = backoff(options.retry_delay, attempt);
                attempt += 1;
                warn!(
                    "{label}: attempt {attempt} failed ({e}), retrying after {}ms...",
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }
            result => return result,
        }
    }
}

/// `base * 2^attempt`, capped at `MAX_RETRY_DELAY`.
fn backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{CollectionSchema, IndexSpec, COLLECTION_NAMES, PORTFOLIOS};
    use crate::store::{MemoryStore, QueryPlan};
    use async_trait::async_trait;
    use bson::{oid::ObjectId, Document};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Delegates to a `MemoryStore` but reports the store as unreachable for
    /// the first `outages` index calls on `flaky_collection`.
    struct FlakyStore {
        inner: MemoryStore,
        flaky_collection: &'static str,
        outages: AtomicU32,
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn create_collection(
            &self,
            schema: &CollectionSchema,
        ) -> Result<Provisioned, StoreError> {
            self.inner.create_collection(schema).await
        }

        async fn create_index(
            &self,
            collection: &str,
            index: &IndexSpec,
        ) -> Result<Provisioned, StoreError> {
            if collection == self.flaky_collection {
                let remaining = self.outages.load(Ordering::SeqCst);
                if remaining > 0 {
                    self.outages.store(remaining - 1, Ordering::SeqCst);
                    return Err(StoreError::StoreUnavailable("connection reset".into()));
                }
            }
            self.inner.create_index(collection, index).await
        }

        async fn insert_one(
            &self,
            collection: &str,
            document: Document,
        ) -> Result<ObjectId, StoreError> {
            self.inner.insert_one(collection, document).await
        }

        async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>, StoreError> {
            self.inner.find(collection, filter).await
        }

        async fn count(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
            self.inner.count(collection, filter).await
        }

        async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError> {
            self.inner.list_indexes(collection).await
        }

        async fn explain_find(
            &self,
            collection: &str,
            filter: Document,
        ) -> Result<QueryPlan, StoreError> {
            self.inner.explain_find(collection, filter).await
        }
    }

    fn fast() -> InitOptions {
        InitOptions {
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_first_run_creates_everything() {
        let store = MemoryStore::new();
        let catalog = CatalogSchema::load().unwrap();
        let report = initialize(&store, &catalog, &fast()).await.unwrap();

        assert_eq!(report.completed(), COLLECTION_NAMES);
        for (entry, schema) in report.collections.iter().zip(&catalog.collections) {
            assert_eq!(entry.outcome, Provisioned::Created);
            assert_eq!(entry.indexes_created, schema.indexes.len());
            assert_eq!(entry.indexes_unchanged, 0);
        }
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let store = MemoryStore::new();
        let catalog = CatalogSchema::load().unwrap();
        initialize(&store, &catalog, &fast()).await.unwrap();
        let report = initialize(&store, &catalog, &fast()).await.unwrap();

        for (entry, schema) in report.collections.iter().zip(&catalog.collections) {
            assert_eq!(entry.outcome, Provisioned::Unchanged);
            assert_eq!(entry.indexes_created, 0);
            assert_eq!(entry.indexes_unchanged, schema.indexes.len());

            let indexes = store.list_indexes(&schema.name).await.unwrap();
            assert_eq!(indexes, schema.indexes, "{}", schema.name);
        }
    }

    #[tokio::test]
    async fn test_validator_mismatch_is_fatal_and_reports_progress() {
        let store = MemoryStore::new();
        let catalog = CatalogSchema::load().unwrap();
        initialize(&store, &catalog, &fast()).await.unwrap();

        let mut changed = catalog.clone();
        changed
            .collections
            .iter_mut()
            .find(|c| c.name == PORTFOLIOS)
            .unwrap()
            .validator
            .required
            .push("projects".into());

        let err = initialize(&store, &changed, &fast()).await.unwrap_err();
        assert_eq!(err.failed, PORTFOLIOS);
        assert_eq!(err.completed, vec!["skill_sheets"]);
        assert!(matches!(err.source, StoreError::CollectionAlreadyExists { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_outage_is_retried() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            flaky_collection: PORTFOLIOS,
            outages: AtomicU32::new(2),
        };
        let catalog = CatalogSchema::load().unwrap();
        let report = initialize(&store, &catalog, &fast()).await.unwrap();
        assert_eq!(report.collections.len(), COLLECTION_NAMES.len());
        assert_eq!(store.outages.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_outage_names_completed_collections() {
        let store = FlakyStore {
            inner: MemoryStore::new(),
            flaky_collection: PORTFOLIOS,
            outages: AtomicU32::new(u32::MAX),
        };
        let catalog = CatalogSchema::load().unwrap();
        let err = initialize(&store, &catalog, &fast()).await.unwrap_err();

        assert_eq!(err.failed, PORTFOLIOS);
        assert_eq!(err.completed, vec!["skill_sheets"]);
        assert!(err.source.is_transient());
        // One initial attempt plus two retries.
        assert_eq!(store.outages.load(Ordering::SeqCst), u32::MAX - 3);
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff(base, 0), Duration::from_millis(500));
        assert_eq!(backoff(base, 3), Duration::from_secs(4));
        assert_eq!(backoff(base, 10), MAX_RETRY_DELAY);
        assert_eq!(backoff(base, 40), MAX_RETRY_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_retry_budget_ends_in_error() {
        let options = InitOptions {
            max_retries: 40,
            retry_delay: Duration::from_millis(1),
        };
        let calls = AtomicU32::new(0);
        let result: Result<(), StoreError> = with_retry(&options, "connect", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::StoreUnavailable("connection refused".into())) }
        })
        .await;

        assert!(matches!(result, Err(StoreError::StoreUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 41);
    }

    #[tokio::test]
    async fn test_deterministic_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), StoreError> = with_retry(&fast(), "probe", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StoreError::UnknownCollection("jobs".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
