//! MongoDB-backed `DocumentStore`.
//!
//! Validators are installed as `$jsonSchema` at collection creation, so the
//! server enforces them on every write; the TTL reaper is the server's own.

use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Bson, Document};
use futures_util::TryStreamExt;
use mongodb::{
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, Collection, Database, IndexModel,
};
use tracing::{debug, info};

use crate::errors::StoreError;
use crate::schema::validator::ValidationReport;
use crate::schema::{CollectionSchema, IndexKey, IndexSpec, SortOrder};
use crate::store::{DocumentStore, Provisioned, QueryPlan};

const NAMESPACE_NOT_FOUND: i32 = 26;
const NAMESPACE_EXISTS: i32 = 48;
const INDEX_OPTIONS_CONFLICT: i32 = 85;
const INDEX_KEY_SPECS_CONFLICT: i32 = 86;
const DOCUMENT_VALIDATION_FAILURE: i32 = 121;

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

impl MongoStore {
    /// Connects and pings `db_name`, failing fast when the server is unreachable.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        info!("Connecting to MongoDB...");

        // Bound server selection so an unreachable store fails fast
        let timeout_uri = if uri.contains('?') {
            format!("{uri}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000")
        } else {
            format!("{uri}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000")
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| StoreError::StoreUnavailable(format!("Failed to connect to MongoDB: {e}")))?;

        let db = client.database(db_name);
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::StoreUnavailable(format!("MongoDB ping failed: {e}")))?;

        info!("Connected to MongoDB database '{db_name}'");
        Ok(Self { client, db })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    /// `None` when the collection does not exist, otherwise its stored validator.
    async fn existing_validator(&self, name: &str) -> Result<Option<Option<Document>>, StoreError> {
        let mut cursor = self
            .db
            .list_collections()
            .filter(doc! { "name": name })
            .await
            .map_err(|e| map_mongo_error(name, None, e))?;

        let spec = cursor
            .try_next()
            .await
            .map_err(|e| map_mongo_error(name, None, e))?;
        Ok(spec.map(|s| s.options.validator))
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<Provisioned, StoreError> {
        let validator = schema
            .validator_document()
            .map_err(|e| StoreError::Store(e.to_string()))?;

        match self.existing_validator(&schema.name).await? {
            Some(existing) if existing.as_ref() == Some(&validator) => {
                debug!("Collection '{}' already defined with identical validator", schema.name);
                Ok(Provisioned::Unchanged)
            }
            Some(_) => Err(StoreError::CollectionAlreadyExists {
                collection: schema.name.clone(),
            }),
            None => {
                self.db
                    .create_collection(&schema.name)
                    .validator(validator)
                    .await
                    .map_err(|e| map_mongo_error(&schema.name, None, e))?;
                Ok(Provisioned::Created)
            }
        }
    }

    async fn create_index(
        &self,
        collection: &str,
        index: &IndexSpec,
    ) -> Result<Provisioned, StoreError> {
        let name = index.name();
        let existing = list_index_models(&self.collection(collection), collection).await?;

        if let Some(model) = existing
            .iter()
            .find(|m| m.options.as_ref().and_then(|o| o.name.as_deref()) == Some(name.as_str()))
        {
            return if index_spec_from_model(model).as_ref() == Some(index) {
                Ok(Provisioned::Unchanged)
            } else {
                Err(StoreError::IndexConflict {
                    collection: collection.to_string(),
                    index: name,
                })
            };
        }

        let mut options = IndexOptions::builder().name(name.clone()).build();
        options.expire_after = index.expire_after_seconds.map(Duration::from_secs);

        let model = IndexModel::builder()
            .keys(index.key_document())
            .options(options)
            .build();

        self.collection(collection)
            .create_index(model)
            .await
            .map_err(|e| map_mongo_error(collection, Some(&name), e))?;
        Ok(Provisioned::Created)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<ObjectId, StoreError> {
        let result = self
            .collection(collection)
            .insert_one(document)
            .await
            .map_err(|e| map_mongo_error(collection, None, e))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| StoreError::Store("Failed to get inserted ID".into()))
    }

    async fn find(&self, collection: &str, filter: Document) -> Result<Vec<Document>, StoreError> {
        let cursor = self
            .collection(collection)
            .find(filter)
            .await
            .map_err(|e| map_mongo_error(collection, None, e))?;

        cursor
            .try_collect()
            .await
            .map_err(|e| map_mongo_error(collection, None, e))
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, StoreError> {
        self.collection(collection)
            .count_documents(filter)
            .await
            .map_err(|e| map_mongo_error(collection, None, e))
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>, StoreError> {
        let models = list_index_models(&self.collection(collection), collection).await?;
        Ok(models
            .iter()
            .filter(|m| m.keys != doc! { "_id": 1 })
            .filter_map(index_spec_from_model)
            .collect())
    }

    async fn explain_find(&self, collection: &str, filter: Document) -> Result<QueryPlan, StoreError> {
        let command = doc! {
            "explain": { "find": collection, "filter": filter },
            "verbosity": "queryPlanner",
        };
        let response = self
            .db
            .run_command(command)
            .await
            .map_err(|e| map_mongo_error(collection, None, e))?;

        let winning = response
            .get_document("queryPlanner")
            .and_then(|planner| planner.get_document("winningPlan"))
            .map_err(|e| StoreError::Store(format!("Malformed explain output: {e}")))?;
        Ok(plan_from_stage(winning))
    }
}

async fn list_index_models(
    collection: &Collection<Document>,
    name: &str,
) -> Result<Vec<IndexModel>, StoreError> {
    let cursor = collection
        .list_indexes()
        .await
        .map_err(|e| map_mongo_error(name, None, e))?;
    cursor
        .try_collect()
        .await
        .map_err(|e| map_mongo_error(name, None, e))
}

/// Converts a server index back into an `IndexSpec`; `None` for index kinds
/// the catalog never declares (text, hashed, 2dsphere).
fn index_spec_from_model(model: &IndexModel) -> Option<IndexSpec> {
    let keys = model
        .keys
        .iter()
        .map(|(field, value)| {
            order_from_bson(value).map(|order| IndexKey {
                field: field.clone(),
                order,
            })
        })
        .collect::<Option<Vec<_>>>()?;

    let expire_after_seconds = model
        .options
        .as_ref()
        .and_then(|o| o.expire_after)
        .map(|d| d.as_secs());

    Some(IndexSpec {
        keys,
        expire_after_seconds,
    })
}

fn order_from_bson(value: &Bson) -> Option<SortOrder> {
    let n = match value {
        Bson::Int32(n) => *n,
        Bson::Int64(n) => i32::try_from(*n).ok()?,
        Bson::Double(d) if d.fract() == 0.0 => *d as i32,
        _ => return None,
    };
    SortOrder::try_from(n).ok()
}

/// Finds the access stage in an explain plan, descending through wrapper stages
/// (`FETCH`, `SORT`, SBE `queryPlan`) until an `IXSCAN` or a leaf is reached.
fn plan_from_stage(stage: &Document) -> QueryPlan {
    if matches!(stage.get_str("stage"), Ok("IXSCAN")) {
        if let Ok(index) = stage.get_str("indexName") {
            return QueryPlan::IndexScan {
                index: index.to_string(),
            };
        }
    }

    for key in ["queryPlan", "inputStage"] {
        if let Ok(child) = stage.get_document(key) {
            if let plan @ QueryPlan::IndexScan { .. } = plan_from_stage(child) {
                return plan;
            }
        }
    }

    if let Ok(children) = stage.get_array("inputStages") {
        for child in children.iter().filter_map(Bson::as_document) {
            if let plan @ QueryPlan::IndexScan { .. } = plan_from_stage(child) {
                return plan;
            }
        }
    }

    QueryPlan::CollectionScan
}

fn map_mongo_error(collection: &str, index: Option<&str>, err: MongoError) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write))
            if write.code == DOCUMENT_VALIDATION_FAILURE =>
        {
            StoreError::ValidationRejected {
                collection: collection.to_string(),
                report: ValidationReport::store_reported(write.message.clone()),
            }
        }
        ErrorKind::Command(command) => match command.code {
            NAMESPACE_EXISTS => StoreError::CollectionAlreadyExists {
                collection: collection.to_string(),
            },
            INDEX_OPTIONS_CONFLICT | INDEX_KEY_SPECS_CONFLICT => StoreError::IndexConflict {
                collection: collection.to_string(),
                index: index.unwrap_or_default().to_string(),
            },
            NAMESPACE_NOT_FOUND => StoreError::UnknownCollection(collection.to_string()),
            _ => StoreError::Store(err.to_string()),
        },
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => StoreError::StoreUnavailable(err.to_string()),
        _ => StoreError::Store(err.to_string()),
    }
}
