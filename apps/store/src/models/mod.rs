//! Typed documents for the five collections.
//!
//! Typed writes go through the same validated `insert_one` path as raw
//! documents; nothing here bypasses the collection validators.
#![allow(dead_code)]

pub mod activity;
pub mod portfolio;
pub mod recommendation;
pub mod skill_sheet;
pub mod training_data;

use bson::{doc, oid::ObjectId};
use serde::{de::DeserializeOwned, Serialize};

use crate::errors::StoreError;
use crate::store::DocumentStore;

pub use activity::ActivityLog;
pub use portfolio::{GithubIntegration, Portfolio, Project};
pub use recommendation::{Recommendation, RecommendationType, RecommendedItem};
pub use skill_sheet::{AiAnalysis, ExperienceEntry, ParsedData, SkillSheet};
pub use training_data::{AiTrainingData, TrainingDataType};

/// A serde model bound to its collection's wire name.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: &'static str;
}

/// Serializes `record` to BSON and inserts it into its collection.
pub async fn insert_record<T: Record>(
    store: &dyn DocumentStore,
    record: &T,
) -> Result<ObjectId, StoreError> {
    let document = bson::to_document(record)?;
    store.insert_one(T::COLLECTION, document).await
}

/// All records owned by `user_id`.
pub async fn find_by_user<T: Record>(
    store: &dyn DocumentStore,
    user_id: &str,
) -> Result<Vec<T>, StoreError> {
    store
        .find(T::COLLECTION, doc! { "userId": user_id })
        .await?
        .into_iter()
        .map(|d| bson::from_document(d).map_err(StoreError::from))
        .collect()
}
