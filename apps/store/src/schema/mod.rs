//! Collection catalog: the five Proxima collections described as data.
//!
//! The catalog lives in `schema/collections.json`, shaped after MongoDB's
//! `$jsonSchema` so the same description can be handed to the store verbatim
//! and evaluated locally by [`validator::validate`].

pub mod validator;

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use bson::{doc, Bson, Document};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SKILL_SHEETS: &str = "skill_sheets";
pub const PORTFOLIOS: &str = "portfolios";
pub const ACTIVITY_LOGS: &str = "activity_logs";
pub const AI_TRAINING_DATA: &str = "ai_training_data";
pub const RECOMMENDATIONS: &str = "recommendations";

/// Wire names every catalog must define, in provisioning order.
pub const COLLECTION_NAMES: [&str; 5] = [
    SKILL_SHEETS,
    PORTFOLIOS,
    ACTIVITY_LOGS,
    AI_TRAINING_DATA,
    RECOMMENDATIONS,
];

const CATALOG_JSON: &str = include_str!("../../schema/collections.json");

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Catalog parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Catalog is missing collection '{0}'")]
    MissingCollection(String),

    #[error("Catalog defines collection '{0}' more than once")]
    DuplicateCollection(String),

    #[error("Catalog defines unexpected collection '{0}'")]
    UnexpectedCollection(String),

    #[error("Index on '{0}' has no keys")]
    EmptyIndex(String),

    #[error("TTL index '{index}' on '{collection}' must have exactly one key")]
    CompoundTtl { collection: String, index: String },

    #[error("Validator root of '{0}' must be an object schema")]
    NonObjectRoot(String),

    #[error("Validator encoding failed: {0}")]
    Encode(#[from] bson::ser::Error),
}

/// BSON types a validator node can demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BsonType {
    Object,
    Array,
    String,
    Date,
    Double,
    Int,
    Long,
    Bool,
    ObjectId,
}

impl BsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BsonType::Object => "object",
            BsonType::Array => "array",
            BsonType::String => "string",
            BsonType::Date => "date",
            BsonType::Double => "double",
            BsonType::Int => "int",
            BsonType::Long => "long",
            BsonType::Bool => "bool",
            BsonType::ObjectId => "objectId",
        }
    }

    /// Strict type test: an `int` never satisfies `double` and vice versa.
    pub fn matches(&self, value: &Bson) -> bool {
        matches!(
            (self, value),
            (BsonType::Object, Bson::Document(_))
                | (BsonType::Array, Bson::Array(_))
                | (BsonType::String, Bson::String(_))
                | (BsonType::Date, Bson::DateTime(_))
                | (BsonType::Double, Bson::Double(_))
                | (BsonType::Int, Bson::Int32(_))
                | (BsonType::Long, Bson::Int64(_))
                | (BsonType::Bool, Bson::Boolean(_))
                | (BsonType::ObjectId, Bson::ObjectId(_))
        )
    }
}

impl fmt::Display for BsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a `$jsonSchema` validator tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub bson_type: BsonType,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, FieldSchema>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSchema>>,

    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl TryFrom<i32> for SortOrder {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SortOrder::Ascending),
            -1 => Ok(SortOrder::Descending),
            other => Err(format!("index order must be 1 or -1, got {other}")),
        }
    }
}

impl From<SortOrder> for i32 {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKey {
    pub field: String,
    pub order: SortOrder,
}

/// A secondary index: ordered keys plus the optional TTL option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    pub keys: Vec<IndexKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_after_seconds: Option<u64>,
}

impl IndexSpec {
    pub fn single(field: &str, order: SortOrder) -> Self {
        Self {
            keys: vec![IndexKey {
                field: field.to_string(),
                order,
            }],
            expire_after_seconds: None,
        }
    }

    pub fn with_ttl(mut self, seconds: u64) -> Self {
        self.expire_after_seconds = Some(seconds);
        self
    }

    /// Store-convention name: `field_order` pairs joined by `_`,
    /// e.g. `parsedData.skills_1` or `createdAt_-1`.
    pub fn name(&self) -> String {
        self.keys
            .iter()
            .map(|k| format!("{}_{}", k.field, i32::from(k.order)))
            .collect::<Vec<_>>()
            .join("_")
    }

    pub fn key_document(&self) -> Document {
        let mut keys = Document::new();
        for key in &self.keys {
            keys.insert(key.field.clone(), i32::from(key.order));
        }
        keys
    }

    pub fn leading_field(&self) -> Option<&str> {
        self.keys.first().map(|k| k.field.as_str())
    }

    pub fn is_ttl(&self) -> bool {
        self.expire_after_seconds.is_some()
    }
}

/// A collection definition: wire name, validator tree, and indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub validator: FieldSchema,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
}

impl CollectionSchema {
    /// The validator as the store expects it: `{ "$jsonSchema": { ... } }`.
    pub fn validator_document(&self) -> Result<Document, SchemaError> {
        let json_schema = bson::to_document(&self.validator)?;
        Ok(doc! { "$jsonSchema": json_schema })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSchema {
    pub collections: Vec<CollectionSchema>,
}

impl CatalogSchema {
    /// Loads the catalog embedded at build time.
    pub fn load() -> Result<Self, SchemaError> {
        Self::from_json(CATALOG_JSON)
    }

    pub fn from_json(raw: &str) -> Result<Self, SchemaError> {
        let catalog: CatalogSchema = serde_json::from_str(raw)?;
        catalog.check()?;
        Ok(catalog)
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.iter().find(|c| c.name == name)
    }

    fn check(&self) -> Result<(), SchemaError> {
        let mut seen = HashSet::new();
        for collection in &self.collections {
            if !COLLECTION_NAMES.contains(&collection.name.as_str()) {
                return Err(SchemaError::UnexpectedCollection(collection.name.clone()));
            }
            if !seen.insert(collection.name.as_str()) {
                return Err(SchemaError::DuplicateCollection(collection.name.clone()));
            }
            if collection.validator.bson_type != BsonType::Object {
                return Err(SchemaError::NonObjectRoot(collection.name.clone()));
            }
            for index in &collection.indexes {
                if index.keys.is_empty() {
                    return Err(SchemaError::EmptyIndex(collection.name.clone()));
                }
                if index.is_ttl() && index.keys.len() != 1 {
                    return Err(SchemaError::CompoundTtl {
                        collection: collection.name.clone(),
                        index: index.name(),
                    });
                }
            }
        }

        for name in COLLECTION_NAMES {
            if !seen.contains(name) {
                return Err(SchemaError::MissingCollection(name.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_catalog_defines_all_collections_in_order() {
        let catalog = CatalogSchema::load().unwrap();
        let names: Vec<_> = catalog.collections.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, COLLECTION_NAMES);
    }

    #[test]
    fn test_required_fields_match_data_contract() {
        let catalog = CatalogSchema::load().unwrap();
        let required = |name: &str| catalog.get(name).unwrap().validator.required.clone();
        assert_eq!(required(SKILL_SHEETS), vec!["userId", "createdAt"]);
        assert_eq!(required(PORTFOLIOS), vec!["userId", "createdAt"]);
        assert_eq!(required(ACTIVITY_LOGS), vec!["userId", "action", "timestamp"]);
        assert_eq!(required(AI_TRAINING_DATA), vec!["type", "data", "createdAt"]);
        assert_eq!(
            required(RECOMMENDATIONS),
            vec!["userId", "type", "items", "createdAt"]
        );
    }

    #[test]
    fn test_recommendations_expire_through_ttl_index() {
        let catalog = CatalogSchema::load().unwrap();
        let ttl: Vec<_> = catalog
            .get(RECOMMENDATIONS)
            .unwrap()
            .indexes
            .iter()
            .filter(|i| i.is_ttl())
            .collect();
        assert_eq!(ttl.len(), 1);
        assert_eq!(ttl[0].name(), "expiresAt_1");
        assert_eq!(ttl[0].expire_after_seconds, Some(0));
    }

    #[test]
    fn test_only_recommendations_carry_ttl() {
        let catalog = CatalogSchema::load().unwrap();
        for collection in &catalog.collections {
            let has_ttl = collection.indexes.iter().any(|i| i.is_ttl());
            assert_eq!(has_ttl, collection.name == RECOMMENDATIONS, "{}", collection.name);
        }
    }

    #[test]
    fn test_index_names_follow_store_convention() {
        let catalog = CatalogSchema::load().unwrap();
        let names: Vec<_> = catalog
            .get(SKILL_SHEETS)
            .unwrap()
            .indexes
            .iter()
            .map(|i| i.name())
            .collect();
        assert_eq!(names, vec!["userId_1", "createdAt_-1", "parsedData.skills_1"]);
    }

    #[test]
    fn test_validator_document_wraps_json_schema() {
        let catalog = CatalogSchema::load().unwrap();
        let validator = catalog
            .get(AI_TRAINING_DATA)
            .unwrap()
            .validator_document()
            .unwrap();
        let schema = validator.get_document("$jsonSchema").unwrap();
        assert_eq!(schema.get_str("bsonType").unwrap(), "object");
        let type_enum = schema
            .get_document("properties")
            .unwrap()
            .get_document("type")
            .unwrap()
            .get_array("enum")
            .unwrap();
        assert_eq!(type_enum.len(), 3);
    }

    #[test]
    fn test_rejects_invalid_sort_order() {
        let raw = r#"{"keys": [{"field": "userId", "order": 2}]}"#;
        assert!(serde_json::from_str::<IndexSpec>(raw).is_err());
    }

    #[test]
    fn test_rejects_catalog_missing_a_collection() {
        let mut catalog = CatalogSchema::load().unwrap();
        catalog.collections.retain(|c| c.name != PORTFOLIOS);
        let raw = serde_json::to_string(&catalog).unwrap();
        assert!(matches!(
            CatalogSchema::from_json(&raw),
            Err(SchemaError::MissingCollection(name)) if name == PORTFOLIOS
        ));
    }

    #[test]
    fn test_rejects_duplicate_collection() {
        let mut catalog = CatalogSchema::load().unwrap();
        let copy = catalog.collections[0].clone();
        catalog.collections.push(copy);
        let raw = serde_json::to_string(&catalog).unwrap();
        assert!(matches!(
            CatalogSchema::from_json(&raw),
            Err(SchemaError::DuplicateCollection(_))
        ));
    }

    #[test]
    fn test_rejects_compound_ttl_index() {
        let mut catalog = CatalogSchema::load().unwrap();
        let recommendations = catalog
            .collections
            .iter_mut()
            .find(|c| c.name == RECOMMENDATIONS)
            .unwrap();
        recommendations.indexes.push(IndexSpec {
            keys: vec![
                IndexKey {
                    field: "userId".into(),
                    order: SortOrder::Ascending,
                },
                IndexKey {
                    field: "expiresAt".into(),
                    order: SortOrder::Ascending,
                },
            ],
            expire_after_seconds: Some(60),
        });
        let raw = serde_json::to_string(&catalog).unwrap();
        assert!(matches!(
            CatalogSchema::from_json(&raw),
            Err(SchemaError::CompoundTtl { .. })
        ));
    }
}
