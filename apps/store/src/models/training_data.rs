use bson::{oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};

use crate::models::Record;
use crate::schema::AI_TRAINING_DATA;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingDataType {
    SkillExtraction,
    JobMatching,
    TextEnhancement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiTrainingData {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(rename = "type")]
    pub data_type: TrainingDataType,

    pub data: Document,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,

    pub created_at: DateTime,
}

impl AiTrainingData {
    pub fn new(data_type: TrainingDataType, data: Document, created_at: DateTime) -> Self {
        Self {
            id: None,
            data_type,
            data,
            labels: None,
            created_at,
        }
    }
}

impl Record for AiTrainingData {
    const COLLECTION: &'static str = AI_TRAINING_DATA;
}
