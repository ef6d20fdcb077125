use bson::{oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};

use crate::models::Record;
use crate::schema::ACTIVITY_LOGS;

/// Append-only activity event. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub user_id: String,

    /// Free-form tag, e.g. `job_view` or `profile_update`.
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Document>,

    pub timestamp: DateTime,
}

impl ActivityLog {
    pub fn new(user_id: &str, action: &str, timestamp: DateTime) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            action: action.to_string(),
            target_id: None,
            metadata: None,
            timestamp,
        }
    }

    pub fn with_target(mut self, target_id: &str) -> Self {
        self.target_id = Some(target_id.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: Document) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl Record for ActivityLog {
    const COLLECTION: &'static str = ACTIVITY_LOGS;
}
