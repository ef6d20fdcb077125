use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use crate::models::Record;
use crate::schema::RECOMMENDATIONS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    JobRecommendations,
    CandidateRecommendations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedItem {
    pub item_id: String,
    pub score: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// A scored recommendation batch. `expires_at` drives TTL deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub user_id: String,

    #[serde(rename = "type")]
    pub recommendation_type: RecommendationType,

    pub items: Vec<RecommendedItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,

    pub created_at: DateTime,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime>,
}

impl Recommendation {
    pub fn new(user_id: &str, recommendation_type: RecommendationType, created_at: DateTime) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            recommendation_type,
            items: Vec::new(),
            algorithm: None,
            created_at,
            expires_at: None,
        }
    }

    /// Sets `expires_at` to `created_at + ttl`.
    pub fn expiring_after(mut self, ttl: chrono::Duration) -> Self {
        let created = self.created_at.to_chrono();
        self.expires_at = Some(DateTime::from_chrono(created + ttl));
        self
    }
}

impl Record for Recommendation {
    const COLLECTION: &'static str = RECOMMENDATIONS;
}
