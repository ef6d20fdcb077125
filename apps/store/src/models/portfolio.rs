use bson::{oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};

use crate::models::Record;
use crate::schema::PORTFOLIOS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Portfolio {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub user_id: String,

    #[serde(default)]
    pub projects: Vec<Project>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_integration: Option<GithubIntegration>,

    pub created_at: DateTime,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_url: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Linked GitHub account. Repository entries are opaque sync payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubIntegration {
    pub username: String,
    #[serde(default)]
    pub repositories: Vec<Document>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime>,
}

impl Portfolio {
    pub fn new(user_id: &str, created_at: DateTime) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            projects: Vec::new(),
            github_integration: None,
            created_at,
            updated_at: None,
        }
    }
}

impl Record for Portfolio {
    const COLLECTION: &'static str = PORTFOLIOS;
}
