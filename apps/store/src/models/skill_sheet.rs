use bson::{oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};

use crate::models::Record;
use crate::schema::SKILL_SHEETS;

/// An uploaded skill sheet with its parsed structure and AI analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSheet {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    pub user_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_data: Option<ParsedData>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_analysis: Option<AiAnalysis>,

    pub created_at: DateTime,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedData {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub education: Vec<Document>,
    #[serde(default)]
    pub certifications: Vec<Document>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub company: String,
    pub position: String,
    pub duration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiAnalysis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_level: Option<String>,
    #[serde(default)]
    pub recommended_improvements: Vec<String>,
    #[serde(default)]
    pub extracted_keywords: Vec<String>,
}

impl SkillSheet {
    pub fn new(user_id: &str, created_at: DateTime) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            raw_text: None,
            parsed_data: None,
            ai_analysis: None,
            created_at,
            updated_at: None,
        }
    }
}

impl Record for SkillSheet {
    const COLLECTION: &'static str = SKILL_SHEETS;
}
