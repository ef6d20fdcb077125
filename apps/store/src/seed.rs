//! Development fixtures.
//!
//! Seeding never runs implicitly: it needs the explicit flag and is refused
//! outright in production. Each fixture is inserted only when it is missing,
//! so a re-run completes an interrupted seed without duplicating anything.

use std::collections::BTreeMap;

use bson::{doc, DateTime};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::StoreError;
use crate::models::{
    find_by_user, insert_record, ActivityLog, AiAnalysis, AiTrainingData, ExperienceEntry,
    GithubIntegration, ParsedData, Portfolio, Project, Recommendation, RecommendationType,
    RecommendedItem, Record, SkillSheet, TrainingDataType,
};
use crate::store::DocumentStore;

pub const SAMPLE_USER_ID: &str = "sample-user-id-1";

/// Training-data `source` and recommendation `algorithm` of the fixtures.
const FIXTURE_SOURCE: &str = "fixture";

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Fixture seeding is disabled; set SEED_FIXTURES=true or pass --seed")]
    Disabled,

    #[error("Refusing to seed fixtures into a production environment")]
    Production,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Explicit permission to insert fixtures.
#[derive(Debug, Clone)]
pub struct SeedGate {
    pub enabled: bool,
    pub production: bool,
}

impl SeedGate {
    pub fn from_config(config: &Config, cli_flag: bool) -> Self {
        Self {
            enabled: config.seed_fixtures || cli_flag,
            production: config.is_production(),
        }
    }

    pub fn check(&self) -> Result<(), SeedError> {
        if !self.enabled {
            return Err(SeedError::Disabled);
        }
        if self.production {
            return Err(SeedError::Production);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeedReport {
    pub inserted: BTreeMap<String, usize>,
    pub skipped: bool,
}

pub struct Fixtures {
    pub skill_sheet: SkillSheet,
    pub portfolio: Portfolio,
    pub activity_logs: Vec<ActivityLog>,
    pub training_data: AiTrainingData,
    pub recommendation: Recommendation,
}

/// Illustrative documents for one sample user, timestamped at `now`.
pub fn fixtures(now: DateTime) -> Fixtures {
    let skill_sheet = SkillSheet {
        raw_text: Some(
            "Frontend engineer, 5 years of experience with React, TypeScript and Next.js".into(),
        ),
        parsed_data: Some(ParsedData {
            skills: ["React", "TypeScript", "Next.js", "JavaScript", "HTML", "CSS"]
                .map(String::from)
                .to_vec(),
            experience: vec![ExperienceEntry {
                company: "Sample Corp".into(),
                position: "Frontend Engineer".into(),
                duration: "2020-01 to 2024-12".into(),
                description: Some("Built web applications with React".into()),
            }],
            education: vec![],
            certifications: vec![],
        }),
        ai_analysis: Some(AiAnalysis {
            skill_level: Some("senior".into()),
            recommended_improvements: vec![
                "Learn backend technologies".into(),
                "Study cloud platforms".into(),
            ],
            extracted_keywords: ["React", "TypeScript", "Frontend", "Web applications"]
                .map(String::from)
                .to_vec(),
        }),
        updated_at: Some(now),
        ..SkillSheet::new(SAMPLE_USER_ID, now)
    };

    let portfolio = Portfolio {
        projects: vec![
            Project {
                title: "E-commerce site".into(),
                description: "E-commerce storefront built with React and Node.js".into(),
                technologies: ["React", "Node.js", "MongoDB", "Express.js"]
                    .map(String::from)
                    .to_vec(),
                github_url: Some("https://github.com/sample/ecommerce-site".into()),
                live_url: Some("https://sample-ecommerce.com".into()),
                images: vec![
                    "https://example.com/image1.jpg".into(),
                    "https://example.com/image2.jpg".into(),
                ],
            },
            Project {
                title: "Task manager".into(),
                description: "Task management app built with Next.js and TypeScript".into(),
                technologies: ["Next.js", "TypeScript", "PostgreSQL", "Prisma"]
                    .map(String::from)
                    .to_vec(),
                github_url: Some("https://github.com/sample/task-manager".into()),
                live_url: Some("https://sample-tasks.com".into()),
                images: vec!["https://example.com/task1.jpg".into()],
            },
        ],
        github_integration: Some(GithubIntegration {
            username: "sampleuser".into(),
            repositories: vec![],
            last_synced: Some(now),
        }),
        updated_at: Some(now),
        ..Portfolio::new(SAMPLE_USER_ID, now)
    };

    let activity_logs = vec![
        ActivityLog::new(SAMPLE_USER_ID, "job_view", now)
            .with_target("job-id-1")
            .with_metadata(doc! {
                "jobTitle": "React developer wanted",
                "searchQuery": "React remote",
                "userAgent": "Mozilla/5.0...",
                "ipAddress": "192.168.1.1",
            }),
        ActivityLog::new(SAMPLE_USER_ID, "profile_update", now)
            .with_target(SAMPLE_USER_ID)
            .with_metadata(doc! {
                "updatedFields": ["bio", "skills"],
                "previousValues": {},
            }),
    ];

    let training_data = AiTrainingData {
        labels: Some(vec!["React".into(), "TypeScript".into()]),
        ..AiTrainingData::new(
            TrainingDataType::SkillExtraction,
            doc! { "text": "5 years of React and TypeScript", "source": FIXTURE_SOURCE },
            now,
        )
    };

    let recommendation = Recommendation {
        items: vec![RecommendedItem {
            item_id: "job-id-1".into(),
            score: 0.87,
            reasons: vec!["React".into(), "TypeScript".into()],
        }],
        algorithm: Some(FIXTURE_SOURCE.into()),
        ..Recommendation::new(SAMPLE_USER_ID, RecommendationType::JobRecommendations, now)
    }
    .expiring_after(chrono::Duration::days(7));

    Fixtures {
        skill_sheet,
        portfolio,
        activity_logs,
        training_data,
        recommendation,
    }
}

/// Inserts whichever fixtures are missing, if `gate` allows it.
/// `skipped` is set when every fixture was already present.
pub async fn seed_fixtures(
    store: &dyn DocumentStore,
    gate: &SeedGate,
) -> Result<SeedReport, SeedError> {
    gate.check()?;

    let fixtures = fixtures(DateTime::now());
    let mut report = SeedReport::default();
    let mut tally = |collection: &str| *report.inserted.entry(collection.to_string()).or_insert(0) += 1;

    if find_by_user::<SkillSheet>(store, SAMPLE_USER_ID).await?.is_empty() {
        insert_record(store, &fixtures.skill_sheet).await?;
        tally(SkillSheet::COLLECTION);
    }

    if find_by_user::<Portfolio>(store, SAMPLE_USER_ID).await?.is_empty() {
        insert_record(store, &fixtures.portfolio).await?;
        tally(Portfolio::COLLECTION);
    }

    let logged: Vec<ActivityLog> = find_by_user(store, SAMPLE_USER_ID).await?;
    for log in &fixtures.activity_logs {
        if !logged.iter().any(|existing| existing.action == log.action) {
            insert_record(store, log).await?;
            tally(ActivityLog::COLLECTION);
        }
    }

    let training = store
        .count(AiTrainingData::COLLECTION, doc! { "data.source": FIXTURE_SOURCE })
        .await?;
    if training == 0 {
        insert_record(store, &fixtures.training_data).await?;
        tally(AiTrainingData::COLLECTION);
    }

    let recommendations: Vec<Recommendation> = find_by_user(store, SAMPLE_USER_ID).await?;
    if !recommendations
        .iter()
        .any(|r| r.algorithm.as_deref() == Some(FIXTURE_SOURCE))
    {
        insert_record(store, &fixtures.recommendation).await?;
        tally(Recommendation::COLLECTION);
    }

    if report.inserted.is_empty() {
        info!("Fixtures already present for '{SAMPLE_USER_ID}', skipping seed");
        report.skipped = true;
    } else {
        info!("Inserted sample data for development: {:?}", report.inserted);
    }
    Ok(report)
}

/// Seeding step of `init`. A disabled gate is a normal outcome (`None`);
/// only an explicit request to seed a production store is an error.
pub async fn run_seed(
    store: &dyn DocumentStore,
    gate: &SeedGate,
) -> Result<Option<SeedReport>, SeedError> {
    match seed_fixtures(store, gate).await {
        Ok(report) => Ok(Some(report)),
        Err(SeedError::Disabled) => {
            info!("Fixture seeding disabled");
            Ok(None)
        }
        Err(SeedError::Production) => {
            warn!("Seeding was requested in production; no fixtures inserted");
            Err(SeedError::Production)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::{initialize, InitOptions};
    use crate::schema::{
        CatalogSchema, ACTIVITY_LOGS, AI_TRAINING_DATA, PORTFOLIOS, RECOMMENDATIONS, SKILL_SHEETS,
    };
    use crate::store::MemoryStore;

    fn allowed() -> SeedGate {
        SeedGate {
            enabled: true,
            production: false,
        }
    }

    async fn initialized() -> MemoryStore {
        let store = MemoryStore::new();
        initialize(&store, &CatalogSchema::load().unwrap(), &InitOptions::default())
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_seed_inserts_linked_fixtures() {
        let store = initialized().await;
        let report = seed_fixtures(&store, &allowed()).await.unwrap();
        assert!(!report.skipped);

        let user = doc! { "userId": SAMPLE_USER_ID };
        assert_eq!(store.count(SKILL_SHEETS, user.clone()).await.unwrap(), 1);
        assert_eq!(store.count(PORTFOLIOS, user.clone()).await.unwrap(), 1);
        assert_eq!(store.count(ACTIVITY_LOGS, user.clone()).await.unwrap(), 2);
        assert_eq!(store.count(RECOMMENDATIONS, user).await.unwrap(), 1);
        assert_eq!(store.count(AI_TRAINING_DATA, doc! {}).await.unwrap(), 1);
        assert_eq!(report.inserted.get(ACTIVITY_LOGS), Some(&2));
    }

    #[tokio::test]
    async fn test_reseed_is_skipped() {
        let store = initialized().await;
        seed_fixtures(&store, &allowed()).await.unwrap();
        let report = seed_fixtures(&store, &allowed()).await.unwrap();

        assert!(report.skipped);
        assert!(report.inserted.is_empty());
        assert_eq!(store.count(ACTIVITY_LOGS, doc! {}).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_disabled_gate_inserts_nothing() {
        let store = initialized().await;
        let gate = SeedGate {
            enabled: false,
            production: false,
        };
        assert!(matches!(
            seed_fixtures(&store, &gate).await,
            Err(SeedError::Disabled)
        ));
        assert_eq!(store.count(SKILL_SHEETS, doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_production_refuses_even_when_enabled() {
        let store = initialized().await;
        let gate = SeedGate {
            enabled: true,
            production: true,
        };
        assert!(matches!(
            seed_fixtures(&store, &gate).await,
            Err(SeedError::Production)
        ));
        assert_eq!(store.count(PORTFOLIOS, doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seed_before_init_surfaces_store_error() {
        let store = MemoryStore::new();
        assert!(matches!(
            seed_fixtures(&store, &allowed()).await,
            Err(SeedError::Store(StoreError::UnknownCollection(_)))
        ));
    }

    #[test]
    fn test_fixture_recommendation_expires_in_a_week() {
        let now = DateTime::from_millis(1_700_000_000_000);
        let fx = fixtures(now);
        let expires = fx.recommendation.expires_at.unwrap().timestamp_millis();
        assert_eq!(expires - now.timestamp_millis(), 7 * 24 * 3600 * 1000);
    }

    #[tokio::test]
    async fn test_interrupted_seed_is_completed_on_rerun() {
        let store = initialized().await;
        let fx = fixtures(DateTime::now());
        insert_record(&store, &fx.skill_sheet).await.unwrap();
        insert_record(&store, &fx.activity_logs[0]).await.unwrap();

        let report = seed_fixtures(&store, &allowed()).await.unwrap();
        assert!(!report.skipped);
        assert_eq!(report.inserted.get(SKILL_SHEETS), None);
        assert_eq!(report.inserted.get(ACTIVITY_LOGS), Some(&1));
        assert_eq!(report.inserted.get(RECOMMENDATIONS), Some(&1));

        let user = doc! { "userId": SAMPLE_USER_ID };
        assert_eq!(store.count(SKILL_SHEETS, user.clone()).await.unwrap(), 1);
        assert_eq!(store.count(ACTIVITY_LOGS, user.clone()).await.unwrap(), 2);
        assert_eq!(store.count(PORTFOLIOS, user).await.unwrap(), 1);
        assert_eq!(store.count(AI_TRAINING_DATA, doc! {}).await.unwrap(), 1);
    }

    #[test]
    fn test_production_without_flag_is_disabled_not_refused() {
        let config = Config::from_lookup(|key| (key == "APP_ENV").then(|| "production".to_string()))
            .unwrap();
        let gate = SeedGate::from_config(&config, false);
        assert!(matches!(gate.check(), Err(SeedError::Disabled)));
        assert!(matches!(
            SeedGate::from_config(&config, true).check(),
            Err(SeedError::Production)
        ));
    }

    #[tokio::test]
    async fn test_run_seed_in_production_without_flag_succeeds() {
        let store = initialized().await;
        let gate = SeedGate {
            enabled: false,
            production: true,
        };
        assert!(run_seed(&store, &gate).await.unwrap().is_none());
        assert_eq!(store.count(SKILL_SHEETS, doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_seed_refuses_explicit_production_request() {
        let store = initialized().await;
        let gate = SeedGate {
            enabled: true,
            production: true,
        };
        assert!(matches!(
            run_seed(&store, &gate).await,
            Err(SeedError::Production)
        ));
    }

    #[tokio::test]
    async fn test_run_seed_reports_inserted_fixtures() {
        let store = initialized().await;
        let report = run_seed(&store, &allowed()).await.unwrap().unwrap();
        assert_eq!(report.inserted.get(SKILL_SHEETS), Some(&1));
    }

    #[test]
    fn test_gate_from_config_honors_cli_flag() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert!(!SeedGate::from_config(&config, false).enabled);
        assert!(SeedGate::from_config(&config, true).check().is_ok());
    }
}
