use reqwest::Client;

use crate::config::Config;

/// Shared gateway state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Client used to forward `/api/*` requests to the backend.
    pub http: Client,
    pub config: Config,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self { http, config })
    }
}
