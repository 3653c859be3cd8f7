use std::sync::Arc;

use sqlx::SqlitePool;

use crate::messaging::MessagingPort;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub jwt: JwtConfig,
    pub messaging: Arc<dyn MessagingPort>,
    pub webhook_token: Option<String>,
    pub commission_rate: f64,
    pub narrative: NarrativeConfig,
}

#[derive(Clone, Debug)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_hours: i64,
}

impl JwtConfig {
    pub fn from_env() -> Self {
        let secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            log::warn!("JWT_SECRET not set. Using an insecure default; set JWT_SECRET in production.");
            "change-me".to_string()
        });
        let ttl_hours = std::env::var("JWT_TTL_HOURS")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(12);
        Self { secret, ttl_hours }
    }
}

#[derive(Clone, Debug, Default)]
pub struct NarrativeConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl NarrativeConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            model: std::env::var("NARRATIVE_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            base_url: std::env::var("NARRATIVE_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }
}
