use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub payments_url: String,
    pub payments_api_key: String,
    pub busy_timeout_ms: u64,
    pub effect_queue_capacity: usize,
    pub effect_max_attempts: u32,
    pub effect_retry_backoff_ms: u64,
    pub id_seed: Option<u64>,
    pub scheduling: SchedulingConfig,
}

/// Tunables for the booking engine itself.
#[derive(Clone, Debug)]
pub struct SchedulingConfig {
    pub search_days: u32,
    /// Upper bound on any caller-supplied search window.
    pub max_search_days: u32,
    pub max_alternatives: usize,
    pub conflict_retries: u32,
    pub conflict_backoff_ms: u64,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            search_days: 14,
            max_search_days: 366,
            max_alternatives: 10,
            conflict_retries: 2,
            conflict_backoff_ms: 25,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = SchedulingConfig::default();
        Self {
            port: parse_var("PORT").unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "petcare.db".to_string()),
            payments_url: env::var("PAYMENTS_URL").unwrap_or_default(),
            payments_api_key: env::var("PAYMENTS_API_KEY").unwrap_or_default(),
            busy_timeout_ms: parse_var("BUSY_TIMEOUT_MS").unwrap_or(5000),
            effect_queue_capacity: parse_var("EFFECT_QUEUE_CAPACITY").unwrap_or(1024),
            effect_max_attempts: parse_var("EFFECT_MAX_ATTEMPTS").unwrap_or(5),
            effect_retry_backoff_ms: parse_var("EFFECT_RETRY_BACKOFF_MS").unwrap_or(200),
            id_seed: parse_var("ID_SEED"),
            scheduling: SchedulingConfig {
                search_days: parse_var("SEARCH_DAYS").unwrap_or(defaults.search_days),
                max_search_days: parse_var("MAX_SEARCH_DAYS").unwrap_or(defaults.max_search_days),
                max_alternatives: parse_var("MAX_ALTERNATIVES").unwrap_or(defaults.max_alternatives),
                conflict_retries: parse_var("CONFLICT_RETRIES").unwrap_or(defaults.conflict_retries),
                conflict_backoff_ms: parse_var("CONFLICT_BACKOFF_MS")
                    .unwrap_or(defaults.conflict_backoff_ms),
            },
        }
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
