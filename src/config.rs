use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub user_id: i64,
    pub persona: String,
    pub timeout_secs: u64,
    pub rate_limit_cooldown_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub daily_goal_kcal: f64,
    /// Analyze right after sending instead of waiting for `/analyze`.
    pub auto_analyze: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api = ApiConfig {
            base_url: std::env::var("MEALMIND_API_URL")
                .unwrap_or_else(|_| "http://localhost:8000".into())
                .trim_end_matches('/')
                .to_string(),
            user_id: env_parse("MEALMIND_USER_ID").unwrap_or(1),
            persona: std::env::var("MEALMIND_PERSONA").unwrap_or_else(|_| "friendly".into()),
            timeout_secs: env_parse("MEALMIND_HTTP_TIMEOUT_SECS").unwrap_or(30),
            rate_limit_cooldown_secs: env_parse("MEALMIND_RATE_LIMIT_COOLDOWN_SECS").unwrap_or(60),
        };
        if api.base_url.is_empty() {
            anyhow::bail!("MEALMIND_API_URL must not be empty");
        }
        Ok(Self {
            api,
            daily_goal_kcal: env_parse("MEALMIND_DAILY_GOAL_KCAL").unwrap_or(2000.0),
            auto_analyze: std::env::var("MEALMIND_AUTO_ANALYZE")
                .map(|v| v != "0" && v != "false")
                .unwrap_or(true),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}
