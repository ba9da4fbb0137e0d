use crate::config::{ApiConfig, AppConfig};
use crate::gateway::{HttpGateway, MealGateway, MemoryGateway};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub gateway: Arc<dyn MealGateway>,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let offline = std::env::var("MEALMIND_OFFLINE")
            .map(|v| v == "1" || v == "true")
            .unwrap_or(false);
        let gateway = if offline {
            tracing::warn!("MEALMIND_OFFLINE set; meals are kept in memory only");
            Arc::new(MemoryGateway::new(config.api.user_id)) as Arc<dyn MealGateway>
        } else {
            Arc::new(HttpGateway::new(&config.api)?) as Arc<dyn MealGateway>
        };

        Ok(Self { config, gateway })
    }

    pub fn from_parts(config: Arc<AppConfig>, gateway: Arc<dyn MealGateway>) -> Self {
        Self { config, gateway }
    }

    pub fn fake() -> Self {
        let config = Arc::new(AppConfig {
            api: ApiConfig {
                base_url: "http://fake.local".into(),
                user_id: 1,
                persona: "friendly".into(),
                timeout_secs: 5,
                rate_limit_cooldown_secs: 60,
            },
            daily_goal_kcal: 2000.0,
            auto_analyze: false,
        });
        let gateway = Arc::new(MemoryGateway::new(1)) as Arc<dyn MealGateway>;
        Self { config, gateway }
    }
}
