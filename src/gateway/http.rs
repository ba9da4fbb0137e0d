use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use time::{macros::format_description, Date, OffsetDateTime};
use tracing::{debug, error, instrument, warn};

use super::MealGateway;
use crate::config::ApiConfig;
use crate::error::{MealError, Result};
use crate::meals::{
    AnalysisResult, AnalyzeRequest, CreatedMeal, DuplicateMealRequest, MealRecord, PendingMeal,
};

/// Status the analyzer answers with when it is out of capacity.
const RATE_LIMIT_STATUS: StatusCode = StatusCode::SERVICE_UNAVAILABLE;

#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    user_id: i64,
    cooldown_secs: u64,
}

impl HttpGateway {
    pub fn new(cfg: &ApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            user_id: cfg.user_id,
            cooldown_secs: cfg.rate_limit_cooldown_secs,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json<T: DeserializeOwned>(
        res: Response,
        fail: fn(String) -> MealError,
    ) -> Result<T> {
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!(%status, body = %body, "meal api error");
            return Err(fail(format!("status {}", status)));
        }
        res.json::<T>().await.map_err(|e| {
            error!(error = %e, "meal api returned malformed body");
            fail(format!("malformed response: {}", e))
        })
    }
}

fn ymd(d: Date) -> String {
    // infallible for in-range dates
    d.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_default()
}

#[async_trait]
impl MealGateway for HttpGateway {
    #[instrument(skip(self, req), fields(text_len = req.text.len()))]
    async fn analyze(&self, req: &AnalyzeRequest) -> Result<AnalysisResult> {
        let res = self
            .client
            .post(self.url("/v1/meals/analyze"))
            .json(req)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "analyze request failed");
                MealError::AnalysisFailed(e.to_string())
            })?;

        if res.status() == RATE_LIMIT_STATUS {
            warn!(cooldown_secs = self.cooldown_secs, "analyzer is rate limited");
            return Err(MealError::RateLimited {
                cooldown_secs: self.cooldown_secs,
            });
        }

        let result: AnalysisResult = Self::read_json(res, MealError::AnalysisFailed).await?;
        debug!(items = result.food_items.len(), "meal analyzed");
        Ok(result)
    }

    #[instrument(skip(self, meal), fields(items = meal.food_items().len()))]
    async fn create(&self, meal: &PendingMeal) -> Result<CreatedMeal> {
        let body = meal.to_create_request(self.user_id);
        let res = self
            .client
            .post(self.url("/v1/meals/create"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "create request failed");
                MealError::PersistFailed(e.to_string())
            })?;

        let created: CreatedMeal = Self::read_json(res, MealError::PersistFailed).await?;
        debug!(id = created.id, "meal saved");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn list_recent(&self, limit: u32) -> Result<Vec<MealRecord>> {
        let res = self
            .client
            .get(self.url("/v1/meals/"))
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(|e| MealError::RequestFailed(e.to_string()))?;
        Self::read_json(res, MealError::RequestFailed).await
    }

    #[instrument(skip(self))]
    async fn list_range(&self, start: Date, end: Date) -> Result<Vec<MealRecord>> {
        let res = self
            .client
            .get(self.url("/v1/meals"))
            .query(&[("start_date", ymd(start)), ("end_date", ymd(end))])
            .send()
            .await
            .map_err(|e| MealError::RequestFailed(e.to_string()))?;
        Self::read_json(res, MealError::RequestFailed).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: i64) -> Result<()> {
        let res = self
            .client
            .delete(self.url(&format!("/v1/meals/{}", id)))
            .send()
            .await
            .map_err(|e| MealError::RequestFailed(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            error!(%status, id, "delete meal failed");
            return Err(MealError::RequestFailed(format!("status {}", status)));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn duplicate(&self, id: i64, new_eaten_at: OffsetDateTime) -> Result<MealRecord> {
        let res = self
            .client
            .post(self.url(&format!("/v1/meals/{}/duplicate", id)))
            .json(&DuplicateMealRequest { new_eaten_at })
            .send()
            .await
            .map_err(|e| MealError::RequestFailed(e.to_string()))?;
        Self::read_json(res, MealError::RequestFailed).await
    }
}
