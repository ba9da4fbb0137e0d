mod http;
mod memory;

pub use http::HttpGateway;
pub use memory::MemoryGateway;

use async_trait::async_trait;
use time::{Date, OffsetDateTime};

use crate::error::Result;
use crate::meals::{AnalysisResult, AnalyzeRequest, CreatedMeal, MealRecord, PendingMeal};

/// Everything the diary needs from the meal backend.
#[async_trait]
pub trait MealGateway: Send + Sync {
    /// `RateLimited` on the capacity signal, `AnalysisFailed` otherwise.
    async fn analyze(&self, req: &AnalyzeRequest) -> Result<AnalysisResult>;

    /// No deduplication: retrying after an ambiguous failure may store the
    /// meal twice.
    async fn create(&self, meal: &PendingMeal) -> Result<CreatedMeal>;

    async fn list_recent(&self, limit: u32) -> Result<Vec<MealRecord>>;
    async fn list_range(&self, start: Date, end: Date) -> Result<Vec<MealRecord>>;
    async fn delete(&self, id: i64) -> Result<()>;
    async fn duplicate(&self, id: i64, new_eaten_at: OffsetDateTime) -> Result<MealRecord>;
}
