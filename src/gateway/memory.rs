use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use time::{format_description::well_known::Rfc3339, Date, OffsetDateTime};
use tokio::sync::Mutex;
use tracing::debug;

use super::MealGateway;
use crate::error::{MealError, Result};
use crate::meals::{AnalysisResult, AnalyzeRequest, CreatedMeal, MealRecord, MealType, PendingMeal};
use crate::nutrition::{sum_kcal, sum_macros, FoodItem};

const GUESS_KCAL: f64 = 100.0;

/// Backend stand-in kept in process memory. Every comma separated term of an
/// utterance becomes one item with a flat calorie guess.
pub struct MemoryGateway {
    user_id: i64,
    next_id: AtomicI64,
    records: Mutex<Vec<MealRecord>>,
}

impl MemoryGateway {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            next_id: AtomicI64::new(1),
            records: Mutex::new(Vec::new()),
        }
    }

    fn now_string() -> String {
        OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default()
    }
}

#[async_trait]
impl MealGateway for MemoryGateway {
    async fn analyze(&self, req: &AnalyzeRequest) -> Result<AnalysisResult> {
        let food_items: Vec<FoodItem> = req
            .text
            .split([',', '\n'])
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| FoodItem::new(t, "1 serving", GUESS_KCAL).with_macros(12.0, 5.0, 3.0))
            .collect();
        if food_items.is_empty() {
            return Err(MealError::AnalysisFailed("nothing to analyze".into()));
        }
        Ok(AnalysisResult {
            meal_type: req.meal_type_hint.unwrap_or(MealType::Snack),
            eaten_at: Some(req.client_local_time),
            total_kcal: sum_kcal(&food_items),
            macros: sum_macros(&food_items),
            message: format!("Logged {} item(s) with a rough estimate.", food_items.len()),
            food_items,
            suggestions: None,
            confidence: Some(0.1),
        })
    }

    async fn create(&self, meal: &PendingMeal) -> Result<CreatedMeal> {
        let body = meal.to_create_request(self.user_id);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let created_at = Self::now_string();
        self.records.lock().await.push(MealRecord {
            id,
            user_id: body.user_id,
            raw_text: body.raw_text,
            meal_type: body.meal_type,
            eaten_at: body.eaten_at,
            items_json: body.items,
            total_kcal: body.total_kcal,
            macros: body.macros,
            ai_summary: Some(body.ai_summary),
            created_at: created_at.clone(),
        });
        debug!(id, "meal stored in memory");
        Ok(CreatedMeal {
            id,
            created_at,
            message: "saved".into(),
        })
    }

    async fn list_recent(&self, limit: u32) -> Result<Vec<MealRecord>> {
        let mut rows = self.records.lock().await.clone();
        rows.sort_by(|a, b| b.eaten_at.cmp(&a.eaten_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn list_range(&self, start: Date, end: Date) -> Result<Vec<MealRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .iter()
            .filter(|r| (start..=end).contains(&r.eaten_at.date()))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut rows = self.records.lock().await;
        let before = rows.len();
        rows.retain(|r| r.id != id);
        if rows.len() == before {
            return Err(MealError::RequestFailed(format!("meal {} not found", id)));
        }
        Ok(())
    }

    async fn duplicate(&self, id: i64, new_eaten_at: OffsetDateTime) -> Result<MealRecord> {
        let mut rows = self.records.lock().await;
        let source = rows
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| MealError::RequestFailed(format!("meal {} not found", id)))?;
        let copy = MealRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            eaten_at: new_eaten_at,
            created_at: Self::now_string(),
            ..source
        };
        rows.push(copy.clone());
        Ok(copy)
    }
}
