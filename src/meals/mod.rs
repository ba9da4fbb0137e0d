mod dto;
pub mod editor;

use time::{Date, OffsetDateTime};

pub use dto::{
    AnalysisResult, AnalyzeRequest, CreateMealRequest, CreatedMeal, DuplicateMealRequest,
    MealRecord, MealType, PendingMeal,
};

/// Eaten-at for a copied meal: the chosen day at the current time of day.
pub fn copy_eaten_at(target: Date, now: OffsetDateTime) -> OffsetDateTime {
    now.replace_date(target)
}
