use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::MealError;
use crate::nutrition::{sum_kcal, sum_macros, FoodItem, MacroTotals};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    // anything the analyzer invents lands here
    #[serde(other)]
    Snack,
}

impl MealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "breakfast",
            MealType::Lunch => "lunch",
            MealType::Dinner => "dinner",
            MealType::Snack => "snack",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = MealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "breakfast" => Ok(MealType::Breakfast),
            "lunch" => Ok(MealType::Lunch),
            "dinner" => Ok(MealType::Dinner),
            "snack" => Ok(MealType::Snack),
            other => Err(MealError::validation(format!("unknown meal type: {other}"))),
        }
    }
}

/// Body of `POST /v1/meals/analyze`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeRequest {
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub client_local_time: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meal_type_hint: Option<MealType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,
}

/// Successful answer of the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub meal_type: MealType,
    #[serde(default, with = "lenient_datetime::option")]
    pub eaten_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub total_kcal: f64,
    #[serde(default)]
    pub macros: Option<MacroTotals>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub food_items: Vec<FoodItem>,
    #[serde(default)]
    pub suggestions: Option<Vec<FoodItem>>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// A meal that exists only on this side until it is saved.
///
/// `total_kcal` and `macros` always equal what [`sum_kcal`] and [`sum_macros`]
/// give for `food_items`; only the editor functions change them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingMeal {
    pub(crate) meal_type: MealType,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) eaten_at: OffsetDateTime,
    pub(crate) raw_text: String,
    pub(crate) food_items: Vec<FoodItem>,
    pub(crate) total_kcal: f64,
    pub(crate) macros: Option<MacroTotals>,
    pub(crate) ai_summary: String,
    pub(crate) suggestions: Vec<FoodItem>,
    pub(crate) confidence: Option<f64>,
}

impl PendingMeal {
    /// Seed a pending meal from an analysis. `fallback_eaten_at` is used when
    /// the analyzer did not place the meal in time.
    pub fn from_analysis(
        raw_text: impl Into<String>,
        result: AnalysisResult,
        fallback_eaten_at: OffsetDateTime,
    ) -> Self {
        let food_items: Vec<FoodItem> = result.food_items.into_iter().map(sanitize).collect();
        let suggestions = result
            .suggestions
            .unwrap_or_default()
            .into_iter()
            .map(sanitize)
            .collect();

        let mut meal = Self {
            meal_type: result.meal_type,
            eaten_at: result.eaten_at.unwrap_or(fallback_eaten_at),
            raw_text: raw_text.into(),
            food_items,
            total_kcal: 0.0,
            macros: None,
            ai_summary: result.message,
            suggestions,
            confidence: result.confidence,
        };
        meal.recompute();

        if (meal.total_kcal - result.total_kcal).abs() > f64::EPSILON {
            debug!(
                reported = result.total_kcal,
                derived = meal.total_kcal,
                "analyzer total differs from item sum; using item sum"
            );
        }
        meal
    }

    pub(crate) fn recompute(&mut self) {
        self.total_kcal = sum_kcal(&self.food_items).max(0.0);
        self.macros = sum_macros(&self.food_items).map(|m| MacroTotals {
            carbs: m.carbs.max(0.0),
            protein: m.protein.max(0.0),
            fat: m.fat.max(0.0),
        });
    }

    /// Persisted-record shape: `food_items` goes out as `items`.
    pub fn to_create_request(&self, user_id: i64) -> CreateMealRequest {
        CreateMealRequest {
            user_id,
            raw_text: self.raw_text.clone(),
            meal_type: self.meal_type,
            eaten_at: self.eaten_at,
            items: self.food_items.clone(),
            total_kcal: self.total_kcal,
            macros: self.macros,
            ai_summary: self.ai_summary.clone(),
            confidence: self.confidence,
        }
    }

    pub fn meal_type(&self) -> MealType {
        self.meal_type
    }
    pub fn eaten_at(&self) -> OffsetDateTime {
        self.eaten_at
    }
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }
    pub fn food_items(&self) -> &[FoodItem] {
        &self.food_items
    }
    pub fn total_kcal(&self) -> f64 {
        self.total_kcal
    }
    pub fn macros(&self) -> Option<MacroTotals> {
        self.macros
    }
    pub fn ai_summary(&self) -> &str {
        &self.ai_summary
    }
    pub fn suggestions(&self) -> &[FoodItem] {
        &self.suggestions
    }
}

fn sanitize(mut item: FoodItem) -> FoodItem {
    if !item.kcal.is_finite() || item.kcal < 0.0 {
        warn!(name = %item.name, kcal = item.kcal, "analyzer sent invalid kcal; using 0");
        item.kcal = 0.0;
    }
    if let Some(m) = item.macros {
        if !m.is_valid() {
            warn!(name = %item.name, "analyzer sent invalid macros; dropping them");
            item.macros = None;
        }
    }
    item
}

/// Body of `POST /v1/meals/create`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateMealRequest {
    pub user_id: i64,
    pub raw_text: String,
    pub meal_type: MealType,
    #[serde(with = "time::serde::rfc3339")]
    pub eaten_at: OffsetDateTime,
    pub items: Vec<FoodItem>,
    pub total_kcal: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macros: Option<MacroTotals>,
    pub ai_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedMeal {
    pub id: i64,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub message: String,
}

/// Body of `POST /v1/meals/{id}/duplicate`.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateMealRequest {
    #[serde(with = "time::serde::rfc3339")]
    pub new_eaten_at: OffsetDateTime,
}

/// A saved meal as returned by the list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealRecord {
    pub id: i64,
    #[serde(default)]
    pub user_id: i64,
    #[serde(default)]
    pub raw_text: String,
    pub meal_type: MealType,
    #[serde(with = "lenient_datetime")]
    pub eaten_at: OffsetDateTime,
    #[serde(default)]
    pub items_json: Vec<FoodItem>,
    #[serde(default)]
    pub total_kcal: f64,
    #[serde(default)]
    pub macros: Option<MacroTotals>,
    #[serde(default)]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub created_at: String,
}

impl MealRecord {
    /// First item name, falling back to the raw text.
    pub fn title(&self) -> &str {
        self.items_json
            .first()
            .map(|i| i.name.as_str())
            .filter(|n| !n.is_empty())
            .or(Some(self.raw_text.as_str()).filter(|t| !t.is_empty()))
            .unwrap_or("Meal Log")
    }
}

/// Accepts RFC 3339, or an ISO 8601 timestamp without offset (taken as UTC).
pub(crate) mod lenient_datetime {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::{
        format_description::well_known::{Iso8601, Rfc3339},
        OffsetDateTime, PrimitiveDateTime,
    };

    pub fn parse(s: &str) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(s, &Rfc3339)
            .ok()
            .or_else(|| OffsetDateTime::parse(s, &Iso8601::DEFAULT).ok())
            .or_else(|| {
                PrimitiveDateTime::parse(s, &Iso8601::DEFAULT)
                    .ok()
                    .map(|p| p.assume_utc())
            })
    }

    pub fn serialize<S: Serializer>(v: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
        time::serde::rfc3339::serialize(v, s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<OffsetDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(v: &Option<OffsetDateTime>, s: S) -> Result<S::Ok, S::Error> {
            time::serde::rfc3339::option::serialize(v, s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<OffsetDateTime>, D::Error> {
            let raw: Option<String> = Option::deserialize(d)?;
            match raw {
                None => Ok(None),
                Some(s) if s.trim().is_empty() => Ok(None),
                Some(s) => parse(&s)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {s}"))),
            }
        }
    }
}
