use serde::{Deserialize, Serialize};

/// Carbohydrate / protein / fat in grams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroTotals {
    pub carbs: f64,
    pub protein: f64,
    pub fat: f64,
}

impl MacroTotals {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        [self.carbs, self.protein, self.fat]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// One eaten food. Within a meal it is identified by its position only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    #[serde(default)]
    pub qty: String,
    #[serde(default)]
    pub kcal: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macros: Option<MacroTotals>,
}

impl FoodItem {
    pub fn new(name: impl Into<String>, qty: impl Into<String>, kcal: f64) -> Self {
        Self {
            name: name.into(),
            qty: qty.into(),
            kcal,
            macros: None,
        }
    }

    pub fn with_macros(mut self, carbs: f64, protein: f64, fat: f64) -> Self {
        self.macros = Some(MacroTotals { carbs, protein, fat });
        self
    }
}
