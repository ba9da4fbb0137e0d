//! Edits on a [`PendingMeal`]. Every function returns a fresh meal and leaves
//! its input untouched; totals are always re-derived from `food_items`.

use time::OffsetDateTime;

use super::dto::{MealType, PendingMeal};
use crate::error::{MealError, Result};
use crate::nutrition::{FoodItem, MacroTotals};

pub const DEFAULT_QTY: &str = "1 serving";

fn validate_item(item: &FoodItem) -> Result<()> {
    if item.name.trim().is_empty() {
        return Err(MealError::validation("food item needs a name"));
    }
    if !item.kcal.is_finite() || item.kcal < 0.0 {
        return Err(MealError::validation(format!(
            "kcal for {} must be a non-negative number",
            item.name
        )));
    }
    if let Some(m) = &item.macros {
        if !m.is_valid() {
            return Err(MealError::validation(format!(
                "macros for {} must be non-negative numbers",
                item.name
            )));
        }
    }
    Ok(())
}

pub fn add_item(meal: &PendingMeal, item: FoodItem) -> Result<PendingMeal> {
    validate_item(&item)?;
    let mut next = meal.clone();
    next.food_items.push(item);
    next.recompute();
    Ok(next)
}

/// Adds an item taken from the suggestions and drops the first suggestion
/// with the same name.
pub fn add_suggested_item(meal: &PendingMeal, item: FoodItem) -> Result<PendingMeal> {
    let name = item.name.clone();
    let mut next = add_item(meal, item)?;
    if let Some(pos) = next.suggestions.iter().position(|s| s.name == name) {
        next.suggestions.remove(pos);
    }
    Ok(next)
}

/// Accepts the suggestion at `index`, removing exactly that entry.
pub fn accept_suggestion(meal: &PendingMeal, index: usize) -> Result<PendingMeal> {
    let item = meal.suggestions.get(index).cloned().ok_or_else(|| {
        MealError::validation(format!(
            "no suggestion at position {} (have {})",
            index,
            meal.suggestions.len()
        ))
    })?;
    let mut next = add_item(meal, item)?;
    next.suggestions.remove(index);
    Ok(next)
}

pub fn remove_item(meal: &PendingMeal, index: usize) -> Result<PendingMeal> {
    if index >= meal.food_items.len() {
        return Err(MealError::validation(format!(
            "no food item at position {} (have {})",
            index,
            meal.food_items.len()
        )));
    }
    let mut next = meal.clone();
    next.food_items.remove(index);
    // recompute clamps every axis at zero
    next.recompute();
    Ok(next)
}

/// Whether a manual entry needs the analyzer to estimate it first.
pub fn needs_estimate(explicit_kcal: Option<f64>) -> bool {
    !matches!(explicit_kcal, Some(k) if k > 0.0)
}

/// Checks a hand-typed entry before any estimate lookup is spent on it.
pub fn validate_manual_input(name: &str, explicit_kcal: Option<f64>) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MealError::validation("food item needs a name"));
    }
    match explicit_kcal {
        Some(k) if !k.is_finite() || k < 0.0 => {
            Err(MealError::validation("kcal must be a non-negative number"))
        }
        _ => Ok(()),
    }
}

/// Builds the item for a manual entry. `estimate` is the first item the
/// analyzer returned for `name`, if the lookup happened and succeeded.
pub fn manual_item(
    name: &str,
    explicit_kcal: Option<f64>,
    estimate: Option<&FoodItem>,
) -> Result<FoodItem> {
    validate_manual_input(name, explicit_kcal)?;
    let name = name.trim();

    let item = match (explicit_kcal, estimate) {
        (Some(k), _) if k > 0.0 => FoodItem::new(name, DEFAULT_QTY, k),
        (_, Some(est)) => FoodItem {
            name: name.to_string(),
            qty: if est.qty.trim().is_empty() {
                DEFAULT_QTY.to_string()
            } else {
                est.qty.clone()
            },
            kcal: est.kcal,
            macros: est.macros,
        },
        _ => FoodItem {
            name: name.to_string(),
            qty: DEFAULT_QTY.to_string(),
            kcal: 0.0,
            macros: Some(MacroTotals::zero()),
        },
    };
    Ok(item)
}

pub fn add_manual_item(
    meal: &PendingMeal,
    name: &str,
    explicit_kcal: Option<f64>,
    estimate: Option<&FoodItem>,
) -> Result<PendingMeal> {
    add_item(meal, manual_item(name, explicit_kcal, estimate)?)
}

pub fn change_meal_type(meal: &PendingMeal, meal_type: MealType) -> PendingMeal {
    PendingMeal {
        meal_type,
        ..meal.clone()
    }
}

pub fn change_eaten_at(meal: &PendingMeal, eaten_at: OffsetDateTime) -> PendingMeal {
    PendingMeal {
        eaten_at,
        ..meal.clone()
    }
}
