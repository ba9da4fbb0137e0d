use std::fmt::Write;

use crate::meals::{CreatedMeal, PendingMeal};

pub fn format_analysis(meal: &PendingMeal) -> String {
    let mut text = String::from("I found:\n");
    for item in meal.food_items() {
        let _ = writeln!(text, "- {} ({}): {}kcal", item.name, item.qty, item.kcal);
    }
    match meal.macros() {
        Some(m) => {
            let _ = writeln!(
                text,
                "\nTotal: {}kcal (C:{}g P:{}g F:{}g)",
                meal.total_kcal(),
                m.carbs,
                m.protein,
                m.fat
            );
        }
        None => {
            let _ = writeln!(text, "\nTotal: {}kcal", meal.total_kcal());
        }
    }
    if !meal.ai_summary().is_empty() {
        let _ = write!(text, "\n{}", meal.ai_summary());
    }
    text
}

pub fn format_saved(meal: &PendingMeal, created: &CreatedMeal) -> String {
    format!("{}\n\nSaved! Order #{}", format_analysis(meal), created.id)
}
