use super::dto::{FoodItem, MacroTotals};

/// Round half-up to one decimal place. Inputs here are never negative.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Plain sum of `kcal`; calories arrive already rounded from the analyzer.
pub fn sum_kcal(items: &[FoodItem]) -> f64 {
    items.iter().map(|i| i.kcal).sum()
}

/// Per-axis macro sum, or `None` when no item carries macros.
/// Items without macros count as zero once at least one item has them.
pub fn sum_macros(items: &[FoodItem]) -> Option<MacroTotals> {
    let mut with_macros = items.iter().filter_map(|i| i.macros.as_ref()).peekable();
    with_macros.peek()?;

    let raw = with_macros.fold(MacroTotals::zero(), |acc, m| MacroTotals {
        carbs: acc.carbs + m.carbs,
        protein: acc.protein + m.protein,
        fat: acc.fat + m.fat,
    });
    Some(MacroTotals {
        carbs: round1(raw.carbs),
        protein: round1(raw.protein),
        fat: round1(raw.fat),
    })
}
