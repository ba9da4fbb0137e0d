mod aggregate;
mod dto;

pub use aggregate::{round1, sum_kcal, sum_macros};
pub use dto::{FoodItem, MacroTotals};
