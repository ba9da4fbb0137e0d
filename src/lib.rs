pub mod cli;
pub mod config;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod meals;
pub mod nutrition;
pub mod state;
pub mod stats;

pub use error::{MealError, Result};
