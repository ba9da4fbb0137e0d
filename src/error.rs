use thiserror::Error;

pub type Result<T> = std::result::Result<T, MealError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MealError {
    /// Backend answered 503: analysis capacity is exhausted for now.
    #[error("meal analysis is rate limited, retry in {cooldown_secs}s")]
    RateLimited { cooldown_secs: u64 },

    #[error("meal analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("saving meal failed: {0}")]
    PersistFailed(String),

    /// list / delete / duplicate pass-throughs
    #[error("meal request failed: {0}")]
    RequestFailed(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

impl MealError {
    pub fn validation(msg: impl Into<String>) -> Self {
        MealError::ValidationFailed(msg.into())
    }

    /// Text shown to the person using the diary.
    pub fn user_message(&self) -> String {
        match self {
            MealError::RateLimited { cooldown_secs } => format!(
                "Too many requests right now. Please wait about {} seconds and try again.",
                cooldown_secs
            ),
            MealError::AnalysisFailed(_) => "Something went wrong. Please try again.".into(),
            MealError::PersistFailed(_) => "Failed to save the meal.".into(),
            MealError::RequestFailed(_) => "The request did not go through.".into(),
            MealError::ValidationFailed(msg) => msg.clone(),
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, MealError::RateLimited { .. })
    }
}
