use thiserror::Error;

#[derive(Debug, Error)]
pub enum TripPlannerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("validation error: {0}")]
    Validation(String),
}

impl TripPlannerError {
    /// Validation failures are the user's to fix; everything else is ours.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<serde_json::Error> for TripPlannerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub use crate::Result;
