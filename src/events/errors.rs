//! # Event Errors

use thiserror::Error;

/// Result type for event operations
pub type EventResult<T> = Result<T, EventError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Subscriber lagged: oldest retained sequence is {oldest}, requested {requested}")]
    Lagged { requested: u64, oldest: u64 },
}

impl EventError {
    pub fn code(&self) -> &'static str {
        match self {
            EventError::Serialization(_) => "HALYARD_SERIALIZATION",
            EventError::Lagged { .. } => "HALYARD_EVENTS_LAGGED",
        }
    }
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::Serialization(err.to_string())
    }
}
