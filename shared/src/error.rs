//! Error types for the booking ingestion functions.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while ingesting or serving bookings.
#[derive(Error, Debug)]
pub enum Error {
    /// AWS SDK error (S3, Secrets Manager)
    #[error("AWS error: {0}")]
    Aws(String),

    /// DynamoDB error
    #[error("DynamoDB error: {0}")]
    Dynamo(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error, displayed as the bare message
    #[error("{0}")]
    NotFound(String),

    /// The email was classified as something other than a booking
    #[error("Not a booking: {0}")]
    NotABooking(String),

    /// LLM provider error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Email or template parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::NotABooking(_) => 422,
            _ => 500,
        }
    }

    /// Whether this error means "not a booking" rather than a failure.
    pub fn is_not_a_booking(&self) -> bool {
        matches!(self, Error::NotABooking(_))
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        Error::Validation(errors.to_string())
    }
}
