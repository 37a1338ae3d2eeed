//! Shared library for the booking email Lambda functions.
//!
//! Raw emails land in S3, get parsed into bookings (LLM first, Premier Inn
//! template as fallback), are stored in DynamoDB and served over HTTP.

pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod http;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod parser;
pub mod secrets;
pub mod storage;

pub use config::Config;
pub use db::{BookingRepository, DynamoBookingRepository};
pub use error::{Error, Result};
pub use ingest::{EmailProcessor, HandlerResponse, ProcessSummary, S3Notification};
pub use llm::{BookingExtractor, OpenAiClient};
pub use models::{
    Booking, BookingRecord, BookingsList, DateField, DateRange, ExtractionKind, ExtractionResult,
};
pub use parser::EmailParser;
pub use secrets::{get_secret, resolve_openai_api_key};
pub use storage::{EmailSource, ResultExporter, S3EmailSource, S3ResultExporter};
