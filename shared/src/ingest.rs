//! S3 event processing: fetch each email, parse it and store the booking.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::BookingRepository;
use crate::parser::EmailParser;
use crate::storage::{EmailSource, ResultExporter};
use crate::BookingRecord;

const S3_EVENT_SOURCE: &str = "aws:s3";

/// S3 notification event.
///
/// Records from other sources may share the batch, so everything below
/// `Records` is optional.
#[derive(Debug, Default, Deserialize)]
pub struct S3Notification {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3NotificationRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct S3NotificationRecord {
    #[serde(rename = "eventSource", alias = "EventSource", default)]
    pub event_source: Option<String>,
    #[serde(default)]
    pub s3: Option<S3Entity>,
}

#[derive(Debug, Default, Deserialize)]
pub struct S3Entity {
    #[serde(default)]
    pub bucket: S3Bucket,
    #[serde(default)]
    pub object: S3Object,
}

#[derive(Debug, Default, Deserialize)]
pub struct S3Bucket {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct S3Object {
    #[serde(default)]
    pub key: Option<String>,
}

/// Response returned to the Lambda runtime.
#[derive(Debug, PartialEq, Serialize)]
pub struct HandlerResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl HandlerResponse {
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            body: "OK".to_string(),
        }
    }
}

/// Per-invocation counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Bookings parsed and stored
    pub processed: u32,
    /// Emails that were not bookings
    pub skipped: u32,
    /// Records that failed to fetch, parse or store
    pub failed: u32,
    /// Records from other event sources
    pub ignored: u32,
}

/// Decode an S3 event object key (form encoding: `+` is a space).
pub fn decode_object_key(key: &str) -> String {
    let spaced = key.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Turns S3 notifications into stored bookings.
pub struct EmailProcessor {
    source: Arc<dyn EmailSource>,
    parser: EmailParser,
    repository: Arc<dyn BookingRepository>,
    exporter: Option<Arc<dyn ResultExporter>>,
}

impl EmailProcessor {
    pub fn new(
        source: Arc<dyn EmailSource>,
        parser: EmailParser,
        repository: Arc<dyn BookingRepository>,
        exporter: Option<Arc<dyn ResultExporter>>,
    ) -> Self {
        Self {
            source,
            parser,
            repository,
            exporter,
        }
    }

    /// Process every record in the notification.
    ///
    /// Per-record failures are logged and counted; they never abort the batch.
    pub async fn process(&self, event: &S3Notification) -> ProcessSummary {
        info!(event_records = event.records.len(), "Processing S3 notification");
        let mut summary = ProcessSummary::default();

        for record in &event.records {
            if record.event_source.as_deref() != Some(S3_EVENT_SOURCE) {
                summary.ignored += 1;
                continue;
            }

            let Some((bucket, key)) = record.s3.as_ref().and_then(|s3| {
                Some((s3.bucket.name.clone()?, decode_object_key(s3.object.key.as_deref()?)))
            }) else {
                warn!("S3 record without bucket or key");
                summary.failed += 1;
                continue;
            };

            match self.process_object(&bucket, &key).await {
                Outcome::Stored => summary.processed += 1,
                Outcome::Skipped => summary.skipped += 1,
                Outcome::Failed => summary.failed += 1,
            }
        }

        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            ignored = summary.ignored,
            "S3 notification complete"
        );
        summary
    }

    async fn process_object(&self, bucket: &str, key: &str) -> Outcome {
        let raw = match self.source.fetch_email(bucket, key).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(bucket, key, error = %e, "Error fetching object from S3");
                return Outcome::Failed;
            }
        };
        info!(bucket, key, size = raw.len(), "Fetched email from S3");

        let booking = match self.parser.parse(&raw).await {
            Ok(booking) => booking,
            Err(e) if e.is_not_a_booking() => {
                info!(bucket, key, reason = %e, "Skipping non-booking email");
                return Outcome::Skipped;
            }
            Err(e) => {
                error!(bucket, key, error = %e, "Error parsing email");
                return Outcome::Failed;
            }
        };

        let record = BookingRecord::from_booking(booking, bucket, key, Utc::now());
        info!(
            booking_id = record.id.as_deref().unwrap_or_default(),
            confirmation = %record.confirmation,
            "Email parsed successfully"
        );

        if let Err(e) = self.repository.upsert(&record).await {
            error!(confirmation = %record.confirmation, error = %e, "Error storing booking");
            return Outcome::Failed;
        }

        if let Some(exporter) = &self.exporter {
            if let Err(e) = exporter.export(&record).await {
                error!(confirmation = %record.confirmation, error = %e, "Error exporting booking");
                return Outcome::Failed;
            }
        }

        Outcome::Stored
    }
}

enum Outcome {
    Stored,
    Skipped,
    Failed,
}
