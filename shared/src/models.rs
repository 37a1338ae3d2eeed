//! Shared data models.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;
use validator::{Validate, ValidationError};

use crate::{Error, Result};

/// A booking extracted from a confirmation email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_stay"))]
pub struct Booking {
    /// Hotel or provider name
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    /// Booking reference
    #[validate(custom(function = "not_blank"))]
    pub confirmation: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub check_in_time: Option<String>,
    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub check_out_time: Option<String>,
    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub early_check_in_time: Option<String>,
    #[serde(default, deserialize_with = "de::decimal")]
    pub early_check_in_cost: Option<Decimal>,
    #[serde(default, deserialize_with = "de::null_as_false")]
    pub breakfast_included: bool,
    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub cancellation_terms: Option<String>,
    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "de::date")]
    pub booking_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub what3words: Option<String>,
    #[serde(default, deserialize_with = "de::website")]
    pub website: Option<Url>,
    #[serde(default, deserialize_with = "de::decimal")]
    pub amount_paid: Option<Decimal>,
    #[serde(default, deserialize_with = "de::decimal")]
    pub amount_total: Option<Decimal>,
    #[serde(default, deserialize_with = "de::blank_as_none")]
    pub room_type: Option<String>,
}

fn not_blank<T: AsRef<str>>(value: T) -> std::result::Result<(), ValidationError> {
    if value.as_ref().trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

fn validate_stay(booking: &Booking) -> std::result::Result<(), ValidationError> {
    if booking.check_out_date < booking.check_in_date {
        let mut err = ValidationError::new("stay_order");
        err.message = Some("check_out_date is before check_in_date".into());
        return Err(err);
    }
    Ok(())
}

impl Booking {
    /// Validate field contents, mapping failures to [`Error::Validation`].
    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }
}

/// Classification returned by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionKind {
    Booking,
    Marketing,
}

/// Output of the `extract_booking` tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub kind: ExtractionKind,
    #[serde(default)]
    pub booking: Option<Booking>,
}

impl ExtractionResult {
    /// Unwrap the booking, rejecting marketing emails and empty results.
    pub fn into_booking(self) -> Result<Booking> {
        match (self.kind, self.booking) {
            (ExtractionKind::Booking, Some(booking)) => Ok(booking),
            (ExtractionKind::Booking, None) => Err(Error::NotABooking(
                "extractor classified the email as a booking but returned no details".to_string(),
            )),
            (ExtractionKind::Marketing, _) => Err(Error::NotABooking(
                "email is a marketing email".to_string(),
            )),
        }
    }
}

/// A booking as persisted in DynamoDB and served by the API.
///
/// Every field other than the confirmation is optional so that records
/// written by older versions of the pipeline still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub confirmation: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub check_in_date: Option<String>,
    #[serde(default)]
    pub check_out_date: Option<String>,
    #[serde(default)]
    pub check_in_time: Option<String>,
    #[serde(default)]
    pub check_out_time: Option<String>,
    #[serde(default)]
    pub early_check_in_time: Option<String>,
    #[serde(default)]
    pub early_check_in_cost: Option<String>,
    #[serde(default)]
    pub breakfast_included: Option<bool>,
    #[serde(default)]
    pub cancellation_terms: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub booking_date: Option<String>,
    #[serde(default)]
    pub what3words: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub amount_paid: Option<String>,
    #[serde(default)]
    pub amount_total: Option<String>,
    #[serde(default)]
    pub room_type: Option<String>,
    #[serde(default)]
    pub source_bucket: Option<String>,
    #[serde(default)]
    pub source_key: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl BookingRecord {
    /// Build a record for a booking parsed from `s3://{bucket}/{key}`.
    pub fn from_booking(booking: Booking, bucket: &str, key: &str, now: DateTime<Utc>) -> Self {
        let timestamp = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let date = |d: NaiveDate| d.format("%Y-%m-%d").to_string();

        Self {
            confirmation: booking.confirmation,
            id: Some(record_id_for_key(key)),
            name: Some(booking.name),
            check_in_date: Some(date(booking.check_in_date)),
            check_out_date: Some(date(booking.check_out_date)),
            check_in_time: booking.check_in_time,
            check_out_time: booking.check_out_time,
            early_check_in_time: booking.early_check_in_time,
            early_check_in_cost: booking.early_check_in_cost.map(|d| d.to_string()),
            breakfast_included: Some(booking.breakfast_included),
            cancellation_terms: booking.cancellation_terms,
            address: booking.address,
            city: booking.city,
            booking_date: booking.booking_date.map(date),
            what3words: booking.what3words,
            website: booking.website.map(String::from),
            amount_paid: booking.amount_paid.map(|d| d.to_string()),
            amount_total: booking.amount_total.map(|d| d.to_string()),
            room_type: booking.room_type,
            source_bucket: Some(bucket.to_string()),
            source_key: Some(key.to_string()),
            created_at: Some(timestamp.clone()),
            updated_at: Some(timestamp),
        }
    }
}

/// Stable record identifier derived from an S3 object key.
pub fn record_id_for_key(key: &str) -> String {
    key.replace('/', "_")
}

/// Record attributes that the bookings API can filter on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DateField {
    #[default]
    CheckInDate,
    CheckOutDate,
    BookingDate,
    CreatedAt,
}

impl DateField {
    pub const ALL: [DateField; 4] = [
        DateField::CheckInDate,
        DateField::CheckOutDate,
        DateField::BookingDate,
        DateField::CreatedAt,
    ];

    /// Attribute name as stored in the table.
    pub fn as_str(&self) -> &'static str {
        match self {
            DateField::CheckInDate => "check_in_date",
            DateField::CheckOutDate => "check_out_date",
            DateField::BookingDate => "booking_date",
            DateField::CreatedAt => "created_at",
        }
    }

    fn value<'a>(&self, record: &'a BookingRecord) -> Option<&'a str> {
        match self {
            DateField::CheckInDate => record.check_in_date.as_deref(),
            DateField::CheckOutDate => record.check_out_date.as_deref(),
            DateField::BookingDate => record.booking_date.as_deref(),
            DateField::CreatedAt => record.created_at.as_deref(),
        }
    }
}

impl fmt::Display for DateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DateField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DateField::ALL
            .into_iter()
            .find(|field| field.as_str() == s.trim())
            .ok_or_else(|| {
                let allowed: Vec<&str> = DateField::ALL.iter().map(DateField::as_str).collect();
                Error::Validation(format!(
                    "Invalid date_field '{}', expected one of: {}",
                    s,
                    allowed.join(", ")
                ))
            })
    }
}

/// Inclusive date range filter over one record attribute.
///
/// Bounds are compared as strings, which orders ISO dates and RFC 3339
/// timestamps correctly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
    pub field: DateField,
}

impl DateRange {
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn matches(&self, record: &BookingRecord) -> bool {
        if self.is_unbounded() {
            return true;
        }
        let Some(value) = self.field.value(record) else {
            return false;
        };
        let after_start = self.start.as_deref().map_or(true, |s| value >= s);
        let before_end = self.end.as_deref().map_or(true, |e| value <= e);
        after_start && before_end
    }
}

/// List payload returned by the bookings API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingsList {
    pub bookings: Vec<BookingRecord>,
    pub count: usize,
}

impl BookingsList {
    pub fn new(bookings: Vec<BookingRecord>) -> Self {
        let count = bookings.len();
        Self { bookings, count }
    }
}

/// Lenient deserializers for extractor output.
///
/// LLMs tend to answer "" or "N/A" instead of null, and quote numbers.
mod de {
    use super::*;
    use serde::de::{self, Deserializer};
    use serde_json::Value;

    fn is_placeholder(s: &str) -> bool {
        let s = s.trim();
        s.is_empty() || s.eq_ignore_ascii_case("n/a") || s.eq_ignore_ascii_case("null")
    }

    pub fn blank_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        Ok(value
            .filter(|s| !is_placeholder(s))
            .map(|s| s.trim().to_string()))
    }

    pub fn null_as_false<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
    }

    pub fn decimal<'de, D>(deserializer: D) -> std::result::Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(None),
            Value::Number(n) => Decimal::from_str(&n.to_string())
                .or_else(|_| Decimal::from_scientific(&n.to_string()))
                .map(Some)
                .map_err(de::Error::custom),
            Value::String(s) if is_placeholder(&s) => Ok(None),
            Value::String(s) => {
                let cleaned: String = s
                    .chars()
                    .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                    .collect();
                Decimal::from_str(&cleaned)
                    .map(Some)
                    .map_err(|_| de::Error::custom(format!("invalid amount: {}", s)))
            }
            other => Err(de::Error::custom(format!("invalid amount: {}", other))),
        }
    }

    pub fn date<'de, D>(deserializer: D) -> std::result::Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        match value.filter(|s| !is_placeholder(s)) {
            None => Ok(None),
            Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map(Some)
                .map_err(|e| de::Error::custom(format!("invalid date '{}': {}", s, e))),
        }
    }

    pub fn website<'de, D>(deserializer: D) -> std::result::Result<Option<Url>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        let Some(raw) = value.filter(|s| !is_placeholder(s)) else {
            return Ok(None);
        };
        let raw = raw.trim();
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };
        let url = Url::parse(&candidate)
            .map_err(|e| de::Error::custom(format!("invalid website '{}': {}", raw, e)))?;
        match url.scheme() {
            "http" | "https" => Ok(Some(url)),
            scheme => Err(de::Error::custom(format!(
                "website must be http(s), got {}",
                scheme
            ))),
        }
    }
}
