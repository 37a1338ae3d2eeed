//! DynamoDB bookings table.
//!
//! The table is keyed by `confirmation` (S). Dates and timestamps are stored
//! as ISO strings so that range filters compare lexicographically; amounts
//! are stored as numbers.

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;
use tracing::{debug, error};

use crate::{BookingRecord, DateRange, Error, Result};

/// A DynamoDB item.
pub type Item = HashMap<String, AttributeValue>;

const KEY_ATTRIBUTE: &str = "confirmation";
const NUMERIC_ATTRIBUTES: [&str; 3] = ["early_check_in_cost", "amount_paid", "amount_total"];

/// Persistence for booking records.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Insert or update a booking, keeping its original `created_at`.
    async fn upsert(&self, record: &BookingRecord) -> Result<()>;

    /// Look up a booking by confirmation.
    async fn get(&self, confirmation: &str) -> Result<Option<BookingRecord>>;

    /// All bookings whose date field falls inside `range`.
    async fn list(&self, range: &DateRange) -> Result<Vec<BookingRecord>>;
}

/// DynamoDB-backed [`BookingRepository`].
pub struct DynamoBookingRepository {
    client: DynamoClient,
    table_name: String,
}

impl DynamoBookingRepository {
    pub fn new(client: DynamoClient, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait]
impl BookingRepository for DynamoBookingRepository {
    async fn upsert(&self, record: &BookingRecord) -> Result<()> {
        let update = UpdatePlan::for_record(record)?;

        self.client
            .update_item()
            .table_name(&self.table_name)
            .key(KEY_ATTRIBUTE, AttributeValue::S(record.confirmation.clone()))
            .update_expression(update.expression)
            .set_expression_attribute_names(Some(update.names))
            .set_expression_attribute_values(Some(update.values))
            .send()
            .await
            .map_err(|e| {
                error!(confirmation = %record.confirmation, error = %e, "Error upserting booking");
                Error::Dynamo(format!("Failed to upsert booking: {}", e))
            })?;

        debug!(confirmation = %record.confirmation, "Upserted booking");
        Ok(())
    }

    async fn get(&self, confirmation: &str) -> Result<Option<BookingRecord>> {
        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(KEY_ATTRIBUTE, AttributeValue::S(confirmation.to_string()))
            .send()
            .await
            .map_err(|e| {
                error!(confirmation, error = %e, "Error getting booking from DynamoDB");
                Error::Dynamo(format!("Failed to get booking: {}", e))
            })?;

        response.item().map(record_from_item).transpose()
    }

    async fn list(&self, range: &DateRange) -> Result<Vec<BookingRecord>> {
        let filter = ScanFilter::for_range(range);
        let mut items: Vec<Item> = Vec::new();
        let mut start_key: Option<Item> = None;

        // Scans return at most 1MB per page.
        loop {
            let mut request = self.client.scan().table_name(&self.table_name);
            if let Some(filter) = &filter {
                request = request
                    .filter_expression(&filter.expression)
                    .set_expression_attribute_names(Some(filter.names.clone()))
                    .set_expression_attribute_values(Some(filter.values.clone()));
            }

            let response = request
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| {
                    error!(
                        start_date = ?range.start,
                        end_date = ?range.end,
                        error = %e,
                        "Error scanning bookings from DynamoDB"
                    );
                    Error::Dynamo(format!("Failed to scan bookings: {}", e))
                })?;

            items.extend(response.items().iter().cloned());

            match response.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        debug!(count = items.len(), field = %range.field, "Scanned bookings");
        items.iter().map(record_from_item).collect()
    }
}

/// `SET` expression for an upsert.
#[derive(Debug)]
struct UpdatePlan {
    expression: String,
    names: HashMap<String, String>,
    values: Item,
}

impl UpdatePlan {
    fn for_record(record: &BookingRecord) -> Result<Self> {
        let mut item = record_to_item(record)?;
        item.remove(KEY_ATTRIBUTE);

        let created_at = item.remove("created_at");

        let mut attributes: Vec<(String, AttributeValue)> = item.into_iter().collect();
        attributes.sort_by(|a, b| a.0.cmp(&b.0));

        let mut clauses = Vec::with_capacity(attributes.len() + 1);
        let mut names = HashMap::new();
        let mut values = HashMap::new();

        for (i, (name, value)) in attributes.into_iter().enumerate() {
            clauses.push(format!("#a{i} = :v{i}"));
            names.insert(format!("#a{i}"), name);
            values.insert(format!(":v{i}"), value);
        }

        if let Some(created_at) = created_at {
            clauses.push("#created_at = if_not_exists(#created_at, :created_at)".to_string());
            names.insert("#created_at".to_string(), "created_at".to_string());
            values.insert(":created_at".to_string(), created_at);
        }

        if clauses.is_empty() {
            return Err(Error::Validation(format!(
                "booking {} has no attributes to store",
                record.confirmation
            )));
        }

        Ok(Self {
            expression: format!("SET {}", clauses.join(", ")),
            names,
            values,
        })
    }
}

/// Filter expression for a date range scan; `None` for a full scan.
#[derive(Debug)]
struct ScanFilter {
    expression: String,
    names: HashMap<String, String>,
    values: Item,
}

impl ScanFilter {
    fn for_range(range: &DateRange) -> Option<Self> {
        if range.is_unbounded() {
            return None;
        }

        let field = range.field.as_str();
        let placeholder = format!("#{}", field);
        let mut clauses = Vec::new();
        let mut values = HashMap::new();

        if let Some(start) = &range.start {
            clauses.push(format!("{} >= :start_date", placeholder));
            values.insert(":start_date".to_string(), AttributeValue::S(start.clone()));
        }
        if let Some(end) = &range.end {
            clauses.push(format!("{} <= :end_date", placeholder));
            values.insert(":end_date".to_string(), AttributeValue::S(end.clone()));
        }

        Some(Self {
            expression: clauses.join(" AND "),
            names: HashMap::from([(placeholder, field.to_string())]),
            values,
        })
    }
}

/// Convert a record into a DynamoDB item, omitting absent attributes.
pub fn record_to_item(record: &BookingRecord) -> Result<Item> {
    let serde_json::Value::Object(fields) = serde_json::to_value(record)? else {
        return Err(Error::Internal("booking record is not an object".to_string()));
    };

    let mut item = Item::new();
    for (name, value) in fields {
        let attribute = match value {
            serde_json::Value::Null => continue,
            serde_json::Value::Bool(b) => AttributeValue::Bool(b),
            serde_json::Value::Number(n) => AttributeValue::N(n.to_string()),
            serde_json::Value::String(s) if NUMERIC_ATTRIBUTES.contains(&name.as_str()) => {
                AttributeValue::N(s)
            }
            serde_json::Value::String(s) => AttributeValue::S(s),
            other => AttributeValue::S(other.to_string()),
        };
        item.insert(name, attribute);
    }
    Ok(item)
}

/// Convert a DynamoDB item into a record.
///
/// `S` and `N` become strings, `BOOL` stays boolean, `NULL` is absent and
/// other attribute types are ignored.
pub fn record_from_item(item: &Item) -> Result<BookingRecord> {
    let mut fields = serde_json::Map::new();
    for (name, value) in item {
        let json = match value {
            AttributeValue::S(s) => serde_json::Value::String(s.clone()),
            AttributeValue::N(n) => serde_json::Value::String(n.clone()),
            AttributeValue::Bool(b) => serde_json::Value::Bool(*b),
            _ => continue,
        };
        fields.insert(name.clone(), json);
    }

    if !fields.contains_key(KEY_ATTRIBUTE) {
        return Err(Error::Dynamo("item has no confirmation attribute".to_string()));
    }

    serde_json::from_value(serde_json::Value::Object(fields))
        .map_err(|e| Error::Dynamo(format!("Malformed booking item: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DateField;

    fn record() -> BookingRecord {
        BookingRecord {
            confirmation: "MAQ1101970".to_string(),
            id: Some("emails_hub.eml".to_string()),
            name: Some("hub by Premier Inn".to_string()),
            check_in_date: Some("2025-03-20".to_string()),
            amount_total: Some("100.00".to_string()),
            breakfast_included: Some(true),
            created_at: Some("2025-03-20T11:22:42Z".to_string()),
            updated_at: Some("2025-03-20T11:22:42Z".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_to_item() {
        let item = record_to_item(&record()).unwrap();
        assert_eq!(item["confirmation"], AttributeValue::S("MAQ1101970".to_string()));
        assert_eq!(item["amount_total"], AttributeValue::N("100.00".to_string()));
        assert_eq!(item["breakfast_included"], AttributeValue::Bool(true));
        assert!(!item.contains_key("city"));
    }

    #[test]
    fn test_item_roundtrip() {
        let original = record();
        let item = record_to_item(&original).unwrap();
        assert_eq!(record_from_item(&item).unwrap(), original);
    }

    #[test]
    fn test_record_from_item_conversions() {
        let item: Item = HashMap::from([
            ("confirmation".to_string(), AttributeValue::S("ABC1234567".to_string())),
            ("amount_paid".to_string(), AttributeValue::N("42".to_string())),
            ("city".to_string(), AttributeValue::Null(true)),
            ("tags".to_string(), AttributeValue::Ss(vec!["x".to_string()])),
        ]);
        let record = record_from_item(&item).unwrap();
        assert_eq!(record.amount_paid.as_deref(), Some("42"));
        assert_eq!(record.city, None);

        let keyless: Item =
            HashMap::from([("name".to_string(), AttributeValue::S("x".to_string()))]);
        assert!(matches!(record_from_item(&keyless), Err(Error::Dynamo(_))));
    }

    #[test]
    fn test_update_plan_preserves_created_at() {
        let plan = UpdatePlan::for_record(&record()).unwrap();
        assert!(plan.expression.starts_with("SET "));
        assert!(plan
            .expression
            .contains("#created_at = if_not_exists(#created_at, :created_at)"));
        assert!(!plan.names.values().any(|n| n == "confirmation"));
        assert!(plan.names.values().any(|n| n == "updated_at"));
        assert_eq!(plan.names.len(), plan.values.len());
    }

    #[test]
    fn test_scan_filter() {
        assert!(ScanFilter::for_range(&DateRange::default()).is_none());

        let filter = ScanFilter::for_range(&DateRange {
            start: Some("2025-11-17".to_string()),
            end: Some("2025-11-20".to_string()),
            field: DateField::CheckOutDate,
        })
        .unwrap();
        assert_eq!(
            filter.expression,
            "#check_out_date >= :start_date AND #check_out_date <= :end_date"
        );
        assert_eq!(filter.names["#check_out_date"], "check_out_date");
        assert_eq!(
            filter.values[":end_date"],
            AttributeValue::S("2025-11-20".to_string())
        );

        let open_ended = ScanFilter::for_range(&DateRange {
            start: None,
            end: Some("2025-11-20".to_string()),
            field: DateField::CheckInDate,
        })
        .unwrap();
        assert_eq!(open_ended.expression, "#check_in_date <= :end_date");
        assert!(!open_ended.values.contains_key(":start_date"));
    }
}
