//! Bookings Lambda - Serves parsed bookings over API Gateway.
//!
//! Endpoints:
//! - GET /                        - API description
//! - GET /health                  - Health check
//! - GET /bookings/{confirmation} - Get a booking by confirmation
//! - GET /bookings                - List bookings, optionally by date range
//!
//! Query parameters for the list endpoint:
//! - start_date, end_date - inclusive bounds (YYYY-MM-DD or full timestamp)
//! - date_field - check_in_date (default), check_out_date, booking_date, created_at

use lambda_http::{run, service_fn, Body, Error, Request, RequestExt, Response};
use serde::Serialize;
use shared::http::{error_response, json_response, preflight_response};
use shared::{BookingRepository, BookingsList, DateField, DateRange, DynamoBookingRepository};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const API_VERSION: &str = "1.0.0";
const QUERY_PARAMETERS: [&str; 3] = ["start_date", "end_date", "date_field"];

/// Root endpoint response
#[derive(Debug, Serialize)]
struct ApiInfo {
    message: &'static str,
    version: &'static str,
    endpoints: HashMap<&'static str, &'static str>,
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Application state
struct AppState {
    repository: Arc<dyn BookingRepository>,
}

impl AppState {
    async fn new() -> Result<Self, Error> {
        let config = shared::Config::from_env();
        let aws_config = config.load_aws_config().await;
        let dynamo_client = aws_sdk_dynamodb::Client::new(&aws_config);

        info!(table = %config.bookings_table, "Bookings API configured");

        Ok(Self {
            repository: Arc::new(DynamoBookingRepository::new(
                dynamo_client,
                config.bookings_table,
            )),
        })
    }
}

fn non_empty(params: &HashMap<String, String>, name: &str) -> Option<String> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(String::from)
}

async fn get_booking(state: &AppState, confirmation: &str) -> Result<Response<Body>, Error> {
    let confirmation = urlencoding::decode(confirmation)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| confirmation.to_string());

    info!(confirmation = %confirmation, "get_booking_by_id");

    match state.repository.get(&confirmation).await {
        Ok(Some(booking)) => json_response(200, &booking),
        Ok(None) => {
            let err = shared::Error::NotFound(format!(
                "Booking with confirmation '{}' not found",
                confirmation
            ));
            error_response(err.status_code(), err.to_string())
        }
        Err(e) => {
            error!(confirmation = %confirmation, error = %e, "Failed to get booking");
            error_response(500, "Internal server error")
        }
    }
}

async fn list_bookings(
    state: &AppState,
    params: &HashMap<String, String>,
) -> Result<Response<Body>, Error> {
    let field = match non_empty(params, "date_field") {
        Some(name) => match name.parse::<DateField>() {
            Ok(field) => field,
            Err(e) => return error_response(e.status_code(), e.to_string()),
        },
        None => DateField::default(),
    };

    let range = DateRange {
        start: non_empty(params, "start_date"),
        end: non_empty(params, "end_date"),
        field,
    };

    info!(
        start_date = ?range.start,
        end_date = ?range.end,
        date_field = %range.field,
        "get_bookings_by_date_range"
    );

    match state.repository.list(&range).await {
        Ok(bookings) => json_response(200, &BookingsList::new(bookings)),
        Err(e) => {
            error!(error = %e, "Failed to list bookings");
            error_response(500, "Internal server error")
        }
    }
}

async fn route(
    state: &AppState,
    method: &str,
    path: &str,
    params: &HashMap<String, String>,
) -> Result<Response<Body>, Error> {
    if method == "OPTIONS" {
        return preflight_response();
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method, segments.as_slice()) {
        ("GET", []) => json_response(
            200,
            &ApiInfo {
                message: "Email Parse API",
                version: API_VERSION,
                endpoints: HashMap::from([
                    ("get_booking_by_id", "/bookings/{confirmation}"),
                    (
                        "get_bookings_by_date_range",
                        "/bookings/?start_date=YYYY-MM-DD&end_date=YYYY-MM-DD",
                    ),
                ]),
            },
        ),
        ("GET", ["health"]) => json_response(200, &HealthResponse { status: "healthy" }),
        ("GET", ["bookings"]) => list_bookings(state, params).await,
        ("GET", ["bookings", confirmation]) => get_booking(state, confirmation).await,
        (_, [] | ["health"] | ["bookings"] | ["bookings", _]) => {
            error_response(405, "Method Not Allowed")
        }
        _ => error_response(404, "Not Found"),
    }
}

async fn handler(state: Arc<AppState>, event: Request) -> Result<Response<Body>, Error> {
    let raw_path = event.uri().path();
    // Strip /api stage prefix if present (API Gateway REST API includes stage in path)
    let path = raw_path
        .strip_prefix("/api")
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .unwrap_or(raw_path);
    let method = event.method().as_str();

    let query = event.query_string_parameters();
    let params: HashMap<String, String> = QUERY_PARAMETERS
        .iter()
        .filter_map(|name| query.first(name).map(|v| (name.to_string(), v.to_string())))
        .collect();

    route(&state, method, path, &params).await
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    let state = Arc::new(AppState::new().await?);

    run(service_fn(move |event| {
        let state = Arc::clone(&state);
        async move { handler(state, event).await }
    }))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use shared::{BookingRecord, Result as SharedResult};
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryRepository {
        records: Mutex<Vec<BookingRecord>>,
        fail: bool,
    }

    #[async_trait]
    impl BookingRepository for InMemoryRepository {
        async fn upsert(&self, record: &BookingRecord) -> SharedResult<()> {
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn get(&self, confirmation: &str) -> SharedResult<Option<BookingRecord>> {
            if self.fail {
                return Err(shared::Error::Dynamo("ResourceNotFoundException".into()));
            }
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.confirmation == confirmation)
                .cloned())
        }

        async fn list(&self, range: &DateRange) -> SharedResult<Vec<BookingRecord>> {
            if self.fail {
                return Err(shared::Error::Dynamo("ResourceNotFoundException".into()));
            }
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .filter(|r| range.matches(r))
                .cloned()
                .collect())
        }
    }

    fn booking(confirmation: &str, check_in: &str, booked: &str) -> BookingRecord {
        BookingRecord {
            confirmation: confirmation.to_string(),
            name: Some("hub by Premier Inn".to_string()),
            check_in_date: Some(check_in.to_string()),
            booking_date: Some(booked.to_string()),
            ..Default::default()
        }
    }

    fn state() -> AppState {
        let repository = InMemoryRepository::default();
        *repository.records.lock().unwrap() = vec![
            booking("MAQ1101970", "2025-03-20", "2025-01-20"),
            booking("EDI2024555", "2025-11-18", "2025-10-01"),
            booking("MAN7654321", "2025-12-01", "2025-11-02"),
        ];
        AppState {
            repository: Arc::new(repository),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn call(
        state: &AppState,
        method: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> (u16, Value) {
        let response = route(state, method, path, &params(query)).await.unwrap();
        let status = response.status().as_u16();
        let body = serde_json::from_slice(response.body().as_ref()).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let state = state();

        let (status, body) = call(&state, "GET", "/", &[]).await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Email Parse API");
        assert_eq!(body["endpoints"]["get_booking_by_id"], "/bookings/{confirmation}");

        let (status, body) = call(&state, "GET", "/health", &[]).await;
        assert_eq!(status, 200);
        assert_eq!(body, serde_json::json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn test_get_booking_by_confirmation() {
        let state = state();

        let (status, body) = call(&state, "GET", "/bookings/MAQ1101970", &[]).await;
        assert_eq!(status, 200);
        assert_eq!(body["confirmation"], "MAQ1101970");
        assert_eq!(body["check_in_date"], "2025-03-20");
        assert!(body["city"].is_null());

        let (status, body) = call(&state, "GET", "/bookings/NOPE", &[]).await;
        assert_eq!(status, 404);
        assert_eq!(body["detail"], "Booking with confirmation 'NOPE' not found");
    }

    #[tokio::test]
    async fn test_list_bookings_by_date_range() {
        let state = state();

        let (status, body) = call(&state, "GET", "/bookings/", &[]).await;
        assert_eq!(status, 200);
        assert_eq!(body["count"], 3);

        let (_, body) = call(
            &state,
            "GET",
            "/bookings",
            &[("start_date", "2025-11-17"), ("end_date", "2025-11-20")],
        )
        .await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["bookings"][0]["confirmation"], "EDI2024555");

        let (_, body) = call(
            &state,
            "GET",
            "/bookings",
            &[("start_date", "2025-10-15"), ("date_field", "booking_date")],
        )
        .await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["bookings"][0]["confirmation"], "MAN7654321");

        let (status, body) = call(&state, "GET", "/bookings", &[("date_field", "nights")]).await;
        assert_eq!(status, 400);
        assert!(body["detail"].as_str().unwrap().contains("date_field"));
    }

    #[tokio::test]
    async fn test_unknown_routes_and_methods() {
        let state = state();

        assert_eq!(call(&state, "GET", "/flights", &[]).await.0, 404);
        assert_eq!(call(&state, "GET", "/bookings/a/b", &[]).await.0, 404);
        assert_eq!(call(&state, "DELETE", "/bookings/MAQ1101970", &[]).await.0, 405);
        assert_eq!(call(&state, "OPTIONS", "/bookings", &[]).await.0, 204);
    }

    async fn invoke(state: AppState, uri: &str, query: &[(&str, &str)]) -> (u16, Value) {
        let query: HashMap<String, String> = params(query);
        let request = lambda_http::http::Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::Empty)
            .unwrap()
            .with_query_string_parameters(query);

        let response = handler(Arc::new(state), request).await.unwrap();
        let status = response.status().as_u16();
        let body = serde_json::from_slice(response.body().as_ref()).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_handler_strips_stage_prefix() {
        let (status, body) = invoke(state(), "/api", &[]).await;
        assert_eq!(status, 200);
        assert_eq!(body["message"], "Email Parse API");

        let (status, body) = invoke(state(), "/api/health", &[]).await;
        assert_eq!(status, 200);
        assert_eq!(body["status"], "healthy");

        assert_eq!(invoke(state(), "/apis/health", &[]).await.0, 404);
    }

    #[tokio::test]
    async fn test_handler_decodes_confirmation() {
        let state = state();
        state
            .repository
            .upsert(&booking("MAQ 1101970", "2025-03-20", "2025-01-20"))
            .await
            .unwrap();

        let (status, body) = invoke(state, "/api/bookings/MAQ%201101970", &[]).await;
        assert_eq!(status, 200);
        assert_eq!(body["confirmation"], "MAQ 1101970");
    }

    #[tokio::test]
    async fn test_handler_reads_query_parameters() {
        let (status, body) = invoke(
            state(),
            "/api/bookings",
            &[("start_date", "2025-11-17"), ("end_date", "2025-11-20")],
        )
        .await;
        assert_eq!(status, 200);
        assert_eq!(body["count"], 1);

        let (status, _) = invoke(state(), "/bookings/", &[("date_field", "nights")]).await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn test_repository_errors_are_500() {
        let state = AppState {
            repository: Arc::new(InMemoryRepository {
                fail: true,
                ..Default::default()
            }),
        };

        let (status, body) = call(&state, "GET", "/bookings/MAQ1101970", &[]).await;
        assert_eq!(status, 500);
        assert_eq!(body["detail"], "Internal server error");
        assert_eq!(call(&state, "GET", "/bookings", &[]).await.0, 500);
    }
}
