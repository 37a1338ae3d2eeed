//! HTTP helpers for the API Lambda.

use lambda_http::http::response::Builder;
use lambda_http::{Body, Error, Response};
use serde::Serialize;

/// Error body, `{"detail": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

fn with_cors(builder: Builder) -> Builder {
    builder
        .header("access-control-allow-origin", "*")
        .header("access-control-allow-methods", "*")
        .header("access-control-allow-headers", "*")
}

/// Create a JSON response with the given status code and data.
pub fn json_response<T: Serialize>(status: u16, data: &T) -> Result<Response<Body>, Error> {
    let response = with_cors(Response::builder())
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(data)?))?;
    Ok(response)
}

/// Create an error response with the given status code and message.
pub fn error_response(status: u16, message: impl Into<String>) -> Result<Response<Body>, Error> {
    json_response(
        status,
        &ErrorBody {
            detail: message.into(),
        },
    )
}

/// Empty response to a CORS preflight request.
pub fn preflight_response() -> Result<Response<Body>, Error> {
    Ok(with_cors(Response::builder()).status(204).body(Body::Empty)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_text(response: &Response<Body>) -> String {
        String::from_utf8_lossy(response.body().as_ref()).into_owned()
    }

    #[test]
    fn test_error_response() {
        let response = error_response(404, "Not Found").unwrap();
        assert_eq!(response.status(), 404);
        assert_eq!(response.headers()["content-type"], "application/json");
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
        assert_eq!(body_text(&response), r#"{"detail":"Not Found"}"#);
    }

    #[test]
    fn test_preflight_response() {
        let response = preflight_response().unwrap();
        assert_eq!(response.status(), 204);
        assert_eq!(response.headers()["access-control-allow-methods"], "*");
    }
}
