//! Shared Meta Graph API plumbing
//!
//! Both the Facebook and Instagram adapters speak to
//! `graph.facebook.com`; the versioned base URL, the HTTP client setup,
//! and the error-body interpretation live here.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;

use crate::error::{PlatformError, QcastError, Result};
use crate::platforms::truncate_body;

pub const GRAPH_API_VERSION: &str = "v21.0";

/// Graph error codes that mean "slow down", not "rejected"
const RATE_LIMIT_CODES: [i64; 3] = [4, 32, 613];

pub fn graph_url(path: &str) -> String {
    format!("https://graph.facebook.com/{}/{}", GRAPH_API_VERSION, path)
}

/// HTTP client with explicit connect and request timeouts.
///
/// The request timeout is generous because simple video uploads send the
/// whole file in one request.
pub fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(300))
        .build()
        .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)).into())
}

/// Transport-level failures (connect, timeout, body read) are transient
pub fn transport_error(e: reqwest::Error) -> QcastError {
    PlatformError::Network(e.to_string()).into()
}

/// Interpret a Graph API response body.
///
/// HTTP 429 and rate-limit error codes map to `RateLimit` (transient),
/// bare 5xx to `Network` (transient), any other error body to `Publish`
/// (permanent). Returns the parsed JSON on success.
pub async fn parse_response(response: reqwest::Response, context: &str) -> Result<Value> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    interpret_body(status, &text, context)
}

fn interpret_body(status: StatusCode, text: &str, context: &str) -> Result<Value> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(PlatformError::RateLimit(format!("{}: HTTP 429", context)).into());
    }

    let body: Value = match serde_json::from_str(text) {
        Ok(body) => body,
        Err(_) => {
            if status.is_server_error() {
                return Err(PlatformError::Network(format!(
                    "{}: HTTP {} with non-JSON body",
                    context, status
                ))
                .into());
            }
            return Err(PlatformError::Publish(format!(
                "{}: non-JSON response: {}",
                context,
                truncate_body(text, 500)
            ))
            .into());
        }
    };

    if let Some(error) = body.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown API error");

        if RATE_LIMIT_CODES.contains(&code) {
            return Err(PlatformError::RateLimit(format!(
                "{}: {} (code {})",
                context, message, code
            ))
            .into());
        }
        return Err(PlatformError::Publish(format!(
            "{}: {} (code {})",
            context, message, code
        ))
        .into());
    }

    // A 5xx without an error body is still a server failure
    if status.is_server_error() {
        return Err(PlatformError::Network(format!("{}: HTTP {}", context, status)).into());
    }

    Ok(body)
}

/// Pull a required string field out of a response body
pub fn require_str(body: &Value, key: &str, context: &str) -> Result<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            PlatformError::Publish(format!("{}: no '{}' in response", context, key)).into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_url() {
        assert_eq!(
            graph_url("12345/photos"),
            "https://graph.facebook.com/v21.0/12345/photos"
        );
    }

    #[test]
    fn test_interpret_success_body() {
        let body = interpret_body(StatusCode::OK, r#"{"id": "123_456"}"#, "test").unwrap();
        assert_eq!(body["id"], "123_456");
    }

    #[test]
    fn test_interpret_http_429_is_rate_limit() {
        let err = interpret_body(StatusCode::TOO_MANY_REQUESTS, "{}", "test").unwrap_err();
        assert!(matches!(
            err,
            QcastError::Platform(PlatformError::RateLimit(_))
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn test_interpret_rate_limit_error_codes() {
        for code in [4, 32, 613] {
            let text = format!(r#"{{"error": {{"message": "Too many calls", "code": {}}}}}"#, code);
            let err = interpret_body(StatusCode::OK, &text, "test").unwrap_err();
            assert!(
                matches!(err, QcastError::Platform(PlatformError::RateLimit(_))),
                "code {} should be rate limit",
                code
            );
        }
    }

    #[test]
    fn test_interpret_api_error_is_permanent_publish() {
        let text = r#"{"error": {"message": "Invalid parameter", "code": 100}}"#;
        let err = interpret_body(StatusCode::BAD_REQUEST, text, "Uploading image").unwrap_err();
        match err {
            QcastError::Platform(PlatformError::Publish(msg)) => {
                assert!(msg.contains("Invalid parameter"));
                assert!(msg.contains("code 100"));
            }
            other => panic!("Expected publish error, got {:?}", other),
        }
    }

    #[test]
    fn test_interpret_non_json_5xx_is_transient() {
        let err =
            interpret_body(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>", "test").unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_interpret_non_json_4xx_is_permanent() {
        let err = interpret_body(StatusCode::FORBIDDEN, "nope", "test").unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_interpret_non_json_multibyte_body_is_truncated_safely() {
        // 600 bytes of 3-byte characters; the cutoff lands mid-character
        let text = "\u{20ac}".repeat(200);
        let err = interpret_body(StatusCode::FORBIDDEN, &text, "test").unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_interpret_5xx_json_without_error_key_is_transient() {
        let err =
            interpret_body(StatusCode::BAD_GATEWAY, r#"{"status": "down"}"#, "test").unwrap_err();
        assert!(matches!(
            err,
            QcastError::Platform(PlatformError::Network(_))
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn test_require_str() {
        let body: Value = serde_json::from_str(r#"{"id": "42"}"#).unwrap();
        assert_eq!(require_str(&body, "id", "test").unwrap(), "42");
        assert!(require_str(&body, "post_id", "test").is_err());
    }
}
