//! NATS message types

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// NATS subjects served by the worker
pub mod subjects {
    pub const PING: &str = "b2b.ping";
    pub const TEMPLATE: &str = "b2b.orders.excel.template";
    pub const PREVIEW: &str = "b2b.orders.excel.preview";
    pub const IMPORT: &str = "b2b.orders.excel.import";
    pub const HELPER: &str = "b2b.orders.excel.helper";
    pub const HISTORY: &str = "b2b.orders.excel.history";
}

/// Generic request wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub token: Option<String>,  // JWT access token
    pub payload: T,
}

impl<T> Request<T> {
    pub fn with_token(token: String, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            token: Some(token),
            payload,
        }
    }
}

/// Generic success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(request_id: Uuid, payload: T) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(request_id: Uuid, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }
}

/// Pipeline call result: `{ success, message, data }`.
///
/// `data` is carried even when `success` is false so callers can show
/// row-level detail for partially successful imports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct ImportEnvelope<T> {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
    /// Machine-readable reason when the call failed without data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl<T> ImportEnvelope<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self { success: true, message: message.into(), data: Some(data), error_code: None }
    }

    pub fn partial(message: impl Into<String>, data: T) -> Self {
        Self { success: false, message: message.into(), data: Some(data), error_code: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into(), data: None, error_code: None }
    }

    pub fn failed_with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { error_code: Some(code.into()), ..Self::failed(message) }
    }
}

/// Payload for requests that carry no parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyPayload {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_keeps_data_when_unsuccessful() {
        let envelope = ImportEnvelope::partial("1 row failed", 42u32);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["data"], 42);
    }

    #[test]
    fn envelope_without_data_deserializes() {
        let envelope: ImportEnvelope<u32> =
            serde_json::from_str(r#"{"success":false,"message":"boom"}"#).unwrap();
        assert!(envelope.data.is_none());
        assert_eq!(envelope.message, "boom");
    }

    #[test]
    fn failed_envelope_carries_code() {
        let envelope: ImportEnvelope<u32> = ImportEnvelope::failed_with_code("PARSE_ERROR", "bad file");
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["errorCode"], "PARSE_ERROR");
        assert!(json["data"].is_null());
    }

    #[test]
    fn empty_payload_accepts_object() {
        let _: Request<EmptyPayload> = serde_json::from_str(
            r#"{"id":"00000000-0000-0000-0000-000000000000","timestamp":"2026-01-01T00:00:00Z","payload":{}}"#,
        ).unwrap();
    }
}
