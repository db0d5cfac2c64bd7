//! Response envelopes returned by the backend.

use serde::{Deserialize, Serialize};

/// Standard backend envelope: status code, human-readable message, payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    /// Application status code.
    pub code: i64,
    /// Human-readable status message.
    pub message: String,
    /// Payload.
    pub data: String,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn decodes_backend_envelope() {
        let raw = r#"{"code":200,"message":"ok","data":"hello"}"#;
        let Ok(response) = serde_json::from_str::<ApiResponse>(raw) else {
            panic!("envelope should decode");
        };
        assert_eq!(response.code, 200);
        assert_eq!(response.data, "hello");
    }

    #[test]
    fn missing_field_is_an_error() {
        assert!(serde_json::from_str::<ApiResponse>(r#"{"code":200}"#).is_err());
    }
}
