//! API request and response data models.
//!
//! API models are distinct from the database rows in [`crate::db::models`], so the wire contract
//! can evolve independently of storage. Every successful response is wrapped in [`ApiResponse`];
//! failures use [`crate::errors::ErrorBody`].

pub mod auth;
pub mod comments;
pub mod content;
pub mod newsletter;
pub mod phase;
pub mod stats;
pub mod subscription;
pub mod users;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Success";

/// Success envelope: `{"success": true, "message": "...", "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Always `true`
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::with_message(data, DEFAULT_SUCCESS_MESSAGE)
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Envelope with `data: null`
    pub fn message_only(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(ApiResponse::ok(42)).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "message": "Success", "data": 42}));

        let json = serde_json::to_value(ApiResponse::<()>::message_only("Comment deleted")).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "message": "Comment deleted", "data": null}));
    }
}
