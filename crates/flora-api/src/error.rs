//! Error types for the Flora API client

use std::fmt;

use reqwest::StatusCode;

/// Errors that can occur when talking to the Flora backend
#[derive(Debug)]
pub enum ApiError {
    /// Transport failure or timeout
    Network(reqwest::Error),
    /// Request rejected as invalid, by the server (4xx) or before sending
    Validation {
        status: Option<StatusCode>,
        message: String,
    },
    /// Secret or credentials rejected (401/403)
    Auth { status: StatusCode, message: String },
    /// Id-addressed resource does not exist
    NotFound { path: String },
    /// Any other non-success response
    Server { status: StatusCode, message: String },
    /// Success response whose body could not be parsed
    Decode(serde_json::Error),
}

impl ApiError {
    /// Client-side precondition failure, no request was sent
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            status: None,
            message: message.into(),
        }
    }

    /// Classify a failed response by status code.
    ///
    /// `body` is the raw response text; its `error` (or `message`) field is
    /// preferred over the raw text when it is JSON.
    pub fn from_response(status: StatusCode, path: &str, body: &str) -> Self {
        let message = extract_message(status, body);
        match status {
            StatusCode::NOT_FOUND => Self::NotFound {
                path: path.to_string(),
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Auth { status, message },
            StatusCode::BAD_REQUEST
            | StatusCode::CONFLICT
            | StatusCode::PAYLOAD_TOO_LARGE
            | StatusCode::UNSUPPORTED_MEDIA_TYPE
            | StatusCode::UNPROCESSABLE_ENTITY => Self::Validation {
                status: Some(status),
                message,
            },
            _ => Self::Server { status, message },
        }
    }

    /// Text to show next to the control that triggered the request
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(e) => e.to_string(),
            Self::Validation { message, .. }
            | Self::Auth { message, .. }
            | Self::Server { message, .. } => message.clone(),
            Self::NotFound { path } => format!("{} not found", path),
            Self::Decode(e) => e.to_string(),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Network(e) => e.status(),
            Self::Validation { status, .. } => *status,
            Self::Auth { status, .. } | Self::Server { status, .. } => Some(*status),
            Self::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            Self::Decode(_) => None,
        }
    }
}

fn extract_message(status: StatusCode, body: &str) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(body) {
        for field in ["error", "message"] {
            match map.get(field) {
                Some(serde_json::Value::String(s)) if !s.trim().is_empty() => return s.clone(),
                // NestJS-style validation errors carry a list of messages
                Some(serde_json::Value::Array(items)) if !items.is_empty() => {
                    let parts: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
                    if !parts.is_empty() {
                        return parts.join(", ");
                    }
                }
                _ => {}
            }
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }

    status
        .canonical_reason()
        .map(|r| r.to_string())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Validation { message, .. } => write!(f, "Validation error: {}", message),
            Self::Auth { message, .. } => write!(f, "Authorization error: {}", message),
            Self::NotFound { path } => write!(f, "Not found: {}", path),
            Self::Server { status, message } => {
                write!(f, "Server error ({}): {}", status.as_u16(), message)
            }
            Self::Decode(e) => write!(f, "Response decode error: {}", e),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Network(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Network(e)
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e)
    }
}

/// Result type for Flora API operations
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_field_preferred() {
        let err = ApiError::from_response(
            StatusCode::UNAUTHORIZED,
            "/chat/conversaciones",
            r#"{"error":"secret expired","message":"Unauthorized"}"#,
        );
        assert!(matches!(err, ApiError::Auth { .. }));
        assert_eq!(err.user_message(), "secret expired");
    }

    #[test]
    fn test_message_list_joined() {
        let err = ApiError::from_response(
            StatusCode::BAD_REQUEST,
            "/plantas",
            r#"{"message":["nombreCientifico should not be empty","taxonomiaId must be a number"]}"#,
        );
        assert!(matches!(err, ApiError::Validation { .. }));
        assert_eq!(
            err.user_message(),
            "nombreCientifico should not be empty, taxonomiaId must be a number"
        );
    }

    #[test]
    fn test_raw_body_fallback() {
        let err = ApiError::from_response(StatusCode::BAD_GATEWAY, "/uso", "upstream down");
        assert_eq!(err.user_message(), "upstream down");
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn test_empty_body_uses_reason() {
        let err = ApiError::from_response(StatusCode::INTERNAL_SERVER_ERROR, "/uso", "");
        assert_eq!(err.user_message(), "Internal Server Error");
    }

    #[test]
    fn test_not_found_display() {
        let err = ApiError::from_response(StatusCode::NOT_FOUND, "/plantas/9", "{}");
        assert_eq!(format!("{}", err), "Not found: /plantas/9");
    }

    #[test]
    fn test_invalid_has_no_status() {
        let err = ApiError::invalid("content must not be empty");
        assert_eq!(err.status(), None);
        assert_eq!(
            format!("{}", err),
            "Validation error: content must not be empty"
        );
    }
}
