use http::StatusCode;
use serde::Serialize;
use std::fmt;

/// A single failed requirement on the collected quote data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Field the violation refers to (wire name of the quote field)
    pub field: &'static str,
    /// Human-readable description shown to the user
    pub message: String,
}

impl Violation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {}", join_violations(.0))]
    Validation(Vec<Violation>),

    #[error("No geocoding results for '{query}'")]
    GeocodingNotFound { query: String },

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Quote submission rejected with status {status}: {message}")]
    SubmissionError { status: StatusCode, message: String },

    #[error("Malformed map message: {0}")]
    MapBridgeParseError(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Location permission denied")]
    LocationPermissionDenied,

    #[error("Device location unavailable: {0}")]
    DeviceLocationUnavailable(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Circuit breaker open")]
    CircuitBreakerOpen,

    #[error("Request timed out")]
    Timeout,

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ServiceError::Timeout;
        }
        if err.is_decode() {
            return ServiceError::NetworkError(format!("Unexpected response body: {}", err));
        }
        ServiceError::NetworkError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl ServiceError {
    /// Classifies a rejected backend response by status code.
    ///
    /// The body is searched for the usual `message` / `error` / `errors`
    /// fields so a 400 can surface the server's own validation detail.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        ServiceError::SubmissionError {
            status,
            message: extract_server_detail(body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Unknown error")
                    .to_string()
            }),
        }
    }

    /// HTTP status attached to the error, if it came from the backend.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::SubmissionError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true for failures the user can fix by retrying later without
    /// changing any input.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError(_) | Self::Timeout | Self::CircuitBreakerOpen => true,
            Self::SubmissionError { status, .. } => status.is_server_error(),
            _ => false,
        }
    }

    /// Returns the message suitable for showing to the user.
    /// This is the single source of truth for user-facing wording.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(violations) => {
                let mut message = String::from("Please complete the following fields:");
                for violation in violations {
                    message.push_str("\n- ");
                    message.push_str(&violation.message);
                }
                message
            }
            Self::GeocodingNotFound { query } => format!(
                "We could not find \"{}\". Try a more specific address, tap the location on the map, or use your current location.",
                query
            ),
            Self::NetworkError(_) | Self::Timeout => {
                "Connection problem. Check your internet connection and try again.".to_string()
            }
            Self::CircuitBreakerOpen => {
                "The address service is temporarily unavailable. Tap the location on the map or try again in a moment.".to_string()
            }
            Self::SubmissionError { status, message } => match status.as_u16() {
                400 => format!("The quote was rejected: {}", message),
                401 => "Your session has expired. Please sign in again.".to_string(),
                500 => "The server could not process the quote. Please try again later.".to_string(),
                code => format!("The quote could not be sent (error {}).", code),
            },
            Self::LocationPermissionDenied => {
                "Location permission was denied. Enter the address or tap the map instead.".to_string()
            }
            Self::InvalidTransition(msg) => msg.clone(),
            // Internal failures get a generic message
            Self::MapBridgeParseError(_)
            | Self::DeviceLocationUnavailable(_)
            | Self::SerializationError(_)
            | Self::Other(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

fn extract_server_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    for key in ["message", "error", "detail"] {
        if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
            if !text.trim().is_empty() {
                return Some(text.to_string());
            }
        }
    }
    match value.get("errors") {
        Some(serde_json::Value::Array(items)) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .or_else(|| item.get("msg").and_then(|m| m.as_str()).map(str::to_string))
                        .or_else(|| {
                            item.get("message")
                                .and_then(|m| m.as_str())
                                .map(str::to_string)
                        })
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        Some(serde_json::Value::Object(map)) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(field, detail)| match detail.as_str() {
                    Some(text) => format!("{}: {}", field, text),
                    None => format!("{}: {}", field, detail),
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join("; "))
        }
        _ => None,
    }
}
