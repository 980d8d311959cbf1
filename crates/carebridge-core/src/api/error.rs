use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    /// 401 from the backend. The session guard has already run when the
    /// caller sees this.
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String, body: Option<Value> },

    #[error("Request failed with status {status}: {message}")]
    Status {
        status: StatusCode,
        message: String,
        body: Option<Value>,
    },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Build the error for a failed response from its status and raw body.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let message = parsed
            .as_ref()
            .and_then(extract_message)
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("Request failed")
                        .to_string()
                } else {
                    Self::truncate_body(body)
                }
            });

        if is_unauthorized(status, parsed.as_ref()) {
            ApiError::Unauthorized {
                message,
                body: parsed,
            }
        } else {
            ApiError::Status {
                status,
                message,
                body: parsed,
            }
        }
    }

    /// Upstream HTTP status, when the failure came from a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::NetworkError(e) => e.status(),
            ApiError::InvalidResponse(_) | ApiError::InvalidRequest(_) => None,
        }
    }

    /// Parsed error body, when the backend sent JSON.
    pub fn body(&self) -> Option<&Value> {
        match self {
            ApiError::Unauthorized { body, .. } | ApiError::Status { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }
}

/// 401 is reported either by the transport status or by a `statusCode`
/// field in the body, as a number or a string.
// TODO: drop the string form once the backend contract confirms which
// upstream still sends `"401"`.
pub fn is_unauthorized(status: StatusCode, body: Option<&Value>) -> bool {
    if status == StatusCode::UNAUTHORIZED {
        return true;
    }
    match body.and_then(|b| b.get("statusCode")) {
        Some(Value::Number(n)) => n.as_u64() == Some(401),
        Some(Value::String(s)) => s.trim() == "401",
        _ => false,
    }
}

/// Human readable message from a structured error body: `message` (string or
/// first element of an array of validation messages), then `error`.
fn extract_message(body: &Value) -> Option<String> {
    let from_field = |field: &str| match body.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Array(items)) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
        _ => None,
    };
    from_field("message").or_else(|| from_field("error"))
}
