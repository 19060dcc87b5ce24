use std::path::PathBuf;

use serde_json::Value;

/// Failures surfaced by the DevGuide API client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("Unexpected response from server: {0}")]
    Decode(String),
    #[error("Invalid request path {0:?}")]
    InvalidPath(String),
    #[error("Could not read {}: {source}", path.display())]
    LocalFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Builds a status error from a non-2xx response body.
    pub fn from_response_body(status: u16, body: &str) -> Self {
        let trimmed = body.trim();
        let message = match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => format_errors(&value),
            Err(_) => trimmed.to_string(),
        };
        let message = if message.trim().is_empty() {
            format!("Request failed with status {status}")
        } else {
            message
        };
        ApiError::Status { status, message }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Flattens an API error body into a single user-facing message.
///
/// Strings pass through, a `detail` field wins over everything else, keyed
/// objects are flattened one level and joined with spaces. Anything else is
/// stringified.
pub fn format_errors(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Object(map) => {
            if let Some(detail) = map.get("detail") {
                match detail {
                    Value::String(text) if !text.is_empty() => return text.clone(),
                    Value::Null | Value::Bool(false) => {}
                    Value::String(_) => {}
                    other => return other.to_string(),
                }
            }
            map.values()
                .flat_map(|value| match value {
                    Value::Array(items) => items.iter().map(plain).collect::<Vec<_>>(),
                    other => vec![plain(other)],
                })
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        }
        other => other.to_string(),
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Array(items) => items.iter().map(plain).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_bodies_pass_through() {
        assert_eq!(format_errors(&json!("Invalid credentials")), "Invalid credentials");
    }

    #[test]
    fn detail_field_wins() {
        let body = json!({"detail": "Token expired", "code": "token_not_valid"});
        assert_eq!(format_errors(&body), "Token expired");
    }

    #[test]
    fn keyed_objects_are_flattened() {
        let body = json!({
            "email": ["This field is required."],
            "password": ["Too short.", "Too common."]
        });
        assert_eq!(
            format_errors(&body),
            "This field is required. Too short. Too common."
        );
    }

    #[test]
    fn field_messages_keep_server_order() {
        let err = ApiError::from_response_body(
            400,
            r#"{"password":["Too short."],"email":["Required."]}"#,
        );
        assert_eq!(err.to_string(), "Too short. Required.");
    }

    #[test]
    fn numbers_are_stringified() {
        assert_eq!(format_errors(&json!(42)), "42");
    }

    #[test]
    fn unstructured_body_is_kept() {
        let err = ApiError::from_response_body(502, "Bad gateway");
        assert_eq!(err.to_string(), "Bad gateway");
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn empty_body_reports_status() {
        let err = ApiError::from_response_body(500, "  ");
        assert_eq!(err.to_string(), "Request failed with status 500");
    }

    #[test]
    fn unauthorized_is_detected() {
        let err = ApiError::from_response_body(401, r#"{"detail":"nope"}"#);
        assert!(err.is_unauthorized());
        assert_eq!(err.to_string(), "nope");
    }
}
