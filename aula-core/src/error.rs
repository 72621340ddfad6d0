//! Error types shared by the remote access layer and the cache.

use serde::Serialize;
use thiserror::Error;

/// Classification of a remote failure, used for retry and notification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The request never reached the backend or no response arrived.
    Transport,
    /// 401: the session is no longer valid.
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 409: the requested state is already satisfied (e.g. already enrolled).
    Conflict,
    /// Any other 4xx, or a request that could not be built.
    Client,
    /// 5xx
    Server,
    /// The response body did not match the expected shape.
    Decode,
}

impl ErrorKind {
    /// Transient failures are the only ones a read may retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::Transport | ErrorKind::Server)
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Client,
        }
    }
}

/// Failure of one remote access function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("no message"))]
    Status { status: u16, message: Option<String> },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// Build a status error from a non-2xx response body.
    ///
    /// The backend reports errors as `{ "message": .. }`, `{ "error": .. }` or
    /// `{ "detail": .. }`; a non-JSON body is used verbatim when non-empty.
    pub fn from_response(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            message: backend_message(body),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Network(_) => ErrorKind::Transport,
            RemoteError::Status { status, .. } => ErrorKind::from_status(*status),
            RemoteError::InvalidRequest(_) => ErrorKind::Client,
            RemoteError::Decode(_) => ErrorKind::Decode,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message provided by the backend, if any.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            RemoteError::Status { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Decode(err.to_string())
    }
}

fn backend_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => ["message", "error", "detail"]
            .iter()
            .find_map(|field| map.get(*field).and_then(|v| v.as_str()))
            .map(str::to_string),
        Ok(serde_json::Value::String(text)) => Some(text),
        Ok(_) => None,
        Err(_) => Some(trimmed.to_string()),
    }
}

/// Client-side validation failure. Blocks a mutation before any request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid value for {field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_status(409), ErrorKind::Conflict);
        assert_eq!(ErrorKind::from_status(422), ErrorKind::Client);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::Server);
    }

    #[test]
    fn test_only_transport_and_server_are_transient() {
        assert!(RemoteError::Network("reset".into()).is_transient());
        assert!(RemoteError::from_response(502, "").is_transient());
        assert!(!RemoteError::from_response(409, "").is_transient());
        assert!(!RemoteError::from_response(401, "").is_transient());
        assert!(!RemoteError::Decode("eof".into()).is_transient());
    }

    #[test]
    fn test_backend_message_extraction() {
        let err = RemoteError::from_response(409, r#"{"message":"Ya inscripto"}"#);
        assert_eq!(err.backend_message(), Some("Ya inscripto"));

        let err = RemoteError::from_response(500, r#"{"detail":"boom"}"#);
        assert_eq!(err.backend_message(), Some("boom"));

        let err = RemoteError::from_response(502, "Bad Gateway");
        assert_eq!(err.backend_message(), Some("Bad Gateway"));

        let err = RemoteError::from_response(500, r#"{"code":7}"#);
        assert_eq!(err.backend_message(), None);

        let err = RemoteError::from_response(500, "   ");
        assert_eq!(err.backend_message(), None);
    }

    #[test]
    fn test_display_includes_status() {
        let err = RemoteError::from_response(404, "");
        assert_eq!(err.to_string(), "HTTP 404: no message");
        assert_eq!(err.status(), Some(404));
    }
}
