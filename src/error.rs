use thiserror::Error;

/// Type alias for Result with OrganizerError
pub type Result<T> = std::result::Result<T, OrganizerError>;

/// How the retry layer and the label stages react to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rate limited, server unavailable or connection failure - retried with backoff
    Transient,
    /// Auth, not-found, bad request, forbidden, local errors - propagated immediately
    Permanent,
    /// Duplicate create - the existing resource is absorbed by the caller
    Conflict,
}

/// Error types for the organizer
#[derive(Error, Debug)]
pub enum OrganizerError {
    /// Gmail API returned an error that has no more specific variant
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Resource already exists (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Message payload missing expected fields
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Label-related errors
    #[error("Label error: {0}")]
    LabelError(String),

    /// Hierarchy or rule table failed validation
    #[error("Rule error: {0}")]
    RuleError(String),

    /// Transient failures persisted through every attempt
    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// State management errors
    #[error("State error: {0}")]
    StateError(String),
}

impl OrganizerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrganizerError::RateLimitExceeded { .. }
            | OrganizerError::ServerError { .. }
            | OrganizerError::NetworkError(_) => ErrorKind::Transient,
            OrganizerError::Conflict(_) => ErrorKind::Conflict,
            _ => ErrorKind::Permanent,
        }
    }

    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        self.kind() == ErrorKind::Permanent
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The header is either delay-seconds ("120") or an HTTP-date. Missing,
/// invalid or past values fall back to 5 seconds.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    if let Some(retry_after_value) = response.headers().get("retry-after") {
        if let Ok(retry_after_str) = retry_after_value.to_str() {
            if let Ok(seconds) = retry_after_str.parse::<u64>() {
                return seconds;
            }

            if let Ok(http_date) = httpdate::parse_http_date(retry_after_str) {
                let now = std::time::SystemTime::now();
                if let Ok(duration) = http_date.duration_since(now) {
                    return duration.as_secs();
                }
            }
        }
    }

    DEFAULT_RETRY_AFTER
}

const DEFAULT_RETRY_AFTER: u64 = 5;

/// Gmail signals quota exhaustion as a 403 with one of these reasons
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// True when a JSON error body carries a rate-limit reason
fn is_rate_limit_body(body: &serde_json::Value) -> bool {
    body.get("error")
        .and_then(|e| e.get("errors"))
        .and_then(|errors| errors.as_array())
        .is_some_and(|errors| {
            errors.iter().any(|e| {
                e.get("reason")
                    .and_then(|r| r.as_str())
                    .is_some_and(|r| RATE_LIMIT_REASONS.contains(&r))
            })
        })
}

/// Map an HTTP status code to an error variant
fn error_for_status(status_code: u16, message: String) -> OrganizerError {
    match status_code {
        400 => OrganizerError::BadRequest(message),
        401 => OrganizerError::AuthError(message),
        403 => OrganizerError::Forbidden(message),
        404 => OrganizerError::NotFound(message),
        409 => OrganizerError::Conflict(message),
        429 => OrganizerError::RateLimitExceeded {
            retry_after: DEFAULT_RETRY_AFTER,
        },
        500..=599 => OrganizerError::ServerError {
            status: status_code,
            message,
        },
        _ => OrganizerError::ApiError(message),
    }
}

impl From<google_gmail1::Error> for OrganizerError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                if status_code == 429 {
                    return OrganizerError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    };
                }
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );
                error_for_status(status_code, message)
            }
            google_gmail1::Error::BadRequest(ref err) => {
                // Gmail reports duplicate label names as a 409 inside the error body
                let code = err
                    .get("error")
                    .and_then(|e| e.get("code"))
                    .and_then(|c| c.as_u64())
                    .and_then(|c| u16::try_from(c).ok());
                match code {
                    Some(403) if is_rate_limit_body(err) => OrganizerError::RateLimitExceeded {
                        retry_after: DEFAULT_RETRY_AFTER,
                    },
                    Some(code) => error_for_status(code, err.to_string()),
                    None => OrganizerError::BadRequest(err.to_string()),
                }
            }
            google_gmail1::Error::HttpError(ref err) => {
                OrganizerError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => OrganizerError::NetworkError(err.to_string()),
            google_gmail1::Error::MissingToken(err) => OrganizerError::AuthError(err.to_string()),
            _ => OrganizerError::ApiError(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        let rate_limit = OrganizerError::RateLimitExceeded { retry_after: 5 };
        assert!(rate_limit.is_transient());
        assert!(!rate_limit.is_permanent());

        let server_error = OrganizerError::ServerError {
            status: 503,
            message: "Service unavailable".to_string(),
        };
        assert!(server_error.is_transient());

        let network_error = OrganizerError::NetworkError("connection reset".to_string());
        assert_eq!(network_error.kind(), ErrorKind::Transient);
    }

    #[test]
    fn test_permanent_errors() {
        let bad_request = OrganizerError::BadRequest("Invalid query".to_string());
        assert!(bad_request.is_permanent());
        assert!(!bad_request.is_transient());

        assert!(OrganizerError::NotFound("msg123".to_string()).is_permanent());
        assert!(OrganizerError::Forbidden("Access denied".to_string()).is_permanent());
        assert!(OrganizerError::AuthError("expired".to_string()).is_permanent());

        let exhausted = OrganizerError::Exhausted {
            operation: "list_labels".to_string(),
            attempts: 7,
            last_error: "HTTP 503".to_string(),
        };
        assert!(exhausted.is_permanent());
    }

    #[test]
    fn test_conflict_is_its_own_kind() {
        let conflict = OrganizerError::Conflict("Label name exists".to_string());
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert!(conflict.is_conflict());
        assert!(!conflict.is_transient());
        assert!(!conflict.is_permanent());
    }

    #[test]
    fn test_json_rate_limit_bodies_are_transient() {
        let too_many = google_gmail1::Error::BadRequest(serde_json::json!({
            "error": {"code": 429, "message": "Too many requests", "status": "RESOURCE_EXHAUSTED"}
        }));
        let error: OrganizerError = too_many.into();
        assert!(matches!(error, OrganizerError::RateLimitExceeded { retry_after: 5 }));
        assert_eq!(error.kind(), ErrorKind::Transient);

        let user_quota = google_gmail1::Error::BadRequest(serde_json::json!({
            "error": {
                "code": 403,
                "message": "User-rate limit exceeded",
                "errors": [{"domain": "usageLimits", "reason": "userRateLimitExceeded"}]
            }
        }));
        let error: OrganizerError = user_quota.into();
        assert!(matches!(error, OrganizerError::RateLimitExceeded { .. }));
        assert!(error.is_transient());
    }

    #[test]
    fn test_json_error_bodies_keep_their_status() {
        let denied = google_gmail1::Error::BadRequest(serde_json::json!({
            "error": {
                "code": 403,
                "message": "Insufficient permission",
                "errors": [{"domain": "global", "reason": "insufficientPermissions"}]
            }
        }));
        let error: OrganizerError = denied.into();
        assert!(matches!(error, OrganizerError::Forbidden(_)));
        assert!(error.is_permanent());

        let duplicate = google_gmail1::Error::BadRequest(serde_json::json!({
            "error": {"code": 409, "message": "Label name exists or conflicts"}
        }));
        assert!(OrganizerError::from(duplicate).is_conflict());

        let unavailable = google_gmail1::Error::BadRequest(serde_json::json!({
            "error": {"code": 503, "message": "Backend Error"}
        }));
        assert!(matches!(
            OrganizerError::from(unavailable),
            OrganizerError::ServerError { status: 503, .. }
        ));

        let no_code = google_gmail1::Error::BadRequest(serde_json::json!({"unexpected": true}));
        assert!(matches!(OrganizerError::from(no_code), OrganizerError::BadRequest(_)));
    }

    #[test]
    fn test_error_for_status() {
        assert!(matches!(
            error_for_status(429, "slow down".to_string()),
            OrganizerError::RateLimitExceeded { .. }
        ));
        assert!(matches!(
            error_for_status(409, "dup".to_string()),
            OrganizerError::Conflict(_)
        ));
        assert!(matches!(
            error_for_status(404, "gone".to_string()),
            OrganizerError::NotFound(_)
        ));
        assert!(matches!(
            error_for_status(401, "auth".to_string()),
            OrganizerError::AuthError(_)
        ));
        assert!(matches!(
            error_for_status(502, "bad gateway".to_string()),
            OrganizerError::ServerError { status: 502, .. }
        ));
        assert!(matches!(
            error_for_status(418, "teapot".to_string()),
            OrganizerError::ApiError(_)
        ));
    }

    #[test]
    fn test_error_display() {
        let error = OrganizerError::RateLimitExceeded { retry_after: 10 };
        let display = format!("{}", error);
        assert!(display.contains("Rate limit exceeded"));
        assert!(display.contains("10 seconds"));

        let exhausted = OrganizerError::Exhausted {
            operation: "create_label".to_string(),
            attempts: 3,
            last_error: "Network error: reset".to_string(),
        };
        assert_eq!(
            exhausted.to_string(),
            "create_label failed after 3 attempts: Network error: reset"
        );
    }

    #[test]
    fn test_parse_retry_after_header_integer() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_static("120"),
        );

        assert_eq!(parse_retry_after_header(&response), 120);
    }

    #[test]
    fn test_parse_retry_after_header_missing() {
        let response = hyper::Response::builder().status(429).body(()).unwrap();
        assert_eq!(parse_retry_after_header(&response), 5);
    }

    #[test]
    fn test_parse_retry_after_header_invalid() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_static("invalid"),
        );

        assert_eq!(parse_retry_after_header(&response), 5);
    }

    #[test]
    fn test_parse_retry_after_header_past_http_date() {
        let mut response = hyper::Response::builder().status(429).body(()).unwrap();
        let past_time = std::time::SystemTime::now() - std::time::Duration::from_secs(60);
        let http_date = httpdate::fmt_http_date(past_time);

        response.headers_mut().insert(
            "retry-after",
            hyper::header::HeaderValue::from_str(&http_date).unwrap(),
        );

        assert_eq!(parse_retry_after_header(&response), 5);
    }
}
