//! Failure classification.
//!
//! Raw failures from the shared store or the push transport arrive as
//! loosely shaped code/status/message triples. [`classify`] maps them to the
//! closed [`ErrorKind`] enum at the boundary; nothing downstream inspects raw
//! text again.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NetworkTimeout,
    NetworkUnavailable,
    PermissionDenied,
    NotFound,
    Conflict,
    InvalidInput,
    Unknown,
}

impl ErrorKind {
    /// Only transient network conditions are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::NetworkTimeout | Self::NetworkUnavailable)
    }

    /// Stable code shown to administrators and used as the localization key.
    pub fn code(self) -> &'static str {
        match self {
            Self::NetworkTimeout => "NETWORK_TIMEOUT",
            Self::NetworkUnavailable => "NETWORK_UNAVAILABLE",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::InvalidInput => "INVALID_INPUT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Anything that can report its [`ErrorKind`].
pub trait Classify {
    fn error_kind(&self) -> ErrorKind;
}

// ---------------------------------------------------------------------------
// RawError
// ---------------------------------------------------------------------------

/// An unclassified failure as reported by an external collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawError {
    /// Backend error code (e.g. a SQLSTATE such as `23505`).
    pub code: Option<String>,
    /// HTTP-style status code, when the failure came over HTTP.
    pub status: Option<u16>,
    pub message: Option<String>,
}

impl RawError {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for RawError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.message, self.status, &self.code) {
            (Some(m), _, _) => f.write_str(m),
            (None, Some(s), _) => write!(f, "status {s}"),
            (None, None, Some(c)) => write!(f, "code {c}"),
            (None, None, None) => f.write_str("unknown error"),
        }
    }
}

impl std::error::Error for RawError {}

impl Classify for RawError {
    fn error_kind(&self) -> ErrorKind {
        classify(self)
    }
}

// ---------------------------------------------------------------------------
// classify
// ---------------------------------------------------------------------------

const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out", "deadline exceeded"];
const TIMEOUT_STATUSES: &[u16] = &[408, 504];

const UNAVAILABLE_MARKERS: &[&str] = &[
    "fetch failed",
    "connection refused",
    "econnrefused",
    "connection reset",
    "econnreset",
    "network is unreachable",
    "failed to connect",
    "dns error",
];
const UNAVAILABLE_STATUSES: &[u16] = &[502, 503];

const PERMISSION_MARKERS: &[&str] = &[
    "permission denied",
    "permission",
    "forbidden",
    "unauthorized",
    "not authorized",
    "row-level security",
];
const PERMISSION_STATUSES: &[u16] = &[401, 403];
const PERMISSION_CODES: &[&str] = &["42501", "pgrst301"];

const NOT_FOUND_MARKERS: &[&str] = &["not found", "no rows", "does not exist"];
const NOT_FOUND_STATUSES: &[u16] = &[404];
const NOT_FOUND_CODES: &[&str] = &["pgrst116"];

const CONFLICT_MARKERS: &[&str] = &[
    "already assigned",
    "invalid status",
    "conflict",
    "duplicate key",
    "already exists",
];
const CONFLICT_STATUSES: &[u16] = &[409];
const CONFLICT_CODES: &[&str] = &["23505"];

const INVALID_MARKERS: &[&str] = &["invalid input", "invalid", "violates", "malformed"];
const INVALID_STATUSES: &[u16] = &[400, 422];
const INVALID_CODES: &[&str] = &["22p02", "23502", "23514"];

/// Map a raw failure to its [`ErrorKind`]. Pure and total.
///
/// Markers are matched case-insensitively in priority order: timeout,
/// unavailability, permission, not-found, conflict, invalid input. A failure
/// with no code, status, or message is `Unknown`.
pub fn classify(raw: &RawError) -> ErrorKind {
    let message = raw
        .message
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();
    let code = raw.code.as_deref().map(str::to_lowercase).unwrap_or_default();
    let status = raw.status;

    let matches = |markers: &[&str], statuses: &[u16], codes: &[&str]| {
        markers.iter().any(|m| message.contains(m))
            || status.is_some_and(|s| statuses.contains(&s))
            || (!code.is_empty() && codes.contains(&code.as_str()))
    };

    if matches(TIMEOUT_MARKERS, TIMEOUT_STATUSES, &[]) {
        ErrorKind::NetworkTimeout
    } else if matches(UNAVAILABLE_MARKERS, UNAVAILABLE_STATUSES, &[]) {
        ErrorKind::NetworkUnavailable
    } else if matches(PERMISSION_MARKERS, PERMISSION_STATUSES, PERMISSION_CODES) {
        ErrorKind::PermissionDenied
    } else if matches(NOT_FOUND_MARKERS, NOT_FOUND_STATUSES, NOT_FOUND_CODES) {
        ErrorKind::NotFound
    } else if matches(CONFLICT_MARKERS, CONFLICT_STATUSES, CONFLICT_CODES) {
        ErrorKind::Conflict
    } else if matches(INVALID_MARKERS, INVALID_STATUSES, INVALID_CODES) {
        ErrorKind::InvalidInput
    } else {
        ErrorKind::Unknown
    }
}

impl Classify for CoreError {
    fn error_kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::Validation(_) => ErrorKind::InvalidInput,
            CoreError::Conflict(_) | CoreError::InvalidStatusTransition { .. } => {
                ErrorKind::Conflict
            }
            CoreError::Unauthorized(_) | CoreError::Forbidden(_) => ErrorKind::PermissionDenied,
            CoreError::Internal(_) => ErrorKind::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
