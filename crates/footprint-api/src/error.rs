use std::sync::Arc;

use thiserror::Error;

/// Top-level error type for the `footprint-api` crate.
///
/// This is the one typed error every layer of the client stack surfaces:
/// the bare transport, the retry decorator and the caching decorator all
/// return it unchanged so callers can branch on [`status`](Self::status).
///
/// Cloneable so a failed cache load reaches every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login was rejected (wrong credentials, locked account, etc.)
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Service ─────────────────────────────────────────────────────
    /// Any non-2xx response from the service.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(Arc<reqwest::Error>),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// A report generation timestamp could not be parsed.
    #[error("Invalid report timestamp {value:?}: {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// A scan target looked like a CIDR block but was not a valid one.
    #[error("Invalid scan target: {0}")]
    InvalidTarget(String),

    // ── Lookups ─────────────────────────────────────────────────────
    /// A local lookup (account by name, default scanner, ...) found nothing.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    // ── Protocol violations ─────────────────────────────────────────
    /// Two reports share one generation timestamp.
    #[error("Duplicate report timestamp {timestamp}")]
    DuplicateReport { timestamp: String },

    /// A page disagreed with page 1 about how many pages there are.
    #[error("Page {page} reported {actual} total pages, expected {expected}")]
    InconsistentPagination {
        page: u32,
        expected: u32,
        actual: u32,
    },
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(Arc::new(err))
    }
}

impl Error {
    /// The HTTP status code behind this error, if there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Authentication { .. } => Some(401),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` if a request was refused with HTTP 401/403 and a
    /// fresh login might resolve it.
    ///
    /// A rejected login is not an expired session: retrying it with the
    /// same credentials cannot help.
    pub fn is_auth_expired(&self) -> bool {
        !matches!(self, Self::Authentication { .. }) && matches!(self.status(), Some(401 | 403))
    }

    /// Returns `true` if a connect or read timeout caused this error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Returns `true` if the retry decorator should try again.
    pub fn is_retryable(&self) -> bool {
        self.is_auth_expired() || self.is_timeout()
    }

    /// Returns `true` if this is a "not found" error, local or remote.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Api { status: 404, .. })
    }
}
