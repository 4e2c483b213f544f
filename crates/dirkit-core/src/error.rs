//! Error types for directory operations.
//!
//! Each stage of the connect / resolve / update flow has its own error enum so callers can match
//! on exactly the failures that stage produces. [`Error`] unifies them for code that only needs to
//! report a failure.

use thiserror::Error;

/// Failure reported by the directory transport or protocol layer.
///
/// This is the underlying cause attached to every non-diagnostic error below.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation}: {message}")]
pub struct SessionError {
    operation: &'static str,
    message: String,
}

impl SessionError {
    /// Creates a session error for the named protocol operation (`dial`, `bind`, `search`, ...).
    #[must_use]
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }

    /// Creates the error reported when an operation exceeds its configured timeout.
    #[must_use]
    pub fn timed_out(operation: &'static str) -> Self {
        Self::new(operation, "operation timed out")
    }

    /// Protocol operation that failed.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        self.operation
    }

    /// Message reported by the transport.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised while establishing a directory session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The transport to the endpoint could not be established.
    #[error("dial error: {endpoint}")]
    Dial {
        /// Endpoint that was dialed.
        endpoint: String,
        /// Transport failure.
        #[source]
        source: SessionError,
    },

    /// The directory rejected the bind request.
    #[error("bind error: {bind_dn}")]
    Auth {
        /// Distinguished name used for the bind.
        bind_dn: String,
        /// Protocol failure.
        #[source]
        source: SessionError,
    },
}

/// Errors raised while resolving lookup criteria to a single entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The search did not match exactly one entry.
    #[error("{matched} results matched for ({numeric_id}/{string_id}): {candidates:?}")]
    AmbiguousOrMissing {
        /// Number of entries returned by the search.
        matched: usize,
        /// Numeric identifier from the lookup criteria.
        numeric_id: u32,
        /// String identifier from the lookup criteria.
        string_id: String,
        /// `uid` value of every candidate, in search order.
        candidates: Vec<String>,
    },

    /// The search request failed.
    #[error("search error: {filter}")]
    SearchFailed {
        /// Filter that was sent.
        filter: String,
        /// Transport or protocol failure.
        #[source]
        source: SessionError,
    },
}

impl ResolveError {
    /// Returns the candidate identifiers when the search matched zero or several entries.
    #[must_use]
    pub fn candidates(&self) -> Option<&[String]> {
        match self {
            Self::AmbiguousOrMissing { candidates, .. } => Some(candidates),
            Self::SearchFailed { .. } => None,
        }
    }
}

/// Errors raised while updating an attribute of a resolved entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// The attribute already holds a value and overwriting was not requested.
    #[error("attribute `{attribute}` already set on {dn} and overwrite not set, no change made")]
    Exists {
        /// Distinguished name of the entry.
        dn: String,
        /// Attribute that was left untouched.
        attribute: String,
    },

    /// The modify request failed.
    #[error("could not modify attribute `{attribute}` on {dn}")]
    MutationFailed {
        /// Distinguished name of the entry.
        dn: String,
        /// Attribute that was being changed.
        attribute: String,
        /// Transport or protocol failure.
        #[source]
        source: SessionError,
    },
}

/// Umbrella error for dirkit operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Connecting failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Resolving an entry failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Updating an entry failed.
    #[error(transparent)]
    Update(#[from] UpdateError),

    /// A session-level operation outside connect/resolve/update failed (for example unbind).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Configuration is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A JSON document could not be read, parsed or written.
    #[error("JSON document error: {0}")]
    Json(String),
}

/// Specialized result type for dirkit operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the error code for this error type.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connect(ConnectError::Dial { .. }) => "DIAL_FAILED",
            Self::Connect(ConnectError::Auth { .. }) => "AUTH_FAILED",
            Self::Resolve(ResolveError::AmbiguousOrMissing { .. }) => "AMBIGUOUS_OR_MISSING",
            Self::Resolve(ResolveError::SearchFailed { .. }) => "SEARCH_FAILED",
            Self::Update(UpdateError::Exists { .. }) => "ATTRIBUTE_EXISTS",
            Self::Update(UpdateError::MutationFailed { .. }) => "MUTATION_FAILED",
            Self::Session(_) => "SESSION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Returns true if this error should be logged as a serious error.
    ///
    /// Lookup misses and refused overwrites are expected outcomes for callers.
    #[must_use]
    pub const fn should_log(&self) -> bool {
        !matches!(
            self,
            Self::Resolve(ResolveError::AmbiguousOrMissing { .. })
                | Self::Update(UpdateError::Exists { .. })
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}
