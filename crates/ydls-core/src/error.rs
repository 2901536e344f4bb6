//! Unified error type for the download pipeline.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for the HTTP layer to derive a status code via
//! [`Error::http_status`] and for the orchestrator to decide whether a
//! failure may be retried via [`Error::is_retryable`].

use std::fmt;

/// Whether a metadata-extraction failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveErrorKind {
    /// Network hiccup, throttling, engine timeout. Retried.
    Transient,
    /// Unsupported site, missing or private media. Never retried.
    Permanent,
}

impl fmt::Display for ResolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Permanent => write!(f, "permanent"),
        }
    }
}

/// Unified error type covering all failure modes of a download flow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or incompatible request options.
    #[error("Invalid option: {0}")]
    InvalidOption(String),

    /// The metadata-extraction engine could not describe the source.
    #[error("Resolve error ({kind}): {message}")]
    Resolve {
        /// Retry classification.
        kind: ResolveErrorKind,
        /// Human-readable error description.
        message: String,
    },

    /// A spawned engine process failed to start or exited non-zero.
    #[error("Pipeline error [{stage}]: {message}")]
    Pipeline {
        /// The chain stage that failed (e.g. "producer").
        stage: String,
        /// Human-readable error description.
        message: String,
    },

    /// The flow was aborted by the caller or by a timeout.
    #[error("Cancelled")]
    Cancelled,

    /// The format catalog is malformed.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// The configuration file is malformed.
    #[error("Config error: {0}")]
    Config(String),

    /// An external tool is missing or misbehaved outside of a pipeline run.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InvalidOption(_) => 400,
            Error::Resolve {
                kind: ResolveErrorKind::Permanent,
                ..
            } => 404,
            Error::Resolve {
                kind: ResolveErrorKind::Transient,
                ..
            } => 502,
            Error::Pipeline { .. } => 502,
            Error::Tool { .. } => 502,
            Error::Cancelled => 503,
            Error::Catalog(_) => 500,
            Error::Config(_) => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Only transient resolve failures are retried; everything else either
    /// cannot succeed on a second attempt or may already have streamed bytes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Resolve {
                kind: ResolveErrorKind::Transient,
                ..
            }
        )
    }

    /// Convenience constructor for [`Error::InvalidOption`].
    pub fn invalid_option(message: impl fmt::Display) -> Self {
        Error::InvalidOption(message.to_string())
    }

    /// Convenience constructor for a transient [`Error::Resolve`].
    pub fn resolve_transient(message: impl Into<String>) -> Self {
        Error::Resolve {
            kind: ResolveErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Convenience constructor for a permanent [`Error::Resolve`].
    pub fn resolve_permanent(message: impl Into<String>) -> Self {
        Error::Resolve {
            kind: ResolveErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Pipeline`].
    pub fn pipeline(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Pipeline {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
