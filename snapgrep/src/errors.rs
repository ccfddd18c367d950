//! Error types for snapgrep.
//!
//! Errors fall into three groups that callers treat differently:
//!
//! 1. **Compile errors** (`InvalidPattern`, `InvalidPathPattern`) are fatal for the
//!    request and never worth retrying.
//! 2. **Per-file errors** (`EncodingError`) abort the scan that hit them; the first
//!    one wins and cancels every other worker.
//! 3. **`DeadlineExceeded`** is not a failure. The scan ran out of time and the
//!    partial matches it gathered are still usable.
//!
//! ```rust,ignore
//! match output.deadline_error() {
//!     Ok(output) => render(output),
//!     Err(e) if e.is_deadline_exceeded() => render_partial(),
//!     Err(e) => return Err(e),
//! }
//! ```
use std::path::PathBuf;
use thiserror::Error;

/// Result type for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur while compiling or running a search
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Invalid path pattern: {0}")]
    InvalidPathPattern(String),
    #[error("Invalid UTF-8 in file {path}: {source}")]
    EncodingError {
        path: PathBuf,
        source: std::string::FromUtf8Error,
    },
    #[error("Search deadline exceeded")]
    DeadlineExceeded,
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SearchError {
    pub fn invalid_pattern(msg: impl Into<String>) -> Self {
        Self::InvalidPattern(msg.into())
    }

    pub fn invalid_path_pattern(msg: impl Into<String>) -> Self {
        Self::InvalidPathPattern(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn encoding_error(path: impl Into<PathBuf>, source: std::string::FromUtf8Error) -> Self {
        Self::EncodingError {
            path: path.into(),
            source,
        }
    }

    /// Reports whether this error only means the scan ran out of time.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded)
    }
}

impl From<regex::Error> for SearchError {
    fn from(e: regex::Error) -> Self {
        Self::InvalidPattern(e.to_string())
    }
}

impl From<regex_syntax::Error> for SearchError {
    fn from(e: regex_syntax::Error) -> Self {
        Self::InvalidPattern(e.to_string())
    }
}

impl From<regex_syntax::ast::Error> for SearchError {
    fn from(e: regex_syntax::ast::Error) -> Self {
        Self::InvalidPattern(e.to_string())
    }
}
