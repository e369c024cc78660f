//! Error types for the Term batch resolution library.
//!
//! This module provides a comprehensive error handling strategy using `thiserror`
//! for automatic error trait implementations. All errors in the library
//! are represented by the `TermError` enum.
//!
//! Note that a raw reference failing to match a connector's pattern is *not*
//! an error: it is recorded in the reference cache and surfaced through
//! `get_unmatched_references`.

use thiserror::Error;

/// The main error type for the Term batch resolution library.
///
/// This enum represents all possible errors that can occur while discovering,
/// partitioning and materializing batches.
#[derive(Error, Debug)]
pub enum TermError {
    /// Invalid connector, asset or sorter configuration.
    ///
    /// Raised at validation time, before storage or the cache are touched.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The backing store could not be listed (missing path, permissions, timeout).
    #[error("Store unavailable at '{location}': {message}")]
    StoreUnavailable {
        /// Directory, prefix or URL that could not be listed
        location: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A partition identity lacks a value required by a reference template.
    #[error("Cannot resolve reference template '{template}': missing value for group '{group}'")]
    UnresolvableReference {
        /// Group name without a value
        group: String,
        /// Template being rendered
        template: String,
    },

    /// A batch definition does not correspond to any physical reference.
    #[error("Cannot resolve batch for data asset '{asset}': {message}")]
    UnresolvableBatch {
        /// Data asset the definition belongs to
        asset: String,
        /// Detailed error message
        message: String,
        /// Optional underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A batch request is malformed or addresses an unknown connector or asset.
    #[error("Invalid batch request: {0}")]
    InvalidRequest(String),

    /// The reference cache was queried before the first refresh.
    #[error("Reference cache for data connector '{0}' has not been populated yet")]
    NotInitialized(String),

    /// A sorter could not compute a sort key for a partition value.
    #[error("Sorter '{sorter}' failed: {message}")]
    Sorter {
        /// Name of the group the sorter is bound to
        sorter: String,
        /// Detailed error message
        message: String,
    },

    /// A batch spec is missing data or directives required to load it.
    #[error("Invalid batch spec: {0}")]
    InvalidBatchSpec(String),

    /// Error from DataFusion operations.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from serialization/deserialization operations.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error when an operation is not supported.
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Security-related error.
    #[error("Security error: {0}")]
    SecurityError(String),

    /// Internal failure with context attached through [`ErrorContext`].
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, TermError>`.
///
/// This is the standard `Result` type used throughout the library.
///
/// # Examples
///
/// ```rust
/// use term_batch::error::Result;
///
/// fn resolve() -> Result<()> {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, TermError>;

impl TermError {
    /// Creates a new store-unavailable error.
    pub fn store_unavailable(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            location: location.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new store-unavailable error with a source error.
    pub fn store_unavailable_with_source(
        location: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::StoreUnavailable {
            location: location.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new unresolvable-batch error.
    pub fn unresolvable_batch(asset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnresolvableBatch {
            asset: asset.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new unresolvable-batch error with a source error.
    pub fn unresolvable_batch_with_source(
        asset: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::UnresolvableBatch {
            asset: asset.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new sorter error.
    pub fn sorter(sorter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sorter {
            sorter: sorter.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for errors raised while validating configuration or
    /// requests, i.e. before any storage access.
    pub fn is_validation_error(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvalidRequest(_))
    }
}

impl From<serde_json::Error> for TermError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, msg: &str) -> Result<T>;

    /// Adds context with a lazy message.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: Into<TermError>,
{
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| {
            let base_error = e.into();
            match base_error {
                TermError::Internal(inner) => TermError::Internal(format!("{msg}: {inner}")),
                other => TermError::Internal(format!("{msg}: {other}")),
            }
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let msg = f();
            let base_error = e.into();
            match base_error {
                TermError::Internal(inner) => TermError::Internal(format!("{msg}: {inner}")),
                other => TermError::Internal(format!("{msg}: {other}")),
            }
        })
    }
}
