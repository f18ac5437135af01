//! Error-handling module for the crate.

use thiserror::Error;

pub mod kind;
pub mod log;

pub use kind::ViewGenErrorKind;
pub use log::{ErrorLog, Record};

/// Error-collection for all the possible errors occurring in this crate.
///
/// "Normal" unsatisfiability is never an error: the Boolean, tile and
/// knowledge-base layers report it through `bool`/`Option` returns. Only
/// malformed input metadata and the final aggregated validation outcome
/// surface here.
#[derive(Error, Debug)]
pub enum Error {
    /// The supplied schema or mapping metadata is inconsistent.
    #[error("invalid mapping metadata: {reason}")]
    InvalidMetadata {
        /// What was wrong with the metadata.
        reason: String,
    },
    /// A fragment where-clause uses a shape the rewriting layer does not
    /// support (e.g. top-level negation in a fragment condition).
    #[error("unsupported condition shape in mapping fragment: {0}")]
    UnsupportedCondition(String),
    /// Mapping validation found rule violations; the log holds one record
    /// per violation, collected across all cells of the extent.
    #[error("mapping validation failed with {} problem(s):\n{}", .0.len(), .0)]
    MappingFailure(ErrorLog),
}

impl Error {
    /// Shorthand for an [Error::InvalidMetadata].
    pub fn invalid_metadata(reason: impl Into<String>) -> Self {
        Self::InvalidMetadata {
            reason: reason.into(),
        }
    }
}
