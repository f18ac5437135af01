//! This module defines the seam through which hosts can turn generic
//! constraint violations into more specific diagnostics of their own.

use std::fmt::Debug;

use crate::error::ErrorLog;
use crate::mapping::ViewgenContext;

/// Gets the first chance to explain a constraint violation.
///
/// When a validator check fails, the matcher runs before the generic
/// diagnostic is recorded; returning `true` (after adding its own records
/// to the log) suppresses the generic one.
pub trait ErrorPatternMatcher: Debug {
    /// Inspect the context and report pattern-matched errors; `false` keeps
    /// the generic diagnostic.
    fn find_mapping_errors(&self, context: &ViewgenContext<'_>, error_log: &mut ErrorLog) -> bool {
        let _ = (context, error_log);
        false
    }
}

/// The default matcher: never overrides the generic diagnostics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPatternMatcher;

impl ErrorPatternMatcher for NoPatternMatcher {}
