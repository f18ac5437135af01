//! This module implements validation of the compiled mapping: equivalence of
//! the conceptual and storage sides of every cell, and the partition, domain
//! and nullability constraints.

pub mod error_pattern;
pub mod validator;

pub use error_pattern::{ErrorPatternMatcher, NoPatternMatcher};
pub use validator::RewritingValidator;
