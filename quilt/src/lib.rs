//! Mapping-view generation: compiles entity-mapping cells into fragment
//! views, rewrites extent queries in terms of them, and validates that the
//! mapping round-trips every instance.

#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts
)]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    variant_size_differences
)]

pub mod boolean;
pub mod error;
pub mod metadata;

pub mod mapping;
pub mod rewriting;
pub mod validation;
