//! This module defines the mapping cells that describe how conceptual
//! extents relate to storage tables, and the view-generation driver that
//! compiles them into fragment views and per-value rewritings.

pub mod cell;
pub mod context;
pub mod query_rewriter;

pub use cell::{Cell, CellQuery, CellWrapper, MemberCondition, ProjectedSlot, RawCondition};
pub use context::{ViewgenConfig, ViewgenContext};
pub use query_rewriter::QueryRewriter;
