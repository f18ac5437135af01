//! This module defines the Boolean expression engine: the persistent
//! [BoolExpr] tree, [DomainConstraint] literals over [BoolLiteral]
//! variables, normal-form conversions, and the exact satisfiability solver.

pub mod domain_constraint;
pub mod expr;
pub mod literal;
pub mod normal_form;
pub mod solver;

pub use domain_constraint::DomainConstraint;
pub use expr::{ArcExpr, BoolExpr};
pub use literal::{BoolLiteral, RestrictionKind};
pub use normal_form::{to_dnf, to_nnf};
pub use solver::ConversionContext;
