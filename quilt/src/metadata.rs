//! This module defines the schema metadata consumed by view generation:
//! value [Constant]s, navigation [MemberPath]s, per-member value [Domain]s,
//! and the [Schema] describing extents, types and associations.

pub mod constant;
pub mod domain;
pub mod member_path;
pub mod schema;

pub use constant::Constant;
pub use domain::{Domain, MemberDomainMap};
pub use member_path::MemberPath;
pub use schema::{
    AssociationEnd, EntityType, Extent, ExtentKind, Member, Multiplicity, ReferentialConstraint,
    Schema,
};
