//! This module defines [BoolLiteral], the variable identities that domain
//! constraints range over.

use std::fmt::{self, Display};

use crate::metadata::MemberPath;

/// The kind of a member restriction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RestrictionKind {
    /// The member takes a scalar value in a set.
    Scalar,
    /// The member is an instance of a type in a set.
    Type,
}

/// Identity of a Boolean variable appearing in mapping conditions.
///
/// Equality and hashing are over the identity alone; the restricted value
/// range lives in the surrounding
/// [DomainConstraint](super::DomainConstraint).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoolLiteral {
    /// A member restriction: "member M takes a value in set S".
    MemberRestriction {
        /// The restricted member.
        member: MemberPath,
        /// Scalar or type restriction.
        kind: RestrictionKind,
    },
    /// "The current tuple's key originates from this extent", optionally via
    /// a specific association end role.
    Role {
        /// The extent.
        extent: String,
        /// The association end role, if any.
        role: Option<String>,
    },
}

impl BoolLiteral {
    /// A scalar member restriction variable.
    pub fn scalar(member: MemberPath) -> Self {
        Self::MemberRestriction {
            member,
            kind: RestrictionKind::Scalar,
        }
    }

    /// A type member restriction variable.
    pub fn type_of(member: MemberPath) -> Self {
        Self::MemberRestriction {
            member,
            kind: RestrictionKind::Type,
        }
    }

    /// An "in extent" role variable.
    pub fn in_set(extent: impl Into<String>) -> Self {
        Self::Role {
            extent: extent.into(),
            role: None,
        }
    }

    /// An "in association end role" variable.
    pub fn in_role(extent: impl Into<String>, role: impl Into<String>) -> Self {
        Self::Role {
            extent: extent.into(),
            role: Some(role.into()),
        }
    }

    /// The restricted member, for member-restriction variables.
    pub fn member(&self) -> Option<&MemberPath> {
        match self {
            Self::MemberRestriction { member, .. } => Some(member),
            Self::Role { .. } => None,
        }
    }
}

impl Display for BoolLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MemberRestriction {
                member,
                kind: RestrictionKind::Scalar,
            } => write!(f, "{member}"),
            Self::MemberRestriction {
                member,
                kind: RestrictionKind::Type,
            } => write!(f, "TypeOf({member})"),
            Self::Role { extent, role: None } => write!(f, "InSet({extent})"),
            Self::Role {
                extent,
                role: Some(role),
            } => write!(f, "InRole({extent}.{role})"),
        }
    }
}
