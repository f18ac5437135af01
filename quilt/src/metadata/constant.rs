//! This module defines [Constant].

use std::collections::BTreeSet;
use std::fmt::{self, Display};

/// An immutable value in the finite domain of a member.
///
/// Negated sets are compared structurally: two [Constant::AllOther] values
/// are equal exactly when they exclude the same elements.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Constant {
    /// The SQL `NULL` value.
    Null,
    /// Absence of a value, e.g. a member not declared on the row's type.
    Undefined,
    /// A scalar literal, kept in the textual form it was written in.
    Value(String),
    /// A type discriminator: the row represents an instance of the named type.
    TypeOf(String),
    /// The complement of an explicit finite set within the member's domain.
    AllOther(BTreeSet<Constant>),
}

impl Constant {
    /// Create a scalar literal constant.
    pub fn value(literal: impl Into<String>) -> Self {
        Self::Value(literal.into())
    }

    /// Create a type-discriminator constant.
    pub fn type_of(type_name: impl Into<String>) -> Self {
        Self::TypeOf(type_name.into())
    }

    /// Create the complement of the given set of constants.
    pub fn all_other(excluded: impl IntoIterator<Item = Constant>) -> Self {
        Self::AllOther(excluded.into_iter().collect())
    }

    /// The "anything but NULL" constant.
    pub fn not_null() -> Self {
        Self::all_other([Self::Null])
    }

    /// Whether this is the `NULL` constant.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is the undefined (absent value) constant.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Whether this is a negated-set constant.
    pub fn is_negated(&self) -> bool {
        matches!(self, Self::AllOther(_))
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Undefined => write!(f, "?"),
            Self::Value(literal) => write!(f, "{literal}"),
            Self::TypeOf(type_name) => write!(f, "{type_name}"),
            Self::AllOther(excluded) => {
                write!(f, "NOT(")?;
                for (index, element) in excluded.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::Constant;

    #[test]
    fn negated_sets_compare_structurally() {
        let first = Constant::all_other([Constant::value("A"), Constant::value("B")]);
        let second = Constant::all_other([Constant::value("B"), Constant::value("A")]);
        assert_eq!(first, second);

        let third = Constant::all_other([Constant::value("A")]);
        assert_ne!(first, third);
    }

    #[test]
    fn display() {
        assert_eq!(Constant::Null.to_string(), "NULL");
        assert_eq!(Constant::Undefined.to_string(), "?");
        assert_eq!(Constant::not_null().to_string(), "NOT(NULL)");
    }
}
