//! This module defines [ViewGenErrorKind].

use enum_assoc::Assoc;
use thiserror::Error;

/// Classes of mapping-rule violations reported by validation.
#[derive(Assoc, Error, Debug, Clone, Copy, PartialEq, Eq)]
#[func(pub fn code(&self) -> usize)]
pub enum ViewGenErrorKind {
    /// The conceptual side of a fragment does not produce the same rows as
    /// its storage side.
    #[error("the conceptual and storage queries of the fragment are not equivalent")]
    #[assoc(code = 301)]
    PartitionConstraintViolation,
    /// A projected condition member loses information: equivalence breaks
    /// when the member is fixed to one of its domain values.
    #[error("a condition member is mapped to a regular property and loses information")]
    #[assoc(code = 302)]
    DomainConstraintViolation,
    /// A non-nullable storage column is reachable through a fragment whose
    /// conceptual query admits `NULL`.
    #[error("a non-nullable column is mapped through a nullable conceptual query")]
    #[assoc(code = 303)]
    NullableMappingForNonNullableColumn,
    /// Overlapping fragments project a non-key column from different
    /// conceptual members.
    #[error("a non-key column is projected from different members in overlapping fragments")]
    #[assoc(code = 304)]
    NonKeyProjectedWithOverlappingPartitions,
}

#[cfg(test)]
mod test {
    use super::ViewGenErrorKind;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            ViewGenErrorKind::PartitionConstraintViolation.code(),
            ViewGenErrorKind::DomainConstraintViolation.code(),
            ViewGenErrorKind::NullableMappingForNonNullableColumn.code(),
            ViewGenErrorKind::NonKeyProjectedWithOverlappingPartitions.code(),
        ];
        for (index, code) in codes.iter().enumerate() {
            assert!(!codes[index + 1..].contains(code));
        }
    }
}
