//! This module defines [DomainConstraint].

use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::sync::Arc;

use crate::metadata::Constant;

/// A restriction of one Boolean variable to a range of values within its
/// full domain.
///
/// Two constraints are comparable only when they reference the same
/// variable; [DomainConstraint::invert] produces the complement range within
/// the variable's full domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainConstraint<V> {
    variable: V,
    range: BTreeSet<Constant>,
    domain: Arc<BTreeSet<Constant>>,
}

impl<V> DomainConstraint<V> {
    /// Create a constraint; the range is clamped to the domain.
    pub fn new(
        variable: V,
        range: impl IntoIterator<Item = Constant>,
        domain: Arc<BTreeSet<Constant>>,
    ) -> Self {
        let range = range
            .into_iter()
            .filter(|value| domain.contains(value))
            .collect();
        Self {
            variable,
            range,
            domain,
        }
    }

    /// The variable this constraint restricts.
    pub fn variable(&self) -> &V {
        &self.variable
    }

    /// The restricted range.
    pub fn range(&self) -> &BTreeSet<Constant> {
        &self.range
    }

    /// The variable's full domain.
    pub fn domain(&self) -> &Arc<BTreeSet<Constant>> {
        &self.domain
    }

    /// Whether the range is empty (the constraint is unsatisfiable).
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Whether the range covers the whole domain (the constraint is trivial).
    pub fn is_full(&self) -> bool {
        self.range.len() == self.domain.len()
    }
}

impl<V: Clone> DomainConstraint<V> {
    /// The complement constraint within the variable's full domain.
    pub fn invert(&self) -> Self {
        Self {
            variable: self.variable.clone(),
            range: self.domain.difference(&self.range).cloned().collect(),
            domain: Arc::clone(&self.domain),
        }
    }
}

impl<V: Display> Display for DomainConstraint<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.range.len() == 1 {
            let value = self.range.iter().next().expect("single element");
            return write!(f, "{} = {value}", self.variable);
        }
        write!(f, "{} IN {{", self.variable)?;
        for (index, value) in self.range.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod test {
    use super::DomainConstraint;
    use crate::metadata::Constant;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    fn abc_domain() -> Arc<BTreeSet<Constant>> {
        Arc::new(
            ["A", "B", "C"]
                .into_iter()
                .map(Constant::value)
                .collect::<BTreeSet<_>>(),
        )
    }

    #[test]
    fn invert_is_complement() {
        let constraint = DomainConstraint::new("x", [Constant::value("A")], abc_domain());
        let inverted = constraint.invert();

        assert_eq!(inverted.range().len(), 2);
        assert!(!inverted.range().contains(&Constant::value("A")));
        assert_eq!(inverted.invert(), constraint);
    }

    #[test]
    fn range_clamped_to_domain() {
        let constraint = DomainConstraint::new(
            "x",
            [Constant::value("A"), Constant::value("Z")],
            abc_domain(),
        );
        assert_eq!(
            constraint.range().iter().collect::<Vec<_>>(),
            vec![&Constant::value("A")]
        );
    }

    #[test]
    fn display() {
        let single = DomainConstraint::new("x", [Constant::value("A")], abc_domain());
        assert_eq!(single.to_string(), "x = A");

        let multi = single.invert();
        assert_eq!(multi.to_string(), "x IN {B, C}");
    }
}
