//! This module defines [FragmentQuery] and the condition constructors used
//! to build fragment where-clauses.

use std::collections::{BTreeSet, HashSet};
use std::fmt::{self, Display};
use std::sync::Arc;

use crate::boolean::{ArcExpr, BoolExpr, BoolLiteral, DomainConstraint};
use crate::metadata::{Constant, Domain, MemberPath};

/// The condition language of fragment queries: Boolean expressions over
/// domain constraints on [BoolLiteral] variables.
pub type BoolExpression = ArcExpr<DomainConstraint<BoolLiteral>>;

/// A named pair of projected attributes and a Boolean condition,
/// representing one mapping fragment's row-set.
///
/// Fragment queries are immutable; every algebraic combinator builds a fresh
/// instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentQuery {
    attributes: BTreeSet<MemberPath>,
    condition: BoolExpression,
    label: Option<String>,
}

impl FragmentQuery {
    /// Create a fragment query.
    pub fn new(
        label: Option<String>,
        attributes: impl IntoIterator<Item = MemberPath>,
        condition: BoolExpression,
    ) -> Self {
        Self {
            attributes: attributes.into_iter().collect(),
            condition,
            label,
        }
    }

    /// Create an attribute-less query from a condition alone.
    pub fn with_condition(condition: BoolExpression) -> Self {
        Self::new(None, [], condition)
    }

    /// The projected attributes.
    pub fn attributes(&self) -> &BTreeSet<MemberPath> {
        &self.attributes
    }

    /// The where-clause.
    pub fn condition(&self) -> &BoolExpression {
        &self.condition
    }

    /// The optional label, used in diagnostics.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The Boolean variables appearing in the condition, deduplicated.
    pub fn condition_variables(&self) -> Vec<&BoolLiteral> {
        let mut seen = HashSet::new();
        self.condition
            .terms()
            .into_iter()
            .map(|constraint| constraint.variable())
            .filter(|variable| seen.insert(*variable))
            .collect()
    }
}

impl Display for FragmentQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label}"),
            None => write!(f, "[{}]", self.condition),
        }
    }
}

/// Condition "member takes a scalar value in `values`", ranged over the
/// member's domain.
pub fn scalar_condition(
    member: &MemberPath,
    values: impl IntoIterator<Item = Constant>,
    domain: &Domain,
) -> BoolExpression {
    restriction(BoolLiteral::scalar(member.clone()), values, domain)
}

/// Condition "member is an instance of a type in `values`".
pub fn type_condition(
    member: &MemberPath,
    values: impl IntoIterator<Item = Constant>,
    domain: &Domain,
) -> BoolExpression {
    restriction(BoolLiteral::type_of(member.clone()), values, domain)
}

fn restriction(
    variable: BoolLiteral,
    values: impl IntoIterator<Item = Constant>,
    domain: &Domain,
) -> BoolExpression {
    let range = domain.expand(&values.into_iter().collect());
    BoolExpr::make_term(DomainConstraint::new(
        variable,
        range,
        Arc::clone(domain.possible()),
    ))
}

/// The two-valued domain of role variables.
fn role_domain() -> Arc<BTreeSet<Constant>> {
    Arc::new(
        [Constant::value("true"), Constant::value("false")]
            .into_iter()
            .collect(),
    )
}

/// Condition "the current tuple's key originates from this extent".
pub fn in_set_condition(extent: &str) -> BoolExpression {
    role_condition(BoolLiteral::in_set(extent))
}

/// Condition "the current tuple participates in this association end role".
pub fn in_role_condition(extent: &str, role: &str) -> BoolExpression {
    role_condition(BoolLiteral::in_role(extent, role))
}

fn role_condition(variable: BoolLiteral) -> BoolExpression {
    BoolExpr::make_term(DomainConstraint::new(
        variable,
        [Constant::value("true")],
        role_domain(),
    ))
}

#[cfg(test)]
mod test {
    use super::{scalar_condition, FragmentQuery};
    use crate::boolean::BoolLiteral;
    use crate::metadata::{Constant, Domain, MemberPath};

    #[test]
    fn condition_variables_deduplicate() {
        let member = MemberPath::member("Table", "Kind");
        let domain = Domain::closed([Constant::value("A"), Constant::value("B")]);
        let a = scalar_condition(&member, [Constant::value("A")], &domain);
        let b = scalar_condition(&member, [Constant::value("B")], &domain);
        let query = FragmentQuery::with_condition(crate::boolean::BoolExpr::make_or([a, b]));

        assert_eq!(
            query.condition_variables(),
            vec![&BoolLiteral::scalar(member)]
        );
    }

    #[test]
    fn negated_values_expand_against_domain() {
        let member = MemberPath::member("Table", "Kind");
        let domain = Domain::closed([Constant::value("A"), Constant::value("B")]);
        let condition = scalar_condition(
            &member,
            [Constant::all_other([Constant::value("A")])],
            &domain,
        );

        let terms = condition.terms();
        assert_eq!(terms.len(), 1);
        assert!(terms[0].range().contains(&Constant::value("B")));
        assert!(!terms[0].range().contains(&Constant::value("A")));
    }
}
