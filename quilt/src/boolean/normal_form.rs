//! This module implements negation-normal-form and disjunctive-normal-form
//! conversion for expressions over [DomainConstraint] literals.

use std::hash::Hash;

use itertools::Itertools;

use super::domain_constraint::DomainConstraint;
use super::expr::{ArcExpr, BoolExpr};

/// Push negations down to the literals.
///
/// Negated terms invert their domain constraint; a term whose range becomes
/// empty collapses to `False` and a term whose range covers the whole domain
/// collapses to `True`.
pub fn to_nnf<V>(expr: &ArcExpr<DomainConstraint<V>>) -> ArcExpr<DomainConstraint<V>>
where
    V: Clone + Eq + Hash,
{
    push_negation(expr, false)
}

fn push_negation<V>(
    expr: &ArcExpr<DomainConstraint<V>>,
    negate: bool,
) -> ArcExpr<DomainConstraint<V>>
where
    V: Clone + Eq + Hash,
{
    match &**expr {
        BoolExpr::True => {
            if negate {
                BoolExpr::make_false()
            } else {
                BoolExpr::make_true()
            }
        }
        BoolExpr::False => {
            if negate {
                BoolExpr::make_true()
            } else {
                BoolExpr::make_false()
            }
        }
        BoolExpr::Term(constraint) => {
            let constraint = if negate {
                constraint.invert()
            } else {
                constraint.clone()
            };
            if constraint.is_empty() {
                BoolExpr::make_false()
            } else if constraint.is_full() {
                BoolExpr::make_true()
            } else {
                BoolExpr::make_term(constraint)
            }
        }
        BoolExpr::Not(child) => push_negation(child, !negate),
        BoolExpr::And(children) => {
            let converted = children.iter().map(|child| push_negation(child, negate));
            if negate {
                BoolExpr::make_or(converted)
            } else {
                BoolExpr::make_and(converted)
            }
        }
        BoolExpr::Or(children) => {
            let converted = children.iter().map(|child| push_negation(child, negate));
            if negate {
                BoolExpr::make_and(converted)
            } else {
                BoolExpr::make_or(converted)
            }
        }
    }
}

/// Convert to disjunctive normal form: an `Or` of `And`s of positive terms.
///
/// The expression is first brought into negation normal form; conjunctions
/// over disjunctive children are expanded through a cartesian product.
pub fn to_dnf<V>(expr: &ArcExpr<DomainConstraint<V>>) -> ArcExpr<DomainConstraint<V>>
where
    V: Clone + Eq + Hash,
{
    distribute(&to_nnf(expr))
}

fn distribute<V>(expr: &ArcExpr<DomainConstraint<V>>) -> ArcExpr<DomainConstraint<V>>
where
    V: Clone + Eq + Hash,
{
    match &**expr {
        BoolExpr::True | BoolExpr::False | BoolExpr::Term(_) => expr.clone(),
        // in NNF, negation can only sit directly on a literal
        BoolExpr::Not(_) => expr.clone(),
        BoolExpr::Or(children) => BoolExpr::make_or(children.iter().map(distribute)),
        BoolExpr::And(children) => {
            let factors: Vec<Vec<ArcExpr<DomainConstraint<V>>>> = children
                .iter()
                .map(|child| match &*distribute(child) {
                    BoolExpr::Or(disjuncts) => disjuncts.clone(),
                    _ => vec![distribute(child)],
                })
                .collect();
            BoolExpr::make_or(
                factors
                    .into_iter()
                    .multi_cartesian_product()
                    .map(BoolExpr::make_and),
            )
        }
    }
}
