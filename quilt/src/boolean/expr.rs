//! This module defines [BoolExpr].

use std::fmt::{self, Display};
use std::sync::Arc;

/// A shared, immutable Boolean expression tree.
pub type ArcExpr<T> = Arc<BoolExpr<T>>;

/// A Boolean expression over an opaque literal type `T`.
///
/// Trees are persistent and shared through [Arc]; no operation mutates a
/// subtree in place. The constructors normalize trivial cases: `And` with no
/// children is `True`, `Or` with no children is `False`, negation of a
/// constant flips it, and nested `And`/`Or` children are flattened.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BoolExpr<T> {
    /// The constant true.
    True,
    /// The constant false.
    False,
    /// A literal.
    Term(T),
    /// Negation of a subexpression.
    Not(ArcExpr<T>),
    /// Conjunction of subexpressions.
    And(Vec<ArcExpr<T>>),
    /// Disjunction of subexpressions.
    Or(Vec<ArcExpr<T>>),
}

impl<T> BoolExpr<T> {
    /// The constant `true` expression.
    pub fn make_true() -> ArcExpr<T> {
        Arc::new(Self::True)
    }

    /// The constant `false` expression.
    pub fn make_false() -> ArcExpr<T> {
        Arc::new(Self::False)
    }

    /// A single literal.
    pub fn make_term(term: T) -> ArcExpr<T> {
        Arc::new(Self::Term(term))
    }

    /// Negate an expression; constants flip, double negation cancels.
    pub fn make_not(child: ArcExpr<T>) -> ArcExpr<T> {
        match &*child {
            Self::True => Self::make_false(),
            Self::False => Self::make_true(),
            Self::Not(inner) => Arc::clone(inner),
            _ => Arc::new(Self::Not(child)),
        }
    }

    /// Conjunction; `True` children are dropped, a `False` child collapses
    /// the whole expression, nested conjunctions are flattened, and an empty
    /// conjunction is `True`.
    pub fn make_and(children: impl IntoIterator<Item = ArcExpr<T>>) -> ArcExpr<T> {
        let mut conjuncts = Vec::new();
        for child in children {
            match &*child {
                Self::True => {}
                Self::False => return Self::make_false(),
                Self::And(inner) => conjuncts.extend(inner.iter().cloned()),
                _ => conjuncts.push(child),
            }
        }
        match conjuncts.len() {
            0 => Self::make_true(),
            1 => conjuncts.pop().expect("one element"),
            _ => Arc::new(Self::And(conjuncts)),
        }
    }

    /// Disjunction; dual of [BoolExpr::make_and], an empty disjunction is
    /// `False`.
    pub fn make_or(children: impl IntoIterator<Item = ArcExpr<T>>) -> ArcExpr<T> {
        let mut disjuncts = Vec::new();
        for child in children {
            match &*child {
                Self::False => {}
                Self::True => return Self::make_true(),
                Self::Or(inner) => disjuncts.extend(inner.iter().cloned()),
                _ => disjuncts.push(child),
            }
        }
        match disjuncts.len() {
            0 => Self::make_false(),
            1 => disjuncts.pop().expect("one element"),
            _ => Arc::new(Self::Or(disjuncts)),
        }
    }

    /// Whether this expression is the constant `true`.
    pub fn is_true(&self) -> bool {
        matches!(self, Self::True)
    }

    /// Whether this expression is the constant `false`.
    pub fn is_false(&self) -> bool {
        matches!(self, Self::False)
    }

    /// Number of literal occurrences; used as a cost heuristic.
    pub fn term_count(&self) -> usize {
        match self {
            Self::True | Self::False => 0,
            Self::Term(_) => 1,
            Self::Not(child) => child.term_count(),
            Self::And(children) | Self::Or(children) => {
                children.iter().map(|child| child.term_count()).sum()
            }
        }
    }

    /// All literal occurrences, in depth-first order.
    pub fn terms(&self) -> Vec<&T> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Self::True | Self::False => {}
                Self::Term(term) => found.push(term),
                Self::Not(child) => stack.push(child),
                Self::And(children) | Self::Or(children) => {
                    stack.extend(children.iter().map(|child| child.as_ref()));
                }
            }
        }
        found
    }

    /// Rebuild the tree with every literal replaced by `map(literal)`.
    pub fn map_terms<U>(&self, map: &impl Fn(&T) -> ArcExpr<U>) -> ArcExpr<U> {
        match self {
            Self::True => BoolExpr::make_true(),
            Self::False => BoolExpr::make_false(),
            Self::Term(term) => map(term),
            Self::Not(child) => BoolExpr::make_not(child.map_terms(map)),
            Self::And(children) => {
                BoolExpr::make_and(children.iter().map(|child| child.map_terms(map)))
            }
            Self::Or(children) => {
                BoolExpr::make_or(children.iter().map(|child| child.map_terms(map)))
            }
        }
    }
}

impl<T: Display> Display for BoolExpr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Term(term) => write!(f, "{term}"),
            Self::Not(child) => write!(f, "NOT({child})"),
            Self::And(children) => write_separated(f, children, " AND "),
            Self::Or(children) => write_separated(f, children, " OR "),
        }
    }
}

fn write_separated<T: Display>(
    f: &mut fmt::Formatter<'_>,
    children: &[ArcExpr<T>],
    separator: &str,
) -> fmt::Result {
    write!(f, "(")?;
    for (index, child) in children.iter().enumerate() {
        if index > 0 {
            write!(f, "{separator}")?;
        }
        write!(f, "{child}")?;
    }
    write!(f, ")")
}
