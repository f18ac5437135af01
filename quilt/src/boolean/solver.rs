//! This module implements exact satisfiability of domain-constraint
//! expressions through a hash-consed multi-valued decision diagram.
//!
//! A [ConversionContext] interns variables in first-seen order and builds
//! one vertex per distinct cofactor structure; an expression is satisfiable
//! exactly when its root vertex is not [Vertex::Zero].

use std::collections::HashMap;
use std::hash::Hash;

use crate::metadata::Constant;

use super::domain_constraint::DomainConstraint;
use super::expr::{ArcExpr, BoolExpr};

/// A vertex of the decision diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Vertex {
    /// The unsatisfiable terminal.
    Zero,
    /// The valid terminal.
    One,
    /// An internal decision node.
    Node(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Node {
    variable: usize,
    /// One child per domain value of the variable, in domain order.
    children: Vec<Vertex>,
}

/// Interning state for converting [BoolExpr] trees over domain constraints
/// into decision-diagram vertices.
#[derive(Debug)]
pub struct ConversionContext<V> {
    variable_ids: HashMap<V, usize>,
    domains: Vec<Vec<Constant>>,
    nodes: Vec<Node>,
    dedup: HashMap<Node, Vertex>,
    and_cache: HashMap<(Vertex, Vertex), Vertex>,
    or_cache: HashMap<(Vertex, Vertex), Vertex>,
    not_cache: HashMap<Vertex, Vertex>,
}

impl<V> Default for ConversionContext<V> {
    fn default() -> Self {
        Self {
            variable_ids: HashMap::new(),
            domains: Vec::new(),
            nodes: Vec::new(),
            dedup: HashMap::new(),
            and_cache: HashMap::new(),
            or_cache: HashMap::new(),
            not_cache: HashMap::new(),
        }
    }
}

impl<V> ConversionContext<V>
where
    V: Clone + Eq + Hash,
{
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate an expression into a vertex of this context's diagram.
    pub fn translate(&mut self, expr: &ArcExpr<DomainConstraint<V>>) -> Vertex {
        match &**expr {
            BoolExpr::True => Vertex::One,
            BoolExpr::False => Vertex::Zero,
            BoolExpr::Term(constraint) => self.translate_term(constraint),
            BoolExpr::Not(child) => {
                let vertex = self.translate(child);
                self.complement(vertex)
            }
            BoolExpr::And(children) => {
                let mut result = Vertex::One;
                for child in children {
                    if result == Vertex::Zero {
                        break;
                    }
                    let vertex = self.translate(child);
                    result = self.conjoin(result, vertex);
                }
                result
            }
            BoolExpr::Or(children) => {
                let mut result = Vertex::Zero;
                for child in children {
                    if result == Vertex::One {
                        break;
                    }
                    let vertex = self.translate(child);
                    result = self.disjoin(result, vertex);
                }
                result
            }
        }
    }

    fn translate_term(&mut self, constraint: &DomainConstraint<V>) -> Vertex {
        let variable = self.intern_variable(constraint);
        let children = self.domains[variable]
            .iter()
            .map(|value| {
                if constraint.range().contains(value) {
                    Vertex::One
                } else {
                    Vertex::Zero
                }
            })
            .collect();
        self.make_vertex(variable, children)
    }

    fn intern_variable(&mut self, constraint: &DomainConstraint<V>) -> usize {
        if let Some(&id) = self.variable_ids.get(constraint.variable()) {
            return id;
        }
        let id = self.domains.len();
        self.variable_ids.insert(constraint.variable().clone(), id);
        self.domains
            .push(constraint.domain().iter().cloned().collect());
        id
    }

    fn make_vertex(&mut self, variable: usize, children: Vec<Vertex>) -> Vertex {
        let first = children.first().copied().unwrap_or(Vertex::Zero);
        if children.iter().all(|child| *child == first) {
            return first;
        }
        let node = Node { variable, children };
        if let Some(&existing) = self.dedup.get(&node) {
            return existing;
        }
        let vertex = Vertex::Node(self.nodes.len());
        self.nodes.push(node.clone());
        self.dedup.insert(node, vertex);
        vertex
    }

    fn variable_of(&self, vertex: Vertex) -> usize {
        match vertex {
            Vertex::Node(index) => self.nodes[index].variable,
            // terminals sort after every decision variable
            Vertex::Zero | Vertex::One => usize::MAX,
        }
    }

    /// The children of `vertex` with respect to `variable`: its own children
    /// if it decides on `variable`, otherwise the vertex repeated once per
    /// domain value.
    fn cofactors(&self, vertex: Vertex, variable: usize) -> Vec<Vertex> {
        match vertex {
            Vertex::Node(index) if self.nodes[index].variable == variable => {
                self.nodes[index].children.clone()
            }
            _ => vec![vertex; self.domains[variable].len()],
        }
    }

    fn conjoin(&mut self, a: Vertex, b: Vertex) -> Vertex {
        match (a, b) {
            (Vertex::Zero, _) | (_, Vertex::Zero) => return Vertex::Zero,
            (Vertex::One, other) | (other, Vertex::One) => return other,
            _ if a == b => return a,
            _ => {}
        }
        let key = if a <= b { (a, b) } else { (b, a) };
        if let Some(&cached) = self.and_cache.get(&key) {
            return cached;
        }
        let variable = self.variable_of(a).min(self.variable_of(b));
        let left = self.cofactors(a, variable);
        let right = self.cofactors(b, variable);
        let children = left
            .into_iter()
            .zip(right)
            .map(|(l, r)| self.conjoin(l, r))
            .collect();
        let result = self.make_vertex(variable, children);
        self.and_cache.insert(key, result);
        result
    }

    fn disjoin(&mut self, a: Vertex, b: Vertex) -> Vertex {
        match (a, b) {
            (Vertex::One, _) | (_, Vertex::One) => return Vertex::One,
            (Vertex::Zero, other) | (other, Vertex::Zero) => return other,
            _ if a == b => return a,
            _ => {}
        }
        let key = if a <= b { (a, b) } else { (b, a) };
        if let Some(&cached) = self.or_cache.get(&key) {
            return cached;
        }
        let variable = self.variable_of(a).min(self.variable_of(b));
        let left = self.cofactors(a, variable);
        let right = self.cofactors(b, variable);
        let children = left
            .into_iter()
            .zip(right)
            .map(|(l, r)| self.disjoin(l, r))
            .collect();
        let result = self.make_vertex(variable, children);
        self.or_cache.insert(key, result);
        result
    }

    fn complement(&mut self, vertex: Vertex) -> Vertex {
        match vertex {
            Vertex::Zero => return Vertex::One,
            Vertex::One => return Vertex::Zero,
            Vertex::Node(_) => {}
        }
        if let Some(&cached) = self.not_cache.get(&vertex) {
            return cached;
        }
        let Vertex::Node(index) = vertex else {
            unreachable!("terminals handled above");
        };
        let node = self.nodes[index].clone();
        let children = node
            .children
            .into_iter()
            .map(|child| self.complement(child))
            .collect();
        let result = self.make_vertex(node.variable, children);
        self.not_cache.insert(vertex, result);
        result
    }
}

/// Exact satisfiability of an expression over domain constraints.
pub fn is_satisfiable<V>(expr: &ArcExpr<DomainConstraint<V>>) -> bool
where
    V: Clone + Eq + Hash,
{
    ConversionContext::new().translate(expr) != Vertex::Zero
}

#[cfg(test)]
mod test {
    use super::is_satisfiable;
    use crate::boolean::domain_constraint::DomainConstraint;
    use crate::boolean::expr::{ArcExpr, BoolExpr};
    use crate::metadata::Constant;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    type Expr = ArcExpr<DomainConstraint<&'static str>>;

    fn term(variable: &'static str, values: &[&str]) -> Expr {
        let domain: Arc<BTreeSet<Constant>> = Arc::new(
            ["A", "B", "C"]
                .into_iter()
                .map(Constant::value)
                .collect::<BTreeSet<_>>(),
        );
        BoolExpr::make_term(DomainConstraint::new(
            variable,
            values.iter().map(|value| Constant::value(*value)),
            domain,
        ))
    }

    #[test]
    fn conflicting_ranges_are_unsatisfiable() {
        let expr = BoolExpr::make_and([term("x", &["A"]), term("x", &["B"])]);
        assert!(!is_satisfiable(&expr));

        let overlap = BoolExpr::make_and([term("x", &["A", "B"]), term("x", &["B", "C"])]);
        assert!(is_satisfiable(&overlap));
    }

    #[test]
    fn negation_excludes_range() {
        let expr = BoolExpr::make_and([term("x", &["A"]), BoolExpr::make_not(term("x", &["A"]))]);
        assert!(!is_satisfiable(&expr));

        let tautology =
            BoolExpr::make_or([term("x", &["A"]), BoolExpr::make_not(term("x", &["A"]))]);
        assert!(is_satisfiable(&tautology));
        assert!(!is_satisfiable(&BoolExpr::make_not(tautology)));
    }

    #[test]
    fn independent_variables() {
        let expr = BoolExpr::make_and([term("x", &["A"]), term("y", &["B"]), term("z", &["C"])]);
        assert!(is_satisfiable(&expr));
    }

    #[test]
    fn agrees_with_truth_table() {
        // brute-force every assignment of x, y over {A, B, C}
        let values = ["A", "B", "C"];
        let expr = BoolExpr::make_and([
            BoolExpr::make_or([term("x", &["A", "B"]), term("y", &["C"])]),
            BoolExpr::make_not(BoolExpr::make_and([term("x", &["A"]), term("y", &["C"])])),
        ]);

        let evaluate = |x: &str, y: &str| -> bool {
            let x_in = |set: &[&str]| set.contains(&x);
            let y_in = |set: &[&str]| set.contains(&y);
            (x_in(&["A", "B"]) || y_in(&["C"])) && !(x_in(&["A"]) && y_in(&["C"]))
        };
        let brute_force = values
            .iter()
            .any(|x| values.iter().any(|y| evaluate(x, y)));

        assert_eq!(is_satisfiable(&expr), brute_force);
    }
}
