//! This module defines [FragmentQueryKB], the add-only store of implication
//! and equivalence facts derived from schema metadata, together with the
//! chase optimization that pre-folds atomic facts into rewrite rules.

use std::collections::{HashMap, HashSet};

use crate::boolean::{solver, BoolExpr, BoolLiteral, DomainConstraint};
use crate::boolean::normal_form::to_nnf;
use crate::error::Error;
use crate::metadata::{
    Constant, Domain, ExtentKind, MemberDomainMap, MemberPath, Multiplicity, Schema,
};

use super::fragment_query::{
    in_role_condition, in_set_condition, scalar_condition, type_condition, BoolExpression,
};

/// Accumulates facts about the mapping space and answers satisfiability
/// queries against them.
///
/// Facts are add-only; the knowledge base is built once per extent and then
/// queried repeatedly, never rolled back. Every asserted fact lands in the
/// full conjunction; facts with an atomic antecedent are additionally
/// indexed for the chase, which rewrites a query expression by conjoining
/// the consequences of the atomic terms it mentions. The chase is a cost
/// optimization only: the final zero-test always runs on the exact solver.
#[derive(Debug)]
pub struct FragmentQueryKB {
    /// Conjunction of all asserted facts.
    kb_expression: BoolExpression,
    /// Chase index: atomic antecedent term to the conjunction of its
    /// consequences.
    implications: HashMap<DomainConstraint<BoolLiteral>, BoolExpression>,
    /// Facts that could not be indexed.
    residue: BoolExpression,
    use_chase: bool,
}

impl Default for FragmentQueryKB {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FragmentQueryKB {
    /// Create an empty knowledge base.
    pub fn new(use_chase: bool) -> Self {
        Self {
            kb_expression: BoolExpr::make_true(),
            implications: HashMap::new(),
            residue: BoolExpr::make_true(),
            use_chase,
        }
    }

    /// The conjunction of all asserted facts.
    pub fn expression(&self) -> &BoolExpression {
        &self.kb_expression
    }

    /// Number of facts indexed for the chase.
    pub fn indexed_fact_count(&self) -> usize {
        self.implications.len()
    }

    /// Assert `condition implies consequence`.
    pub fn assert_implication(&mut self, condition: BoolExpression, consequence: BoolExpression) {
        let fact = BoolExpr::make_or([
            BoolExpr::make_not(condition.clone()),
            consequence.clone(),
        ]);
        log::trace!("KB fact: {fact}");
        self.kb_expression = BoolExpr::make_and([self.kb_expression.clone(), fact.clone()]);
        self.cache_fact(&condition, consequence, fact);
    }

    /// Assert `left` and `right` are equivalent (both implications).
    pub fn assert_equivalence(&mut self, left: BoolExpression, right: BoolExpression) {
        self.assert_implication(left.clone(), right.clone());
        self.assert_implication(right, left);
    }

    /// Index the fact under its atomic antecedent, or push it to the
    /// residue.
    ///
    /// Caching a new rule whose antecedent variable already has a rule with
    /// a different, overlapping range would make the chase unsound, so such
    /// facts are demoted to the residue instead.
    fn cache_fact(
        &mut self,
        condition: &BoolExpression,
        consequence: BoolExpression,
        fact: BoolExpression,
    ) {
        let normalized = to_nnf(condition);
        let atom = match &*normalized {
            BoolExpr::Term(constraint) => constraint.clone(),
            _ => {
                self.demote(fact);
                return;
            }
        };

        if let Some(existing) = self.implications.get_mut(&atom) {
            *existing = BoolExpr::make_and([existing.clone(), consequence]);
            return;
        }
        let overlapping = self.implications.keys().any(|key| {
            key.variable() == atom.variable()
                && !key.range().is_disjoint(atom.range())
        });
        if overlapping {
            self.demote(fact);
        } else {
            self.implications.insert(atom, consequence);
        }
    }

    fn demote(&mut self, fact: BoolExpression) {
        self.residue = BoolExpr::make_and([self.residue.clone(), fact]);
    }

    /// Rewrite an expression by conjoining the indexed consequences of
    /// every atomic term it is forced to satisfy, to a fixpoint.
    ///
    /// The expression is brought into negation normal form first, so a term
    /// under a negation appears with its inverted range and cannot trigger a
    /// rule for the positive range. Only terms in conjunctive position are
    /// chased: a term under an `Or` need not hold in a satisfying model, so
    /// conjoining its consequence would be unsound.
    pub fn chase(&self, expr: &BoolExpression) -> BoolExpression {
        let normalized = to_nnf(expr);
        let mut result = normalized.clone();
        let mut seen: HashSet<DomainConstraint<BoolLiteral>> = HashSet::new();
        let mut pending: Vec<DomainConstraint<BoolLiteral>> =
            conjunctive_terms(&normalized).into_iter().cloned().collect();

        while let Some(term) = pending.pop() {
            if !seen.insert(term.clone()) {
                continue;
            }
            if let Some(consequence) = self.implications.get(&term) {
                pending.extend(conjunctive_terms(consequence).into_iter().cloned());
                result = BoolExpr::make_and([result, consequence.clone()]);
            }
        }
        result
    }

    /// Whether `expr` is satisfiable together with all asserted facts.
    ///
    /// Picks whichever of chase-then-residue and the raw fact conjunction
    /// has the smaller term count, then runs the exact solver on it.
    pub fn is_satisfiable(&self, expr: &BoolExpression) -> bool {
        let raw = BoolExpr::make_and([expr.clone(), self.kb_expression.clone()]);
        let candidate = if self.use_chase && !self.implications.is_empty() {
            let chased = BoolExpr::make_and([self.chase(expr), self.residue.clone()]);
            if chased.term_count() <= raw.term_count() {
                chased
            } else {
                raw
            }
        } else {
            raw
        };
        solver::is_satisfiable(&candidate)
    }

    /// Derive the facts the metadata implies for one extent: type-hierarchy
    /// absence rules for entity sets, and role/set rules plus
    /// referential-constraint equivalences for association sets.
    pub fn create_required_constraints(
        &mut self,
        schema: &Schema,
        extent_name: &str,
        domain_map: &MemberDomainMap,
    ) -> Result<(), Error> {
        let extent = schema.extent(extent_name).ok_or_else(|| {
            Error::invalid_metadata(format!("unknown extent `{extent_name}`"))
        })?;
        match &extent.kind {
            ExtentKind::EntitySet { element_type } => {
                self.create_hierarchy_constraints(schema, extent_name, element_type, domain_map)
            }
            ExtentKind::AssociationSet { ends, constraints } => {
                self.create_association_constraints(schema, extent_name, ends)?;
                self.create_referential_constraints(schema, extent_name, ends, constraints)
            }
        }
    }

    /// For every condition member declared only on a subset of the element
    /// type's hierarchy: not being an instance of those types implies the
    /// member is undefined.
    fn create_hierarchy_constraints(
        &mut self,
        schema: &Schema,
        extent_name: &str,
        element_type: &str,
        domain_map: &MemberDomainMap,
    ) -> Result<(), Error> {
        let derived = schema.derived_types(element_type);
        if derived.len() <= 1 {
            return Ok(());
        }
        let type_domain = hierarchy_domain(&derived);
        let root = MemberPath::extent_root(extent_name);

        for member in domain_map.condition_members(extent_name) {
            if member.is_extent_root() {
                continue;
            }
            let Some(leaf) = member.leaf() else {
                continue;
            };
            let declaring = schema.types_with_member(element_type, leaf);
            if declaring.is_empty() {
                return Err(Error::invalid_metadata(format!(
                    "condition member `{member}` does not exist on `{element_type}` or its subtypes"
                )));
            }
            if declaring.len() >= derived.len() {
                continue; // present on the whole hierarchy
            }
            let Some(member_domain) = domain_map.domain(member) else {
                continue;
            };
            if !member_domain.possible().contains(&Constant::Undefined) {
                continue;
            }
            let is_of_declaring = type_condition(
                &root,
                declaring.iter().map(|ty| Constant::type_of(ty.as_str())),
                &type_domain,
            );
            let undefined = scalar_condition(member, [Constant::Undefined], member_domain);
            self.assert_implication(BoolExpr::make_not(is_of_declaring), undefined);
        }
        Ok(())
    }

    /// For every end: being in the role implies membership in the end's
    /// entity set with the end's type; when every other end has multiplicity
    /// exactly one, the converse holds too. An end whose key subsumes the
    /// full association-set key is equivalent to the set itself.
    fn create_association_constraints(
        &mut self,
        schema: &Schema,
        extent_name: &str,
        ends: &[crate::metadata::AssociationEnd],
    ) -> Result<(), Error> {
        let set_key: HashSet<MemberPath> =
            schema.key_members(extent_name).into_iter().collect();
        for end in ends {
            let element_type = schema.element_type(&end.entity_set).ok_or_else(|| {
                Error::invalid_metadata(format!(
                    "association end `{}.{}` references unknown entity set `{}`",
                    extent_name, end.role, end.entity_set
                ))
            })?;
            let set_hierarchy = schema.derived_types(element_type);
            let end_types = schema.derived_types(&end.entity_type);
            if end_types.is_empty() {
                return Err(Error::invalid_metadata(format!(
                    "association end `{}.{}` has unknown type `{}`",
                    extent_name, end.role, end.entity_type
                )));
            }
            let type_domain = hierarchy_domain(&set_hierarchy);
            let root = MemberPath::extent_root(&end.entity_set);

            let in_role = in_role_condition(extent_name, &end.role);
            let in_set = in_set_condition(&end.entity_set);
            let of_type = type_condition(
                &root,
                end_types.iter().map(|ty| Constant::type_of(*ty)),
                &type_domain,
            );

            self.assert_implication(
                in_role.clone(),
                BoolExpr::make_and([in_set.clone(), of_type]),
            );

            let others_are_required = ends
                .iter()
                .filter(|other| other.role != end.role)
                .all(|other| other.multiplicity == Multiplicity::One);
            if others_are_required {
                self.assert_implication(in_set, in_role.clone());
            }

            let end_key: HashSet<MemberPath> = schema
                .key_members(&end.entity_set)
                .into_iter()
                .filter_map(|path| {
                    path.leaf()
                        .map(|leaf| MemberPath::member(extent_name, &end.role).append(leaf))
                })
                .collect();
            if !set_key.is_empty() && set_key.iter().all(|path| end_key.contains(path)) {
                self.assert_equivalence(in_role, in_set_condition(extent_name));
            }
        }
        Ok(())
    }

    /// Referential constraints whose dependent properties cover the
    /// dependent type's full key collapse partitions: the dependent role is
    /// equivalent to the association set, and with a principal multiplicity
    /// of exactly one the two entity sets are equivalent as well.
    fn create_referential_constraints(
        &mut self,
        schema: &Schema,
        extent_name: &str,
        ends: &[crate::metadata::AssociationEnd],
        constraints: &[crate::metadata::ReferentialConstraint],
    ) -> Result<(), Error> {
        for constraint in constraints {
            let dependent = ends
                .iter()
                .find(|end| end.role == constraint.dependent_role)
                .ok_or_else(|| {
                    Error::invalid_metadata(format!(
                        "referential constraint on `{extent_name}` names unknown dependent role `{}`",
                        constraint.dependent_role
                    ))
                })?;
            let principal = ends
                .iter()
                .find(|end| end.role == constraint.principal_role)
                .ok_or_else(|| {
                    Error::invalid_metadata(format!(
                        "referential constraint on `{extent_name}` names unknown principal role `{}`",
                        constraint.principal_role
                    ))
                })?;

            let mut dependent_key: Vec<String> = schema
                .key_members(&dependent.entity_set)
                .into_iter()
                .filter_map(|path| path.leaf().map(str::to_owned))
                .collect();
            dependent_key.sort();
            let mut constrained: Vec<String> = constraint.dependent_properties.clone();
            constrained.sort();

            if dependent_key.is_empty() || dependent_key != constrained {
                continue;
            }

            // the dependent end's key subsumes the association key
            self.assert_equivalence(
                in_role_condition(extent_name, &dependent.role),
                in_set_condition(extent_name),
            );
            if principal.multiplicity == Multiplicity::One {
                self.assert_equivalence(
                    in_set_condition(&dependent.entity_set),
                    in_set_condition(&principal.entity_set),
                );
            }
        }
        Ok(())
    }
}

fn hierarchy_domain(types: &[&str]) -> Domain {
    Domain::closed(types.iter().map(|ty| Constant::type_of(*ty)))
}

/// The terms an expression forces to hold: literals reachable through
/// conjunctions only.
fn conjunctive_terms(expr: &BoolExpression) -> Vec<&DomainConstraint<BoolLiteral>> {
    let mut found = Vec::new();
    let mut stack = vec![expr.as_ref()];
    while let Some(node) = stack.pop() {
        match node {
            BoolExpr::Term(term) => found.push(term),
            BoolExpr::And(children) => {
                stack.extend(children.iter().map(|child| child.as_ref()));
            }
            _ => {}
        }
    }
    found
}
