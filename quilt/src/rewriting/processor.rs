//! This module defines the processors of the tile algebra: the
//! [TileProcessor] trait, the knowledge-base-backed
//! [FragmentQueryProcessor], and the statistics-counting
//! [RewritingProcessor] that drives the rewriting search.

use std::fmt::{self, Display};
use std::sync::Arc;

use crate::boolean::{BoolExpr, BoolLiteral};
use crate::metadata::MemberPath;

use super::fragment_query::FragmentQuery;
use super::knowledge_base::FragmentQueryKB;
use super::pass::RewritingPass;
use super::tile::{Tile, TileOpKind};

/// Set operations lifted onto queries.
pub trait TileProcessor {
    /// The query representation operated on.
    type Query;

    /// Set union; the result only exposes attributes both sides agree on.
    fn union(&self, a: &Self::Query, b: &Self::Query) -> Self::Query;
    /// Join (intersection).
    fn join(&self, a: &Self::Query, b: &Self::Query) -> Self::Query;
    /// Anti-semi-join (difference); attributes come from the left side.
    fn difference(&self, a: &Self::Query, b: &Self::Query) -> Self::Query;
    /// Whether the query denotes the empty row-set.
    fn is_empty(&self, query: &Self::Query) -> bool;
}

/// The fragment-query implementation of the tile algebra, backed by a
/// [FragmentQueryKB] for all satisfiability questions.
#[derive(Debug)]
pub struct FragmentQueryProcessor {
    kb: FragmentQueryKB,
}

impl FragmentQueryProcessor {
    /// Create a processor over the given knowledge base.
    pub fn new(kb: FragmentQueryKB) -> Self {
        Self { kb }
    }

    /// The underlying knowledge base.
    pub fn kb(&self) -> &FragmentQueryKB {
        &self.kb
    }

    /// Whether the query can produce any row under the knowledge base.
    pub fn is_satisfiable(&self, query: &FragmentQuery) -> bool {
        self.kb.is_satisfiable(query.condition())
    }

    /// Whether every row of `a` is a row of `b`.
    pub fn is_contained_in(&self, a: &FragmentQuery, b: &FragmentQuery) -> bool {
        !self.is_satisfiable(&self.difference(a, b))
    }

    /// Whether `a` and `b` denote the same row-set.
    pub fn is_equivalent_to(&self, a: &FragmentQuery, b: &FragmentQuery) -> bool {
        self.is_contained_in(a, b) && self.is_contained_in(b, a)
    }

    /// Whether `a` and `b` share no row.
    pub fn is_disjoint_from(&self, a: &FragmentQuery, b: &FragmentQuery) -> bool {
        !self.is_satisfiable(&self.join(a, b))
    }

    /// Materialize implicit constant columns: every condition member whose
    /// restriction is implied by the whole where-clause, and whose value is
    /// not null, is added to the projection. Returns `None` when no such
    /// member exists.
    pub fn create_derived_view_by_selecting_constant_attributes(
        &self,
        view: &FragmentQuery,
    ) -> Option<FragmentQuery> {
        let mut constant_attributes: Vec<MemberPath> = Vec::new();
        for constraint in view.condition().terms() {
            let BoolLiteral::MemberRestriction { member, .. } = constraint.variable() else {
                continue;
            };
            if view.attributes().contains(member)
                || constant_attributes.contains(member)
                || constraint.range().iter().any(|value| value.is_null())
            {
                continue;
            }
            let without = BoolExpr::make_and([
                view.condition().clone(),
                BoolExpr::make_not(BoolExpr::make_term(constraint.clone())),
            ]);
            if !self.kb.is_satisfiable(&without) {
                constant_attributes.push(member.clone());
            }
        }
        if constant_attributes.is_empty() {
            return None;
        }
        let attributes = view
            .attributes()
            .iter()
            .cloned()
            .chain(constant_attributes)
            .collect::<Vec<_>>();
        Some(FragmentQuery::new(
            view.label().map(str::to_owned),
            attributes,
            view.condition().clone(),
        ))
    }
}

impl TileProcessor for FragmentQueryProcessor {
    type Query = FragmentQuery;

    fn union(&self, a: &FragmentQuery, b: &FragmentQuery) -> FragmentQuery {
        FragmentQuery::new(
            None,
            a.attributes().intersection(b.attributes()).cloned(),
            BoolExpr::make_or([a.condition().clone(), b.condition().clone()]),
        )
    }

    fn join(&self, a: &FragmentQuery, b: &FragmentQuery) -> FragmentQuery {
        FragmentQuery::new(
            None,
            a.attributes().intersection(b.attributes()).cloned(),
            BoolExpr::make_and([a.condition().clone(), b.condition().clone()]),
        )
    }

    fn difference(&self, a: &FragmentQuery, b: &FragmentQuery) -> FragmentQuery {
        FragmentQuery::new(
            None,
            a.attributes().iter().cloned(),
            BoolExpr::make_and([
                a.condition().clone(),
                BoolExpr::make_not(b.condition().clone()),
            ]),
        )
    }

    fn is_empty(&self, query: &FragmentQuery) -> bool {
        !self.is_satisfiable(query)
    }
}

/// Operation counters of one rewriting run, reported for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RewritingStatistics {
    /// Satisfiability checks issued to the knowledge base.
    pub sat_checks: usize,
    /// Tile unions built.
    pub unions: usize,
    /// Tile joins built.
    pub intersections: usize,
    /// Tile anti-semi-joins built.
    pub differences: usize,
}

impl Display for RewritingStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} SAT checks, {} joins, {} unions, {} differences",
            self.sat_checks, self.intersections, self.unions, self.differences
        )
    }
}

/// Wraps a [FragmentQueryProcessor] with operation counting and hosts the
/// outer rewriting driver.
///
/// One instance lives for one rewriting attempt batch; statistics accumulate
/// across calls until the processor is dropped.
#[derive(Debug)]
pub struct RewritingProcessor<'a> {
    processor: &'a FragmentQueryProcessor,
    statistics: RewritingStatistics,
    permute_fraction: f64,
    min_permutations: usize,
    max_permutations: usize,
}

impl<'a> RewritingProcessor<'a> {
    /// Create a processor with the permutation search disabled.
    pub fn new(processor: &'a FragmentQueryProcessor) -> Self {
        Self {
            processor,
            statistics: RewritingStatistics::default(),
            permute_fraction: 0.0,
            min_permutations: 0,
            max_permutations: 0,
        }
    }

    /// Enable retrying with permuted view lists, keeping whichever result
    /// carries fewer tile operators. This is a pure optimization; the
    /// canonical order decides success.
    pub fn with_permutations(mut self, fraction: f64, min: usize, max: usize) -> Self {
        self.permute_fraction = fraction;
        self.min_permutations = min;
        self.max_permutations = max;
        self
    }

    /// The inner query processor.
    pub fn query_processor(&self) -> &'a FragmentQueryProcessor {
        self.processor
    }

    /// The operation counters accumulated so far.
    pub fn statistics(&self) -> RewritingStatistics {
        self.statistics
    }

    /// Tile union.
    pub fn union(&mut self, a: &Arc<Tile>, b: &Arc<Tile>) -> Arc<Tile> {
        self.statistics.unions += 1;
        let query = self.processor.union(a.query(), b.query());
        Tile::op(TileOpKind::Union, query, Arc::clone(a), Arc::clone(b))
    }

    /// Tile join; `None` on the left is the identity, so results can be
    /// accumulated incrementally.
    pub fn join(&mut self, a: Option<&Arc<Tile>>, b: &Arc<Tile>) -> Arc<Tile> {
        let Some(a) = a else {
            return Arc::clone(b);
        };
        self.statistics.intersections += 1;
        let query = self.processor.join(a.query(), b.query());
        Tile::op(TileOpKind::Join, query, Arc::clone(a), Arc::clone(b))
    }

    /// Tile anti-semi-join.
    pub fn anti_semi_join(&mut self, a: &Arc<Tile>, b: &Arc<Tile>) -> Arc<Tile> {
        self.statistics.differences += 1;
        let query = self.processor.difference(a.query(), b.query());
        Tile::op(TileOpKind::AntiSemiJoin, query, Arc::clone(a), Arc::clone(b))
    }

    /// Whether the tile denotes the empty row-set.
    pub fn is_empty(&mut self, tile: &Arc<Tile>) -> bool {
        self.statistics.sat_checks += 1;
        self.processor.is_empty(tile.query())
    }

    /// Whether every row of `a` is a row of `b`.
    pub fn is_contained_in(&mut self, a: &Arc<Tile>, b: &Arc<Tile>) -> bool {
        self.statistics.sat_checks += 1;
        self.processor.is_contained_in(a.query(), b.query())
    }

    /// Whether `a` and `b` share no row.
    pub fn is_disjoint_from(&mut self, a: &Arc<Tile>, b: &Arc<Tile>) -> bool {
        self.statistics.sat_checks += 1;
        self.processor.is_disjoint_from(a.query(), b.query())
    }

    /// Whether `a` and `b` denote the same row-set.
    pub fn is_equivalent_to(&mut self, a: &Arc<Tile>, b: &Arc<Tile>) -> bool {
        self.statistics.sat_checks += 2;
        self.processor.is_equivalent_to(a.query(), b.query())
    }

    /// Find a tile expression over `views` that exactly covers `to_fill`
    /// while staying disjoint from `to_avoid`.
    ///
    /// Runs the greedy pass once on the given order; when the permutation
    /// search is enabled, retries on rotated and reversed view lists and
    /// keeps the result with the fewest tile operators.
    pub fn rewrite_query(
        &mut self,
        to_fill: &Arc<Tile>,
        to_avoid: &Arc<Tile>,
        views: &[Arc<Tile>],
    ) -> Option<Arc<Tile>> {
        let mut best = RewritingPass::rewrite(self, to_fill, to_avoid, views)?;

        let attempts = self.permutation_attempts(views.len());
        for attempt in 0..attempts {
            let permuted = permute(views, attempt);
            if let Some(candidate) = RewritingPass::rewrite(self, to_fill, to_avoid, &permuted) {
                if candidate.operator_count() < best.operator_count() {
                    best = candidate;
                }
            }
        }
        log::debug!("rewriting statistics: {}", self.statistics);
        Some(best)
    }

    fn permutation_attempts(&self, view_count: usize) -> usize {
        if self.permute_fraction <= 0.0 || view_count < 2 {
            return 0;
        }
        let scaled = (view_count as f64 * self.permute_fraction).round() as usize;
        scaled
            .max(self.min_permutations)
            .min(self.max_permutations)
    }
}

/// Deterministic view-list permutation: first the reversed list, then
/// successive rotations.
fn permute(views: &[Arc<Tile>], attempt: usize) -> Vec<Arc<Tile>> {
    if attempt == 0 {
        return views.iter().rev().cloned().collect();
    }
    let shift = attempt % views.len();
    views[shift..]
        .iter()
        .chain(views[..shift].iter())
        .cloned()
        .collect()
}
