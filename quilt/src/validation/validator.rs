//! This module implements [RewritingValidator], the per-cell mapping checks:
//! partition constraints, domain constraints on projected condition members,
//! and non-nullability constraints.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::boolean::BoolExpr;
use crate::error::{Error, ErrorLog, Record, ViewGenErrorKind};
use crate::mapping::{CellWrapper, QueryRewriter, ViewgenContext};
use crate::metadata::{Constant, MemberPath};
use crate::rewriting::fragment_query::{scalar_condition, BoolExpression, FragmentQuery};
use crate::rewriting::processor::TileProcessor;
use crate::rewriting::tile::{Tile, TileOpKind};

use super::error_pattern::ErrorPatternMatcher;

/// Checks every cell wrapper of an extent against the mapping rules.
///
/// Violations accumulate in one [ErrorLog]; a wrapper's first failing check
/// skips its remaining checks so one root cause does not cascade into a
/// pile of diagnostics. A non-empty log becomes a single
/// [Error::MappingFailure] once all wrappers have been scanned.
#[derive(Debug)]
pub struct RewritingValidator<'a> {
    context: &'a ViewgenContext<'a>,
    rewriter: &'a QueryRewriter,
    matcher: &'a dyn ErrorPatternMatcher,
    error_log: ErrorLog,
}

type MemberValueTiles = HashMap<(MemberPath, Constant), Arc<Tile>>;

impl<'a> RewritingValidator<'a> {
    /// Create a validator over a context and its computed rewritings.
    pub fn new(
        context: &'a ViewgenContext<'a>,
        rewriter: &'a QueryRewriter,
        matcher: &'a dyn ErrorPatternMatcher,
    ) -> Self {
        Self {
            context,
            rewriter,
            matcher,
            error_log: ErrorLog::new(),
        }
    }

    /// Run all checks; returns the aggregated mapping failure if any check
    /// did not hold.
    pub fn validate(mut self) -> Result<(), Error> {
        // plain: per-value rewritings as cached
        let plain_tiles = self.member_value_tiles(false);
        // complement: the last domain value as "everything else", the way
        // the final branch of a generated case statement behaves
        let complement_tiles = self.member_value_tiles(true);
        let basic_view = Arc::clone(self.rewriter.basic_view());

        for wrapper in self.context.wrappers() {
            let s_clause = wrapper.fragment_view().condition().clone();

            let complement_s_tile = match self.where_clause_to_tile(&s_clause, &complement_tiles)?
            {
                Some(tile) => tile,
                None => {
                    log::warn!(
                        "storage condition of {} has an empty rewriting",
                        wrapper.fragment_view()
                    );
                    continue;
                }
            };
            let s_query_tile = if Arc::ptr_eq(&complement_s_tile, &basic_view) {
                Arc::clone(&basic_view)
            } else {
                self.join_tile(&complement_s_tile, &basic_view)
            };

            let in_extent_condition = wrapper.create_role_boolean();

            let s_query_c_side = self.c_side_query(&s_query_tile);
            if let Some(unsatisfied) = self.check_equivalence(
                wrapper.c_view(),
                &s_query_c_side,
                &in_extent_condition,
            ) {
                let message = format!(
                    "partition constraint violated for `{}`: the conceptual and storage \
                     queries of cell {} map different row-sets; rows satisfying {} are \
                     covered on one side only",
                    self.context.extent(),
                    wrapper.cell().id(),
                    unsatisfied
                );
                let mut affected = self.leaf_cell_ids(&s_query_tile);
                affected.push(wrapper.cell().id());
                self.report_constraint_violation(
                    ViewGenErrorKind::PartitionConstraintViolation,
                    message,
                    affected,
                );
            }

            if let Some(plain_s_tile) = self.where_clause_to_tile(&s_clause, &plain_tiles)? {
                self.check_overlapping_partitions(&plain_s_tile, wrapper);
                if !self.error_log.is_empty() {
                    continue;
                }
                self.check_projected_condition_members(
                    &plain_tiles,
                    wrapper,
                    &s_query_tile,
                    &in_extent_condition,
                );
                if !self.error_log.is_empty() {
                    continue;
                }
            }
            self.check_non_nullable_members(wrapper);
        }

        if self.error_log.is_empty() {
            log::info!("extent `{}` validated cleanly", self.context.extent());
            Ok(())
        } else {
            log::info!(
                "extent `{}` failed validation with {} diagnostics",
                self.context.extent(),
                self.error_log.len()
            );
            Err(Error::MappingFailure(self.error_log))
        }
    }

    /// One tile per (condition member, domain value), from the cached
    /// rewritings. With `complement_else`, the last value of each domain is
    /// instead "the basic view minus all earlier values".
    fn member_value_tiles(&self, complement_else: bool) -> MemberValueTiles {
        let mut tiles = MemberValueTiles::new();
        for s_extent in self.context.storage_extents() {
            for column in self.context.s_domains().condition_members(&s_extent) {
                let Some(domain) = self.context.s_domains().domain(column) else {
                    continue;
                };
                let values: Vec<&Constant> = domain.values().collect();
                let mut cover: Option<Arc<Tile>> = None;
                for (index, value) in values.iter().enumerate() {
                    let Some(rewriting) = self.rewriter.rewriting(column, value) else {
                        continue;
                    };
                    tiles.insert((column.clone(), (*value).clone()), Arc::clone(rewriting));
                    if index + 1 < values.len() {
                        cover = Some(match cover {
                            None => Arc::clone(rewriting),
                            Some(acc) => self.union_tile(&acc, rewriting),
                        });
                    }
                }
                if complement_else && values.len() > 1 {
                    if let Some(last) = values.last() {
                        let complement = match cover {
                            Some(cover) => {
                                self.anti_semi_join_tile(self.rewriter.basic_view(), &cover)
                            }
                            None => Arc::clone(self.rewriter.basic_view()),
                        };
                        tiles.insert((column.clone(), (*last).clone()), complement);
                    }
                }
            }
        }
        tiles
    }

    /// Turn a storage-side where-clause into a tile over the member-value
    /// tiles. `None` means the clause has an empty rewriting; conditions
    /// outside the conjunctive fragment the mapping language allows are an
    /// error.
    fn where_clause_to_tile(
        &self,
        clause: &BoolExpression,
        tiles: &MemberValueTiles,
    ) -> Result<Option<Arc<Tile>>, Error> {
        let basic_view = self.rewriter.basic_view();
        match &**clause {
            BoolExpr::True => Ok(Some(Arc::clone(basic_view))),
            BoolExpr::And(children) => {
                let mut combined: Option<Arc<Tile>> = None;
                for child in children {
                    match self.where_clause_to_tile(child, tiles)? {
                        None => return Ok(None),
                        Some(tile) if Arc::ptr_eq(&tile, basic_view) => {}
                        Some(tile) => {
                            combined = Some(match combined {
                                None => tile,
                                Some(acc) => self.join_tile(&acc, &tile),
                            });
                        }
                    }
                }
                Ok(Some(combined.unwrap_or_else(|| Arc::clone(basic_view))))
            }
            BoolExpr::Term(constraint) => {
                let Some(member) = constraint.variable().member() else {
                    return Err(Error::UnsupportedCondition(format!(
                        "role condition `{constraint}` cannot appear in a fragment where-clause"
                    )));
                };
                let mut union: Option<Arc<Tile>> = None;
                for value in constraint.range() {
                    if let Some(tile) = tiles.get(&(member.clone(), value.clone())) {
                        union = Some(match union {
                            None => Arc::clone(tile),
                            Some(acc) => self.union_tile(&acc, tile),
                        });
                    }
                    // no rewriting for this member value: it is empty
                }
                Ok(union)
            }
            BoolExpr::False | BoolExpr::Not(_) | BoolExpr::Or(_) => {
                Err(Error::UnsupportedCondition(format!(
                    "fragment where-clauses are conjunctions of member conditions, got `{clause}`"
                )))
            }
        }
    }

    /// A tile evaluated on the conceptual side: every leaf that names a
    /// cell wrapper stands for the wrapper's conceptual view, and the
    /// operators combine those views. The structure is shared with the
    /// storage-side evaluation; only which side of each cell the leaves
    /// denote differs.
    fn c_side_query(&self, tile: &Arc<Tile>) -> FragmentQuery {
        match &**tile {
            Tile::Named { query } => query
                .label()
                .and_then(|label| self.context.wrapper_by_label(label))
                .map(|wrapper| wrapper.c_view().clone())
                .unwrap_or_else(|| query.clone()),
            Tile::Op {
                kind, left, right, ..
            } => {
                let left = self.c_side_query(left);
                let right = self.c_side_query(right);
                let qp = self.context.processor();
                match kind {
                    TileOpKind::Union => qp.union(&left, &right),
                    TileOpKind::Join => qp.join(&left, &right),
                    TileOpKind::AntiSemiJoin => qp.difference(&left, &right),
                }
            }
        }
    }

    /// Two-directional containment of conceptual-side queries under the
    /// in-extent condition. Returns the condition of an unsatisfied
    /// direction, `None` when equivalent.
    fn check_equivalence(
        &self,
        c_query: &FragmentQuery,
        s_query: &FragmentQuery,
        in_extent_condition: &BoolExpression,
    ) -> Option<BoolExpression> {
        let qp = self.context.processor();
        let c_minus_s = BoolExpr::make_and([
            qp.difference(c_query, s_query).condition().clone(),
            in_extent_condition.clone(),
        ]);
        let s_minus_c = BoolExpr::make_and([
            qp.difference(s_query, c_query).condition().clone(),
            in_extent_condition.clone(),
        ]);

        let mut unsatisfied = None;
        if qp.kb().is_satisfiable(&c_minus_s) {
            unsatisfied = Some(c_minus_s);
        }
        if qp.kb().is_satisfiable(&s_minus_c) {
            unsatisfied = Some(s_minus_c);
        }
        unsatisfied
    }

    fn report_constraint_violation(
        &mut self,
        kind: ViewGenErrorKind,
        message: String,
        affected_cells: Vec<usize>,
    ) {
        if self.matcher.find_mapping_errors(self.context, &mut self.error_log) {
            return;
        }
        self.error_log.add_entry(Record::new(kind, message, affected_cells));
    }

    /// Fragments that overlap must project every shared non-key column from
    /// the same conceptual member; otherwise the overlap silently picks one
    /// of two different values.
    fn check_overlapping_partitions(&mut self, tile: &Arc<Tile>, wrapper: &CellWrapper) {
        let mut overlapping: Vec<&CellWrapper> = Vec::new();
        for query in positive_leaves(tile) {
            let Some(other) = query
                .label()
                .and_then(|label| self.context.wrapper_by_label(label))
            else {
                continue;
            };
            if other.cell().id() != wrapper.cell().id()
                && !overlapping
                    .iter()
                    .any(|known| known.cell().id() == other.cell().id())
            {
                overlapping.push(other);
            }
        }

        let key_columns: BTreeSet<MemberPath> = self
            .context
            .storage_extents()
            .iter()
            .flat_map(|extent| self.context.schema().key_members(extent))
            .collect();

        let mut records = Vec::new();
        for other in overlapping {
            let mut colliding: Vec<&MemberPath> = Vec::new();
            for column in wrapper.cell().s_query().projected_members() {
                if key_columns.contains(column) {
                    continue;
                }
                let this_slot = wrapper.c_side_slot_for_s_member(column);
                let that_slot = other.c_side_slot_for_s_member(column);
                if let (Some(this_member), Some(that_member)) = (this_slot, that_slot) {
                    if this_member != that_member {
                        colliding.push(column);
                    }
                }
            }
            if !colliding.is_empty() {
                let columns = colliding
                    .iter()
                    .map(|column| column.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                records.push(Record::new(
                    ViewGenErrorKind::NonKeyProjectedWithOverlappingPartitions,
                    format!(
                        "non-key columns {columns} are projected from different conceptual \
                         members by overlapping fragments {} and {}",
                        wrapper.cell().id(),
                        other.cell().id()
                    ),
                    [wrapper.cell().id(), other.cell().id()],
                ));
            }
        }
        for record in records {
            self.error_log.add_entry(record);
        }
    }

    /// For every storage condition column that is also projected on the
    /// conceptual side, re-check equivalence with the column's value fixed
    /// on both sides. A discriminator exposed as a regular property must
    /// carry the same information through both queries.
    fn check_projected_condition_members(
        &mut self,
        plain_tiles: &MemberValueTiles,
        wrapper: &CellWrapper,
        s_query_tile: &Arc<Tile>,
        in_extent_condition: &BoolExpression,
    ) {
        let basic_view = Arc::clone(self.rewriter.basic_view());
        for s_extent in self.context.storage_extents() {
            let columns: Vec<MemberPath> = self
                .context
                .s_domains()
                .condition_members(&s_extent)
                .cloned()
                .collect();
            for column in columns {
                let Some(c_member) = wrapper.c_side_slot_for_s_member(&column).cloned() else {
                    continue;
                };
                let Some(domain) = self.context.s_domains().domain(&column) else {
                    continue;
                };
                let values: Vec<Constant> = domain.values().cloned().collect();
                for value in values {
                    let Some(tile_for_value) = plain_tiles.get(&(column.clone(), value.clone()))
                    else {
                        continue;
                    };
                    let c_condition =
                        self.propagate_cell_constant(wrapper, &value, &c_member);
                    let c_query = FragmentQuery::with_condition(c_condition);
                    let s_combined = if Arc::ptr_eq(s_query_tile, &basic_view) {
                        Arc::clone(tile_for_value)
                    } else {
                        self.join_tile(tile_for_value, s_query_tile)
                    };
                    let s_combined_c_side = self.c_side_query(&s_combined);
                    if let Some(unsatisfied) = self.check_equivalence(
                        &c_query,
                        &s_combined_c_side,
                        in_extent_condition,
                    ) {
                        let message = format!(
                            "domain constraint violated for `{c_member}`: fixing \
                             {column} = {value} distinguishes the two sides of cell {}; \
                             rows satisfying {} are covered on one side only",
                            wrapper.cell().id(),
                            unsatisfied
                        );
                        let mut affected = self.leaf_cell_ids(&s_combined);
                        affected.push(wrapper.cell().id());
                        self.report_constraint_violation(
                            ViewGenErrorKind::DomainConstraintViolation,
                            message,
                            affected,
                        );
                    }
                }
            }
        }
    }

    /// The wrapper's conceptual condition with `c_member` pinned to the
    /// conceptual-side image of a storage constant: the constant itself, or
    /// the domain complement for a negated set.
    fn propagate_cell_constant(
        &self,
        wrapper: &CellWrapper,
        value: &Constant,
        c_member: &MemberPath,
    ) -> BoolExpression {
        let expression = wrapper.c_view().condition().clone();
        let Some(c_domain) = self.context.c_domains().domain(c_member) else {
            return expression;
        };
        let allowed: BTreeSet<Constant> = match value {
            Constant::AllOther(excluded) => c_domain
                .possible()
                .iter()
                .filter(|candidate| !excluded.contains(candidate))
                .cloned()
                .collect(),
            other => BTreeSet::from([other.clone()]),
        };
        BoolExpr::make_and([
            expression,
            scalar_condition(c_member, allowed, c_domain),
        ])
    }

    /// Non-nullable storage columns must not be fed from a conceptual
    /// member that can be `NULL` under the fragment's condition.
    fn check_non_nullable_members(&mut self, wrapper: &CellWrapper) {
        let s_extent = wrapper.cell().s_query().extent().to_owned();
        let columns: Vec<MemberPath> = self
            .context
            .s_domains()
            .non_condition_members(&s_extent)
            .cloned()
            .collect();
        for column in columns {
            let Some(resolved) = self.context.schema().resolve(&column) else {
                continue;
            };
            if resolved.is_nullable {
                continue;
            }
            let Some(c_member) = wrapper.c_side_slot_for_s_member(&column) else {
                continue;
            };
            let nullable_c_side = self
                .context
                .schema()
                .resolve(c_member)
                .map(|member| member.is_nullable)
                .unwrap_or(true);
            if !nullable_c_side {
                continue;
            }
            let Some(c_domain) = self.context.c_domains().domain(c_member) else {
                continue;
            };
            if !c_domain.possible().contains(&Constant::Null) {
                continue;
            }
            let null_condition = BoolExpr::make_and([
                wrapper.c_view().condition().clone(),
                scalar_condition(c_member, [Constant::Null], c_domain),
            ]);
            if self.context.processor().kb().is_satisfiable(&null_condition) {
                self.error_log.add_entry(Record::new(
                    ViewGenErrorKind::NullableMappingForNonNullableColumn,
                    format!(
                        "non-nullable column `{column}` is mapped from `{c_member}`, \
                         which can be NULL under the condition of cell {}",
                        wrapper.cell().id()
                    ),
                    [wrapper.cell().id()],
                ));
            }
        }
    }

    fn join_tile(&self, left: &Arc<Tile>, right: &Arc<Tile>) -> Arc<Tile> {
        let qp = self.context.processor();
        Tile::op(
            TileOpKind::Join,
            qp.join(left.query(), right.query()),
            Arc::clone(left),
            Arc::clone(right),
        )
    }

    fn union_tile(&self, left: &Arc<Tile>, right: &Arc<Tile>) -> Arc<Tile> {
        let qp = self.context.processor();
        Tile::op(
            TileOpKind::Union,
            qp.union(left.query(), right.query()),
            Arc::clone(left),
            Arc::clone(right),
        )
    }

    fn anti_semi_join_tile(&self, left: &Arc<Tile>, right: &Arc<Tile>) -> Arc<Tile> {
        let qp = self.context.processor();
        Tile::op(
            TileOpKind::AntiSemiJoin,
            qp.difference(left.query(), right.query()),
            Arc::clone(left),
            Arc::clone(right),
        )
    }

    /// The cell ids behind a tile's leaves, for diagnostics.
    fn leaf_cell_ids(&self, tile: &Arc<Tile>) -> Vec<usize> {
        tile.named_queries()
            .iter()
            .filter_map(|query| query.label())
            .filter_map(|label| self.context.wrapper_by_label(label))
            .map(|wrapper| wrapper.cell().id())
            .collect()
    }
}

/// The leaf queries reachable without passing through the negated side of
/// an anti-semi-join.
fn positive_leaves(tile: &Arc<Tile>) -> Vec<FragmentQuery> {
    let mut queries = Vec::new();
    collect_positive(tile, &mut queries);
    queries
}

fn collect_positive(tile: &Arc<Tile>, queries: &mut Vec<FragmentQuery>) {
    match &**tile {
        Tile::Named { query } => queries.push(query.clone()),
        Tile::Op {
            kind: TileOpKind::AntiSemiJoin,
            left,
            ..
        } => collect_positive(left, queries),
        Tile::Op { left, right, .. } => {
            collect_positive(left, queries);
            collect_positive(right, queries);
        }
    }
}
