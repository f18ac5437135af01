//! This module defines [QueryRewriter], the driver that turns a context's
//! cell wrappers into rewriting inputs: the basic view over all fragments
//! and one cached rewriting per (condition member, domain value).

use std::collections::HashMap;
use std::sync::Arc;

use crate::boolean::BoolExpr;
use crate::metadata::{Constant, Domain, MemberPath};
use crate::rewriting::fragment_query::{scalar_condition, type_condition, FragmentQuery};
use crate::rewriting::processor::{RewritingProcessor, RewritingStatistics, TileProcessor};
use crate::rewriting::tile::{Tile, TileOpKind};

use super::context::ViewgenContext;

/// The rewriting products of one pass: every storage-side condition member
/// value expressed over the fragment views.
///
/// A missing entry means the value is unreachable through the fragments;
/// consumers treat it as the empty row-set.
#[derive(Debug)]
pub struct QueryRewriter {
    basic_view: Arc<Tile>,
    fragment_views: Vec<Arc<Tile>>,
    rewritings: HashMap<(MemberPath, Constant), Arc<Tile>>,
    statistics: RewritingStatistics,
}

impl QueryRewriter {
    /// Compute the basic view and the member-value rewritings for a context.
    pub fn new(context: &ViewgenContext<'_>) -> Self {
        let qp = context.processor();
        let fragment_views: Vec<Arc<Tile>> = context
            .wrappers()
            .iter()
            .map(|wrapper| Tile::named(wrapper.fragment_view().clone()))
            .collect();

        let mut basic_view: Option<Arc<Tile>> = None;
        for view in &fragment_views {
            basic_view = Some(match basic_view {
                None => Arc::clone(view),
                Some(acc) => Tile::op(
                    TileOpKind::Union,
                    qp.union(acc.query(), view.query()),
                    acc,
                    Arc::clone(view),
                ),
            });
        }
        let basic_view = basic_view
            .unwrap_or_else(|| Tile::named(FragmentQuery::with_condition(BoolExpr::make_false())));

        let key_attributes = context.schema().key_members(context.extent());
        let config = context.config();
        let mut rewriter = RewritingProcessor::new(qp).with_permutations(
            config.permute_fraction,
            config.min_permutations,
            config.max_permutations,
        );

        let mut rewritings = HashMap::new();
        for s_extent in context.storage_extents() {
            for column in context.s_domains().condition_members(&s_extent) {
                let Some(domain) = context.s_domains().domain(column) else {
                    continue;
                };
                for value in domain.values() {
                    let query = member_condition_query(column, value, &key_attributes, domain);
                    if !qp.is_satisfiable(&query) {
                        log::trace!("member condition {column}={value} is unsatisfiable");
                        continue;
                    }
                    let to_fill = Tile::named(query);
                    let to_avoid = Tile::named(FragmentQuery::with_condition(
                        BoolExpr::make_not(to_fill.query().condition().clone()),
                    ));
                    match rewriter.rewrite_query(&to_fill, &to_avoid, &fragment_views) {
                        Some(rewriting) => {
                            log::debug!(
                                "rewriting for {column}={value} uses {} operators",
                                rewriting.operator_count()
                            );
                            rewritings.insert((column.clone(), value.clone()), rewriting);
                        }
                        None => {
                            log::warn!(
                                "no rewriting covers {column}={value}; treating it as empty"
                            );
                        }
                    }
                }
            }
        }

        let statistics = rewriter.statistics();
        log::info!(
            "extent `{}`: {} fragment views, {} member-value rewritings, {statistics}",
            context.extent(),
            fragment_views.len(),
            rewritings.len()
        );
        Self {
            basic_view,
            fragment_views,
            rewritings,
            statistics,
        }
    }

    /// The union of all fragment views.
    pub fn basic_view(&self) -> &Arc<Tile> {
        &self.basic_view
    }

    /// The fragment views, in wrapper order.
    pub fn fragment_views(&self) -> &[Arc<Tile>] {
        &self.fragment_views
    }

    /// The cached rewriting of `member = value`, if one exists.
    pub fn rewriting(&self, member: &MemberPath, value: &Constant) -> Option<&Arc<Tile>> {
        self.rewritings.get(&(member.clone(), value.clone()))
    }

    /// Operation counts of the pass, for diagnostics.
    pub fn statistics(&self) -> RewritingStatistics {
        self.statistics
    }
}

/// The query "rows where `column` takes `value`", projected on the key.
fn member_condition_query(
    column: &MemberPath,
    value: &Constant,
    key_attributes: &[MemberPath],
    domain: &Domain,
) -> FragmentQuery {
    let condition = match value {
        Constant::TypeOf(_) => type_condition(column, [value.clone()], domain),
        _ => scalar_condition(column, [value.clone()], domain),
    };
    FragmentQuery::new(
        Some(format!("{column}={value}")),
        key_attributes.to_vec(),
        condition,
    )
}

#[cfg(test)]
mod test {
    use super::QueryRewriter;
    use crate::boolean::BoolExpr;
    use crate::mapping::cell::{Cell, CellQuery, MemberCondition, ProjectedSlot};
    use crate::mapping::context::{ViewgenConfig, ViewgenContext};
    use crate::metadata::{Constant, EntityType, Extent, Member, MemberPath, Schema};

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema.add_type(EntityType::new("Person").with_member(Member::key("Id", "Int32")));
        schema.add_type(EntityType::derived("Customer", "Person"));
        schema.add_type(
            EntityType::new("PersonRow")
                .with_member(Member::key("Id", "Int32"))
                .with_member(Member::new("Discriminator", "String", false)),
        );
        schema.add_extent(Extent::entity_set("Persons", "Person"));
        schema.add_extent(Extent::entity_set("PersonRows", "PersonRow"));
        schema
    }

    fn cell(id: usize, entity_type: &str, discriminator: &str) -> Cell {
        Cell::new(
            id,
            CellQuery::new(
                "Persons",
                vec![ProjectedSlot::Member(MemberPath::member("Persons", "Id"))],
                BoolExpr::make_term(MemberCondition::is_of_type(
                    MemberPath::extent_root("Persons"),
                    [entity_type],
                )),
            ),
            CellQuery::new(
                "PersonRows",
                vec![ProjectedSlot::Member(MemberPath::member("PersonRows", "Id"))],
                BoolExpr::make_term(MemberCondition::equals(
                    MemberPath::member("PersonRows", "Discriminator"),
                    Constant::value(discriminator),
                )),
            ),
        )
    }

    #[test]
    fn caches_a_rewriting_per_reachable_member_value() {
        let schema = schema();
        let cells = vec![cell(0, "Person", "P"), cell(1, "Customer", "C")];
        let context = ViewgenContext::new(&schema, "Persons", cells, ViewgenConfig::default())
            .expect("valid mapping");
        let rewriter = QueryRewriter::new(&context);

        let discriminator = MemberPath::member("PersonRows", "Discriminator");
        let for_p = rewriter
            .rewriting(&discriminator, &Constant::value("P"))
            .expect("P is covered by the first fragment");
        // the fragment view alone covers the value
        assert_eq!(for_p.operator_count(), 0);
        assert!(rewriter
            .rewriting(&discriminator, &Constant::value("C"))
            .is_some());

        // the leftover bucket is reachable in the universe but no fragment
        // covers it, so it has no rewriting
        let bucket = Constant::all_other([Constant::value("P"), Constant::value("C")]);
        assert!(rewriter.rewriting(&discriminator, &bucket).is_none());

        assert_eq!(rewriter.fragment_views().len(), 2);
        assert!(rewriter.statistics().sat_checks > 0);
    }
}
