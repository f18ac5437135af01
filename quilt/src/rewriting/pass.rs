//! This module implements [RewritingPass], one greedy attempt at
//! expressing a target region as a tile expression over candidate views.

use std::sync::Arc;

use super::processor::RewritingProcessor;
use super::simplifier;
use super::tile::{Tile, TileOpKind};

/// One rewriting attempt: cover `to_fill` exactly with combinations of
/// `views` while never touching `to_avoid`.
///
/// The search is greedy and deterministic in the view order. It seeds with
/// the views containing `to_fill`, trims the `to_avoid` overlap with joins
/// and anti-semi-joins, and recurses on whatever part of `to_fill` is still
/// missing. Each recursion strictly shrinks the missing region; a step that
/// makes no progress fails instead of looping.
#[derive(Debug)]
pub struct RewritingPass<'a, 'b> {
    processor: &'a mut RewritingProcessor<'b>,
    to_fill: Arc<Tile>,
    to_avoid: Arc<Tile>,
    views: Vec<Arc<Tile>>,
    used_views: Vec<(Arc<Tile>, TileOpKind)>,
}

impl<'a, 'b> RewritingPass<'a, 'b> {
    /// Run one pass. Returns `None` when no combination of the views covers
    /// `to_fill` without intersecting `to_avoid`.
    pub fn rewrite(
        processor: &'a mut RewritingProcessor<'b>,
        to_fill: &Arc<Tile>,
        to_avoid: &Arc<Tile>,
        views: &[Arc<Tile>],
    ) -> Option<Arc<Tile>> {
        let mut pass = Self {
            processor,
            to_fill: Arc::clone(to_fill),
            to_avoid: Arc::clone(to_avoid),
            views: views.to_vec(),
            used_views: Vec::new(),
        };
        pass.run()
    }

    fn run(&mut self) -> Option<Arc<Tile>> {
        let mut rewriting = self.find_seed()?;

        if !self.processor.is_disjoint_from(&rewriting, &self.to_avoid) {
            rewriting = self.trim(&rewriting)?;
        }
        rewriting = simplifier::simplify(self.processor, &rewriting);

        let missing = self.processor.anti_semi_join(&self.to_fill, &rewriting);
        if !self.processor.is_empty(&missing) {
            // a rewriting that contributed nothing would recurse on the
            // same region forever
            if self.processor.is_disjoint_from(&rewriting, &self.to_fill) {
                log::trace!("rewriting attempt made no progress, giving up");
                return None;
            }
            let remainder =
                RewritingPass::rewrite(self.processor, &missing, &self.to_avoid, &self.views)?;
            rewriting = if self.processor.is_contained_in(&rewriting, &remainder) {
                remainder
            } else if self.processor.is_contained_in(&remainder, &rewriting) {
                rewriting
            } else {
                self.processor.union(&rewriting, &remainder)
            };
            rewriting = simplifier::simplify(self.processor, &rewriting);
        }
        Some(rewriting)
    }

    /// Seed phase: join every view containing `to_fill`, then subtract the
    /// views disjoint from `to_fill` that still overlap the running result,
    /// stopping either loop early once the result is inside `to_fill`. Falls
    /// back to the first view merely overlapping `to_fill`.
    fn find_seed(&mut self) -> Option<Arc<Tile>> {
        let views = self.views.clone();
        let mut rewriting: Option<Arc<Tile>> = None;

        for view in &views {
            if self.processor.is_contained_in(&self.to_fill, view) {
                let joined = self.processor.join(rewriting.as_ref(), view);
                self.mark_used(view, TileOpKind::Join);
                let done = self.processor.is_contained_in(&joined, &self.to_fill);
                rewriting = Some(joined);
                if done {
                    break;
                }
            }
        }

        if let Some(mut result) = rewriting {
            if !self.processor.is_contained_in(&result, &self.to_fill) {
                for view in &views {
                    if self.processor.is_disjoint_from(view, &self.to_fill)
                        && !self.processor.is_disjoint_from(view, &result)
                    {
                        result = self.processor.anti_semi_join(&result, view);
                        self.mark_used(view, TileOpKind::AntiSemiJoin);
                        if self.processor.is_contained_in(&result, &self.to_fill) {
                            break;
                        }
                    }
                }
            }
            return Some(result);
        }

        for view in &views {
            if !self.processor.is_disjoint_from(view, &self.to_fill) {
                self.mark_used(view, TileOpKind::Join);
                return Some(Arc::clone(view));
            }
        }
        None
    }

    /// Trim phase: the seed overlaps `to_avoid`; try every unused view as a
    /// join, then as an anti-semi-join, accepting the first combination that
    /// empties the overlap without losing the seed's relation to `to_fill`.
    fn trim(&mut self, rewriting: &Arc<Tile>) -> Option<Arc<Tile>> {
        let views = self.views.clone();
        let covers = self.processor.is_contained_in(&self.to_fill, rewriting);

        for kind in [TileOpKind::Join, TileOpKind::AntiSemiJoin] {
            for view in &views {
                if self.is_used(view) {
                    continue;
                }
                let candidate = match kind {
                    TileOpKind::Join => self.processor.join(Some(rewriting), view),
                    TileOpKind::AntiSemiJoin => self.processor.anti_semi_join(rewriting, view),
                    TileOpKind::Union => unreachable!("trimming never widens"),
                };
                let keeps_target = if covers {
                    self.processor.is_contained_in(&self.to_fill, &candidate)
                } else {
                    !self.processor.is_disjoint_from(&candidate, &self.to_fill)
                };
                if keeps_target && self.processor.is_disjoint_from(&candidate, &self.to_avoid) {
                    self.mark_used(view, kind);
                    return Some(candidate);
                }
            }
        }
        log::trace!("no view removes the overlap with the excluded region");
        None
    }

    fn mark_used(&mut self, view: &Arc<Tile>, kind: TileOpKind) {
        self.used_views.push((Arc::clone(view), kind));
    }

    fn is_used(&self, view: &Arc<Tile>) -> bool {
        self.used_views
            .iter()
            .any(|(used, _)| Arc::ptr_eq(used, view))
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::boolean::BoolExpr;
    use crate::metadata::{Constant, Domain, MemberPath};
    use crate::rewriting::fragment_query::{scalar_condition, FragmentQuery};
    use crate::rewriting::knowledge_base::FragmentQueryKB;
    use crate::rewriting::processor::{FragmentQueryProcessor, RewritingProcessor};
    use crate::rewriting::tile::Tile;
    use test_log::test;

    fn domain() -> Domain {
        Domain::closed(["P", "Q", "R", "S"].into_iter().map(Constant::value))
    }

    fn view(label: &str, values: &[&str]) -> Arc<Tile> {
        let member = MemberPath::member("T", "Kind");
        Tile::named(FragmentQuery::new(
            Some(label.to_owned()),
            [member.clone(), MemberPath::member("T", "Id")],
            scalar_condition(
                &member,
                values.iter().map(|value| Constant::value(*value)),
                &domain(),
            ),
        ))
    }

    fn check(
        processor: &FragmentQueryProcessor,
        result: &Arc<Tile>,
        to_fill: &Arc<Tile>,
        to_avoid: &Arc<Tile>,
    ) {
        assert!(processor.is_equivalent_to(result.query(), to_fill.query()));
        assert!(processor.is_disjoint_from(result.query(), to_avoid.query()));
    }

    #[test]
    fn rewrites_with_intersection_of_containing_views() {
        let qp = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let mut rewriter = RewritingProcessor::new(&qp);

        let to_fill = view("fill", &["P"]);
        let to_avoid = view("avoid", &["Q", "R", "S"]);
        let views = [view("v1", &["P", "Q"]), view("v2", &["P", "R"])];

        let result = rewriter
            .rewrite_query(&to_fill, &to_avoid, &views)
            .expect("the intersection of v1 and v2 is exactly the target");
        check(&qp, &result, &to_fill, &to_avoid);
    }

    #[test]
    fn rewrites_by_subtracting_a_disjoint_view() {
        let qp = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let mut rewriter = RewritingProcessor::new(&qp);

        let to_fill = view("fill", &["P", "Q"]);
        let to_avoid = view("avoid", &["R", "S"]);
        let views = [view("v1", &["P", "Q", "R"]), view("v2", &["R"])];

        let result = rewriter
            .rewrite_query(&to_fill, &to_avoid, &views)
            .expect("v1 minus v2 is exactly the target");
        check(&qp, &result, &to_fill, &to_avoid);
    }

    #[test]
    fn rewrites_a_union_through_gap_recursion() {
        let qp = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let mut rewriter = RewritingProcessor::new(&qp);

        let to_fill = view("fill", &["P", "Q"]);
        let to_avoid = view("avoid", &["R", "S"]);
        let views = [view("v1", &["P"]), view("v2", &["Q"])];

        let result = rewriter
            .rewrite_query(&to_fill, &to_avoid, &views)
            .expect("the union of v1 and v2 is exactly the target");
        check(&qp, &result, &to_fill, &to_avoid);
        let statistics = rewriter.statistics();
        assert!(statistics.unions >= 1);
    }

    #[test]
    fn exact_view_yields_a_single_leaf() {
        let qp = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let mut rewriter = RewritingProcessor::new(&qp);

        let to_fill = view("fill", &["P", "Q"]);
        let to_avoid = view("avoid", &["R", "S"]);
        let views = [view("exact", &["P", "Q"]), view("other", &["R"])];

        let result = rewriter
            .rewrite_query(&to_fill, &to_avoid, &views)
            .expect("the first view equals the target");
        assert_eq!(result.operator_count(), 0);
        assert!(Arc::ptr_eq(&result, &views[0]));
    }

    #[test]
    fn disjoint_partitions_rewrite_to_their_own_view() {
        // two subtypes split over two tables by a discriminator: rewriting
        // the first partition uses exactly the first table view, with no
        // subtraction needed
        let qp = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let mut rewriter = RewritingProcessor::new(&qp);

        let member = MemberPath::member("Table", "Discriminator");
        let domain = Domain::closed(["A", "B"].into_iter().map(Constant::value));
        let partition = |label: &str, value: &str| {
            Tile::named(FragmentQuery::new(
                Some(label.to_owned()),
                [member.clone(), MemberPath::member("Table", "Id")],
                scalar_condition(&member, [Constant::value(value)], &domain),
            ))
        };

        let to_fill = partition("EntityOfTypeA", "A");
        let to_avoid = partition("EntityOfTypeB", "B");
        let views = [partition("TableWhereA", "A"), partition("TableWhereB", "B")];

        let result = rewriter
            .rewrite_query(&to_fill, &to_avoid, &views)
            .expect("the first table view covers the partition");
        assert_eq!(result.operator_count(), 0);
        assert!(Arc::ptr_eq(&result, &views[0]));
    }

    #[test]
    fn fails_when_the_target_is_not_coverable() {
        let qp = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let mut rewriter = RewritingProcessor::new(&qp);

        // the only overlapping view drags in a row of the excluded region
        // and no other view can carve it back out
        let to_fill = view("fill", &["P"]);
        let to_avoid = view("avoid", &["Q", "R", "S"]);
        let views = [view("v1", &["P", "Q"])];

        assert!(rewriter.rewrite_query(&to_fill, &to_avoid, &views).is_none());
    }

    #[test]
    fn fails_when_no_view_overlaps_the_target() {
        let qp = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let mut rewriter = RewritingProcessor::new(&qp);

        let to_fill = view("fill", &["P"]);
        let to_avoid = view("avoid", &["Q", "R", "S"]);
        let views = [view("v1", &["Q"]), view("v2", &["R", "S"])];

        assert!(rewriter.rewrite_query(&to_fill, &to_avoid, &views).is_none());
    }

    #[test]
    fn permutations_never_change_success() {
        let qp = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let mut rewriter = RewritingProcessor::new(&qp).with_permutations(1.0, 1, 4);

        let to_fill = view("fill", &["P", "Q"]);
        let to_avoid = view("avoid", &["R", "S"]);
        let views = [
            view("v1", &["P"]),
            view("v2", &["Q"]),
            view("v3", &["P", "Q", "R"]),
            view("v4", &["R"]),
        ];

        let result = rewriter
            .rewrite_query(&to_fill, &to_avoid, &views)
            .expect("coverable regardless of view order");
        check(&qp, &result, &to_fill, &to_avoid);
    }

    #[test]
    fn condition_only_views_are_supported() {
        // views over a bare condition without projected attributes
        let qp = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let mut rewriter = RewritingProcessor::new(&qp);

        let member = MemberPath::member("T", "Kind");
        let query = |values: &[&str]| {
            FragmentQuery::with_condition(scalar_condition(
                &member,
                values.iter().map(|value| Constant::value(*value)),
                &domain(),
            ))
        };
        let to_fill = Tile::named(query(&["P"]));
        let to_avoid = Tile::named(FragmentQuery::with_condition(BoolExpr::make_not(
            query(&["P"]).condition().clone(),
        )));
        let views = [Tile::named(query(&["P", "Q"])), Tile::named(query(&["P", "R"]))];

        let result = rewriter
            .rewrite_query(&to_fill, &to_avoid, &views)
            .expect("the joint intersection pins the value");
        check(&qp, &result, &to_fill, &to_avoid);
    }
}
