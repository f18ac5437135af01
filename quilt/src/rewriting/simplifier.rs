//! This module implements the best-effort cleanup of rewritings: operands
//! that do not change the denoted row-set are dropped to keep the generated
//! view expressions small. Correctness never depends on this pass.

use std::sync::Arc;

use super::processor::RewritingProcessor;
use super::tile::{Tile, TileOpKind};

/// Repeatedly drop redundant operands until no equivalence-preserving
/// removal remains.
pub fn simplify(processor: &mut RewritingProcessor<'_>, tile: &Arc<Tile>) -> Arc<Tile> {
    let mut current = Arc::clone(tile);
    while let Some(smaller) = remove_one(processor, &current) {
        current = smaller;
    }
    if current.operator_count() < tile.operator_count() {
        log::trace!(
            "simplified rewriting from {} to {} operators",
            tile.operator_count(),
            current.operator_count()
        );
    }
    current
}

/// Find one operator node whose result equals one of its operands and
/// splice that operand in. Anti-semi-joins only ever drop the subtrahend.
fn remove_one(processor: &mut RewritingProcessor<'_>, root: &Arc<Tile>) -> Option<Arc<Tile>> {
    for node in operator_nodes(root) {
        let Tile::Op {
            kind, left, right, ..
        } = &*node
        else {
            continue;
        };
        let mut survivors = vec![Arc::clone(left)];
        if *kind != TileOpKind::AntiSemiJoin {
            survivors.push(Arc::clone(right));
        }
        for survivor in survivors {
            let candidate = root.replace(&node, &survivor, processor.query_processor());
            if candidate.operator_count() < root.operator_count()
                && processor.is_equivalent_to(&candidate, root)
            {
                return Some(candidate);
            }
        }
    }
    None
}

fn operator_nodes(root: &Arc<Tile>) -> Vec<Arc<Tile>> {
    let mut nodes = Vec::new();
    collect_operators(root, &mut nodes);
    nodes
}

fn collect_operators(tile: &Arc<Tile>, nodes: &mut Vec<Arc<Tile>>) {
    if let Tile::Op { left, right, .. } = &**tile {
        nodes.push(Arc::clone(tile));
        collect_operators(left, nodes);
        collect_operators(right, nodes);
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::simplify;
    use crate::metadata::{Constant, Domain, MemberPath};
    use crate::rewriting::fragment_query::{scalar_condition, FragmentQuery};
    use crate::rewriting::knowledge_base::FragmentQueryKB;
    use crate::rewriting::processor::{
        FragmentQueryProcessor, RewritingProcessor, TileProcessor,
    };
    use crate::rewriting::tile::{Tile, TileOpKind};

    fn view(label: &str, values: &[&str]) -> Arc<Tile> {
        let member = MemberPath::member("T", "Kind");
        let domain = Domain::closed(["P", "Q", "R"].into_iter().map(Constant::value));
        Tile::named(FragmentQuery::new(
            Some(label.to_owned()),
            [member.clone()],
            scalar_condition(
                &member,
                values.iter().map(|value| Constant::value(*value)),
                &domain,
            ),
        ))
    }

    #[test]
    fn drops_a_redundant_join_operand() {
        let qp = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let a = view("a", &["P"]);
        let wider = view("wider", &["P", "Q"]);
        // a ⊆ wider, so the join adds nothing
        let joined = Tile::op(
            TileOpKind::Join,
            qp.join(a.query(), wider.query()),
            a.clone(),
            wider,
        );

        let mut rewriter = RewritingProcessor::new(&qp);
        let simplified = simplify(&mut rewriter, &joined);
        assert_eq!(simplified.operator_count(), 0);
        assert!(qp.is_equivalent_to(simplified.query(), joined.query()));
    }

    #[test]
    fn drops_an_irrelevant_subtrahend() {
        let qp = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let a = view("a", &["P"]);
        let unrelated = view("unrelated", &["R"]);
        let difference = Tile::op(
            TileOpKind::AntiSemiJoin,
            qp.difference(a.query(), unrelated.query()),
            a.clone(),
            unrelated,
        );

        let mut rewriter = RewritingProcessor::new(&qp);
        let simplified = simplify(&mut rewriter, &difference);
        assert!(Arc::ptr_eq(&simplified, &a));
    }

    #[test]
    fn keeps_meaningful_operands() {
        let qp = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let a = view("a", &["P", "Q"]);
        let b = view("b", &["Q", "R"]);
        let joined = Tile::op(
            TileOpKind::Join,
            qp.join(a.query(), b.query()),
            a,
            b,
        );

        let mut rewriter = RewritingProcessor::new(&qp);
        let simplified = simplify(&mut rewriter, &joined);
        assert!(Arc::ptr_eq(&simplified, &joined));
    }
}
