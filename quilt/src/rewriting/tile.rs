//! This module defines [Tile], the binary operator tree over fragment
//! queries that rewritings are expressed in.

use std::fmt::{self, Display};
use std::sync::Arc;

use super::fragment_query::FragmentQuery;
use super::processor::{FragmentQueryProcessor, TileProcessor};

/// The combinator that produced an internal tile node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOpKind {
    /// Set union.
    Union,
    /// Join (set intersection at the row level).
    Join,
    /// Anti-semi-join (set difference).
    AntiSemiJoin,
}

impl Display for TileOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Union => write!(f, "Union"),
            Self::Join => write!(f, "Join"),
            Self::AntiSemiJoin => write!(f, "AntiSemiJoin"),
        }
    }
}

/// A named fragment query, or a combinator over two sub-tiles.
///
/// Invariant: the `query` of an internal node is the one produced by
/// applying its `kind` to the children's queries. Tiles are shared through
/// [Arc]; [Tile::replace] rebuilds only the spine above a replaced subtree.
#[derive(Debug, Clone)]
pub enum Tile {
    /// A leaf holding one view.
    Named {
        /// The view's fragment query.
        query: FragmentQuery,
    },
    /// A combinator node.
    Op {
        /// The combinator that produced this node.
        kind: TileOpKind,
        /// The combined query of the subtree.
        query: FragmentQuery,
        /// Left operand.
        left: Arc<Tile>,
        /// Right operand.
        right: Arc<Tile>,
    },
}

impl Tile {
    /// Create a leaf tile.
    pub fn named(query: FragmentQuery) -> Arc<Self> {
        Arc::new(Self::Named { query })
    }

    /// Create an operator tile; `query` must be the combination of the
    /// children's queries under `kind`.
    pub fn op(kind: TileOpKind, query: FragmentQuery, left: Arc<Tile>, right: Arc<Tile>) -> Arc<Self> {
        Arc::new(Self::Op {
            kind,
            query,
            left,
            right,
        })
    }

    /// The fragment query this subtree denotes.
    pub fn query(&self) -> &FragmentQuery {
        match self {
            Self::Named { query } | Self::Op { query, .. } => query,
        }
    }

    /// The combinator of an internal node.
    pub fn op_kind(&self) -> Option<TileOpKind> {
        match self {
            Self::Named { .. } => None,
            Self::Op { kind, .. } => Some(*kind),
        }
    }

    /// The queries at the leaves, left to right.
    pub fn named_queries(self: &Arc<Self>) -> Vec<FragmentQuery> {
        let mut queries = Vec::new();
        collect_named(self, &mut queries);
        queries
    }

    /// Number of combinator nodes in the subtree.
    pub fn operator_count(&self) -> usize {
        match self {
            Self::Named { .. } => 0,
            Self::Op { left, right, .. } => 1 + left.operator_count() + right.operator_count(),
        }
    }

    /// Replace `target` (by identity) with `replacement`, recomputing the
    /// combined queries along the rebuilt spine through `processor`.
    ///
    /// Subtrees that do not contain the target are shared, not copied; if
    /// the target does not occur, the original tile is returned.
    pub fn replace(
        self: &Arc<Self>,
        target: &Arc<Self>,
        replacement: &Arc<Self>,
        processor: &FragmentQueryProcessor,
    ) -> Arc<Self> {
        if Arc::ptr_eq(self, target) {
            return Arc::clone(replacement);
        }
        match &**self {
            Self::Named { .. } => Arc::clone(self),
            Self::Op {
                kind, left, right, ..
            } => {
                let new_left = left.replace(target, replacement, processor);
                let new_right = right.replace(target, replacement, processor);
                if Arc::ptr_eq(&new_left, left) && Arc::ptr_eq(&new_right, right) {
                    return Arc::clone(self);
                }
                let query = match kind {
                    TileOpKind::Union => processor.union(new_left.query(), new_right.query()),
                    TileOpKind::Join => processor.join(new_left.query(), new_right.query()),
                    TileOpKind::AntiSemiJoin => {
                        processor.difference(new_left.query(), new_right.query())
                    }
                };
                Self::op(*kind, query, new_left, new_right)
            }
        }
    }

    /// Render the tile as an ascii tree for debug output.
    pub fn to_ascii_tree(&self) -> ascii_tree::Tree {
        match self {
            Self::Named { query } => ascii_tree::Tree::Leaf(vec![query.to_string()]),
            Self::Op {
                kind, left, right, ..
            } => ascii_tree::Tree::Node(
                kind.to_string(),
                vec![left.to_ascii_tree(), right.to_ascii_tree()],
            ),
        }
    }
}

fn collect_named(tile: &Arc<Tile>, queries: &mut Vec<FragmentQuery>) {
    match &**tile {
        Tile::Named { query } => queries.push(query.clone()),
        Tile::Op { left, right, .. } => {
            collect_named(left, queries);
            collect_named(right, queries);
        }
    }
}

impl Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        ascii_tree::write_tree(f, &self.to_ascii_tree())
    }
}

#[cfg(test)]
mod test {
    use super::{Tile, TileOpKind};
    use crate::boolean::BoolExpr;
    use crate::rewriting::fragment_query::FragmentQuery;
    use crate::rewriting::knowledge_base::FragmentQueryKB;
    use crate::rewriting::processor::{FragmentQueryProcessor, TileProcessor};
    use std::sync::Arc;

    fn leaf(label: &str) -> Arc<Tile> {
        Tile::named(FragmentQuery::new(
            Some(label.to_owned()),
            [],
            BoolExpr::make_true(),
        ))
    }

    #[test]
    fn replace_preserves_sharing() {
        let processor = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let a = leaf("a");
        let b = leaf("b");
        let c = leaf("c");
        let ab = Tile::op(
            TileOpKind::Join,
            processor.join(a.query(), b.query()),
            a.clone(),
            b.clone(),
        );
        let root = Tile::op(
            TileOpKind::Union,
            processor.union(ab.query(), c.query()),
            ab.clone(),
            c.clone(),
        );

        let d = leaf("d");
        let replaced = root.replace(&b, &d, &processor);
        // left spine rebuilt, untouched branch shared
        match &*replaced {
            Tile::Op { left, right, .. } => {
                assert!(Arc::ptr_eq(right, &c));
                assert!(!Arc::ptr_eq(left, &ab));
            }
            _ => panic!("expected an operator node"),
        }

        // absent target: same tile comes back
        let unchanged = root.replace(&d, &a, &processor);
        assert!(Arc::ptr_eq(&unchanged, &root));
    }

    #[test]
    fn operator_count() {
        let processor = FragmentQueryProcessor::new(FragmentQueryKB::default());
        let a = leaf("a");
        let b = leaf("b");
        assert_eq!(a.operator_count(), 0);

        let joined = Tile::op(
            TileOpKind::Join,
            processor.join(a.query(), b.query()),
            a,
            b,
        );
        assert_eq!(joined.operator_count(), 1);
    }
}
