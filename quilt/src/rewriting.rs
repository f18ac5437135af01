//! This module implements the fragment-query and tile algebra, the
//! knowledge base with its chase optimization, and the greedy view-based
//! query-rewriting search.

pub mod fragment_query;
pub mod knowledge_base;
pub mod pass;
pub mod processor;
pub mod simplifier;
pub mod tile;

pub use fragment_query::{BoolExpression, FragmentQuery};
pub use knowledge_base::FragmentQueryKB;
pub use processor::{
    FragmentQueryProcessor, RewritingProcessor, RewritingStatistics, TileProcessor,
};
pub use tile::{Tile, TileOpKind};
