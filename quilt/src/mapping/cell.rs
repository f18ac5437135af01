//! This module defines the mapping cells the host supplies: projected
//! slots, the per-side cell queries, and [CellWrapper], a cell together
//! with its compiled fragment queries.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use crate::boolean::{ArcExpr, RestrictionKind};
use crate::metadata::{Constant, MemberPath};
use crate::rewriting::fragment_query::{in_set_condition, BoolExpression, FragmentQuery};

/// One projected column of a cell query: either a member of the query's
/// extent or a constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectedSlot {
    /// A member projection.
    Member(MemberPath),
    /// A constant projection.
    Constant(Constant),
}

impl ProjectedSlot {
    /// The projected member, if this is a member slot.
    pub fn as_member(&self) -> Option<&MemberPath> {
        match self {
            Self::Member(member) => Some(member),
            Self::Constant(_) => None,
        }
    }
}

/// One conjunct of a cell's where-clause, before domains are known: a
/// member restricted to an explicit set of values.
///
/// Hosts write conditions in these terms; the view-generation context
/// compiles them into domain constraints once the member domains have been
/// computed from the whole cell collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberCondition {
    /// The restricted member.
    pub member: MemberPath,
    /// Scalar or type restriction.
    pub kind: RestrictionKind,
    /// The admitted values.
    pub values: BTreeSet<Constant>,
}

impl MemberCondition {
    /// Restrict a member to the given scalar values.
    pub fn any_of(member: MemberPath, values: impl IntoIterator<Item = Constant>) -> Self {
        Self {
            member,
            kind: RestrictionKind::Scalar,
            values: values.into_iter().collect(),
        }
    }

    /// Restrict a member to a single scalar value.
    pub fn equals(member: MemberPath, value: Constant) -> Self {
        Self::any_of(member, [value])
    }

    /// Restrict a member to `NULL`.
    pub fn is_null(member: MemberPath) -> Self {
        Self::equals(member, Constant::Null)
    }

    /// Restrict a member to anything but `NULL`.
    pub fn is_not_null(member: MemberPath) -> Self {
        Self::equals(member, Constant::not_null())
    }

    /// Restrict a path to rows whose element is an instance of one of the
    /// given types.
    pub fn is_of_type<S: Into<String>>(
        member: MemberPath,
        types: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            member,
            kind: RestrictionKind::Type,
            values: types.into_iter().map(Constant::type_of).collect(),
        }
    }
}

impl Display for MemberCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} IN {{", self.member)?;
        for (index, value) in self.values.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "}}")
    }
}

/// A where-clause as written by the host, over [MemberCondition] terms.
pub type RawCondition = ArcExpr<MemberCondition>;

/// One side of a mapping cell: an extent, a projection list, and a
/// where-clause.
#[derive(Debug, Clone)]
pub struct CellQuery {
    extent: String,
    projection: Vec<ProjectedSlot>,
    where_clause: RawCondition,
}

impl CellQuery {
    /// Create a cell query.
    pub fn new(
        extent: impl Into<String>,
        projection: Vec<ProjectedSlot>,
        where_clause: RawCondition,
    ) -> Self {
        Self {
            extent: extent.into(),
            projection,
            where_clause,
        }
    }

    /// The extent the query ranges over.
    pub fn extent(&self) -> &str {
        &self.extent
    }

    /// The projected slots, in declaration order.
    pub fn projection(&self) -> &[ProjectedSlot] {
        &self.projection
    }

    /// The where-clause.
    pub fn where_clause(&self) -> &RawCondition {
        &self.where_clause
    }

    /// The members among the projected slots.
    pub fn projected_members(&self) -> impl Iterator<Item = &MemberPath> {
        self.projection.iter().filter_map(ProjectedSlot::as_member)
    }
}

/// One mapping fragment: a conceptual-side query and a storage-side query
/// that must denote the same row-set.
#[derive(Debug, Clone)]
pub struct Cell {
    id: usize,
    c_query: CellQuery,
    s_query: CellQuery,
}

impl Cell {
    /// Create a cell; `id` must be unique within one view-generation pass.
    pub fn new(id: usize, c_query: CellQuery, s_query: CellQuery) -> Self {
        Self {
            id,
            c_query,
            s_query,
        }
    }

    /// The cell's identifier.
    pub fn id(&self) -> usize {
        self.id
    }

    /// The conceptual-side query.
    pub fn c_query(&self) -> &CellQuery {
        &self.c_query
    }

    /// The storage-side query.
    pub fn s_query(&self) -> &CellQuery {
        &self.s_query
    }
}

/// A cell together with its compiled fragment queries.
///
/// `fragment_view` is the storage-side view the rewriting search combines;
/// `c_view` is the conceptual-side query the validator compares it against.
/// Both carry the wrapper's label so diagnostics can name the cell.
#[derive(Debug, Clone)]
pub struct CellWrapper {
    cell: Cell,
    c_view: FragmentQuery,
    fragment_view: FragmentQuery,
}

impl CellWrapper {
    pub(crate) fn new(cell: Cell, c_view: FragmentQuery, fragment_view: FragmentQuery) -> Self {
        Self {
            cell,
            c_view,
            fragment_view,
        }
    }

    /// The label identifying this wrapper in tiles and diagnostics.
    pub fn label(cell_id: usize) -> String {
        format!("V{cell_id}")
    }

    /// The underlying cell.
    pub fn cell(&self) -> &Cell {
        &self.cell
    }

    /// The compiled conceptual-side query.
    pub fn c_view(&self) -> &FragmentQuery {
        &self.c_view
    }

    /// The compiled storage-side view used as a rewriting candidate.
    pub fn fragment_view(&self) -> &FragmentQuery {
        &self.fragment_view
    }

    /// The conceptual-side member the given storage-side member is mapped
    /// to, by projection position.
    pub fn c_side_slot_for_s_member(&self, member: &MemberPath) -> Option<&MemberPath> {
        let index = self
            .cell
            .s_query
            .projection()
            .iter()
            .position(|slot| slot.as_member() == Some(member))?;
        self.cell.c_query.projection().get(index)?.as_member()
    }

    /// The condition "some row of this wrapper's conceptual extent exists",
    /// conjoined into equivalence checks so an empty extent never counts as
    /// a violation.
    pub fn create_role_boolean(&self) -> BoolExpression {
        in_set_condition(self.cell.c_query.extent())
    }
}
