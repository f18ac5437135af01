//! This module defines [Schema] and the metadata it holds: entity types with
//! their hierarchies, entity sets, and association sets with referential
//! constraints.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};

use super::member_path::MemberPath;

/// How many participants an association end admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiplicity {
    /// At most one (`0..1`).
    ZeroOrOne,
    /// Exactly one (`1..1`).
    One,
    /// Any number (`0..*`).
    Many,
}

/// A structural member of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Name of the member.
    pub name: String,
    /// Name of the member's declared type; may refer to another entity type
    /// for complex members.
    pub type_name: String,
    /// Whether the member admits `NULL`.
    pub is_nullable: bool,
    /// Whether the member is part of its type's key.
    pub is_key: bool,
}

impl Member {
    /// Create a non-key member.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, is_nullable: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            is_nullable,
            is_key: false,
        }
    }

    /// Create a key member; keys are never nullable.
    pub fn key(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            is_nullable: false,
            is_key: true,
        }
    }
}

/// An entity type, possibly part of an inheritance hierarchy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    /// Name of the type.
    pub name: String,
    /// Name of the supertype, if any.
    pub supertype: Option<String>,
    /// Members declared directly on this type.
    pub members: Vec<Member>,
}

impl EntityType {
    /// Create a root entity type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supertype: None,
            members: Vec::new(),
        }
    }

    /// Create an entity type derived from `supertype`.
    pub fn derived(name: impl Into<String>, supertype: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supertype: Some(supertype.into()),
            members: Vec::new(),
        }
    }

    /// Add a member to this type.
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }
}

/// One end of an association set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationEnd {
    /// Role name of the end.
    pub role: String,
    /// Entity set the end draws its participants from.
    pub entity_set: String,
    /// Static entity type of the end.
    pub entity_type: String,
    /// Multiplicity of the end.
    pub multiplicity: Multiplicity,
}

/// A referential constraint between two ends of an association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferentialConstraint {
    /// Role of the principal end.
    pub principal_role: String,
    /// Role of the dependent end.
    pub dependent_role: String,
    /// Key properties on the principal end.
    pub principal_properties: Vec<String>,
    /// Properties on the dependent end bound to the principal key.
    pub dependent_properties: Vec<String>,
}

/// What kind of extent this is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtentKind {
    /// A set of entities of (subtypes of) one element type.
    EntitySet {
        /// The static element type of the set.
        element_type: String,
    },
    /// A set of association instances between entity sets.
    AssociationSet {
        /// The ends of the association.
        ends: Vec<AssociationEnd>,
        /// Referential constraints declared on the association.
        constraints: Vec<ReferentialConstraint>,
    },
}

/// A named extent, either an entity set or an association set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extent {
    /// Name of the extent.
    pub name: String,
    /// Entity-set or association-set payload.
    pub kind: ExtentKind,
}

impl Extent {
    /// Create an entity set.
    pub fn entity_set(name: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExtentKind::EntitySet {
                element_type: element_type.into(),
            },
        }
    }

    /// Create an association set.
    pub fn association_set(
        name: impl Into<String>,
        ends: Vec<AssociationEnd>,
        constraints: Vec<ReferentialConstraint>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: ExtentKind::AssociationSet { ends, constraints },
        }
    }

    /// The association ends, empty for entity sets.
    pub fn ends(&self) -> &[AssociationEnd] {
        match &self.kind {
            ExtentKind::EntitySet { .. } => &[],
            ExtentKind::AssociationSet { ends, .. } => ends,
        }
    }
}

impl Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The collection of types and extents a view-generation pass runs against.
///
/// Both the conceptual side and the storage side are described here; storage
/// tables are ordinary entity sets whose element types carry the column
/// nullability flags.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: BTreeMap<String, EntityType>,
    extents: BTreeMap<String, Extent>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type.
    pub fn add_type(&mut self, entity_type: EntityType) {
        self.types.insert(entity_type.name.clone(), entity_type);
    }

    /// Register an extent.
    pub fn add_extent(&mut self, extent: Extent) {
        self.extents.insert(extent.name.clone(), extent);
    }

    /// Look up an entity type by name.
    pub fn entity_type(&self, name: &str) -> Option<&EntityType> {
        self.types.get(name)
    }

    /// Look up an extent by name.
    pub fn extent(&self, name: &str) -> Option<&Extent> {
        self.extents.get(name)
    }

    /// The element type of an entity set.
    pub fn element_type(&self, extent: &str) -> Option<&str> {
        match &self.extent(extent)?.kind {
            ExtentKind::EntitySet { element_type } => Some(element_type),
            ExtentKind::AssociationSet { .. } => None,
        }
    }

    /// Whether `type_name` equals `ancestor` or derives from it.
    pub fn is_derived_from(&self, type_name: &str, ancestor: &str) -> bool {
        let mut current = Some(type_name);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = self
                .entity_type(name)
                .and_then(|ty| ty.supertype.as_deref());
        }
        false
    }

    /// The type itself plus all types derived from it, in name order.
    pub fn derived_types(&self, type_name: &str) -> Vec<&str> {
        self.types
            .keys()
            .map(String::as_str)
            .filter(|candidate| self.is_derived_from(candidate, type_name))
            .collect()
    }

    /// The types among `derived_types(element_type)` on which `member` is
    /// present, declared or inherited.
    pub fn types_with_member(&self, element_type: &str, member: &str) -> BTreeSet<String> {
        self.derived_types(element_type)
            .into_iter()
            .filter(|ty| self.declares_or_inherits(ty, member))
            .map(str::to_owned)
            .collect()
    }

    fn declares_or_inherits(&self, type_name: &str, member: &str) -> bool {
        let mut current = Some(type_name);
        while let Some(name) = current {
            let Some(ty) = self.entity_type(name) else {
                return false;
            };
            if ty.members.iter().any(|m| m.name == member) {
                return true;
            }
            current = ty.supertype.as_deref();
        }
        false
    }

    /// Find a member by name on a type, searching the type, its supertypes,
    /// and its derived types.
    pub fn find_member(&self, type_name: &str, member: &str) -> Option<&Member> {
        // supertype chain first: the declaration closest to the static type wins
        let mut current = Some(type_name);
        while let Some(name) = current {
            let ty = self.entity_type(name)?;
            if let Some(found) = ty.members.iter().find(|m| m.name == member) {
                return Some(found);
            }
            current = ty.supertype.as_deref();
        }
        self.derived_types(type_name)
            .into_iter()
            .filter_map(|ty| self.entity_type(ty))
            .flat_map(|ty| ty.members.iter())
            .find(|m| m.name == member)
    }

    /// Resolve the leaf member a path refers to.
    pub fn resolve(&self, path: &MemberPath) -> Option<&Member> {
        let extent = self.extent(path.extent())?;
        let mut members = path.members().iter();
        let first = members.next()?;

        let (mut current_type, mut member) = match &extent.kind {
            ExtentKind::EntitySet { element_type } => {
                let member = self.find_member(element_type, first)?;
                (member.type_name.clone(), member)
            }
            ExtentKind::AssociationSet { ends, .. } => {
                // the first path step of an association set is a role name
                let end = ends.iter().find(|end| end.role == *first)?;
                let second = members.next()?;
                let member = self.find_member(&end.entity_type, second)?;
                (member.type_name.clone(), member)
            }
        };
        for step in members {
            member = self.find_member(&current_type, step)?;
            current_type = member.type_name.clone();
        }
        Some(member)
    }

    /// The key member paths of an extent.
    pub fn key_members(&self, extent_name: &str) -> Vec<MemberPath> {
        let Some(extent) = self.extent(extent_name) else {
            return Vec::new();
        };
        match &extent.kind {
            ExtentKind::EntitySet { element_type } => self
                .key_member_names(element_type)
                .into_iter()
                .map(|name| MemberPath::member(extent_name, name))
                .collect(),
            ExtentKind::AssociationSet { ends, .. } => ends
                .iter()
                .flat_map(|end| {
                    self.key_member_names(&end.entity_type)
                        .into_iter()
                        .map(|name| MemberPath::member(extent_name, &end.role).append(name))
                })
                .collect(),
        }
    }

    fn key_member_names(&self, type_name: &str) -> Vec<String> {
        let mut names = Vec::new();
        let mut current = Some(type_name);
        while let Some(name) = current {
            let Some(ty) = self.entity_type(name) else {
                break;
            };
            names.extend(
                ty.members
                    .iter()
                    .filter(|m| m.is_key)
                    .map(|m| m.name.clone()),
            );
            current = ty.supertype.as_deref();
        }
        names.sort();
        names
    }
}

#[cfg(test)]
mod test {
    use super::{EntityType, Extent, Member, Schema};
    use crate::metadata::member_path::MemberPath;

    fn person_schema() -> Schema {
        let mut schema = Schema::new();
        schema.add_type(
            EntityType::new("Person")
                .with_member(Member::key("Id", "Int32"))
                .with_member(Member::new("Name", "String", true)),
        );
        schema.add_type(
            EntityType::derived("Customer", "Person")
                .with_member(Member::new("Rating", "Int32", false)),
        );
        schema.add_type(EntityType::derived("PreferredCustomer", "Customer"));
        schema.add_extent(Extent::entity_set("Persons", "Person"));
        schema
    }

    #[test]
    fn derivation() {
        let schema = person_schema();
        assert!(schema.is_derived_from("PreferredCustomer", "Person"));
        assert!(!schema.is_derived_from("Person", "Customer"));
        assert_eq!(
            schema.derived_types("Customer"),
            vec!["Customer", "PreferredCustomer"]
        );
    }

    #[test]
    fn member_presence() {
        let schema = person_schema();
        let with_rating = schema.types_with_member("Person", "Rating");
        assert!(with_rating.contains("Customer"));
        assert!(with_rating.contains("PreferredCustomer"));
        assert!(!with_rating.contains("Person"));
    }

    #[test]
    fn resolve_member_path() {
        let schema = person_schema();
        let rating = MemberPath::member("Persons", "Rating");
        let member = schema.resolve(&rating).expect("resolvable");
        assert!(!member.is_nullable);

        let name = MemberPath::member("Persons", "Name");
        assert!(schema.resolve(&name).expect("resolvable").is_nullable);
    }

    #[test]
    fn key_members() {
        let schema = person_schema();
        let keys = schema.key_members("Persons");
        assert_eq!(keys, vec![MemberPath::member("Persons", "Id")]);
    }
}
