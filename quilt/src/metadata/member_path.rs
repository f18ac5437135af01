//! This module defines [MemberPath].

use std::fmt::{self, Display};

/// A navigation path from an extent through zero or more structural members,
/// e.g. `Person.Address.City`.
///
/// Paths are never mutated after creation; [MemberPath::append] returns a
/// fresh path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberPath {
    extent: String,
    members: Vec<String>,
}

impl MemberPath {
    /// Create a path referring to the extent itself.
    pub fn extent_root(extent: impl Into<String>) -> Self {
        Self {
            extent: extent.into(),
            members: Vec::new(),
        }
    }

    /// Create a path of a single member directly under the extent.
    pub fn member(extent: impl Into<String>, member: impl Into<String>) -> Self {
        Self {
            extent: extent.into(),
            members: vec![member.into()],
        }
    }

    /// Return a new path extended by one member.
    pub fn append(&self, member: impl Into<String>) -> Self {
        let mut members = self.members.clone();
        members.push(member.into());
        Self {
            extent: self.extent.clone(),
            members,
        }
    }

    /// The extent this path starts at.
    pub fn extent(&self) -> &str {
        &self.extent
    }

    /// The member names along the path.
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// The final member name, if the path is not the extent root.
    pub fn leaf(&self) -> Option<&str> {
        self.members.last().map(String::as_str)
    }

    /// Whether this path refers to the extent itself.
    pub fn is_extent_root(&self) -> bool {
        self.members.is_empty()
    }
}

impl Display for MemberPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extent)?;
        for member in &self.members {
            write!(f, ".{member}")?;
        }
        Ok(())
    }
}
