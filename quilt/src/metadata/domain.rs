//! This module defines [Domain] and [MemberDomainMap].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{self, Display};
use std::sync::Arc;

use super::constant::Constant;
use super::member_path::MemberPath;

/// The finite set of [Constant] values a member may take, together with the
/// full possible domain used to compute negated-set complements.
///
/// Domains are computed once from metadata and treated as immutable for the
/// duration of view generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Domain {
    values: BTreeSet<Constant>,
    possible: Arc<BTreeSet<Constant>>,
}

impl Domain {
    /// Create a domain; `values` are clamped to `possible`.
    pub fn new(
        values: impl IntoIterator<Item = Constant>,
        possible: impl IntoIterator<Item = Constant>,
    ) -> Self {
        let possible: Arc<BTreeSet<Constant>> = Arc::new(possible.into_iter().collect());
        let values = values
            .into_iter()
            .filter(|value| possible.contains(value))
            .collect();
        Self { values, possible }
    }

    /// Create a domain whose values cover the whole possible set.
    pub fn closed(possible: impl IntoIterator<Item = Constant>) -> Self {
        let possible: Arc<BTreeSet<Constant>> = Arc::new(possible.into_iter().collect());
        Self {
            values: (*possible).clone(),
            possible,
        }
    }

    /// The values of this domain, in order.
    pub fn values(&self) -> impl Iterator<Item = &Constant> {
        self.values.iter()
    }

    /// The full possible domain.
    pub fn possible(&self) -> &Arc<BTreeSet<Constant>> {
        &self.possible
    }

    /// Whether the domain contains the given value.
    pub fn contains(&self, value: &Constant) -> bool {
        self.values.contains(value)
    }

    /// Expand negated-set constants into their complement within the
    /// possible domain, clamping everything else to the possible domain.
    pub fn expand(&self, values: &BTreeSet<Constant>) -> BTreeSet<Constant> {
        let mut expanded = BTreeSet::new();
        for value in values {
            match value {
                Constant::AllOther(excluded) => {
                    expanded.extend(
                        self.possible
                            .iter()
                            .filter(|candidate| !excluded.contains(candidate))
                            .cloned(),
                    );
                }
                other => {
                    if self.possible.contains(other) {
                        expanded.insert(other.clone());
                    }
                }
            }
        }
        expanded
    }

    /// The complement of `values` within the possible domain.
    pub fn negate(&self, values: &BTreeSet<Constant>) -> BTreeSet<Constant> {
        self.possible.difference(values).cloned().collect()
    }
}

impl Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (index, value) in self.values.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "}}")
    }
}

/// Per-member domains of one side (query or update) of a mapping, plus the
/// record of which members appear in fragment conditions.
#[derive(Debug, Clone, Default)]
pub struct MemberDomainMap {
    domains: BTreeMap<MemberPath, Domain>,
    condition_members: BTreeSet<MemberPath>,
}

impl MemberDomainMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the domain of a member.
    pub fn insert(&mut self, member: MemberPath, domain: Domain) {
        self.domains.insert(member, domain);
    }

    /// Mark a member as appearing in some fragment condition.
    pub fn mark_condition_member(&mut self, member: MemberPath) {
        self.condition_members.insert(member);
    }

    /// The domain of a member, if one was computed.
    pub fn domain(&self, member: &MemberPath) -> Option<&Domain> {
        self.domains.get(member)
    }

    /// Whether the member appears in some fragment condition.
    pub fn is_condition_member(&self, member: &MemberPath) -> bool {
        self.condition_members.contains(member)
    }

    /// Condition members of the given extent, in order.
    pub fn condition_members(&self, extent: &str) -> impl Iterator<Item = &MemberPath> {
        let extent = extent.to_owned();
        self.condition_members
            .iter()
            .filter(move |member| member.extent() == extent)
    }

    /// Members of the given extent that never appear in a condition.
    pub fn non_condition_members(&self, extent: &str) -> impl Iterator<Item = &MemberPath> {
        let extent = extent.to_owned();
        self.domains
            .keys()
            .filter(move |member| member.extent() == extent)
            .filter(|member| !self.condition_members.contains(*member))
    }
}

#[cfg(test)]
mod test {
    use super::{Constant, Domain};
    use std::collections::BTreeSet;

    fn discriminator_domain() -> Domain {
        let declared = [Constant::value("A"), Constant::value("B")];
        let possible: Vec<_> = declared
            .iter()
            .cloned()
            .chain([Constant::all_other(declared.clone())])
            .collect();
        Domain::new(declared, possible)
    }

    #[test]
    fn expand_negated_set() {
        let domain = discriminator_domain();
        let condition: BTreeSet<_> = [Constant::all_other([Constant::value("A")])].into();
        let expanded = domain.expand(&condition);

        assert!(expanded.contains(&Constant::value("B")));
        assert!(!expanded.contains(&Constant::value("A")));
        // the "everything else" bucket survives the complement
        assert!(expanded.contains(&Constant::all_other([
            Constant::value("A"),
            Constant::value("B")
        ])));
    }

    #[test]
    fn negate_is_complement_within_possible() {
        let domain = discriminator_domain();
        let values: BTreeSet<_> = [Constant::value("A")].into();
        let complement = domain.negate(&values);

        assert!(!complement.contains(&Constant::value("A")));
        assert!(complement.contains(&Constant::value("B")));
    }
}
