//! This module defines [ViewgenContext], the per-extent state of one
//! view-generation pass: computed member domains, the knowledge base, and
//! the compiled cell wrappers.

use std::collections::{BTreeMap, BTreeSet};

use crate::boolean::{BoolExpr, RestrictionKind};
use crate::error::Error;
use crate::metadata::{Constant, Domain, MemberDomainMap, MemberPath, Schema};
use crate::rewriting::fragment_query::{
    scalar_condition, type_condition, BoolExpression, FragmentQuery,
};
use crate::rewriting::knowledge_base::FragmentQueryKB;
use crate::rewriting::processor::FragmentQueryProcessor;

use super::cell::{Cell, CellQuery, CellWrapper, ProjectedSlot, RawCondition};

/// Knobs of one view-generation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewgenConfig {
    /// Fraction of the view count to retry the rewriting search with
    /// permuted view orders; `0.0` disables the retries.
    pub permute_fraction: f64,
    /// Lower bound on the permutation attempts when enabled.
    pub min_permutations: usize,
    /// Upper bound on the permutation attempts.
    pub max_permutations: usize,
    /// Whether the knowledge base may use the chase optimization.
    pub use_chase: bool,
}

impl Default for ViewgenConfig {
    fn default() -> Self {
        Self {
            permute_fraction: 0.0,
            min_permutations: 0,
            max_permutations: 0,
            use_chase: true,
        }
    }
}

/// Everything one view-generation invocation owns: the schema reference,
/// the domains computed for both mapping sides, the knowledge base (inside
/// the query processor), and the compiled cell wrappers.
///
/// A context is built once per conceptual extent and then read-only; hosts
/// running concurrent compilations give each its own context.
#[derive(Debug)]
pub struct ViewgenContext<'a> {
    schema: &'a Schema,
    extent: String,
    config: ViewgenConfig,
    c_domains: MemberDomainMap,
    s_domains: MemberDomainMap,
    processor: FragmentQueryProcessor,
    wrappers: Vec<CellWrapper>,
}

impl<'a> ViewgenContext<'a> {
    /// Build the context for one conceptual extent from its mapping cells.
    ///
    /// Computes the member domains of both sides, derives the required
    /// knowledge-base facts from the schema, and compiles every cell's
    /// where-clauses into domain-constraint conditions. Malformed metadata
    /// is an error here, never a silent skip.
    pub fn new(
        schema: &'a Schema,
        extent: &str,
        cells: Vec<Cell>,
        config: ViewgenConfig,
    ) -> Result<Self, Error> {
        if cells.is_empty() {
            return Err(Error::invalid_metadata(format!(
                "extent `{extent}` has no mapping cells"
            )));
        }
        if let Some(cell) = cells
            .iter()
            .find(|cell| cell.c_query().extent() != extent)
        {
            return Err(Error::invalid_metadata(format!(
                "cell {} maps extent `{}`, expected `{extent}`",
                cell.id(),
                cell.c_query().extent()
            )));
        }

        let mut c_domains =
            compute_domains(schema, cells.iter().map(Cell::c_query))?;
        let s_domains = compute_domains(schema, cells.iter().map(Cell::s_query))?;
        propagate_condition_domains(schema, &cells, &s_domains, &mut c_domains);

        let mut kb = FragmentQueryKB::new(config.use_chase);
        kb.create_required_constraints(schema, extent, &c_domains)?;
        for s_extent in storage_extents(&cells) {
            kb.create_required_constraints(schema, &s_extent, &s_domains)?;
        }
        log::debug!(
            "knowledge base for `{extent}`: {} indexed facts, {} terms total",
            kb.indexed_fact_count(),
            kb.expression().term_count()
        );

        let wrappers = cells
            .into_iter()
            .map(|cell| {
                let label = CellWrapper::label(cell.id());
                let c_condition = compile_condition(cell.c_query().where_clause(), &c_domains)?;
                let s_condition = compile_condition(cell.s_query().where_clause(), &s_domains)?;
                let c_view = FragmentQuery::new(
                    Some(label.clone()),
                    cell.c_query().projected_members().cloned(),
                    c_condition,
                );
                let fragment_view = FragmentQuery::new(
                    Some(label),
                    cell.s_query().projected_members().cloned(),
                    s_condition,
                );
                Ok(CellWrapper::new(cell, c_view, fragment_view))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Self {
            schema,
            extent: extent.to_owned(),
            config,
            c_domains,
            s_domains,
            processor: FragmentQueryProcessor::new(kb),
            wrappers,
        })
    }

    /// The schema the pass runs against.
    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    /// The conceptual extent being generated.
    pub fn extent(&self) -> &str {
        &self.extent
    }

    /// The configuration of this pass.
    pub fn config(&self) -> &ViewgenConfig {
        &self.config
    }

    /// Conceptual-side member domains.
    pub fn c_domains(&self) -> &MemberDomainMap {
        &self.c_domains
    }

    /// Storage-side member domains.
    pub fn s_domains(&self) -> &MemberDomainMap {
        &self.s_domains
    }

    /// The knowledge-base-backed query processor.
    pub fn processor(&self) -> &FragmentQueryProcessor {
        &self.processor
    }

    /// The compiled cell wrappers, in cell order.
    pub fn wrappers(&self) -> &[CellWrapper] {
        &self.wrappers
    }

    /// The distinct storage extents the cells map to, in first-use order.
    pub fn storage_extents(&self) -> Vec<String> {
        let mut extents = Vec::new();
        for wrapper in &self.wrappers {
            let extent = wrapper.cell().s_query().extent();
            if !extents.iter().any(|known| known == extent) {
                extents.push(extent.to_owned());
            }
        }
        extents
    }

    /// Find the wrapper a tile leaf label refers to.
    pub fn wrapper_by_label(&self, label: &str) -> Option<&CellWrapper> {
        self.wrappers
            .iter()
            .find(|wrapper| CellWrapper::label(wrapper.cell().id()) == label)
    }
}

fn storage_extents(cells: &[Cell]) -> Vec<String> {
    let mut extents = Vec::new();
    for cell in cells {
        let extent = cell.s_query().extent();
        if !extents.iter().any(|known| known == extent) {
            extents.push(extent.to_owned());
        }
    }
    extents
}

/// Compute the domain of every member one side of the cells mentions.
///
/// Condition members get the values their conditions declare, `NULL` when
/// the member is nullable, `Undefined` when the member exists only on part
/// of the type hierarchy, and a negated-set bucket standing for every other
/// value. Projected-only members get the minimal domain the nullability
/// checks need.
fn compute_domains<'c>(
    schema: &Schema,
    queries: impl Iterator<Item = &'c CellQuery> + Clone,
) -> Result<MemberDomainMap, Error> {
    let mut declared: BTreeMap<MemberPath, (RestrictionKind, BTreeSet<Constant>)> =
        BTreeMap::new();
    for query in queries.clone() {
        for term in query.where_clause().terms() {
            let entry = declared
                .entry(term.member.clone())
                .or_insert_with(|| (term.kind, BTreeSet::new()));
            if entry.0 != term.kind {
                return Err(Error::invalid_metadata(format!(
                    "member `{}` is restricted both as a scalar and as a type",
                    term.member
                )));
            }
            for value in &term.values {
                match value {
                    Constant::AllOther(excluded) => entry.1.extend(excluded.iter().cloned()),
                    other => {
                        entry.1.insert(other.clone());
                    }
                }
            }
        }
    }

    let mut map = MemberDomainMap::new();
    for (member, (kind, values)) in declared {
        let domain = match kind {
            RestrictionKind::Type => type_domain(schema, &member)?,
            RestrictionKind::Scalar => scalar_domain(schema, &member, values),
        };
        map.insert(member.clone(), domain);
        map.mark_condition_member(member);
    }

    for query in queries {
        for member in query.projected_members() {
            if map.domain(member).is_some() {
                continue;
            }
            let nullable = schema
                .resolve(member)
                .map(|resolved| resolved.is_nullable)
                .unwrap_or(true);
            map.insert(member.clone(), scalar_domain_for_values(nullable, BTreeSet::new()));
        }
    }
    Ok(map)
}

fn type_domain(schema: &Schema, member: &MemberPath) -> Result<Domain, Error> {
    let base_type = if member.is_extent_root() {
        schema.element_type(member.extent()).ok_or_else(|| {
            Error::invalid_metadata(format!(
                "type condition on unknown entity set `{}`",
                member.extent()
            ))
        })?
    } else {
        schema
            .resolve(member)
            .ok_or_else(|| {
                Error::invalid_metadata(format!("type condition on unknown member `{member}`"))
            })?
            .type_name
            .as_str()
    };
    let derived = schema.derived_types(base_type);
    if derived.is_empty() {
        return Err(Error::invalid_metadata(format!(
            "type condition on `{member}` references unknown type `{base_type}`"
        )));
    }
    Ok(Domain::closed(
        derived.into_iter().map(Constant::type_of),
    ))
}

fn scalar_domain(schema: &Schema, member: &MemberPath, values: BTreeSet<Constant>) -> Domain {
    let nullable = schema
        .resolve(member)
        .map(|resolved| resolved.is_nullable)
        .unwrap_or(true);
    let mut domain = scalar_domain_for_values(nullable, values);
    if admits_undefined(schema, member) {
        let mut possible: BTreeSet<Constant> = domain.possible().iter().cloned().collect();
        possible.insert(Constant::Undefined);
        domain = Domain::closed(possible);
    }
    domain
}

fn scalar_domain_for_values(nullable: bool, mut explicit: BTreeSet<Constant>) -> Domain {
    if nullable {
        explicit.insert(Constant::Null);
    } else {
        explicit.remove(&Constant::Null);
    }
    let bucket = Constant::all_other(explicit.iter().cloned());
    explicit.insert(bucket);
    Domain::closed(explicit)
}

/// Whether the member is declared on only part of its extent's hierarchy,
/// so rows of the other types have no value for it at all.
fn admits_undefined(schema: &Schema, member: &MemberPath) -> bool {
    let Some(element_type) = schema.element_type(member.extent()) else {
        return false;
    };
    let Some(leaf) = member.leaf() else {
        return false;
    };
    let derived = schema.derived_types(element_type);
    let declaring = schema.types_with_member(element_type, leaf);
    !declaring.is_empty() && declaring.len() < derived.len()
}

/// Mirror every storage-side condition member's values onto the
/// conceptual-side member it is mapped to, so constants can be propagated
/// across the mapping during validation.
fn propagate_condition_domains(
    schema: &Schema,
    cells: &[Cell],
    s_domains: &MemberDomainMap,
    c_domains: &mut MemberDomainMap,
) {
    for cell in cells {
        for (index, slot) in cell.s_query().projection().iter().enumerate() {
            let Some(s_member) = slot.as_member() else {
                continue;
            };
            if !s_domains.is_condition_member(s_member) {
                continue;
            }
            let Some(s_domain) = s_domains.domain(s_member) else {
                continue;
            };
            let Some(c_member) = cell
                .c_query()
                .projection()
                .get(index)
                .and_then(ProjectedSlot::as_member)
            else {
                continue;
            };
            if c_domains.is_condition_member(c_member) {
                continue;
            }
            let nullable = schema
                .resolve(c_member)
                .map(|resolved| resolved.is_nullable)
                .unwrap_or(true);
            let mut possible: BTreeSet<Constant> = s_domain
                .possible()
                .iter()
                .filter(|value| !value.is_undefined())
                .cloned()
                .collect();
            if nullable {
                possible.insert(Constant::Null);
            }
            if let Some(existing) = c_domains.domain(c_member) {
                possible.extend(existing.possible().iter().cloned());
            }
            c_domains.insert(c_member.clone(), Domain::closed(possible));
        }
    }
}

/// Compile a host-written where-clause into a domain-constraint condition.
pub(crate) fn compile_condition(
    raw: &RawCondition,
    domains: &MemberDomainMap,
) -> Result<BoolExpression, Error> {
    for term in raw.terms() {
        if domains.domain(&term.member).is_none() {
            return Err(Error::invalid_metadata(format!(
                "no domain for condition member `{}`",
                term.member
            )));
        }
    }
    Ok(raw.map_terms(&|term| {
        let Some(domain) = domains.domain(&term.member) else {
            // checked above
            return BoolExpr::make_false();
        };
        match term.kind {
            RestrictionKind::Scalar => {
                scalar_condition(&term.member, term.values.iter().cloned(), domain)
            }
            RestrictionKind::Type => {
                type_condition(&term.member, term.values.iter().cloned(), domain)
            }
        }
    }))
}

#[cfg(test)]
mod test {
    use super::{ViewgenConfig, ViewgenContext};
    use crate::boolean::BoolExpr;
    use crate::mapping::cell::{Cell, CellQuery, MemberCondition, ProjectedSlot};
    use crate::metadata::{Constant, EntityType, Extent, Member, MemberPath, Schema};

    fn schema() -> Schema {
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
        schema.add_type(
            EntityType::new("PersonRow")
                .with_member(Member::key("Id", "Int32"))
                .with_member(Member::new("Discriminator", "String", false))
                .with_member(Member::new("Rating", "Int32", true)),
        );
        schema.add_extent(Extent::entity_set("Persons", "Person"));
        schema.add_extent(Extent::entity_set("PersonRows", "PersonRow"));
        schema
    }

    fn cells() -> Vec<Cell> {
        let discriminator = MemberPath::member("PersonRows", "Discriminator");
        let person_cell = Cell::new(
            0,
            CellQuery::new(
                "Persons",
                vec![ProjectedSlot::Member(MemberPath::member("Persons", "Id"))],
                BoolExpr::make_term(MemberCondition::is_of_type(
                    MemberPath::extent_root("Persons"),
                    ["Person"],
                )),
            ),
            CellQuery::new(
                "PersonRows",
                vec![ProjectedSlot::Member(MemberPath::member("PersonRows", "Id"))],
                BoolExpr::make_term(MemberCondition::equals(
                    discriminator.clone(),
                    Constant::value("P"),
                )),
            ),
        );
        let customer_cell = Cell::new(
            1,
            CellQuery::new(
                "Persons",
                vec![ProjectedSlot::Member(MemberPath::member("Persons", "Id"))],
                BoolExpr::make_term(MemberCondition::is_of_type(
                    MemberPath::extent_root("Persons"),
                    ["Customer"],
                )),
            ),
            CellQuery::new(
                "PersonRows",
                vec![ProjectedSlot::Member(MemberPath::member("PersonRows", "Id"))],
                BoolExpr::make_term(MemberCondition::equals(
                    discriminator,
                    Constant::value("C"),
                )),
            ),
        );
        vec![person_cell, customer_cell]
    }

    #[test]
    fn computes_condition_member_domains() {
        let schema = schema();
        let context =
            ViewgenContext::new(&schema, "Persons", cells(), ViewgenConfig::default())
                .expect("valid mapping");

        let discriminator = MemberPath::member("PersonRows", "Discriminator");
        let domain = context
            .s_domains()
            .domain(&discriminator)
            .expect("condition member has a domain");
        assert!(domain.contains(&Constant::value("P")));
        assert!(domain.contains(&Constant::value("C")));
        // non-nullable column: no NULL, but an "anything else" bucket
        assert!(!domain.contains(&Constant::Null));
        assert!(domain.values().any(Constant::is_negated));

        let root = MemberPath::extent_root("Persons");
        let type_domain = context.c_domains().domain(&root).expect("type domain");
        assert!(type_domain.contains(&Constant::type_of("Person")));
        assert!(type_domain.contains(&Constant::type_of("Customer")));
    }

    #[test]
    fn compiles_wrapper_views() {
        let schema = schema();
        let context =
            ViewgenContext::new(&schema, "Persons", cells(), ViewgenConfig::default())
                .expect("valid mapping");
        assert_eq!(context.wrappers().len(), 2);
        assert_eq!(context.storage_extents(), vec!["PersonRows".to_owned()]);

        let wrapper = &context.wrappers()[0];
        assert_eq!(wrapper.fragment_view().label(), Some("V0"));
        assert!(wrapper
            .fragment_view()
            .condition()
            .to_string()
            .contains("Discriminator"));
        assert!(context.wrapper_by_label("V1").is_some());
        assert!(context.wrapper_by_label("V9").is_none());
    }

    #[test]
    fn rejects_cells_for_a_different_extent() {
        let schema = schema();
        let mut misplaced = cells();
        misplaced.push(Cell::new(
            2,
            CellQuery::new("Orders", vec![], BoolExpr::make_true()),
            CellQuery::new("OrderRows", vec![], BoolExpr::make_true()),
        ));
        assert!(
            ViewgenContext::new(&schema, "Persons", misplaced, ViewgenConfig::default())
                .is_err()
        );
    }

    #[test]
    fn rejects_mixed_restriction_kinds() {
        let schema = schema();
        let member = MemberPath::member("PersonRows", "Discriminator");
        let cell = Cell::new(
            0,
            CellQuery::new("Persons", vec![], BoolExpr::make_true()),
            CellQuery::new(
                "PersonRows",
                vec![],
                BoolExpr::make_and([
                    BoolExpr::make_term(MemberCondition::equals(
                        member.clone(),
                        Constant::value("P"),
                    )),
                    BoolExpr::make_term(MemberCondition::is_of_type(member, ["Person"])),
                ]),
            ),
        );
        assert!(
            ViewgenContext::new(&schema, "Persons", vec![cell], ViewgenConfig::default())
                .is_err()
        );
    }
}
