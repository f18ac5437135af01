//! End-to-end runs of the full pipeline: mapping cells in, compiled
//! rewritings and validation verdicts out.

use quilt::error::{Error, ViewGenErrorKind};
use quilt::mapping::{
    Cell, CellQuery, MemberCondition, ProjectedSlot, QueryRewriter, ViewgenConfig, ViewgenContext,
};
use quilt::metadata::{Constant, EntityType, Extent, Member, MemberPath, Schema};
use quilt::boolean::BoolExpr;
use quilt::validation::{NoPatternMatcher, RewritingValidator};

/// Person/Customer/Employee hierarchy stored in one table with a
/// discriminator column.
fn tph_schema(kind_nullable: bool) -> Schema {
    let mut schema = Schema::new();
    schema.add_type(
        EntityType::new("Person")
            .with_member(Member::key("Id", "Int32"))
            .with_member(Member::new("Kind", "String", kind_nullable)),
    );
    schema.add_type(EntityType::derived("Customer", "Person"));
    schema.add_type(EntityType::derived("Employee", "Person"));
    schema.add_type(
        EntityType::new("PersonRow")
            .with_member(Member::key("Id", "Int32"))
            .with_member(Member::new("Discriminator", "String", false)),
    );
    schema.add_extent(Extent::entity_set("Persons", "Person"));
    schema.add_extent(Extent::entity_set("PersonRows", "PersonRow"));
    schema
}

fn type_cell(id: usize, type_name: &str, discriminator: &str, project_kind: bool) -> Cell {
    let mut c_projection = vec![ProjectedSlot::Member(MemberPath::member("Persons", "Id"))];
    let mut s_projection = vec![ProjectedSlot::Member(MemberPath::member("PersonRows", "Id"))];
    if project_kind {
        c_projection.push(ProjectedSlot::Member(MemberPath::member("Persons", "Kind")));
        s_projection.push(ProjectedSlot::Member(MemberPath::member(
            "PersonRows",
            "Discriminator",
        )));
    }
    Cell::new(
        id,
        CellQuery::new(
            "Persons",
            c_projection,
            BoolExpr::make_term(MemberCondition::is_of_type(
                MemberPath::extent_root("Persons"),
                [type_name],
            )),
        ),
        CellQuery::new(
            "PersonRows",
            s_projection,
            BoolExpr::make_term(MemberCondition::equals(
                MemberPath::member("PersonRows", "Discriminator"),
                Constant::value(discriminator),
            )),
        ),
    )
}

fn validate(schema: &Schema, cells: Vec<Cell>) -> Result<(), Error> {
    let context = ViewgenContext::new(schema, "Persons", cells, ViewgenConfig::default())?;
    let rewriter = QueryRewriter::new(&context);
    RewritingValidator::new(&context, &rewriter, &NoPatternMatcher).validate()
}

fn error_kinds(result: Result<(), Error>) -> Vec<ViewGenErrorKind> {
    match result {
        Err(Error::MappingFailure(log)) => log.records().iter().map(|record| record.kind()).collect(),
        Err(other) => panic!("expected a mapping failure, got {other}"),
        Ok(()) => panic!("expected a mapping failure, mapping validated cleanly"),
    }
}

#[test]
fn tph_mapping_validates_cleanly() {
    _ = env_logger::builder().is_test(true).try_init();

    let schema = tph_schema(false);
    let cells = vec![
        type_cell(0, "Person", "P", false),
        type_cell(1, "Customer", "C", false),
        type_cell(2, "Employee", "E", false),
    ];
    assert!(validate(&schema, cells).is_ok());
}

#[test]
fn projected_discriminator_violates_domain_constraint() {
    _ = env_logger::builder().is_test(true).try_init();

    // Discriminator is exposed as the regular property Kind, but nothing
    // ties Kind's value to the entity type on the conceptual side.
    let schema = tph_schema(false);
    let cells = vec![
        type_cell(0, "Person", "P", true),
        type_cell(1, "Customer", "C", true),
    ];
    let kinds = error_kinds(validate(&schema, cells));
    assert!(kinds.contains(&ViewGenErrorKind::DomainConstraintViolation));
}

#[test]
fn shared_discriminator_value_violates_partition_constraint() {
    _ = env_logger::builder().is_test(true).try_init();

    // Both types map to Discriminator = "P": the store cannot tell the
    // fragments apart.
    let schema = tph_schema(false);
    let cells = vec![
        type_cell(0, "Person", "P", false),
        type_cell(1, "Customer", "P", false),
    ];
    let kinds = error_kinds(validate(&schema, cells));
    assert!(kinds.contains(&ViewGenErrorKind::PartitionConstraintViolation));
}

fn flat_schema(c_name_nullable: bool) -> Schema {
    let mut schema = Schema::new();
    schema.add_type(
        EntityType::new("Person")
            .with_member(Member::key("Id", "Int32"))
            .with_member(Member::new("Name", "String", c_name_nullable)),
    );
    schema.add_type(
        EntityType::new("PersonRow")
            .with_member(Member::key("Id", "Int32"))
            .with_member(Member::new("Name", "String", false)),
    );
    schema.add_extent(Extent::entity_set("Persons", "Person"));
    schema.add_extent(Extent::entity_set("PersonRows", "PersonRow"));
    schema
}

fn flat_cell() -> Cell {
    Cell::new(
        0,
        CellQuery::new(
            "Persons",
            vec![
                ProjectedSlot::Member(MemberPath::member("Persons", "Id")),
                ProjectedSlot::Member(MemberPath::member("Persons", "Name")),
            ],
            BoolExpr::make_true(),
        ),
        CellQuery::new(
            "PersonRows",
            vec![
                ProjectedSlot::Member(MemberPath::member("PersonRows", "Id")),
                ProjectedSlot::Member(MemberPath::member("PersonRows", "Name")),
            ],
            BoolExpr::make_true(),
        ),
    )
}

#[test]
fn nullable_member_mapped_to_non_nullable_column_is_rejected() {
    _ = env_logger::builder().is_test(true).try_init();

    let schema = flat_schema(true);
    let kinds = error_kinds(validate(&schema, vec![flat_cell()]));
    assert_eq!(
        kinds,
        [ViewGenErrorKind::NullableMappingForNonNullableColumn]
    );
}

#[test]
fn non_nullable_member_mapped_to_non_nullable_column_is_accepted() {
    _ = env_logger::builder().is_test(true).try_init();

    let schema = flat_schema(false);
    assert!(validate(&schema, vec![flat_cell()]).is_ok());
}
