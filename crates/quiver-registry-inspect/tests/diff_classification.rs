use quiver_registry_inspect::{
    diff_schemas, NoUsageOracle, StaticUsageOracle, UsageSelector,
};
use quiver_registry_model::{ChangeSeverity, SchemaChangeType, TargetId};

fn selector() -> UsageSelector {
    UsageSelector::new(TargetId::new("staging").expect("target id"), 30, 0.0)
}

#[tokio::test]
async fn field_type_change_is_breaking() {
    let changes = diff_schemas(
        Some("type Query { name: String! }"),
        Some("type Query { name: Int! }"),
        &selector(),
        &NoUsageOracle,
    )
    .await
    .expect("diff")
    .expect("both sides parse");

    assert_eq!(changes.len(), 1);
    let change = &changes[0];
    assert_eq!(change.change_type, SchemaChangeType::FieldTypeChanged);
    assert_eq!(change.severity, ChangeSeverity::Breaking);
    assert_eq!(change.path.as_deref(), Some("Query.name"));
    assert!(!change.is_safe_based_on_usage);
}

#[tokio::test]
async fn gaining_non_null_output_is_safe() {
    let changes = diff_schemas(
        Some("type Query { name: String }"),
        Some("type Query { name: String! }"),
        &selector(),
        &NoUsageOracle,
    )
    .await
    .expect("diff")
    .expect("changes");
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].severity, ChangeSeverity::Safe);
}

#[tokio::test]
async fn unused_coordinates_mark_breaking_changes_usage_safe() {
    let oracle = StaticUsageOracle::new(["Query.name".to_string()]);
    let changes = diff_schemas(
        Some("type Query { name: String! other: Int }"),
        Some("type Query { other: Int }"),
        &selector(),
        &oracle,
    )
    .await
    .expect("diff")
    .expect("changes");

    let removed = changes
        .iter()
        .find(|c| c.change_type == SchemaChangeType::FieldRemoved)
        .expect("field removed change");
    assert!(removed.is_safe_based_on_usage);
}

#[tokio::test]
async fn required_argument_addition_is_breaking_optional_is_dangerous() {
    let changes = diff_schemas(
        Some("type Query { user: String }"),
        Some("type Query { user(id: ID!, verbose: Boolean = false): String }"),
        &selector(),
        &NoUsageOracle,
    )
    .await
    .expect("diff")
    .expect("changes");

    let required = changes
        .iter()
        .find(|c| c.path.as_deref() == Some("Query.user.id"))
        .expect("required arg change");
    assert_eq!(required.severity, ChangeSeverity::Breaking);

    let optional = changes
        .iter()
        .find(|c| c.path.as_deref() == Some("Query.user.verbose"))
        .expect("optional arg change");
    assert_eq!(optional.severity, ChangeSeverity::Dangerous);
}

#[tokio::test]
async fn enum_union_and_input_changes_classify() {
    let changes = diff_schemas(
        Some(
            "enum Plan { FREE PAID } union Media = Book | Film \
             type Book { t: String } type Film { n: String } \
             input Filter { limit: Int } type Query { q: Media }",
        ),
        Some(
            "enum Plan { FREE } union Media = Book \
             type Book { t: String } type Film { n: String } \
             input Filter { limit: Int, offset: Int! } type Query { q: Media }",
        ),
        &selector(),
        &NoUsageOracle,
    )
    .await
    .expect("diff")
    .expect("changes");

    let kinds: Vec<(SchemaChangeType, ChangeSeverity)> = changes
        .iter()
        .map(|c| (c.change_type, c.severity))
        .collect();
    assert!(kinds.contains(&(SchemaChangeType::EnumValueRemoved, ChangeSeverity::Breaking)));
    assert!(kinds.contains(&(SchemaChangeType::UnionMemberRemoved, ChangeSeverity::Breaking)));
    assert!(kinds.contains(&(SchemaChangeType::InputFieldAdded, ChangeSeverity::Breaking)));
}

#[tokio::test]
async fn diff_skips_when_a_side_is_missing_or_broken() {
    assert!(diff_schemas(None, Some("type Query { a: Int }"), &selector(), &NoUsageOracle)
        .await
        .expect("diff")
        .is_none());
    assert!(diff_schemas(
        Some("type Query {"),
        Some("type Query { a: Int }"),
        &selector(),
        &NoUsageOracle
    )
    .await
    .expect("diff")
    .is_none());
}

#[tokio::test]
async fn identical_documents_produce_no_changes_and_stable_ids() {
    let sdl = "type Query { me: String follows: [String!] }";
    let none = diff_schemas(Some(sdl), Some(sdl), &selector(), &NoUsageOracle)
        .await
        .expect("diff")
        .expect("changes");
    assert!(none.is_empty());

    let first = diff_schemas(
        Some(sdl),
        Some("type Query { me: String }"),
        &selector(),
        &NoUsageOracle,
    )
    .await
    .expect("diff")
    .expect("changes");
    let second = diff_schemas(
        Some(sdl),
        Some("type Query { me: String }"),
        &selector(),
        &NoUsageOracle,
    )
    .await
    .expect("diff")
    .expect("changes");
    assert_eq!(first, second);
    assert!(!first[0].id.is_empty());
}
