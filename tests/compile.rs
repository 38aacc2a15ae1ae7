//! Permission compilation and dependency extraction

mod support;

use std::collections::BTreeSet;

use serde_json::json;
use support::compile;
use tablegate::{
    BoolExp, ColumnType, DepReason, DepTarget, DependencyEdge, ErrorCode, PermKind, PresetValue, SessionVariable,
};

fn cols(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn headers(names: &[&str]) -> BTreeSet<SessionVariable> {
    names.iter().map(|s| SessionVariable::new(*s)).collect()
}

fn edge(table: &str, target: DepTarget, reason: DepReason) -> DependencyEdge {
    DependencyEdge::new("default", table, target, reason)
}

fn column(name: &str) -> DepTarget {
    DepTarget::Column(name.to_string())
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_select_with_session_filter() {
    let (desc, edges) = compile(
        "articles",
        PermKind::Select,
        json!({
            "columns": ["title", "body"],
            "filter": {"author_id": {"_eq": "X-Hasura-User-Id"}}
        }),
    )
    .unwrap();

    let sel = desc.as_select().unwrap();
    assert_eq!(sel.columns, cols(&["title", "body"]));
    assert_eq!(sel.limit, None);
    assert_eq!(sel.required_headers, headers(&["X-Hasura-User-Id"]));

    let session_edges: Vec<_> = edges.iter().filter(|e| e.reason == DepReason::SessionVariable).collect();
    assert_eq!(session_edges.len(), 1);
    assert_eq!(session_edges[0].target, column("author_id"));
}

#[test]
fn test_insert_preset_removes_column() {
    let (desc, edges) =
        compile("drafts", PermKind::Insert, json!({"check": {}, "set": {"author_id": "X-Hasura-User-Id"}})).unwrap();

    let ins = desc.as_insert().unwrap();
    assert_eq!(ins.columns, cols(&["id", "title"]));
    assert!(!ins.backend_only);
    assert!(ins.check.is_always_true());
    assert_eq!(
        ins.set.get("author_id"),
        Some(&PresetValue::SessionVariable {
            name: SessionVariable::new("X-Hasura-User-Id"),
            column_type: ColumnType::Integer
        })
    );
    assert_eq!(ins.required_headers, headers(&["x-hasura-user-id"]));
    assert_eq!(
        edges,
        vec![
            edge("drafts", DepTarget::Table, DepReason::Table),
            edge("drafts", column("author_id"), DepReason::SessionVariable),
        ]
    );
}

// ============================================================================
// Select rules
// ============================================================================

#[test]
fn test_limit() {
    for bad in [0, -1, -50] {
        let e = compile("articles", PermKind::Select, json!({"columns": "*", "limit": bad})).unwrap_err();
        assert_eq!(e.code(), ErrorCode::InvalidLimit);
        assert_eq!(e.path().as_deref(), Some("permission.limit"));
    }

    let (desc, _) = compile("articles", PermKind::Select, json!({"columns": "*", "limit": 5})).unwrap();
    assert_eq!(desc.as_select().unwrap().limit, Some(5));

    let (desc, _) = compile("articles", PermKind::Select, json!({"columns": "*"})).unwrap();
    assert_eq!(desc.as_select().unwrap().limit, None);
}

#[test]
fn test_scalar_computed_field_accepted() {
    let (desc, edges) =
        compile("articles", PermKind::Select, json!({"columns": ["id"], "computed_fields": ["word_count"]})).unwrap();

    let sel = desc.as_select().unwrap();
    assert_eq!(sel.computed_fields.get("word_count"), Some(&ColumnType::Integer));
    assert_eq!(
        edges.last(),
        Some(&edge("articles", DepTarget::ComputedField("word_count".into()), DepReason::Untyped))
    );
}

#[test]
fn test_set_returning_computed_field_rejected() {
    let e = compile("articles", PermKind::Select, json!({"columns": "*", "computed_fields": ["related_articles"]}))
        .unwrap_err();
    assert_eq!(e.code(), ErrorCode::NotSupported);
    assert_eq!(e.path().as_deref(), Some("permission.computed_fields"));
    assert!(e.to_string().contains("related_articles"));
}

#[test]
fn test_unknown_computed_field() {
    let e = compile("articles", PermKind::Select, json!({"columns": "*", "computed_fields": ["nope"]})).unwrap_err();
    assert_eq!(e.code(), ErrorCode::NotFound);
}

#[test]
fn test_star_columns() {
    let (desc, edges) = compile("articles", PermKind::Select, json!({"columns": "*"})).unwrap();
    assert_eq!(desc.columns().unwrap(), &cols(&["id", "title", "body", "author_id", "published"]));
    // `*` names no column, so only the table edge
    assert_eq!(edges, vec![edge("articles", DepTarget::Table, DepReason::Table)]);
}

#[test]
fn test_aggregate_root_field_needs_aggregations() {
    let e = compile(
        "articles",
        PermKind::Select,
        json!({"columns": "*", "query_root_fields": ["select", "select_aggregate"]}),
    )
    .unwrap_err();
    assert_eq!(e.code(), ErrorCode::ValidationFailed);
    assert_eq!(e.path().as_deref(), Some("permission.query_root_fields"));

    let (desc, _) = compile(
        "articles",
        PermKind::Select,
        json!({"columns": "*", "allow_aggregations": true, "query_root_fields": ["select", "select_aggregate"]}),
    )
    .unwrap();
    assert!(desc.as_select().unwrap().allow_aggregations);
}

// ============================================================================
// Column resolution
// ============================================================================

#[test]
fn test_unknown_column() {
    let e = compile("articles", PermKind::Select, json!({"columns": ["title", "nope"]})).unwrap_err();
    assert_eq!(e.code(), ErrorCode::NotFound);
    assert_eq!(e.path().as_deref(), Some("permission.columns"));
    assert!(e.to_string().contains("\"nope\""));
    assert!(e.to_string().contains("\"articles\""));
}

#[test]
fn test_unknown_preset_column() {
    let e = compile("articles", PermKind::Insert, json!({"set": {"nope": 1}})).unwrap_err();
    assert_eq!(e.code(), ErrorCode::NotFound);
    assert_eq!(e.path().as_deref(), Some("permission.set.nope"));
}

#[test]
fn test_preset_literal_must_fit_type() {
    let e = compile("articles", PermKind::Insert, json!({"set": {"author_id": "abc"}})).unwrap_err();
    assert_eq!(e.code(), ErrorCode::ValidationFailed);
    assert_eq!(e.path().as_deref(), Some("permission.set.author_id"));
}

#[test]
fn test_relationship_in_columns() {
    let e = compile("articles", PermKind::Update, json!({"columns": ["title", "author"]})).unwrap_err();
    assert_eq!(e.code(), ErrorCode::RelationshipNotAllowed);
    assert_eq!(e.path().as_deref(), Some("permission.columns"));

    let e = compile("articles", PermKind::Select, json!({"columns": ["author"]})).unwrap_err();
    assert_eq!(e.code(), ErrorCode::RelationshipNotAllowed);
}

#[test]
fn test_column_partition() {
    let (desc, _) = compile(
        "articles",
        PermKind::Update,
        json!({"columns": "*", "set": {"published": false, "author_id": "X-Hasura-User-Id"}}),
    )
    .unwrap();
    let upd = desc.as_update().unwrap();
    assert_eq!(upd.columns, cols(&["id", "title", "body"]));
    assert!(upd.columns.iter().all(|c| !upd.set.contains_key(c)));

    let (desc, _) = compile(
        "articles",
        PermKind::Insert,
        json!({"columns": ["title", "published"], "set": {"published": true}}),
    )
    .unwrap();
    let ins = desc.as_insert().unwrap();
    assert_eq!(ins.columns, cols(&["title"]));
    assert!(matches!(ins.set.get("published"), Some(PresetValue::Literal { .. })));
}

// ============================================================================
// Predicates and headers
// ============================================================================

#[test]
fn test_header_union() {
    let (desc, _) = compile(
        "articles",
        PermKind::Update,
        json!({
            "columns": ["title"],
            "filter": {"author_id": {"_eq": "X-Hasura-User-Id"}},
            "check": {"_and": [
                {"id": {"_neq": "x-hasura-blocked-id"}},
                {"author_id": {"_eq": "x-hasura-user-id"}}
            ]},
            "set": {"body": "X-Hasura-Signature"}
        }),
    )
    .unwrap();
    assert_eq!(
        desc.required_headers(),
        &headers(&["X-Hasura-User-Id", "X-Hasura-Blocked-Id", "X-Hasura-Signature"])
    );
}

#[test]
fn test_no_headers_without_session_variables() {
    let (desc, _) =
        compile("articles", PermKind::Delete, json!({"filter": {"published": {"_eq": false}}})).unwrap();
    assert!(desc.required_headers().is_empty());
}

#[test]
fn test_edge_order() {
    let (_, edges) = compile(
        "articles",
        PermKind::Update,
        json!({
            "columns": ["body", "title"],
            "filter": {"author_id": {"_eq": "X-Hasura-User-Id"}},
            "check": {"published": {"_eq": true}},
            "set": {"title": "draft"}
        }),
    )
    .unwrap();
    assert_eq!(
        edges,
        vec![
            edge("articles", DepTarget::Table, DepReason::Table),
            edge("articles", column("author_id"), DepReason::SessionVariable),
            edge("articles", column("published"), DepReason::TypeDerived),
            edge("articles", column("title"), DepReason::TypeDerived),
            edge("articles", column("body"), DepReason::Untyped),
            edge("articles", column("title"), DepReason::Untyped),
        ]
    );
}

#[test]
fn test_is_null_is_untyped() {
    let (_, edges) = compile(
        "articles",
        PermKind::Delete,
        json!({"filter": {"_and": [{"body": {"_is_null": false}}, {"title": {"_is_null": true, "_eq": "x"}}]}}),
    )
    .unwrap();
    assert_eq!(
        edges,
        vec![
            edge("articles", DepTarget::Table, DepReason::Table),
            edge("articles", column("body"), DepReason::Untyped),
            edge("articles", column("title"), DepReason::TypeDerived),
        ]
    );
}

#[test]
fn test_duplicate_computed_fields() {
    let (desc, edges) = compile(
        "articles",
        PermKind::Select,
        json!({"columns": ["id"], "computed_fields": ["word_count", "word_count"]}),
    )
    .unwrap();
    assert_eq!(desc.as_select().unwrap().computed_fields.len(), 1);
    let computed = edges.iter().filter(|e| e.target == DepTarget::ComputedField("word_count".into())).count();
    assert_eq!(computed, 1);
}

#[test]
fn test_update_without_check_reuses_filter() {
    let (desc, edges) = compile(
        "articles",
        PermKind::Update,
        json!({"columns": ["title"], "filter": {"author_id": {"_eq": "X-Hasura-User-Id"}}}),
    )
    .unwrap();
    let upd = desc.as_update().unwrap();
    assert_eq!(upd.check, upd.filter);
    assert!(!upd.filter.is_always_true());
    let filter_edges = edges.iter().filter(|e| e.target == column("author_id")).count();
    assert_eq!(filter_edges, 1);
}

#[test]
fn test_relationship_predicate() {
    let (desc, edges) = compile(
        "articles",
        PermKind::Select,
        json!({"columns": ["title"], "filter": {"author": {"name": {"_eq": "ada"}}}}),
    )
    .unwrap();
    assert!(matches!(desc.as_select().unwrap().filter, BoolExp::Relationship { .. }));
    assert_eq!(
        edges,
        vec![
            edge("articles", DepTarget::Table, DepReason::Table),
            edge("articles", DepTarget::Relationship("author".into()), DepReason::Untyped),
            edge("authors", DepTarget::Table, DepReason::Table),
            edge("authors", column("name"), DepReason::TypeDerived),
            edge("articles", column("title"), DepReason::Untyped),
        ]
    );
}

#[test]
fn test_predicate_error_is_located() {
    let e = compile("articles", PermKind::Delete, json!({"filter": {"nope": {"_eq": 1}}})).unwrap_err();
    assert_eq!(e.code(), ErrorCode::PredicateError);
    assert_eq!(e.path().as_deref(), Some("permission.filter.nope"));

    let e = compile("articles", PermKind::Insert, json!({"check": {"id": {"_eq": "one"}}})).unwrap_err();
    assert_eq!(e.code(), ErrorCode::PredicateError);
    assert_eq!(e.path().as_deref(), Some("permission.check.id._eq"));
}

#[test]
fn test_delete_has_no_columns() {
    let (desc, edges) = compile("articles", PermKind::Delete, json!({"filter": {}})).unwrap();
    assert!(desc.columns().is_none());
    assert!(desc.as_delete().unwrap().filter.is_always_true());
    assert_eq!(edges.len(), 1);
}

#[test]
fn test_backend_only_flag() {
    let (desc, _) = compile("articles", PermKind::Insert, json!({"columns": "*", "backend_only": true})).unwrap();
    assert!(desc.as_insert().unwrap().backend_only);
}
