//! Shared fixtures: a small blog schema and fresh stores

#![allow(dead_code)]

use serde_json::Value;
use tablegate::compile::Compiled;
use tablegate::schema::RelationshipKind;
use tablegate::{
    compile_permission, Backend, BoolExpCompiler, Catalog, ColumnType, CompileContext, MetadataStore,
    OperationClause, PermKind, PermissionCache, ReturnShape, TableDef,
};
use tempfile::TempDir;

pub const MAP_SIZE: usize = 16 << 20;

pub fn articles() -> TableDef {
    TableDef::new("articles")
        .column("id", ColumnType::Integer)
        .column("title", ColumnType::Text)
        .column("body", ColumnType::Text)
        .column("author_id", ColumnType::Integer)
        .column("published", ColumnType::Boolean)
        .relationship("author", RelationshipKind::Object, "authors")
        .computed_field("word_count", ReturnShape::Scalar { scalar: ColumnType::Integer })
        .computed_field("related_articles", ReturnShape::SetOfRows { table: "articles".into() })
}

pub fn catalog() -> Catalog {
    Catalog::new()
        .with_table(articles())
        .with_table(
            TableDef::new("authors")
                .column("id", ColumnType::Integer)
                .column("name", ColumnType::Text)
                .relationship("articles", RelationshipKind::Array, "articles"),
        )
        .with_table(
            TableDef::new("drafts")
                .column("id", ColumnType::Integer)
                .column("title", ColumnType::Text)
                .column("author_id", ColumnType::Integer),
        )
}

pub fn cache() -> PermissionCache {
    PermissionCache::new().with_backend("default", Backend::with_catalog(catalog()))
}

/// Fresh store in its own temp dir; keep the dir alive for the test
pub fn store() -> (TempDir, MetadataStore) {
    let dir = TempDir::new().unwrap();
    let store = MetadataStore::open_with_map_size(dir.path(), MAP_SIZE).unwrap();
    (dir, store)
}

pub fn clause(kind: PermKind, doc: Value) -> OperationClause {
    OperationClause::from_value(kind, doc).unwrap()
}

/// Compile one clause against the fixture catalog
pub fn compile(table: &str, kind: PermKind, doc: Value) -> tablegate::Result<Compiled> {
    let catalog = catalog();
    let ctx = CompileContext { source: "default", schema: &catalog, predicates: &BoolExpCompiler };
    compile_permission(&ctx, table, &clause(kind, doc))
}
