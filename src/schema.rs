//! Table catalog lookups consumed by the permission compiler
//!
//! The compiler only ever talks to a [`SchemaAccessor`]; each backend supplies
//! its own. [`Catalog`] is the in-memory implementation used by the server and
//! the tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{ColumnName, FieldName, TableName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Numeric,
    Text,
    Boolean,
    Uuid,
    Timestamp,
    Json,
}

/// What a computed field returns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReturnShape {
    Scalar { scalar: ColumnType },
    /// A to-many relationship onto `table`
    SetOfRows { table: TableName },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Object,
    Array,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipInfo {
    pub remote_table: TableName,
    pub kind: RelationshipKind,
}

/// Read-only view of one source's tables
pub trait SchemaAccessor: Send + Sync {
    fn table_exists(&self, table: &str) -> bool;

    fn resolve_column(&self, table: &str, name: &str) -> Option<ColumnType>;

    fn resolve_computed_field(&self, table: &str, name: &str) -> Option<ReturnShape>;

    fn resolve_relationship(&self, table: &str, name: &str) -> Option<RelationshipInfo>;

    /// All columns in declaration order
    fn columns(&self, table: &str) -> Vec<(ColumnName, ColumnType)>;
}

// ============================================================================
// In-memory catalog
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: ColumnName,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDef {
    pub name: String,
    #[serde(flatten)]
    pub info: RelationshipInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedFieldDef {
    pub name: FieldName,
    pub returns: ReturnShape,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: TableName,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
    #[serde(default)]
    pub computed_fields: Vec<ComputedFieldDef>,
}

impl TableDef {
    pub fn new(name: impl Into<TableName>) -> Self {
        TableDef { name: name.into(), columns: Vec::new(), relationships: Vec::new(), computed_fields: Vec::new() }
    }

    pub fn column(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef { name: name.to_string(), column_type });
        self
    }

    pub fn relationship(mut self, name: &str, kind: RelationshipKind, remote_table: &str) -> Self {
        self.relationships.push(RelationshipDef {
            name: name.to_string(),
            info: RelationshipInfo { remote_table: remote_table.to_string(), kind },
        });
        self
    }

    pub fn computed_field(mut self, name: &str, returns: ReturnShape) -> Self {
        self.computed_fields.push(ComputedFieldDef { name: name.to_string(), returns });
        self
    }
}

/// Tables of one source, keyed by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, with = "table_list")]
    tables: HashMap<TableName, TableDef>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: TableDef) -> Self {
        self.add_table(table);
        self
    }

    pub fn add_table(&mut self, table: TableDef) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn remove_table(&mut self, name: &str) -> Option<TableDef> {
        self.tables.remove(name)
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableDef> {
        self.tables.get_mut(name)
    }
}

impl SchemaAccessor for Catalog {
    fn table_exists(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    fn resolve_column(&self, table: &str, name: &str) -> Option<ColumnType> {
        self.table(table)?.columns.iter().find(|c| c.name == name).map(|c| c.column_type)
    }

    fn resolve_computed_field(&self, table: &str, name: &str) -> Option<ReturnShape> {
        self.table(table)?.computed_fields.iter().find(|c| c.name == name).map(|c| c.returns.clone())
    }

    fn resolve_relationship(&self, table: &str, name: &str) -> Option<RelationshipInfo> {
        self.table(table)?.relationships.iter().find(|r| r.name == name).map(|r| r.info.clone())
    }

    fn columns(&self, table: &str) -> Vec<(ColumnName, ColumnType)> {
        self.table(table)
            .map(|t| t.columns.iter().map(|c| (c.name.clone(), c.column_type)).collect())
            .unwrap_or_default()
    }
}

/// Catalog files list tables as an array; lookups want a map
mod table_list {
    use std::collections::HashMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::TableDef;

    pub fn serialize<S: Serializer>(tables: &HashMap<String, TableDef>, s: S) -> Result<S::Ok, S::Error> {
        let mut list: Vec<&TableDef> = tables.values().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<HashMap<String, TableDef>, D::Error> {
        let list = Vec::<TableDef>::deserialize(d)?;
        Ok(list.into_iter().map(|t| (t.name.clone(), t)).collect())
    }
}
