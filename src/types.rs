//! Permission data model: raw definitions, compiled descriptors, dependency edges

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::boolexp::BoolExp;
use crate::schema::ColumnType;

pub type SourceName = String;
pub type TableName = String;
pub type RoleName = String;
pub type ColumnName = String;
pub type FieldName = String;

/// Raw, uncompiled boolean expression document
pub type Predicate = Value;

/// Column name -> raw preset value (literal or session-variable reference)
pub type ColumnPresets = BTreeMap<ColumnName, Value>;

// ============================================================================
// Operation kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermKind {
    Insert,
    Select,
    Update,
    Delete,
}

impl PermKind {
    pub const ALL: [PermKind; 4] = [PermKind::Insert, PermKind::Select, PermKind::Update, PermKind::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            PermKind::Insert => "insert",
            PermKind::Select => "select",
            PermKind::Update => "update",
            PermKind::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        PermKind::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl fmt::Display for PermKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Raw definitions
// ============================================================================

/// Either every column of the table (`"*"`) or an explicit list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSpec {
    All,
    Columns(Vec<ColumnName>),
}

impl ColumnSpec {
    pub fn columns<I: IntoIterator<Item = S>, S: Into<String>>(cols: I) -> Self {
        ColumnSpec::Columns(cols.into_iter().map(Into::into).collect())
    }
}

impl Serialize for ColumnSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ColumnSpec::All => serializer.serialize_str("*"),
            ColumnSpec::Columns(cols) => cols.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ColumnSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        use serde::de::{self, SeqAccess, Visitor};

        struct ColumnSpecVisitor;

        impl<'de> Visitor<'de> for ColumnSpecVisitor {
            type Value = ColumnSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("\"*\" or a list of column names")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<ColumnSpec, E> {
                if v == "*" {
                    Ok(ColumnSpec::All)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<ColumnSpec, A::Error> {
                let mut cols = Vec::new();
                while let Some(c) = seq.next_element::<String>()? {
                    cols.push(c);
                }
                Ok(ColumnSpec::Columns(cols))
            }
        }

        deserializer.deserialize_any(ColumnSpecVisitor)
    }
}

fn empty_predicate() -> Predicate {
    Value::Object(Default::default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsPermDef {
    #[serde(default = "empty_predicate")]
    pub check: Predicate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<ColumnPresets>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<ColumnSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_only: Option<bool>,
}

/// Root fields a select permission may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootField {
    Select,
    SelectByPk,
    SelectAggregate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelPermDef {
    pub columns: ColumnSpec,
    #[serde(default = "empty_predicate")]
    pub filter: Predicate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default)]
    pub allow_aggregations: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub computed_fields: Vec<FieldName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_root_fields: Option<Vec<RootField>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_root_fields: Option<Vec<RootField>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdPermDef {
    pub columns: ColumnSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<ColumnPresets>,
    #[serde(default = "empty_predicate")]
    pub filter: Predicate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelPermDef {
    #[serde(default = "empty_predicate")]
    pub filter: Predicate,
}

/// The per-kind body of a permission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationClause {
    Insert(InsPermDef),
    Select(SelPermDef),
    Update(UpdPermDef),
    Delete(DelPermDef),
}

impl OperationClause {
    pub fn kind(&self) -> PermKind {
        match self {
            OperationClause::Insert(_) => PermKind::Insert,
            OperationClause::Select(_) => PermKind::Select,
            OperationClause::Update(_) => PermKind::Update,
            OperationClause::Delete(_) => PermKind::Delete,
        }
    }

    /// Parse the clause body of a command for a known kind
    pub fn from_value(kind: PermKind, value: Value) -> serde_json::Result<Self> {
        Ok(match kind {
            PermKind::Insert => OperationClause::Insert(serde_json::from_value(value)?),
            PermKind::Select => OperationClause::Select(serde_json::from_value(value)?),
            PermKind::Update => OperationClause::Update(serde_json::from_value(value)?),
            PermKind::Delete => OperationClause::Delete(serde_json::from_value(value)?),
        })
    }
}

/// One role-scoped permission on one table for one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    pub role: RoleName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(rename = "permission")]
    pub clause: OperationClause,
}

impl PermissionDefinition {
    pub fn new(role: impl Into<RoleName>, clause: OperationClause) -> Self {
        PermissionDefinition { role: role.into(), comment: None, clause }
    }

    pub fn kind(&self) -> PermKind {
        self.clause.kind()
    }
}

// ============================================================================
// Compiled descriptors
// ============================================================================

/// Session-variable name; compared case-insensitively, spelling preserved
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionVariable(String);

impl SessionVariable {
    pub fn new(name: impl Into<String>) -> Self {
        SessionVariable(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn folded(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl PartialEq for SessionVariable {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for SessionVariable {}

impl PartialOrd for SessionVariable {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SessionVariable {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.folded().cmp(&other.folded())
    }
}

impl std::hash::Hash for SessionVariable {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.folded().hash(state)
    }
}

impl fmt::Display for SessionVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type RequiredHeaders = BTreeSet<SessionVariable>;

/// Server-supplied column value, resolved against the column's type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresetValue {
    Literal { value: Value, column_type: ColumnType },
    SessionVariable { name: SessionVariable, column_type: ColumnType },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsPermInfo {
    pub columns: BTreeSet<ColumnName>,
    pub check: BoolExp,
    pub set: BTreeMap<ColumnName, PresetValue>,
    pub backend_only: bool,
    pub required_headers: RequiredHeaders,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelPermInfo {
    pub columns: BTreeSet<ColumnName>,
    /// Scalar computed fields with their return types
    pub computed_fields: BTreeMap<FieldName, ColumnType>,
    pub filter: BoolExp,
    pub limit: Option<u64>,
    pub allow_aggregations: bool,
    pub query_root_fields: Option<Vec<RootField>>,
    pub subscription_root_fields: Option<Vec<RootField>>,
    pub required_headers: RequiredHeaders,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdPermInfo {
    pub columns: BTreeSet<ColumnName>,
    pub filter: BoolExp,
    pub check: BoolExp,
    pub set: BTreeMap<ColumnName, PresetValue>,
    pub required_headers: RequiredHeaders,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelPermInfo {
    pub filter: BoolExp,
    pub required_headers: RequiredHeaders,
}

/// What a query compiler needs to enforce one permission
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompiledPermissionDescriptor {
    Insert(InsPermInfo),
    Select(SelPermInfo),
    Update(UpdPermInfo),
    Delete(DelPermInfo),
}

impl CompiledPermissionDescriptor {
    pub fn kind(&self) -> PermKind {
        match self {
            CompiledPermissionDescriptor::Insert(_) => PermKind::Insert,
            CompiledPermissionDescriptor::Select(_) => PermKind::Select,
            CompiledPermissionDescriptor::Update(_) => PermKind::Update,
            CompiledPermissionDescriptor::Delete(_) => PermKind::Delete,
        }
    }

    pub fn required_headers(&self) -> &RequiredHeaders {
        match self {
            CompiledPermissionDescriptor::Insert(i) => &i.required_headers,
            CompiledPermissionDescriptor::Select(s) => &s.required_headers,
            CompiledPermissionDescriptor::Update(u) => &u.required_headers,
            CompiledPermissionDescriptor::Delete(d) => &d.required_headers,
        }
    }

    /// Resolved column set; delete has none
    pub fn columns(&self) -> Option<&BTreeSet<ColumnName>> {
        match self {
            CompiledPermissionDescriptor::Insert(i) => Some(&i.columns),
            CompiledPermissionDescriptor::Select(s) => Some(&s.columns),
            CompiledPermissionDescriptor::Update(u) => Some(&u.columns),
            CompiledPermissionDescriptor::Delete(_) => None,
        }
    }

    pub fn as_insert(&self) -> Option<&InsPermInfo> {
        match self {
            CompiledPermissionDescriptor::Insert(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_select(&self) -> Option<&SelPermInfo> {
        match self {
            CompiledPermissionDescriptor::Select(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_update(&self) -> Option<&UpdPermInfo> {
        match self {
            CompiledPermissionDescriptor::Update(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_delete(&self) -> Option<&DelPermInfo> {
        match self {
            CompiledPermissionDescriptor::Delete(d) => Some(d),
            _ => None,
        }
    }
}

// ============================================================================
// Dependencies
// ============================================================================

/// Schema object a permission relies on, within `DependencyEdge::table`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum DepTarget {
    Table,
    Column(ColumnName),
    ComputedField(FieldName),
    Relationship(String),
}

/// Why the edge exists; lets the cache skip rebuilds on value-only changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepReason {
    /// The table must keep existing
    Table,
    /// Referenced by name only (column lists)
    Untyped,
    /// Compared with a literal; legality depends on the declared type
    TypeDerived,
    /// Compared with or set from a session variable
    SessionVariable,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: SourceName,
    pub table: TableName,
    pub target: DepTarget,
    pub reason: DepReason,
}

impl DependencyEdge {
    pub fn new(source: &str, table: &str, target: DepTarget, reason: DepReason) -> Self {
        DependencyEdge { source: source.to_string(), table: table.to_string(), target, reason }
    }
}

/// Addressable unit for rebuild scoping and consistency tracking
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetadataObjId {
    pub source: SourceName,
    pub table: TableName,
    pub role: RoleName,
    pub kind: PermKind,
}

impl MetadataObjId {
    pub fn new(source: &str, table: &str, role: &str, kind: PermKind) -> Self {
        MetadataObjId { source: source.to_string(), table: table.to_string(), role: role.to_string(), kind }
    }
}

impl fmt::Display for MetadataObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} permission on {:?} for role {:?} in source {:?}", self.kind, self.table, self.role, self.source)
    }
}
