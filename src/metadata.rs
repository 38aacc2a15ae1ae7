//! Per-table permission metadata with deterministic ordering

use serde_json::{json, Map, Value};

use crate::types::{OperationClause, PermKind, PermissionDefinition, RoleName, SourceName, TableName};

/// Role-keyed map that iterates in insertion order
///
/// Lookups are linear; a table rarely carries more than a handful of roles
/// per kind. Order matters only for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleMap<T> {
    entries: Vec<(RoleName, T)>,
}

impl<T> Default for RoleMap<T> {
    fn default() -> Self {
        RoleMap { entries: Vec::new() }
    }
}

impl<T> RoleMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, role: &str) -> Option<&T> {
        self.entries.iter().find(|(r, _)| r == role).map(|(_, v)| v)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.get(role).is_some()
    }

    /// Append `value` for `role`; hands the value back if the role is taken
    pub fn insert(&mut self, role: impl Into<RoleName>, value: T) -> Result<(), T> {
        let role = role.into();
        if self.contains(&role) {
            return Err(value);
        }
        self.entries.push((role, value));
        Ok(())
    }

    pub fn remove(&mut self, role: &str) -> Option<T> {
        let pos = self.entries.iter().position(|(r, _)| r == role)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(r, v)| (r.as_str(), v))
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(r, _)| r.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Every permission of one table, one ordered role map per kind
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub source: SourceName,
    pub table: TableName,
    insert: RoleMap<PermissionDefinition>,
    select: RoleMap<PermissionDefinition>,
    update: RoleMap<PermissionDefinition>,
    delete: RoleMap<PermissionDefinition>,
}

impl TableMetadata {
    pub fn new(source: impl Into<SourceName>, table: impl Into<TableName>) -> Self {
        TableMetadata {
            source: source.into(),
            table: table.into(),
            insert: RoleMap::new(),
            select: RoleMap::new(),
            update: RoleMap::new(),
            delete: RoleMap::new(),
        }
    }

    pub fn permissions(&self, kind: PermKind) -> &RoleMap<PermissionDefinition> {
        match kind {
            PermKind::Insert => &self.insert,
            PermKind::Select => &self.select,
            PermKind::Update => &self.update,
            PermKind::Delete => &self.delete,
        }
    }

    pub fn permissions_mut(&mut self, kind: PermKind) -> &mut RoleMap<PermissionDefinition> {
        match kind {
            PermKind::Insert => &mut self.insert,
            PermKind::Select => &mut self.select,
            PermKind::Update => &mut self.update,
            PermKind::Delete => &mut self.delete,
        }
    }

    pub fn get(&self, kind: PermKind, role: &str) -> Option<&PermissionDefinition> {
        self.permissions(kind).get(role)
    }

    /// Add a definition under its own kind; the definition comes back if the role is taken
    pub fn add(&mut self, def: PermissionDefinition) -> Result<(), PermissionDefinition> {
        let role = def.role.clone();
        self.permissions_mut(def.kind()).insert(role, def)
    }

    pub fn is_empty(&self) -> bool {
        PermKind::ALL.iter().all(|k| self.permissions(*k).is_empty())
    }

    /// Export shape: `{"table": .., "<kind>_permissions": [{role, permission, comment?}]}`
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("table".into(), Value::String(self.table.clone()));
        for kind in PermKind::ALL {
            let perms = self.permissions(kind);
            if perms.is_empty() {
                continue;
            }
            let list = perms.iter().map(|(_, def)| definition_json(def)).collect();
            out.insert(format!("{kind}_permissions"), Value::Array(list));
        }
        Value::Object(out)
    }
}

fn definition_json(def: &PermissionDefinition) -> Value {
    let permission = match &def.clause {
        OperationClause::Insert(d) => serde_json::to_value(d),
        OperationClause::Select(d) => serde_json::to_value(d),
        OperationClause::Update(d) => serde_json::to_value(d),
        OperationClause::Delete(d) => serde_json::to_value(d),
    }
    .unwrap_or(Value::Null);
    let mut entry = json!({ "role": def.role, "permission": permission });
    if let (Some(comment), Some(obj)) = (&def.comment, entry.as_object_mut()) {
        obj.insert("comment".into(), Value::String(comment.clone()));
    }
    entry
}
