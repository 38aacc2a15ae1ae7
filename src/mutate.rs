//! Metadata mutations: create, drop and re-comment permissions
//!
//! Each mutation is one write transaction. Uniqueness (or existence) is
//! checked first, before any compile work; the cache is then rebuilt against
//! the uncommitted state and the transaction commits only if that succeeds.
//! A compile failure does not fail the mutation: the object is stored and
//! reported inconsistent.

use tracing::{error, info, warn};

use crate::cache::{InconsistentObject, Invalidation, RebuildReport, SchemaCache};
use crate::constants::ADMIN_ROLE;
use crate::db::MetadataStore;
use crate::error::{ErrorCode, PermError, Result};
use crate::tx::Tx;
use crate::types::{MetadataObjId, OperationClause, PermKind, PermissionDefinition};

/// Result of a successful mutation
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    pub id: MetadataObjId,
    /// Set when the object is stored but did not compile
    pub inconsistent: Option<InconsistentObject>,
}

impl MutationOutcome {
    fn new(id: MetadataObjId, report: &RebuildReport) -> Self {
        let inconsistent = report.for_object(&id).cloned();
        MutationOutcome { id, inconsistent }
    }

    pub fn is_consistent(&self) -> bool {
        self.inconsistent.is_none()
    }
}

/// Add a permission for `role` on `table`
pub fn create_permission(
    store: &MetadataStore,
    cache: &mut dyn SchemaCache,
    source: &str,
    table: &str,
    role: &str,
    clause: OperationClause,
    comment: Option<String>,
) -> Result<MutationOutcome> {
    check_role(role)?;
    require_table(cache, source, table)?;
    let id = MetadataObjId::new(source, table, role, clause.kind());
    let definition = PermissionDefinition { role: role.to_string(), comment, clause };

    let report = run(store, cache, &Invalidation::Object(id.clone()), |tx| {
        if tx.exists(&id)? {
            return Err(PermError::AlreadyExists { kind: id.kind, table: id.table.clone(), role: id.role.clone() });
        }
        tx.insert(&id, definition)
    })?;

    let outcome = MutationOutcome::new(id, &report);
    match &outcome.inconsistent {
        None => info!(object = %outcome.id, "permission created"),
        Some(o) => warn!(object = %outcome.id, reason = %o.reason, "permission created but inconsistent"),
    }
    Ok(outcome)
}

/// Remove the `kind` permission of `role` on `table`
pub fn drop_permission(
    store: &MetadataStore,
    cache: &mut dyn SchemaCache,
    source: &str,
    table: &str,
    role: &str,
    kind: PermKind,
) -> Result<MutationOutcome> {
    require_table(cache, source, table)?;
    let id = MetadataObjId::new(source, table, role, kind);

    let report = run(store, cache, &Invalidation::Full, |tx| {
        if !tx.remove(&id)? {
            return Err(not_defined(&id));
        }
        Ok(())
    })?;

    info!(object = %id, remaining_inconsistent = report.inconsistent.len(), "permission dropped");
    Ok(MutationOutcome { id, inconsistent: None })
}

/// Replace (or clear) the comment of an existing permission
pub fn set_permission_comment(
    store: &MetadataStore,
    cache: &mut dyn SchemaCache,
    source: &str,
    table: &str,
    role: &str,
    kind: PermKind,
    comment: Option<String>,
) -> Result<MutationOutcome> {
    require_table(cache, source, table)?;
    let id = MetadataObjId::new(source, table, role, kind);

    let report = run(store, cache, &Invalidation::Comment(id.clone()), |tx| {
        if !tx.set_comment(&id, comment)? {
            return Err(not_defined(&id));
        }
        Ok(())
    })?;

    info!(object = %id, "permission comment set");
    Ok(MutationOutcome::new(id, &report))
}

/// Start tracking a table that exists in the source's schema
pub fn track_table(store: &MetadataStore, cache: &mut dyn SchemaCache, source: &str, table: &str) -> Result<()> {
    require_table(cache, source, table)?;
    store.transact(|tx| {
        if tx.is_tracked(source, table)? {
            return Err(PermError::ValidationFailed(format!("table {table:?} is already tracked")));
        }
        tx.track_table(source, table)
    })?;
    info!(source, table, "table tracked");
    Ok(())
}

/// Stop tracking a table; its permissions are dropped with it
///
/// Works even when the table has since disappeared from the schema.
pub fn untrack_table(
    store: &MetadataStore,
    cache: &mut dyn SchemaCache,
    source: &str,
    table: &str,
) -> Result<Vec<MetadataObjId>> {
    if cache.schema(source).is_none() {
        return Err(PermError::SourceNotFound(source.to_string()));
    }
    let mut dropped = Vec::new();
    run(store, cache, &Invalidation::Full, |tx| {
        if !tx.is_tracked(source, table)? {
            return Err(PermError::TableNotFound { source_name: source.to_string(), table: table.to_string() });
        }
        dropped = tx.untrack_table(source, table)?;
        Ok(())
    })?;
    info!(source, table, dropped = dropped.len(), "table untracked");
    Ok(dropped)
}

// ============================================================================
// Helpers
// ============================================================================

/// Apply `write`, rebuild the cache on the uncommitted state, then commit
///
/// If the commit itself fails the cache has already seen the change, so it
/// is resynced from the last committed state before the error is returned.
fn run<F>(
    store: &MetadataStore,
    cache: &mut dyn SchemaCache,
    invalidation: &Invalidation,
    write: F,
) -> Result<RebuildReport>
where
    F: FnOnce(&mut Tx) -> Result<()>,
{
    let mut rebuilt = false;
    let result = store.transact(|tx| {
        write(&mut *tx)?;
        rebuilt = true;
        cache.rebuild(&*tx, invalidation)
    });
    if let Err(e) = &result {
        if rebuilt && e.code() == ErrorCode::Storage {
            warn!(error = %e, "write failed after cache rebuild, resyncing cache");
            if let Err(resync) = resync(store, cache) {
                error!(error = %resync, "cache resync failed");
            }
        }
    }
    result
}

fn resync(store: &MetadataStore, cache: &mut dyn SchemaCache) -> Result<()> {
    let view = store.view()?;
    cache.rebuild(&view, &Invalidation::Full)?;
    Ok(())
}

fn check_role(role: &str) -> Result<()> {
    if role.is_empty() {
        return Err(PermError::ValidationFailed("role name must not be empty".into()).at("role"));
    }
    if role == ADMIN_ROLE {
        return Err(PermError::ValidationFailed(format!("{ADMIN_ROLE:?} role has all permissions")).at("role"));
    }
    Ok(())
}

fn require_table(cache: &dyn SchemaCache, source: &str, table: &str) -> Result<()> {
    let schema = cache.schema(source).ok_or_else(|| PermError::SourceNotFound(source.to_string()))?;
    if !schema.table_exists(table) {
        return Err(PermError::TableNotFound { source_name: source.to_string(), table: table.to_string() });
    }
    Ok(())
}

fn not_defined(id: &MetadataObjId) -> PermError {
    PermError::NotDefined { kind: id.kind, table: id.table.clone(), role: id.role.clone() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MetadataView;
    use crate::schema::{Catalog, ColumnType, SchemaAccessor, TableDef};

    /// Fails the in-transaction rebuild with a storage error and the resync with another
    struct BrokenCache {
        catalog: Catalog,
        resyncs: usize,
    }

    impl SchemaCache for BrokenCache {
        fn schema(&self, _source: &str) -> Option<&dyn SchemaAccessor> {
            Some(&self.catalog)
        }

        fn rebuild(&mut self, _view: &dyn MetadataView, invalidation: &Invalidation) -> Result<RebuildReport> {
            match invalidation {
                Invalidation::Full => {
                    self.resyncs += 1;
                    Err(PermError::ValidationFailed("resync".into()))
                }
                _ => Err(PermError::Storage("map full".into())),
            }
        }
    }

    #[test]
    fn test_failed_resync_keeps_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open_with_map_size(dir.path(), 16 << 20).unwrap();
        let catalog = Catalog::new().with_table(TableDef::new("articles").column("id", ColumnType::Integer));
        let mut cache = BrokenCache { catalog, resyncs: 0 };
        let clause = OperationClause::from_value(PermKind::Delete, serde_json::json!({})).unwrap();

        let e = create_permission(&store, &mut cache, "default", "articles", "user", clause, None).unwrap_err();
        assert_eq!(e.code(), ErrorCode::Storage);
        assert_eq!(cache.resyncs, 1);
        assert!(store.list_permissions(None).unwrap().is_empty());
    }

    #[test]
    fn test_admin_role_reserved() {
        let e = check_role("admin").unwrap_err();
        assert_eq!(e.code(), ErrorCode::ValidationFailed);
        assert_eq!(e.path().as_deref(), Some("role"));
        assert!(check_role("user").is_ok());
        assert!(check_role("").is_err());
    }
}
