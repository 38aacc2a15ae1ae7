//! Metadata store: an LMDB environment holding permission definitions
//!
//! Layout:
//! - `perms`:  `[source, table, kind, role]` -> JSON `StoredPermission`
//! - `tables`: `[source, table]` -> () (tracked tables)
//! - `meta`:   `next_seq` -> insertion sequence counter
//!
//! LMDB allows one writer at a time, which gives every mutation its
//! whole-step isolation; readers never block.

use std::path::Path;

use heed::types::{Bytes, Str, Unit, U64};
use heed::{Database, Env, EnvOpenOptions, RoTxn};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAP_SIZE, MAX_DBS};
use crate::error::{err, PermError, Result};
use crate::keys::{build_key, parse_key, parse_perm_key, perm_key, source_prefix, table_prefix};
use crate::metadata::TableMetadata;
use crate::tx::Tx;
use crate::types::{MetadataObjId, PermissionDefinition};

pub type DbJson = Database<Bytes, Str>;
pub type DbSet = Database<Bytes, Unit>;
pub type DbU64 = Database<Str, U64<byteorder::BigEndian>>;

/// A definition plus its position in insertion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPermission {
    pub seq: u64,
    pub definition: PermissionDefinition,
}

/// All database handles
pub struct Dbs {
    pub perms: DbJson,
    pub tables: DbSet,
    pub meta: DbU64,
}

/// Read access to persisted definitions, from a snapshot or an open write
pub trait MetadataView {
    fn definition(&self, id: &MetadataObjId) -> Result<Option<PermissionDefinition>>;

    /// Every definition, in insertion order
    fn definitions(&self) -> Result<Vec<(MetadataObjId, PermissionDefinition)>>;
}

/// Exclusively owned handle to the metadata environment
pub struct MetadataStore {
    env: Env,
    dbs: Dbs,
}

impl MetadataStore {
    /// Open (or create) a store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_map_size(path, DEFAULT_MAP_SIZE)
    }

    pub fn open_with_map_size(path: impl AsRef<Path>, map_size: usize) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(err)?;
        // SAFETY: LMDB requires no other processes access this path concurrently during open.
        let env = unsafe { EnvOpenOptions::new().map_size(map_size).max_dbs(MAX_DBS).open(path).map_err(err)? };
        let mut tx = env.write_txn().map_err(err)?;
        let dbs = Dbs {
            perms: env.create_database(&mut tx, Some("perms")).map_err(err)?,
            tables: env.create_database(&mut tx, Some("tables")).map_err(err)?,
            meta: env.create_database(&mut tx, Some("meta")).map_err(err)?,
        };
        tx.commit().map_err(err)?;
        Ok(MetadataStore { env, dbs })
    }

    /// Run `f` in one write transaction; nothing is written unless it returns Ok
    pub fn transact<T, F: FnOnce(&mut Tx) -> Result<T>>(&self, f: F) -> Result<T> {
        let mut tx = Tx::new(self.env.write_txn().map_err(err)?, &self.dbs);
        let r = f(&mut tx)?;
        tx.commit()?;
        Ok(r)
    }

    /// Consistent read snapshot
    pub fn view(&self) -> Result<ReadView<'_>> {
        Ok(ReadView { txn: self.env.read_txn().map_err(err)?, dbs: &self.dbs })
    }

    pub fn get(&self, id: &MetadataObjId) -> Result<Option<PermissionDefinition>> {
        self.view()?.definition(id)
    }

    pub fn is_tracked(&self, source: &str, table: &str) -> Result<bool> {
        let view = self.view()?;
        is_tracked(view.dbs, &view.txn, source, table)
    }

    /// Tracked table names of `source`, sorted
    pub fn tracked_tables(&self, source: &str) -> Result<Vec<String>> {
        let view = self.view()?;
        let mut out = Vec::new();
        for item in view.dbs.tables.prefix_iter(&view.txn, &source_prefix(source)?).map_err(err)? {
            let (k, _) = item.map_err(err)?;
            if let Some([_, table]) = parse_key(k).as_deref() {
                out.push(table.to_string());
            }
        }
        Ok(out)
    }

    /// Every permission of one table, role maps in insertion order
    pub fn table_metadata(&self, source: &str, table: &str) -> Result<TableMetadata> {
        let view = self.view()?;
        let mut meta = TableMetadata::new(source, table);
        for (_, stored) in scan(view.dbs, &view.txn, &table_prefix(source, table)?)? {
            meta.add(stored.definition)
                .map_err(|d| PermError::Storage(format!("duplicate {} permission for role {:?}", d.kind(), d.role)))?;
        }
        Ok(meta)
    }

    /// Permissions of one source (or all sources), in insertion order
    pub fn list_permissions(&self, source: Option<&str>) -> Result<Vec<(MetadataObjId, PermissionDefinition)>> {
        let view = self.view()?;
        let prefix = match source {
            Some(s) => source_prefix(s)?,
            None => Vec::new(),
        };
        Ok(scan(view.dbs, &view.txn, &prefix)?.into_iter().map(|(id, s)| (id, s.definition)).collect())
    }

    /// Drop every permission and tracked table and reset the sequence
    pub fn clear_all(&self) -> Result<()> {
        self.transact(|tx| tx.clear())
    }
}

/// Read-only snapshot of the store
pub struct ReadView<'a> {
    txn: RoTxn<'a>,
    dbs: &'a Dbs,
}

impl MetadataView for ReadView<'_> {
    fn definition(&self, id: &MetadataObjId) -> Result<Option<PermissionDefinition>> {
        Ok(load(self.dbs, &self.txn, id)?.map(|s| s.definition))
    }

    fn definitions(&self) -> Result<Vec<(MetadataObjId, PermissionDefinition)>> {
        Ok(scan(self.dbs, &self.txn, &[])?.into_iter().map(|(id, s)| (id, s.definition)).collect())
    }
}

// ============================================================================
// Shared read helpers (work on read and write transactions)
// ============================================================================

pub(crate) fn load(dbs: &Dbs, tx: &RoTxn, id: &MetadataObjId) -> Result<Option<StoredPermission>> {
    match dbs.perms.get(tx, &perm_key(id)?).map_err(err)? {
        Some(json) => Ok(Some(serde_json::from_str(json)?)),
        None => Ok(None),
    }
}

/// All permissions under `prefix`, ordered by insertion sequence
///
/// An empty prefix scans the whole database; LMDB rejects zero-length keys.
pub(crate) fn scan(dbs: &Dbs, tx: &RoTxn, prefix: &[u8]) -> Result<Vec<(MetadataObjId, StoredPermission)>> {
    let iter: Box<dyn Iterator<Item = heed::Result<(&[u8], &str)>> + '_> = if prefix.is_empty() {
        Box::new(dbs.perms.iter(tx).map_err(err)?)
    } else {
        Box::new(dbs.perms.prefix_iter(tx, prefix).map_err(err)?)
    };
    let mut out = Vec::new();
    for item in iter {
        let (k, v) = item.map_err(err)?;
        let id = parse_perm_key(k).ok_or_else(|| PermError::Storage(format!("malformed permission key {k:?}")))?;
        out.push((id, serde_json::from_str::<StoredPermission>(v)?));
    }
    out.sort_by_key(|(_, s)| s.seq);
    Ok(out)
}

pub(crate) fn is_tracked(dbs: &Dbs, tx: &RoTxn, source: &str, table: &str) -> Result<bool> {
    Ok(dbs.tables.get(tx, &build_key(&[source, table])?).map_err(err)?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OperationClause, PermKind};
    use serde_json::json;

    fn open() -> (tempfile::TempDir, MetadataStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open_with_map_size(dir.path(), 16 << 20).unwrap();
        (dir, store)
    }

    fn delete(role: &str) -> PermissionDefinition {
        let clause = OperationClause::from_value(PermKind::Delete, json!({})).unwrap();
        PermissionDefinition { role: role.to_string(), comment: None, clause }
    }

    fn roles(defs: Vec<(MetadataObjId, PermissionDefinition)>) -> Vec<(String, String)> {
        defs.into_iter().map(|(id, d)| (id.source, d.role)).collect()
    }

    #[test]
    fn test_empty_store() {
        let (_dir, store) = open();
        assert!(store.view().unwrap().definitions().unwrap().is_empty());
        assert!(store.list_permissions(None).unwrap().is_empty());
        assert!(store.transact(|tx| tx.definitions()).unwrap().is_empty());
    }

    #[test]
    fn test_definitions_in_insertion_order() {
        let (_dir, store) = open();
        let ids = [
            MetadataObjId::new("second", "articles", "user", PermKind::Delete),
            MetadataObjId::new("default", "articles", "user", PermKind::Delete),
            MetadataObjId::new("second", "authors", "editor", PermKind::Delete),
        ];
        store
            .transact(|tx| {
                for id in &ids {
                    tx.insert(id, delete(&id.role))?;
                }
                Ok(())
            })
            .unwrap();

        let expected = vec![
            ("second".to_string(), "user".to_string()),
            ("default".to_string(), "user".to_string()),
            ("second".to_string(), "editor".to_string()),
        ];
        assert_eq!(roles(store.view().unwrap().definitions().unwrap()), expected);
        assert_eq!(roles(store.transact(|tx| tx.definitions()).unwrap()), expected);
        assert_eq!(roles(store.list_permissions(Some("second")).unwrap()).len(), 2);
    }

    #[test]
    fn test_clear_all() {
        let (_dir, store) = open();
        let id = MetadataObjId::new("default", "articles", "user", PermKind::Delete);
        store
            .transact(|tx| {
                tx.track_table("default", "articles")?;
                tx.insert(&id, delete("user"))
            })
            .unwrap();

        store.clear_all().unwrap();
        assert!(store.list_permissions(None).unwrap().is_empty());
        assert!(!store.is_tracked("default", "articles").unwrap());
    }
}
