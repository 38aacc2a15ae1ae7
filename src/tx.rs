//! Write-transaction wrapper for metadata mutations

use heed::RwTxn;

use crate::constants::NEXT_SEQ_KEY;
use crate::db::{is_tracked, load, scan, Dbs, MetadataView, StoredPermission};
use crate::error::{err, Result};
use crate::keys::{build_key, perm_key, table_prefix};
use crate::types::{MetadataObjId, PermissionDefinition};

/// One open write transaction; dropped without `commit` it aborts
pub struct Tx<'a> {
    txn: RwTxn<'a>,
    dbs: &'a Dbs,
}

impl<'a> Tx<'a> {
    #[inline]
    pub(crate) fn new(txn: RwTxn<'a>, dbs: &'a Dbs) -> Self {
        Tx { txn, dbs }
    }

    #[inline]
    pub(crate) fn commit(self) -> Result<()> {
        self.txn.commit().map_err(err)
    }

    pub fn exists(&self, id: &MetadataObjId) -> Result<bool> {
        Ok(self.dbs.perms.get(&self.txn, &perm_key(id)?).map_err(err)?.is_some())
    }

    pub fn get(&self, id: &MetadataObjId) -> Result<Option<StoredPermission>> {
        load(self.dbs, &self.txn, id)
    }

    /// Store a definition at the end of the insertion order (replaces any existing entry)
    pub fn insert(&mut self, id: &MetadataObjId, definition: PermissionDefinition) -> Result<()> {
        let seq = self.next_seq()?;
        self.put(id, &StoredPermission { seq, definition })?;
        self.set_next_seq(seq + 1)
    }

    /// Remove a definition; returns whether it existed
    pub fn remove(&mut self, id: &MetadataObjId) -> Result<bool> {
        self.dbs.perms.delete(&mut self.txn, &perm_key(id)?).map_err(err)
    }

    /// Replace only the comment, keeping the insertion position
    pub fn set_comment(&mut self, id: &MetadataObjId, comment: Option<String>) -> Result<bool> {
        let Some(mut stored) = self.get(id)? else {
            return Ok(false);
        };
        stored.definition.comment = comment;
        self.put(id, &stored)?;
        Ok(true)
    }

    pub fn is_tracked(&self, source: &str, table: &str) -> Result<bool> {
        is_tracked(self.dbs, &self.txn, source, table)
    }

    pub fn track_table(&mut self, source: &str, table: &str) -> Result<()> {
        self.dbs.tables.put(&mut self.txn, &build_key(&[source, table])?, &()).map_err(err)
    }

    /// Stop tracking a table, dropping its permissions; returns the dropped ids
    pub fn untrack_table(&mut self, source: &str, table: &str) -> Result<Vec<MetadataObjId>> {
        let dropped: Vec<MetadataObjId> =
            scan(self.dbs, &self.txn, &table_prefix(source, table)?)?.into_iter().map(|(id, _)| id).collect();
        for id in &dropped {
            self.remove(id)?;
        }
        self.dbs.tables.delete(&mut self.txn, &build_key(&[source, table])?).map_err(err)?;
        Ok(dropped)
    }

    pub(crate) fn clear(&mut self) -> Result<()> {
        self.dbs.perms.clear(&mut self.txn).map_err(err)?;
        self.dbs.tables.clear(&mut self.txn).map_err(err)?;
        self.dbs.meta.clear(&mut self.txn).map_err(err)
    }

    fn put(&mut self, id: &MetadataObjId, stored: &StoredPermission) -> Result<()> {
        let json = serde_json::to_string(stored)?;
        self.dbs.perms.put(&mut self.txn, &perm_key(id)?, &json).map_err(err)
    }

    fn next_seq(&self) -> Result<u64> {
        Ok(self.dbs.meta.get(&self.txn, NEXT_SEQ_KEY).map_err(err)?.unwrap_or(1))
    }

    fn set_next_seq(&mut self, seq: u64) -> Result<()> {
        self.dbs.meta.put(&mut self.txn, NEXT_SEQ_KEY, &seq).map_err(err)
    }
}

impl MetadataView for Tx<'_> {
    fn definition(&self, id: &MetadataObjId) -> Result<Option<PermissionDefinition>> {
        Ok(self.get(id)?.map(|s| s.definition))
    }

    fn definitions(&self) -> Result<Vec<(MetadataObjId, PermissionDefinition)>> {
        Ok(scan(self.dbs, &self.txn, &[])?.into_iter().map(|(id, s)| (id, s.definition)).collect())
    }
}
