//! Schema-cache boundary and the reference permission cache
//!
//! The mutator only sees [`SchemaCache`]: it hands over what changed and gets
//! back which objects ended up inconsistent. [`PermissionCache`] is the
//! in-process implementation: it owns the compiled descriptors and their
//! dependency edges, and rebuilds them from the metadata store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::boolexp::{BoolExpCompiler, PredicateCompiler};
use crate::compile::{compile_permission, CompileContext};
use crate::db::MetadataView;
use crate::error::{PermError, Result};
use crate::schema::{Catalog, SchemaAccessor};
use crate::types::{
    CompiledPermissionDescriptor, DepReason, DepTarget, DependencyEdge, MetadataObjId, PermissionDefinition,
    SourceName,
};

/// Collaborators for one source
#[derive(Clone)]
pub struct Backend {
    pub schema: Arc<dyn SchemaAccessor>,
    pub predicates: Arc<dyn PredicateCompiler>,
}

impl Backend {
    pub fn new(schema: impl SchemaAccessor + 'static, predicates: impl PredicateCompiler + 'static) -> Self {
        Backend { schema: Arc::new(schema), predicates: Arc::new(predicates) }
    }

    /// In-memory catalog with the reference boolean-expression compiler
    pub fn with_catalog(catalog: Catalog) -> Self {
        Backend::new(catalog, BoolExpCompiler)
    }
}

/// What a metadata change invalidates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// One object was added or replaced
    Object(MetadataObjId),
    /// Anything may have changed (drops can unblock dependents)
    Full,
    /// Only the comment of an object changed
    Comment(MetadataObjId),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InconsistentObject {
    pub id: MetadataObjId,
    pub code: &'static str,
    pub path: Option<String>,
    pub reason: String,
}

impl InconsistentObject {
    fn from_error(id: MetadataObjId, e: &PermError) -> Self {
        InconsistentObject { id, code: e.code().as_str(), path: e.path(), reason: e.root().to_string() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RebuildReport {
    pub inconsistent: Vec<InconsistentObject>,
}

/// The cache layer as seen by the metadata mutator
pub trait SchemaCache {
    /// Schema of `source`, if the source is known
    fn schema(&self, source: &str) -> Option<&dyn SchemaAccessor>;

    /// Apply `invalidation` against `view`, which already reflects the change
    fn rebuild(&mut self, view: &dyn MetadataView, invalidation: &Invalidation) -> Result<RebuildReport>;
}

/// A compiled permission owned by the cache
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPermission {
    pub descriptor: CompiledPermissionDescriptor,
    pub edges: Vec<DependencyEdge>,
    /// Bumped on every metadata change that needs no recompile
    pub version: u64,
}

#[derive(Default)]
pub struct PermissionCache {
    backends: HashMap<SourceName, Backend>,
    entries: HashMap<MetadataObjId, CachedPermission>,
    inconsistent: BTreeMap<MetadataObjId, InconsistentObject>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, source: &str, backend: Backend) -> Self {
        self.set_backend(source, backend);
        self
    }

    /// Register or replace a source; takes effect on the next rebuild
    pub fn set_backend(&mut self, source: &str, backend: Backend) {
        self.backends.insert(source.to_string(), backend);
    }

    pub fn backend(&self, source: &str) -> Option<&Backend> {
        self.backends.get(source)
    }

    pub fn get(&self, id: &MetadataObjId) -> Option<&CachedPermission> {
        self.entries.get(id)
    }

    pub fn descriptor(&self, id: &MetadataObjId) -> Option<&CompiledPermissionDescriptor> {
        self.entries.get(id).map(|e| &e.descriptor)
    }

    pub fn edges(&self, id: &MetadataObjId) -> Option<&[DependencyEdge]> {
        self.entries.get(id).map(|e| e.edges.as_slice())
    }

    pub fn inconsistent(&self) -> impl Iterator<Item = &InconsistentObject> {
        self.inconsistent.values()
    }

    pub fn is_inconsistent(&self, id: &MetadataObjId) -> bool {
        self.inconsistent.contains_key(id)
    }

    /// Objects whose edges reference `target` in `table`, with the edge reason
    pub fn dependents(&self, source: &str, table: &str, target: &DepTarget) -> Vec<(MetadataObjId, DepReason)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .flat_map(|(id, entry)| {
                entry
                    .edges
                    .iter()
                    .filter(|e| e.source == source && e.table == table && &e.target == target)
                    .map(move |e| (id.clone(), e.reason))
            })
            .collect();
        out.sort();
        out.dedup();
        out
    }

    fn compile(&self, id: &MetadataObjId, def: &PermissionDefinition) -> Result<CachedPermission> {
        let backend = self.backends.get(&id.source).ok_or_else(|| PermError::SourceNotFound(id.source.clone()))?;
        if !backend.schema.table_exists(&id.table) {
            return Err(PermError::TableNotFound { source_name: id.source.clone(), table: id.table.clone() });
        }
        let ctx = CompileContext {
            source: &id.source,
            schema: backend.schema.as_ref(),
            predicates: backend.predicates.as_ref(),
        };
        let (descriptor, edges) = compile_permission(&ctx, &id.table, &def.clause)?;
        Ok(CachedPermission { descriptor, edges, version: 0 })
    }

    fn refresh(&mut self, id: &MetadataObjId, def: Option<&PermissionDefinition>) {
        let Some(def) = def else {
            self.entries.remove(id);
            self.inconsistent.remove(id);
            return;
        };
        match self.compile(id, def) {
            Ok(entry) => {
                self.entries.insert(id.clone(), entry);
                self.inconsistent.remove(id);
            }
            Err(e) => {
                warn!(object = %id, error = %e, "permission is inconsistent");
                self.entries.remove(id);
                self.inconsistent.insert(id.clone(), InconsistentObject::from_error(id.clone(), &e));
            }
        }
    }
}

impl SchemaCache for PermissionCache {
    fn schema(&self, source: &str) -> Option<&dyn SchemaAccessor> {
        self.backends.get(source).map(|b| b.schema.as_ref())
    }

    fn rebuild(&mut self, view: &dyn MetadataView, invalidation: &Invalidation) -> Result<RebuildReport> {
        let inconsistent = match invalidation {
            Invalidation::Object(id) => {
                let def = view.definition(id)?;
                self.refresh(id, def.as_ref());
                self.inconsistent.get(id).cloned().into_iter().collect()
            }
            Invalidation::Full => {
                let defs = view.definitions()?;
                self.entries.clear();
                self.inconsistent.clear();
                for (id, def) in &defs {
                    self.refresh(id, Some(def));
                }
                debug!(objects = defs.len(), inconsistent = self.inconsistent.len(), "full permission rebuild");
                self.inconsistent.values().cloned().collect()
            }
            Invalidation::Comment(id) => {
                if let Some(entry) = self.entries.get_mut(id) {
                    entry.version += 1;
                }
                self.inconsistent.get(id).cloned().into_iter().collect()
            }
        };
        Ok(RebuildReport { inconsistent })
    }
}

impl RebuildReport {
    pub fn for_object(&self, id: &MetadataObjId) -> Option<&InconsistentObject> {
        self.inconsistent.iter().find(|o| &o.id == id)
    }
}
