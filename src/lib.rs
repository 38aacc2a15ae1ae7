//! tablegate - role-based table permissions
//!
//! Validates and compiles per-role insert/select/update/delete permissions
//! against a table schema, extracts the schema objects each one depends on,
//! persists them in an LMDB-backed metadata store and decides backend-only
//! insert visibility per request.
//!
//! ```no_run
//! use serde_json::json;
//! use tablegate::{
//!     create_permission, Backend, Catalog, ColumnType, MetadataStore, OperationClause, PermKind,
//!     PermissionCache, TableDef,
//! };
//!
//! # fn main() -> tablegate::Result<()> {
//! let catalog = Catalog::new().with_table(
//!     TableDef::new("articles")
//!         .column("id", ColumnType::Integer)
//!         .column("author_id", ColumnType::Integer),
//! );
//! let store = MetadataStore::open("./data")?;
//! let mut cache = PermissionCache::new().with_backend("default", Backend::with_catalog(catalog));
//!
//! let clause = OperationClause::from_value(
//!     PermKind::Select,
//!     json!({"columns": "*", "filter": {"author_id": {"_eq": "X-Hasura-User-Id"}}}),
//! )?;
//! let outcome = create_permission(&store, &mut cache, "default", "articles", "user", clause, None)?;
//! assert!(outcome.is_consistent());
//! # Ok(())
//! # }
//! ```

pub mod boolexp;
pub mod cache;
pub mod command;
pub mod compile;
pub mod config;
pub mod constants;
pub mod db;
pub mod deps;
pub mod error;
pub mod gate;
pub mod keys;
pub mod metadata;
pub mod mutate;
pub mod schema;
#[cfg(feature = "server")]
pub mod server;
pub mod tx;
pub mod types;

pub use boolexp::{BoolExp, BoolExpCompiler, CompiledPredicate, PredicateCompiler};
pub use cache::{Backend, InconsistentObject, Invalidation, PermissionCache, RebuildReport, SchemaCache};
pub use command::run_command;
pub use compile::{compile_permission, CompileContext};
pub use db::{MetadataStore, MetadataView};
pub use error::{ErrorCode, PermError, Result};
pub use gate::{backend_only_visible, GateInput};
pub use metadata::{RoleMap, TableMetadata};
pub use mutate::{create_permission, drop_permission, set_permission_comment, MutationOutcome};
pub use schema::{Catalog, ColumnType, ReturnShape, SchemaAccessor, TableDef};
pub use types::*;
