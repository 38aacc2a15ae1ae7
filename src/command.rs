//! Metadata command documents
//!
//! `{"type": "create_select_permission", "args": {...}}` and friends. The
//! `pg_` prefix of the familiar metadata API is accepted and ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{InconsistentObject, SchemaCache};
use crate::constants::DEFAULT_SOURCE;
use crate::db::MetadataStore;
use crate::error::{PermError, Result};
use crate::mutate::{self, MutationOutcome};
use crate::types::{OperationClause, PermKind, RoleName, SourceName, TableName};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandDoc {
    #[serde(rename = "type")]
    pub command: String,
    #[serde(default)]
    pub args: Value,
}

/// Table given as a bare name or as `{"schema": .., "name": ..}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TableRef {
    Name(TableName),
    Qualified { schema: Option<String>, name: TableName },
}

impl TableRef {
    /// Qualified names outside `public` are stored as `schema.name`
    pub fn name(&self) -> TableName {
        match self {
            TableRef::Name(n) | TableRef::Qualified { schema: None, name: n } => n.clone(),
            TableRef::Qualified { schema: Some(s), name } if s == "public" => name.clone(),
            TableRef::Qualified { schema: Some(s), name } => format!("{s}.{name}"),
        }
    }
}

fn default_source() -> SourceName {
    DEFAULT_SOURCE.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CreatePermArgs {
    #[serde(default = "default_source")]
    source: SourceName,
    table: TableRef,
    role: RoleName,
    permission: Value,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DropPermArgs {
    #[serde(default = "default_source")]
    source: SourceName,
    table: TableRef,
    role: RoleName,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetCommentArgs {
    #[serde(default = "default_source")]
    source: SourceName,
    table: TableRef,
    role: RoleName,
    #[serde(rename = "permission", alias = "type")]
    kind: PermKind,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableArgs {
    #[serde(default = "default_source")]
    source: SourceName,
    table: TableRef,
}

/// Reply to one command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inconsistent_objects: Vec<InconsistentObject>,
}

impl CommandResponse {
    fn success() -> Self {
        CommandResponse { message: "success", inconsistent_objects: Vec::new() }
    }
}

impl From<MutationOutcome> for CommandResponse {
    fn from(outcome: MutationOutcome) -> Self {
        CommandResponse { message: "success", inconsistent_objects: outcome.inconsistent.into_iter().collect() }
    }
}

/// Parse and run a command document; `bulk` replies with one entry per command
pub fn run_command(store: &MetadataStore, cache: &mut dyn SchemaCache, doc: Value) -> Result<Value> {
    let doc: CommandDoc = serde_json::from_value(doc)?;
    if strip_prefix(&doc.command) == "bulk" {
        let Value::Array(cmds) = doc.args else {
            return Err(PermError::InvalidCommand("bulk args must be a list of commands".into()).at("args"));
        };
        let mut replies = Vec::with_capacity(cmds.len());
        for (i, cmd) in cmds.into_iter().enumerate() {
            replies.push(run_command(store, cache, cmd).map_err(|e| e.at(format!("args[{i}]")))?);
        }
        return Ok(Value::Array(replies));
    }
    let response = run_one(store, cache, &doc.command, doc.args)?;
    Ok(serde_json::to_value(response)?)
}

fn run_one(store: &MetadataStore, cache: &mut dyn SchemaCache, command: &str, args: Value) -> Result<CommandResponse> {
    let command = strip_prefix(command);
    if let Some(kind) = kind_of(command, "create_") {
        let a: CreatePermArgs = parse_args(args)?;
        let clause =
            OperationClause::from_value(kind, a.permission).map_err(|e| PermError::from(e).at("permission"))?;
        let table = a.table.name();
        let outcome = mutate::create_permission(store, cache, &a.source, &table, &a.role, clause, a.comment)?;
        return Ok(outcome.into());
    }
    if let Some(kind) = kind_of(command, "drop_") {
        let a: DropPermArgs = parse_args(args)?;
        return Ok(mutate::drop_permission(store, cache, &a.source, &a.table.name(), &a.role, kind)?.into());
    }
    match command {
        "set_permission_comment" => {
            let a: SetCommentArgs = parse_args(args)?;
            let outcome =
                mutate::set_permission_comment(store, cache, &a.source, &a.table.name(), &a.role, a.kind, a.comment)?;
            Ok(outcome.into())
        }
        "track_table" => {
            let a: TableArgs = parse_args(args)?;
            mutate::track_table(store, cache, &a.source, &a.table.name())?;
            Ok(CommandResponse::success())
        }
        "untrack_table" => {
            let a: TableArgs = parse_args(args)?;
            mutate::untrack_table(store, cache, &a.source, &a.table.name())?;
            Ok(CommandResponse::success())
        }
        other => Err(PermError::InvalidCommand(format!("unknown command {other:?}"))),
    }
}

fn strip_prefix(command: &str) -> &str {
    command.strip_prefix("pg_").unwrap_or(command)
}

/// `create_select_permission` -> `Select` for prefix `create_`
fn kind_of(command: &str, prefix: &str) -> Option<PermKind> {
    PermKind::parse(command.strip_prefix(prefix)?.strip_suffix("_permission")?)
}

fn parse_args<T: serde::de::DeserializeOwned>(args: Value) -> Result<T> {
    serde_json::from_value(args).map_err(|e| PermError::from(e).at("args"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_of() {
        assert_eq!(kind_of("create_select_permission", "create_"), Some(PermKind::Select));
        assert_eq!(kind_of("drop_insert_permission", "drop_"), Some(PermKind::Insert));
        assert_eq!(kind_of("create_upsert_permission", "create_"), None);
        assert_eq!(kind_of("set_permission_comment", "create_"), None);
        assert_eq!(strip_prefix("pg_create_delete_permission"), "create_delete_permission");
    }

    #[test]
    fn test_table_ref() {
        let t: TableRef = serde_json::from_value(json!("articles")).unwrap();
        assert_eq!(t.name(), "articles");
        let t: TableRef = serde_json::from_value(json!({"schema": "public", "name": "articles"})).unwrap();
        assert_eq!(t.name(), "articles");
        let t: TableRef = serde_json::from_value(json!({"schema": "blog", "name": "articles"})).unwrap();
        assert_eq!(t.name(), "blog.articles");
        let t: TableRef = serde_json::from_value(json!({"name": "authors"})).unwrap();
        assert_eq!(t.name(), "authors");
    }
}
