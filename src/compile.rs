//! Permission validation and compilation
//!
//! Every routine here is pure: it reads the schema accessor, calls the
//! predicate compiler and returns a descriptor plus dependency edges. Errors
//! carry the clause path they came from (`permission.set.author_id`).

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use crate::boolexp::{literal_fits, CompiledPredicate, PredicateCompiler};
use crate::constants::is_session_variable;
use crate::deps::DepCollector;
use crate::error::{PermError, Result};
use crate::schema::{ColumnType, ReturnShape, SchemaAccessor};
use crate::types::{
    ColumnName, ColumnPresets, ColumnSpec, CompiledPermissionDescriptor, DelPermDef, DelPermInfo, DepReason,
    DependencyEdge, InsPermDef, InsPermInfo, OperationClause, Predicate, PresetValue, RootField, SelPermDef,
    SelPermInfo, SessionVariable, UpdPermDef, UpdPermInfo,
};

/// The backend collaborators a compile runs against
#[derive(Clone, Copy)]
pub struct CompileContext<'a> {
    pub source: &'a str,
    pub schema: &'a dyn SchemaAccessor,
    pub predicates: &'a dyn PredicateCompiler,
}

pub type Compiled = (CompiledPermissionDescriptor, Vec<DependencyEdge>);

/// Validate and compile one clause against `table`
pub fn compile_permission(ctx: &CompileContext, table: &str, clause: &OperationClause) -> Result<Compiled> {
    let (descriptor, edges) = match clause {
        OperationClause::Insert(def) => build_insert(ctx, table, def),
        OperationClause::Select(def) => build_select(ctx, table, def),
        OperationClause::Update(def) => build_update(ctx, table, def),
        OperationClause::Delete(def) => build_delete(ctx, table, def),
    }
    .map_err(|e| e.at("permission"))?;
    debug!(source = ctx.source, table, kind = %clause.kind(), edges = edges.len(), "compiled permission");
    Ok((descriptor, edges))
}

pub fn build_insert(ctx: &CompileContext, table: &str, def: &InsPermDef) -> Result<Compiled> {
    let mut deps = DepCollector::new(ctx.source, table);

    let check = predicate(ctx, table, &def.check).map_err(|e| e.at("check"))?;
    deps.predicate(&check);

    let set = resolve_presets(ctx, table, def.set.as_ref(), &mut deps).map_err(|e| e.at("set"))?;

    // No column list means every column
    let all = ColumnSpec::All;
    let spec = def.columns.as_ref().unwrap_or(&all);
    let columns = resolve_columns(ctx, table, spec, &mut deps).map_err(|e| e.at("columns"))?;
    let columns = without_presets(columns, &set);

    let (edges, required_headers) = deps.finish();
    let info = InsPermInfo {
        columns,
        check: check.expr,
        set,
        backend_only: def.backend_only.unwrap_or(false),
        required_headers,
    };
    Ok((CompiledPermissionDescriptor::Insert(info), edges))
}

pub fn build_select(ctx: &CompileContext, table: &str, def: &SelPermDef) -> Result<Compiled> {
    let mut deps = DepCollector::new(ctx.source, table);

    let columns = resolve_columns(ctx, table, &def.columns, &mut deps).map_err(|e| e.at("columns"))?;

    let filter = predicate(ctx, table, &def.filter).map_err(|e| e.at("filter"))?;
    deps.predicate(&filter);

    let limit = match def.limit {
        Some(n) if n <= 0 => return Err(PermError::InvalidLimit(n).at("limit")),
        Some(n) => Some(n as u64),
        None => None,
    };

    let mut computed_fields = BTreeMap::new();
    for name in &def.computed_fields {
        if computed_fields.contains_key(name) {
            continue;
        }
        let scalar = scalar_computed_field(ctx.schema, table, name).map_err(|e| e.at("computed_fields"))?;
        deps.computed_field(name);
        computed_fields.insert(name.clone(), scalar);
    }

    check_root_fields(def.query_root_fields.as_deref(), def.allow_aggregations).map_err(|e| e.at("query_root_fields"))?;
    check_root_fields(def.subscription_root_fields.as_deref(), def.allow_aggregations)
        .map_err(|e| e.at("subscription_root_fields"))?;

    let (edges, required_headers) = deps.finish();
    let info = SelPermInfo {
        columns,
        computed_fields,
        filter: filter.expr,
        limit,
        allow_aggregations: def.allow_aggregations,
        query_root_fields: def.query_root_fields.clone(),
        subscription_root_fields: def.subscription_root_fields.clone(),
        required_headers,
    };
    Ok((CompiledPermissionDescriptor::Select(info), edges))
}

pub fn build_update(ctx: &CompileContext, table: &str, def: &UpdPermDef) -> Result<Compiled> {
    let mut deps = DepCollector::new(ctx.source, table);

    let columns = resolve_columns(ctx, table, &def.columns, &mut deps).map_err(|e| e.at("columns"))?;

    let set = resolve_presets(ctx, table, def.set.as_ref(), &mut deps).map_err(|e| e.at("set"))?;
    let columns = without_presets(columns, &set);

    let filter = predicate(ctx, table, &def.filter).map_err(|e| e.at("filter"))?;
    deps.predicate(&filter);

    // No explicit check: the filter must also hold after the update
    let check = match &def.check {
        Some(doc) => {
            let check = predicate(ctx, table, doc).map_err(|e| e.at("check"))?;
            deps.predicate(&check);
            check.expr
        }
        None => filter.expr.clone(),
    };

    let (edges, required_headers) = deps.finish();
    let info = UpdPermInfo { columns, filter: filter.expr, check, set, required_headers };
    Ok((CompiledPermissionDescriptor::Update(info), edges))
}

pub fn build_delete(ctx: &CompileContext, table: &str, def: &DelPermDef) -> Result<Compiled> {
    let mut deps = DepCollector::new(ctx.source, table);

    let filter = predicate(ctx, table, &def.filter).map_err(|e| e.at("filter"))?;
    deps.predicate(&filter);

    let (edges, required_headers) = deps.finish();
    Ok((CompiledPermissionDescriptor::Delete(DelPermInfo { filter: filter.expr, required_headers }), edges))
}

// ============================================================================
// Shared helpers
// ============================================================================

fn predicate(ctx: &CompileContext, table: &str, doc: &Predicate) -> Result<CompiledPredicate> {
    ctx.predicates.compile(ctx.schema, ctx.source, table, doc)
}

/// Column type of `name`, or why it cannot be used as a column
fn column_type(schema: &dyn SchemaAccessor, table: &str, name: &str) -> Result<ColumnType> {
    if let Some(t) = schema.resolve_column(table, name) {
        return Ok(t);
    }
    if schema.resolve_relationship(table, name).is_some() {
        return Err(PermError::RelationshipNotAllowed { table: table.to_string(), name: name.to_string() });
    }
    Err(PermError::ColumnNotFound { table: table.to_string(), column: name.to_string() })
}

/// Resolve a column spec to a concrete set; explicit names become untyped edges
pub fn resolve_columns(
    ctx: &CompileContext,
    table: &str,
    spec: &ColumnSpec,
    deps: &mut DepCollector,
) -> Result<BTreeSet<ColumnName>> {
    match spec {
        ColumnSpec::All => Ok(ctx.schema.columns(table).into_iter().map(|(name, _)| name).collect()),
        ColumnSpec::Columns(names) => {
            let mut resolved = BTreeSet::new();
            for name in names {
                column_type(ctx.schema, table, name)?;
                if resolved.insert(name.clone()) {
                    deps.column(name);
                }
            }
            Ok(resolved)
        }
    }
}

/// Resolve preset values: literals are type-derived, session variables are not
pub fn resolve_presets(
    ctx: &CompileContext,
    table: &str,
    presets: Option<&ColumnPresets>,
    deps: &mut DepCollector,
) -> Result<BTreeMap<ColumnName, PresetValue>> {
    let mut resolved = BTreeMap::new();
    for (column, value) in presets.into_iter().flatten() {
        let column_type = column_type(ctx.schema, table, column).map_err(|e| e.at(column.as_str()))?;
        let preset = match value {
            Value::String(s) if is_session_variable(s) => {
                let name = SessionVariable::new(s.as_str());
                deps.header(name.clone());
                deps.preset(column, DepReason::SessionVariable);
                PresetValue::SessionVariable { name, column_type }
            }
            v if literal_fits(column_type, v) => {
                deps.preset(column, DepReason::TypeDerived);
                PresetValue::Literal { value: v.clone(), column_type }
            }
            v => {
                return Err(PermError::ValidationFailed(format!(
                    "expecting a value of type {column_type:?} for column {column:?}, got {v}"
                ))
                .at(column.as_str()))
            }
        };
        resolved.insert(column.clone(), preset);
    }
    Ok(resolved)
}

/// A column is either client-suppliable or server-preset, never both
fn without_presets(mut columns: BTreeSet<ColumnName>, set: &BTreeMap<ColumnName, PresetValue>) -> BTreeSet<ColumnName> {
    columns.retain(|c| !set.contains_key(c));
    columns
}

fn scalar_computed_field(schema: &dyn SchemaAccessor, table: &str, name: &str) -> Result<ColumnType> {
    match schema.resolve_computed_field(table, name) {
        Some(ReturnShape::Scalar { scalar }) => Ok(scalar),
        Some(ReturnShape::SetOfRows { table: returns }) => Err(PermError::NotSupported(format!(
            "select permissions on computed field {name:?} are auto-derived from the permissions on its \
             returning table {returns:?} and cannot be specified manually"
        ))),
        None => Err(PermError::ComputedFieldNotFound { table: table.to_string(), name: name.to_string() }),
    }
}

fn check_root_fields(fields: Option<&[RootField]>, allow_aggregations: bool) -> Result<()> {
    if !allow_aggregations && fields.is_some_and(|f| f.contains(&RootField::SelectAggregate)) {
        return Err(PermError::ValidationFailed(
            "the \"select_aggregate\" root field can only be enabled when \"allow_aggregations\" is true".into(),
        ));
    }
    Ok(())
}
