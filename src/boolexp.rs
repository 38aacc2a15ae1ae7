//! Boolean-expression compilation for permission filters and checks
//!
//! Grammar of the raw document:
//!
//! ```text
//! {}                                   -- always true
//! {"_and": [exp, ..]} / {"_or": [..]}  -- conjunction / disjunction
//! {"_not": exp}
//! {"<column>": {"<op>": value, ..}}    -- comparison
//! {"<computed_field>": {"<op>": value}}
//! {"<relationship>": exp}              -- evaluated against the remote table
//! ```
//!
//! A string value starting with `x-hasura-` refers to a session variable.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::constants::is_session_variable;
use crate::error::{PermError, Result};
use crate::schema::{ColumnType, ReturnShape, SchemaAccessor};
use crate::types::{
    ColumnName, DepReason, DepTarget, DependencyEdge, FieldName, Predicate, RequiredHeaders, SessionVariable,
    TableName,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Neq,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    Nin,
    Like,
    Ilike,
    IsNull,
    /// Column-to-column comparisons (`_ceq` family)
    Ceq,
    Cneq,
    Cgt,
    Clt,
    Cgte,
    Clte,
}

impl CompareOp {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "_eq" => CompareOp::Eq,
            "_neq" => CompareOp::Neq,
            "_gt" => CompareOp::Gt,
            "_lt" => CompareOp::Lt,
            "_gte" => CompareOp::Gte,
            "_lte" => CompareOp::Lte,
            "_in" => CompareOp::In,
            "_nin" => CompareOp::Nin,
            "_like" => CompareOp::Like,
            "_ilike" => CompareOp::Ilike,
            "_is_null" => CompareOp::IsNull,
            "_ceq" => CompareOp::Ceq,
            "_cneq" => CompareOp::Cneq,
            "_cgt" => CompareOp::Cgt,
            "_clt" => CompareOp::Clt,
            "_cgte" => CompareOp::Cgte,
            "_clte" => CompareOp::Clte,
            _ => return None,
        })
    }

    fn is_column_comparison(self) -> bool {
        matches!(
            self,
            CompareOp::Ceq | CompareOp::Cneq | CompareOp::Cgt | CompareOp::Clt | CompareOp::Cgte | CompareOp::Clte
        )
    }
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operand {
    Literal(Value),
    SessionVariable(SessionVariable),
    Column(ColumnName),
    List(Vec<Operand>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub op: CompareOp,
    pub value: Operand,
}

/// Compiled, backend-executable boolean expression
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolExp {
    And(Vec<BoolExp>),
    Or(Vec<BoolExp>),
    Not(Box<BoolExp>),
    Column { column: ColumnName, column_type: ColumnType, comparisons: Vec<Comparison> },
    ComputedField { name: FieldName, scalar: ColumnType, comparisons: Vec<Comparison> },
    Relationship { name: String, remote_table: TableName, exp: Box<BoolExp> },
}

impl BoolExp {
    pub fn is_always_true(&self) -> bool {
        matches!(self, BoolExp::And(v) if v.is_empty())
    }
}

/// A compiled predicate with what it depends on
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPredicate {
    pub expr: BoolExp,
    pub edges: Vec<DependencyEdge>,
    pub headers: RequiredHeaders,
}

/// Turns raw filter/check documents into compiled expressions
pub trait PredicateCompiler: Send + Sync {
    fn compile(
        &self,
        schema: &dyn SchemaAccessor,
        source: &str,
        table: &str,
        doc: &Predicate,
    ) -> Result<CompiledPredicate>;
}

/// Reference compiler for the grammar in the module docs
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolExpCompiler;

impl PredicateCompiler for BoolExpCompiler {
    fn compile(
        &self,
        schema: &dyn SchemaAccessor,
        source: &str,
        table: &str,
        doc: &Predicate,
    ) -> Result<CompiledPredicate> {
        let mut walk = Walk { schema, source, edges: Vec::new(), headers: RequiredHeaders::new() };
        let expr = walk.exp(table, doc)?;
        Ok(CompiledPredicate { expr, edges: walk.edges, headers: walk.headers })
    }
}

struct Walk<'a> {
    schema: &'a dyn SchemaAccessor,
    source: &'a str,
    edges: Vec<DependencyEdge>,
    headers: RequiredHeaders,
}

fn predicate_err(msg: impl Into<String>) -> PermError {
    PermError::Predicate(msg.into())
}

impl Walk<'_> {
    fn exp(&mut self, table: &str, doc: &Value) -> Result<BoolExp> {
        let obj = doc
            .as_object()
            .ok_or_else(|| predicate_err(format!("expecting an object for boolean expression, got {doc}")))?;
        let mut parts = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            let part = match key.as_str() {
                "_and" => BoolExp::And(self.list(table, value).map_err(|e| e.at("_and"))?),
                "_or" => BoolExp::Or(self.list(table, value).map_err(|e| e.at("_or"))?),
                "_not" => BoolExp::Not(Box::new(self.exp(table, value).map_err(|e| e.at("_not"))?)),
                field => self.field(table, field, value).map_err(|e| e.at(field))?,
            };
            parts.push(part);
        }
        Ok(if parts.len() == 1 { parts.remove(0) } else { BoolExp::And(parts) })
    }

    fn list(&mut self, table: &str, value: &Value) -> Result<Vec<BoolExp>> {
        let items = value
            .as_array()
            .ok_or_else(|| predicate_err(format!("expecting an array of boolean expressions, got {value}")))?;
        items.iter().map(|v| self.exp(table, v)).collect()
    }

    fn field(&mut self, table: &str, field: &str, value: &Value) -> Result<BoolExp> {
        if let Some(column_type) = self.schema.resolve_column(table, field) {
            let comparisons = self.comparisons(table, column_type, value)?;
            let reason = operand_reason(&comparisons);
            self.edge(table, DepTarget::Column(field.to_string()), reason);
            return Ok(BoolExp::Column { column: field.to_string(), column_type, comparisons });
        }
        if let Some(rel) = self.schema.resolve_relationship(table, field) {
            self.edge(table, DepTarget::Relationship(field.to_string()), DepReason::Untyped);
            self.edge(&rel.remote_table, DepTarget::Table, DepReason::Table);
            let exp = self.exp(&rel.remote_table, value)?;
            return Ok(BoolExp::Relationship { name: field.to_string(), remote_table: rel.remote_table, exp: Box::new(exp) });
        }
        match self.schema.resolve_computed_field(table, field) {
            Some(ReturnShape::Scalar { scalar }) => {
                let comparisons = self.comparisons(table, scalar, value)?;
                let reason = operand_reason(&comparisons);
                self.edge(table, DepTarget::ComputedField(field.to_string()), reason);
                Ok(BoolExp::ComputedField { name: field.to_string(), scalar, comparisons })
            }
            Some(ReturnShape::SetOfRows { .. }) => Err(predicate_err(format!(
                "computed field {field:?} returns a set of rows and cannot be used in a boolean expression"
            ))),
            None => Err(predicate_err(format!(
                "{field:?} is not a column, relationship or computed field of table {table:?}"
            ))),
        }
    }

    fn comparisons(&mut self, table: &str, column_type: ColumnType, value: &Value) -> Result<Vec<Comparison>> {
        let ops: &Map<String, Value> = value
            .as_object()
            .ok_or_else(|| predicate_err(format!("expecting an object of comparison operators, got {value}")))?;
        let mut out = Vec::with_capacity(ops.len());
        for (name, operand) in ops {
            let op = CompareOp::parse(name).ok_or_else(|| predicate_err(format!("unknown operator {name:?}")))?;
            let value = self.operand(table, column_type, op, operand).map_err(|e| e.at(name.as_str()))?;
            out.push(Comparison { op, value });
        }
        Ok(out)
    }

    fn operand(&mut self, table: &str, column_type: ColumnType, op: CompareOp, value: &Value) -> Result<Operand> {
        if op.is_column_comparison() {
            let other = value
                .as_str()
                .ok_or_else(|| predicate_err(format!("expecting a column name, got {value}")))?;
            if self.schema.resolve_column(table, other).is_none() {
                return Err(predicate_err(format!("column {other:?} not found in table {table:?}")));
            }
            self.edge(table, DepTarget::Column(other.to_string()), DepReason::TypeDerived);
            return Ok(Operand::Column(other.to_string()));
        }
        match op {
            CompareOp::IsNull => match value {
                Value::Bool(_) => Ok(Operand::Literal(value.clone())),
                _ => Err(predicate_err(format!("expecting a boolean for _is_null, got {value}"))),
            },
            CompareOp::In | CompareOp::Nin => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|v| self.scalar(column_type, v))
                    .collect::<Result<Vec<_>>>()
                    .map(Operand::List),
                Value::String(s) if is_session_variable(s) => Ok(self.session_variable(s)),
                _ => Err(predicate_err(format!("expecting a list of values, got {value}"))),
            },
            CompareOp::Like | CompareOp::Ilike if column_type != ColumnType::Text => {
                Err(predicate_err(format!("pattern matching is only valid on text values, not {column_type:?}")))
            }
            _ => self.scalar(column_type, value),
        }
    }

    fn scalar(&mut self, column_type: ColumnType, value: &Value) -> Result<Operand> {
        match value {
            Value::String(s) if is_session_variable(s) => Ok(self.session_variable(s)),
            _ if literal_fits(column_type, value) => Ok(Operand::Literal(value.clone())),
            _ => Err(predicate_err(format!("expecting a value of type {column_type:?}, got {value}"))),
        }
    }

    fn session_variable(&mut self, name: &str) -> Operand {
        let var = SessionVariable::new(name);
        self.headers.insert(var.clone());
        Operand::SessionVariable(var)
    }

    fn edge(&mut self, table: &str, target: DepTarget, reason: DepReason) {
        self.edges.push(DependencyEdge::new(self.source, table, target, reason));
    }
}

/// Literal operands make a column type-derived; session variables alone do not.
/// `_is_null` says nothing about the column's type.
fn operand_reason(comparisons: &[Comparison]) -> DepReason {
    fn scan(op: &Operand, literal: &mut bool, session: &mut bool) {
        match op {
            Operand::Literal(_) => *literal = true,
            Operand::SessionVariable(_) => *session = true,
            Operand::Column(_) => {}
            Operand::List(items) => items.iter().for_each(|i| scan(i, literal, session)),
        }
    }
    let (mut literal, mut session) = (false, false);
    for c in comparisons.iter().filter(|c| !c.op.is_column_comparison() && c.op != CompareOp::IsNull) {
        scan(&c.value, &mut literal, &mut session);
    }
    match (literal, session) {
        (true, _) => DepReason::TypeDerived,
        (false, true) => DepReason::SessionVariable,
        (false, false) => DepReason::Untyped,
    }
}

/// Whether a JSON literal can stand for a value of `column_type`
pub fn literal_fits(column_type: ColumnType, value: &Value) -> bool {
    match (column_type, value) {
        (_, Value::Null) | (ColumnType::Json, _) => true,
        (ColumnType::Integer, Value::Number(n)) => n.is_i64() || n.is_u64(),
        (ColumnType::Integer, Value::String(s)) => s.parse::<i64>().is_ok(),
        (ColumnType::Numeric, Value::Number(_)) => true,
        (ColumnType::Numeric, Value::String(s)) => s.parse::<f64>().is_ok_and(f64::is_finite),
        (ColumnType::Boolean, Value::Bool(_)) => true,
        (ColumnType::Text | ColumnType::Uuid | ColumnType::Timestamp, Value::String(_)) => true,
        _ => false,
    }
}
