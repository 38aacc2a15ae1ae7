//! Dependency extraction for compiled permissions
//!
//! Edges are grouped and emitted in a fixed order: the table edge, then
//! predicate edges (filter before check), then preset edges, then edges for
//! explicitly named columns and computed fields.

use crate::boolexp::CompiledPredicate;
use crate::types::{DepReason, DepTarget, DependencyEdge, RequiredHeaders, SessionVariable};

pub struct DepCollector<'a> {
    source: &'a str,
    table: &'a str,
    predicate: Vec<DependencyEdge>,
    preset: Vec<DependencyEdge>,
    column: Vec<DependencyEdge>,
    headers: RequiredHeaders,
}

impl<'a> DepCollector<'a> {
    pub fn new(source: &'a str, table: &'a str) -> Self {
        DepCollector {
            source,
            table,
            predicate: Vec::new(),
            preset: Vec::new(),
            column: Vec::new(),
            headers: RequiredHeaders::new(),
        }
    }

    /// Take a compiled filter or check: its edges and its headers
    pub fn predicate(&mut self, compiled: &CompiledPredicate) {
        self.predicate.extend(compiled.edges.iter().cloned());
        self.headers.extend(compiled.headers.iter().cloned());
    }

    pub fn preset(&mut self, column: &str, reason: DepReason) {
        self.preset.push(self.edge(DepTarget::Column(column.to_string()), reason));
    }

    pub fn header(&mut self, var: SessionVariable) {
        self.headers.insert(var);
    }

    pub fn column(&mut self, column: &str) {
        self.column.push(self.edge(DepTarget::Column(column.to_string()), DepReason::Untyped));
    }

    pub fn computed_field(&mut self, name: &str) {
        self.column.push(self.edge(DepTarget::ComputedField(name.to_string()), DepReason::Untyped));
    }

    fn edge(&self, target: DepTarget, reason: DepReason) -> DependencyEdge {
        DependencyEdge::new(self.source, self.table, target, reason)
    }

    pub fn finish(self) -> (Vec<DependencyEdge>, RequiredHeaders) {
        let mut edges = Vec::with_capacity(1 + self.predicate.len() + self.preset.len() + self.column.len());
        edges.push(DependencyEdge::new(self.source, self.table, DepTarget::Table, DepReason::Table));
        edges.extend(self.predicate);
        edges.extend(self.preset);
        edges.extend(self.column);
        (edges, self.headers)
    }
}
