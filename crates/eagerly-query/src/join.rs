//! LEFT JOIN clauses.
//!
//! Relation filters and relation sorts must keep parents that have no
//! related row, so every join the engine emits is a LEFT JOIN.

use crate::expr::Expr;
use eagerly_core::{Dialect, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: Option<String>,
    pub on: Expr,
}

impl Join {
    pub fn left(table: impl Into<String>, on: Expr) -> Self {
        Self {
            table: table.into(),
            alias: None,
            on,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Alias if set, else the table: what column references must use.
    pub fn reference_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.table)
    }

    pub fn build_with_dialect(&self, dialect: Dialect, params: &mut Vec<Value>) -> String {
        let alias = self
            .alias
            .as_deref()
            .map(|a| format!(" AS {}", dialect.quote_identifier(a)))
            .unwrap_or_default();
        format!(
            " LEFT JOIN {}{alias} ON {}",
            dialect.quote_identifier(&self.table),
            self.on.build_with_dialect(dialect, params)
        )
    }
}
