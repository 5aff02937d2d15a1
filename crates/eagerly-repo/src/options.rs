//! Per-call sort and page window.

use eagerly_query::OrderDirection;
use serde::{Deserialize, Serialize};

/// Sort on one field. The field may be relation-qualified (`country.name`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub direction: OrderDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, OrderDirection::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, OrderDirection::Desc)
    }

    /// Whether the sort walks a relation path.
    pub fn is_qualified(&self) -> bool {
        self.field.contains('.')
    }
}

/// `OFFSET offset LIMIT length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub offset: u64,
    pub length: u64,
}

impl Window {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Window for a 1-based page number. Page 0 is treated as page 1.
    pub fn page(page: u64, per_page: u64) -> Self {
        Self {
            offset: page.max(1).saturating_sub(1).saturating_mul(per_page),
            length: per_page,
        }
    }
}
