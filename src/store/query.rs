//! Filtered, ordered, limited reads.
//!
//! A [`ReadQuery`] is backend-neutral: the PostgreSQL store turns it into SQL,
//! the in-memory store evaluates it directly. Column names are checked
//! against the table's allowlist before either happens.

use chrono::{DateTime, Utc};

use super::Table;
use crate::error::StoreError;

/// Timestamp comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl CompareOp {
    /// SQL spelling.
    #[must_use]
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Lt => "<",
            Self::Lte => "<=",
        }
    }

    /// Evaluates `lhs <op> rhs`.
    #[must_use]
    pub fn holds(self, lhs: DateTime<Utc>, rhs: DateTime<Utc>) -> bool {
        match self {
            Self::Gt => lhs > rhs,
            Self::Gte => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Lte => lhs <= rhs,
        }
    }
}

/// One predicate of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Column equals value (compared by text form; `null` means `IS NULL`).
    Eq {
        /// Column name.
        column: &'static str,
        /// Expected value.
        value: serde_json::Value,
    },
    /// Case-insensitive substring match.
    Contains {
        /// Column name.
        column: &'static str,
        /// Substring to look for.
        needle: String,
    },
    /// Column (by text form) is one of `values`.
    AnyOf {
        /// Column name.
        column: &'static str,
        /// Accepted values.
        values: Vec<String>,
    },
    /// Timestamp comparison, used for "last N days" range reads.
    Compare {
        /// Timestamp column name.
        column: &'static str,
        /// Operator.
        op: CompareOp,
        /// Right-hand side.
        at: DateTime<Utc>,
    },
}

impl Filter {
    /// Column the predicate reads.
    #[must_use]
    pub const fn column(&self) -> &'static str {
        match self {
            Self::Eq { column, .. }
            | Self::Contains { column, .. }
            | Self::AnyOf { column, .. }
            | Self::Compare { column, .. } => column,
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Oldest / smallest first.
    Asc,
    /// Newest / largest first.
    Desc,
}

/// Ordering clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    /// Column to sort by.
    pub column: &'static str,
    /// Direction.
    pub direction: Direction,
}

/// Backend-neutral read description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadQuery {
    /// Conjunction of predicates.
    pub filters: Vec<Filter>,
    /// Optional ordering.
    pub order: Option<Order>,
    /// Optional row cap.
    pub limit: Option<u32>,
}

impl ReadQuery {
    /// An unfiltered, unordered, unlimited read.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality predicate.
    #[must_use]
    pub fn eq(mut self, column: &'static str, value: impl Into<serde_json::Value>) -> Self {
        self.filters.push(Filter::Eq {
            column,
            value: value.into(),
        });
        self
    }

    /// Adds a case-insensitive substring predicate.
    #[must_use]
    pub fn contains(mut self, column: &'static str, needle: impl Into<String>) -> Self {
        self.filters.push(Filter::Contains {
            column,
            needle: needle.into(),
        });
        self
    }

    /// Keeps rows whose `column` matches one of `values`.
    #[must_use]
    pub fn any_of<I, V>(mut self, column: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.filters.push(Filter::AnyOf {
            column,
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Keeps rows whose timestamp column is `>= at`.
    #[must_use]
    pub fn since(self, column: &'static str, at: DateTime<Utc>) -> Self {
        self.compare(column, CompareOp::Gte, at)
    }

    /// Adds a timestamp comparison.
    #[must_use]
    pub fn compare(mut self, column: &'static str, op: CompareOp, at: DateTime<Utc>) -> Self {
        self.filters.push(Filter::Compare { column, op, at });
        self
    }

    /// Orders ascending by `column`.
    #[must_use]
    pub fn oldest_first(mut self, column: &'static str) -> Self {
        self.order = Some(Order {
            column,
            direction: Direction::Asc,
        });
        self
    }

    /// Orders descending by `column`.
    #[must_use]
    pub fn newest_first(mut self, column: &'static str) -> Self {
        self.order = Some(Order {
            column,
            direction: Direction::Desc,
        });
        self
    }

    /// Caps the number of returned rows.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Checks every referenced column against the table's allowlist.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] with code `unknown_column` naming the first
    /// column the table does not have.
    pub fn validate(&self, table: Table) -> Result<(), StoreError> {
        let referenced = self
            .filters
            .iter()
            .map(Filter::column)
            .chain(self.order.iter().map(|o| o.column));
        for column in referenced {
            table.check_column(column)?;
        }
        Ok(())
    }
}
