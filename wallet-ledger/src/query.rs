//! Sorting and pagination of transaction history

use crate::types::Transaction;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Page size used when the caller gives none (or an invalid one)
pub const DEFAULT_LIMIT: usize = 50;

/// Field to sort transaction history by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Creation time
    #[default]
    Timestamp,
    /// Signed amount
    Amount,
}

impl FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timestamp" => Ok(SortBy::Timestamp),
            "amount" => Ok(SortBy::Amount),
            other => Err(format!("unknown sort field: {}", other)),
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortBy::Timestamp => write!(f, "timestamp"),
            SortBy::Amount => write!(f, "amount"),
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    /// Smallest first
    Asc,
    /// Largest first
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("ASC") {
            Ok(SortOrder::Asc)
        } else if s.eq_ignore_ascii_case("DESC") {
            Ok(SortOrder::Desc)
        } else {
            Err(format!("unknown sort order: {}", s))
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => write!(f, "ASC"),
            SortOrder::Desc => write!(f, "DESC"),
        }
    }
}

/// Window and ordering for a transaction history request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    /// Maximum number of transactions returned
    pub limit: usize,
    /// Number of transactions skipped after sorting
    pub offset: usize,
    /// Sort field
    pub sort_by: SortBy,
    /// Sort direction
    pub sort_order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl ListQuery {
    /// Query with the given window and default ordering (newest first)
    pub fn new(limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            ..Self::default()
        }
    }

    /// Set the ordering
    pub fn sorted(mut self, sort_by: SortBy, sort_order: SortOrder) -> Self {
        self.sort_by = sort_by;
        self.sort_order = sort_order;
        self
    }

    /// Build a query from raw request parameters.
    ///
    /// Each parameter that is missing or invalid falls back to its default
    /// on its own: limit must be a positive integer, offset a non-negative
    /// integer, sort_by `timestamp` or `amount`, sort_order `ASC` or `DESC`.
    pub fn from_params(
        limit: Option<&str>,
        offset: Option<&str>,
        sort_by: Option<&str>,
        sort_order: Option<&str>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            limit: limit
                .and_then(|s| s.trim().parse::<usize>().ok())
                .filter(|limit| *limit > 0)
                .unwrap_or(defaults.limit),
            offset: offset
                .and_then(|s| s.trim().parse::<usize>().ok())
                .unwrap_or(defaults.offset),
            sort_by: sort_by
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.sort_by),
            sort_order: sort_order
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.sort_order),
        }
    }

    /// Sort `transactions` and cut out the requested window.
    ///
    /// The sort is stable: transactions that compare equal keep their input
    /// order in both directions.
    pub fn apply(&self, mut transactions: Vec<Transaction>) -> Vec<Transaction> {
        sort_transactions(&mut transactions, self.sort_by, self.sort_order);
        paginate(transactions, self.offset, self.limit)
    }
}

/// Stable sort by field and direction
pub fn sort_transactions(transactions: &mut [Transaction], sort_by: SortBy, sort_order: SortOrder) {
    let compare = |a: &Transaction, b: &Transaction| -> Ordering {
        match sort_by {
            SortBy::Timestamp => a.timestamp.cmp(&b.timestamp),
            SortBy::Amount => a.amount.cmp(&b.amount),
        }
    };

    match sort_order {
        SortOrder::Asc => transactions.sort_by(compare),
        SortOrder::Desc => transactions.sort_by(|a, b| compare(b, a)),
    }
}

/// Skip `offset` items, keep at most `limit`
pub fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    if offset >= items.len() {
        return Vec::new();
    }
    items.into_iter().skip(offset).take(limit).collect()
}
