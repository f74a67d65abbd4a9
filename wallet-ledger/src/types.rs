//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money)
//! - Chronologically sortable transaction identifiers

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Opaque caller payload attached to a transaction
pub type AdditionalData = BTreeMap<String, Value>;

/// Wallet balance record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Caller-supplied wallet identifier
    pub wallet_id: String,

    /// Current balance
    pub balance: Decimal,
}

impl Wallet {
    /// Zero-balance wallet, used for wallets with no recorded activity
    pub fn empty(wallet_id: impl Into<String>) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            balance: Decimal::ZERO,
        }
    }
}

/// Immutable record of one balance change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique, chronologically sortable ID
    pub id: TransactionId,

    /// Wallet this transaction belongs to
    pub wallet_id: String,

    /// Signed amount: positive for credits, negative for debits
    pub amount: Decimal,

    /// Free-text description
    pub description: String,

    /// Opaque caller data
    #[serde(default)]
    pub additional_data: AdditionalData,

    /// Creation instant (the same instant encoded in `id`)
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Whether this transaction added funds
    pub fn is_credit(&self) -> bool {
        self.amount.is_sign_positive()
    }
}

/// Transaction identifier: nanoseconds since the Unix epoch, zero-padded to
/// 20 digits so that byte order equals chronological order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    const WIDTH: usize = 20;

    /// Build an ID from a nanosecond timestamp
    pub fn from_nanos(nanos: i64) -> Self {
        Self(format!("{:0width$}", nanos.max(0), width = Self::WIDTH))
    }

    /// Parse an ID received from a caller
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == Self::WIDTH && s.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    /// Nanoseconds since the Unix epoch
    pub fn nanos(&self) -> Option<i64> {
        self.0.parse().ok()
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues strictly increasing transaction IDs from the wall clock.
///
/// If the clock stalls or steps backwards the generator keeps counting up
/// from the last issued value, one nanosecond at a time.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicI64,
}

impl IdGenerator {
    /// Generator that starts at the wall clock
    pub fn new() -> Self {
        Self::default()
    }

    /// Generator that never issues an ID at or below `nanos`
    pub fn starting_after(nanos: i64) -> Self {
        Self {
            last: AtomicI64::new(nanos),
        }
    }

    /// Next ID together with the instant it encodes
    pub fn next(&self) -> (TransactionId, DateTime<Utc>) {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX - 1);
        let mut prev = self.last.load(Ordering::Acquire);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    return (
                        TransactionId::from_nanos(candidate),
                        DateTime::from_timestamp_nanos(candidate),
                    )
                }
                Err(actual) => prev = actual,
            }
        }
    }
}

/// JSON-like value carried in `additional_data`.
///
/// The ledger stores these verbatim and never interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// JSON null
    Null,
    /// Boolean
    Bool(bool),
    /// Number (JSON numbers are read as f64)
    Number(f64),
    /// String
    String(String),
    /// Array
    List(Vec<Value>),
    /// Object
    Map(BTreeMap<String, Value>),
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Null, Value::Number),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(fields) => {
                Value::Map(fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            // NaN and infinities have no JSON form
            Value::Number(n) => serde_json::Number::from_f64(n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(items) => serde_json::Value::Array(items.into_iter().map(Into::into).collect()),
            Value::Map(fields) => {
                serde_json::Value::Object(fields.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

/// Convert a JSON object into `AdditionalData`. Anything other than an
/// object (including null) yields an empty map.
pub fn additional_data_from_json(value: serde_json::Value) -> AdditionalData {
    match value {
        serde_json::Value::Object(fields) => {
            fields.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
        }
        _ => AdditionalData::new(),
    }
}
