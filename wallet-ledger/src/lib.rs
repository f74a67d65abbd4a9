//! Wallet Ledger
//!
//! Per-wallet balances with an append-only transaction log, stored in
//! RocksDB and split across independent environments (tenants).
//!
//! # Architecture
//!
//! - **Codec**: bincode records and a key layout that groups each wallet's
//!   transactions in chronological order
//! - **Storage**: one RocksDB instance per environment, with locked
//!   read-modify-write transactions and snapshot reads
//! - **Ledger**: credit, debit, balance and history for one environment
//! - **Manager**: lazily opens and caches one ledger per environment
//!
//! # Invariants
//!
//! - A balance only changes in the same atomic write that appends its
//!   transaction
//! - Balance == Σ(transaction amounts) for every wallet
//! - Debits never take a balance below zero
//! - Environments never share a store

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod codec;
pub mod config;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod metrics;
pub mod query;
pub mod storage;
pub mod types;

// Re-exports
pub use config::{Config, StorageConfig, DEFAULT_ENVIRONMENT};
pub use error::{Error, Result};
pub use ledger::{Entry, EntryKind, History, Ledger, Pagination, Receipt};
pub use manager::LedgerManager;
pub use metrics::Metrics;
pub use query::{ListQuery, SortBy, SortOrder};
pub use storage::Store;
pub use types::{AdditionalData, Transaction, TransactionId, Value, Wallet};
