//! Error types for the wallet ledger

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Credit or debit requested with a non-positive amount
    #[error("Invalid amount: {0} (amount must be positive)")]
    InvalidAmount(Decimal),

    /// Debit exceeds the wallet's available balance
    #[error("Insufficient funds in wallet {wallet_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Wallet that was debited
        wallet_id: String,
        /// Balance observed inside the transaction
        balance: Decimal,
        /// Requested debit amount
        requested: Decimal,
    },

    /// Environment name cannot be used as a store directory
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    /// Store could not be opened (I/O failure, lock held by another process)
    #[error("Failed to open store at {path}: {reason}")]
    StoreOpen {
        /// Store directory
        path: String,
        /// Underlying cause
        reason: String,
    },

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Operation attempted on a store that has been closed
    #[error("Store is closed")]
    StoreClosed,

    /// Stored bytes do not decode to the expected record
    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    /// Record could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than the
    /// ledger or its storage.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidAmount(_) | Error::InsufficientFunds { .. } | Error::InvalidEnvironment(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}
