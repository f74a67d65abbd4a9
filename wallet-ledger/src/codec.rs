//! Record encoding and key layout
//!
//! # Key layout
//!
//! All records live in one ordered keyspace, separated by a two-byte tag:
//!
//! - `w/` + wallet_id - wallet balance record
//! - `t/` + transaction_id - transaction, looked up by ID
//! - `x/` + len(wallet_id) (u32 BE) + wallet_id + transaction_id - the same
//!   transaction, grouped per wallet
//!
//! The length prefix in the `x/` keys means one wallet's scan prefix can
//! never match another wallet's keys, whatever bytes the wallet IDs contain.
//! Transaction IDs are fixed-width and chronological, so a forward scan of a
//! wallet's prefix returns its history oldest first.

use crate::{
    error::{Error, Result},
    types::{Transaction, TransactionId, Wallet},
};
use bincode::Options;

/// Wallet record tag
pub const WALLET_PREFIX: &[u8] = b"w/";

/// Transaction-by-ID tag
pub const TRANSACTION_PREFIX: &[u8] = b"t/";

/// Transaction-by-wallet tag
pub const WALLET_TRANSACTION_PREFIX: &[u8] = b"x/";

/// Upper bound for a single decoded record
const MAX_RECORD_BYTES: u64 = 16 * 1024 * 1024;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_RECORD_BYTES)
        .reject_trailing_bytes()
}

/// Key of a wallet record
pub fn wallet_key(wallet_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(WALLET_PREFIX.len() + wallet_id.len());
    key.extend_from_slice(WALLET_PREFIX);
    key.extend_from_slice(wallet_id.as_bytes());
    key
}

/// Primary key of a transaction
pub fn transaction_key(id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(TRANSACTION_PREFIX.len() + id.as_str().len());
    key.extend_from_slice(TRANSACTION_PREFIX);
    key.extend_from_slice(id.as_str().as_bytes());
    key
}

/// Prefix shared by every wallet-scoped transaction key of one wallet
pub fn wallet_transactions_prefix(wallet_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(WALLET_TRANSACTION_PREFIX.len() + 4 + wallet_id.len() + 20);
    key.extend_from_slice(WALLET_TRANSACTION_PREFIX);
    key.extend_from_slice(&(wallet_id.len() as u32).to_be_bytes());
    key.extend_from_slice(wallet_id.as_bytes());
    key
}

/// Wallet-scoped key of a transaction
pub fn wallet_transaction_key(wallet_id: &str, id: &TransactionId) -> Vec<u8> {
    let mut key = wallet_transactions_prefix(wallet_id);
    key.extend_from_slice(id.as_str().as_bytes());
    key
}

/// Encode a wallet record
pub fn encode_wallet(wallet: &Wallet) -> Result<Vec<u8>> {
    options()
        .serialize(wallet)
        .map_err(|e| Error::Serialization(format!("wallet {}: {}", wallet.wallet_id, e)))
}

/// Decode a wallet record
pub fn decode_wallet(bytes: &[u8]) -> Result<Wallet> {
    options()
        .deserialize(bytes)
        .map_err(|e| Error::CorruptRecord(format!("wallet: {}", e)))
}

/// Encode a transaction record
pub fn encode_transaction(transaction: &Transaction) -> Result<Vec<u8>> {
    options()
        .serialize(transaction)
        .map_err(|e| Error::Serialization(format!("transaction {}: {}", transaction.id, e)))
}

/// Decode a transaction record
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction> {
    options()
        .deserialize(bytes)
        .map_err(|e| Error::CorruptRecord(format!("transaction: {}", e)))
}
