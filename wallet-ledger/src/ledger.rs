//! Wallet balances and transaction history for one environment
//!
//! Every balance change runs as one store transaction that locks the wallet
//! record, rewrites it, and appends the transaction under both of its keys.
//! The balance and the log therefore never disagree: either all three
//! writes are committed or none are.
//!
//! # Example
//!
//! ```no_run
//! use rust_decimal::Decimal;
//! use wallet_ledger::{AdditionalData, Ledger, ListQuery, StorageConfig};
//!
//! fn main() -> wallet_ledger::Result<()> {
//!     let ledger = Ledger::open("production", "./data/production", &StorageConfig::default())?;
//!
//!     ledger.credit("player-1", Decimal::new(10000, 2), "Daily reward", AdditionalData::new())?;
//!     let balance = ledger.get_wallet_balance("player-1")?;
//!     let recent = ledger.list_transactions("player-1", &ListQuery::default())?;
//!
//!     assert_eq!(recent.len(), 1);
//!     assert_eq!(balance, Decimal::new(10000, 2));
//!     Ok(())
//! }
//! ```

use crate::{
    codec,
    config::StorageConfig,
    metrics::Metrics,
    query::ListQuery,
    storage::{ReadTxn, Store},
    types::{AdditionalData, IdGenerator, Transaction, TransactionId, Wallet},
    Error, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Direction of a balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Add funds
    Credit,
    /// Remove funds
    Debit,
}

/// A requested balance change
#[derive(Debug, Clone)]
pub struct Entry {
    /// Credit or debit
    pub kind: EntryKind,
    /// Wallet to change
    pub wallet_id: String,
    /// Unsigned amount, must be positive
    pub amount: Decimal,
    /// Free-text description
    pub description: String,
    /// Opaque caller data
    pub additional_data: AdditionalData,
}

impl Entry {
    /// Credit `amount` to `wallet_id`
    pub fn credit(wallet_id: impl Into<String>, amount: Decimal, description: impl Into<String>) -> Self {
        Self::new(EntryKind::Credit, wallet_id.into(), amount, description.into())
    }

    /// Debit `amount` from `wallet_id`
    pub fn debit(wallet_id: impl Into<String>, amount: Decimal, description: impl Into<String>) -> Self {
        Self::new(EntryKind::Debit, wallet_id.into(), amount, description.into())
    }

    fn new(kind: EntryKind, wallet_id: String, amount: Decimal, description: String) -> Self {
        Self {
            kind,
            wallet_id,
            amount,
            description,
            additional_data: AdditionalData::new(),
        }
    }

    /// Attach caller data
    pub fn with_data(mut self, additional_data: AdditionalData) -> Self {
        self.additional_data = additional_data;
        self
    }
}

/// Result of a committed entry
#[derive(Debug, Clone, PartialEq)]
pub struct Receipt {
    /// The appended transaction
    pub transaction: Transaction,
    /// The wallet as committed together with it
    pub wallet: Wallet,
}

/// Pagination echo for a history page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Requested limit
    pub limit: usize,
    /// Requested offset
    pub offset: usize,
    /// Number of transactions returned
    pub count: usize,
}

/// One page of a wallet's history, read from a single snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    /// Sorted, windowed transactions
    pub transactions: Vec<Transaction>,
    /// Wallet state in the same snapshot
    pub wallet: Wallet,
    /// Window information
    pub pagination: Pagination,
}

/// Ledger for one environment
#[derive(Debug)]
pub struct Ledger {
    environment: String,
    store: Store,
    ids: IdGenerator,
    metrics: Metrics,
}

impl Ledger {
    /// Open the ledger stored at `path` with its own metrics registry
    pub fn open(environment: &str, path: impl AsRef<Path>, config: &StorageConfig) -> Result<Self> {
        Self::open_with_metrics(environment, path, config, Metrics::new()?)
    }

    /// Open the ledger stored at `path`, reporting into `metrics`
    pub fn open_with_metrics(
        environment: &str,
        path: impl AsRef<Path>,
        config: &StorageConfig,
        metrics: Metrics,
    ) -> Result<Self> {
        let store = Store::open(path, config)?;

        // Never reuse an ID already on disk, even if the clock went backwards
        let last = store.view(|txn| match txn.last_with_prefix(codec::TRANSACTION_PREFIX)? {
            Some((_, value)) => Ok(codec::decode_transaction(&value)?.id.nanos()),
            None => Ok(None),
        })?;
        let ids = match last {
            Some(nanos) => IdGenerator::starting_after(nanos),
            None => IdGenerator::new(),
        };

        Ok(Self {
            environment: environment.to_string(),
            store,
            ids,
            metrics,
        })
    }

    /// Environment name
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Underlying store
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Get a wallet. A wallet with no recorded activity is returned with a
    /// zero balance; absence is not an error.
    pub fn get_wallet(&self, wallet_id: &str) -> Result<Wallet> {
        self.store.view(|txn| read_wallet(txn, wallet_id))
    }

    /// Balance of a wallet, zero if it has no recorded activity
    pub fn get_wallet_balance(&self, wallet_id: &str) -> Result<Decimal> {
        Ok(self.get_wallet(wallet_id)?.balance)
    }

    /// Add `amount` to a wallet and record the transaction
    pub fn credit(
        &self,
        wallet_id: &str,
        amount: Decimal,
        description: &str,
        additional_data: AdditionalData,
    ) -> Result<Transaction> {
        let entry = Entry::credit(wallet_id, amount, description).with_data(additional_data);
        Ok(self.post(entry)?.transaction)
    }

    /// Remove `amount` from a wallet and record the transaction.
    ///
    /// Fails with [`Error::InsufficientFunds`] if the wallet has less than
    /// `amount`, including when it has never been credited.
    pub fn debit(
        &self,
        wallet_id: &str,
        amount: Decimal,
        description: &str,
        additional_data: AdditionalData,
    ) -> Result<Transaction> {
        let entry = Entry::debit(wallet_id, amount, description).with_data(additional_data);
        Ok(self.post(entry)?.transaction)
    }

    /// Apply an entry atomically and return what was committed
    pub fn post(&self, entry: Entry) -> Result<Receipt> {
        if entry.amount <= Decimal::ZERO {
            self.metrics.record_rejection(&self.environment, "invalid_amount");
            return Err(Error::InvalidAmount(entry.amount));
        }

        let Entry {
            kind,
            wallet_id,
            amount,
            description,
            additional_data,
        } = entry;

        let result = self.store.update(|txn| {
            let wallet_key = codec::wallet_key(&wallet_id);
            let current = match txn.get_for_update(&wallet_key)? {
                Some(bytes) => Some(decode_owned_wallet(&bytes, &wallet_id)?),
                None => None,
            };

            let (balance, signed_amount) = match kind {
                EntryKind::Credit => {
                    let balance = current
                        .map_or(Decimal::ZERO, |w| w.balance)
                        .checked_add(amount)
                        .ok_or(Error::InvalidAmount(amount))?;
                    (balance, amount)
                }
                EntryKind::Debit => match current {
                    Some(wallet) if wallet.balance >= amount => (wallet.balance - amount, -amount),
                    other => {
                        return Err(Error::InsufficientFunds {
                            wallet_id: wallet_id.clone(),
                            balance: other.map_or(Decimal::ZERO, |w| w.balance),
                            requested: amount,
                        })
                    }
                },
            };

            // Issued under the wallet lock so per-wallet ID order is commit order
            let (id, timestamp) = self.ids.next();

            let wallet = Wallet {
                wallet_id: wallet_id.clone(),
                balance,
            };
            let transaction = Transaction {
                id,
                wallet_id: wallet_id.clone(),
                amount: signed_amount,
                description,
                additional_data,
                timestamp,
            };

            let record = codec::encode_transaction(&transaction)?;
            txn.put(wallet_key, codec::encode_wallet(&wallet)?);
            txn.put(codec::transaction_key(&transaction.id), record.clone());
            txn.put(codec::wallet_transaction_key(&wallet_id, &transaction.id), record);

            Ok(Receipt { transaction, wallet })
        });

        match &result {
            Ok(receipt) => {
                match kind {
                    EntryKind::Credit => self.metrics.record_credit(&self.environment),
                    EntryKind::Debit => self.metrics.record_debit(&self.environment),
                }
                tracing::debug!(
                    environment = %self.environment,
                    wallet_id = %receipt.wallet.wallet_id,
                    transaction_id = %receipt.transaction.id,
                    amount = %receipt.transaction.amount,
                    balance = %receipt.wallet.balance,
                    "Transaction committed"
                );
            }
            Err(Error::InsufficientFunds {
                wallet_id,
                balance,
                requested,
            }) => {
                self.metrics.record_rejection(&self.environment, "insufficient_funds");
                tracing::warn!(
                    environment = %self.environment,
                    wallet_id = %wallet_id,
                    balance = %balance,
                    requested = %requested,
                    "Debit rejected: insufficient funds"
                );
            }
            Err(err) => {
                tracing::error!(environment = %self.environment, error = %err, "Transaction failed");
            }
        }

        result
    }

    /// A wallet's transactions, sorted and windowed per `query`.
    ///
    /// An offset past the end yields an empty list.
    pub fn list_transactions(&self, wallet_id: &str, query: &ListQuery) -> Result<Vec<Transaction>> {
        let transactions = self.store.view(|txn| scan_wallet_transactions(txn, wallet_id))?;
        Ok(query.apply(transactions))
    }

    /// A page of history together with the wallet, from one snapshot
    pub fn history(&self, wallet_id: &str, query: &ListQuery) -> Result<History> {
        let (wallet, transactions) = self.store.view(|txn| {
            Ok((
                read_wallet(txn, wallet_id)?,
                scan_wallet_transactions(txn, wallet_id)?,
            ))
        })?;

        let transactions = query.apply(transactions);
        let pagination = Pagination {
            limit: query.limit,
            offset: query.offset,
            count: transactions.len(),
        };

        Ok(History {
            transactions,
            wallet,
            pagination,
        })
    }

    /// Look up a transaction by ID
    pub fn get_transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        self.store.view(|txn| {
            txn.get(&codec::transaction_key(id))?
                .map(|bytes| codec::decode_transaction(&bytes))
                .transpose()
        })
    }

    /// Compact the underlying store
    pub fn collect_garbage(&self) -> Result<()> {
        self.store.collect_garbage()
    }

    /// Close the underlying store
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }
}

fn read_wallet(txn: &ReadTxn<'_>, wallet_id: &str) -> Result<Wallet> {
    match txn.get(&codec::wallet_key(wallet_id))? {
        Some(bytes) => decode_owned_wallet(&bytes, wallet_id),
        None => Ok(Wallet::empty(wallet_id)),
    }
}

fn decode_owned_wallet(bytes: &[u8], wallet_id: &str) -> Result<Wallet> {
    let wallet = codec::decode_wallet(bytes)?;
    if wallet.wallet_id != wallet_id {
        return Err(Error::CorruptRecord(format!(
            "wallet key {} holds record for {}",
            wallet_id, wallet.wallet_id
        )));
    }
    Ok(wallet)
}

fn scan_wallet_transactions(txn: &ReadTxn<'_>, wallet_id: &str) -> Result<Vec<Transaction>> {
    let prefix = codec::wallet_transactions_prefix(wallet_id);
    txn.scan_prefix(&prefix)
        .map(|item| {
            let (_, value) = item?;
            codec::decode_transaction(&value)
        })
        .collect()
}
