//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Balance conservation: balance == Σ(transaction amounts)
//! - No overdraft: a debit succeeds iff the balance covers it
//! - Windowing: a page holds min(limit, max(0, total - offset)) items
//! - Ordering: pages are sorted by the requested field and direction

use proptest::prelude::*;
use rust_decimal::Decimal;
use wallet_ledger::{
    codec, query, AdditionalData, Error, Ledger, ListQuery, SortBy, SortOrder, StorageConfig,
    Transaction, TransactionId,
};

/// Strategy for generating valid amounts (positive, two decimal places)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..100_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Strategy for a credit (true) or debit (false) with its amount
fn entry_strategy() -> impl Strategy<Value = (bool, Decimal)> {
    (any::<bool>(), amount_strategy())
}

fn sort_by_strategy() -> impl Strategy<Value = SortBy> {
    prop_oneof![Just(SortBy::Timestamp), Just(SortBy::Amount)]
}

fn sort_order_strategy() -> impl Strategy<Value = SortOrder> {
    prop_oneof![Just(SortOrder::Asc), Just(SortOrder::Desc)]
}

/// Transactions with deliberately colliding timestamps and amounts
fn transactions_strategy() -> impl Strategy<Value = Vec<Transaction>> {
    prop::collection::vec((0i64..20, -5i64..5), 0..40).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (ts, amount))| Transaction {
                id: TransactionId::from_nanos(i as i64),
                wallet_id: "W".to_string(),
                amount: Decimal::from(amount),
                description: format!("row {}", i),
                additional_data: AdditionalData::new(),
                timestamp: chrono::DateTime::from_timestamp(ts, 0).unwrap(),
            })
            .collect()
    })
}

/// Create test ledger with temp directory
fn create_test_ledger() -> (Ledger, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let ledger = Ledger::open("prop", temp_dir.path(), &StorageConfig::default()).unwrap();
    (ledger, temp_dir)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: balance tracks a simple model and always equals the log sum
    #[test]
    fn prop_balance_equals_sum_of_log(entries in prop::collection::vec(entry_strategy(), 1..30)) {
        let (ledger, _temp) = create_test_ledger();
        let mut expected = Decimal::ZERO;
        let mut committed = 0usize;

        for (is_credit, amount) in entries {
            if is_credit {
                ledger.credit("W", amount, "credit", AdditionalData::new()).unwrap();
                expected += amount;
                committed += 1;
            } else {
                match ledger.debit("W", amount, "debit", AdditionalData::new()) {
                    Ok(tx) => {
                        prop_assert!(expected >= amount);
                        prop_assert_eq!(tx.amount, -amount);
                        expected -= amount;
                        committed += 1;
                    }
                    Err(Error::InsufficientFunds { balance, .. }) => {
                        prop_assert!(expected < amount);
                        prop_assert_eq!(balance, expected);
                    }
                    Err(err) => prop_assert!(false, "unexpected error: {}", err),
                }
            }
            prop_assert!(ledger.get_wallet_balance("W").unwrap() >= Decimal::ZERO);
        }

        let log = ledger.list_transactions("W", &ListQuery::new(usize::MAX, 0)).unwrap();
        let sum: Decimal = log.iter().map(|t| t.amount).sum();

        prop_assert_eq!(log.len(), committed);
        prop_assert_eq!(ledger.get_wallet_balance("W").unwrap(), expected);
        prop_assert_eq!(sum, expected);
    }

    /// Property: a page never exceeds the limit or runs past the end
    #[test]
    fn prop_window_size(
        transactions in transactions_strategy(),
        limit in 1usize..60,
        offset in 0usize..60,
        sort_by in sort_by_strategy(),
        sort_order in sort_order_strategy(),
    ) {
        let total = transactions.len();
        let page = ListQuery::new(limit, offset).sorted(sort_by, sort_order).apply(transactions);
        prop_assert_eq!(page.len(), limit.min(total.saturating_sub(offset)));
    }

    /// Property: sorting orders by the field and keeps ties in input order
    #[test]
    fn prop_sorted_and_stable(
        transactions in transactions_strategy(),
        sort_by in sort_by_strategy(),
        sort_order in sort_order_strategy(),
    ) {
        let mut sorted = transactions.clone();
        query::sort_transactions(&mut sorted, sort_by, sort_order);

        for pair in sorted.windows(2) {
            let ordering = match sort_by {
                SortBy::Timestamp => pair[0].timestamp.cmp(&pair[1].timestamp),
                SortBy::Amount => pair[0].amount.cmp(&pair[1].amount),
            };
            match sort_order {
                SortOrder::Asc => prop_assert!(ordering.is_le()),
                SortOrder::Desc => prop_assert!(ordering.is_ge()),
            }
            // IDs were assigned in input order
            if ordering.is_eq() {
                prop_assert!(pair[0].id < pair[1].id);
            }
        }
    }

    /// Property: raw parameters always yield a usable query
    #[test]
    fn prop_from_params_is_total(
        limit in proptest::option::of(".{0,8}"),
        offset in proptest::option::of(".{0,8}"),
        sort_by in proptest::option::of(".{0,10}"),
        sort_order in proptest::option::of(".{0,6}"),
    ) {
        let query = ListQuery::from_params(
            limit.as_deref(),
            offset.as_deref(),
            sort_by.as_deref(),
            sort_order.as_deref(),
        );
        prop_assert!(query.limit > 0);
    }

    /// Property: key order within a wallet follows ID order
    #[test]
    fn prop_wallet_keys_follow_id_order(a in 0i64..i64::MAX, b in 0i64..i64::MAX) {
        let (id_a, id_b) = (TransactionId::from_nanos(a), TransactionId::from_nanos(b));
        let key_a = codec::wallet_transaction_key("W", &id_a);
        let key_b = codec::wallet_transaction_key("W", &id_b);
        prop_assert_eq!(a.cmp(&b), id_a.cmp(&id_b));
        prop_assert_eq!(a.cmp(&b), key_a.cmp(&key_b));
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    #[test]
    fn test_history_is_newest_first_by_default() {
        let (ledger, _temp) = create_test_ledger();
        for cents in [100, 200, 300] {
            ledger
                .credit("W", Decimal::new(cents, 2), "credit", AdditionalData::new())
                .unwrap();
        }

        let page = ledger.list_transactions("W", &ListQuery::default()).unwrap();
        let amounts: Vec<_> = page.iter().map(|t| t.amount).collect();
        assert_eq!(
            amounts,
            vec![Decimal::new(300, 2), Decimal::new(200, 2), Decimal::new(100, 2)]
        );
        assert!(page.windows(2).all(|w| w[0].id > w[1].id));
    }
}
