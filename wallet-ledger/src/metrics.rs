//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `wallet_ledger_credits_total{environment}` - Committed credits
//! - `wallet_ledger_debits_total{environment}` - Committed debits
//! - `wallet_ledger_rejections_total{environment, reason}` - Postings refused
//!   before commit (`invalid_amount`, `insufficient_funds`)
//! - `wallet_ledger_environments_open` - Environments with an open store

use crate::Result;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector, shared by every ledger of one manager
#[derive(Clone)]
pub struct Metrics {
    /// Committed credits
    pub credits_total: IntCounterVec,

    /// Committed debits
    pub debits_total: IntCounterVec,

    /// Refused postings
    pub rejections_total: IntCounterVec,

    /// Open environments
    pub environments_open: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let credits_total = IntCounterVec::new(
            Opts::new("wallet_ledger_credits_total", "Total number of committed credits"),
            &["environment"],
        )?;
        registry.register(Box::new(credits_total.clone()))?;

        let debits_total = IntCounterVec::new(
            Opts::new("wallet_ledger_debits_total", "Total number of committed debits"),
            &["environment"],
        )?;
        registry.register(Box::new(debits_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "wallet_ledger_rejections_total",
                "Total number of postings rejected before commit",
            ),
            &["environment", "reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let environments_open = IntGauge::new(
            "wallet_ledger_environments_open",
            "Number of environments with an open store",
        )?;
        registry.register(Box::new(environments_open.clone()))?;

        Ok(Self {
            credits_total,
            debits_total,
            rejections_total,
            environments_open,
            registry,
        })
    }

    /// Record a committed credit
    pub fn record_credit(&self, environment: &str) {
        self.credits_total.with_label_values(&[environment]).inc();
    }

    /// Record a committed debit
    pub fn record_debit(&self, environment: &str) {
        self.debits_total.with_label_values(&[environment]).inc();
    }

    /// Record a refused posting
    pub fn record_rejection(&self, environment: &str, reason: &str) {
        self.rejections_total
            .with_label_values(&[environment, reason])
            .inc();
    }

    /// Gather metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::Error::Metrics(e.to_string()))
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}
