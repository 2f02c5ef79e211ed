//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `loyalty_registrations_total` - Users registered
//! - `loyalty_deposits_total` - Deposits applied
//! - `loyalty_referral_credits_total` - Referrers credited
//! - `loyalty_proofs_total` - Proofs generated
//! - `loyalty_proof_failures_total` - Proof requests whose target was absent
//! - `loyalty_side_effect_failures_total` - Swallowed cache/mail failures
//! - `loyalty_users` - Registered users

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Users registered
    pub registrations_total: IntCounter,

    /// Deposits applied
    pub deposits_total: IntCounter,

    /// Referrers credited
    pub referral_credits_total: IntCounter,

    /// Proofs generated
    pub proofs_total: IntCounter,

    /// Proof requests rejected because the target was absent
    pub proof_failures_total: IntCounter,

    /// Best-effort side effects that failed
    pub side_effect_failures_total: IntCounter,

    /// Registered users
    pub users: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let registrations_total =
            IntCounter::new("loyalty_registrations_total", "Users registered")?;
        registry.register(Box::new(registrations_total.clone()))?;

        let deposits_total = IntCounter::new("loyalty_deposits_total", "Deposits applied")?;
        registry.register(Box::new(deposits_total.clone()))?;

        let referral_credits_total =
            IntCounter::new("loyalty_referral_credits_total", "Referrers credited")?;
        registry.register(Box::new(referral_credits_total.clone()))?;

        let proofs_total = IntCounter::new("loyalty_proofs_total", "Proofs generated")?;
        registry.register(Box::new(proofs_total.clone()))?;

        let proof_failures_total = IntCounter::new(
            "loyalty_proof_failures_total",
            "Proof requests whose target was absent",
        )?;
        registry.register(Box::new(proof_failures_total.clone()))?;

        let side_effect_failures_total = IntCounter::new(
            "loyalty_side_effect_failures_total",
            "Best-effort cache or mail failures",
        )?;
        registry.register(Box::new(side_effect_failures_total.clone()))?;

        let users = IntGauge::new("loyalty_users", "Registered users")?;
        registry.register(Box::new(users.clone()))?;

        Ok(Self {
            registrations_total,
            deposits_total,
            referral_credits_total,
            proofs_total,
            proof_failures_total,
            side_effect_failures_total,
            users,
            registry,
        })
    }

    /// Record a committed registration, with or without referrer credit.
    ///
    /// Users are never removed, so the gauge moves by increments only and
    /// the order in which concurrent registrations report does not matter.
    pub fn record_registration(&self, referred: bool) {
        self.registrations_total.inc();
        if referred {
            self.referral_credits_total.inc();
        }
        self.users.inc();
    }

    /// Record a deposit
    pub fn record_deposit(&self) {
        self.deposits_total.inc();
    }

    /// Record a proof request outcome
    pub fn record_proof(&self, found: bool) {
        if found {
            self.proofs_total.inc();
        } else {
            self.proof_failures_total.inc();
        }
    }

    /// Record a swallowed side-effect failure
    pub fn record_side_effect_failure(&self) {
        self.side_effect_failures_total.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text format
    pub fn encode(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
