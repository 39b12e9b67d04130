use std::collections::HashMap;

use prometheus::{Encoder, GaugeVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::aggregate::EnrichedValidator;
use crate::error::Error;

/// Renders a registry as the Prometheus text exposition format.
pub fn render_registry(registry: &Registry) -> Result<String, Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|err| Error::Generic(Box::new(err)))
}

fn opts(name: &str, help: &str, const_labels: &HashMap<String, String>) -> Opts {
    Opts::new(name, help).const_labels(const_labels.clone())
}

/// The per-request gauge set for the validator snapshot. A fresh registry and
/// fresh gauges are built for every request, so no metric state leaks between
/// concurrent requests and nothing survives the response.
pub struct ValidatorGauges {
    registry: Registry,
    commission: GaugeVec,
    status: IntGaugeVec,
    jailed: IntGaugeVec,
    tokens: GaugeVec,
    delegator_shares: GaugeVec,
    min_self_delegation: GaugeVec,
    missed_blocks: IntGaugeVec,
    rank: IntGaugeVec,
    active: IntGaugeVec,
}

impl ValidatorGauges {
    pub fn new(const_labels: HashMap<String, String>) -> Result<Self, Error> {
        let registry = Registry::new();

        let commission = GaugeVec::new(
            opts(
                "cosmos_validators_commission",
                "Commission of the Cosmos-based blockchain validator",
                &const_labels,
            ),
            &["address", "moniker"],
        )?;
        let status = IntGaugeVec::new(
            opts(
                "cosmos_validators_status",
                "Status of the Cosmos-based blockchain validator",
                &const_labels,
            ),
            &["address", "moniker"],
        )?;
        let jailed = IntGaugeVec::new(
            opts(
                "cosmos_validators_jailed",
                "Jailed status of the Cosmos-based blockchain validator",
                &const_labels,
            ),
            &["address", "moniker"],
        )?;
        let tokens = GaugeVec::new(
            opts(
                "cosmos_validators_tokens",
                "Tokens of the Cosmos-based blockchain validator",
                &const_labels,
            ),
            &["address", "moniker", "denom"],
        )?;
        let delegator_shares = GaugeVec::new(
            opts(
                "cosmos_validators_delegator_shares",
                "Delegator shares of the Cosmos-based blockchain validator",
                &const_labels,
            ),
            &["address", "moniker", "denom"],
        )?;
        let min_self_delegation = GaugeVec::new(
            opts(
                "cosmos_validators_min_self_delegation",
                "Self declared minimum self delegation of the Cosmos-based blockchain validator",
                &const_labels,
            ),
            &["address", "moniker", "denom"],
        )?;
        let missed_blocks = IntGaugeVec::new(
            opts(
                "cosmos_validators_missed_blocks",
                "Missed blocks of the Cosmos-based blockchain validator",
                &const_labels,
            ),
            &["address", "moniker"],
        )?;
        let rank = IntGaugeVec::new(
            opts(
                "cosmos_validators_rank",
                "Rank of the Cosmos-based blockchain validator",
                &const_labels,
            ),
            &["address", "moniker"],
        )?;
        let active = IntGaugeVec::new(
            opts(
                "cosmos_validators_active",
                "1 if the Cosmos-based blockchain validator is in active set, 0 if no",
                &const_labels,
            ),
            &["address", "pubkey_hash", "moniker"],
        )?;

        registry.register(Box::new(commission.clone()))?;
        registry.register(Box::new(status.clone()))?;
        registry.register(Box::new(jailed.clone()))?;
        registry.register(Box::new(tokens.clone()))?;
        registry.register(Box::new(delegator_shares.clone()))?;
        registry.register(Box::new(min_self_delegation.clone()))?;
        registry.register(Box::new(missed_blocks.clone()))?;
        registry.register(Box::new(rank.clone()))?;
        registry.register(Box::new(active.clone()))?;

        Ok(ValidatorGauges {
            registry,
            commission,
            status,
            jailed,
            tokens,
            delegator_shares,
            min_self_delegation,
            missed_blocks,
            rank,
            active,
        })
    }

    /// Records one enriched validator. Absent optional fields produce no
    /// sample at all rather than a zero.
    pub fn record(&self, enriched: &EnrichedValidator, denom: &str) {
        let address = enriched.validator.operator_address.as_str();
        let moniker = enriched.validator.moniker();

        if let Some(rate) = enriched.commission_rate {
            self.commission.with_label_values(&[address, moniker]).set(rate);
        }

        self.status
            .with_label_values(&[address, moniker])
            .set(enriched.validator.status.code());
        self.jailed
            .with_label_values(&[address, moniker])
            .set(enriched.validator.jailed as i64);

        if let Some(tokens) = enriched.tokens {
            self.tokens
                .with_label_values(&[address, moniker, denom])
                .set(tokens);
        }
        if let Some(shares) = enriched.delegator_shares {
            self.delegator_shares
                .with_label_values(&[address, moniker, denom])
                .set(shares);
        }
        if let Some(min_self) = enriched.min_self_delegation {
            self.min_self_delegation
                .with_label_values(&[address, moniker, denom])
                .set(min_self);
        }
        if let Some(missed) = enriched.missed_blocks {
            self.missed_blocks
                .with_label_values(&[address, moniker])
                .set(missed);
        }

        self.rank
            .with_label_values(&[address, moniker])
            .set(enriched.rank as i64);

        // the active gauge carries the pubkey hash, so it needs both a known
        // active-set verdict and a derived consensus address
        if let (Some(active), Some(cons_address)) = (enriched.active, &enriched.cons_address) {
            self.active
                .with_label_values(&[address, &cons_address.to_hex_upper(), moniker])
                .set(active as i64);
        }
    }

    pub fn render(&self) -> Result<String, Error> {
        render_registry(&self.registry)
    }
}

/// Per-request gauge for the pending upgrade plan.
pub struct UpgradeGauge {
    registry: Registry,
    plan: GaugeVec,
}

impl UpgradeGauge {
    pub fn new(const_labels: HashMap<String, String>) -> Result<Self, Error> {
        let registry = Registry::new();
        let plan = GaugeVec::new(
            opts(
                "cosmos_upgrade_plan",
                "Upgrade plan info in height",
                &const_labels,
            ),
            &["info", "name", "height", "estimated_time"],
        )?;
        registry.register(Box::new(plan.clone()))?;

        Ok(UpgradeGauge { registry, plan })
    }

    /// No plan is pending (or it is already in the past).
    pub fn set_none(&self) {
        self.plan
            .with_label_values(&["None", "None", "", ""])
            .set(0.0);
    }

    pub fn set_plan(&self, info: &str, name: &str, height: i64, estimated_time: &str, remaining: i64) {
        self.plan
            .with_label_values(&[info, name, &height.to_string(), estimated_time])
            .set(remaining as f64);
    }

    pub fn render(&self) -> Result<String, Error> {
        render_registry(&self.registry)
    }
}

/// Per-request gauge for the delegation count of a single validator.
pub struct DelegationGauge {
    registry: Registry,
    total: IntGaugeVec,
}

impl DelegationGauge {
    pub fn new(const_labels: HashMap<String, String>) -> Result<Self, Error> {
        let registry = Registry::new();
        let total = IntGaugeVec::new(
            opts(
                "cosmos_validator_delegator_total",
                "Number of delegators in validator",
                &const_labels,
            ),
            &["validator_address"],
        )?;
        registry.register(Box::new(total.clone()))?;

        Ok(DelegationGauge { registry, total })
    }

    pub fn record(&self, validator_address: &str, count: u64) {
        self.total
            .with_label_values(&[validator_address])
            .set(count as i64);
    }

    pub fn render(&self) -> Result<String, Error> {
        render_registry(&self.registry)
    }
}
