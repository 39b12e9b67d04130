use std::cmp::Reverse;
use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::client::ChainQuery;
use crate::collect::collect_paginated;
use crate::error::Error;
use crate::types::{share_sort_key, ConsAddress, SigningInfo, Validator};

/// One fully derived validator row, handed to the metrics sink in sorted
/// order. Optional fields are omitted rather than defaulted when the upstream
/// data could not be parsed, joined or derived.
#[derive(Debug, Clone)]
pub struct EnrichedValidator {
    pub validator: Validator,
    /// 1-indexed position in the sorted set.
    pub rank: usize,
    /// Active-set membership; None when max_validators is unknown or zero.
    pub active: Option<bool>,
    /// Only present for bonded validators with a signing-info match.
    pub missed_blocks: Option<i64>,
    pub commission_rate: Option<f64>,
    pub tokens: Option<f64>,
    pub delegator_shares: Option<f64>,
    pub min_self_delegation: Option<f64>,
    pub cons_address: Option<ConsAddress>,
}

/// Sorts the validator set in place: bonded validators first, then by
/// descending delegator shares compared exactly. The sort is stable, so
/// equal-share ties keep their upstream order across requests.
pub fn sort_validators(validators: &mut [Validator]) {
    validators.sort_by_cached_key(|validator| {
        let shares = share_sort_key(&validator.delegator_shares);
        if shares.is_none() {
            error!(
                address = %validator.operator_address,
                shares = %validator.delegator_shares,
                "could not parse delegator shares for ordering"
            );
        }
        // unparseable shares order after every parseable amount in their
        // bonded class
        (Reverse(validator.is_bonded()), Reverse(shares))
    });
}

/// Lookup table from bech32 consensus address to missed-blocks counter,
/// built from the bulk signing-info pages.
pub struct SigningInfoIndex {
    by_address: HashMap<String, i64>,
}

impl SigningInfoIndex {
    pub fn new(infos: &[SigningInfo]) -> Self {
        let mut by_address = HashMap::with_capacity(infos.len());
        for info in infos {
            match info.missed_blocks() {
                Some(missed) => {
                    by_address.insert(info.address.clone(), missed);
                }
                None => warn!(
                    address = %info.address,
                    counter = %info.missed_blocks_counter,
                    "could not parse missed blocks counter"
                ),
            }
        }
        SigningInfoIndex { by_address }
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    /// Resolves the missed-blocks counter for one validator. Addresses absent
    /// from the bulk pages get a single fallback lookup; a failed fallback is
    /// expected for validators that never signed and is logged at debug level
    /// only.
    pub async fn missed_blocks<C: ChainQuery>(
        &self,
        client: &C,
        cons_address: &str,
        operator_address: &str,
    ) -> Option<i64> {
        if let Some(&missed) = self.by_address.get(cons_address) {
            return Some(missed);
        }

        match client.signing_info(cons_address).await {
            Ok(info) => info.missed_blocks(),
            Err(err) => {
                debug!(
                    address = %operator_address,
                    %err,
                    "could not get signing info for validator"
                );
                None
            }
        }
    }
}

/// Active-set bookkeeping for the single derivation pass. A validator is
/// active unless jailed, and only while capacity remains; jailed validators
/// never consume capacity. Bonded status deliberately plays no part here.
pub struct ActiveSetCounter {
    max_validators: u32,
    active_count: u32,
}

impl ActiveSetCounter {
    pub fn new(max_validators: u32) -> Self {
        ActiveSetCounter {
            max_validators,
            active_count: 0,
        }
    }

    /// Decides the active flag for the next validator in sorted order.
    /// Returns None when active-set computation is disabled (max_validators
    /// of zero, including the staking-params fetch having failed).
    pub fn admit(&mut self, jailed: bool) -> Option<bool> {
        if self.max_validators == 0 {
            return None;
        }

        let mut active = !jailed;
        if self.active_count == self.max_validators {
            active = false;
        }
        if active {
            self.active_count += 1;
        }

        Some(active)
    }

    pub fn active_count(&self) -> u32 {
        self.active_count
    }
}

fn parse_decimal(raw: &str, field: &'static str, operator_address: &str) -> Option<f64> {
    match raw.parse::<f64>() {
        Ok(value) => Some(value),
        Err(err) => {
            error!(address = %operator_address, field, value = raw, %err, "could not parse decimal amount");
            None
        }
    }
}

/// Runs the full aggregation: three concurrent upstream fetches joined by a
/// barrier, then one sequential pass deriving rank, active-set membership,
/// missed blocks and scaled amounts per validator.
///
/// Any upstream failure degrades its own data source (empty validator set,
/// empty signing infos, or no active-set computation) instead of failing the
/// request, so the worst case is a sparser snapshot, never an error.
pub async fn aggregate_validators<C: ChainQuery>(
    client: &C,
    valcons_prefix: &str,
    denom_coefficient: f64,
    page_limit: u64,
) -> Vec<EnrichedValidator> {
    let (mut validators, signing_infos, params) = tokio::join!(
        collect_paginated("validators", |offset| client.validators(offset, page_limit)),
        collect_paginated("signing_infos", |offset| client
            .signing_infos(offset, page_limit)),
        client.staking_params(),
    );

    let max_validators = match params {
        Ok(params) => params.max_validators,
        Err(err) => {
            error!(%err, "could not get staking params");
            0
        }
    };

    info!(
        validators = validators.len(),
        signing_infos = signing_infos.len(),
        max_validators,
        "collected validator set"
    );

    sort_validators(&mut validators);

    let index = SigningInfoIndex::new(&signing_infos);
    let mut counter = ActiveSetCounter::new(max_validators);
    let mut enriched = Vec::with_capacity(validators.len());

    for (position, validator) in validators.into_iter().enumerate() {
        let operator_address = validator.operator_address.clone();

        let commission_rate =
            parse_decimal(validator.commission_rate(), "commission_rate", &operator_address);
        let tokens = parse_decimal(&validator.tokens, "tokens", &operator_address)
            .map(|value| value / denom_coefficient);
        let delegator_shares =
            parse_decimal(&validator.delegator_shares, "delegator_shares", &operator_address)
                .map(|value| value / denom_coefficient);
        let min_self_delegation = parse_decimal(
            &validator.min_self_delegation,
            "min_self_delegation",
            &operator_address,
        )
        .map(|value| value / denom_coefficient);

        let cons_address = match validator.consensus_address() {
            Ok(address) => Some(address),
            Err(err) => {
                error!(address = %operator_address, %err, "could not derive consensus address");
                None
            }
        };

        let mut missed_blocks = None;
        if let Some(address) = &cons_address {
            match address.to_bech32(valcons_prefix) {
                Ok(bech32_address) => {
                    let found = index
                        .missed_blocks(client, &bech32_address, &operator_address)
                        .await;
                    if validator.is_bonded() {
                        missed_blocks = found;
                    } else {
                        debug!(
                            address = %operator_address,
                            "validator is not bonded, not returning missed blocks amount"
                        );
                    }
                }
                Err(err) => {
                    error!(address = %operator_address, %err, "could not encode consensus address")
                }
            }
        }

        let active = counter.admit(validator.jailed);

        enriched.push(EnrichedValidator {
            rank: position + 1,
            active,
            missed_blocks,
            commission_rate,
            tokens,
            delegator_shares,
            min_self_delegation,
            cons_address,
            validator,
        });
    }

    info!(active_validators = counter.active_count(), "derived validator records");
    enriched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        BlockStub, BondStatus, Commission, CommissionRates, ConsensusPubkey, Description,
        StakingParams, UpgradePlan,
    };
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use sha2::{Digest, Sha256};
    use std::sync::Mutex;

    const VALCONS_PREFIX: &str = "cosmosvalcons";

    fn validator(operator: &str, status: BondStatus, jailed: bool, shares: &str) -> Validator {
        // deterministic per-operator consensus key so tests can derive the
        // matching valcons address
        let key: [u8; 32] = Sha256::digest(operator.as_bytes()).into();
        Validator {
            operator_address: operator.to_string(),
            consensus_pubkey: Some(ConsensusPubkey {
                type_url: "/cosmos.crypto.ed25519.PubKey".to_string(),
                key: BASE64.encode(key),
            }),
            jailed,
            status,
            tokens: "1000000".to_string(),
            delegator_shares: shares.to_string(),
            description: Description {
                moniker: format!("moniker-{operator}"),
            },
            commission: Commission {
                commission_rates: CommissionRates {
                    rate: "0.100000000000000000".to_string(),
                },
            },
            min_self_delegation: "1".to_string(),
        }
    }

    fn valcons(validator: &Validator) -> String {
        validator
            .consensus_address()
            .unwrap()
            .to_bech32(VALCONS_PREFIX)
            .unwrap()
    }

    fn signing_info(address: &str, missed: i64) -> SigningInfo {
        SigningInfo {
            address: address.to_string(),
            missed_blocks_counter: missed.to_string(),
        }
    }

    /// Scripted upstream: serves validators and signing infos with real
    /// offset/limit pagination, records fallback lookups, and can fail any
    /// individual source.
    struct MockChain {
        validators: Vec<Validator>,
        signing_infos: Vec<SigningInfo>,
        fallback: HashMap<String, SigningInfo>,
        params: Option<StakingParams>,
        fail_validators: bool,
        fail_signing_infos: bool,
        fallback_lookups: Mutex<Vec<String>>,
    }

    impl MockChain {
        fn new(validators: Vec<Validator>, signing_infos: Vec<SigningInfo>) -> Self {
            MockChain {
                validators,
                signing_infos,
                fallback: HashMap::new(),
                params: Some(StakingParams { max_validators: 100 }),
                fail_validators: false,
                fail_signing_infos: false,
                fallback_lookups: Mutex::new(Vec::new()),
            }
        }

        fn with_max_validators(mut self, max_validators: u32) -> Self {
            self.params = Some(StakingParams { max_validators });
            self
        }

        fn with_params_failure(mut self) -> Self {
            self.params = None;
            self
        }

        fn with_fallback(mut self, info: SigningInfo) -> Self {
            self.fallback.insert(info.address.clone(), info);
            self
        }

        fn page<T: Clone>(items: &[T], offset: u64, limit: u64) -> Vec<T> {
            items
                .iter()
                .skip(offset as usize)
                .take(limit as usize)
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl ChainQuery for MockChain {
        async fn validators(&self, offset: u64, limit: u64) -> Result<Vec<Validator>, Error> {
            if self.fail_validators {
                return Err(Error::Generic("staking unavailable".into()));
            }
            Ok(Self::page(&self.validators, offset, limit))
        }

        async fn signing_infos(&self, offset: u64, limit: u64) -> Result<Vec<SigningInfo>, Error> {
            if self.fail_signing_infos {
                return Err(Error::Generic("slashing unavailable".into()));
            }
            Ok(Self::page(&self.signing_infos, offset, limit))
        }

        async fn signing_info(&self, cons_address: &str) -> Result<SigningInfo, Error> {
            self.fallback_lookups
                .lock()
                .unwrap()
                .push(cons_address.to_string());
            self.fallback
                .get(cons_address)
                .cloned()
                .ok_or_else(|| Error::Generic("no signing info".into()))
        }

        async fn staking_params(&self) -> Result<StakingParams, Error> {
            self.params
                .ok_or_else(|| Error::Generic("params unavailable".into()))
        }

        async fn current_upgrade_plan(&self) -> Result<Option<UpgradePlan>, Error> {
            Ok(None)
        }

        async fn latest_block(&self) -> Result<BlockStub, Error> {
            Err(Error::Generic("not scripted".into()))
        }

        async fn block(&self, _height: i64) -> Result<BlockStub, Error> {
            Err(Error::Generic("not scripted".into()))
        }

        async fn delegation_count(&self, _validator_address: &str) -> Result<u64, Error> {
            Ok(0)
        }
    }

    async fn aggregate(chain: &MockChain) -> Vec<EnrichedValidator> {
        aggregate_validators(chain, VALCONS_PREFIX, 1_000_000.0, 2).await
    }

    fn operators(enriched: &[EnrichedValidator]) -> Vec<&str> {
        enriched
            .iter()
            .map(|e| e.validator.operator_address.as_str())
            .collect()
    }

    #[tokio::test]
    async fn capacity_and_ordering_scenario() {
        // bonded 5000 outranks bonded 1000; unbonded 9999 goes last despite
        // the largest shares; capacity of one leaves only the leader active
        let chain = MockChain::new(
            vec![
                validator("val-a", BondStatus::Bonded, false, "1000.000000000000000000"),
                validator("val-b", BondStatus::Bonded, false, "5000.000000000000000000"),
                validator("val-c", BondStatus::Unbonded, false, "9999.000000000000000000"),
            ],
            vec![],
        )
        .with_max_validators(1);

        let enriched = aggregate(&chain).await;

        assert_eq!(operators(&enriched), vec!["val-b", "val-a", "val-c"]);
        assert_eq!(
            enriched.iter().map(|e| e.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(enriched[0].active, Some(true));
        assert_eq!(enriched[1].active, Some(false));
        // active-set membership ignores bonded status: the unbonded validator
        // still gets an explicit false once capacity is exhausted
        assert_eq!(enriched[2].active, Some(false));
    }

    #[tokio::test]
    async fn rank_is_a_permutation_and_bonded_dominate() {
        let chain = MockChain::new(
            vec![
                validator("u1", BondStatus::Unbonded, false, "70.000000000000000000"),
                validator("b1", BondStatus::Bonded, false, "10.000000000000000000"),
                validator("u2", BondStatus::Unbonding, false, "50.000000000000000000"),
                validator("b2", BondStatus::Bonded, true, "30.000000000000000000"),
                validator("b3", BondStatus::Bonded, false, "20.000000000000000000"),
            ],
            vec![],
        );

        let enriched = aggregate(&chain).await;

        let mut ranks: Vec<usize> = enriched.iter().map(|e| e.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, vec![1, 2, 3, 4, 5]);

        for pair in enriched.windows(2) {
            assert!(pair[0].validator.is_bonded() >= pair[1].validator.is_bonded());
        }
        assert_eq!(operators(&enriched), vec!["b2", "b3", "b1", "u1", "u2"]);
    }

    #[tokio::test]
    async fn equal_shares_keep_upstream_order() {
        let chain = MockChain::new(
            vec![
                validator("first", BondStatus::Bonded, false, "100.000000000000000000"),
                validator("second", BondStatus::Bonded, false, "100.000000000000000000"),
                validator("third", BondStatus::Bonded, false, "100.000000000000000000"),
            ],
            vec![],
        );

        let enriched = aggregate(&chain).await;
        assert_eq!(operators(&enriched), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn share_order_is_exact_beyond_f64_precision() {
        let big_lo = "123456789012345678901234.000000000000000000";
        let big_hi = "123456789012345678901234.000000000000000001";
        let chain = MockChain::new(
            vec![
                validator("lo", BondStatus::Bonded, false, big_lo),
                validator("hi", BondStatus::Bonded, false, big_hi),
            ],
            vec![],
        );

        let enriched = aggregate(&chain).await;
        assert_eq!(operators(&enriched), vec!["hi", "lo"]);
    }

    #[tokio::test]
    async fn jailed_validators_never_active_and_consume_no_capacity() {
        let chain = MockChain::new(
            vec![
                validator("jailed", BondStatus::Bonded, true, "900.000000000000000000"),
                validator("free", BondStatus::Bonded, false, "100.000000000000000000"),
            ],
            vec![],
        )
        .with_max_validators(1);

        let enriched = aggregate(&chain).await;

        assert_eq!(enriched[0].active, Some(false));
        // the slot skipped by the jailed leader is still available
        assert_eq!(enriched[1].active, Some(true));
    }

    #[tokio::test]
    async fn params_failure_disables_active_set() {
        let chain = MockChain::new(
            vec![validator("solo", BondStatus::Bonded, false, "1.000000000000000000")],
            vec![],
        )
        .with_params_failure();

        let enriched = aggregate(&chain).await;
        assert_eq!(enriched[0].active, None);
        assert_eq!(enriched[0].rank, 1);
    }

    #[tokio::test]
    async fn zero_max_validators_disables_active_set() {
        let chain = MockChain::new(
            vec![validator("solo", BondStatus::Bonded, false, "1.000000000000000000")],
            vec![],
        )
        .with_max_validators(0);

        let enriched = aggregate(&chain).await;
        assert_eq!(enriched[0].active, None);
    }

    #[tokio::test]
    async fn missed_blocks_from_bulk_pages_without_fallback() {
        let bonded = validator("val-a", BondStatus::Bonded, false, "10.000000000000000000");
        let address = valcons(&bonded);
        let chain = MockChain::new(vec![bonded], vec![signing_info(&address, 12)]);

        let enriched = aggregate(&chain).await;

        assert_eq!(enriched[0].missed_blocks, Some(12));
        assert!(chain.fallback_lookups.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_bulk_entry_triggers_single_fallback_lookup() {
        let bonded = validator("val-a", BondStatus::Bonded, false, "10.000000000000000000");
        let address = valcons(&bonded);
        let chain = MockChain::new(vec![bonded], vec![])
            .with_fallback(signing_info(&address, 7));

        let enriched = aggregate(&chain).await;

        assert_eq!(enriched[0].missed_blocks, Some(7));
        assert_eq!(*chain.fallback_lookups.lock().unwrap(), vec![address]);
    }

    #[tokio::test]
    async fn failed_fallback_is_not_an_error() {
        let bonded = validator("val-a", BondStatus::Bonded, false, "10.000000000000000000");
        let chain = MockChain::new(vec![bonded], vec![]);

        let enriched = aggregate(&chain).await;

        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].missed_blocks, None);
        assert_eq!(chain.fallback_lookups.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missed_blocks_omitted_for_non_bonded_even_with_match() {
        let unbonded = validator("val-u", BondStatus::Unbonded, false, "10.000000000000000000");
        let address = valcons(&unbonded);
        let chain = MockChain::new(vec![unbonded], vec![signing_info(&address, 99)]);

        let enriched = aggregate(&chain).await;
        assert_eq!(enriched[0].missed_blocks, None);
    }

    #[tokio::test]
    async fn amounts_are_scaled_and_failures_isolated_per_field() {
        let mut broken = validator("val-a", BondStatus::Bonded, false, "10.000000000000000000");
        broken.tokens = "not-a-number".to_string();
        let chain = MockChain::new(vec![broken], vec![]);

        let enriched = aggregate(&chain).await;

        assert_eq!(enriched[0].tokens, None);
        assert_eq!(enriched[0].delegator_shares, Some(10.0 / 1_000_000.0));
        assert_eq!(enriched[0].min_self_delegation, Some(1.0 / 1_000_000.0));
        assert_eq!(enriched[0].commission_rate, Some(0.1));
    }

    #[tokio::test]
    async fn missing_consensus_pubkey_degrades_join_only() {
        let mut keyless = validator("val-a", BondStatus::Bonded, false, "10.000000000000000000");
        keyless.consensus_pubkey = None;
        let chain = MockChain::new(vec![keyless], vec![]).with_max_validators(5);

        let enriched = aggregate(&chain).await;

        assert!(enriched[0].cons_address.is_none());
        assert_eq!(enriched[0].missed_blocks, None);
        // no join, but everything else is still derived
        assert_eq!(enriched[0].rank, 1);
        assert_eq!(enriched[0].active, Some(true));
        assert!(chain.fallback_lookups.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn validator_fetch_failure_yields_empty_snapshot() {
        let mut chain = MockChain::new(
            vec![validator("gone", BondStatus::Bonded, false, "1.000000000000000000")],
            vec![],
        );
        chain.fail_validators = true;

        let enriched = aggregate(&chain).await;
        assert!(enriched.is_empty());
    }

    #[tokio::test]
    async fn signing_info_fetch_failure_degrades_to_fallbacks() {
        let bonded = validator("val-a", BondStatus::Bonded, false, "10.000000000000000000");
        let address = valcons(&bonded);
        let mut chain =
            MockChain::new(vec![bonded], vec![signing_info(&address, 3)])
                .with_fallback(signing_info(&address, 3));
        chain.fail_signing_infos = true;

        let enriched = aggregate(&chain).await;

        // bulk pages were lost, the sequential fallback still resolves it
        assert_eq!(enriched[0].missed_blocks, Some(3));
        assert_eq!(chain.fallback_lookups.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pagination_spans_multiple_pages() {
        // page limit in aggregate() is 2, so five validators need three pages
        let chain = MockChain::new(
            (0..5)
                .map(|i| {
                    validator(
                        &format!("val-{i}"),
                        BondStatus::Bonded,
                        false,
                        &format!("{}.000000000000000000", 100 - i),
                    )
                })
                .collect(),
            vec![],
        );

        let enriched = aggregate(&chain).await;
        assert_eq!(enriched.len(), 5);
        assert_eq!(operators(&enriched)[0], "val-0");
    }
}
