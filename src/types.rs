use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bech32::{ToBase32, Variant};
use num_bigint::BigInt;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use strum_macros::Display;

use crate::error::Error;

const ED25519_PUBKEY_TYPE_URL: &str = "/cosmos.crypto.ed25519.PubKey";

/// Bond status of a validator, as encoded by the staking module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display)]
pub enum BondStatus {
    #[serde(rename = "BOND_STATUS_UNSPECIFIED")]
    #[strum(serialize = "unspecified")]
    Unspecified,
    #[serde(rename = "BOND_STATUS_UNBONDED")]
    #[strum(serialize = "unbonded")]
    Unbonded,
    #[serde(rename = "BOND_STATUS_UNBONDING")]
    #[strum(serialize = "unbonding")]
    Unbonding,
    #[serde(rename = "BOND_STATUS_BONDED")]
    #[strum(serialize = "bonded")]
    Bonded,
}

impl Default for BondStatus {
    fn default() -> Self {
        BondStatus::Unspecified
    }
}

impl BondStatus {
    pub fn is_bonded(self) -> bool {
        matches!(self, BondStatus::Bonded)
    }

    /// Numeric code as defined by the staking proto enum.
    pub fn code(self) -> i64 {
        match self {
            BondStatus::Unspecified => 0,
            BondStatus::Unbonded => 1,
            BondStatus::Unbonding => 2,
            BondStatus::Bonded => 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Description {
    #[serde(default)]
    pub moniker: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CommissionRates {
    #[serde(default)]
    pub rate: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Commission {
    #[serde(default)]
    pub commission_rates: CommissionRates,
}

/// Consensus public key, wire-encoded as a protobuf Any.
#[derive(Debug, Clone, Deserialize)]
pub struct ConsensusPubkey {
    #[serde(rename = "@type")]
    pub type_url: String,
    pub key: String,
}

/// A single validator as reported by the staking module. Amount fields are
/// kept as the raw arbitrary-precision decimal strings from the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct Validator {
    pub operator_address: String,
    #[serde(default)]
    pub consensus_pubkey: Option<ConsensusPubkey>,
    #[serde(default)]
    pub jailed: bool,
    #[serde(default)]
    pub status: BondStatus,
    #[serde(default)]
    pub tokens: String,
    #[serde(default)]
    pub delegator_shares: String,
    #[serde(default)]
    pub description: Description,
    #[serde(default)]
    pub commission: Commission,
    #[serde(default)]
    pub min_self_delegation: String,
}

impl Validator {
    pub fn moniker(&self) -> &str {
        &self.description.moniker
    }

    pub fn is_bonded(&self) -> bool {
        self.status.is_bonded()
    }

    pub fn commission_rate(&self) -> &str {
        &self.commission.commission_rates.rate
    }

    /// Derives the consensus address from the consensus public key.
    pub fn consensus_address(&self) -> Result<ConsAddress, Error> {
        let pubkey = self
            .consensus_pubkey
            .as_ref()
            .ok_or(Error::MissingConsensusPubkey)?;
        ConsAddress::from_pubkey(pubkey)
    }
}

/// Raw 20-byte consensus address, the join key between validators and their
/// signing infos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsAddress([u8; 20]);

impl ConsAddress {
    /// The consensus address of an ed25519 key is the first 20 bytes of the
    /// sha256 digest of the raw key.
    pub fn from_pubkey(pubkey: &ConsensusPubkey) -> Result<Self, Error> {
        if pubkey.type_url != ED25519_PUBKEY_TYPE_URL {
            return Err(Error::UnsupportedPubkeyType(pubkey.type_url.clone()));
        }

        let raw = BASE64.decode(&pubkey.key)?;
        let digest = Sha256::digest(&raw);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);

        Ok(ConsAddress(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Bech32 form under the given human-readable prefix, e.g. "cosmosvalcons".
    pub fn to_bech32(&self, hrp: &str) -> Result<String, Error> {
        Ok(bech32::encode(hrp, self.0.to_base32(), Variant::Bech32)?)
    }

    /// Uppercase hex of the raw address bytes, used as the pubkey_hash label.
    pub fn to_hex_upper(&self) -> String {
        hex::encode_upper(self.0)
    }
}

/// Per-validator block-signing record from the slashing module. The LCD
/// encodes int64 counters as JSON strings.
#[derive(Debug, Clone, Deserialize)]
pub struct SigningInfo {
    pub address: String,
    #[serde(default)]
    pub missed_blocks_counter: String,
}

impl SigningInfo {
    pub fn missed_blocks(&self) -> Option<i64> {
        self.missed_blocks_counter.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StakingParams {
    #[serde(default)]
    pub max_validators: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpgradePlan {
    pub name: String,
    #[serde(default)]
    pub info: String,
    #[serde(default)]
    pub height: String,
}

/// Height and timestamp of a block header, enough for the upgrade ETA.
#[derive(Debug, Clone, Copy)]
pub struct BlockStub {
    pub height: i64,
    pub time: time::OffsetDateTime,
}

/// All share amounts are compared at this fixed fractional scale.
pub const SHARES_DECIMAL_PLACES: usize = 18;

/// Exact sort key for a decimal-string share amount: the amount scaled to
/// 18 fractional digits as an arbitrary-precision integer. Comparing these
/// keys never loses precision, unlike going through f64. Returns None for
/// strings that are not plain non-negative decimals.
pub fn share_sort_key(amount: &str) -> Option<BigInt> {
    let (int_part, frac_part) = match amount.split_once('.') {
        Some((int_part, frac_part)) => (int_part, frac_part),
        None => (amount, ""),
    };

    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut digits = String::with_capacity(int_part.len() + SHARES_DECIMAL_PLACES);
    digits.push_str(int_part);
    if frac_part.len() >= SHARES_DECIMAL_PLACES {
        digits.push_str(&frac_part[..SHARES_DECIMAL_PLACES]);
    } else {
        digits.push_str(frac_part);
        for _ in frac_part.len()..SHARES_DECIMAL_PLACES {
            digits.push('0');
        }
    }

    BigInt::parse_bytes(digits.as_bytes(), 10)
}
