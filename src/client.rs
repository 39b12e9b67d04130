use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::Error;
use crate::types::{BlockStub, SigningInfo, StakingParams, UpgradePlan, Validator};

/// The upstream query surface of the chain node. Every call can fail
/// independently; callers decide whether a failure degrades or aborts.
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// One page of the staking validator set.
    async fn validators(&self, offset: u64, limit: u64) -> Result<Vec<Validator>, Error>;

    /// One page of the slashing signing infos.
    async fn signing_infos(&self, offset: u64, limit: u64) -> Result<Vec<SigningInfo>, Error>;

    /// Single signing-info lookup by bech32 consensus address.
    async fn signing_info(&self, cons_address: &str) -> Result<SigningInfo, Error>;

    async fn staking_params(&self) -> Result<StakingParams, Error>;

    async fn current_upgrade_plan(&self) -> Result<Option<UpgradePlan>, Error>;

    async fn latest_block(&self) -> Result<BlockStub, Error>;

    async fn block(&self, height: i64) -> Result<BlockStub, Error>;

    /// Total number of delegations to a validator.
    async fn delegation_count(&self, validator_address: &str) -> Result<u64, Error>;
}

/// Client for the node's REST (LCD) query service.
#[derive(Clone)]
pub struct LcdClient {
    http: reqwest::Client,
    base_url: String,
}

impl LcdClient {
    pub fn new(lcd_addr: &str) -> Self {
        LcdClient {
            http: reqwest::Client::new(),
            base_url: lcd_addr.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "querying lcd");

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl ChainQuery for LcdClient {
    async fn validators(&self, offset: u64, limit: u64) -> Result<Vec<Validator>, Error> {
        let response: ValidatorsResponse = self
            .get_json(
                "/cosmos/staking/v1beta1/validators",
                &[
                    ("pagination.offset", offset.to_string()),
                    ("pagination.limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(response.validators)
    }

    async fn signing_infos(&self, offset: u64, limit: u64) -> Result<Vec<SigningInfo>, Error> {
        let response: SigningInfosResponse = self
            .get_json(
                "/cosmos/slashing/v1beta1/signing_infos",
                &[
                    ("pagination.offset", offset.to_string()),
                    ("pagination.limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(response.info)
    }

    async fn signing_info(&self, cons_address: &str) -> Result<SigningInfo, Error> {
        let response: SigningInfoResponse = self
            .get_json(
                &format!("/cosmos/slashing/v1beta1/signing_infos/{cons_address}"),
                &[],
            )
            .await?;
        Ok(response.val_signing_info)
    }

    async fn staking_params(&self) -> Result<StakingParams, Error> {
        let response: StakingParamsResponse =
            self.get_json("/cosmos/staking/v1beta1/params", &[]).await?;
        Ok(response.params)
    }

    async fn current_upgrade_plan(&self) -> Result<Option<UpgradePlan>, Error> {
        let response: UpgradePlanResponse = self
            .get_json("/cosmos/upgrade/v1beta1/current_plan", &[])
            .await?;
        Ok(response.plan)
    }

    async fn latest_block(&self) -> Result<BlockStub, Error> {
        let response: BlockResponse = self
            .get_json("/cosmos/base/tendermint/v1beta1/blocks/latest", &[])
            .await?;
        response.block.header.try_into()
    }

    async fn block(&self, height: i64) -> Result<BlockStub, Error> {
        let response: BlockResponse = self
            .get_json(&format!("/cosmos/base/tendermint/v1beta1/blocks/{height}"), &[])
            .await?;
        response.block.header.try_into()
    }

    async fn delegation_count(&self, validator_address: &str) -> Result<u64, Error> {
        let response: DelegationsResponse = self
            .get_json(
                &format!("/cosmos/staking/v1beta1/validators/{validator_address}/delegations"),
                &[
                    ("pagination.limit", "1".to_string()),
                    ("pagination.count_total", "true".to_string()),
                ],
            )
            .await?;

        match response.pagination.total {
            Some(total) => Ok(total.parse()?),
            None => Ok(0),
        }
    }
}

// Response envelopes for the LCD routes. Only the fields the exporter needs
// are declared; everything else in the payloads is ignored.

#[derive(Debug, Deserialize)]
struct ValidatorsResponse {
    #[serde(default)]
    validators: Vec<Validator>,
}

#[derive(Debug, Deserialize)]
struct SigningInfosResponse {
    #[serde(default)]
    info: Vec<SigningInfo>,
}

#[derive(Debug, Deserialize)]
struct SigningInfoResponse {
    val_signing_info: SigningInfo,
}

#[derive(Debug, Deserialize)]
struct StakingParamsResponse {
    params: StakingParams,
}

#[derive(Debug, Deserialize)]
struct UpgradePlanResponse {
    #[serde(default)]
    plan: Option<UpgradePlan>,
}

#[derive(Debug, Deserialize)]
struct BlockResponse {
    block: RawBlock,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    header: RawHeader,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    height: String,
    time: String,
}

impl TryFrom<RawHeader> for BlockStub {
    type Error = Error;

    fn try_from(header: RawHeader) -> Result<Self, Self::Error> {
        Ok(BlockStub {
            height: header.height.parse()?,
            time: OffsetDateTime::parse(&header.time, &Rfc3339)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct DelegationsResponse {
    #[serde(default)]
    pagination: PageInfo,
}

#[derive(Debug, Deserialize, Default)]
struct PageInfo {
    #[serde(default)]
    total: Option<String>,
}
