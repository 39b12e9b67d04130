use std::collections::HashMap;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Error;

fn default_denom_coefficient() -> f64 {
    1_000_000.0
}

fn default_pagination_limit() -> u64 {
    1000
}

fn default_block_window() -> i64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub serve_at: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.serve_at, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Base URL of the node's REST (LCD) query service, e.g. http://localhost:1317
    pub lcd_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Display denomination used as the `denom` label on amount gauges.
    pub denom: String,
    /// Divisor applied to raw base-unit amounts, e.g. 1000000 for uatom -> atom.
    #[serde(default = "default_denom_coefficient")]
    pub denom_coefficient: f64,
    /// Bech32 account prefix of the chain, e.g. "cosmos". Consensus addresses
    /// use the derived `<prefix>valcons` prefix.
    pub bech32_prefix: String,
    /// Page size for the paginated staking and slashing queries.
    #[serde(default = "default_pagination_limit")]
    pub pagination_limit: u64,
    /// Optional chain id attached to every metric as a constant label.
    #[serde(default)]
    pub chain_id: Option<String>,
    /// How many blocks back to look when estimating the mean block interval
    /// for the upgrade ETA.
    #[serde(default = "default_block_window")]
    pub block_window: i64,
}

impl ChainConfig {
    pub fn valcons_prefix(&self) -> String {
        format!("{}valcons", self.bech32_prefix)
    }

    pub fn valoper_prefix(&self) -> String {
        format!("{}valoper", self.bech32_prefix)
    }

    pub fn const_labels(&self) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        if let Some(chain_id) = &self.chain_id {
            labels.insert("chain_id".to_string(), chain_id.clone());
        }
        labels
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExporterConfig {
    pub server: ServerConfig,
    pub node: NodeConfig,
    pub chain: ChainConfig,
}

impl ExporterConfig {
    /// Loads the configuration from a toml file, with STAKEWATCH_* environment
    /// variables taking precedence (e.g. STAKEWATCH_NODE__LCD_ADDR).
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("STAKEWATCH").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
