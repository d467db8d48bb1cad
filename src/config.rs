// src/config.rs - Settings for the chain, node and marketplace client
// Values come from the process environment, optionally seeded from a `.env` file

use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use alloy_primitives::U256;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Execution environment parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Divisor applied to `amount * price`; `10^18` prices per whole token.
    pub price_scale: U256,
    pub genesis_timestamp: u64,
    pub block_time_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            price_scale: U256::from(1u64),
            genesis_timestamp: unix_now(),
            block_time_secs: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Submissions buffered before `submit` waits for room.
    pub queue_depth: usize,
    pub confirmation_timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            queue_depth: 256,
            confirmation_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketConfig {
    /// Upper bound on tokens being read at once while building listings.
    pub max_concurrent_reads: usize,
    pub shadow_store_enabled: bool,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reads: 16,
            shadow_store_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub chain: ChainConfig,
    pub node: NodeConfig,
    pub market: MarketConfig,
}

impl Config {
    /// Loads `.env` if present, then reads settings from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenv::dotenv() {
            tracing::debug!(%err, "no .env file loaded");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let chain = ChainConfig {
            price_scale: parse(&lookup, "FACTORY_PRICE_SCALE", defaults.chain.price_scale)?,
            genesis_timestamp: parse(
                &lookup,
                "CHAIN_GENESIS_TIMESTAMP",
                defaults.chain.genesis_timestamp,
            )?,
            block_time_secs: parse(
                &lookup,
                "CHAIN_BLOCK_TIME_SECS",
                defaults.chain.block_time_secs,
            )?,
        };
        if chain.price_scale == U256::ZERO {
            return Err(invalid("FACTORY_PRICE_SCALE", "0"));
        }

        let node = NodeConfig {
            queue_depth: parse(&lookup, "NODE_QUEUE_DEPTH", defaults.node.queue_depth)?,
            confirmation_timeout: Duration::from_millis(parse(
                &lookup,
                "NODE_CONFIRMATION_TIMEOUT_MS",
                defaults.node.confirmation_timeout.as_millis() as u64,
            )?),
        };
        if node.queue_depth == 0 {
            return Err(invalid("NODE_QUEUE_DEPTH", "0"));
        }

        let market = MarketConfig {
            max_concurrent_reads: parse(
                &lookup,
                "MARKET_MAX_CONCURRENT_READS",
                defaults.market.max_concurrent_reads,
            )?,
            shadow_store_enabled: parse(
                &lookup,
                "SHADOW_STORE_ENABLED",
                defaults.market.shadow_store_enabled,
            )?,
        };
        if market.max_concurrent_reads == 0 {
            return Err(invalid("MARKET_MAX_CONCURRENT_READS", "0"));
        }

        Ok(Self {
            chain,
            node,
            market,
        })
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| invalid(key, &raw)),
        None => Ok(default),
    }
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
