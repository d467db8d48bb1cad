// src/lib.rs - Token launchpad: factory, self-custody sale tokens and a marketplace client
// Token ledgers run on an in-process chain; clients read and trade through a Node handle

use alloy_primitives::{Address, U256};

pub mod abi;
pub mod chain;
pub mod config;
pub mod error;
pub mod evm;
pub mod factory;
pub mod marketplace;
pub mod node;
pub mod shadow;
pub mod token;

pub use chain::{Call, LocalChain, Receipt, Transaction, FACTORY_ADDRESS};
pub use config::{ChainConfig, Config, ConfigError, MarketConfig, NodeConfig};
pub use error::{ClientError, MarketError, MarketResult};
pub use factory::{TokenFactory, TokenRecord};
pub use marketplace::{Listing, MarketReader, Marketplace, Quote, TxSubmitter};
pub use node::{Node, PendingTransaction};
pub use shadow::{MemoryShadowStore, ShadowError, ShadowStore};
pub use token::{Token, TokenParams, DECIMALS};

// ============================================================================
// BOOTSTRAP
// ============================================================================

/// Starts a fresh chain from `config` and returns a node handle for it,
/// crediting each `(account, amount)` in `genesis` first.
pub fn launch(config: &Config, genesis: &[(Address, U256)]) -> Node {
    let mut chain = LocalChain::new(&config.chain);
    for &(account, amount) in genesis {
        chain.fund(account, amount);
    }
    tracing::info!(accounts = genesis.len(), "chain started");
    Node::spawn(chain, &config.node).0
}
