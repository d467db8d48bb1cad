// src/factory.rs - Token registry: creates token instances and indexes them

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::abi::TokenCreated;
use crate::error::{MarketError, MarketResult};
use crate::evm::{non_payable, Env};
use crate::token::{Token, TokenParams};

/// Metadata captured once per created token. Never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub token_address: Address,
    pub name: String,
    pub symbol: String,
    pub total_supply: U256,
    #[serde(rename = "metadataURI")]
    pub metadata_uri: String,
    pub creator: Address,
    pub created_at: u64,
}

/// Append-only registry of launched tokens.
///
/// Records live in creation order; the address and creator indexes hold
/// positions into that sequence.
#[derive(Debug, Clone)]
pub struct TokenFactory {
    address: Address,
    // CREATE nonce; contract accounts start at 1
    nonce: u64,
    price_scale: U256,
    records: Vec<TokenRecord>,
    positions: HashMap<Address, usize>,
    by_creator: HashMap<Address, Vec<usize>>,
}

impl TokenFactory {
    /// A factory deployed at `address`. Every token it creates prices against
    /// `price_scale`.
    pub fn new(address: Address, price_scale: U256) -> Self {
        Self {
            address,
            nonce: 1,
            price_scale,
            records: Vec::new(),
            positions: HashMap::new(),
            by_creator: HashMap::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn price_scale(&self) -> U256 {
        self.price_scale
    }

    /// Validates `params`, deploys a token holding its own supply and registers it.
    ///
    /// The new instance is returned to the caller, which owns its storage; its
    /// address is `token.address()`. Nothing is registered when validation fails.
    pub fn create_token(&mut self, env: &mut Env, params: TokenParams) -> MarketResult<Token> {
        non_payable(env)?;
        validate(&params)?;

        let token_address = self.address.create(self.nonce);
        let record = TokenRecord {
            token_address,
            name: params.name.clone(),
            symbol: params.symbol.clone(),
            total_supply: params.total_supply,
            metadata_uri: params.metadata_uri.clone(),
            creator: env.sender(),
            created_at: env.timestamp(),
        };

        let token = Token::deploy(env, token_address, params, self.price_scale)?;

        self.nonce += 1;
        let position = self.records.len();
        self.positions.insert(token_address, position);
        self.by_creator
            .entry(record.creator)
            .or_default()
            .push(position);

        env.log(
            self.address,
            TokenCreated {
                tokenAddress: token_address,
                creator: record.creator,
                name: record.name.clone(),
                symbol: record.symbol.clone(),
                totalSupply: record.total_supply,
                metadataURI: record.metadata_uri.clone(),
            },
        );

        tracing::info!(
            token = %token_address,
            creator = %record.creator,
            symbol = %record.symbol,
            "token created"
        );
        self.records.push(record);
        Ok(token)
    }

    pub fn get_token_count(&self) -> usize {
        self.records.len()
    }

    /// Addresses created by `creator`, oldest first.
    pub fn get_tokens_by_creator(&self, creator: Address) -> Vec<Address> {
        self.by_creator
            .get(&creator)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| self.records[position].token_address)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_token_info(&self, index: usize) -> MarketResult<TokenRecord> {
        self.records.get(index).cloned().ok_or_else(|| {
            MarketError::not_found(format!(
                "token index {index} (count {})",
                self.records.len()
            ))
        })
    }

    pub fn get_all_tokens(&self) -> Vec<TokenRecord> {
        self.records.clone()
    }

    /// Up to `limit` records starting at `offset`, in creation order.
    pub fn get_tokens_page(&self, offset: usize, limit: usize) -> Vec<TokenRecord> {
        self.records.iter().skip(offset).take(limit).cloned().collect()
    }

    pub fn is_token(&self, address: Address) -> bool {
        self.positions.contains_key(&address)
    }

    pub fn record_of(&self, address: Address) -> Option<&TokenRecord> {
        self.positions
            .get(&address)
            .map(|&position| &self.records[position])
    }
}

fn validate(params: &TokenParams) -> MarketResult<()> {
    if params.name.is_empty() {
        return Err(MarketError::invalid_input("name must not be empty"));
    }
    if params.symbol.is_empty() {
        return Err(MarketError::invalid_input("symbol must not be empty"));
    }
    if params.total_supply == U256::ZERO {
        return Err(MarketError::invalid_input("total supply must be positive"));
    }
    if params.price_per_token == U256::ZERO {
        return Err(MarketError::invalid_input("price per token must be positive"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evm::BlockInfo;
    use alloy_sol_types::SolEvent;

    fn addr(n: u8) -> Address {
        Address::from([n; 20])
    }

    fn env(sender: u8) -> Env {
        Env::new(
            addr(sender),
            U256::ZERO,
            BlockInfo {
                number: 3,
                timestamp: 1_700_000_042,
            },
        )
    }

    fn params(name: &str, symbol: &str, supply: u64, price: u64) -> TokenParams {
        TokenParams {
            name: name.into(),
            symbol: symbol.into(),
            total_supply: U256::from(supply),
            metadata_uri: format!("ipfs://{symbol}"),
            price_per_token: U256::from(price),
        }
    }

    fn factory() -> TokenFactory {
        TokenFactory::new(addr(0xFA), U256::from(1u64))
    }

    #[test]
    fn test_create_registers_and_returns_address() {
        let mut factory = factory();
        let mut create_env = env(1);
        let token = factory
            .create_token(&mut create_env, params("A", "B", 1000, 1))
            .unwrap();

        assert_eq!(token.address(), addr(0xFA).create(1));
        assert_eq!(token.get_available_tokens(), U256::from(1000u64));
        assert_eq!(token.balance_of(token.address()), U256::from(1000u64));
        assert!(factory.is_token(token.address()));
        assert!(!factory.is_token(addr(0xFA)));

        let record = factory.get_token_info(0).unwrap();
        assert_eq!(record.creator, addr(1));
        assert_eq!(record.created_at, 1_700_000_042);

        let created = create_env
            .logs()
            .iter()
            .find_map(|log| TokenCreated::decode_log_data(&log.data, true).ok())
            .unwrap();
        assert_eq!(created.tokenAddress, token.address());
        assert_eq!(created.metadataURI, "ipfs://B");
    }

    #[test]
    fn test_invalid_inputs_leave_registry_untouched() {
        let mut factory = factory();
        let cases = [
            params("", "B", 1, 1),
            params("A", "", 1, 1),
            params("A", "B", 0, 1),
            params("A", "B", 1, 0),
        ];
        for case in cases {
            assert!(matches!(
                factory.create_token(&mut env(1), case),
                Err(MarketError::InvalidInput(_))
            ));
        }
        assert_eq!(factory.get_token_count(), 0);

        // The next successful create still uses the first nonce
        let token = factory.create_token(&mut env(1), params("A", "B", 1, 1)).unwrap();
        assert_eq!(token.address(), addr(0xFA).create(1));
    }

    #[test]
    fn test_non_payable() {
        let mut factory = factory();
        let mut paying = Env::new(addr(1), U256::from(1u64), env(1).block());
        assert!(factory
            .create_token(&mut paying, params("A", "B", 1, 1))
            .is_err());
    }

    #[test]
    fn test_enumeration_and_creator_index() {
        let mut factory = factory();
        let mut created = Vec::new();
        for (creator, symbol) in [(1u8, "ONE"), (2, "TWO"), (1, "THREE")] {
            let token = factory
                .create_token(&mut env(creator), params(symbol, symbol, 10, 1))
                .unwrap();
            created.push(token.address());
        }

        assert_eq!(factory.get_token_count(), 3);
        let all = factory.get_all_tokens();
        assert_eq!(all.len(), factory.get_token_count());
        assert_eq!(
            all.iter().map(|r| r.token_address).collect::<Vec<_>>(),
            created
        );

        assert_eq!(
            factory.get_tokens_by_creator(addr(1)),
            vec![created[0], created[2]]
        );
        assert_eq!(factory.get_tokens_by_creator(addr(2)), vec![created[1]]);
        assert!(factory.get_tokens_by_creator(addr(9)).is_empty());

        let page = factory.get_tokens_page(1, 5);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].symbol, "TWO");
        assert!(factory.get_tokens_page(3, 5).is_empty());
    }

    #[test]
    fn test_token_info_out_of_range() {
        let mut factory = factory();
        factory.create_token(&mut env(1), params("A", "B", 1, 1)).unwrap();
        assert!(matches!(
            factory.get_token_info(1),
            Err(MarketError::NotFound(_))
        ));
    }

    #[test]
    fn test_record_serializes_with_abi_field_names() {
        let mut factory = factory();
        factory.create_token(&mut env(1), params("A", "B", 1, 1)).unwrap();
        let json = serde_json::to_value(factory.get_token_info(0).unwrap()).unwrap();
        assert!(json.get("tokenAddress").is_some());
        assert!(json.get("metadataURI").is_some());
        assert!(json.get("createdAt").is_some());
    }
}
