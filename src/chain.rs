// src/chain.rs - In-process execution environment for the factory and its tokens
// Applies one transaction at a time, all-or-nothing, and mines it into its own block

use std::collections::HashMap;

use alloy_primitives::{keccak256, Address, Log, B256, U256};

use crate::config::ChainConfig;
use crate::error::{MarketError, MarketResult};
use crate::evm::{BlockInfo, Env};
use crate::factory::TokenFactory;
use crate::token::{Token, TokenParams};

/// Well-known address the factory is deployed at.
pub const FACTORY_ADDRESS: Address = Address::new([
    0xd8, 0x84, 0x89, 0xfc, 0xd7, 0x75, 0x52, 0xfb, 0xb5, 0x7a, 0x03, 0xde, 0x4b, 0xe8, 0x38, 0xdd,
    0x13, 0x6d, 0x1c, 0x40,
]);

/// A state-changing call against the factory, a token, or a plain account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateToken(TokenParams),
    BuyTokens { token: Address, amount: U256 },
    SellTokens { token: Address, amount: U256 },
    SetPrice { token: Address, new_price: U256 },
    SetSaleStatus { token: Address, for_sale: bool },
    WithdrawUnsoldTokens { token: Address, amount: U256 },
    Transfer { token: Address, to: Address, amount: U256 },
    Approve { token: Address, spender: Address, amount: U256 },
    TransferFrom { token: Address, from: Address, to: Address, amount: U256 },
    /// Native-currency transfer; funds liquidity when `to` is a token.
    SendValue { to: Address },
}

impl Call {
    /// Account the call is addressed to.
    pub fn target(&self) -> Address {
        match self {
            Self::CreateToken(_) => FACTORY_ADDRESS,
            Self::BuyTokens { token, .. }
            | Self::SellTokens { token, .. }
            | Self::SetPrice { token, .. }
            | Self::SetSaleStatus { token, .. }
            | Self::WithdrawUnsoldTokens { token, .. }
            | Self::Transfer { token, .. }
            | Self::Approve { token, .. }
            | Self::TransferFrom { token, .. } => *token,
            Self::SendValue { to } => *to,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub from: Address,
    pub value: U256,
    pub call: Call,
}

impl Transaction {
    pub fn new(from: Address, call: Call) -> Self {
        Self {
            from,
            value: U256::ZERO,
            call,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// Outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: B256,
    pub block_number: u64,
    pub timestamp: u64,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    /// Set when the transaction created a token.
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
}

/// World state: the factory, every token it created and native balances.
#[derive(Debug, Clone)]
pub struct LocalChain {
    factory: TokenFactory,
    tokens: HashMap<Address, Token>,
    accounts: HashMap<Address, U256>,
    head: BlockInfo,
    block_time: u64,
    receipts: HashMap<B256, Receipt>,
}

impl LocalChain {
    pub fn new(config: &ChainConfig) -> Self {
        Self {
            factory: TokenFactory::new(FACTORY_ADDRESS, config.price_scale),
            tokens: HashMap::new(),
            accounts: HashMap::new(),
            head: BlockInfo {
                number: 0,
                timestamp: config.genesis_timestamp,
            },
            block_time: config.block_time_secs,
            receipts: HashMap::new(),
        }
    }

    /// Credits `amount` of native currency to `account` outside any transaction.
    pub fn fund(&mut self, account: Address, amount: U256) {
        let balance = self.accounts.entry(account).or_default();
        *balance = balance.saturating_add(amount);
    }

    // ========================================================================
    // READS
    // ========================================================================

    pub fn factory(&self) -> &TokenFactory {
        &self.factory
    }

    pub fn token(&self, address: Address) -> MarketResult<&Token> {
        self.tokens
            .get(&address)
            .ok_or_else(|| MarketError::not_found(format!("token {address}")))
    }

    /// Native balance of an account or a token's liquidity.
    pub fn balance(&self, account: Address) -> U256 {
        match self.tokens.get(&account) {
            Some(token) => token.get_contract_balance(),
            None => self.accounts.get(&account).copied().unwrap_or_default(),
        }
    }

    pub fn head(&self) -> BlockInfo {
        self.head
    }

    pub fn receipt(&self, hash: B256) -> Option<&Receipt> {
        self.receipts.get(&hash)
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Applies `tx` atomically. On error nothing changes and no block is mined.
    pub fn apply(&mut self, hash: B256, tx: Transaction) -> MarketResult<Receipt> {
        let payer_balance = self.balance(tx.from);
        let remaining = payer_balance
            .checked_sub(tx.value)
            .ok_or_else(|| MarketError::insufficient_funds(payer_balance, tx.value))?;

        let block = BlockInfo {
            number: self.head.number + 1,
            timestamp: self.head.timestamp + self.block_time,
        };
        let mut env = Env::new(tx.from, tx.value, block);
        let to = tx.call.target();
        let contract_address = self.dispatch(&mut env, tx.call)?;

        // Commit: value leaves the payer, payouts land, block is sealed
        let (logs, transfers) = env.into_effects();
        self.accounts.insert(tx.from, remaining);
        for (recipient, amount) in transfers {
            self.fund(recipient, amount);
        }
        self.head = block;

        let receipt = Receipt {
            transaction_hash: hash,
            block_number: block.number,
            timestamp: block.timestamp,
            from: tx.from,
            to,
            value: tx.value,
            contract_address,
            logs,
        };
        self.receipts.insert(hash, receipt.clone());
        Ok(receipt)
    }

    fn dispatch(&mut self, env: &mut Env, call: Call) -> MarketResult<Option<Address>> {
        match call {
            Call::CreateToken(params) => {
                let token = self.factory.create_token(env, params)?;
                let address = token.address();
                self.tokens.insert(address, token);
                return Ok(Some(address));
            }
            Call::BuyTokens { token, amount } => self.token_mut(token)?.buy_tokens(env, amount)?,
            Call::SellTokens { token, amount } => {
                self.token_mut(token)?.sell_tokens(env, amount)?;
            }
            Call::SetPrice { token, new_price } => {
                self.token_mut(token)?.set_price(env, new_price)?
            }
            Call::SetSaleStatus { token, for_sale } => {
                self.token_mut(token)?.set_sale_status(env, for_sale)?
            }
            Call::WithdrawUnsoldTokens { token, amount } => {
                self.token_mut(token)?.withdraw_unsold_tokens(env, amount)?
            }
            Call::Transfer { token, to, amount } => {
                self.token_mut(token)?.transfer(env, to, amount)?;
            }
            Call::Approve {
                token,
                spender,
                amount,
            } => {
                self.token_mut(token)?.approve(env, spender, amount)?;
            }
            Call::TransferFrom {
                token,
                from,
                to,
                amount,
            } => {
                self.token_mut(token)?.transfer_from(env, from, to, amount)?;
            }
            Call::SendValue { to } => match self.tokens.get_mut(&to) {
                Some(token) => token.receive(env)?,
                None if to == FACTORY_ADDRESS => {
                    return Err(MarketError::invalid_input("factory does not accept value"))
                }
                None => env.transfer_native(to, env.value()),
            },
        }
        Ok(None)
    }

    fn token_mut(&mut self, address: Address) -> MarketResult<&mut Token> {
        self.tokens
            .get_mut(&address)
            .ok_or_else(|| MarketError::not_found(format!("token {address}")))
    }
}

/// Hash identifying the `sequence`-th submission from `from`.
pub fn transaction_hash(from: Address, sequence: u64, tx: &Transaction) -> B256 {
    let mut preimage = Vec::with_capacity(20 + 8 + 20 + 32);
    preimage.extend_from_slice(from.as_slice());
    preimage.extend_from_slice(&sequence.to_be_bytes());
    preimage.extend_from_slice(tx.call.target().as_slice());
    preimage.extend_from_slice(&tx.value.to_be_bytes::<32>());
    keccak256(preimage)
}
