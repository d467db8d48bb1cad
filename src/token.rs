// src/token.rs - Per-instance sale & balance ledger with an ERC-20 surface
// The token holds its own unsold inventory and native-currency liquidity

use std::collections::HashMap;

use alloy_primitives::{Address, U256};

use crate::abi::{
    Approval, LiquidityAdded, PriceUpdated, SaleStatusChanged, TokensPurchased, TokensSold,
    Transfer, UnsoldTokensWithdrawn,
};
use crate::error::{MarketError, MarketResult};
use crate::evm::{non_payable, Env};

/// Decimals reported by every launched token.
pub const DECIMALS: u8 = 18;

// ============================================================================
// STORAGE LAYOUT
// ============================================================================

#[derive(Debug, Clone)]
pub struct Token {
    // Identity
    address: Address,
    creator: Address,

    // Metadata
    name: String,
    symbol: String,
    metadata_uri: String,

    // ERC-20 Core State
    total_supply: U256,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,

    // Sale State
    price_per_token: U256,
    price_scale: U256,
    for_sale: bool,
    liquidity: U256,
}

/// Constructor arguments for a new token instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenParams {
    pub name: String,
    pub symbol: String,
    pub total_supply: U256,
    pub metadata_uri: String,
    pub price_per_token: U256,
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl Token {
    // ========================================================================
    // INITIALIZATION
    // ========================================================================

    /// Deploys a token at `address` with the whole supply held by the token itself.
    ///
    /// `env.sender()` becomes the creator. Inputs are expected to be validated by
    /// the factory; zero supply or price are still rejected here.
    pub fn deploy(
        env: &mut Env,
        address: Address,
        params: TokenParams,
        price_scale: U256,
    ) -> MarketResult<Self> {
        if address == Address::ZERO {
            return Err(MarketError::zero_address());
        }
        if params.total_supply == U256::ZERO || params.price_per_token == U256::ZERO {
            return Err(MarketError::invalid_input("supply and price must be positive"));
        }
        if price_scale == U256::ZERO {
            return Err(MarketError::invalid_input("price scale must be positive"));
        }

        let mut balances = HashMap::new();
        balances.insert(address, params.total_supply);

        // Mint the full supply into self-custody
        env.log(
            address,
            Transfer {
                from: Address::ZERO,
                to: address,
                value: params.total_supply,
            },
        );

        Ok(Self {
            address,
            creator: env.sender(),
            name: params.name,
            symbol: params.symbol,
            metadata_uri: params.metadata_uri,
            total_supply: params.total_supply,
            balances,
            allowances: HashMap::new(),
            price_per_token: params.price_per_token,
            price_scale,
            for_sale: true,
            liquidity: U256::ZERO,
        })
    }

    // ========================================================================
    // METADATA METHODS
    // ========================================================================

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn decimals(&self) -> u8 {
        DECIMALS
    }

    pub fn metadata_uri(&self) -> &str {
        &self.metadata_uri
    }

    /// Account allowed to reprice, halt and withdraw. Fixed at deployment.
    pub fn creator(&self) -> Address {
        self.creator
    }

    // ========================================================================
    // ERC-20 CORE METHODS
    // ========================================================================

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn balance_of(&self, owner: Address) -> U256 {
        self.balances.get(&owner).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    /// Every non-zero balance, including the token's own inventory.
    pub fn holders(&self) -> impl Iterator<Item = (Address, U256)> + '_ {
        self.balances
            .iter()
            .filter(|(_, balance)| **balance > U256::ZERO)
            .map(|(holder, balance)| (*holder, *balance))
    }

    pub fn transfer(&mut self, env: &mut Env, to: Address, amount: U256) -> MarketResult<bool> {
        non_payable(env)?;
        if to == Address::ZERO {
            return Err(MarketError::zero_address());
        }

        let from = env.sender();
        self.internal_transfer(env, from, to, amount)?;
        Ok(true)
    }

    pub fn approve(&mut self, env: &mut Env, spender: Address, amount: U256) -> MarketResult<bool> {
        non_payable(env)?;
        if spender == Address::ZERO {
            return Err(MarketError::zero_address());
        }

        let owner = env.sender();
        self.allowances.insert((owner, spender), amount);
        env.log(
            self.address,
            Approval {
                owner,
                spender,
                value: amount,
            },
        );
        Ok(true)
    }

    pub fn transfer_from(
        &mut self,
        env: &mut Env,
        from: Address,
        to: Address,
        amount: U256,
    ) -> MarketResult<bool> {
        non_payable(env)?;
        if to == Address::ZERO {
            return Err(MarketError::zero_address());
        }

        let spender = env.sender();
        let current_allowance = self.allowance(from, spender);
        let new_allowance = current_allowance
            .checked_sub(amount)
            .ok_or_else(|| MarketError::insufficient_allowance(current_allowance, amount))?;

        // Balance checks run before the allowance is spent
        self.internal_transfer(env, from, to, amount)?;
        self.allowances.insert((from, spender), new_allowance);
        Ok(true)
    }

    /// Moves `amount` between two holders, failing without side effects.
    fn internal_transfer(
        &mut self,
        env: &mut Env,
        from: Address,
        to: Address,
        amount: U256,
    ) -> MarketResult<()> {
        let from_balance = self.balance_of(from);
        let new_from_balance = from_balance
            .checked_sub(amount)
            .ok_or_else(|| MarketError::insufficient_balance(from_balance, amount))?;

        if from != to {
            let new_to_balance = self
                .balance_of(to)
                .checked_add(amount)
                .ok_or_else(MarketError::overflow)?;
            self.balances.insert(from, new_from_balance);
            self.balances.insert(to, new_to_balance);
        }

        env.log(
            self.address,
            Transfer {
                from,
                to,
                value: amount,
            },
        );
        Ok(())
    }

    // ========================================================================
    // SALE STATE
    // ========================================================================

    pub fn price_per_token(&self) -> U256 {
        self.price_per_token
    }

    /// Divisor applied to `amount * price` to obtain the native cost.
    pub fn price_scale(&self) -> U256 {
        self.price_scale
    }

    pub fn is_for_sale(&self) -> bool {
        self.for_sale
    }

    /// Unsold inventory: the token's balance of itself.
    pub fn get_available_tokens(&self) -> U256 {
        self.balance_of(self.address)
    }

    /// Native-currency liquidity backing sell-backs.
    pub fn get_contract_balance(&self) -> U256 {
        self.liquidity
    }

    /// Native cost of `amount` tokens at the current price.
    ///
    /// Amounts whose cost is not a whole number of native units are rejected
    /// rather than rounded.
    pub fn calculate_cost(&self, amount: U256) -> MarketResult<U256> {
        let gross = amount
            .checked_mul(self.price_per_token)
            .ok_or_else(MarketError::overflow)?;
        if gross % self.price_scale != U256::ZERO {
            return Err(MarketError::invalid_input(
                "amount is not priceable at the token's unit scale",
            ));
        }
        Ok(gross / self.price_scale)
    }

    // ========================================================================
    // DIRECT SALE
    // ========================================================================

    /// Sells `amount` from inventory to the caller for exactly `calculate_cost(amount)`.
    pub fn buy_tokens(&mut self, env: &mut Env, amount: U256) -> MarketResult<()> {
        if amount == U256::ZERO {
            return Err(MarketError::invalid_input("amount must be positive"));
        }
        if !self.for_sale {
            return Err(MarketError::not_for_sale());
        }

        let available = self.get_available_tokens();
        if amount > available {
            return Err(MarketError::insufficient_inventory(available, amount));
        }

        let total_price = self.calculate_cost(amount)?;
        if env.value() != total_price {
            return Err(MarketError::payment_mismatch(total_price, env.value()));
        }

        let new_liquidity = self
            .liquidity
            .checked_add(total_price)
            .ok_or_else(MarketError::overflow)?;

        let (token, buyer) = (self.address, env.sender());
        self.internal_transfer(env, token, buyer, amount)?;
        self.liquidity = new_liquidity;

        env.log(
            self.address,
            TokensPurchased {
                buyer,
                amount,
                totalPrice: total_price,
            },
        );
        Ok(())
    }

    /// Buys `amount` back from the caller, paying out of liquidity.
    ///
    /// There is no reserve floor: once liquidity is drained later sellers get
    /// `InsufficientLiquidity` until someone tops it up. Selling stays open while
    /// the sale flag is off.
    pub fn sell_tokens(&mut self, env: &mut Env, amount: U256) -> MarketResult<U256> {
        non_payable(env)?;
        if amount == U256::ZERO {
            return Err(MarketError::invalid_input("amount must be positive"));
        }

        let seller = env.sender();
        let balance = self.balance_of(seller);
        if balance < amount {
            return Err(MarketError::insufficient_balance(balance, amount));
        }

        let payout = self.calculate_cost(amount)?;
        let new_liquidity = self
            .liquidity
            .checked_sub(payout)
            .ok_or_else(|| MarketError::insufficient_liquidity(self.liquidity, payout))?;

        let token = self.address;
        self.internal_transfer(env, seller, token, amount)?;
        self.liquidity = new_liquidity;
        env.transfer_native(seller, payout);

        env.log(
            self.address,
            TokensSold {
                seller,
                amount,
                payout,
            },
        );
        Ok(payout)
    }

    /// Plain native deposit; tops up sell-back liquidity.
    pub fn receive(&mut self, env: &mut Env) -> MarketResult<()> {
        let (from, amount) = (env.sender(), env.value());
        self.liquidity = self
            .liquidity
            .checked_add(amount)
            .ok_or_else(MarketError::overflow)?;

        env.log(
            self.address,
            LiquidityAdded { from, amount },
        );
        Ok(())
    }

    // ========================================================================
    // CREATOR CONTROLS
    // ========================================================================

    pub fn set_price(&mut self, env: &mut Env, new_price: U256) -> MarketResult<()> {
        self.only_creator(env)?;
        non_payable(env)?;
        if new_price == U256::ZERO {
            return Err(MarketError::invalid_input("price must be positive"));
        }

        let old_price = self.price_per_token;
        self.price_per_token = new_price;
        env.log(
            self.address,
            PriceUpdated {
                oldPrice: old_price,
                newPrice: new_price,
            },
        );
        Ok(())
    }

    pub fn set_sale_status(&mut self, env: &mut Env, for_sale: bool) -> MarketResult<()> {
        self.only_creator(env)?;
        non_payable(env)?;

        self.for_sale = for_sale;
        env.log(self.address, SaleStatusChanged { isForSale: for_sale });
        Ok(())
    }

    /// Moves unsold inventory to the creator.
    pub fn withdraw_unsold_tokens(&mut self, env: &mut Env, amount: U256) -> MarketResult<()> {
        self.only_creator(env)?;
        non_payable(env)?;

        let available = self.get_available_tokens();
        if amount > available {
            return Err(MarketError::insufficient_inventory(available, amount));
        }

        let (token, creator) = (self.address, self.creator);
        self.internal_transfer(env, token, creator, amount)?;
        env.log(self.address, UnsoldTokensWithdrawn { creator, amount });
        Ok(())
    }

    fn only_creator(&self, env: &Env) -> MarketResult<()> {
        let caller = env.sender();
        if caller != self.creator {
            return Err(MarketError::unauthorized(caller, self.creator));
        }
        Ok(())
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
