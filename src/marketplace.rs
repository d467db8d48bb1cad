// src/marketplace.rs - Client-side listing aggregation and trading flows
//
// Listings are built by reading every token's sale state concurrently. A token
// whose reads fail is skipped so one broken entry never hides the rest.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;
use async_trait::async_trait;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;

use crate::abi::{TokensPurchased, TokensSold};
use crate::chain::{Call, Receipt, Transaction};
use crate::config::MarketConfig;
use crate::error::ClientError;
use crate::factory::TokenRecord;
use crate::node::PendingTransaction;
use crate::shadow::{
    MemoryShadowStore, NewPurchase, NewToken, NewTransaction, PurchaseStatus, RowId,
    ShadowError, ShadowStore,
};
use crate::token::TokenParams;

// ============================================================================
// CHAIN SEAMS
// ============================================================================

/// Read-only view of the factory and its tokens.
#[async_trait]
pub trait MarketReader: Send + Sync {
    async fn get_all_tokens(&self) -> Result<Vec<TokenRecord>, ClientError>;

    async fn token_record(&self, token: Address) -> Result<TokenRecord, ClientError>;

    async fn is_for_sale(&self, token: Address) -> Result<bool, ClientError>;

    async fn get_available_tokens(&self, token: Address) -> Result<U256, ClientError>;

    async fn price_per_token(&self, token: Address) -> Result<U256, ClientError>;

    async fn get_contract_balance(&self, token: Address) -> Result<U256, ClientError>;

    async fn balance_of(&self, token: Address, holder: Address) -> Result<U256, ClientError>;

    /// Native cost of buying (or payout for selling) `amount` at the current price.
    async fn calculate_cost(&self, token: Address, amount: U256) -> Result<U256, ClientError>;

    /// Price and cost of `amount`, read from the same chain state.
    async fn quote(&self, token: Address, amount: U256) -> Result<Quote, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub price_per_token: U256,
    pub cost: U256,
}

/// Write path: queue a transaction, get a handle to await.
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    async fn submit(&self, tx: Transaction) -> Result<PendingTransaction, ClientError>;
}

// ============================================================================
// LISTINGS
// ============================================================================

/// A token currently open for purchase, with its live sale state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub record: TokenRecord,
    pub available: U256,
    pub price_per_token: U256,
    pub contract_balance: U256,
    /// Connected account's balance; `None` without an account.
    pub user_balance: Option<U256>,
}

impl Listing {
    pub fn token(&self) -> Address {
        self.record.token_address
    }
}

/// Marketplace client bound to an optional trading account.
pub struct Marketplace<C> {
    client: Arc<C>,
    account: Option<Address>,
    config: MarketConfig,
    cache: RwLock<Option<Arc<Vec<Listing>>>>,
    // Bumped on every invalidation; a fetch started before a bump is not cached
    generation: AtomicU64,
    shadow: Option<Arc<dyn ShadowStore>>,
}

impl<C> Marketplace<C>
where
    C: MarketReader + 'static,
{
    /// A read-only client. An in-memory shadow store is attached when enabled in `config`.
    pub fn new(client: Arc<C>, config: MarketConfig) -> Self {
        let shadow = config
            .shadow_store_enabled
            .then(|| Arc::new(MemoryShadowStore::default()) as Arc<dyn ShadowStore>);
        Self {
            client,
            account: None,
            config,
            cache: RwLock::new(None),
            generation: AtomicU64::new(0),
            shadow,
        }
    }

    /// Trades as `account` and reports its balances in listings.
    pub fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self.cache = RwLock::new(None);
        self
    }

    pub fn with_shadow_store(mut self, store: Arc<dyn ShadowStore>) -> Self {
        self.shadow = Some(store);
        self
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn shadow_store(&self) -> Option<&Arc<dyn ShadowStore>> {
        self.shadow.as_ref()
    }

    /// Tokens open for sale, in factory order. Served from cache when warm.
    pub async fn listings(&self) -> Result<Arc<Vec<Listing>>, ClientError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(cached));
        }
        self.refresh().await
    }

    /// Refetches listings regardless of the cache.
    ///
    /// A result fetched across an invalidation is returned but not cached.
    pub async fn refresh(&self) -> Result<Arc<Vec<Listing>>, ClientError> {
        let started = self.generation.load(Ordering::Acquire);
        let listings = Arc::new(self.fetch_listings().await?);

        let mut cache = self.cache.write().await;
        if self.generation.load(Ordering::Acquire) == started {
            *cache = Some(Arc::clone(&listings));
        } else {
            tracing::debug!("discarding listings fetched before the last write");
        }
        Ok(listings)
    }

    /// Drops cached listings; the next read refetches.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        *cache = None;
    }

    async fn fetch_listings(&self) -> Result<Vec<Listing>, ClientError> {
        let records = self.client.get_all_tokens().await?;
        let total = records.len();
        let limiter = Arc::new(Semaphore::new(self.config.max_concurrent_reads.max(1)));
        let mut reads = JoinSet::new();

        for (position, record) in records.into_iter().enumerate() {
            let client = Arc::clone(&self.client);
            let limiter = Arc::clone(&limiter);
            let account = self.account;
            reads.spawn(async move {
                let _permit = limiter.acquire_owned().await;
                let token = record.token_address;
                let state = read_listing(client.as_ref(), record, account).await;
                (position, token, state)
            });
        }

        let mut listings = Vec::with_capacity(total);
        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok((position, _, Ok(Some(listing)))) => listings.push((position, listing)),
                Ok((_, _, Ok(None))) => {}
                Ok((_, token, Err(err))) => {
                    tracing::warn!(%token, %err, "skipping token with unreadable sale state")
                }
                Err(err) => tracing::warn!(%err, "listing read task failed"),
            }
        }
        listings.sort_by_key(|(position, _)| *position);

        tracing::debug!(total, listed = listings.len(), "listings refreshed");
        Ok(listings.into_iter().map(|(_, listing)| listing).collect())
    }
}

/// Reads one token's sale state; `None` when it is not for sale.
async fn read_listing<C>(
    client: &C,
    record: TokenRecord,
    account: Option<Address>,
) -> Result<Option<Listing>, ClientError>
where
    C: MarketReader + ?Sized,
{
    let token = record.token_address;
    let user_balance = async {
        match account {
            Some(holder) => client.balance_of(token, holder).await.map(Some),
            None => Ok(None),
        }
    };

    let (is_for_sale, available, price_per_token, contract_balance, user_balance) = tokio::try_join!(
        client.is_for_sale(token),
        client.get_available_tokens(token),
        client.price_per_token(token),
        client.get_contract_balance(token),
        user_balance,
    )?;

    if !is_for_sale {
        return Ok(None);
    }
    Ok(Some(Listing {
        record,
        available,
        price_per_token,
        contract_balance,
        user_balance,
    }))
}

// ============================================================================
// TRADING
// ============================================================================

impl<C> Marketplace<C>
where
    C: MarketReader + TxSubmitter + 'static,
{
    /// Launches a token from the connected account and returns its address.
    pub async fn create_token(&self, params: TokenParams) -> Result<Address, ClientError> {
        let creator = self.require_account()?;
        let (name, symbol, total_supply) =
            (params.name.clone(), params.symbol.clone(), params.total_supply);

        let receipt = self
            .execute(Transaction::new(creator, Call::CreateToken(params)))
            .await?;
        let token = receipt
            .contract_address
            .ok_or(ClientError::MissingContractAddress(receipt.transaction_hash))?;

        if let Some(store) = &self.shadow {
            let mirrored = store
                .insert_token(NewToken {
                    name,
                    symbol,
                    total_supply,
                    owner: creator,
                    contract_address: token,
                })
                .await;
            if let Err(err) = mirrored {
                tracing::warn!(%token, %err, "failed to mirror created token");
            }
        }
        Ok(token)
    }

    /// Buys `amount` at the token's current price. The exact cost is read first.
    pub async fn buy(&self, token: Address, amount: U256) -> Result<Receipt, ClientError> {
        let buyer = self.require_account()?;
        let Quote {
            price_per_token,
            cost,
        } = self.client.quote(token, amount).await?;

        let receipt = self
            .execute(
                Transaction::new(buyer, Call::BuyTokens { token, amount }).with_value(cost),
            )
            .await?;

        let total_price = decoded::<TokensPurchased>(&receipt)
            .map(|event| event.totalPrice)
            .unwrap_or(cost);
        self.mirror_trade(Trade {
            token,
            buyer,
            seller: None,
            quantity: amount,
            price_per_token,
            total_price,
            hash: receipt.transaction_hash,
        })
        .await;
        Ok(receipt)
    }

    /// Sells `amount` back to the token for its current price.
    pub async fn sell(&self, token: Address, amount: U256) -> Result<Receipt, ClientError> {
        let seller = self.require_account()?;
        let Quote { price_per_token, .. } = self.client.quote(token, amount).await?;

        let receipt = self
            .execute(Transaction::new(seller, Call::SellTokens { token, amount }))
            .await?;

        if let Some(sold) = decoded::<TokensSold>(&receipt) {
            self.mirror_trade(Trade {
                token,
                buyer: token,
                seller: Some(seller),
                quantity: amount,
                price_per_token,
                total_price: sold.payout,
                hash: receipt.transaction_hash,
            })
            .await;
        }
        Ok(receipt)
    }

    pub async fn set_price(&self, token: Address, new_price: U256) -> Result<Receipt, ClientError> {
        let creator = self.require_account()?;
        self.execute(Transaction::new(creator, Call::SetPrice { token, new_price }))
            .await
    }

    pub async fn set_sale_status(
        &self,
        token: Address,
        for_sale: bool,
    ) -> Result<Receipt, ClientError> {
        let creator = self.require_account()?;
        self.execute(Transaction::new(
            creator,
            Call::SetSaleStatus { token, for_sale },
        ))
        .await
    }

    pub async fn withdraw_unsold_tokens(
        &self,
        token: Address,
        amount: U256,
    ) -> Result<Receipt, ClientError> {
        let creator = self.require_account()?;
        self.execute(Transaction::new(
            creator,
            Call::WithdrawUnsoldTokens { token, amount },
        ))
        .await
    }

    /// Sends native currency to a token to back sell-backs.
    pub async fn add_liquidity(&self, token: Address, amount: U256) -> Result<Receipt, ClientError> {
        let from = self.require_account()?;
        self.execute(Transaction::new(from, Call::SendValue { to: token }).with_value(amount))
            .await
    }

    /// Submits, waits for the outcome and invalidates cached listings.
    ///
    /// Never retried: a timed-out or rejected write is reported to the caller.
    async fn execute(&self, tx: Transaction) -> Result<Receipt, ClientError> {
        let pending = self.client.submit(tx).await?;
        let hash = pending.hash();
        let outcome = pending.confirmed().await;
        self.invalidate().await;

        if let Err(err) = &outcome {
            tracing::warn!(%hash, %err, "transaction not confirmed");
        }
        outcome
    }

    fn require_account(&self) -> Result<Address, ClientError> {
        self.account.ok_or(ClientError::NoAccount)
    }

    async fn mirror_trade(&self, trade: Trade) {
        let Some(store) = &self.shadow else {
            return;
        };
        if let Err(err) = self.record_trade(store.as_ref(), &trade).await {
            tracing::warn!(token = %trade.token, hash = %trade.hash, %err, "failed to mirror trade");
        }
    }

    async fn record_trade(&self, store: &dyn ShadowStore, trade: &Trade) -> Result<(), ClientError> {
        let token_id = self.token_row(store, trade.token).await?;

        // Token movement: inventory to buyer, or seller back to the token
        let from_address = trade.seller.unwrap_or(trade.token);
        store
            .insert_trade(
                NewPurchase {
                    token_id,
                    buyer_address: trade.buyer,
                    seller_address: trade.seller,
                    quantity: trade.quantity,
                    price_per_token: trade.price_per_token,
                    total_price: trade.total_price,
                    transaction_hash: Some(trade.hash),
                    status: Some(PurchaseStatus::Completed),
                },
                NewTransaction {
                    token_id,
                    from_address,
                    to_address: trade.buyer,
                    amount: trade.quantity,
                    transaction_hash: Some(trade.hash),
                },
            )
            .await?;
        Ok(())
    }

    /// Row id for `token`, backfilled from the factory record when the store
    /// has not seen it yet.
    async fn token_row(&self, store: &dyn ShadowStore, token: Address) -> Result<RowId, ClientError> {
        match store.token_id_by_address(token).await {
            Ok(id) => return Ok(id),
            Err(ShadowError::NotFound { .. }) => {}
            Err(err) => return Err(err.into()),
        }

        let record = self.client.token_record(token).await?;
        let row = store
            .insert_token(NewToken {
                name: record.name,
                symbol: record.symbol,
                total_supply: record.total_supply,
                owner: record.creator,
                contract_address: token,
            })
            .await?;
        tracing::debug!(%token, id = row.id, "token row backfilled");
        Ok(row.id)
    }
}

struct Trade {
    token: Address,
    buyer: Address,
    seller: Option<Address>,
    quantity: U256,
    price_per_token: U256,
    total_price: U256,
    hash: B256,
}

fn decoded<E: SolEvent>(receipt: &Receipt) -> Option<E> {
    receipt
        .logs
        .iter()
        .find_map(|log| E::decode_log_data(&log.data, true).ok())
}
