// src/shadow.rs - Off-chain mirror of tokens, transfers and purchases
//
// The chain stays authoritative; these rows are a queryable copy the marketplace
// writes after confirmed transactions.

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::unix_now;

pub type RowId = u64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShadowError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("{table} {id} not found")]
    NotFound { table: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),
}

/// JSON envelope every store response is rendered in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

impl<T> From<Result<T, ShadowError>> for ApiResponse<T> {
    fn from(result: Result<T, ShadowError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::failure(err),
        }
    }
}

// ============================================================================
// ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewToken {
    pub name: String,
    pub symbol: String,
    pub total_supply: U256,
    pub owner: Address,
    pub contract_address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRow {
    pub id: RowId,
    pub name: String,
    pub symbol: String,
    pub total_supply: U256,
    pub owner: Address,
    pub contract_address: Address,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Fields left `None` keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPatch {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub total_supply: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub token_id: RowId,
    pub from_address: Address,
    pub to_address: Address,
    pub amount: U256,
    pub transaction_hash: Option<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    pub id: RowId,
    pub token_id: RowId,
    pub from_address: Address,
    pub to_address: Address,
    pub amount: U256,
    pub transaction_hash: Option<B256>,
    pub created_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub token_id: Option<RowId>,
    pub from_address: Option<Address>,
    pub to_address: Option<Address>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    #[default]
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchase {
    pub token_id: RowId,
    pub buyer_address: Address,
    pub seller_address: Option<Address>,
    pub quantity: U256,
    pub price_per_token: U256,
    pub total_price: U256,
    pub transaction_hash: Option<B256>,
    /// Defaults to `completed`.
    pub status: Option<PurchaseStatus>,
}

/// A purchase joined with its token's name and symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRow {
    pub id: RowId,
    pub token_id: RowId,
    pub buyer_address: Address,
    pub seller_address: Option<Address>,
    pub quantity: U256,
    pub price_per_token: U256,
    pub total_price: U256,
    pub status: PurchaseStatus,
    pub transaction_hash: Option<B256>,
    pub created_at: u64,
    pub updated_at: u64,
    pub name: Option<String>,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurchaseFilter {
    pub token_id: Option<RowId>,
    pub buyer_address: Option<Address>,
    pub seller_address: Option<Address>,
    pub status: Option<PurchaseStatus>,
}

// ============================================================================
// STORE
// ============================================================================

/// Row storage for the mirror. Listings are newest first.
#[async_trait]
pub trait ShadowStore: Send + Sync {
    async fn insert_token(&self, token: NewToken) -> Result<TokenRow, ShadowError>;
    async fn list_tokens(&self, owner: Option<Address>) -> Result<Vec<TokenRow>, ShadowError>;
    async fn get_token(&self, id: RowId) -> Result<TokenRow, ShadowError>;
    async fn token_by_address(&self, contract_address: Address) -> Result<TokenRow, ShadowError>;
    async fn update_token(&self, id: RowId, patch: TokenPatch) -> Result<TokenRow, ShadowError>;
    /// Removes the token with its transactions and purchases.
    async fn delete_token(&self, id: RowId) -> Result<TokenRow, ShadowError>;

    async fn insert_transaction(&self, tx: NewTransaction) -> Result<TransactionRow, ShadowError>;
    async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<TransactionRow>, ShadowError>;
    async fn get_transaction(&self, id: RowId) -> Result<TransactionRow, ShadowError>;
    async fn delete_transaction(&self, id: RowId) -> Result<TransactionRow, ShadowError>;

    async fn insert_purchase(&self, purchase: NewPurchase) -> Result<PurchaseRow, ShadowError>;
    async fn list_purchases(&self, filter: PurchaseFilter) -> Result<Vec<PurchaseRow>, ShadowError>;
    async fn get_purchase(&self, id: RowId) -> Result<PurchaseRow, ShadowError>;
    async fn update_purchase_status(
        &self,
        id: RowId,
        status: PurchaseStatus,
    ) -> Result<PurchaseRow, ShadowError>;
    async fn delete_purchase(&self, id: RowId) -> Result<PurchaseRow, ShadowError>;

    /// Stores a purchase with its token movement. Both rows are stored or neither.
    async fn insert_trade(
        &self,
        purchase: NewPurchase,
        tx: NewTransaction,
    ) -> Result<(PurchaseRow, TransactionRow), ShadowError>;

    async fn token_id_by_address(&self, contract_address: Address) -> Result<RowId, ShadowError> {
        Ok(self.token_by_address(contract_address).await?.id)
    }
}

#[derive(Debug, Default)]
struct Tables {
    next_id: RowId,
    tokens: BTreeMap<RowId, TokenRow>,
    transactions: BTreeMap<RowId, TransactionRow>,
    purchases: BTreeMap<RowId, PurchaseRow>,
}

impl Tables {
    fn allocate(&mut self) -> RowId {
        self.next_id += 1;
        self.next_id
    }

    fn token(&self, id: RowId) -> Result<&TokenRow, ShadowError> {
        self.tokens.get(&id).ok_or_else(|| not_found("token", id))
    }

    fn hash_taken(&self, hash: Option<B256>) -> bool {
        hash.is_some_and(|hash| {
            self.transactions
                .values()
                .any(|row| row.transaction_hash == Some(hash))
        })
    }

    fn check_transaction(&self, tx: &NewTransaction) -> Result<(), ShadowError> {
        require(tx.from_address != Address::ZERO, "from_address")?;
        require(tx.to_address != Address::ZERO, "to_address")?;
        require(tx.amount != U256::ZERO, "amount")?;
        self.token(tx.token_id)?;
        if self.hash_taken(tx.transaction_hash) {
            return Err(ShadowError::Conflict(format!(
                "transaction hash {} already recorded",
                tx.transaction_hash.unwrap_or_default()
            )));
        }
        Ok(())
    }

    fn push_transaction(&mut self, tx: NewTransaction) -> TransactionRow {
        let row = TransactionRow {
            id: self.allocate(),
            token_id: tx.token_id,
            from_address: tx.from_address,
            to_address: tx.to_address,
            amount: tx.amount,
            transaction_hash: tx.transaction_hash,
            created_at: unix_now(),
        };
        self.transactions.insert(row.id, row.clone());
        row
    }

    fn check_purchase(&self, purchase: &NewPurchase) -> Result<(), ShadowError> {
        require(purchase.buyer_address != Address::ZERO, "buyer_address")?;
        require(purchase.quantity != U256::ZERO, "quantity")?;
        require(purchase.price_per_token != U256::ZERO, "price_per_token")?;
        require(purchase.total_price != U256::ZERO, "total_price")?;
        self.token(purchase.token_id)?;
        Ok(())
    }

    fn push_purchase(&mut self, purchase: NewPurchase) -> PurchaseRow {
        let now = unix_now();
        let row = PurchaseRow {
            id: self.allocate(),
            token_id: purchase.token_id,
            buyer_address: purchase.buyer_address,
            seller_address: purchase.seller_address,
            quantity: purchase.quantity,
            price_per_token: purchase.price_per_token,
            total_price: purchase.total_price,
            status: purchase.status.unwrap_or_default(),
            transaction_hash: purchase.transaction_hash,
            created_at: now,
            updated_at: now,
            name: None,
            symbol: None,
        };
        self.purchases.insert(row.id, row.clone());
        self.joined(row)
    }

    fn joined(&self, mut purchase: PurchaseRow) -> PurchaseRow {
        if let Some(token) = self.tokens.get(&purchase.token_id) {
            purchase.name = Some(token.name.clone());
            purchase.symbol = Some(token.symbol.clone());
        }
        purchase
    }
}

/// Process-local [`ShadowStore`].
#[derive(Debug, Default)]
pub struct MemoryShadowStore {
    tables: RwLock<Tables>,
}

impl MemoryShadowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShadowStore for MemoryShadowStore {
    async fn insert_token(&self, token: NewToken) -> Result<TokenRow, ShadowError> {
        require(!token.name.is_empty(), "name")?;
        require(!token.symbol.is_empty(), "symbol")?;
        require(token.owner != Address::ZERO, "owner")?;
        require(token.contract_address != Address::ZERO, "contract_address")?;

        let mut tables = self.tables.write().await;
        if tables
            .tokens
            .values()
            .any(|row| row.contract_address == token.contract_address)
        {
            return Err(ShadowError::Conflict(format!(
                "token at {} already recorded",
                token.contract_address
            )));
        }

        let now = unix_now();
        let row = TokenRow {
            id: tables.allocate(),
            name: token.name,
            symbol: token.symbol,
            total_supply: token.total_supply,
            owner: token.owner,
            contract_address: token.contract_address,
            created_at: now,
            updated_at: now,
        };
        tables.tokens.insert(row.id, row.clone());
        tracing::debug!(id = row.id, address = %row.contract_address, "token row stored");
        Ok(row)
    }

    async fn list_tokens(&self, owner: Option<Address>) -> Result<Vec<TokenRow>, ShadowError> {
        let tables = self.tables.read().await;
        let rows = tables
            .tokens
            .values()
            .filter(|row| owner.map_or(true, |owner| row.owner == owner))
            .cloned()
            .collect();
        Ok(newest_first(rows, |row| (row.created_at, row.id)))
    }

    async fn get_token(&self, id: RowId) -> Result<TokenRow, ShadowError> {
        self.tables.read().await.token(id).cloned()
    }

    async fn token_by_address(&self, contract_address: Address) -> Result<TokenRow, ShadowError> {
        self.tables
            .read()
            .await
            .tokens
            .values()
            .find(|row| row.contract_address == contract_address)
            .cloned()
            .ok_or_else(|| not_found("token", contract_address))
    }

    async fn update_token(&self, id: RowId, patch: TokenPatch) -> Result<TokenRow, ShadowError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .tokens
            .get_mut(&id)
            .ok_or_else(|| not_found("token", id))?;

        if let Some(name) = patch.name {
            row.name = name;
        }
        if let Some(symbol) = patch.symbol {
            row.symbol = symbol;
        }
        if let Some(total_supply) = patch.total_supply {
            row.total_supply = total_supply;
        }
        row.updated_at = unix_now();
        Ok(row.clone())
    }

    async fn delete_token(&self, id: RowId) -> Result<TokenRow, ShadowError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .tokens
            .remove(&id)
            .ok_or_else(|| not_found("token", id))?;

        tables.transactions.retain(|_, tx| tx.token_id != id);
        tables.purchases.retain(|_, purchase| purchase.token_id != id);
        tracing::debug!(id, "token row deleted with dependents");
        Ok(row)
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> Result<TransactionRow, ShadowError> {
        let mut tables = self.tables.write().await;
        tables.check_transaction(&tx)?;
        Ok(tables.push_transaction(tx))
    }

    async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<TransactionRow>, ShadowError> {
        let tables = self.tables.read().await;
        let rows = tables
            .transactions
            .values()
            .filter(|row| filter.token_id.map_or(true, |id| row.token_id == id))
            .filter(|row| filter.from_address.map_or(true, |from| row.from_address == from))
            .filter(|row| filter.to_address.map_or(true, |to| row.to_address == to))
            .cloned()
            .collect();
        Ok(newest_first(rows, |row| (row.created_at, row.id)))
    }

    async fn get_transaction(&self, id: RowId) -> Result<TransactionRow, ShadowError> {
        self.tables
            .read()
            .await
            .transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("transaction", id))
    }

    async fn delete_transaction(&self, id: RowId) -> Result<TransactionRow, ShadowError> {
        self.tables
            .write()
            .await
            .transactions
            .remove(&id)
            .ok_or_else(|| not_found("transaction", id))
    }

    async fn insert_purchase(&self, purchase: NewPurchase) -> Result<PurchaseRow, ShadowError> {
        let mut tables = self.tables.write().await;
        tables.check_purchase(&purchase)?;
        Ok(tables.push_purchase(purchase))
    }

    async fn list_purchases(&self, filter: PurchaseFilter) -> Result<Vec<PurchaseRow>, ShadowError> {
        let tables = self.tables.read().await;
        let rows = tables
            .purchases
            .values()
            .filter(|row| filter.token_id.map_or(true, |id| row.token_id == id))
            .filter(|row| filter.buyer_address.map_or(true, |buyer| row.buyer_address == buyer))
            .filter(|row| {
                filter
                    .seller_address
                    .map_or(true, |seller| row.seller_address == Some(seller))
            })
            .filter(|row| filter.status.map_or(true, |status| row.status == status))
            .map(|row| tables.joined(row.clone()))
            .collect();
        Ok(newest_first(rows, |row| (row.created_at, row.id)))
    }

    async fn get_purchase(&self, id: RowId) -> Result<PurchaseRow, ShadowError> {
        let tables = self.tables.read().await;
        let row = tables
            .purchases
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("purchase", id))?;
        Ok(tables.joined(row))
    }

    async fn update_purchase_status(
        &self,
        id: RowId,
        status: PurchaseStatus,
    ) -> Result<PurchaseRow, ShadowError> {
        let mut tables = self.tables.write().await;
        let row = tables
            .purchases
            .get_mut(&id)
            .ok_or_else(|| not_found("purchase", id))?;
        row.status = status;
        row.updated_at = unix_now();
        let row = row.clone();
        Ok(tables.joined(row))
    }

    async fn delete_purchase(&self, id: RowId) -> Result<PurchaseRow, ShadowError> {
        self.tables
            .write()
            .await
            .purchases
            .remove(&id)
            .ok_or_else(|| not_found("purchase", id))
    }

    async fn insert_trade(
        &self,
        purchase: NewPurchase,
        tx: NewTransaction,
    ) -> Result<(PurchaseRow, TransactionRow), ShadowError> {
        let mut tables = self.tables.write().await;
        tables.check_purchase(&purchase)?;
        tables.check_transaction(&tx)?;
        Ok((tables.push_purchase(purchase), tables.push_transaction(tx)))
    }
}

fn require(present: bool, field: &'static str) -> Result<(), ShadowError> {
    if present {
        Ok(())
    } else {
        Err(ShadowError::MissingField(field))
    }
}

fn not_found(table: &'static str, id: impl ToString) -> ShadowError {
    ShadowError::NotFound {
        table,
        id: id.to_string(),
    }
}

// Ids break ties between rows stored within the same second
fn newest_first<R, K: Ord>(mut rows: Vec<R>, key: impl Fn(&R) -> K) -> Vec<R> {
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows
}
