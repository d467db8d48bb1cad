// tests/marketplace_tests.rs - End-to-end tests for the launchpad
// Tokens are created and traded through a running node and the marketplace client

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use tokio::sync::Notify;
use token_launchpad::shadow::{PurchaseFilter, ShadowStore, TransactionFilter};
use token_launchpad::{
    launch, Call, ChainConfig, ClientError, Config, MarketConfig, MarketError, MarketReader,
    Marketplace, MemoryShadowStore, Node, PendingTransaction, Quote, TokenParams, TokenRecord,
    Transaction, TxSubmitter,
};

const CREATOR: Address = Address::new([0x01; 20]);
const ALICE: Address = Address::new([0x0A; 20]);
const BOB: Address = Address::new([0x0B; 20]);

fn u(n: u64) -> U256 {
    U256::from(n)
}

fn config(shadow_store_enabled: bool) -> Config {
    Config {
        chain: ChainConfig {
            price_scale: u(1),
            genesis_timestamp: 1_700_000_000,
            block_time_secs: 12,
        },
        market: MarketConfig {
            max_concurrent_reads: 4,
            shadow_store_enabled,
        },
        ..Default::default()
    }
}

fn start(shadow: bool) -> (Node, MarketConfig) {
    let config = config(shadow);
    let node = launch(
        &config,
        &[(CREATOR, u(10_000)), (ALICE, u(10_000)), (BOB, u(10_000))],
    );
    (node, config.market)
}

fn market(node: &Node, market: &MarketConfig, account: Address) -> Marketplace<Node> {
    Marketplace::new(Arc::new(node.clone()), market.clone()).with_account(account)
}

fn params(symbol: &str, supply: u64, price: u64) -> TokenParams {
    TokenParams {
        name: format!("{symbol} Token"),
        symbol: symbol.into(),
        total_supply: u(supply),
        metadata_uri: format!("ipfs://{symbol}"),
        price_per_token: u(price),
    }
}

async fn supply_held(node: &Node, token: Address) -> U256 {
    node.read(|chain| {
        Ok(chain
            .token(token)?
            .holders()
            .fold(U256::ZERO, |sum, (_, balance)| sum + balance))
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_create_then_inventory() {
    let (node, market_config) = start(false);
    let creator = market(&node, &market_config, CREATOR);

    let token = creator.create_token(params("AB", 1000, 1)).await.unwrap();

    assert_eq!(node.get_available_tokens(token).await.unwrap(), u(1000));
    assert_eq!(node.balance_of(token, token).await.unwrap(), u(1000));
    assert_eq!(node.balance_of(token, CREATOR).await.unwrap(), U256::ZERO);

    let records = node.get_all_tokens().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].token_address, token);
    assert_eq!(records[0].creator, CREATOR);
}

#[tokio::test]
async fn test_buy_requires_exact_payment() {
    let (node, market_config) = start(false);
    let token = market(&node, &market_config, CREATOR)
        .create_token(params("PAY", 1000, 2))
        .await
        .unwrap();

    for paid in [199u64, 201] {
        let err = node
            .send(
                Transaction::new(ALICE, Call::BuyTokens { token, amount: u(100) })
                    .with_value(u(paid)),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.revert(),
            Some(&MarketError::payment_mismatch(u(200), u(paid)))
        );
    }
    // Rejected payments never leave the buyer's account
    assert_eq!(node.balance(ALICE).await, u(10_000));

    let alice = market(&node, &market_config, ALICE);
    alice.buy(token, u(100)).await.unwrap();

    assert_eq!(node.get_available_tokens(token).await.unwrap(), u(900));
    assert_eq!(node.balance_of(token, ALICE).await.unwrap(), u(100));
    assert_eq!(node.get_contract_balance(token).await.unwrap(), u(200));
    assert_eq!(node.balance(ALICE).await, u(9_800));
    assert_eq!(supply_held(&node, token).await, u(1000));
}

#[tokio::test]
async fn test_sell_back_needs_liquidity() {
    let (node, market_config) = start(false);
    let creator = market(&node, &market_config, CREATOR);
    let alice = market(&node, &market_config, ALICE);

    let token = creator.create_token(params("LIQ", 1000, 2)).await.unwrap();
    alice.buy(token, u(10)).await.unwrap();
    creator.set_price(token, u(5)).await.unwrap();

    // Payout 50 against 20 held; the failure repeats without side effects
    for _ in 0..2 {
        let err = alice.sell(token, u(10)).await.unwrap_err();
        assert_eq!(
            err.revert(),
            Some(&MarketError::insufficient_liquidity(u(20), u(50)))
        );
        assert_eq!(node.balance_of(token, ALICE).await.unwrap(), u(10));
        assert_eq!(node.get_contract_balance(token).await.unwrap(), u(20));
    }

    creator.add_liquidity(token, u(30)).await.unwrap();
    alice.sell(token, u(10)).await.unwrap();

    assert_eq!(node.balance_of(token, ALICE).await.unwrap(), U256::ZERO);
    assert_eq!(node.get_available_tokens(token).await.unwrap(), u(1000));
    assert_eq!(node.get_contract_balance(token).await.unwrap(), U256::ZERO);
    assert_eq!(node.balance(ALICE).await, u(10_000 - 20 + 50));
    assert_eq!(supply_held(&node, token).await, u(1000));
}

#[tokio::test]
async fn test_creator_controls() {
    let (node, market_config) = start(false);
    let creator = market(&node, &market_config, CREATOR);
    let bob = market(&node, &market_config, BOB);

    let token = creator.create_token(params("CTL", 500, 1)).await.unwrap();
    let unauthorized = MarketError::unauthorized(BOB, CREATOR);

    let attempts = [
        bob.set_price(token, u(9)).await,
        bob.set_sale_status(token, false).await,
        bob.withdraw_unsold_tokens(token, u(1)).await,
    ];
    for attempt in attempts {
        assert_eq!(attempt.unwrap_err().revert(), Some(&unauthorized));
    }
    assert_eq!(node.price_per_token(token).await.unwrap(), u(1));
    assert!(node.is_for_sale(token).await.unwrap());

    creator.set_sale_status(token, false).await.unwrap();
    let err = bob.buy(token, u(1)).await.unwrap_err();
    assert_eq!(err.revert(), Some(&MarketError::not_for_sale()));

    creator.withdraw_unsold_tokens(token, u(200)).await.unwrap();
    assert_eq!(node.balance_of(token, CREATOR).await.unwrap(), u(200));
    assert_eq!(node.get_available_tokens(token).await.unwrap(), u(300));
    assert_eq!(supply_held(&node, token).await, u(500));
}

#[tokio::test]
async fn test_listings_track_writes() {
    let (node, market_config) = start(false);
    let creator = market(&node, &market_config, CREATOR);
    let alice = market(&node, &market_config, ALICE);

    let first = creator.create_token(params("ONE", 100, 1)).await.unwrap();
    let second = creator.create_token(params("TWO", 100, 3)).await.unwrap();

    let listings = alice.listings().await.unwrap();
    assert_eq!(
        listings.iter().map(|l| l.token()).collect::<Vec<_>>(),
        vec![first, second]
    );
    assert_eq!(listings[1].price_per_token, u(3));
    assert_eq!(listings[0].user_balance, Some(U256::ZERO));

    alice.buy(first, u(40)).await.unwrap();
    let listings = alice.listings().await.unwrap();
    assert_eq!(listings[0].available, u(60));
    assert_eq!(listings[0].user_balance, Some(u(40)));

    // Another client's write is only seen once this one refreshes
    creator.set_sale_status(second, false).await.unwrap();
    assert_eq!(alice.listings().await.unwrap().len(), 2);
    let listings = alice.refresh().await.unwrap();
    assert_eq!(listings.len(), 1);
    assert_eq!(listings[0].token(), first);
}

#[tokio::test]
async fn test_writes_need_account() {
    let (node, market_config) = start(false);
    let viewer = Marketplace::new(Arc::new(node.clone()), market_config);

    assert!(viewer.listings().await.unwrap().is_empty());
    assert!(matches!(
        viewer.create_token(params("NO", 1, 1)).await,
        Err(ClientError::NoAccount)
    ));
}

#[tokio::test]
async fn test_store_follows_config() {
    let (node, market_config) = start(true);
    let creator = market(&node, &market_config, CREATOR);

    let token = creator.create_token(params("CFG", 10, 1)).await.unwrap();
    let row = creator
        .shadow_store()
        .unwrap()
        .token_by_address(token)
        .await
        .unwrap();
    assert_eq!(row.owner, CREATOR);
    assert_eq!(row.symbol, "CFG");
}

#[tokio::test]
async fn test_confirmed_trades_are_mirrored() {
    let (node, market_config) = start(false);
    let store = Arc::new(MemoryShadowStore::new());
    let creator = market(&node, &market_config, CREATOR).with_shadow_store(store.clone());
    let alice = market(&node, &market_config, ALICE).with_shadow_store(store.clone());

    let token = creator.create_token(params("MIR", 1000, 2)).await.unwrap();
    let token_row = store.token_by_address(token).await.unwrap();
    assert_eq!(token_row.total_supply, u(1000));

    let receipt = alice.buy(token, u(25)).await.unwrap();

    let purchases = store
        .list_purchases(PurchaseFilter {
            buyer_address: Some(ALICE),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].token_id, token_row.id);
    assert_eq!(purchases[0].total_price, u(50));
    assert_eq!(purchases[0].symbol.as_deref(), Some("MIR"));
    assert_eq!(purchases[0].transaction_hash, Some(receipt.transaction_hash));

    let transfers = store
        .list_transactions(TransactionFilter {
            to_address: Some(ALICE),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].from_address, token);

    // Sell-backs record the token as buyer and the account as seller
    let receipt = alice.sell(token, u(10)).await.unwrap();
    let sales = store
        .list_purchases(PurchaseFilter {
            seller_address: Some(ALICE),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].buyer_address, token);
    assert_eq!(sales[0].seller_address, Some(ALICE));
    assert_eq!(sales[0].quantity, u(10));
    assert_eq!(sales[0].total_price, u(20));
    assert_eq!(sales[0].transaction_hash, Some(receipt.transaction_hash));

    let returns = store
        .list_transactions(TransactionFilter {
            from_address: Some(ALICE),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].to_address, token);
    assert_eq!(returns[0].amount, u(10));

    // A failed buy mirrors nothing
    assert!(alice.buy(token, u(5_000)).await.is_err());
    assert_eq!(
        store
            .list_purchases(PurchaseFilter::default())
            .await
            .unwrap()
            .len(),
        2
    );

    // Deleting the token drops its mirrored history
    store.delete_token(token_row.id).await.unwrap();
    assert!(store
        .list_purchases(PurchaseFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_trades_on_foreign_tokens_are_mirrored() {
    let (node, market_config) = start(true);
    let creator = market(&node, &market_config, CREATOR);
    let alice = market(&node, &market_config, ALICE);

    let token = creator.create_token(params("FRN", 100, 3)).await.unwrap();
    let store = alice.shadow_store().unwrap();
    assert!(store.token_by_address(token).await.is_err());

    alice.buy(token, u(5)).await.unwrap();

    let row = store.token_by_address(token).await.unwrap();
    assert_eq!(row.owner, CREATOR);
    assert_eq!(row.symbol, "FRN");
    assert_eq!(row.total_supply, u(100));

    let purchases = store
        .list_purchases(PurchaseFilter::default())
        .await
        .unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].token_id, row.id);
    assert_eq!(purchases[0].buyer_address, ALICE);
    assert_eq!(purchases[0].total_price, u(15));

    // The second trade reuses the backfilled row
    alice.buy(token, u(1)).await.unwrap();
    assert_eq!(store.list_tokens(None).await.unwrap().len(), 1);
}

/// Node wrapper that can hold one inventory read open until released.
struct Gated {
    node: Node,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

impl Gated {
    fn new(node: Node) -> Self {
        Self {
            node,
            armed: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl MarketReader for Gated {
    async fn get_all_tokens(&self) -> Result<Vec<TokenRecord>, ClientError> {
        self.node.get_all_tokens().await
    }

    async fn token_record(&self, token: Address) -> Result<TokenRecord, ClientError> {
        self.node.token_record(token).await
    }

    async fn is_for_sale(&self, token: Address) -> Result<bool, ClientError> {
        self.node.is_for_sale(token).await
    }

    async fn get_available_tokens(&self, token: Address) -> Result<U256, ClientError> {
        let available = self.node.get_available_tokens(token).await?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(available)
    }

    async fn price_per_token(&self, token: Address) -> Result<U256, ClientError> {
        self.node.price_per_token(token).await
    }

    async fn get_contract_balance(&self, token: Address) -> Result<U256, ClientError> {
        self.node.get_contract_balance(token).await
    }

    async fn balance_of(&self, token: Address, holder: Address) -> Result<U256, ClientError> {
        self.node.balance_of(token, holder).await
    }

    async fn calculate_cost(&self, token: Address, amount: U256) -> Result<U256, ClientError> {
        self.node.calculate_cost(token, amount).await
    }

    async fn quote(&self, token: Address, amount: U256) -> Result<Quote, ClientError> {
        self.node.quote(token, amount).await
    }
}

#[async_trait]
impl TxSubmitter for Gated {
    async fn submit(&self, tx: Transaction) -> Result<PendingTransaction, ClientError> {
        self.node.submit(tx).await
    }
}

#[tokio::test]
async fn test_read_spanning_a_write_is_not_cached() {
    let (node, market_config) = start(false);
    let token = market(&node, &market_config, CREATOR)
        .create_token(params("GATE", 100, 1))
        .await
        .unwrap();

    let gated = Arc::new(Gated::new(node.clone()));
    let alice = Arc::new(Marketplace::new(gated.clone(), market_config).with_account(ALICE));

    gated.armed.store(true, Ordering::SeqCst);
    let stale = tokio::spawn({
        let alice = alice.clone();
        async move { alice.listings().await }
    });
    gated.entered.notified().await;

    alice.buy(token, u(40)).await.unwrap();
    gated.release.notify_one();

    // The held read still answers its caller with what it saw
    let held = tokio::time::timeout(Duration::from_secs(5), stale)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(held[0].available, u(100));

    let listings = alice.listings().await.unwrap();
    assert_eq!(listings[0].available, u(60));
    assert_eq!(listings[0].user_balance, Some(u(40)));
}
