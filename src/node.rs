// src/node.rs - Async front of the local chain
// One sequencer task owns the write path; reads share the chain behind a RwLock

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;

use crate::chain::{transaction_hash, LocalChain, Receipt, Transaction};
use crate::config::NodeConfig;
use crate::error::{ClientError, MarketError, MarketResult};
use crate::factory::TokenRecord;
use crate::marketplace::{MarketReader, Quote, TxSubmitter};
use crate::token::Token;

struct Submission {
    hash: B256,
    tx: Transaction,
    respond: oneshot::Sender<MarketResult<Receipt>>,
}

/// Cloneable handle to a running chain.
///
/// Submissions are applied in the order they reach the queue, which need not
/// match the order callers issued them in.
#[derive(Clone)]
pub struct Node {
    chain: Arc<RwLock<LocalChain>>,
    queue: mpsc::Sender<Submission>,
    sequence: Arc<AtomicU64>,
    confirmation_timeout: Duration,
}

impl Node {
    /// Starts the sequencer for `chain`. The task ends once every handle is dropped.
    pub fn spawn(chain: LocalChain, config: &NodeConfig) -> (Self, JoinHandle<()>) {
        let chain = Arc::new(RwLock::new(chain));
        let (queue, submissions) = mpsc::channel(config.queue_depth);
        let task = tokio::spawn(run_sequencer(Arc::clone(&chain), submissions));

        let node = Self {
            chain,
            queue,
            sequence: Arc::new(AtomicU64::new(0)),
            confirmation_timeout: config.confirmation_timeout,
        };
        (node, task)
    }

    /// Queues `tx` and returns as soon as it is accepted.
    pub async fn submit(&self, tx: Transaction) -> Result<PendingTransaction, ClientError> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let hash = transaction_hash(tx.from, sequence, &tx);
        let (respond, outcome) = oneshot::channel();

        self.queue
            .send(Submission { hash, tx, respond })
            .await
            .map_err(|_| ClientError::NodeUnavailable)?;
        tracing::debug!(%hash, "transaction queued");

        Ok(PendingTransaction {
            hash,
            outcome,
            timeout: self.confirmation_timeout,
        })
    }

    /// Submits `tx` and waits for its receipt.
    pub async fn send(&self, tx: Transaction) -> Result<Receipt, ClientError> {
        self.submit(tx).await?.confirmed().await
    }

    /// Runs `view` against a consistent snapshot of the chain.
    pub async fn read<T, F>(&self, view: F) -> MarketResult<T>
    where
        F: FnOnce(&LocalChain) -> MarketResult<T>,
    {
        let chain = self.chain.read().await;
        view(&chain)
    }

    /// Native balance of an account, or a token's liquidity.
    pub async fn balance(&self, account: Address) -> U256 {
        self.chain.read().await.balance(account)
    }

    async fn read_token<T, F>(&self, token: Address, view: F) -> Result<T, ClientError>
    where
        F: FnOnce(&Token) -> MarketResult<T>,
    {
        let result = self.read(|chain| chain.token(token).and_then(view)).await;
        Ok(result?)
    }
}

async fn run_sequencer(chain: Arc<RwLock<LocalChain>>, mut submissions: mpsc::Receiver<Submission>) {
    while let Some(Submission { hash, tx, respond }) = submissions.recv().await {
        let outcome = chain.write().await.apply(hash, tx);

        match &outcome {
            Ok(receipt) => tracing::info!(
                %hash,
                block = receipt.block_number,
                to = %receipt.to,
                logs = receipt.logs.len(),
                "transaction confirmed"
            ),
            Err(err) => tracing::info!(
                %hash,
                %err,
                revert = %hex::encode(err.revert_data()),
                "transaction rejected"
            ),
        }

        // The submitter may have stopped waiting; the outcome stands regardless
        let _ = respond.send(outcome);
    }
    tracing::debug!("sequencer stopped");
}

/// Handle to a queued transaction.
///
/// Dropping it does not cancel the transaction.
#[derive(Debug)]
pub struct PendingTransaction {
    hash: B256,
    outcome: oneshot::Receiver<MarketResult<Receipt>>,
    timeout: Duration,
}

impl PendingTransaction {
    pub fn hash(&self) -> B256 {
        self.hash
    }

    /// Waits for the transaction to be applied.
    ///
    /// A `ConfirmationTimeout` means the outcome is unknown, not that the
    /// transaction failed.
    pub async fn confirmed(self) -> Result<Receipt, ClientError> {
        match tokio::time::timeout(self.timeout, self.outcome).await {
            Err(_) => Err(ClientError::ConfirmationTimeout(self.hash)),
            Ok(Err(_)) => Err(ClientError::NodeUnavailable),
            Ok(Ok(result)) => Ok(result?),
        }
    }
}

#[async_trait]
impl MarketReader for Node {
    async fn get_all_tokens(&self) -> Result<Vec<TokenRecord>, ClientError> {
        Ok(self.read(|chain| Ok(chain.factory().get_all_tokens())).await?)
    }

    async fn token_record(&self, token: Address) -> Result<TokenRecord, ClientError> {
        let record = self
            .read(|chain| {
                chain
                    .factory()
                    .record_of(token)
                    .cloned()
                    .ok_or_else(|| MarketError::not_found(format!("token {token}")))
            })
            .await;
        Ok(record?)
    }

    async fn is_for_sale(&self, token: Address) -> Result<bool, ClientError> {
        self.read_token(token, |t| Ok(t.is_for_sale())).await
    }

    async fn get_available_tokens(&self, token: Address) -> Result<U256, ClientError> {
        self.read_token(token, |t| Ok(t.get_available_tokens())).await
    }

    async fn price_per_token(&self, token: Address) -> Result<U256, ClientError> {
        self.read_token(token, |t| Ok(t.price_per_token())).await
    }

    async fn get_contract_balance(&self, token: Address) -> Result<U256, ClientError> {
        self.read_token(token, |t| Ok(t.get_contract_balance())).await
    }

    async fn balance_of(&self, token: Address, holder: Address) -> Result<U256, ClientError> {
        self.read_token(token, |t| Ok(t.balance_of(holder))).await
    }

    async fn calculate_cost(&self, token: Address, amount: U256) -> Result<U256, ClientError> {
        self.read_token(token, |t| t.calculate_cost(amount)).await
    }

    async fn quote(&self, token: Address, amount: U256) -> Result<Quote, ClientError> {
        self.read_token(token, |t| {
            Ok(Quote {
                price_per_token: t.price_per_token(),
                cost: t.calculate_cost(amount)?,
            })
        })
        .await
    }
}

#[async_trait]
impl TxSubmitter for Node {
    async fn submit(&self, tx: Transaction) -> Result<PendingTransaction, ClientError> {
        Node::submit(self, tx).await
    }
}
