// src/evm.rs - Per-call execution context: msg, block and side-effect buffers

use alloy_primitives::{Address, Log, U256};
use alloy_sol_types::SolEvent;

/// Block the call is being executed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    pub timestamp: u64,
}

/// Everything a ledger call can observe about its invocation, plus the
/// buffered side effects it produces.
///
/// Logs and native transfers are only committed by the chain when the call
/// returns `Ok`; a reverted call drops the whole `Env`.
#[derive(Debug)]
pub struct Env {
    sender: Address,
    value: U256,
    block: BlockInfo,
    logs: Vec<Log>,
    transfers: Vec<(Address, U256)>,
}

impl Env {
    pub fn new(sender: Address, value: U256, block: BlockInfo) -> Self {
        Self {
            sender,
            value,
            block,
            logs: Vec::new(),
            transfers: Vec::new(),
        }
    }

    /// msg.sender
    pub fn sender(&self) -> Address {
        self.sender
    }

    /// msg.value
    pub fn value(&self) -> U256 {
        self.value
    }

    pub fn block(&self) -> BlockInfo {
        self.block
    }

    pub fn timestamp(&self) -> u64 {
        self.block.timestamp
    }

    /// Emits `event` from `emitter`.
    pub fn log<E: SolEvent>(&mut self, emitter: Address, event: E) {
        self.logs.push(Log {
            address: emitter,
            data: event.encode_log_data(),
        });
    }

    /// Queues a native-currency payment out of the executing contract.
    pub fn transfer_native(&mut self, to: Address, amount: U256) {
        self.transfers.push((to, amount));
    }

    pub fn logs(&self) -> &[Log] {
        &self.logs
    }

    pub fn into_effects(self) -> (Vec<Log>, Vec<(Address, U256)>) {
        (self.logs, self.transfers)
    }
}

/// Rejects a non-zero msg.value on functions that are not payable.
pub fn non_payable(env: &Env) -> Result<(), crate::error::MarketError> {
    if env.value() != U256::ZERO {
        return Err(crate::error::MarketError::invalid_input(
            "function is not payable",
        ));
    }
    Ok(())
}
