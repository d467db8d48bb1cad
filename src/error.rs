// src/error.rs - Revert taxonomy for the ledger and client-side failures

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolError;
use thiserror::Error;

use crate::abi::{
    ArithmeticOverflow, InsufficientAllowance, InsufficientBalance, InsufficientFunds,
    InsufficientInventory, InsufficientLiquidity, InvalidInput, NotForSale, NotFound,
    PaymentMismatch, Unauthorized, ZeroAddress,
};
use crate::shadow::ShadowError;

/// Every way a factory or token call can revert.
///
/// Each variant wraps the matching Solidity error so the revert data an EVM
/// client would see is available through [`MarketError::revert_data`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("invalid input: {}", .0.reason)]
    InvalidInput(InvalidInput),

    #[error("caller {} is not the token creator {}", .0.caller, .0.creator)]
    Unauthorized(Unauthorized),

    #[error("token is not for sale")]
    NotForSale(NotForSale),

    #[error("payment mismatch: expected {}, provided {}", .0.expected, .0.provided)]
    PaymentMismatch(PaymentMismatch),

    #[error("insufficient inventory: available {}, requested {}", .0.available, .0.requested)]
    InsufficientInventory(InsufficientInventory),

    #[error("insufficient token balance: have {}, need {}", .0.balance, .0.required)]
    InsufficientBalance(InsufficientBalance),

    #[error("insufficient liquidity: have {}, need {}", .0.liquidity, .0.required)]
    InsufficientLiquidity(InsufficientLiquidity),

    #[error("insufficient allowance: have {}, need {}", .0.allowance, .0.required)]
    InsufficientAllowance(InsufficientAllowance),

    #[error("zero address")]
    ZeroAddress(ZeroAddress),

    #[error("insufficient funds: have {}, need {}", .0.balance, .0.required)]
    InsufficientFunds(InsufficientFunds),

    #[error("arithmetic overflow")]
    ArithmeticOverflow(ArithmeticOverflow),

    #[error("not found: {}", .0.what)]
    NotFound(NotFound),
}

impl MarketError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput(InvalidInput {
            reason: reason.into(),
        })
    }

    pub fn unauthorized(caller: Address, creator: Address) -> Self {
        Self::Unauthorized(Unauthorized { caller, creator })
    }

    pub fn not_for_sale() -> Self {
        Self::NotForSale(NotForSale {})
    }

    pub fn payment_mismatch(expected: U256, provided: U256) -> Self {
        Self::PaymentMismatch(PaymentMismatch { expected, provided })
    }

    pub fn insufficient_inventory(available: U256, requested: U256) -> Self {
        Self::InsufficientInventory(InsufficientInventory {
            available,
            requested,
        })
    }

    pub fn insufficient_balance(balance: U256, required: U256) -> Self {
        Self::InsufficientBalance(InsufficientBalance { balance, required })
    }

    pub fn insufficient_liquidity(liquidity: U256, required: U256) -> Self {
        Self::InsufficientLiquidity(InsufficientLiquidity {
            liquidity,
            required,
        })
    }

    pub fn insufficient_allowance(allowance: U256, required: U256) -> Self {
        Self::InsufficientAllowance(InsufficientAllowance {
            allowance,
            required,
        })
    }

    pub fn zero_address() -> Self {
        Self::ZeroAddress(ZeroAddress {})
    }

    pub fn insufficient_funds(balance: U256, required: U256) -> Self {
        Self::InsufficientFunds(InsufficientFunds { balance, required })
    }

    pub fn overflow() -> Self {
        Self::ArithmeticOverflow(ArithmeticOverflow {})
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(NotFound { what: what.into() })
    }

    /// ABI-encoded revert data: 4-byte selector followed by the error arguments.
    pub fn revert_data(&self) -> Vec<u8> {
        match self {
            Self::InvalidInput(e) => e.abi_encode(),
            Self::Unauthorized(e) => e.abi_encode(),
            Self::NotForSale(e) => e.abi_encode(),
            Self::PaymentMismatch(e) => e.abi_encode(),
            Self::InsufficientInventory(e) => e.abi_encode(),
            Self::InsufficientBalance(e) => e.abi_encode(),
            Self::InsufficientLiquidity(e) => e.abi_encode(),
            Self::InsufficientAllowance(e) => e.abi_encode(),
            Self::ZeroAddress(e) => e.abi_encode(),
            Self::InsufficientFunds(e) => e.abi_encode(),
            Self::ArithmeticOverflow(e) => e.abi_encode(),
            Self::NotFound(e) => e.abi_encode(),
        }
    }

    /// Decodes revert data produced by [`MarketError::revert_data`].
    ///
    /// Returns `None` when the selector is unknown or the payload is malformed.
    pub fn from_revert_data(data: &[u8]) -> Option<Self> {
        macro_rules! try_decode {
            ($($variant:ident),* $(,)?) => {
                $(
                    if data.starts_with(&$variant::SELECTOR) {
                        return $variant::abi_decode(data, true).ok().map(Self::$variant);
                    }
                )*
            };
        }

        if data.len() < 4 {
            return None;
        }
        try_decode!(
            InvalidInput,
            Unauthorized,
            NotForSale,
            PaymentMismatch,
            InsufficientInventory,
            InsufficientBalance,
            InsufficientLiquidity,
            InsufficientAllowance,
            ZeroAddress,
            InsufficientFunds,
            ArithmeticOverflow,
            NotFound,
        );
        None
    }
}

/// Result type for ledger calls
pub type MarketResult<T> = Result<T, MarketError>;

/// Failures seen by code talking to a [`Node`](crate::node::Node).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("transaction reverted: {0}")]
    Reverted(#[from] MarketError),

    #[error("node is not accepting requests")]
    NodeUnavailable,

    #[error("no account connected")]
    NoAccount,

    #[error("transaction {0} not confirmed in time; its outcome is unknown")]
    ConfirmationTimeout(B256),

    #[error("receipt for {0} is missing the created token address")]
    MissingContractAddress(B256),

    #[error("shadow store: {0}")]
    Shadow(#[from] ShadowError),
}

impl ClientError {
    /// The ledger revert behind this failure, if any.
    pub fn revert(&self) -> Option<&MarketError> {
        match self {
            Self::Reverted(e) => Some(e),
            _ => None,
        }
    }
}
