//! Error types for the cross-chain orchestration core
//!
//! Every fatal condition surfaces as its own named reason so callers can
//! branch on it. Failures raised while handling an inbound message are further
//! split by [`Disposition`]: dropped outright, or retained in the transport's
//! dead-letter cache for a later retry.

use alloy_primitives::{Address, U256};
use thiserror::Error;

use crate::types::ChainId;

/// Failures raised by the external collaborators (token ledgers, swapper,
/// accounting engine, transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExternalError {
    #[error("insufficient balance of {token} for {holder}: have {have}, need {need}")]
    InsufficientBalance {
        token: Address,
        holder: Address,
        have: U256,
        need: U256,
    },

    #[error("insufficient native balance for {holder}: have {have}, need {need}")]
    InsufficientNativeBalance {
        holder: Address,
        have: U256,
        need: U256,
    },

    #[error("swap output {amount_out} below minimum {amount_out_min}")]
    SlippageTooHigh { amount_out: U256, amount_out_min: U256 },

    #[error("no swap route from {token_in} to {token_out}")]
    UnsupportedPair { token_in: Address, token_out: Address },

    #[error("no price for token {0}")]
    MissingPrice(Address),

    #[error("unknown deposit market {0}")]
    UnknownMarket(Address),

    #[error("withdraw of {requested} exceeds unlocked collateral {unlocked}")]
    ExceedsUnlocked { requested: U256, unlocked: U256 },

    #[error("native fee {supplied} below required {required}")]
    InsufficientFee { supplied: U256, required: U256 },

    #[error("no transport path to chain {0}")]
    UnknownChain(ChainId),
}

/// Protocol-level error reasons
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    // Authentication
    #[error("message sender is not the transport")]
    InvalidMsgSender,

    #[error("source address does not match the trusted route for chain {chain_id}")]
    InvalidFromAddress { chain_id: ChainId },

    #[error("sender is not the cross-chain dispatcher")]
    SenderIsNotCrossChainDispatcher,

    #[error("sender is not the governor")]
    SenderIsNotGovernor,

    // Policy
    #[error("bridging is paused")]
    BridgingIsPaused,

    #[error("destination chain {chain_id} is not allowed")]
    DestinationChainNotAllowed { chain_id: ChainId },

    #[error("protocol is shut down")]
    IsShutdown,

    #[error("cross-chain flash repay is inactive")]
    CrossChainFlashRepayInactive,

    // Bounds
    #[error("leverage too low")]
    LeverageTooLow,

    #[error("leverage too high")]
    LeverageTooHigh,

    #[error("amount is too high")]
    AmountIsTooHigh,

    #[error("amount is zero")]
    AmountIsZero,

    #[error("flash repay slippage too high")]
    FlashRepaySlippageTooHigh,

    #[error("leverage slippage too high")]
    LeverageSlippageTooHigh,

    #[error("position is not healthy")]
    PositionIsNotHealthy,

    // Ledger consistency
    #[error("invalid cross-chain request key")]
    InvalidRequestKey,

    #[error("cross-chain request completed already")]
    RequestAlreadyCompleted,

    // Configuration
    #[error("address is null")]
    AddressIsNull,

    #[error("new value is same as current")]
    NewValueIsSameAsCurrent,

    #[error("unknown bridge pool {0}")]
    UnknownBridgePool(U256),

    #[error("token {0} has no bridge pool")]
    UnsupportedBridgeToken(Address),

    // Payload
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    // Retry
    #[error("no cached message for chain {src_chain_id} nonce {nonce}")]
    MessageNotCached { src_chain_id: ChainId, nonce: u64 },

    #[error(transparent)]
    External(#[from] ExternalError),
}

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Authentication,
    Policy,
    Bounds,
    Ledger,
    Configuration,
    Payload,
    Retry,
    External,
}

/// What the inbound path does with a message whose handler failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Reject permanently; replaying can never succeed
    Drop,
    /// Keep in the dead-letter cache so it can be replayed
    Retain,
}

impl ProtocolError {
    /// Taxonomy class of this error
    pub fn class(&self) -> ErrorClass {
        use ProtocolError::*;

        match self {
            InvalidMsgSender
            | InvalidFromAddress { .. }
            | SenderIsNotCrossChainDispatcher
            | SenderIsNotGovernor => ErrorClass::Authentication,
            BridgingIsPaused
            | DestinationChainNotAllowed { .. }
            | IsShutdown
            | CrossChainFlashRepayInactive => ErrorClass::Policy,
            LeverageTooLow
            | LeverageTooHigh
            | AmountIsTooHigh
            | AmountIsZero
            | FlashRepaySlippageTooHigh
            | LeverageSlippageTooHigh
            | PositionIsNotHealthy => ErrorClass::Bounds,
            InvalidRequestKey | RequestAlreadyCompleted => ErrorClass::Ledger,
            AddressIsNull
            | NewValueIsSameAsCurrent
            | UnknownBridgePool(_)
            | UnsupportedBridgeToken(_) => ErrorClass::Configuration,
            InvalidPayload(_) => ErrorClass::Payload,
            MessageNotCached { .. } => ErrorClass::Retry,
            External(_) => ErrorClass::External,
        }
    }

    /// Inbound handling for this error
    pub fn disposition(&self) -> Disposition {
        match self.class() {
            ErrorClass::Authentication | ErrorClass::Ledger | ErrorClass::Payload => {
                Disposition::Drop
            }
            _ => Disposition::Retain,
        }
    }

    /// Check if a failed inbound message may be replayed later
    pub fn is_retryable(&self) -> bool {
        self.disposition() == Disposition::Retain
    }

    /// Stable reason name, used for events and metric labels
    pub fn reason(&self) -> &'static str {
        use ProtocolError::*;

        match self {
            InvalidMsgSender => "InvalidMsgSender",
            InvalidFromAddress { .. } => "InvalidFromAddress",
            SenderIsNotCrossChainDispatcher => "SenderIsNotCrossChainDispatcher",
            SenderIsNotGovernor => "SenderIsNotGovernor",
            BridgingIsPaused => "BridgingIsPaused",
            DestinationChainNotAllowed { .. } => "DestinationChainNotAllowed",
            IsShutdown => "IsShutdown",
            CrossChainFlashRepayInactive => "CrossChainFlashRepayInactive",
            LeverageTooLow => "LeverageTooLow",
            LeverageTooHigh => "LeverageTooHigh",
            AmountIsTooHigh => "AmountIsTooHigh",
            AmountIsZero => "AmountIsZero",
            FlashRepaySlippageTooHigh => "FlashRepaySlippageTooHigh",
            LeverageSlippageTooHigh => "LeverageSlippageTooHigh",
            PositionIsNotHealthy => "PositionIsNotHealthy",
            InvalidRequestKey => "CrossChainRequestInvalidKey",
            RequestAlreadyCompleted => "CrossChainRequestCompletedAlready",
            AddressIsNull => "AddressIsNull",
            NewValueIsSameAsCurrent => "NewValueIsSameAsCurrent",
            UnknownBridgePool(_) => "UnknownBridgePool",
            UnsupportedBridgeToken(_) => "UnsupportedBridgeToken",
            InvalidPayload(_) => "InvalidPayload",
            MessageNotCached { .. } => "MessageNotCached",
            External(_) => "ExternalFailure",
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors of the multi-chain relay loop
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Chain {chain_id} not found")]
    ChainNotFound { chain_id: ChainId },

    #[error("Relay did not go idle after {rounds} rounds")]
    Stalled { rounds: u32 },

    #[error("Delivery task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
