//! Protocol event types
//!
//! Events are recorded by a chain as part of the unit of work that produced
//! them, so a rolled-back call leaves no events behind.

use crate::external::MessageKey;
use crate::governance::ConfigChange;
use crate::types::{ChainId, RequestId, RequestKind};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Events emitted by the orchestration core of one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    /// Cross-chain request registered and dispatched
    RequestRegistered {
        chain_id: ChainId,
        request_id: RequestId,
        kind: RequestKind,
        account: Address,
        dst_chain_id: ChainId,
    },

    /// Callback completed a request
    RequestFinished {
        chain_id: ChainId,
        request_id: RequestId,
        kind: RequestKind,
        amount_out: U256,
    },

    /// Leverage settled on a single chain
    LeverageSettled {
        chain_id: ChainId,
        account: Address,
        deposited: U256,
        debt_issued: U256,
    },

    /// Flash repay settled on a single chain
    FlashRepaySettled {
        chain_id: ChainId,
        account: Address,
        withdrawn: U256,
        repaid: U256,
    },

    /// Message handed to the transport
    MessageSent {
        chain_id: ChainId,
        dst_chain_id: ChainId,
        nonce: u64,
        payload: String,
    },

    /// Inbound message handled successfully
    MessageDelivered {
        chain_id: ChainId,
        key: MessageKey,
        payload: String,
    },

    /// Swap performed by the dispatcher for a remote request
    SwapExecuted {
        chain_id: ChainId,
        request_id: RequestId,
        amount_in: U256,
        amount_out: U256,
    },

    /// Inbound handler failed
    MessageFailed {
        chain_id: ChainId,
        key: MessageKey,
        reason: String,
        retained: bool,
    },

    /// Cached message replayed successfully
    MessageRetried {
        chain_id: ChainId,
        key: MessageKey,
    },

    /// Retry path changed a request's bound
    BoundUpdated {
        chain_id: ChainId,
        request_id: RequestId,
        previous: U256,
        bound: U256,
    },

    /// Governance changed the bridge configuration
    ConfigChanged {
        chain_id: ChainId,
        change: ConfigChange,
    },
}

impl ProtocolEvent {
    /// Get the chain ID for this event
    pub fn chain_id(&self) -> ChainId {
        match self {
            ProtocolEvent::RequestRegistered { chain_id, .. } => *chain_id,
            ProtocolEvent::RequestFinished { chain_id, .. } => *chain_id,
            ProtocolEvent::LeverageSettled { chain_id, .. } => *chain_id,
            ProtocolEvent::FlashRepaySettled { chain_id, .. } => *chain_id,
            ProtocolEvent::MessageSent { chain_id, .. } => *chain_id,
            ProtocolEvent::MessageDelivered { chain_id, .. } => *chain_id,
            ProtocolEvent::SwapExecuted { chain_id, .. } => *chain_id,
            ProtocolEvent::MessageFailed { chain_id, .. } => *chain_id,
            ProtocolEvent::MessageRetried { chain_id, .. } => *chain_id,
            ProtocolEvent::BoundUpdated { chain_id, .. } => *chain_id,
            ProtocolEvent::ConfigChanged { chain_id, .. } => *chain_id,
        }
    }

    /// Get event name for metrics
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::RequestRegistered { .. } => "request_registered",
            ProtocolEvent::RequestFinished { .. } => "request_finished",
            ProtocolEvent::LeverageSettled { .. } => "leverage_settled",
            ProtocolEvent::FlashRepaySettled { .. } => "flash_repay_settled",
            ProtocolEvent::MessageSent { .. } => "message_sent",
            ProtocolEvent::MessageDelivered { .. } => "message_delivered",
            ProtocolEvent::SwapExecuted { .. } => "swap_executed",
            ProtocolEvent::MessageFailed { .. } => "message_failed",
            ProtocolEvent::MessageRetried { .. } => "message_retried",
            ProtocolEvent::BoundUpdated { .. } => "bound_updated",
            ProtocolEvent::ConfigChanged { .. } => "config_changed",
        }
    }
}
