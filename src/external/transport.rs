//! Message transport boundary
//!
//! The transport guarantees at-least-once, unordered delivery. Inbound
//! messages whose handler failed in a retryable way are parked in a
//! dead-letter cache keyed by `(src_chain_id, src_address, nonce)`.

use crate::error::ExternalError;
use crate::types::ChainId;

use alloy_primitives::{Address, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Token value carried alongside a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub token: Address,
    pub amount: U256,
}

/// A message handed to the transport by a local sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Local contract sending the message; pays the fee and provides tokens
    pub sender: Address,
    pub dst_chain_id: ChainId,
    pub dst_address: Address,
    pub token: Option<TokenAmount>,
    /// Native currency attached to pay the transport
    pub native_fee: U256,
    /// Native currency delivered to `dst_address` on the destination chain
    pub native_drop: U256,
    pub gas_limit: u64,
    /// Receives any fee overpayment
    pub refund_address: Address,
    pub payload: Bytes,
}

/// A message in flight between two chains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub src_chain_id: ChainId,
    pub src_address: Address,
    pub dst_chain_id: ChainId,
    pub dst_address: Address,
    pub nonce: u64,
    pub token: Option<TokenAmount>,
    pub native_drop: U256,
    pub gas_limit: u64,
    pub payload: Bytes,
}

impl Envelope {
    /// Dead-letter cache key of this envelope
    pub fn key(&self) -> MessageKey {
        MessageKey {
            src_chain_id: self.src_chain_id,
            src_address: self.src_address,
            nonce: self.nonce,
        }
    }
}

/// Dead-letter cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageKey {
    pub src_chain_id: ChainId,
    pub src_address: Address,
    pub nonce: u64,
}

/// A delivered message whose handler failed and may be replayed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMessage {
    pub envelope: Envelope,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Cross-chain message transport
pub trait Transport {
    /// Address inbound handlers see as their caller
    fn transport_address(&self) -> Address;

    /// Chain this transport endpoint lives on
    fn local_chain_id(&self) -> ChainId;

    /// Native fee needed to deliver a message to `dst_chain_id`
    fn estimate_fee(
        &self,
        dst_chain_id: ChainId,
        payload_len: usize,
        gas_limit: u64,
        native_drop: U256,
    ) -> Result<U256, ExternalError>;

    /// Take custody of the message's tokens and fee and queue it for
    /// delivery. Returns the assigned nonce. Fee overpayment is refunded to
    /// `refund_address`.
    fn send(&mut self, message: OutboundMessage) -> Result<u64, ExternalError>;

    /// Credit an inbound envelope's tokens and native drop to its recipient.
    /// Happens before, and independently of, the receive handler.
    fn credit_inbound(&mut self, envelope: &Envelope) -> Result<(), ExternalError>;

    /// Park a failed inbound message in the dead-letter cache
    fn cache_failed(&mut self, envelope: Envelope, reason: String);

    fn take_cached(&mut self, key: &MessageKey) -> Option<CachedMessage>;

    /// Remove and return all queued outbound envelopes
    fn drain_outbox(&mut self) -> Vec<Envelope>;
}
