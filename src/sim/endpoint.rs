//! Message transport endpoint of one chain

use crate::error::ExternalError;
use crate::external::{CachedMessage, Envelope, MessageKey, OutboundMessage};
use crate::types::ChainId;

use alloy_primitives::{Address, U256};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Native fee charged per message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub base_fee: U256,
    pub fee_per_byte: U256,
    /// Destination chain -> price of one unit of destination gas
    pub fee_per_gas: HashMap<ChainId, U256>,
}

impl FeeSchedule {
    /// Fee of one message, native drop included
    pub fn estimate(
        &self,
        dst_chain_id: ChainId,
        payload_len: usize,
        gas_limit: u64,
        native_drop: U256,
    ) -> Result<U256, ExternalError> {
        let gas_price = self
            .fee_per_gas
            .get(&dst_chain_id)
            .ok_or(ExternalError::UnknownChain(dst_chain_id))?;

        Ok(self.base_fee
            + self.fee_per_byte * U256::from(payload_len)
            + *gas_price * U256::from(gas_limit)
            + native_drop)
    }
}

/// Outbound queue, nonce sequence and dead-letter cache of one chain
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub address: Address,
    pub chain_id: ChainId,
    pub fees: FeeSchedule,
    /// Last nonce used per destination chain
    nonces: HashMap<ChainId, u64>,
    outbox: Vec<Envelope>,
    cache: HashMap<MessageKey, CachedMessage>,
}

impl Endpoint {
    pub fn new(chain_id: ChainId, address: Address, fees: FeeSchedule) -> Self {
        Self {
            address,
            chain_id,
            fees,
            nonces: HashMap::new(),
            outbox: Vec::new(),
            cache: HashMap::new(),
        }
    }

    /// Queue a paid-for message and return its nonce
    pub fn enqueue(&mut self, message: OutboundMessage) -> u64 {
        let nonce = self.nonces.entry(message.dst_chain_id).or_insert(0);
        *nonce += 1;

        self.outbox.push(Envelope {
            src_chain_id: self.chain_id,
            src_address: message.sender,
            dst_chain_id: message.dst_chain_id,
            dst_address: message.dst_address,
            nonce: *nonce,
            token: message.token,
            native_drop: message.native_drop,
            gas_limit: message.gas_limit,
            payload: message.payload,
        });
        *nonce
    }

    pub fn drain_outbox(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.outbox)
    }

    /// Envelopes queued since the last drain
    pub fn outbox(&self) -> &[Envelope] {
        &self.outbox
    }

    pub fn cache_failed(&mut self, envelope: Envelope, reason: String) {
        self.cache.insert(
            envelope.key(),
            CachedMessage {
                envelope,
                reason,
                failed_at: Utc::now(),
            },
        );
    }

    pub fn take_cached(&mut self, key: &MessageKey) -> Option<CachedMessage> {
        self.cache.remove(key)
    }

    pub fn cached_keys(&self) -> Vec<MessageKey> {
        self.cache.keys().copied().collect()
    }
}
