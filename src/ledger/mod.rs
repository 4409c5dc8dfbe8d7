//! Request ledger
//!
//! Handles:
//! - Registration of cross-chain requests under derived ids
//! - One-way completion tracking
//! - Bound updates from the retry path
//!
//! Entries are never removed; finished requests stay as an audit trail.

mod request;

pub use request::{CrossChainRequest, NewRequest, RequestTerms};

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::{derive_request_id, short_id, ChainId, RequestId};

use alloy_primitives::U256;
use chrono::Utc;
use std::collections::HashMap;
use tracing::debug;

/// Durable store of cross-chain requests for one chain
#[derive(Debug, Clone)]
pub struct RequestLedger {
    /// Chain the ledger lives on, mixed into every id
    chain_id: ChainId,
    /// Number of requests ever created
    counter: u64,
    /// All requests by id
    requests: HashMap<RequestId, CrossChainRequest>,
}

impl RequestLedger {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            counter: 0,
            requests: HashMap::new(),
        }
    }

    /// Register a new request and return its id
    pub fn register(&mut self, new: NewRequest) -> RequestId {
        self.counter += 1;
        let id = derive_request_id(self.chain_id, self.counter);

        let request = CrossChainRequest {
            id,
            account: new.account,
            dst_chain_id: new.dst_chain_id,
            synthetic_token: new.synthetic_token,
            deposit_token: new.deposit_token,
            bridge_token: new.bridge_token,
            bound_amount: new.bound_amount,
            terms: new.terms,
            finished: false,
            created_at: Utc::now(),
        };

        debug!(
            "Registered {} request {} for {} on chain {}",
            request.kind(),
            short_id(&id),
            request.account,
            self.chain_id
        );

        self.requests.insert(id, request);
        id
    }

    /// Get a request by id
    pub fn get(&self, id: &RequestId) -> ProtocolResult<&CrossChainRequest> {
        self.requests.get(id).ok_or(ProtocolError::InvalidRequestKey)
    }

    /// Get a request that has not finished yet
    pub fn get_pending(&self, id: &RequestId) -> ProtocolResult<&CrossChainRequest> {
        let request = self.get(id)?;
        if request.finished {
            return Err(ProtocolError::RequestAlreadyCompleted);
        }
        Ok(request)
    }

    /// Mark a request finished. Fails on unknown or already finished ids.
    pub fn mark_finished(&mut self, id: &RequestId) -> ProtocolResult<()> {
        let request = self
            .requests
            .get_mut(id)
            .ok_or(ProtocolError::InvalidRequestKey)?;

        if request.finished {
            return Err(ProtocolError::RequestAlreadyCompleted);
        }

        request.finished = true;
        Ok(())
    }

    /// Replace the bound of a pending request, returning the previous value
    pub fn update_bound(&mut self, id: &RequestId, bound_amount: U256) -> ProtocolResult<U256> {
        let request = self
            .requests
            .get_mut(id)
            .ok_or(ProtocolError::InvalidRequestKey)?;

        if request.finished {
            return Err(ProtocolError::RequestAlreadyCompleted);
        }

        let previous = request.bound_amount;
        request.bound_amount = bound_amount;
        Ok(previous)
    }

    /// Requests still waiting for their callback
    pub fn pending(&self) -> impl Iterator<Item = &CrossChainRequest> {
        self.requests.values().filter(|r| !r.finished)
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Request statistics
    pub fn stats(&self) -> LedgerStats {
        let finished = self.requests.values().filter(|r| r.finished).count() as u64;
        LedgerStats {
            created: self.counter,
            pending: self.counter - finished,
            finished,
        }
    }
}

/// Ledger statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerStats {
    pub created: u64,
    pub pending: u64,
    pub finished: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, B256};

    fn flash_repay() -> NewRequest {
        NewRequest {
            account: Address::repeat_byte(0xaa),
            dst_chain_id: 1,
            synthetic_token: Address::repeat_byte(1),
            deposit_token: Address::repeat_byte(2),
            bridge_token: Address::repeat_byte(3),
            bound_amount: U256::from(95),
            terms: RequestTerms::FlashRepay {
                withdrawn_amount: U256::from(100),
            },
        }
    }

    #[test]
    fn test_register_derives_distinct_ids() {
        let mut ledger = RequestLedger::new(10);
        let a = ledger.register(flash_repay());
        let b = ledger.register(flash_repay());

        assert_ne!(a, b);
        assert_eq!(ledger.len(), 2);
        assert!(!ledger.get(&a).unwrap().finished);
    }

    #[test]
    fn test_unknown_id_is_invalid_key() {
        let ledger = RequestLedger::new(10);
        assert_eq!(
            ledger.get(&B256::ZERO).unwrap_err(),
            ProtocolError::InvalidRequestKey
        );
    }

    #[test]
    fn test_finished_is_set_exactly_once() {
        let mut ledger = RequestLedger::new(10);
        let id = ledger.register(flash_repay());

        ledger.mark_finished(&id).unwrap();
        assert_eq!(
            ledger.mark_finished(&id).unwrap_err(),
            ProtocolError::RequestAlreadyCompleted
        );
        assert_eq!(
            ledger.update_bound(&id, U256::from(1)).unwrap_err(),
            ProtocolError::RequestAlreadyCompleted
        );
        assert_eq!(ledger.stats(), LedgerStats { created: 1, pending: 0, finished: 1 });
    }

    #[test]
    fn test_update_bound_keeps_latest_value() {
        let mut ledger = RequestLedger::new(10);
        let id = ledger.register(flash_repay());

        assert_eq!(ledger.update_bound(&id, U256::from(90)).unwrap(), U256::from(95));
        assert_eq!(ledger.update_bound(&id, U256::from(80)).unwrap(), U256::from(90));
        assert_eq!(ledger.get(&id).unwrap().bound_amount, U256::from(80));
        assert_eq!(ledger.pending().count(), 1);
    }
}
