//! Chain module - one chain's orchestration core and its collaborators
//!
//! This module provides:
//! - Transactional units of work: every entry point runs against a snapshot of
//!   the chain state and only commits if it succeeds
//! - Inbound delivery with drop / dead-letter disposition of failures
//! - The user, governance, retry and fee-quote entry points of a chain

use crate::dispatcher::CrossChainDispatcher;
use crate::error::{ProtocolError, ProtocolResult};
use crate::events::ProtocolEvent;
use crate::external::{Envelope, Environment, MessageKey};
use crate::fees::{FeeQuote, FeeQuoter};
use crate::governance::{BridgeConfig, ConfigChange, Governance};
use crate::ledger::RequestLedger;
use crate::metrics;
use crate::orchestrator::{
    CrossChainArgs, FlashRepayParams, LeverageParams, RequestOrchestrator, RequestOutcome,
};
use crate::retry::RetryCoordinator;
use crate::types::{ChainId, RequestId};

use alloy_primitives::{Address, U256};
use tracing::{debug, error, warn};

/// Mutable view of a chain handed to the components during a unit of work
pub struct Ctx<'a, E> {
    pub chain_id: ChainId,
    pub env: &'a mut E,
    pub ledger: &'a mut RequestLedger,
    pub config: &'a BridgeConfig,
    pub events: &'a mut Vec<ProtocolEvent>,
}

impl<'a, E> Ctx<'a, E> {
    /// Record an event as part of the current unit of work
    pub fn emit(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }
}

/// Everything a unit of work may change
#[derive(Debug, Clone)]
struct ChainState<E> {
    env: E,
    ledger: RequestLedger,
    governance: Governance,
    /// Events of the unit of work in progress
    events: Vec<ProtocolEvent>,
}

impl<E> ChainState<E> {
    fn ctx(&mut self, chain_id: ChainId) -> Ctx<'_, E> {
        Ctx {
            chain_id,
            env: &mut self.env,
            ledger: &mut self.ledger,
            config: self.governance.config(),
            events: &mut self.events,
        }
    }
}

/// What happened to an inbound envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// Handler failed; the envelope waits in the dead-letter cache
    Retained { error: ProtocolError },
    /// Handler failed permanently
    Dropped { error: ProtocolError },
}

/// A single chain: orchestrator, dispatcher, ledger, governance and the
/// external collaborators they drive
#[derive(Debug)]
pub struct Chain<E> {
    chain_id: ChainId,
    dispatcher: CrossChainDispatcher,
    orchestrator: RequestOrchestrator,
    state: ChainState<E>,
    /// Committed events, oldest first
    journal: Vec<ProtocolEvent>,
}

impl<E: Environment> Chain<E> {
    /// Create a new chain
    pub fn new(
        chain_id: ChainId,
        env: E,
        governor: Address,
        dispatcher: Address,
        orchestrator: Address,
    ) -> Self {
        Self {
            chain_id,
            dispatcher: CrossChainDispatcher::new(dispatcher, orchestrator),
            orchestrator: RequestOrchestrator::new(orchestrator, dispatcher),
            state: ChainState {
                env,
                ledger: RequestLedger::new(chain_id),
                governance: Governance::new(governor),
                events: Vec::new(),
            },
            journal: Vec::new(),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn dispatcher(&self) -> &CrossChainDispatcher {
        &self.dispatcher
    }

    pub fn orchestrator(&self) -> &RequestOrchestrator {
        &self.orchestrator
    }

    pub fn env(&self) -> &E {
        &self.state.env
    }

    /// Direct access to the collaborators, outside of any unit of work
    pub fn env_mut(&mut self) -> &mut E {
        &mut self.state.env
    }

    pub fn ledger(&self) -> &RequestLedger {
        &self.state.ledger
    }

    pub fn config(&self) -> &BridgeConfig {
        self.state.governance.config()
    }

    pub fn governor(&self) -> Address {
        self.state.governance.governor()
    }

    /// Committed events
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.journal
    }

    pub fn take_events(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.journal)
    }

    /// Run `f` against a snapshot of the chain state. The snapshot replaces
    /// the current state only if `f` succeeds.
    fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Ctx<'_, E>, &CrossChainDispatcher, &RequestOrchestrator) -> ProtocolResult<T>,
    ) -> ProtocolResult<T> {
        let mut draft = self.state.clone();
        let value = {
            let mut ctx = draft.ctx(self.chain_id);
            f(&mut ctx, &self.dispatcher, &self.orchestrator)?
        };

        for event in draft.events.drain(..) {
            metrics::record_event(&event);
            self.journal.push(event);
        }
        self.state = draft;
        Ok(value)
    }

    /// Open or grow a leveraged position, locally or through `cross_chain.dst_chain_id`
    pub fn leverage(
        &mut self,
        caller: Address,
        params: &LeverageParams,
        cross_chain: Option<&CrossChainArgs>,
    ) -> ProtocolResult<RequestOutcome> {
        self.transact(|ctx, dispatcher, orchestrator| {
            orchestrator.leverage(ctx, dispatcher, caller, params, cross_chain)
        })
    }

    /// Repay debt with withdrawn collateral, locally or through `cross_chain.dst_chain_id`
    pub fn flash_repay(
        &mut self,
        caller: Address,
        params: &FlashRepayParams,
        cross_chain: Option<&CrossChainArgs>,
    ) -> ProtocolResult<RequestOutcome> {
        self.transact(|ctx, dispatcher, orchestrator| {
            orchestrator.flash_repay(ctx, dispatcher, caller, params, cross_chain)
        })
    }

    pub fn cross_chain_leverage_callback(
        &mut self,
        caller: Address,
        request_id: RequestId,
        token: Address,
        swap_amount_out: U256,
    ) -> ProtocolResult<U256> {
        self.transact(|ctx, _, orchestrator| {
            orchestrator.cross_chain_leverage_callback(
                ctx,
                caller,
                request_id,
                token,
                swap_amount_out,
            )
        })
    }

    pub fn cross_chain_flash_repay_callback(
        &mut self,
        caller: Address,
        request_id: RequestId,
        token: Address,
        swap_amount_out: U256,
    ) -> ProtocolResult<U256> {
        self.transact(|ctx, _, orchestrator| {
            orchestrator.cross_chain_flash_repay_callback(
                ctx,
                caller,
                request_id,
                token,
                swap_amount_out,
            )
        })
    }

    /// Run the dispatcher's inbound handler as `caller`
    pub fn receive(&mut self, caller: Address, envelope: &Envelope) -> ProtocolResult<()> {
        self.transact(|ctx, dispatcher, orchestrator| {
            dispatcher.receive(ctx, orchestrator, caller, envelope)
        })
    }

    /// Transport-side delivery of an envelope addressed to this chain.
    ///
    /// Tokens and native drop are credited first and stay credited whatever
    /// the handler does. A retryable handler failure parks the envelope in
    /// the dead-letter cache.
    pub fn deliver(&mut self, envelope: Envelope) -> DeliveryOutcome {
        let key = envelope.key();

        if let Err(e) = self.state.env.credit_inbound(&envelope) {
            error!(
                "Failed to credit message {} from chain {} on chain {}: {}",
                key.nonce, key.src_chain_id, self.chain_id, e
            );
            let error = ProtocolError::External(e);
            self.record_failure(key, &error, false);
            return DeliveryOutcome::Dropped { error };
        }

        let caller = self.state.env.transport_address();
        match self.receive(caller, &envelope) {
            Ok(()) => {
                debug!(
                    "Delivered message {} from chain {} on chain {}",
                    key.nonce, key.src_chain_id, self.chain_id
                );
                DeliveryOutcome::Delivered
            }
            Err(error) if error.is_retryable() => {
                warn!(
                    "Message {} from chain {} failed on chain {}, cached for retry: {}",
                    key.nonce, key.src_chain_id, self.chain_id, error
                );
                self.state.env.cache_failed(envelope, error.to_string());
                self.record_failure(key, &error, true);
                DeliveryOutcome::Retained { error }
            }
            Err(error) => {
                error!(
                    "Message {} from chain {} dropped on chain {}: {}",
                    key.nonce, key.src_chain_id, self.chain_id, error
                );
                self.record_failure(key, &error, false);
                DeliveryOutcome::Dropped { error }
            }
        }
    }

    fn record_failure(&mut self, key: MessageKey, error: &ProtocolError, retained: bool) {
        let event = ProtocolEvent::MessageFailed {
            chain_id: self.chain_id,
            key,
            reason: error.reason().to_string(),
            retained,
        };
        metrics::record_event(&event);
        metrics::record_message_failed(self.chain_id, error.reason(), retained);
        self.journal.push(event);
    }

    /// Replay a cached message unchanged. Anyone may call this.
    pub fn replay(&mut self, caller: Address, key: MessageKey) -> ProtocolResult<()> {
        self.transact(|ctx, dispatcher, orchestrator| {
            RetryCoordinator::new(dispatcher, orchestrator).replay(ctx, caller, key)
        })
    }

    /// Replay a cached callback after the request's account lowers its bound
    pub fn retry_callback(
        &mut self,
        caller: Address,
        key: MessageKey,
        new_bound: U256,
    ) -> ProtocolResult<()> {
        self.transact(|ctx, dispatcher, orchestrator| {
            RetryCoordinator::new(dispatcher, orchestrator).retry_callback(ctx, caller, key, new_bound)
        })
    }

    /// Replay a cached swap after the payload's account changes its minimum output
    pub fn retry_swap(
        &mut self,
        caller: Address,
        key: MessageKey,
        new_amount_out_min: U256,
    ) -> ProtocolResult<()> {
        self.transact(|ctx, dispatcher, orchestrator| {
            RetryCoordinator::new(dispatcher, orchestrator)
                .retry_swap(ctx, caller, key, new_amount_out_min)
        })
    }

    /// Apply a governance change
    pub fn govern(
        &mut self,
        f: impl FnOnce(&mut Governance) -> ProtocolResult<ConfigChange>,
    ) -> ProtocolResult<ConfigChange> {
        let mut governance = self.state.governance.clone();
        let change = f(&mut governance)?;
        self.state.governance = governance;

        let event = ProtocolEvent::ConfigChanged {
            chain_id: self.chain_id,
            change: change.clone(),
        };
        metrics::record_event(&event);
        self.journal.push(event);
        Ok(change)
    }

    fn fee_quoter(&self) -> FeeQuoter<'_, E> {
        FeeQuoter::new(&self.state.env, self.state.governance.config())
    }

    /// Fees for a cross-chain leverage swapping on `dst_chain_id`
    pub fn quote_leverage_fee(&self, dst_chain_id: ChainId) -> ProtocolResult<FeeQuote> {
        self.fee_quoter().quote_leverage_fee(dst_chain_id)
    }

    /// Fees for a cross-chain flash repay swapping on `dst_chain_id`
    pub fn quote_flash_repay_fee(&self, dst_chain_id: ChainId) -> ProtocolResult<FeeQuote> {
        self.fee_quoter().quote_flash_repay_fee(dst_chain_id)
    }

    /// Remove the envelopes sent since the last call
    pub fn take_outbox(&mut self) -> Vec<Envelope> {
        self.state.env.drain_outbox()
    }
}
