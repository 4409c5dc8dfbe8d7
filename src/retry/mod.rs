//! Dead-letter retries
//!
//! Handles:
//! - Unchanged replays of cached messages, open to anyone
//! - Callback retries on the origin chain, where the request's account may
//!   change the bound before replaying
//! - Swap retries on the hub chain, where the payload's account may change
//!   the minimum swap output before replaying
//!
//! Every retry runs in the same unit of work as the replay it triggers, so a
//! failed replay restores both the bound and the cache entry.

use crate::chain::Ctx;
use crate::dispatcher::{CrossChainDispatcher, Payload};
use crate::error::{ProtocolError, ProtocolResult};
use crate::events::ProtocolEvent;
use crate::external::{CachedMessage, Environment, MessageKey};
use crate::orchestrator::RequestOrchestrator;
use crate::types::short_id;

use alloy_primitives::{Address, U256};
use tracing::info;

/// Replays messages parked in the transport's dead-letter cache
pub struct RetryCoordinator<'a> {
    dispatcher: &'a CrossChainDispatcher,
    orchestrator: &'a RequestOrchestrator,
}

impl<'a> RetryCoordinator<'a> {
    pub fn new(dispatcher: &'a CrossChainDispatcher, orchestrator: &'a RequestOrchestrator) -> Self {
        Self {
            dispatcher,
            orchestrator,
        }
    }

    /// Replay a cached message as it was received
    pub fn replay<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        caller: Address,
        key: MessageKey,
    ) -> ProtocolResult<()> {
        let cached = take_cached(ctx, &key)?;
        info!(
            "Replaying message {} from chain {} on chain {} for {}",
            key.nonce, key.src_chain_id, ctx.chain_id, caller
        );
        self.redeliver(ctx, cached)
    }

    /// Lower (or raise) the bound of the request behind a cached callback and
    /// replay it. Only the request's account may do this.
    pub fn retry_callback<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        caller: Address,
        key: MessageKey,
        new_bound: U256,
    ) -> ProtocolResult<()> {
        let cached = take_cached(ctx, &key)?;
        let payload = Payload::decode(&cached.envelope.payload)?;
        if !matches!(
            payload,
            Payload::LeverageCallback(_) | Payload::FlashRepayCallback(_)
        ) {
            return Err(ProtocolError::InvalidPayload(format!(
                "{} is not a callback",
                payload.name()
            )));
        }

        let request_id = payload.request_id();
        let request = ctx.ledger.get(&request_id)?;
        if request.account != caller {
            return Err(ProtocolError::InvalidMsgSender);
        }

        let previous = ctx.ledger.update_bound(&request_id, new_bound)?;
        info!(
            "Bound of request {} changed from {} to {} on chain {}",
            short_id(&request_id),
            previous,
            new_bound,
            ctx.chain_id
        );

        let chain_id = ctx.chain_id;
        ctx.emit(ProtocolEvent::BoundUpdated {
            chain_id,
            request_id,
            previous,
            bound: new_bound,
        });

        self.redeliver(ctx, cached)
    }

    /// Replace the minimum output of a cached swap and replay it. Only the
    /// account named in the payload may do this.
    pub fn retry_swap<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        caller: Address,
        key: MessageKey,
        new_amount_out_min: U256,
    ) -> ProtocolResult<()> {
        let mut cached = take_cached(ctx, &key)?;
        let payload = Payload::decode(&cached.envelope.payload)?;
        let account = payload.account().ok_or_else(|| {
            ProtocolError::InvalidPayload(format!("{} is not a swap", payload.name()))
        })?;
        if account != caller {
            return Err(ProtocolError::InvalidMsgSender);
        }

        let updated = payload.with_amount_out_min(new_amount_out_min)?;
        info!(
            "Minimum output of request {} set to {} on chain {}",
            short_id(&updated.request_id()),
            new_amount_out_min,
            ctx.chain_id
        );

        cached.envelope.payload = updated.encode();
        self.redeliver(ctx, cached)
    }

    /// Run the inbound handler again with the transport as caller
    fn redeliver<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        cached: CachedMessage,
    ) -> ProtocolResult<()> {
        let transport = ctx.env.transport_address();
        self.dispatcher
            .receive(ctx, self.orchestrator, transport, &cached.envelope)?;

        let chain_id = ctx.chain_id;
        ctx.emit(ProtocolEvent::MessageRetried {
            chain_id,
            key: cached.envelope.key(),
        });
        Ok(())
    }
}

fn take_cached<E: Environment>(
    ctx: &mut Ctx<'_, E>,
    key: &MessageKey,
) -> ProtocolResult<CachedMessage> {
    ctx.env
        .take_cached(key)
        .ok_or(ProtocolError::MessageNotCached {
            src_chain_id: key.src_chain_id,
            nonce: key.nonce,
        })
}
