//! Cross-chain dispatcher
//!
//! One dispatcher per chain acts both as the sender of swap requests and as
//! the receiver of messages from other chains:
//! 1. Outbound: wraps a registered request into a tagged payload and hands it
//!    to the transport together with the tokens and native fee
//! 2. Inbound: authenticates the transport and the remote dispatcher, then
//!    swaps and forwards (hub side) or completes the request (origin side)

pub mod payload;

pub use payload::{
    FlashRepayCallbackPayload, FlashRepaySwapPayload, LeverageCallbackPayload,
    LeverageSwapPayload, Payload,
};

use crate::chain::Ctx;
use crate::error::{ProtocolError, ProtocolResult};
use crate::events::ProtocolEvent;
use crate::external::{Envelope, Environment, OutboundMessage, TokenAmount};
use crate::orchestrator::RequestOrchestrator;
use crate::types::{short_id, ChainId, RequestId, RequestKind};

use alloy_primitives::{Address, U256};
use tracing::{debug, info};

/// Swap leg of a registered request, ready to be sent to the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapDispatch {
    pub request_id: RequestId,
    pub account: Address,
    pub dst_chain_id: ChainId,
    pub synthetic_token: Address,
    pub bridge_token: Address,
    /// Amount of the token being sent: synthetic for leverage, bridge token for flash repay
    pub amount: U256,
    /// Minimum output of the swap on the destination chain
    pub amount_out_min: U256,
    /// Native currency forwarded to pay for the return message
    pub callback_native_fee: U256,
    /// Native currency paying for this message, held by the dispatcher
    pub native_fee: U256,
    pub refund_address: Address,
}

/// Result of a hub-side swap on its way back to the origin chain
struct Forward {
    origin_chain_id: ChainId,
    payload: Payload,
    token: Address,
    amount: U256,
    native_fee: U256,
    refund_address: Address,
    gas_limit: u64,
}

/// Per-chain relay node between the orchestrator and the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossChainDispatcher {
    /// Address of this dispatcher
    address: Address,
    /// Orchestrator allowed to dispatch and to receive callbacks
    orchestrator: Address,
}

impl CrossChainDispatcher {
    pub fn new(address: Address, orchestrator: Address) -> Self {
        Self {
            address,
            orchestrator,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Send a leverage request's synthetic to the hub for swapping
    pub fn trigger_leverage_swap<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        swap: &SwapDispatch,
    ) -> ProtocolResult<u64> {
        self.trigger_swap(ctx, RequestKind::Leverage, swap)
    }

    /// Send a flash repay request's bridge token to the hub for swapping
    pub fn trigger_flash_repay_swap<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        swap: &SwapDispatch,
    ) -> ProtocolResult<u64> {
        self.trigger_swap(ctx, RequestKind::FlashRepay, swap)
    }

    fn trigger_swap<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        kind: RequestKind,
        swap: &SwapDispatch,
    ) -> ProtocolResult<u64> {
        ctx.config.ensure_bridging_active()?;
        let dst_dispatcher = ctx.config.destination(swap.dst_chain_id)?;
        let pool_id = ctx
            .config
            .pool_id_of(swap.bridge_token)
            .ok_or(ProtocolError::UnsupportedBridgeToken(swap.bridge_token))?;
        let gas_limits = *ctx.config.gas_limits();

        let (payload, token, gas_limit) = match kind {
            RequestKind::Leverage => (
                Payload::LeverageSwap(LeverageSwapPayload {
                    srcOrchestrator: self.orchestrator,
                    dstProxy: swap.synthetic_token,
                    requestId: swap.request_id,
                    poolId: pool_id,
                    account: swap.account,
                    amountOutMin: swap.amount_out_min,
                    callbackNativeFee: swap.callback_native_fee,
                }),
                swap.synthetic_token,
                gas_limits.leverage_swap,
            ),
            RequestKind::FlashRepay => (
                Payload::FlashRepaySwap(FlashRepaySwapPayload {
                    srcOrchestrator: self.orchestrator,
                    dstProxy: swap.synthetic_token,
                    requestId: swap.request_id,
                    account: swap.account,
                    amountOutMin: swap.amount_out_min,
                    callbackNativeFee: swap.callback_native_fee,
                }),
                swap.bridge_token,
                gas_limits.flash_repay_swap,
            ),
        };

        let name = payload.name();
        let nonce = ctx.env.send(OutboundMessage {
            sender: self.address,
            dst_chain_id: swap.dst_chain_id,
            dst_address: dst_dispatcher,
            token: Some(TokenAmount {
                token,
                amount: swap.amount,
            }),
            native_fee: swap.native_fee,
            native_drop: swap.callback_native_fee,
            gas_limit,
            refund_address: swap.refund_address,
            payload: payload.encode(),
        })?;

        info!(
            "Dispatched {} swap for request {} to chain {} (nonce {})",
            kind,
            short_id(&swap.request_id),
            swap.dst_chain_id,
            nonce
        );

        let chain_id = ctx.chain_id;
        ctx.emit(ProtocolEvent::MessageSent {
            chain_id,
            dst_chain_id: swap.dst_chain_id,
            nonce,
            payload: name.to_string(),
        });

        Ok(nonce)
    }

    /// Inbound handler invoked by the transport
    pub fn receive<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        orchestrator: &RequestOrchestrator,
        caller: Address,
        envelope: &Envelope,
    ) -> ProtocolResult<()> {
        if caller != ctx.env.transport_address() {
            return Err(ProtocolError::InvalidMsgSender);
        }
        ctx.config
            .verify_source(envelope.src_chain_id, envelope.src_address)?;
        ctx.config.ensure_bridging_active()?;

        let payload = Payload::decode(&envelope.payload)?;
        let delivered = envelope.token.ok_or_else(|| {
            ProtocolError::InvalidPayload(format!("{} message carries no tokens", payload.name()))
        })?;

        debug!(
            "Handling {} from chain {} (nonce {}) on chain {}",
            payload.name(),
            envelope.src_chain_id,
            envelope.nonce,
            ctx.chain_id
        );

        let gas_limits = *ctx.config.gas_limits();
        match &payload {
            Payload::LeverageSwap(p) => {
                ensure_token(delivered.token, p.dstProxy)?;
                let bridge_token = ctx.config.bridge_pool_token(p.poolId)?;
                let amount_out = self.swap(
                    ctx,
                    p.requestId,
                    delivered.token,
                    bridge_token,
                    delivered.amount,
                    p.amountOutMin,
                )?;

                self.forward(
                    ctx,
                    orchestrator,
                    Forward {
                        origin_chain_id: envelope.src_chain_id,
                        payload: Payload::LeverageCallback(LeverageCallbackPayload {
                            orchestrator: p.srcOrchestrator,
                            requestId: p.requestId,
                        }),
                        token: bridge_token,
                        amount: amount_out,
                        native_fee: p.callbackNativeFee,
                        refund_address: p.account,
                        gas_limit: gas_limits.leverage_callback,
                    },
                )?;
            }

            Payload::FlashRepaySwap(p) => {
                let synthetic = p.dstProxy;
                let amount_out = self.swap(
                    ctx,
                    p.requestId,
                    delivered.token,
                    synthetic,
                    delivered.amount,
                    p.amountOutMin,
                )?;

                self.forward(
                    ctx,
                    orchestrator,
                    Forward {
                        origin_chain_id: envelope.src_chain_id,
                        payload: Payload::FlashRepayCallback(FlashRepayCallbackPayload {
                            proxy: synthetic,
                            orchestrator: p.srcOrchestrator,
                            requestId: p.requestId,
                        }),
                        token: synthetic,
                        amount: amount_out,
                        native_fee: p.callbackNativeFee,
                        refund_address: p.account,
                        gas_limit: gas_limits.flash_repay_callback,
                    },
                )?;
            }

            Payload::LeverageCallback(p) => {
                self.ensure_local_orchestrator(p.orchestrator)?;
                orchestrator.cross_chain_leverage_callback(
                    ctx,
                    self.address,
                    p.requestId,
                    delivered.token,
                    delivered.amount,
                )?;
            }

            Payload::FlashRepayCallback(p) => {
                self.ensure_local_orchestrator(p.orchestrator)?;
                ensure_token(delivered.token, p.proxy)?;
                orchestrator.cross_chain_flash_repay_callback(
                    ctx,
                    self.address,
                    p.requestId,
                    delivered.token,
                    delivered.amount,
                )?;
            }
        }

        let chain_id = ctx.chain_id;
        ctx.emit(ProtocolEvent::MessageDelivered {
            chain_id,
            key: envelope.key(),
            payload: payload.name().to_string(),
        });

        Ok(())
    }

    /// Exact-input swap with the dispatcher as payer and recipient
    fn swap<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        request_id: RequestId,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out_min: U256,
    ) -> ProtocolResult<U256> {
        let amount_out = ctx.env.swap_exact_input(
            self.address,
            token_in,
            token_out,
            amount_in,
            amount_out_min,
            self.address,
        )?;

        debug!(
            "Swapped {} -> {} for request {} on chain {}",
            amount_in,
            amount_out,
            short_id(&request_id),
            ctx.chain_id
        );

        let chain_id = ctx.chain_id;
        ctx.emit(ProtocolEvent::SwapExecuted {
            chain_id,
            request_id,
            amount_in,
            amount_out,
        });

        Ok(amount_out)
    }

    /// Send a swap result back to the origin chain, or complete the request
    /// directly when this chain is the origin.
    fn forward<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        orchestrator: &RequestOrchestrator,
        forward: Forward,
    ) -> ProtocolResult<()> {
        if forward.origin_chain_id == ctx.chain_id {
            let request_id = forward.payload.request_id();
            match forward.payload {
                Payload::LeverageCallback(_) => {
                    orchestrator.cross_chain_leverage_callback(
                        ctx,
                        self.address,
                        request_id,
                        forward.token,
                        forward.amount,
                    )?;
                }
                Payload::FlashRepayCallback(_) => {
                    orchestrator.cross_chain_flash_repay_callback(
                        ctx,
                        self.address,
                        request_id,
                        forward.token,
                        forward.amount,
                    )?;
                }
                Payload::LeverageSwap(_) | Payload::FlashRepaySwap(_) => {
                    return Err(ProtocolError::InvalidPayload(
                        "swap payload cannot complete a request".to_string(),
                    ))
                }
            }
            return Ok(());
        }

        let dst_dispatcher = ctx.config.destination(forward.origin_chain_id)?;
        let name = forward.payload.name();
        let request_id = forward.payload.request_id();

        let nonce = ctx.env.send(OutboundMessage {
            sender: self.address,
            dst_chain_id: forward.origin_chain_id,
            dst_address: dst_dispatcher,
            token: Some(TokenAmount {
                token: forward.token,
                amount: forward.amount,
            }),
            native_fee: forward.native_fee,
            native_drop: U256::ZERO,
            gas_limit: forward.gas_limit,
            refund_address: forward.refund_address,
            payload: forward.payload.encode(),
        })?;

        info!(
            "Forwarded {} for request {} back to chain {} (nonce {})",
            name,
            short_id(&request_id),
            forward.origin_chain_id,
            nonce
        );

        let chain_id = ctx.chain_id;
        ctx.emit(ProtocolEvent::MessageSent {
            chain_id,
            dst_chain_id: forward.origin_chain_id,
            nonce,
            payload: name.to_string(),
        });

        Ok(())
    }

    fn ensure_local_orchestrator(&self, orchestrator: Address) -> ProtocolResult<()> {
        if orchestrator != self.orchestrator {
            return Err(ProtocolError::InvalidPayload(format!(
                "callback addressed to unknown orchestrator {}",
                orchestrator
            )));
        }
        Ok(())
    }
}

fn ensure_token(delivered: Address, expected: Address) -> ProtocolResult<()> {
    if delivered != expected {
        return Err(ProtocolError::InvalidPayload(format!(
            "delivered token {} does not match {}",
            delivered, expected
        )));
    }
    Ok(())
}
