//! Request orchestrator
//!
//! User-facing entry point of a chain. Leverage and flash repay either settle
//! locally in one call, or register a cross-chain request and hand its swap
//! leg to the dispatcher; the matching callback completes the request when the
//! swap result comes back.

mod flash_repay;
mod leverage;

use crate::chain::Ctx;
use crate::error::{ProtocolError, ProtocolResult};
use crate::external::Environment;
use crate::types::{ChainId, RequestId};

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Parameters of a leverage call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverageParams {
    /// Token the user pays with
    pub token_in: Address,
    /// Deposit market receiving the leveraged collateral
    pub deposit_token: Address,
    /// Synthetic issued as debt
    pub synthetic_token: Address,
    pub amount_in: U256,
    /// Target leverage in wad, strictly above 1.0
    pub leverage: U256,
    /// Minimum output of the synthetic -> underlying swap
    pub swap_amount_out_min: U256,
    /// Minimum collateral deposited in the end
    pub deposit_amount_min: U256,
}

/// Parameters of a flash repay call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashRepayParams {
    pub synthetic_token: Address,
    pub deposit_token: Address,
    /// Collateral withdrawn and swapped into synthetic
    pub withdraw_amount: U256,
    /// Minimum output of the underlying -> synthetic swap
    pub swap_amount_out_min: U256,
    /// Minimum synthetic that must come back for repayment
    pub repay_amount_min: U256,
}

/// Routing and fees of the cross-chain variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainArgs {
    /// Chain that performs the swap
    pub dst_chain_id: ChainId,
    /// Native currency paying for the outbound message
    pub native_fee: U256,
    /// Native currency forwarded to pay for the return message
    pub callback_native_fee: U256,
    /// Receives fee overpayment
    pub refund_address: Address,
}

/// Result of a user-facing call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Completed in the same call. `amount` is the collateral deposited for
    /// leverage and the debt repaid for flash repay.
    Settled { amount: U256 },
    /// Swap leg sent; the callback finishes the request
    Dispatched { request_id: RequestId, nonce: u64 },
}

impl RequestOutcome {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            RequestOutcome::Settled { .. } => None,
            RequestOutcome::Dispatched { request_id, .. } => Some(*request_id),
        }
    }
}

/// Per-chain orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOrchestrator {
    /// Address of this orchestrator, custodian of in-flight user funds
    address: Address,
    /// Dispatcher allowed to invoke the callbacks
    dispatcher: Address,
}

impl RequestOrchestrator {
    pub fn new(address: Address, dispatcher: Address) -> Self {
        Self {
            address,
            dispatcher,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    fn only_dispatcher(&self, caller: Address) -> ProtocolResult<()> {
        if caller != self.dispatcher {
            return Err(ProtocolError::SenderIsNotCrossChainDispatcher);
        }
        Ok(())
    }

    fn ensure_not_shutdown<E: Environment>(&self, ctx: &Ctx<'_, E>) -> ProtocolResult<()> {
        if ctx.env.is_shutdown() {
            return Err(ProtocolError::IsShutdown);
        }
        Ok(())
    }

    fn ensure_healthy<E: Environment>(
        &self,
        ctx: &Ctx<'_, E>,
        account: Address,
    ) -> ProtocolResult<()> {
        let position = ctx.env.debt_position_of(account)?;
        if !position.is_healthy {
            warn!(
                "Position of {} would be unhealthy on chain {}: debt {} USD, limit {} USD",
                account, ctx.chain_id, position.debt_in_usd, position.issuable_limit_in_usd
            );
            return Err(ProtocolError::PositionIsNotHealthy);
        }
        Ok(())
    }

    /// Move the caller's native fee into the dispatcher, which pays the transport
    fn fund_dispatcher<E: Environment>(
        &self,
        ctx: &mut Ctx<'_, E>,
        caller: Address,
        native_fee: U256,
    ) -> ProtocolResult<()> {
        if !native_fee.is_zero() {
            ctx.env.transfer_native(caller, self.dispatcher, native_fee)?;
        }
        Ok(())
    }
}
