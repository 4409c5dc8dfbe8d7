//! Native fee quoting for cross-chain requests

use crate::dispatcher::{
    FlashRepayCallbackPayload, FlashRepaySwapPayload, LeverageCallbackPayload,
    LeverageSwapPayload, Payload,
};
use crate::error::ProtocolResult;
use crate::external::Environment;
use crate::governance::BridgeConfig;
use crate::types::{ChainId, RequestKind};

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fees a user attaches to a cross-chain request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    /// Total native fee for the outbound message, return fee included
    pub native_fee: U256,
    /// Part of `native_fee` forwarded to pay for the return message
    pub callback_native_fee: U256,
}

/// Read-only fee estimator over a chain's transport and configuration
pub struct FeeQuoter<'a, E> {
    env: &'a E,
    config: &'a BridgeConfig,
}

impl<'a, E: Environment> FeeQuoter<'a, E> {
    /// Create a new fee quoter
    pub fn new(env: &'a E, config: &'a BridgeConfig) -> Self {
        Self { env, config }
    }

    pub fn quote_leverage_fee(&self, dst_chain_id: ChainId) -> ProtocolResult<FeeQuote> {
        self.quote(RequestKind::Leverage, dst_chain_id)
    }

    pub fn quote_flash_repay_fee(&self, dst_chain_id: ChainId) -> ProtocolResult<FeeQuote> {
        self.quote(RequestKind::FlashRepay, dst_chain_id)
    }

    /// Fee of the message bringing a swap result back to this chain. The
    /// return leg is paid later, so it carries the configured buffer.
    pub fn quote_callback_fee(&self, kind: RequestKind) -> ProtocolResult<U256> {
        let gas_limits = self.config.gas_limits();
        let (payload, gas_limit) = match kind {
            RequestKind::Leverage => (
                Payload::LeverageCallback(LeverageCallbackPayload {
                    orchestrator: Address::ZERO,
                    requestId: B256::ZERO,
                }),
                gas_limits.leverage_callback,
            ),
            RequestKind::FlashRepay => (
                Payload::FlashRepayCallback(FlashRepayCallbackPayload {
                    proxy: Address::ZERO,
                    orchestrator: Address::ZERO,
                    requestId: B256::ZERO,
                }),
                gas_limits.flash_repay_callback,
            ),
        };

        let fee = self.env.estimate_fee(
            self.env.local_chain_id(),
            payload.encode().len(),
            gas_limit,
            U256::ZERO,
        )?;
        let buffer =
            fee * U256::from(self.config.callback_fee_buffer_percent()) / U256::from(100);
        Ok(fee + buffer)
    }

    fn quote(&self, kind: RequestKind, dst_chain_id: ChainId) -> ProtocolResult<FeeQuote> {
        self.config.destination(dst_chain_id)?;

        let callback_native_fee = self.quote_callback_fee(kind)?;
        let gas_limits = self.config.gas_limits();
        let (payload, gas_limit) = match kind {
            RequestKind::Leverage => (
                Payload::LeverageSwap(LeverageSwapPayload {
                    srcOrchestrator: Address::ZERO,
                    dstProxy: Address::ZERO,
                    requestId: B256::ZERO,
                    poolId: U256::ZERO,
                    account: Address::ZERO,
                    amountOutMin: U256::ZERO,
                    callbackNativeFee: U256::ZERO,
                }),
                gas_limits.leverage_swap,
            ),
            RequestKind::FlashRepay => (
                Payload::FlashRepaySwap(FlashRepaySwapPayload {
                    srcOrchestrator: Address::ZERO,
                    dstProxy: Address::ZERO,
                    requestId: B256::ZERO,
                    account: Address::ZERO,
                    amountOutMin: U256::ZERO,
                    callbackNativeFee: U256::ZERO,
                }),
                gas_limits.flash_repay_swap,
            ),
        };

        let native_fee = self.env.estimate_fee(
            dst_chain_id,
            payload.encode().len(),
            gas_limit,
            callback_native_fee,
        )?;

        debug!(
            "Quoted {} fee to chain {}: {} (callback {})",
            kind, dst_chain_id, native_fee, callback_native_fee
        );

        Ok(FeeQuote {
            native_fee,
            callback_native_fee,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::Governance;
    use crate::sim::{FeeSchedule, MemoryEnv};
    use std::collections::HashMap;

    const GOVERNOR: Address = Address::repeat_byte(0x60);

    fn env() -> MemoryEnv {
        let fees = FeeSchedule {
            base_fee: U256::from(100),
            fee_per_byte: U256::ZERO,
            fee_per_gas: HashMap::from([(1, U256::ZERO), (2, U256::ZERO)]),
        };
        MemoryEnv::new(1, Address::repeat_byte(0xee), Address::repeat_byte(0xcc), fees)
    }

    #[test]
    fn test_callback_fee_uses_configured_buffer() {
        let env = env();
        let mut governance = Governance::new(GOVERNOR);

        let fee = FeeQuoter::new(&env, governance.config())
            .quote_callback_fee(RequestKind::Leverage)
            .unwrap();
        assert_eq!(fee, U256::from(110));

        governance
            .set_callback_fee_buffer_percent(GOVERNOR, 25)
            .unwrap();
        let fee = FeeQuoter::new(&env, governance.config())
            .quote_callback_fee(RequestKind::Leverage)
            .unwrap();
        assert_eq!(fee, U256::from(125));
    }

    #[test]
    fn test_quote_includes_callback_fee_as_drop() {
        let env = env();
        let mut governance = Governance::new(GOVERNOR);
        governance
            .set_trusted_route(GOVERNOR, 2, Address::repeat_byte(0x22))
            .unwrap();

        let quote = FeeQuoter::new(&env, governance.config())
            .quote_flash_repay_fee(2)
            .unwrap();
        assert_eq!(quote.callback_native_fee, U256::from(110));
        assert_eq!(quote.native_fee, U256::from(210));

        assert_eq!(
            FeeQuoter::new(&env, governance.config())
                .quote_leverage_fee(3)
                .unwrap_err(),
            crate::error::ProtocolError::DestinationChainNotAllowed { chain_id: 3 }
        );
    }
}
