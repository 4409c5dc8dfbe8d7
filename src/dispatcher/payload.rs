//! Cross-chain payload codec
//!
//! Wire format: one tag byte followed by the ABI encoding of the tagged
//! struct. Swap payloads travel origin → hub, callback payloads hub → origin.

use crate::error::{ProtocolError, ProtocolResult};

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolValue};

sol! {
    /// Origin → hub: swap synthetic into the bridge token, send it back
    #[derive(Debug, PartialEq, Eq)]
    struct LeverageSwapPayload {
        address srcOrchestrator;
        address dstProxy;
        bytes32 requestId;
        uint256 poolId;
        address account;
        uint256 amountOutMin;
        uint256 callbackNativeFee;
    }

    /// Origin → hub: swap the bridge token into synthetic, send it back
    #[derive(Debug, PartialEq, Eq)]
    struct FlashRepaySwapPayload {
        address srcOrchestrator;
        address dstProxy;
        bytes32 requestId;
        address account;
        uint256 amountOutMin;
        uint256 callbackNativeFee;
    }

    /// Hub → origin: bridge token for a leverage request
    #[derive(Debug, PartialEq, Eq)]
    struct LeverageCallbackPayload {
        address orchestrator;
        bytes32 requestId;
    }

    /// Hub → origin: synthetic for a flash repay request
    #[derive(Debug, PartialEq, Eq)]
    struct FlashRepayCallbackPayload {
        address proxy;
        address orchestrator;
        bytes32 requestId;
    }
}

/// Leading tag byte of each payload kind
pub mod tags {
    pub const LEVERAGE_SWAP: u8 = 1;
    pub const FLASH_REPAY_SWAP: u8 = 2;
    pub const LEVERAGE_CALLBACK: u8 = 3;
    pub const FLASH_REPAY_CALLBACK: u8 = 4;
}

/// Every message the dispatchers exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    LeverageSwap(LeverageSwapPayload),
    FlashRepaySwap(FlashRepaySwapPayload),
    LeverageCallback(LeverageCallbackPayload),
    FlashRepayCallback(FlashRepayCallbackPayload),
}

impl Payload {
    pub fn tag(&self) -> u8 {
        match self {
            Payload::LeverageSwap(_) => tags::LEVERAGE_SWAP,
            Payload::FlashRepaySwap(_) => tags::FLASH_REPAY_SWAP,
            Payload::LeverageCallback(_) => tags::LEVERAGE_CALLBACK,
            Payload::FlashRepayCallback(_) => tags::FLASH_REPAY_CALLBACK,
        }
    }

    /// Request id carried by any payload kind
    pub fn request_id(&self) -> B256 {
        match self {
            Payload::LeverageSwap(p) => p.requestId,
            Payload::FlashRepaySwap(p) => p.requestId,
            Payload::LeverageCallback(p) => p.requestId,
            Payload::FlashRepayCallback(p) => p.requestId,
        }
    }

    /// Requesting account, only known to swap payloads
    pub fn account(&self) -> Option<Address> {
        match self {
            Payload::LeverageSwap(p) => Some(p.account),
            Payload::FlashRepaySwap(p) => Some(p.account),
            Payload::LeverageCallback(_) | Payload::FlashRepayCallback(_) => None,
        }
    }

    /// Copy of a swap payload with a new minimum swap output
    pub fn with_amount_out_min(&self, amount_out_min: U256) -> ProtocolResult<Payload> {
        match self {
            Payload::LeverageSwap(p) => Ok(Payload::LeverageSwap(LeverageSwapPayload {
                amountOutMin: amount_out_min,
                ..p.clone()
            })),
            Payload::FlashRepaySwap(p) => Ok(Payload::FlashRepaySwap(FlashRepaySwapPayload {
                amountOutMin: amount_out_min,
                ..p.clone()
            })),
            Payload::LeverageCallback(_) | Payload::FlashRepayCallback(_) => Err(
                ProtocolError::InvalidPayload("callback payload has no swap bound".to_string()),
            ),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Payload::LeverageSwap(_) => "leverage_swap",
            Payload::FlashRepaySwap(_) => "flash_repay_swap",
            Payload::LeverageCallback(_) => "leverage_callback",
            Payload::FlashRepayCallback(_) => "flash_repay_callback",
        }
    }

    pub fn encode(&self) -> Bytes {
        let body = match self {
            Payload::LeverageSwap(p) => p.abi_encode(),
            Payload::FlashRepaySwap(p) => p.abi_encode(),
            Payload::LeverageCallback(p) => p.abi_encode(),
            Payload::FlashRepayCallback(p) => p.abi_encode(),
        };

        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(self.tag());
        out.extend_from_slice(&body);
        Bytes::from(out)
    }

    pub fn decode(data: &[u8]) -> ProtocolResult<Payload> {
        let (tag, body) = data
            .split_first()
            .ok_or_else(|| ProtocolError::InvalidPayload("empty payload".to_string()))?;

        let payload = match *tag {
            tags::LEVERAGE_SWAP => {
                Payload::LeverageSwap(LeverageSwapPayload::abi_decode(body, true).map_err(invalid)?)
            }
            tags::FLASH_REPAY_SWAP => Payload::FlashRepaySwap(
                FlashRepaySwapPayload::abi_decode(body, true).map_err(invalid)?,
            ),
            tags::LEVERAGE_CALLBACK => Payload::LeverageCallback(
                LeverageCallbackPayload::abi_decode(body, true).map_err(invalid)?,
            ),
            tags::FLASH_REPAY_CALLBACK => Payload::FlashRepayCallback(
                FlashRepayCallbackPayload::abi_decode(body, true).map_err(invalid)?,
            ),
            other => {
                return Err(ProtocolError::InvalidPayload(format!(
                    "unknown payload tag {}",
                    other
                )))
            }
        };

        Ok(payload)
    }
}

fn invalid(e: alloy_sol_types::Error) -> ProtocolError {
    ProtocolError::InvalidPayload(e.to_string())
}
