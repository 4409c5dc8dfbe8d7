//! Shared identifiers and fixed-point helpers

use alloy_primitives::{keccak256, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain identifier as used by the transport
pub type ChainId = u64;

/// Cross-chain request identifier
pub type RequestId = B256;

/// 1.0 in 18-decimal fixed point
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// `a * b / WAD`, rounded down
pub fn wad_mul(a: U256, b: U256) -> U256 {
    a * b / WAD
}

/// `a * WAD / b`, rounded down
pub fn wad_div(a: U256, b: U256) -> U256 {
    a * WAD / b
}

/// Converts a decimal ratio such as `1.5` into wad. Only meant for
/// configuration values; precision is limited to nine decimals.
pub fn wad_from_f64(value: f64) -> U256 {
    let nano = (value * 1e9).round() as u128;
    U256::from(nano) * U256::from(1_000_000_000u64)
}

/// Derive the id of the `counter`-th request created on `chain_id`.
pub fn derive_request_id(chain_id: ChainId, counter: u64) -> RequestId {
    let mut preimage = [0u8; 16];
    preimage[..8].copy_from_slice(&chain_id.to_be_bytes());
    preimage[8..].copy_from_slice(&counter.to_be_bytes());
    keccak256(preimage)
}

/// Short hex form of a request id for logs
pub fn short_id(id: &RequestId) -> String {
    hex::encode(&id.as_slice()[..6])
}

/// Kind of cross-chain request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Leverage,
    FlashRepay,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Leverage => write!(f, "leverage"),
            RequestKind::FlashRepay => write!(f, "flash_repay"),
        }
    }
}
