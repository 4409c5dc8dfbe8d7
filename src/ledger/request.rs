//! In-flight cross-chain request records

use crate::types::{ChainId, RequestId, RequestKind};

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind-specific terms of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestTerms {
    Leverage {
        /// Bridge token collected from the user, held until the callback
        amount_in: U256,
        /// Debt issued provisionally, pending the swap outcome
        pending_amount: U256,
    },
    FlashRepay {
        /// Collateral withdrawn and sent for swapping
        withdrawn_amount: U256,
    },
}

/// Parameters of a request about to be registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRequest {
    pub account: Address,
    pub dst_chain_id: ChainId,
    pub synthetic_token: Address,
    pub deposit_token: Address,
    pub bridge_token: Address,
    pub bound_amount: U256,
    pub terms: RequestTerms,
}

/// A registered cross-chain request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossChainRequest {
    pub id: RequestId,
    pub account: Address,
    pub dst_chain_id: ChainId,
    pub synthetic_token: Address,
    pub deposit_token: Address,
    pub bridge_token: Address,
    /// `deposit_amount_min` for leverage, `repay_amount_min` for flash repay.
    /// Only the retry path changes it.
    pub bound_amount: U256,
    pub terms: RequestTerms,
    pub finished: bool,
    pub created_at: DateTime<Utc>,
}

impl CrossChainRequest {
    pub fn kind(&self) -> RequestKind {
        match self.terms {
            RequestTerms::Leverage { .. } => RequestKind::Leverage,
            RequestTerms::FlashRepay { .. } => RequestKind::FlashRepay,
        }
    }

    /// Debt issued provisionally, zero for flash repays
    pub fn pending_amount(&self) -> U256 {
        match self.terms {
            RequestTerms::Leverage { pending_amount, .. } => pending_amount,
            RequestTerms::FlashRepay { .. } => U256::ZERO,
        }
    }

    /// Minimum amount the swap leg must return for the callback to succeed
    pub fn required_swap_out(&self) -> U256 {
        match self.terms {
            RequestTerms::Leverage { amount_in, .. } => self.bound_amount.saturating_sub(amount_in),
            RequestTerms::FlashRepay { .. } => self.bound_amount,
        }
    }
}
