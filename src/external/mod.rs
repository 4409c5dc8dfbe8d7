//! Capabilities the orchestration core consumes but does not own
//!
//! - Token ledgers (balances, mint/burn/transfer, native currency)
//! - Swapper (exact-input swaps with a minimum output)
//! - Single-chain accounting engine (issue/repay/deposit/withdraw, health)
//! - Price oracle
//! - Message transport (guaranteed-delivery envelopes, dead-letter cache)
//!
//! A chain's collaborators are bundled into one [`Environment`] value so that a
//! unit of work can snapshot and roll back all of them together.

mod transport;

pub use transport::{CachedMessage, Envelope, MessageKey, OutboundMessage, TokenAmount, Transport};

use crate::error::ExternalError;
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Standard token balance ledger, plus the chain's native currency
pub trait TokenLedger {
    fn balance_of(&self, token: Address, holder: Address) -> U256;

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ExternalError>;

    fn mint(&mut self, token: Address, to: Address, amount: U256) -> Result<(), ExternalError>;

    fn burn(&mut self, token: Address, from: Address, amount: U256) -> Result<(), ExternalError>;

    fn native_balance_of(&self, holder: Address) -> U256;

    fn transfer_native(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ExternalError>;
}

/// Exact-input swap capability
pub trait Swapper {
    /// Swap `amount_in` of `token_in` held by `payer` into `token_out` for
    /// `recipient`. Fails if the output is below `amount_out_min`.
    fn swap_exact_input(
        &mut self,
        payer: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out_min: U256,
        recipient: Address,
    ) -> Result<U256, ExternalError>;
}

/// Price oracle
pub trait PriceOracle {
    /// Value of `amount_in` of `token_in` expressed in `token_out` units
    fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<U256, ExternalError>;
}

/// Snapshot of an account's debt position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtPosition {
    pub is_healthy: bool,
    pub deposit_in_usd: U256,
    pub debt_in_usd: U256,
    pub issuable_limit_in_usd: U256,
    pub issuable_in_usd: U256,
}

/// Single-chain lending/collateral engine
pub trait Accounting {
    /// Whether the pool has been shut down
    fn is_shutdown(&self) -> bool;

    /// Underlying token of a deposit market
    fn underlying_of(&self, deposit_token: Address) -> Result<Address, ExternalError>;

    /// Collateral factor of a deposit market (wad)
    fn collateral_factor_of(&self, deposit_token: Address) -> Result<U256, ExternalError>;

    /// Record `amount` of debt for `account` and mint the synthetic to `recipient`
    fn issue(
        &mut self,
        synthetic: Address,
        amount: U256,
        account: Address,
        recipient: Address,
    ) -> Result<U256, ExternalError>;

    /// Burn up to `amount` of synthetic from `payer` against `account`'s debt.
    /// Returns the amount repaid.
    fn repay(
        &mut self,
        synthetic: Address,
        payer: Address,
        account: Address,
        amount: U256,
    ) -> Result<U256, ExternalError>;

    /// Move `amount` of underlying from `payer` into the market on behalf of `account`
    fn deposit(
        &mut self,
        deposit_token: Address,
        payer: Address,
        amount: U256,
        account: Address,
    ) -> Result<U256, ExternalError>;

    /// Withdraw unlocked collateral of `account` as underlying to `recipient`
    fn withdraw(
        &mut self,
        deposit_token: Address,
        account: Address,
        amount: U256,
        recipient: Address,
    ) -> Result<U256, ExternalError>;

    fn debt_of(&self, account: Address, synthetic: Address) -> U256;

    fn deposit_of(&self, account: Address, deposit_token: Address) -> U256;

    /// Collateral that can leave without making the position unhealthy
    fn unlocked_balance_of(&self, account: Address, deposit_token: Address) -> U256;

    fn debt_position_of(&self, account: Address) -> Result<DebtPosition, ExternalError>;
}

/// All collaborators of one chain. `Clone` lets a unit of work run against a
/// snapshot and be discarded on failure.
pub trait Environment: TokenLedger + Swapper + PriceOracle + Accounting + Transport + Clone {}

impl<T> Environment for T where T: TokenLedger + Swapper + PriceOracle + Accounting + Transport + Clone {}
