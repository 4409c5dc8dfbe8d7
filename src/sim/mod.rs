//! In-memory collaborators of one chain
//!
//! [`MemoryEnv`] implements every external capability the orchestration core
//! consumes: token balances, a fixed-rate swapper, a USD price oracle, a
//! collateral pool and a transport endpoint. It backs the devnet binary and
//! the tests.

mod endpoint;
mod pool;

pub use endpoint::{Endpoint, FeeSchedule};
pub use pool::{Market, Pool};

use crate::error::ExternalError;
use crate::external::{
    Accounting, CachedMessage, DebtPosition, Envelope, MessageKey, OutboundMessage, PriceOracle,
    Swapper, TokenLedger, Transport,
};
use crate::types::{wad_div, wad_mul, ChainId};

use alloy_primitives::{Address, U256};
use std::collections::HashMap;
use tracing::debug;

/// All collaborators of one simulated chain
#[derive(Debug, Clone)]
pub struct MemoryEnv {
    /// (token, holder) -> balance
    balances: HashMap<(Address, Address), U256>,
    native: HashMap<Address, U256>,
    /// (token in, token out) -> output per unit of input (wad)
    rates: HashMap<(Address, Address), U256>,
    /// Token -> USD price (wad)
    prices: HashMap<Address, U256>,
    pool: Pool,
    endpoint: Endpoint,
}

impl MemoryEnv {
    /// Create a new environment
    pub fn new(chain_id: ChainId, transport: Address, custody: Address, fees: FeeSchedule) -> Self {
        Self {
            balances: HashMap::new(),
            native: HashMap::new(),
            rates: HashMap::new(),
            prices: HashMap::new(),
            pool: Pool::new(custody),
            endpoint: Endpoint::new(chain_id, transport, fees),
        }
    }

    pub fn set_rate(&mut self, token_in: Address, token_out: Address, rate: U256) {
        self.rates.insert((token_in, token_out), rate);
    }

    pub fn set_price(&mut self, token: Address, price: U256) {
        self.prices.insert(token, price);
    }

    pub fn add_market(&mut self, deposit_token: Address, underlying: Address, collateral_factor: U256) {
        self.pool.add_market(
            deposit_token,
            Market {
                underlying,
                collateral_factor,
            },
        );
    }

    pub fn add_synthetic(&mut self, synthetic: Address) {
        self.pool.add_synthetic(synthetic);
    }

    pub fn set_shutdown(&mut self, shutdown: bool) {
        self.pool.shutdown = shutdown;
    }

    pub fn credit_native(&mut self, holder: Address, amount: U256) {
        *self.native.entry(holder).or_default() += amount;
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Keys of all messages waiting in the dead-letter cache
    pub fn cached_keys(&self) -> Vec<MessageKey> {
        self.endpoint.cached_keys()
    }

    fn price(&self, token: Address) -> Result<U256, ExternalError> {
        self.prices
            .get(&token)
            .copied()
            .ok_or(ExternalError::MissingPrice(token))
    }

    fn debit(&mut self, token: Address, holder: Address, amount: U256) -> Result<(), ExternalError> {
        let balance = self.balances.entry((token, holder)).or_default();
        if *balance < amount {
            return Err(ExternalError::InsufficientBalance {
                token,
                holder,
                have: *balance,
                need: amount,
            });
        }
        *balance -= amount;
        Ok(())
    }

    fn credit(&mut self, token: Address, holder: Address, amount: U256) {
        *self.balances.entry((token, holder)).or_default() += amount;
    }
}

impl TokenLedger for MemoryEnv {
    fn balance_of(&self, token: Address, holder: Address) -> U256 {
        self.balances
            .get(&(token, holder))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(
        &mut self,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ExternalError> {
        self.debit(token, from, amount)?;
        self.credit(token, to, amount);
        Ok(())
    }

    fn mint(&mut self, token: Address, to: Address, amount: U256) -> Result<(), ExternalError> {
        self.credit(token, to, amount);
        Ok(())
    }

    fn burn(&mut self, token: Address, from: Address, amount: U256) -> Result<(), ExternalError> {
        self.debit(token, from, amount)
    }

    fn native_balance_of(&self, holder: Address) -> U256 {
        self.native.get(&holder).copied().unwrap_or_default()
    }

    fn transfer_native(
        &mut self,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<(), ExternalError> {
        let balance = self.native.entry(from).or_default();
        if *balance < amount {
            return Err(ExternalError::InsufficientNativeBalance {
                holder: from,
                have: *balance,
                need: amount,
            });
        }
        *balance -= amount;
        self.credit_native(to, amount);
        Ok(())
    }
}

impl Swapper for MemoryEnv {
    fn swap_exact_input(
        &mut self,
        payer: Address,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
        amount_out_min: U256,
        recipient: Address,
    ) -> Result<U256, ExternalError> {
        let rate = self
            .rates
            .get(&(token_in, token_out))
            .copied()
            .ok_or(ExternalError::UnsupportedPair {
                token_in,
                token_out,
            })?;

        let amount_out = wad_mul(amount_in, rate);
        if amount_out < amount_out_min {
            return Err(ExternalError::SlippageTooHigh {
                amount_out,
                amount_out_min,
            });
        }

        self.burn(token_in, payer, amount_in)?;
        self.mint(token_out, recipient, amount_out)?;
        Ok(amount_out)
    }
}

impl PriceOracle for MemoryEnv {
    fn quote(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<U256, ExternalError> {
        let price_in = self.price(token_in)?;
        let price_out = self.price(token_out)?;
        if price_out.is_zero() {
            return Err(ExternalError::MissingPrice(token_out));
        }
        Ok(wad_div(wad_mul(amount_in, price_in), price_out))
    }
}

impl Accounting for MemoryEnv {
    fn is_shutdown(&self) -> bool {
        self.pool.shutdown
    }

    fn underlying_of(&self, deposit_token: Address) -> Result<Address, ExternalError> {
        Ok(self.pool.market(deposit_token)?.underlying)
    }

    fn collateral_factor_of(&self, deposit_token: Address) -> Result<U256, ExternalError> {
        Ok(self.pool.market(deposit_token)?.collateral_factor)
    }

    fn issue(
        &mut self,
        synthetic: Address,
        amount: U256,
        account: Address,
        recipient: Address,
    ) -> Result<U256, ExternalError> {
        self.pool.ensure_synthetic(synthetic)?;
        self.pool.add_debt(account, synthetic, amount);
        self.mint(synthetic, recipient, amount)?;
        debug!("Issued {} of {} against {}", amount, synthetic, account);
        Ok(amount)
    }

    fn repay(
        &mut self,
        synthetic: Address,
        payer: Address,
        account: Address,
        amount: U256,
    ) -> Result<U256, ExternalError> {
        self.pool.ensure_synthetic(synthetic)?;
        let repaid = amount.min(self.pool.debt_of(account, synthetic));
        self.burn(synthetic, payer, repaid)?;
        self.pool.remove_debt(account, synthetic, repaid);
        Ok(repaid)
    }

    fn deposit(
        &mut self,
        deposit_token: Address,
        payer: Address,
        amount: U256,
        account: Address,
    ) -> Result<U256, ExternalError> {
        let market = self.pool.market(deposit_token)?;
        let custody = self.pool.custody;
        self.transfer(market.underlying, payer, custody, amount)?;
        self.pool.add_deposit(account, deposit_token, amount);
        Ok(amount)
    }

    fn withdraw(
        &mut self,
        deposit_token: Address,
        account: Address,
        amount: U256,
        recipient: Address,
    ) -> Result<U256, ExternalError> {
        let market = self.pool.market(deposit_token)?;
        let unlocked = self.unlocked_balance_of(account, deposit_token);
        if amount > unlocked {
            return Err(ExternalError::ExceedsUnlocked {
                requested: amount,
                unlocked,
            });
        }

        let custody = self.pool.custody;
        self.pool.remove_deposit(account, deposit_token, amount);
        self.transfer(market.underlying, custody, recipient, amount)?;
        Ok(amount)
    }

    fn debt_of(&self, account: Address, synthetic: Address) -> U256 {
        self.pool.debt_of(account, synthetic)
    }

    fn deposit_of(&self, account: Address, deposit_token: Address) -> U256 {
        self.pool.deposit_of(account, deposit_token)
    }

    fn unlocked_balance_of(&self, account: Address, deposit_token: Address) -> U256 {
        self.pool
            .unlocked(account, deposit_token, |token| self.price(token))
            .unwrap_or_default()
    }

    fn debt_position_of(&self, account: Address) -> Result<DebtPosition, ExternalError> {
        self.pool.position(account, |token| self.price(token))
    }
}

impl Transport for MemoryEnv {
    fn transport_address(&self) -> Address {
        self.endpoint.address
    }

    fn local_chain_id(&self) -> ChainId {
        self.endpoint.chain_id
    }

    fn estimate_fee(
        &self,
        dst_chain_id: ChainId,
        payload_len: usize,
        gas_limit: u64,
        native_drop: U256,
    ) -> Result<U256, ExternalError> {
        self.endpoint
            .fees
            .estimate(dst_chain_id, payload_len, gas_limit, native_drop)
    }

    fn send(&mut self, message: OutboundMessage) -> Result<u64, ExternalError> {
        let required = self.estimate_fee(
            message.dst_chain_id,
            message.payload.len(),
            message.gas_limit,
            message.native_drop,
        )?;
        if message.native_fee < required {
            return Err(ExternalError::InsufficientFee {
                supplied: message.native_fee,
                required,
            });
        }

        let transport = self.endpoint.address;
        self.transfer_native(message.sender, transport, required)?;
        let excess = message.native_fee - required;
        if !excess.is_zero() {
            self.transfer_native(message.sender, message.refund_address, excess)?;
        }

        // Bridged tokens leave this chain and are minted on the destination
        if let Some(value) = message.token {
            self.burn(value.token, message.sender, value.amount)?;
        }

        Ok(self.endpoint.enqueue(message))
    }

    fn credit_inbound(&mut self, envelope: &Envelope) -> Result<(), ExternalError> {
        if let Some(value) = envelope.token {
            self.mint(value.token, envelope.dst_address, value.amount)?;
        }
        if !envelope.native_drop.is_zero() {
            self.credit_native(envelope.dst_address, envelope.native_drop);
        }
        Ok(())
    }

    fn cache_failed(&mut self, envelope: Envelope, reason: String) {
        self.endpoint.cache_failed(envelope, reason);
    }

    fn take_cached(&mut self, key: &MessageKey) -> Option<CachedMessage> {
        self.endpoint.take_cached(key)
    }

    fn drain_outbox(&mut self) -> Vec<Envelope> {
        self.endpoint.drain_outbox()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{wad_from_f64, WAD};
    use alloy_primitives::Bytes;

    const ALICE: Address = Address::repeat_byte(0xa1);
    const USDC: Address = Address::repeat_byte(0x01);
    const MSUSD: Address = Address::repeat_byte(0x03);

    fn env() -> MemoryEnv {
        let fees = FeeSchedule {
            base_fee: U256::from(10),
            fee_per_byte: U256::ZERO,
            fee_per_gas: HashMap::from([(2, U256::ZERO)]),
        };
        let mut env = MemoryEnv::new(1, Address::repeat_byte(0xee), Address::repeat_byte(0xcc), fees);
        env.set_rate(MSUSD, USDC, wad_from_f64(0.99));
        env.set_price(USDC, WAD);
        env.set_price(MSUSD, WAD);
        env
    }

    #[test]
    fn test_swap_enforces_minimum_output() {
        let mut env = env();
        env.mint(MSUSD, ALICE, U256::from(100)).unwrap();

        let err = env
            .swap_exact_input(ALICE, MSUSD, USDC, U256::from(100), U256::from(100), ALICE)
            .unwrap_err();
        assert!(matches!(err, ExternalError::SlippageTooHigh { .. }));
        assert_eq!(env.balance_of(MSUSD, ALICE), U256::from(100));

        let out = env
            .swap_exact_input(ALICE, MSUSD, USDC, U256::from(100), U256::from(99), ALICE)
            .unwrap();
        assert_eq!(out, U256::from(99));
        assert_eq!(env.balance_of(MSUSD, ALICE), U256::ZERO);
        assert_eq!(env.balance_of(USDC, ALICE), U256::from(99));
    }

    #[test]
    fn test_send_charges_fee_and_refunds_excess() {
        let mut env = env();
        env.credit_native(ALICE, U256::from(25));
        env.mint(USDC, ALICE, U256::from(5)).unwrap();

        let nonce = env
            .send(OutboundMessage {
                sender: ALICE,
                dst_chain_id: 2,
                dst_address: Address::repeat_byte(0x22),
                token: Some(crate::external::TokenAmount {
                    token: USDC,
                    amount: U256::from(5),
                }),
                native_fee: U256::from(15),
                native_drop: U256::from(2),
                gas_limit: 100,
                refund_address: Address::repeat_byte(0x77),
                payload: Bytes::from(vec![1u8, 2, 3]),
            })
            .unwrap();

        assert_eq!(nonce, 1);
        assert_eq!(env.native_balance_of(ALICE), U256::from(10));
        assert_eq!(env.native_balance_of(Address::repeat_byte(0x77)), U256::from(3));
        assert_eq!(env.balance_of(USDC, ALICE), U256::ZERO);
        assert_eq!(env.drain_outbox().len(), 1);
    }

    #[test]
    fn test_send_rejects_underpaid_fee() {
        let mut env = env();
        env.credit_native(ALICE, U256::from(25));

        let err = env
            .send(OutboundMessage {
                sender: ALICE,
                dst_chain_id: 2,
                dst_address: Address::repeat_byte(0x22),
                token: None,
                native_fee: U256::from(5),
                native_drop: U256::ZERO,
                gas_limit: 100,
                refund_address: ALICE,
                payload: Bytes::new(),
            })
            .unwrap_err();
        assert_eq!(
            err,
            ExternalError::InsufficientFee {
                supplied: U256::from(5),
                required: U256::from(10),
            }
        );
    }
}
