//! Single-chain collateral pool bookkeeping

use crate::error::ExternalError;
use crate::external::DebtPosition;
use crate::types::{wad_div, wad_mul};

use alloy_primitives::{Address, U256};
use std::collections::{HashMap, HashSet};

/// Deposit market backed by an underlying token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Market {
    pub underlying: Address,
    /// Share of the deposit value that may be borrowed against (wad)
    pub collateral_factor: U256,
}

/// Deposits and debts of every account on one chain
#[derive(Debug, Clone)]
pub struct Pool {
    /// Holds the underlying of all deposits
    pub custody: Address,
    pub shutdown: bool,
    markets: HashMap<Address, Market>,
    synthetics: HashSet<Address>,
    /// (account, deposit token) -> amount
    deposits: HashMap<(Address, Address), U256>,
    /// (account, synthetic) -> amount
    debts: HashMap<(Address, Address), U256>,
}

impl Pool {
    pub fn new(custody: Address) -> Self {
        Self {
            custody,
            shutdown: false,
            markets: HashMap::new(),
            synthetics: HashSet::new(),
            deposits: HashMap::new(),
            debts: HashMap::new(),
        }
    }

    pub fn add_market(&mut self, deposit_token: Address, market: Market) {
        self.markets.insert(deposit_token, market);
    }

    pub fn add_synthetic(&mut self, synthetic: Address) {
        self.synthetics.insert(synthetic);
    }

    pub fn market(&self, deposit_token: Address) -> Result<Market, ExternalError> {
        self.markets
            .get(&deposit_token)
            .copied()
            .ok_or(ExternalError::UnknownMarket(deposit_token))
    }

    pub fn ensure_synthetic(&self, synthetic: Address) -> Result<(), ExternalError> {
        if !self.synthetics.contains(&synthetic) {
            return Err(ExternalError::UnknownMarket(synthetic));
        }
        Ok(())
    }

    pub fn deposit_of(&self, account: Address, deposit_token: Address) -> U256 {
        self.deposits
            .get(&(account, deposit_token))
            .copied()
            .unwrap_or_default()
    }

    pub fn debt_of(&self, account: Address, synthetic: Address) -> U256 {
        self.debts
            .get(&(account, synthetic))
            .copied()
            .unwrap_or_default()
    }

    pub fn add_deposit(&mut self, account: Address, deposit_token: Address, amount: U256) {
        *self.deposits.entry((account, deposit_token)).or_default() += amount;
    }

    pub fn remove_deposit(&mut self, account: Address, deposit_token: Address, amount: U256) {
        let entry = self.deposits.entry((account, deposit_token)).or_default();
        *entry = entry.saturating_sub(amount);
    }

    pub fn add_debt(&mut self, account: Address, synthetic: Address, amount: U256) {
        *self.debts.entry((account, synthetic)).or_default() += amount;
    }

    pub fn remove_debt(&mut self, account: Address, synthetic: Address, amount: U256) {
        let entry = self.debts.entry((account, synthetic)).or_default();
        *entry = entry.saturating_sub(amount);
    }

    /// Value the account's deposits and debts with `price` (USD per token, wad)
    pub fn position(
        &self,
        account: Address,
        price: impl Fn(Address) -> Result<U256, ExternalError>,
    ) -> Result<DebtPosition, ExternalError> {
        let mut deposit_in_usd = U256::ZERO;
        let mut issuable_limit_in_usd = U256::ZERO;
        for ((holder, deposit_token), amount) in &self.deposits {
            if *holder != account || amount.is_zero() {
                continue;
            }
            let market = self.market(*deposit_token)?;
            let value = wad_mul(*amount, price(market.underlying)?);
            deposit_in_usd += value;
            issuable_limit_in_usd += wad_mul(value, market.collateral_factor);
        }

        let mut debt_in_usd = U256::ZERO;
        for ((holder, synthetic), amount) in &self.debts {
            if *holder != account || amount.is_zero() {
                continue;
            }
            debt_in_usd += wad_mul(*amount, price(*synthetic)?);
        }

        Ok(DebtPosition {
            is_healthy: debt_in_usd <= issuable_limit_in_usd,
            deposit_in_usd,
            debt_in_usd,
            issuable_limit_in_usd,
            issuable_in_usd: issuable_limit_in_usd.saturating_sub(debt_in_usd),
        })
    }

    /// Collateral of one market that can leave while keeping the position healthy
    pub fn unlocked(
        &self,
        account: Address,
        deposit_token: Address,
        price: impl Fn(Address) -> Result<U256, ExternalError>,
    ) -> Result<U256, ExternalError> {
        let deposited = self.deposit_of(account, deposit_token);
        let market = self.market(deposit_token)?;
        let position = self.position(account, &price)?;

        if position.debt_in_usd.is_zero() {
            return Ok(deposited);
        }
        if market.collateral_factor.is_zero() {
            return Ok(deposited);
        }

        let free_in_usd = wad_div(position.issuable_in_usd, market.collateral_factor);
        let underlying_price = price(market.underlying)?;
        if underlying_price.is_zero() {
            return Ok(U256::ZERO);
        }
        Ok(wad_div(free_in_usd, underlying_price).min(deposited))
    }
}
