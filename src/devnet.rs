//! Local multi-chain network built from [`Settings`]
//!
//! Every configured chain gets an in-memory environment, an orchestrator and
//! a dispatcher at deterministic addresses. Dispatchers trust each other, and
//! tokens live at the same address on every chain.

use crate::chain::Chain;
use crate::config::{ScenarioConfig, Settings, TokenKind};
use crate::external::{Accounting, TokenLedger};
use crate::orchestrator::{CrossChainArgs, FlashRepayParams, LeverageParams, RequestOutcome};
use crate::relay::RelayEngine;
use crate::sim::{FeeSchedule, MemoryEnv};
use crate::types::{wad_from_f64, ChainId, RequestKind};

use alloy_primitives::{keccak256, Address, U256};
use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::{info, warn};

/// Scale a whole-unit amount to 18 decimals
pub fn units(amount: f64) -> U256 {
    wad_from_f64(amount)
}

fn derive_address(label: &str) -> Address {
    Address::from_word(keccak256(label.as_bytes()))
}

/// Address of a token, identical on every chain
pub fn token_address(symbol: &str) -> Address {
    derive_address(&format!("token:{}", symbol))
}

/// Address of a named user account
pub fn account_address(name: &str) -> Address {
    derive_address(&format!("account:{}", name))
}

/// Protocol addresses of one chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainAddresses {
    pub dispatcher: Address,
    pub orchestrator: Address,
    pub transport: Address,
    pub custody: Address,
}

impl ChainAddresses {
    pub fn for_chain(chain_id: ChainId) -> Self {
        Self {
            dispatcher: derive_address(&format!("dispatcher:{}", chain_id)),
            orchestrator: derive_address(&format!("orchestrator:{}", chain_id)),
            transport: derive_address(&format!("transport:{}", chain_id)),
            custody: derive_address(&format!("custody:{}", chain_id)),
        }
    }
}

/// All chains of the devnet behind one relay
pub struct Devnet {
    pub engine: RelayEngine<MemoryEnv>,
    settings: Settings,
}

impl Devnet {
    /// Build every configured chain and register it with the relay
    pub fn build(settings: &Settings) -> Result<Self> {
        let engine = RelayEngine::new(settings.relay.clone());

        let fee_per_gas: HashMap<ChainId, U256> = settings
            .chains
            .iter()
            .map(|c| (c.chain_id, units(c.gas_price)))
            .collect();
        let fees = FeeSchedule {
            base_fee: units(settings.fees.base_fee),
            fee_per_byte: units(settings.fees.fee_per_byte),
            fee_per_gas,
        };

        for chain_config in &settings.chains {
            let chain_id = chain_config.chain_id;
            let addresses = ChainAddresses::for_chain(chain_id);
            info!(
                "Initializing chain {} (ID: {})",
                chain_config.name, chain_id
            );

            let mut env = MemoryEnv::new(chain_id, addresses.transport, addresses.custody, fees.clone());
            seed_markets(&mut env, settings, chain_id)?;

            let mut chain = Chain::new(
                chain_id,
                env,
                chain_config.governor,
                addresses.dispatcher,
                addresses.orchestrator,
            );
            configure_bridge(&mut chain, settings, chain_config.governor)?;
            seed_accounts(&mut chain, settings)?;

            engine.add_chain(chain);
            info!("Chain {} initialized successfully", chain_config.name);
        }

        Ok(Self {
            engine,
            settings: settings.clone(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Submit one configured request
    pub async fn run_scenario(&self, scenario: &ScenarioConfig) -> Result<RequestOutcome> {
        let account = account_address(&scenario.account);
        let deposit_token = token_address(&scenario.deposit_token);
        let synthetic_token = token_address(&scenario.synthetic);

        let handle = self.engine.chain(scenario.chain_id)?;
        let mut chain = handle.lock().await;

        let outcome = match scenario.kind {
            RequestKind::Leverage => {
                let token_in = match &scenario.token_in {
                    Some(symbol) => token_address(symbol),
                    None => chain.env().underlying_of(deposit_token)?,
                };
                let params = LeverageParams {
                    token_in,
                    deposit_token,
                    synthetic_token,
                    amount_in: units(scenario.amount),
                    leverage: wad_from_f64(scenario.leverage.unwrap_or_default()),
                    swap_amount_out_min: units(scenario.swap_amount_out_min),
                    deposit_amount_min: units(scenario.bound_amount),
                };
                let cross_chain = match scenario.dst_chain_id {
                    Some(dst) => {
                        let quote = chain.quote_leverage_fee(dst)?;
                        Some(CrossChainArgs {
                            dst_chain_id: dst,
                            native_fee: quote.native_fee,
                            callback_native_fee: quote.callback_native_fee,
                            refund_address: account,
                        })
                    }
                    None => None,
                };
                chain.leverage(account, &params, cross_chain.as_ref())?
            }
            RequestKind::FlashRepay => {
                let params = FlashRepayParams {
                    synthetic_token,
                    deposit_token,
                    withdraw_amount: units(scenario.amount),
                    swap_amount_out_min: units(scenario.swap_amount_out_min),
                    repay_amount_min: units(scenario.bound_amount),
                };
                let cross_chain = match scenario.dst_chain_id {
                    Some(dst) => {
                        let quote = chain.quote_flash_repay_fee(dst)?;
                        Some(CrossChainArgs {
                            dst_chain_id: dst,
                            native_fee: quote.native_fee,
                            callback_native_fee: quote.callback_native_fee,
                            refund_address: account,
                        })
                    }
                    None => None,
                };
                chain.flash_repay(account, &params, cross_chain.as_ref())?
            }
        };

        info!("Scenario {} submitted: {:?}", scenario.name, outcome);
        Ok(outcome)
    }

    /// Submit every configured scenario, in order
    pub async fn run_scenarios(&self) -> Vec<(String, Result<RequestOutcome>)> {
        let mut results = Vec::new();
        for scenario in &self.settings.scenarios {
            let result = self.run_scenario(scenario).await;
            if let Err(e) = &result {
                warn!("Scenario {} rejected: {}", scenario.name, e);
            }
            results.push((scenario.name.clone(), result));
        }
        results
    }
}

/// Prices, swap rates, markets and synthetics of one chain
fn seed_markets(env: &mut MemoryEnv, settings: &Settings, chain_id: ChainId) -> Result<()> {
    for token in &settings.tokens {
        let address = token_address(&token.symbol);
        env.set_price(address, units(token.price_usd));
        if token.kind == TokenKind::Synthetic {
            env.add_synthetic(address);
        }
    }

    for market in &settings.markets {
        env.add_market(
            token_address(&market.deposit_token),
            token_address(&market.underlying),
            wad_from_f64(market.collateral_factor),
        );
    }

    for rate in &settings.rates {
        if rate.chains.is_empty() || rate.chains.contains(&chain_id) {
            env.set_rate(
                token_address(&rate.token_in),
                token_address(&rate.token_out),
                wad_from_f64(rate.rate),
            );
        }
    }

    Ok(())
}

/// Trusted routes to every other chain, bridge pools and pause flags
fn configure_bridge(chain: &mut Chain<MemoryEnv>, settings: &Settings, governor: Address) -> Result<()> {
    let chain_id = chain.chain_id();

    for remote in settings.chains.iter().filter(|c| c.chain_id != chain_id) {
        let remote_dispatcher = ChainAddresses::for_chain(remote.chain_id).dispatcher;
        chain
            .govern(|g| g.set_trusted_route(governor, remote.chain_id, remote_dispatcher))
            .with_context(|| format!("Failed to trust chain {}", remote.chain_id))?;
    }

    for token in &settings.tokens {
        if let Some(pool_id) = token.bridge_pool_id {
            let address = token_address(&token.symbol);
            chain.govern(|g| g.set_bridge_pool(governor, U256::from(pool_id), address))?;
        }
    }

    let buffer = settings.fees.callback_fee_buffer_percent;
    if buffer != chain.config().callback_fee_buffer_percent() {
        chain.govern(|g| g.set_callback_fee_buffer_percent(governor, buffer))?;
    }

    let Some(chain_config) = settings.get_chain_by_id(chain_id) else {
        return Ok(());
    };
    if !chain_config.bridging_active {
        chain.govern(|g| g.toggle_bridging_is_active(governor))?;
    }
    if !chain_config.flash_repay_active {
        chain.govern(|g| g.toggle_flash_repay_is_active(governor))?;
    }

    Ok(())
}

/// Balances and opening deposits of the accounts living on this chain
fn seed_accounts(chain: &mut Chain<MemoryEnv>, settings: &Settings) -> Result<()> {
    let chain_id = chain.chain_id();

    for account in settings.accounts.iter().filter(|a| a.chain_id == chain_id) {
        let holder = account_address(&account.name);
        let env = chain.env_mut();
        env.credit_native(holder, units(account.native));

        for (symbol, amount) in &account.balances {
            env.mint(token_address(symbol), holder, units(*amount))?;
        }

        for (symbol, amount) in &account.deposits {
            let deposit_token = token_address(symbol);
            let underlying = env.underlying_of(deposit_token)?;
            env.mint(underlying, holder, units(*amount))?;
            env.deposit(deposit_token, holder, units(*amount), holder)?;
        }

        info!("Account {} ({}) funded on chain {}", account.name, holder, chain_id);
    }

    Ok(())
}
