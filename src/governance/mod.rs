//! Governance-owned bridge configuration
//!
//! [`BridgeConfig`] holds the trusted routes, pause flags, per-leg gas limits
//! and bridge pools of one chain. It is read by every inbound and outbound
//! call and written only through [`Governance`], whose setters are restricted
//! to the governor. A change applies to every message processed after it.

use crate::error::{ProtocolError, ProtocolResult};
use crate::types::ChainId;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Remote dispatcher registered for a neighbouring chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedRoute {
    pub remote_dispatcher: Address,
    pub is_active: bool,
}

/// Destination gas limits for each message leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasLimits {
    pub leverage_swap: u64,
    pub leverage_callback: u64,
    pub flash_repay_swap: u64,
    pub flash_repay_callback: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        Self {
            leverage_swap: 650_000,
            leverage_callback: 750_000,
            flash_repay_swap: 500_000,
            flash_repay_callback: 750_000,
        }
    }
}

/// Configuration consulted by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    routes: HashMap<ChainId, TrustedRoute>,
    bridging_is_active: bool,
    flash_repay_is_active: bool,
    gas_limits: GasLimits,
    /// Bridge pool id -> bridge token
    bridge_pools: HashMap<U256, Address>,
    /// Buffer added to the quoted return-leg fee (e.g., 10 = 10% buffer)
    callback_fee_buffer_percent: u64,
}

/// Return-leg fee buffer used until governance sets one
pub const DEFAULT_CALLBACK_FEE_BUFFER_PERCENT: u64 = 10;

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            routes: HashMap::new(),
            bridging_is_active: true,
            flash_repay_is_active: true,
            gas_limits: GasLimits::default(),
            bridge_pools: HashMap::new(),
            callback_fee_buffer_percent: DEFAULT_CALLBACK_FEE_BUFFER_PERCENT,
        }
    }
}

impl BridgeConfig {
    pub fn route(&self, chain_id: ChainId) -> Option<&TrustedRoute> {
        self.routes.get(&chain_id)
    }

    /// Remote dispatcher to send to, if the route is registered and active
    pub fn destination(&self, chain_id: ChainId) -> ProtocolResult<Address> {
        match self.routes.get(&chain_id) {
            Some(route) if route.is_active => Ok(route.remote_dispatcher),
            _ => Err(ProtocolError::DestinationChainNotAllowed { chain_id }),
        }
    }

    /// Check an inbound message's claimed sender against the trusted route
    pub fn verify_source(&self, chain_id: ChainId, from: Address) -> ProtocolResult<()> {
        if from == Address::ZERO {
            return Err(ProtocolError::InvalidFromAddress { chain_id });
        }

        match self.routes.get(&chain_id) {
            Some(route) if route.remote_dispatcher == from => Ok(()),
            _ => Err(ProtocolError::InvalidFromAddress { chain_id }),
        }
    }

    pub fn ensure_bridging_active(&self) -> ProtocolResult<()> {
        if !self.bridging_is_active {
            return Err(ProtocolError::BridgingIsPaused);
        }
        Ok(())
    }

    pub fn ensure_flash_repay_active(&self) -> ProtocolResult<()> {
        if !self.flash_repay_is_active {
            return Err(ProtocolError::CrossChainFlashRepayInactive);
        }
        Ok(())
    }

    pub fn bridging_is_active(&self) -> bool {
        self.bridging_is_active
    }

    pub fn flash_repay_is_active(&self) -> bool {
        self.flash_repay_is_active
    }

    pub fn gas_limits(&self) -> &GasLimits {
        &self.gas_limits
    }

    pub fn callback_fee_buffer_percent(&self) -> u64 {
        self.callback_fee_buffer_percent
    }

    /// Bridge token of a pool id
    pub fn bridge_pool_token(&self, pool_id: U256) -> ProtocolResult<Address> {
        self.bridge_pools
            .get(&pool_id)
            .copied()
            .ok_or(ProtocolError::UnknownBridgePool(pool_id))
    }

    /// Pool id of a bridge token
    pub fn pool_id_of(&self, token: Address) -> Option<U256> {
        self.bridge_pools
            .iter()
            .find(|(_, t)| **t == token)
            .map(|(id, _)| *id)
    }
}

/// A configuration change applied by the governor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "setting", rename_all = "snake_case")]
pub enum ConfigChange {
    TrustedRoute { chain_id: ChainId, remote_dispatcher: Address },
    RouteIsActive { chain_id: ChainId, is_active: bool },
    BridgingIsActive { is_active: bool },
    FlashRepayIsActive { is_active: bool },
    LeverageSwapGasLimit { gas_limit: u64 },
    LeverageCallbackGasLimit { gas_limit: u64 },
    FlashRepaySwapGasLimit { gas_limit: u64 },
    FlashRepayCallbackGasLimit { gas_limit: u64 },
    BridgePool { pool_id: U256, token: Address },
    CallbackFeeBufferPercent { percent: u64 },
}

/// Single owner of a chain's [`BridgeConfig`]
#[derive(Debug, Clone)]
pub struct Governance {
    governor: Address,
    config: BridgeConfig,
}

impl Governance {
    pub fn new(governor: Address) -> Self {
        Self {
            governor,
            config: BridgeConfig::default(),
        }
    }

    pub fn governor(&self) -> Address {
        self.governor
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn only_governor(&self, caller: Address) -> ProtocolResult<()> {
        if caller != self.governor {
            return Err(ProtocolError::SenderIsNotGovernor);
        }
        Ok(())
    }

    /// Register or replace the remote dispatcher for a chain. New routes start active.
    pub fn set_trusted_route(
        &mut self,
        caller: Address,
        chain_id: ChainId,
        remote_dispatcher: Address,
    ) -> ProtocolResult<ConfigChange> {
        self.only_governor(caller)?;
        if remote_dispatcher == Address::ZERO {
            return Err(ProtocolError::AddressIsNull);
        }

        let route = self.config.routes.entry(chain_id).or_insert(TrustedRoute {
            remote_dispatcher: Address::ZERO,
            is_active: true,
        });
        if route.remote_dispatcher == remote_dispatcher {
            return Err(ProtocolError::NewValueIsSameAsCurrent);
        }
        route.remote_dispatcher = remote_dispatcher;

        info!(
            "Trusted route for chain {} set to {}",
            chain_id, remote_dispatcher
        );
        Ok(ConfigChange::TrustedRoute {
            chain_id,
            remote_dispatcher,
        })
    }

    /// Enable or disable sending to a registered chain
    pub fn toggle_route_is_active(
        &mut self,
        caller: Address,
        chain_id: ChainId,
    ) -> ProtocolResult<ConfigChange> {
        self.only_governor(caller)?;
        let route = self
            .config
            .routes
            .get_mut(&chain_id)
            .ok_or(ProtocolError::DestinationChainNotAllowed { chain_id })?;
        route.is_active = !route.is_active;

        info!("Route to chain {} active: {}", chain_id, route.is_active);
        Ok(ConfigChange::RouteIsActive {
            chain_id,
            is_active: route.is_active,
        })
    }

    pub fn toggle_bridging_is_active(&mut self, caller: Address) -> ProtocolResult<ConfigChange> {
        self.only_governor(caller)?;
        self.config.bridging_is_active = !self.config.bridging_is_active;

        info!("Bridging active: {}", self.config.bridging_is_active);
        Ok(ConfigChange::BridgingIsActive {
            is_active: self.config.bridging_is_active,
        })
    }

    pub fn toggle_flash_repay_is_active(&mut self, caller: Address) -> ProtocolResult<ConfigChange> {
        self.only_governor(caller)?;
        self.config.flash_repay_is_active = !self.config.flash_repay_is_active;

        info!(
            "Cross-chain flash repay active: {}",
            self.config.flash_repay_is_active
        );
        Ok(ConfigChange::FlashRepayIsActive {
            is_active: self.config.flash_repay_is_active,
        })
    }

    pub fn set_leverage_swap_gas_limit(
        &mut self,
        caller: Address,
        gas_limit: u64,
    ) -> ProtocolResult<ConfigChange> {
        self.only_governor(caller)?;
        update(&mut self.config.gas_limits.leverage_swap, gas_limit)?;
        Ok(ConfigChange::LeverageSwapGasLimit { gas_limit })
    }

    pub fn set_leverage_callback_gas_limit(
        &mut self,
        caller: Address,
        gas_limit: u64,
    ) -> ProtocolResult<ConfigChange> {
        self.only_governor(caller)?;
        update(&mut self.config.gas_limits.leverage_callback, gas_limit)?;
        Ok(ConfigChange::LeverageCallbackGasLimit { gas_limit })
    }

    pub fn set_flash_repay_swap_gas_limit(
        &mut self,
        caller: Address,
        gas_limit: u64,
    ) -> ProtocolResult<ConfigChange> {
        self.only_governor(caller)?;
        update(&mut self.config.gas_limits.flash_repay_swap, gas_limit)?;
        Ok(ConfigChange::FlashRepaySwapGasLimit { gas_limit })
    }

    pub fn set_flash_repay_callback_gas_limit(
        &mut self,
        caller: Address,
        gas_limit: u64,
    ) -> ProtocolResult<ConfigChange> {
        self.only_governor(caller)?;
        update(&mut self.config.gas_limits.flash_repay_callback, gas_limit)?;
        Ok(ConfigChange::FlashRepayCallbackGasLimit { gas_limit })
    }

    pub fn set_callback_fee_buffer_percent(
        &mut self,
        caller: Address,
        percent: u64,
    ) -> ProtocolResult<ConfigChange> {
        self.only_governor(caller)?;
        update(&mut self.config.callback_fee_buffer_percent, percent)?;

        info!("Callback fee buffer set to {}%", percent);
        Ok(ConfigChange::CallbackFeeBufferPercent { percent })
    }

    /// Map a bridge pool id to its token
    pub fn set_bridge_pool(
        &mut self,
        caller: Address,
        pool_id: U256,
        token: Address,
    ) -> ProtocolResult<ConfigChange> {
        self.only_governor(caller)?;
        if token == Address::ZERO {
            return Err(ProtocolError::AddressIsNull);
        }
        if self.config.bridge_pools.get(&pool_id) == Some(&token) {
            return Err(ProtocolError::NewValueIsSameAsCurrent);
        }
        self.config.bridge_pools.insert(pool_id, token);

        info!("Bridge pool {} mapped to {}", pool_id, token);
        Ok(ConfigChange::BridgePool { pool_id, token })
    }
}

fn update(slot: &mut u64, value: u64) -> ProtocolResult<()> {
    if *slot == value {
        return Err(ProtocolError::NewValueIsSameAsCurrent);
    }
    *slot = value;
    Ok(())
}
