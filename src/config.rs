//! Configuration management for the devnet
//!
//! Loads configuration from TOML files with environment variable substitution.
//! Token amounts and prices are written in whole units and scaled to 18
//! decimals when the devnet is built.

use crate::governance::DEFAULT_CALLBACK_FEE_BUFFER_PERCENT;
use crate::types::{wad_from_f64, ChainId, RequestKind};

use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    /// Chain that hosts the swap liquidity
    pub hub_chain_id: ChainId,
    pub chains: Vec<ChainConfig>,
    pub tokens: Vec<TokenConfig>,
    #[serde(default)]
    pub markets: Vec<MarketConfig>,
    #[serde(default)]
    pub rates: Vec<RateConfig>,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Rounds `run_until_idle` may take before giving up
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_rounds: default_max_rounds(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_rounds() -> u32 {
    32
}

/// Transport fee schedule, in native units
#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    #[serde(default)]
    pub base_fee: f64,
    #[serde(default)]
    pub fee_per_byte: f64,
    /// Buffer on quoted return-leg fees (e.g., 10 = 10% buffer)
    #[serde(default = "default_callback_fee_buffer_percent")]
    pub callback_fee_buffer_percent: u64,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            base_fee: 0.0,
            fee_per_byte: 0.0,
            callback_fee_buffer_percent: default_callback_fee_buffer_percent(),
        }
    }
}

fn default_callback_fee_buffer_percent() -> u64 {
    DEFAULT_CALLBACK_FEE_BUFFER_PERCENT
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub name: String,
    pub governor: Address,
    /// Native price of one unit of gas on this chain
    #[serde(default)]
    pub gas_price: f64,
    #[serde(default = "default_true")]
    pub bridging_active: bool,
    #[serde(default = "default_true")]
    pub flash_repay_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Plain token, such as a deposit market's underlying
    Collateral,
    /// Synthetic issued as debt
    Synthetic,
    /// Receipt of a deposit market
    Deposit,
}

/// A token deployed at the same address on every chain
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub kind: TokenKind,
    #[serde(default)]
    pub price_usd: f64,
    /// Bridge pool carrying this token between chains
    pub bridge_pool_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub deposit_token: String,
    pub underlying: String,
    pub collateral_factor: f64,
}

/// Fixed swap rate; applies to every chain unless `chains` is given
#[derive(Debug, Clone, Deserialize)]
pub struct RateConfig {
    pub token_in: String,
    pub token_out: String,
    pub rate: f64,
    #[serde(default)]
    pub chains: Vec<ChainId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    pub chain_id: ChainId,
    #[serde(default)]
    pub native: f64,
    #[serde(default)]
    pub balances: HashMap<String, f64>,
    /// Deposit token -> collateral deposited up front
    #[serde(default)]
    pub deposits: HashMap<String, f64>,
}

/// A request submitted by the devnet at startup
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub account: String,
    pub chain_id: ChainId,
    pub kind: RequestKind,
    /// Swap chain; local settlement when absent
    pub dst_chain_id: Option<ChainId>,
    pub deposit_token: String,
    pub synthetic: String,
    /// Token paid in; defaults to the market's underlying
    pub token_in: Option<String>,
    /// `amount_in` for leverage, `withdraw_amount` for flash repay
    pub amount: f64,
    pub leverage: Option<f64>,
    #[serde(default)]
    pub swap_amount_out_min: f64,
    /// `deposit_amount_min` for leverage, `repay_amount_min` for flash repay
    #[serde(default)]
    pub bound_amount: f64,
}

impl Settings {
    /// Load settings from `SYNTH_CONFIG` or `config/default.toml`
    pub fn load() -> Result<Self> {
        let config_path = env::var("SYNTH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse and validate settings from TOML text
    pub fn from_toml(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            anyhow::bail!("At least one chain must be configured");
        }

        let mut chain_ids = HashSet::new();
        for chain in &self.chains {
            if !chain_ids.insert(chain.chain_id) {
                anyhow::bail!("Chain {} is configured twice", chain.chain_id);
            }
            if chain.governor == Address::ZERO {
                anyhow::bail!("Chain {} has no governor", chain.name);
            }
        }
        if !chain_ids.contains(&self.hub_chain_id) {
            anyhow::bail!("Hub chain {} is not configured", self.hub_chain_id);
        }

        check_amount("fees.base_fee", self.fees.base_fee)?;
        check_amount("fees.fee_per_byte", self.fees.fee_per_byte)?;
        for chain in &self.chains {
            check_amount(&format!("gas_price of chain {}", chain.name), chain.gas_price)?;
        }
        for token in &self.tokens {
            check_amount(&format!("price_usd of {}", token.symbol), token.price_usd)?;
        }

        for market in &self.markets {
            self.token(&market.deposit_token)?;
            self.token(&market.underlying)?;
            if !(0.0..1.0).contains(&market.collateral_factor) {
                anyhow::bail!(
                    "Collateral factor of {} must be in [0, 1)",
                    market.deposit_token
                );
            }
        }

        for rate in &self.rates {
            self.token(&rate.token_in)?;
            self.token(&rate.token_out)?;
            check_amount(
                &format!("rate {} -> {}", rate.token_in, rate.token_out),
                rate.rate,
            )?;
        }

        for account in &self.accounts {
            if !chain_ids.contains(&account.chain_id) {
                anyhow::bail!("Account {} is on unknown chain {}", account.name, account.chain_id);
            }
            check_amount(&format!("native of {}", account.name), account.native)?;
            for (symbol, amount) in account.balances.iter().chain(&account.deposits) {
                check_amount(&format!("{} of {}", symbol, account.name), *amount)?;
            }
        }

        for scenario in &self.scenarios {
            if !chain_ids.contains(&scenario.chain_id) {
                anyhow::bail!("Scenario {} runs on unknown chain {}", scenario.name, scenario.chain_id);
            }
            if let Some(dst) = scenario.dst_chain_id {
                if !chain_ids.contains(&dst) {
                    anyhow::bail!("Scenario {} swaps on unknown chain {}", scenario.name, dst);
                }
            }
            if !self.accounts.iter().any(|a| a.name == scenario.account) {
                anyhow::bail!("Scenario {} uses unknown account {}", scenario.name, scenario.account);
            }
            self.token(&scenario.deposit_token)?;
            self.token(&scenario.synthetic)?;
            check_amount(&format!("amount of {}", scenario.name), scenario.amount)?;
            check_amount(
                &format!("swap_amount_out_min of {}", scenario.name),
                scenario.swap_amount_out_min,
            )?;
            check_amount(
                &format!("bound_amount of {}", scenario.name),
                scenario.bound_amount,
            )?;
            if scenario.kind == RequestKind::Leverage && scenario.leverage.unwrap_or(0.0) <= 1.0 {
                anyhow::bail!("Scenario {} needs a leverage above 1.0", scenario.name);
            }
        }

        Ok(())
    }

    /// Get token config by symbol
    pub fn token(&self, symbol: &str) -> Result<&TokenConfig> {
        self.tokens
            .iter()
            .find(|t| t.symbol == symbol)
            .with_context(|| format!("Unknown token {}", symbol))
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain_id == chain_id)
    }
}

/// Amounts are scaled to 18 decimals with nine decimals of precision; a
/// negative value or a positive one that would round to zero is an error.
fn check_amount(what: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        anyhow::bail!("{} must be a non-negative number, got {}", what, value);
    }
    if value > 0.0 && wad_from_f64(value).is_zero() {
        anyhow::bail!("{} is below the supported precision of 1e-9: {}", what, value);
    }
    Ok(())
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
hub_chain_id = 1

[[chains]]
chain_id = 1
name = "hub"
governor = "0x6060606060606060606060606060606060606060"

[[tokens]]
symbol = "USDC"
kind = "collateral"
price_usd = 1.0
bridge_pool_id = 1
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file_applies_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.hub_chain_id, 1);
        assert_eq!(settings.relay.max_rounds, 32);
        assert!(settings.get_chain_by_id(1).unwrap().bridging_active);
        assert_eq!(settings.token("USDC").unwrap().bridge_pool_id, Some(1));
    }

    #[test]
    fn test_missing_hub_is_rejected() {
        let config = MINIMAL.replace("hub_chain_id = 1", "hub_chain_id = 7");
        let err = Settings::from_toml(&config).unwrap_err();
        assert!(err.to_string().contains("Hub chain 7"));
    }

    #[test]
    fn test_negative_and_sub_precision_amounts_are_rejected() {
        let negative = MINIMAL.replace("name = \"hub\"", "name = \"hub\"\ngas_price = -1.0");
        let err = Settings::from_toml(&negative).unwrap_err();
        assert!(err.to_string().contains("gas_price of chain hub"));

        let tiny = MINIMAL.replace("name = \"hub\"", "name = \"hub\"\ngas_price = 0.0000000001");
        let err = Settings::from_toml(&tiny).unwrap_err();
        assert!(err.to_string().contains("precision"));

        let fine = MINIMAL.replace("name = \"hub\"", "name = \"hub\"\ngas_price = 0.000000001");
        let settings = Settings::from_toml(&fine).unwrap();
        assert_eq!(settings.fees.callback_fee_buffer_percent, 10);
    }
}
