use std::{fmt, fs, path::Path, time::Duration};

use alloy::primitives::{
    address, bytes,
    utils::{parse_units, ParseUnits},
    Address, Bytes, U256,
};
use eyre::{bail, eyre, WrapErr};
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// LI.FI marker for the native currency of the source chain.
pub const NATIVE_TOKEN_SENTINEL: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Base,
    Fantom,
    Arbitrum,
    Optimism,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Chain::Base => "base",
            Chain::Fantom => "fantom",
            Chain::Arbitrum => "arbitrum",
            Chain::Optimism => "optimism",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEndpoint {
    pub chain: Chain,
    pub rpc_url: String,
    pub chain_id: u64,
    #[serde(default = "default_native_decimals")]
    pub native_decimals: u8,
    pub native_symbol: String,
    pub explorer: String,
}

fn default_native_decimals() -> u8 {
    18
}

impl ChainEndpoint {
    pub fn tx_url(&self, hash: impl fmt::Display) -> String {
        format!("{}/tx/{}", self.explorer.trim_end_matches('/'), hash)
    }

    pub fn format_native(&self, amount: U256) -> String {
        format_amount(amount, self.native_decimals, &self.native_symbol)
    }
}

/// The stablecoin a chain's leg of the trip settles in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub chain: Chain,
    pub address: Address,
    #[serde(default = "default_token_decimals")]
    pub decimals: u8,
    pub symbol: String,
}

fn default_token_decimals() -> u8 {
    6
}

impl TokenDescriptor {
    pub fn format(&self, amount: U256) -> String {
        format_amount(amount, self.decimals, &self.symbol)
    }
}

pub fn format_amount(amount: U256, decimals: u8, symbol: &str) -> String {
    let value = alloy::primitives::utils::format_units(amount, decimals)
        .unwrap_or_else(|_| amount.to_string());
    format!("{value} {symbol}")
}

/// Parses a non-negative human decimal ("0.5") into base units.
pub fn parse_amount(value: &str, decimals: u8) -> eyre::Result<U256> {
    let parsed = parse_units(value.trim(), decimals)
        .map_err(|e| eyre!("invalid amount {value:?}: {e}"))?;
    match parsed {
        ParseUnits::U256(amount) => Ok(amount),
        ParseUnits::I256(amount) if !amount.is_negative() => Ok(amount.into_raw()),
        ParseUnits::I256(_) => bail!("invalid amount {value:?}: must not be negative"),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterParams {
    /// Route and call data come from the LI.FI quote endpoint.
    Lifi {
        api_url: String,
        /// Contract the source token is approved to when it is an ERC-20.
        diamond: Address,
        bridges: Vec<String>,
    },
    /// Call data built locally against a Stargate router.
    Stargate {
        router: Address,
        dst_chain_id: u16,
        src_pool_id: u64,
        dst_pool_id: u64,
        /// Slippage in thousandths, 30 means 3%.
        slippage: u32,
        #[serde(default)]
        lz_tx_params: Bytes,
    },
}

/// Routes are told apart by endpoints and source token.
pub type RouteKey = (Chain, Chain, Address);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRoute {
    pub from: Chain,
    pub to: Chain,
    pub source_token: Address,
    pub destination_token: Address,
    pub adapter: AdapterParams,
    /// Gas limit used when estimation reverts.
    pub fallback_gas: u64,
    #[serde(default = "default_multiplier")]
    pub gas_price_multiplier: u64,
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
    /// Wait before the first receipt lookup.
    #[serde(default)]
    pub receipt_delay_secs: u64,
    /// Native balance the source chain must hold before the hop starts.
    #[serde(default)]
    pub min_native_balance: Option<String>,
    /// Poll the native balance until it is non-zero before spending gas.
    #[serde(default)]
    pub await_native: Option<RetryPolicy>,
}

fn default_multiplier() -> u64 {
    1
}

fn default_receipt_timeout() -> u64 {
    120
}

impl BridgeRoute {
    pub fn key(&self) -> RouteKey {
        (self.from, self.to, self.source_token)
    }

    pub fn source_is_native(&self) -> bool {
        is_native(self.source_token)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }

    pub fn receipt_delay(&self) -> Duration {
        Duration::from_secs(self.receipt_delay_secs)
    }
}

pub fn is_native(token: Address) -> bool {
    token == NATIVE_TOKEN_SENTINEL || token == Address::ZERO
}

/// Whether the gas-token top-up is gated on the intermediate balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TopUpPolicy {
    /// Top up only when the balance is below `floor` (human units).
    Gated { floor: String },
    Always,
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovePolicy {
    pub fallback_gas: u64,
    /// Pause after a confirmed approve so the node sees the new allowance.
    pub settle_delay_secs: u64,
}

impl Default for ApprovePolicy {
    fn default() -> Self {
        Self {
            fallback_gas: 65_000,
            settle_delay_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardPolicy {
    pub min_native_balance: String,
    pub fallback_gas: u64,
    pub gas_price_multiplier: u64,
    pub receipt_timeout_secs: u64,
}

impl Default for ForwardPolicy {
    fn default() -> Self {
        Self {
            min_native_balance: "0.001".into(),
            fallback_gas: 100_000,
            gas_price_multiplier: 2,
            receipt_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chain the ETH for the top-up is spent on.
    pub source: Chain,
    /// Chain holding the stablecoin and needing the gas token.
    pub intermediate: Chain,
    /// What the top-up spends on `source`: the native sentinel for ETH, or a token address.
    pub top_up_token: Address,
    pub top_up: TopUpPolicy,
    pub approve: ApprovePolicy,
    pub forward: ForwardPolicy,
    pub receipt_poll_interval_ms: u64,
    pub chains: Vec<ChainEndpoint>,
    pub tokens: Vec<TokenDescriptor>,
    pub routes: Vec<BridgeRoute>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: Chain::Base,
            intermediate: Chain::Fantom,
            top_up_token: NATIVE_TOKEN_SENTINEL,
            top_up: TopUpPolicy::Gated { floor: "2".into() },
            approve: ApprovePolicy::default(),
            forward: ForwardPolicy::default(),
            receipt_poll_interval_ms: 2_000,
            chains: default_chains(),
            tokens: default_tokens(),
            routes: default_routes(),
        }
    }
}

fn default_chains() -> Vec<ChainEndpoint> {
    let endpoint = |chain, rpc_url: &str, chain_id, native_symbol: &str, explorer: &str| {
        ChainEndpoint {
            chain,
            rpc_url: rpc_url.into(),
            chain_id,
            native_decimals: 18,
            native_symbol: native_symbol.into(),
            explorer: explorer.into(),
        }
    };
    vec![
        endpoint(Chain::Base, "https://mainnet.base.org", 8453, "ETH", "https://basescan.org"),
        endpoint(
            Chain::Fantom,
            "https://fantom-rpc.publicnode.com",
            250,
            "FTM",
            "https://ftmscan.com",
        ),
        endpoint(
            Chain::Arbitrum,
            "https://arb1.arbitrum.io/rpc",
            42161,
            "ETH",
            "https://arbiscan.io",
        ),
        endpoint(
            Chain::Optimism,
            "https://mainnet.optimism.io",
            10,
            "ETH",
            "https://optimistic.etherscan.io",
        ),
    ]
}

fn default_tokens() -> Vec<TokenDescriptor> {
    vec![
        TokenDescriptor {
            chain: Chain::Base,
            address: BASE_USDC,
            decimals: 6,
            symbol: "USDC".into(),
        },
        TokenDescriptor {
            chain: Chain::Fantom,
            address: address!("28a92dde19D9989F39A49905d7C9C2FAc7799bDf"),
            decimals: 6,
            symbol: "lzUSDC".into(),
        },
        TokenDescriptor {
            chain: Chain::Arbitrum,
            address: address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
            decimals: 6,
            symbol: "USDT".into(),
        },
        TokenDescriptor {
            chain: Chain::Optimism,
            address: address!("7F5c764cBc14f9669B88837ca1490cCa17c31607"),
            decimals: 6,
            symbol: "USDC.e".into(),
        },
    ]
}

pub const BASE_USDC: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

fn default_routes() -> Vec<BridgeRoute> {
    let lz_usdc = address!("28a92dde19D9989F39A49905d7C9C2FAc7799bDf");
    let lifi = AdapterParams::Lifi {
        api_url: "https://li.quest/v1".into(),
        diamond: address!("1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE"),
        bridges: vec!["squid".into()],
    };
    vec![
        BridgeRoute {
            from: Chain::Base,
            to: Chain::Fantom,
            source_token: NATIVE_TOKEN_SENTINEL,
            destination_token: Address::ZERO,
            adapter: lifi.clone(),
            fallback_gas: 600_000,
            gas_price_multiplier: 2,
            receipt_timeout_secs: 120,
            receipt_delay_secs: 0,
            min_native_balance: None,
            await_native: None,
        },
        BridgeRoute {
            from: Chain::Base,
            to: Chain::Fantom,
            source_token: BASE_USDC,
            destination_token: Address::ZERO,
            adapter: lifi,
            fallback_gas: 600_000,
            gas_price_multiplier: 2,
            receipt_timeout_secs: 120,
            receipt_delay_secs: 0,
            min_native_balance: Some("0.001".into()),
            await_native: None,
        },
        BridgeRoute {
            from: Chain::Fantom,
            to: Chain::Arbitrum,
            source_token: lz_usdc,
            destination_token: address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"),
            adapter: AdapterParams::Stargate {
                router: address!("Af5191B0De278C7286d6C7CC6ab6BB8A73bA2Cd6"),
                dst_chain_id: 110,
                src_pool_id: 21,
                dst_pool_id: 2,
                slippage: 30,
                lz_tx_params: Bytes::new(),
            },
            fallback_gas: 2_000_000,
            gas_price_multiplier: 1,
            receipt_timeout_secs: 300,
            receipt_delay_secs: 20,
            min_native_balance: None,
            await_native: Some(RetryPolicy::fixed(10, Duration::from_secs(10))),
        },
        BridgeRoute {
            from: Chain::Fantom,
            to: Chain::Optimism,
            source_token: lz_usdc,
            destination_token: address!("7F5c764cBc14f9669B88837ca1490cCa17c31607"),
            adapter: AdapterParams::Stargate {
                router: address!("45A01E4e04F14f7A4a6702c74187c5F6222033cd"),
                dst_chain_id: 111,
                src_pool_id: 1,
                dst_pool_id: 21,
                slippage: 10,
                // adapter params v1, destination gas 500_000
                lz_tx_params: bytes!(
                    "0001000000000000000000000000000000000000000000000000000000000007a120"
                ),
            },
            fallback_gas: 1_000_000,
            gas_price_multiplier: 2,
            receipt_timeout_secs: 120,
            receipt_delay_secs: 0,
            min_native_balance: Some("0.5".into()),
            await_native: None,
        },
    ]
}

impl Config {
    /// Built-in tables, replaced section by section by whatever the file defines.
    pub fn load(path: Option<&Path>) -> eyre::Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .wrap_err_with(|| format!("read {}", path.display()))?;
                toml::from_str(&raw).wrap_err_with(|| format!("parse {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        for chain in [self.source, self.intermediate] {
            self.endpoint(chain)?;
        }
        self.stable_token(self.intermediate)?;
        self.top_up_route()?;
        self.top_up_decimals()?;
        if let TopUpPolicy::Gated { floor } = &self.top_up {
            parse_amount(floor, self.endpoint(self.intermediate)?.native_decimals)?;
        }
        parse_amount(&self.forward.min_native_balance, 18)?;
        for route in &self.routes {
            let endpoint = self.endpoint(route.from)?;
            if let Some(min) = &route.min_native_balance {
                parse_amount(min, endpoint.native_decimals)?;
            }
            let (from, to) = (route.from, route.to);
            if route.gas_price_multiplier == 0 {
                bail!("route {from} -> {to}: gas_price_multiplier must be at least 1");
            }
            if let AdapterParams::Stargate { slippage, .. } = &route.adapter {
                if *slippage > 1000 {
                    bail!("route {from} -> {to}: slippage {slippage} exceeds 1000");
                }
            }
        }
        Ok(())
    }

    pub fn endpoint(&self, chain: Chain) -> eyre::Result<&ChainEndpoint> {
        self.chains
            .iter()
            .find(|c| c.chain == chain)
            .ok_or_else(|| eyre!("no endpoint configured for {chain}"))
    }

    pub fn stable_token(&self, chain: Chain) -> eyre::Result<&TokenDescriptor> {
        self.tokens
            .iter()
            .find(|t| t.chain == chain)
            .ok_or_else(|| eyre!("no stablecoin configured for {chain}"))
    }

    pub fn route_for(&self, key: RouteKey) -> eyre::Result<&BridgeRoute> {
        let (from, to, token) = key;
        self.routes
            .iter()
            .find(|r| r.key() == key)
            .ok_or_else(|| eyre!("no route from {from} to {to} for {token}"))
    }

    /// Route that buys the gas token, picked by `top_up_token`.
    pub fn top_up_route(&self) -> eyre::Result<&BridgeRoute> {
        self.route_for((self.source, self.intermediate, self.top_up_token))
    }

    pub fn token(&self, chain: Chain, address: Address) -> eyre::Result<&TokenDescriptor> {
        self.tokens
            .iter()
            .find(|t| t.chain == chain && t.address == address)
            .ok_or_else(|| eyre!("no token {address} configured for {chain}"))
    }

    /// Decimals of the sheet's `Amount` column, which is spent on the top-up.
    pub fn top_up_decimals(&self) -> eyre::Result<u8> {
        if is_native(self.top_up_token) {
            return Ok(self.endpoint(self.source)?.native_decimals);
        }
        Ok(self.token(self.source, self.top_up_token)?.decimals)
    }
}
