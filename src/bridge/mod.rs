//! Bridge adapters: turn a hop request into the call that performs it.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use crate::{
    calls::Quote,
    chain::ChainClient,
    config::{AdapterParams, BridgeRoute},
    error::Result,
};

mod lifi;
mod stargate;

pub use lifi::LifiAdapter;
pub use stargate::StargateAdapter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub source_chain_id: u64,
    pub destination_chain_id: u64,
    pub source_token: Address,
    pub destination_token: Address,
    pub amount: U256,
    pub from: Address,
    pub to: Address,
}

#[async_trait]
pub trait BridgeAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Contract that pulls ERC-20 source tokens and therefore needs the allowance.
    fn spender(&self) -> Address;

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote>;
}

/// `amount` minus `slippage` thousandths of it, rounded down as the router does.
pub fn min_dest_amount(amount: U256, slippage: u32) -> U256 {
    amount - amount * U256::from(slippage) / U256::from(1000)
}

/// Builds the adapter a route's parameters call for.
pub fn for_route(
    route: &BridgeRoute,
    source: Arc<dyn ChainClient>,
    http: reqwest::Client,
) -> Arc<dyn BridgeAdapter> {
    match &route.adapter {
        AdapterParams::Lifi {
            api_url,
            diamond,
            bridges,
        } => Arc::new(LifiAdapter::new(http, api_url, *diamond, bridges.clone())),
        AdapterParams::Stargate {
            router,
            dst_chain_id,
            src_pool_id,
            dst_pool_id,
            slippage,
            lz_tx_params,
        } => Arc::new(StargateAdapter {
            chain: source,
            router: *router,
            dst_chain_id: *dst_chain_id,
            src_pool_id: *src_pool_id,
            dst_pool_id: *dst_pool_id,
            slippage: *slippage,
            lz_tx_params: lz_tx_params.clone(),
        }),
    }
}
