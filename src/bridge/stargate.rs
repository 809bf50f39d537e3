use std::sync::Arc;

use alloy::{
    network::TransactionBuilder,
    primitives::{address, Address, Bytes, U256},
    rpc::types::TransactionRequest,
    sol_types::SolCall,
};
use async_trait::async_trait;
use tracing::debug;

use super::{min_dest_amount, BridgeAdapter, QuoteRequest};
use crate::{
    bindings::StargateRouter,
    calls::{Call, Quote},
    chain::ChainClient,
    error::{Result, TransferError},
};

/// Placeholder recipient of the zero-value fee quote.
const PLACEHOLDER_ADDRESS: Address = address!("0000000000000000000000000000000000000001");

/// `TYPE_SWAP_REMOTE` in the Stargate router.
const FUNCTION_TYPE_SWAP: u8 = 1;

/// Calls a Stargate router directly with fixed pool routing.
pub struct StargateAdapter {
    pub(crate) chain: Arc<dyn ChainClient>,
    pub(crate) router: Address,
    pub(crate) dst_chain_id: u16,
    pub(crate) src_pool_id: u64,
    pub(crate) dst_pool_id: u64,
    pub(crate) slippage: u32,
    pub(crate) lz_tx_params: Bytes,
}

impl StargateAdapter {
    /// LayerZero messaging fee for a swap to the configured destination.
    pub async fn layer_zero_fee(&self) -> Result<U256> {
        let fee_call = StargateRouter::quoteLayerZeroFeeCall {
            dstChainId: self.dst_chain_id,
            functionType: FUNCTION_TYPE_SWAP,
            toAddress: PLACEHOLDER_ADDRESS.to_vec().into(),
            transferAndCallPayload: Bytes::new(),
            lzTxParams: StargateRouter::LzTxObj {
                dstGasForCall: U256::ZERO,
                dstNativeAmount: U256::ZERO,
                dstNativeAddr: PLACEHOLDER_ADDRESS.to_vec().into(),
            },
        };
        let request = TransactionRequest::default()
            .with_to(self.router)
            .with_input(fee_call.abi_encode());
        let output = self.chain.call(&request).await?;
        let fees = StargateRouter::quoteLayerZeroFeeCall::abi_decode_returns(&output, true)
            .map_err(|e| {
                TransferError::connectivity(
                    self.chain.endpoint().chain,
                    format!("quoteLayerZeroFee returned undecodable data: {e}"),
                )
            })?;
        Ok(fees._0)
    }

    pub fn swap_data(&self, request: &QuoteRequest, min_amount: U256) -> Bytes {
        StargateRouter::swapCall {
            dstChainId: self.dst_chain_id,
            srcPoolId: U256::from(self.src_pool_id),
            dstPoolId: U256::from(self.dst_pool_id),
            refundAddress: request.from,
            amountLD: request.amount,
            minAmountLD: min_amount,
            lzTxParams: self.lz_tx_params.clone(),
            to: request.to,
            payload: Bytes::new(),
        }
        .abi_encode()
        .into()
    }
}

#[async_trait]
impl BridgeAdapter for StargateAdapter {
    fn name(&self) -> &'static str {
        "stargate"
    }

    fn spender(&self) -> Address {
        self.router
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let fee = self.layer_zero_fee().await?;
        let min_amount = min_dest_amount(request.amount, self.slippage);
        debug!(
            %fee,
            amount = %request.amount,
            %min_amount,
            dst = self.dst_chain_id,
            "stargate quote"
        );
        Ok(Quote {
            call: Call::new(self.router, self.swap_data(request, min_amount)).with_value(fee),
            min_dest_amount: min_amount,
        })
    }
}
