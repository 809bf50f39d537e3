use std::{marker::PhantomData, time::Duration};

use alloy::{
    eips::{eip2718::Encodable2718, BlockId},
    network::{Ethereum, EthereumWallet, TransactionBuilder},
    primitives::{Address, Bytes, TxHash, U256},
    providers::{Provider, RootProvider},
    rpc::types::TransactionRequest,
    signers::local::PrivateKeySigner,
    transports::{
        http::{Client, Http},
        Transport, TransportError,
    },
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{
    config::{Chain, ChainEndpoint},
    error::{Result, TransferError},
    retry::Clock,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceTag {
    Pending,
    Latest,
}

/// Fully specified legacy transaction, ready to sign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub value: U256,
    pub data: Bytes,
    pub chain_id: u64,
}

impl PendingTransaction {
    /// Request without a gas limit, for estimation and replay.
    pub fn request(&self) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(self.from)
            .with_to(self.to)
            .with_value(self.value)
            .with_input(self.data.clone())
            .with_nonce(self.nonce)
            .with_chain_id(self.chain_id)
            .with_gas_price(self.gas_price)
    }

    /// The request as signed, gas limit included. Also what `eth_call` replays.
    pub fn replay(&self) -> TransactionRequest {
        self.request().with_gas_limit(self.gas_limit)
    }

    pub fn gas_cost(&self) -> U256 {
        gas_cost(self.gas_price, self.gas_limit)
    }

    /// Signs with `signer` and returns the hash with the EIP-2718 bytes.
    pub async fn sign(&self, signer: &PrivateKeySigner) -> Result<(TxHash, Bytes)> {
        let wallet = EthereumWallet::from(signer.clone());
        let envelope = self
            .replay()
            .build(&wallet)
            .await
            .map_err(|e| TransferError::Signing(e.to_string()))?;
        let hash = *envelope.tx_hash();
        Ok((hash, envelope.encoded_2718().into()))
    }
}

pub fn gas_cost(gas_price: u128, gas_limit: u64) -> U256 {
    U256::from(gas_price) * U256::from(gas_limit)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub hash: TxHash,
    pub success: bool,
    pub gas_used: u64,
    pub block_number: Option<u64>,
    pub failure_reason: Option<String>,
}

/// JSON-RPC surface the transfer lifecycle needs from one chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn endpoint(&self) -> &ChainEndpoint;

    async fn balance(&self, address: Address) -> Result<U256>;

    async fn nonce(&self, address: Address, tag: NonceTag) -> Result<u64>;

    async fn gas_price(&self) -> Result<u128>;

    /// Fails with [`TransferError::Estimation`] when the call would revert.
    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64>;

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes>;

    /// Broadcasts once. Callers must not resubmit a returned hash.
    async fn submit_raw(&self, raw: Bytes) -> Result<TxHash>;

    async fn receipt(&self, hash: TxHash) -> Result<Option<TransactionOutcome>>;

    /// Replays a mined transaction as a call at its block to recover the revert message.
    async fn revert_reason(&self, tx: &TransactionRequest, block: u64) -> Option<String>;
}

/// Polls for the receipt of `hash` until `timeout` passes.
///
/// Lookup errors count as "not yet": once a hash is out, only the deadline ends the wait.
pub async fn wait_for_receipt(
    client: &dyn ChainClient,
    hash: TxHash,
    timeout: Duration,
    poll_interval: Duration,
    clock: &dyn Clock,
) -> Result<TransactionOutcome> {
    let deadline = clock.now() + timeout;
    loop {
        match client.receipt(hash).await {
            Ok(Some(outcome)) => return Ok(outcome),
            Ok(None) => {}
            Err(err) => warn!(%hash, %err, "receipt lookup failed"),
        }
        let now = clock.now();
        if now >= deadline {
            return Err(TransferError::Timeout {
                hash,
                waited: timeout,
            });
        }
        clock.sleep(poll_interval.min(deadline - now)).await;
    }
}

pub struct RpcChainClient<P, T> {
    endpoint: ChainEndpoint,
    provider: P,
    _phantom: PhantomData<fn() -> T>,
}

impl RpcChainClient<RootProvider<Http<Client>>, Http<Client>> {
    pub fn http(endpoint: ChainEndpoint) -> eyre::Result<Self> {
        let url = url::Url::parse(&endpoint.rpc_url)?;
        let provider = RootProvider::new_http(url);
        Ok(Self::new(endpoint, provider))
    }
}

impl<P, T> RpcChainClient<P, T>
where
    P: Provider<T, Ethereum>,
    T: Transport + Clone,
{
    pub fn new(endpoint: ChainEndpoint, provider: P) -> Self {
        Self {
            endpoint,
            provider,
            _phantom: PhantomData,
        }
    }

    fn chain(&self) -> Chain {
        self.endpoint.chain
    }

    fn offline(&self, err: TransportError) -> TransferError {
        TransferError::connectivity(self.chain(), err)
    }
}

#[async_trait]
impl<P, T> ChainClient for RpcChainClient<P, T>
where
    P: Provider<T, Ethereum> + Send + Sync,
    T: Transport + Clone,
{
    fn endpoint(&self) -> &ChainEndpoint {
        &self.endpoint
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(|e| self.offline(e))
    }

    async fn nonce(&self, address: Address, tag: NonceTag) -> Result<u64> {
        let request = self.provider.get_transaction_count(address);
        let request = match tag {
            NonceTag::Pending => request.pending(),
            NonceTag::Latest => request.latest(),
        };
        request.await.map_err(|e| self.offline(e))
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| self.offline(e))
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        self.provider.estimate_gas(tx).await.map_err(|e| {
            // a JSON-RPC error response means the node executed the call and it reverted
            match e.as_error_resp() {
                Some(payload) => TransferError::Estimation(payload.message.to_string()),
                None => self.offline(e),
            }
        })
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes> {
        self.provider.call(tx).await.map_err(|e| self.offline(e))
    }

    async fn submit_raw(&self, raw: Bytes) -> Result<TxHash> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| self.offline(e))?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<TransactionOutcome>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| self.offline(e))?;
        Ok(receipt.map(|receipt| TransactionOutcome {
            hash,
            success: receipt.status(),
            gas_used: receipt.gas_used as u64,
            block_number: receipt.block_number,
            failure_reason: None,
        }))
    }

    async fn revert_reason(&self, tx: &TransactionRequest, block: u64) -> Option<String> {
        match self.provider.call(tx).block(BlockId::number(block)).await {
            Ok(output) => {
                debug!(chain = %self.chain(), block, %output, "replay did not revert");
                None
            }
            Err(e) => Some(match e.as_error_resp() {
                Some(payload) => payload.message.to_string(),
                None => e.to_string(),
            }),
        }
    }
}
