//! Per-wallet transfer lifecycle.
//!
//! One [`Orchestrator`] serves the whole batch. Each job walks
//! `Init → CheckStableBalance → CheckNativeBalance → (TopUpNative) → (AwaitNative)
//! → (Approve) → BridgeSwap → AwaitReceipt` and ends in a [`JobOutcome`].

use std::{collections::HashMap, sync::Arc, time::Duration};

use alloy::primitives::{Address, TxHash, U256};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    bridge::{self, BridgeAdapter, QuoteRequest},
    calls::Call,
    chain::{
        gas_cost, wait_for_receipt, ChainClient, NonceTag, PendingTransaction, RpcChainClient,
        TransactionOutcome,
    },
    config::{
        parse_amount, BridgeRoute, Chain, Config, RouteKey, TopUpPolicy, NATIVE_TOKEN_SENTINEL,
    },
    error::{Result, TransferError},
    retry::{self, Clock, TokioClock},
    token::TokenClient,
    wallets::WalletJob,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Init,
    CheckStableBalance,
    CheckNativeBalance,
    TopUpNative,
    AwaitNative,
    Approve,
    BridgeSwap,
    AwaitReceipt,
    Forward,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub state: JobState,
    pub hash: TxHash,
    pub tx: PendingTransaction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done { tx: TxHash },
    /// Nothing to move. Not an error, and nothing was submitted for it.
    NothingToDo { reason: String },
    /// Submitted but unconfirmed. Check the hash before rerunning the wallet.
    Indeterminate { hash: TxHash },
    Failed(TransferError),
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub row: usize,
    pub wallet: Address,
    pub states: Vec<JobState>,
    pub submitted: Vec<Submission>,
    pub outcome: JobOutcome,
}

enum Finish {
    Done(TxHash),
    NothingToDo(String),
}

#[derive(Default)]
struct Trace {
    states: Vec<JobState>,
    submitted: Vec<Submission>,
}

impl Trace {
    fn enter(&mut self, state: JobState) {
        debug!(?state, "enter");
        self.states.push(state);
    }
}

pub struct Orchestrator {
    config: Config,
    chains: HashMap<Chain, Arc<dyn ChainClient>>,
    adapters: HashMap<RouteKey, Arc<dyn BridgeAdapter>>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        chains: HashMap<Chain, Arc<dyn ChainClient>>,
        adapters: HashMap<RouteKey, Arc<dyn BridgeAdapter>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            chains,
            adapters,
            clock,
        }
    }

    /// Connects one HTTP client per configured chain and one adapter per route.
    pub fn from_config(config: Config) -> eyre::Result<Self> {
        let mut chains: HashMap<Chain, Arc<dyn ChainClient>> = HashMap::new();
        for endpoint in &config.chains {
            let client = RpcChainClient::http(endpoint.clone())?;
            chains.insert(endpoint.chain, Arc::new(client));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let mut adapters = HashMap::new();
        for route in &config.routes {
            let source = chains.get(&route.from).cloned().ok_or_else(|| {
                eyre::eyre!("route {} -> {} has no {} endpoint", route.from, route.to, route.from)
            })?;
            adapters.insert(route.key(), bridge::for_route(route, source, http.clone()));
        }

        Ok(Self::new(config, chains, adapters, Arc::new(TokioClock::new())))
    }

    /// Bridges the wallet's stablecoin to its destination chain, topping up gas first if needed.
    pub async fn run(&self, job: &WalletJob) -> JobReport {
        let span = info_span!("bridge", row = job.row, wallet = %job.key.address());
        let mut trace = Trace::default();
        let result = self.bridge(job, &mut trace).instrument(span).await;
        self.report(job, trace, result)
    }

    /// Sends the destination-chain stablecoin balance to the row's destination address.
    pub async fn forward(&self, job: &WalletJob) -> JobReport {
        let span = info_span!("forward", row = job.row, wallet = %job.key.address());
        let mut trace = Trace::default();
        let result = self.forward_balance(job, &mut trace).instrument(span).await;
        self.report(job, trace, result)
    }

    fn report(&self, job: &WalletJob, mut trace: Trace, result: Result<Finish>) -> JobReport {
        let outcome = match result {
            Ok(Finish::Done(tx)) => {
                trace.enter(JobState::Done);
                JobOutcome::Done { tx }
            }
            Ok(Finish::NothingToDo(reason)) => {
                trace.enter(JobState::Failed);
                JobOutcome::NothingToDo { reason }
            }
            Err(TransferError::Timeout { hash, .. }) => JobOutcome::Indeterminate { hash },
            Err(err) => {
                trace.enter(JobState::Failed);
                JobOutcome::Failed(err)
            }
        };
        JobReport {
            row: job.row,
            wallet: job.key.address(),
            states: trace.states,
            submitted: trace.submitted,
            outcome,
        }
    }

    async fn bridge(&self, job: &WalletJob, trace: &mut Trace) -> Result<Finish> {
        let wallet = job.key.address();
        let intermediate = self.config.intermediate;
        let stable = self.config.stable_token(intermediate).map_err(config_error)?;
        let route = self.route((intermediate, job.destination.chain(), stable.address))?;
        let client = self.client(intermediate)?;
        let endpoint = client.endpoint();
        trace.enter(JobState::Init);

        trace.enter(JobState::CheckStableBalance);
        let stable_balance = TokenClient::new(client.clone(), stable.address)
            .balance_of(wallet)
            .await?;
        if stable_balance.is_zero() {
            let reason = format!("no {} on {intermediate}", stable.symbol);
            return Ok(Finish::NothingToDo(reason));
        }
        info!(balance = %stable.format(stable_balance), "stable balance");

        trace.enter(JobState::CheckNativeBalance);
        let native = client.balance(wallet).await?;
        let top_up = match &self.config.top_up {
            TopUpPolicy::Always => true,
            TopUpPolicy::Never => false,
            TopUpPolicy::Gated { floor } => {
                native < parse_amount(floor, endpoint.native_decimals).map_err(config_error)?
            }
        };
        info!(balance = %endpoint.format_native(native), top_up, "native balance");

        if top_up {
            trace.enter(JobState::TopUpNative);
            let source = self.config.source;
            let top_up_route = self.route((source, intermediate, self.config.top_up_token))?;
            self.hop(job, top_up_route, job.amount, wallet, trace).await?;
        }

        if let Some(policy) = &route.await_native {
            trace.enter(JobState::AwaitNative);
            let arrived = retry::poll(policy, self.clock.as_ref(), |attempt| {
                let client = client.clone();
                async move {
                    let balance = client.balance(wallet).await?;
                    debug!(attempt, %balance, "waiting for native balance");
                    Ok::<_, TransferError>((!balance.is_zero()).then_some(balance))
                }
            })
            .await?;
            if arrived.is_none() {
                let symbol = endpoint.native_symbol.clone();
                return Err(TransferError::insufficient(symbol, U256::from(1), U256::ZERO));
            }
        }

        let hash = self.hop(job, route, stable_balance, wallet, trace).await?;
        Ok(Finish::Done(hash))
    }

    /// Moves `amount` of the route's source token to `to` on the route's destination chain.
    ///
    /// Returns the hash of the bridge transaction once it has mined successfully.
    async fn hop(
        &self,
        job: &WalletJob,
        route: &BridgeRoute,
        amount: U256,
        to: Address,
        trace: &mut Trace,
    ) -> Result<TxHash> {
        let wallet = job.key.address();
        let client = self.client(route.from)?;
        let endpoint = client.endpoint();
        let adapter = self
            .adapters
            .get(&route.key())
            .ok_or(TransferError::UnknownRoute {
                from: route.from,
                to: route.to,
            })?;
        let destination = self.config.endpoint(route.to).map_err(config_error)?;

        if let Some(min) = &route.min_native_balance {
            let required = parse_amount(min, endpoint.native_decimals).map_err(config_error)?;
            let available = client.balance(wallet).await?;
            if available < required {
                let symbol = endpoint.native_symbol.clone();
                return Err(TransferError::insufficient(symbol, required, available));
            }
        }

        let gas_price = client
            .gas_price()
            .await?
            .saturating_mul(u128::from(route.gas_price_multiplier));
        debug!(
            adapter = adapter.name(),
            from = %route.from,
            to = %route.to,
            %amount,
            gas_price,
            "hop"
        );

        let mut approve_gas = 0;
        if !route.source_is_native() {
            let token = TokenClient::new(client.clone(), route.source_token);
            let allowance = token.allowance(wallet, adapter.spender()).await?;
            if allowance < amount {
                trace.enter(JobState::Approve);
                let data = token.approve_data(adapter.spender(), amount);
                let call = Call::new(token.address(), data);
                let fallback_gas = self.config.approve.fallback_gas;
                let tx = self
                    .prepare(client.as_ref(), wallet, call, gas_price, fallback_gas)
                    .await?;
                let available = client.balance(wallet).await?;
                ensure_covers(&endpoint.native_symbol, available, U256::ZERO, tx.gas_cost())?;
                let hash = self
                    .submit(trace, JobState::Approve, client.as_ref(), job, &tx)
                    .await?;
                let outcome = self
                    .confirm(client.as_ref(), &tx, hash, route.receipt_timeout())
                    .await?;
                if !outcome.success {
                    return Err(TransferError::ApprovalFailed {
                        hash,
                        reason: outcome.failure_reason,
                    });
                }
                approve_gas = tx.gas_limit;
                info!(%hash, "approved");
                self.clock
                    .sleep(Duration::from_secs(self.config.approve.settle_delay_secs))
                    .await;
            } else {
                debug!(%allowance, "allowance sufficient");
            }
        }

        trace.enter(JobState::BridgeSwap);
        let quote = adapter
            .quote(&QuoteRequest {
                source_chain_id: endpoint.chain_id,
                destination_chain_id: destination.chain_id,
                source_token: if route.source_is_native() {
                    NATIVE_TOKEN_SENTINEL
                } else {
                    route.source_token
                },
                destination_token: route.destination_token,
                amount,
                from: wallet,
                to,
            })
            .await?;

        let available = client.balance(wallet).await?;
        if route.source_is_native() {
            if available < amount {
                let symbol = endpoint.native_symbol.clone();
                return Err(TransferError::insufficient(symbol, amount, available));
            }
        } else {
            let token = TokenClient::new(client.clone(), route.source_token);
            let held = token.balance_of(wallet).await?;
            if held < amount {
                let asset = match self.config.token(route.from, route.source_token) {
                    Ok(descriptor) => descriptor.symbol.clone(),
                    Err(_) => route.source_token.to_string(),
                };
                return Err(TransferError::insufficient(asset, amount, held));
            }
        }

        let tx = self
            .prepare(client.as_ref(), wallet, quote.call, gas_price, route.fallback_gas)
            .await?;
        let gas = gas_cost(gas_price, approve_gas.saturating_add(tx.gas_limit));
        ensure_covers(&endpoint.native_symbol, available, tx.value, gas)?;
        let hash = self
            .submit(trace, JobState::BridgeSwap, client.as_ref(), job, &tx)
            .await?;

        trace.enter(JobState::AwaitReceipt);
        if !route.receipt_delay().is_zero() {
            self.clock.sleep(route.receipt_delay()).await;
        }
        let outcome = self
            .confirm(client.as_ref(), &tx, hash, route.receipt_timeout())
            .await?;
        if !outcome.success {
            return Err(TransferError::SwapFailed {
                hash,
                reason: outcome.failure_reason,
            });
        }
        info!(
            %hash,
            gas_used = outcome.gas_used,
            url = %endpoint.tx_url(hash),
            "hop confirmed"
        );
        Ok(hash)
    }

    async fn forward_balance(&self, job: &WalletJob, trace: &mut Trace) -> Result<Finish> {
        let wallet = job.key.address();
        let chain = job.destination.chain();
        let client = self.client(chain)?;
        let endpoint = client.endpoint();
        let policy = &self.config.forward;
        trace.enter(JobState::Init);

        trace.enter(JobState::CheckNativeBalance);
        let floor = parse_amount(&policy.min_native_balance, endpoint.native_decimals)
            .map_err(config_error)?;
        let native = client.balance(wallet).await?;
        if native < floor {
            let symbol = endpoint.native_symbol.clone();
            return Err(TransferError::insufficient(symbol, floor, native));
        }

        trace.enter(JobState::CheckStableBalance);
        let stable = self.config.stable_token(chain).map_err(config_error)?;
        let token = TokenClient::new(client.clone(), stable.address);
        let balance = token.balance_of(wallet).await?;
        if balance.is_zero() {
            return Ok(Finish::NothingToDo(format!("no {} on {chain}", stable.symbol)));
        }

        trace.enter(JobState::Forward);
        let gas_price = client
            .gas_price()
            .await?
            .saturating_mul(u128::from(policy.gas_price_multiplier));
        let call = Call::new(token.address(), token.transfer_data(job.recipient, balance));
        let tx = self
            .prepare(client.as_ref(), wallet, call, gas_price, policy.fallback_gas)
            .await?;
        ensure_covers(&endpoint.native_symbol, native, U256::ZERO, tx.gas_cost())?;
        let hash = self
            .submit(trace, JobState::Forward, client.as_ref(), job, &tx)
            .await?;

        trace.enter(JobState::AwaitReceipt);
        let timeout = Duration::from_secs(policy.receipt_timeout_secs);
        let outcome = self.confirm(client.as_ref(), &tx, hash, timeout).await?;
        if !outcome.success {
            return Err(TransferError::TransferFailed {
                hash,
                reason: outcome.failure_reason,
            });
        }
        info!(%hash, amount = %stable.format(balance), to = %job.recipient, "forwarded");
        Ok(Finish::Done(hash))
    }

    /// Fills nonce and gas limit for `call`, estimating against the node.
    async fn prepare(
        &self,
        client: &dyn ChainClient,
        from: Address,
        call: Call,
        gas_price: u128,
        fallback_gas: u64,
    ) -> Result<PendingTransaction> {
        let nonce = client.nonce(from, NonceTag::Pending).await?;
        let mined = client.nonce(from, NonceTag::Latest).await?;
        if nonce > mined {
            warn!(nonce, mined, "earlier transactions still pending, queueing behind them");
        }
        let mut tx = PendingTransaction {
            from,
            to: call.target,
            nonce,
            gas_price,
            gas_limit: 0,
            value: call.value,
            data: call.data,
            chain_id: client.endpoint().chain_id,
        };
        tx.gas_limit = match client.estimate_gas(&tx.request()).await {
            Ok(estimate) => estimate.saturating_mul(12) / 10,
            Err(TransferError::Estimation(reason)) => {
                warn!(%reason, fallback_gas, "estimation reverted, using fallback gas");
                fallback_gas
            }
            Err(err) => return Err(err),
        };
        Ok(tx)
    }

    async fn submit(
        &self,
        trace: &mut Trace,
        state: JobState,
        client: &dyn ChainClient,
        job: &WalletJob,
        tx: &PendingTransaction,
    ) -> Result<TxHash> {
        let (signed_hash, raw) = tx.sign(job.key.signer()).await?;
        let hash = client.submit_raw(raw).await?;
        if hash != signed_hash {
            warn!(%hash, %signed_hash, "node reported a different hash");
        }
        info!(?state, %hash, nonce = tx.nonce, gas = tx.gas_limit, "submitted");
        trace.submitted.push(Submission {
            state,
            hash,
            tx: tx.clone(),
        });
        Ok(hash)
    }

    /// Waits for the receipt; a revert gets its reason by replaying `tx` at the mined block.
    async fn confirm(
        &self,
        client: &dyn ChainClient,
        tx: &PendingTransaction,
        hash: TxHash,
        timeout: Duration,
    ) -> Result<TransactionOutcome> {
        let poll_interval = Duration::from_millis(self.config.receipt_poll_interval_ms);
        let mut outcome =
            wait_for_receipt(client, hash, timeout, poll_interval, self.clock.as_ref()).await?;
        if !outcome.success {
            if let Some(block) = outcome.block_number {
                outcome.failure_reason = client.revert_reason(&tx.replay(), block).await;
            }
            warn!(%hash, reason = ?outcome.failure_reason, "reverted");
        }
        Ok(outcome)
    }

    fn client(&self, chain: Chain) -> Result<&Arc<dyn ChainClient>> {
        self.chains
            .get(&chain)
            .ok_or_else(|| TransferError::Config(format!("no client for {chain}")))
    }

    fn route(&self, key: RouteKey) -> Result<&BridgeRoute> {
        let (from, to, _) = key;
        self.config
            .route_for(key)
            .map_err(|_| TransferError::UnknownRoute { from, to })
    }
}

fn config_error(err: eyre::Report) -> TransferError {
    TransferError::Config(err.to_string())
}

/// Fails unless `available` pays for `value` plus `gas`, the worst-case gas cost.
fn ensure_covers(asset: &str, available: U256, value: U256, gas: U256) -> Result<()> {
    let required = value.saturating_add(gas);
    if available < required {
        return Err(TransferError::insufficient(asset, required, available));
    }
    Ok(())
}
