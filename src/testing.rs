//! In-memory doubles for chain clients, adapters and time.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};

use alloy::{
    primitives::{keccak256, Address, Bytes, TxHash, U256},
    rpc::types::TransactionRequest,
    sol_types::{SolCall, SolValue},
};
use async_trait::async_trait;

use crate::{
    bindings::{Erc20, StargateRouter},
    bridge::{BridgeAdapter, QuoteRequest},
    calls::Quote,
    chain::{ChainClient, NonceTag, TransactionOutcome},
    config::{Chain, ChainEndpoint, Config},
    error::{Result, TransferError},
    retry::Clock,
    wallets::WalletKey,
};

pub const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub fn test_key() -> WalletKey {
    WalletKey::from_hex(TEST_KEY).unwrap()
}

pub fn test_endpoint(chain: Chain) -> ChainEndpoint {
    Config::default().endpoint(chain).unwrap().clone()
}

pub fn ether(units: u64) -> U256 {
    U256::from(units) * U256::from(10u64).pow(U256::from(18))
}

#[derive(Default)]
pub struct ManualClock {
    elapsed: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.elapsed.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptMode {
    Success,
    Revert,
    Never,
}

#[derive(Default)]
struct FakeState {
    balances: HashMap<Address, U256>,
    balance_script: HashMap<Address, VecDeque<U256>>,
    token_balances: HashMap<(Address, Address), U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    layer_zero_fee: U256,
    gas_price: u128,
    estimate: Option<u64>,
    nonce: u64,
    receipt_modes: VecDeque<ReceiptMode>,
    receipts: HashMap<TxHash, ReceiptMode>,
    submitted: Vec<Bytes>,
    calls: Vec<Bytes>,
    estimates: Vec<TransactionRequest>,
    replays: Vec<TransactionRequest>,
    offline: bool,
    receipt_error: bool,
    failing_receipts: u32,
}

/// Scriptable chain. Everything defaults to zero balances, successful
/// estimates of 50_000 gas and receipts that mine on first lookup.
pub struct FakeChain {
    endpoint: ChainEndpoint,
    state: Mutex<FakeState>,
}

impl FakeChain {
    pub fn new(endpoint: ChainEndpoint) -> Self {
        let state = FakeState {
            gas_price: 1_000_000_000,
            estimate: Some(50_000),
            ..FakeState::default()
        };
        Self {
            endpoint,
            state: Mutex::new(state),
        }
    }

    pub fn set_balance(&self, owner: Address, amount: U256) {
        self.state.lock().unwrap().balances.insert(owner, amount);
    }

    /// Balances returned by successive lookups before falling back to `set_balance`.
    pub fn script_balances(&self, owner: Address, amounts: impl IntoIterator<Item = U256>) {
        self.state
            .lock()
            .unwrap()
            .balance_script
            .insert(owner, amounts.into_iter().collect());
    }

    pub fn set_token_balance(&self, token: Address, owner: Address, amount: U256) {
        self.state
            .lock()
            .unwrap()
            .token_balances
            .insert((token, owner), amount);
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.state
            .lock()
            .unwrap()
            .allowances
            .insert((token, owner, spender), amount);
    }

    pub fn set_layer_zero_fee(&self, fee: U256) {
        self.state.lock().unwrap().layer_zero_fee = fee;
    }

    pub fn set_gas_price(&self, gas_price: u128) {
        self.state.lock().unwrap().gas_price = gas_price;
    }

    /// `None` makes every estimate revert.
    pub fn set_estimate(&self, estimate: Option<u64>) {
        self.state.lock().unwrap().estimate = estimate;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Every receipt lookup fails while set, as an overloaded node would.
    pub fn set_receipt_error(&self, failing: bool) {
        self.state.lock().unwrap().receipt_error = failing;
    }

    /// The next `count` receipt lookups fail.
    pub fn fail_next_receipts(&self, count: u32) {
        self.state.lock().unwrap().failing_receipts = count;
    }

    /// Receipt behaviour of the next submissions, in order.
    pub fn push_receipt_mode(&self, mode: ReceiptMode) {
        self.state.lock().unwrap().receipt_modes.push_back(mode);
    }

    pub fn submitted(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().submitted.clone()
    }

    /// Call data of every `eth_call` made so far.
    pub fn calls(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn estimates(&self) -> Vec<TransactionRequest> {
        self.state.lock().unwrap().estimates.clone()
    }

    /// Requests replayed to recover revert reasons.
    pub fn replays(&self) -> Vec<TransactionRequest> {
        self.state.lock().unwrap().replays.clone()
    }

    fn check_online(&self) -> Result<()> {
        if self.state.lock().unwrap().offline {
            let chain = self.endpoint.chain;
            return Err(TransferError::connectivity(chain, "connection refused"));
        }
        Ok(())
    }
}

fn input_of(tx: &TransactionRequest) -> Bytes {
    tx.input.input().cloned().unwrap_or_default()
}

fn target_of(tx: &TransactionRequest) -> Address {
    tx.to.and_then(|kind| kind.to().copied()).unwrap_or_default()
}

#[async_trait]
impl ChainClient for FakeChain {
    fn endpoint(&self) -> &ChainEndpoint {
        &self.endpoint
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        if let Some(next) = state
            .balance_script
            .get_mut(&address)
            .and_then(VecDeque::pop_front)
        {
            return Ok(next);
        }
        Ok(state.balances.get(&address).copied().unwrap_or_default())
    }

    async fn nonce(&self, _address: Address, tag: NonceTag) -> Result<u64> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        let unmined = state
            .receipts
            .values()
            .filter(|mode| **mode == ReceiptMode::Never)
            .count() as u64;
        Ok(match tag {
            NonceTag::Pending => state.nonce,
            NonceTag::Latest => state.nonce - unmined,
        })
    }

    async fn gas_price(&self) -> Result<u128> {
        self.check_online()?;
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        state.estimates.push(tx.clone());
        state
            .estimate
            .ok_or_else(|| TransferError::Estimation("execution reverted".into()))
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes> {
        self.check_online()?;
        let input = input_of(tx);
        let target = target_of(tx);
        let mut state = self.state.lock().unwrap();
        state.calls.push(input.clone());

        if let Ok(call) = Erc20::balanceOfCall::abi_decode(&input, true) {
            let balance = state
                .token_balances
                .get(&(target, call.account))
                .copied()
                .unwrap_or_default();
            return Ok(balance.abi_encode().into());
        }
        if let Ok(call) = Erc20::allowanceCall::abi_decode(&input, true) {
            let allowance = state
                .allowances
                .get(&(target, call.owner, call.spender))
                .copied()
                .unwrap_or_default();
            return Ok(allowance.abi_encode().into());
        }
        if StargateRouter::quoteLayerZeroFeeCall::abi_decode(&input, true).is_ok() {
            return Ok((state.layer_zero_fee, U256::ZERO).abi_encode_params().into());
        }
        Err(TransferError::connectivity(
            self.endpoint.chain,
            "unexpected eth_call",
        ))
    }

    async fn submit_raw(&self, raw: Bytes) -> Result<TxHash> {
        self.check_online()?;
        let hash = keccak256(&raw);
        let mut state = self.state.lock().unwrap();
        let mode = state.receipt_modes.pop_front().unwrap_or(ReceiptMode::Success);
        state.receipts.insert(hash, mode);
        state.submitted.push(raw);
        state.nonce += 1;
        Ok(hash)
    }

    async fn receipt(&self, hash: TxHash) -> Result<Option<TransactionOutcome>> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        if state.receipt_error {
            return Err(TransferError::connectivity(self.endpoint.chain, "502 bad gateway"));
        }
        if state.failing_receipts > 0 {
            state.failing_receipts -= 1;
            return Err(TransferError::connectivity(self.endpoint.chain, "502 bad gateway"));
        }
        let success = match state.receipts.get(&hash) {
            None | Some(ReceiptMode::Never) => return Ok(None),
            Some(mode) => *mode == ReceiptMode::Success,
        };
        Ok(Some(TransactionOutcome {
            hash,
            success,
            gas_used: 45_000,
            block_number: Some(1_000),
            failure_reason: None,
        }))
    }

    async fn revert_reason(&self, tx: &TransactionRequest, _block: u64) -> Option<String> {
        self.state.lock().unwrap().replays.push(tx.clone());
        Some("execution reverted: Stargate: slippage too high".into())
    }
}

/// Adapter returning a canned quote and recording what it was asked.
pub struct FixedQuoteAdapter {
    pub spender: Address,
    pub quote: Result<Quote>,
    requests: Mutex<Vec<QuoteRequest>>,
}

impl FixedQuoteAdapter {
    pub fn new(spender: Address, quote: Result<Quote>) -> Self {
        Self {
            spender,
            quote,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<QuoteRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BridgeAdapter for FixedQuoteAdapter {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn spender(&self) -> Address {
        self.spender
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        self.requests.lock().unwrap().push(request.clone());
        self.quote.clone()
    }
}
