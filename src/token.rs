use std::sync::Arc;

use alloy::{
    network::TransactionBuilder,
    primitives::{Address, Bytes, U256},
    rpc::types::TransactionRequest,
    sol_types::SolCall,
};

use crate::{
    bindings::Erc20,
    chain::ChainClient,
    error::{Result, TransferError},
};

/// ERC-20 reads over a [`ChainClient`], plus call data for writes.
pub struct TokenClient {
    chain: Arc<dyn ChainClient>,
    address: Address,
}

impl TokenClient {
    pub fn new(chain: Arc<dyn ChainClient>, address: Address) -> Self {
        Self { chain, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub async fn balance_of(&self, owner: Address) -> Result<U256> {
        let output = self.view(Erc20::balanceOfCall { account: owner }).await?;
        let decoded = Erc20::balanceOfCall::abi_decode_returns(&output, true)
            .map_err(|e| self.decode_error("balanceOf", e))?;
        Ok(decoded._0)
    }

    pub async fn allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        let output = self.view(Erc20::allowanceCall { owner, spender }).await?;
        let decoded = Erc20::allowanceCall::abi_decode_returns(&output, true)
            .map_err(|e| self.decode_error("allowance", e))?;
        Ok(decoded._0)
    }

    pub fn approve_data(&self, spender: Address, amount: U256) -> Bytes {
        Erc20::approveCall { spender, amount }.abi_encode().into()
    }

    pub fn transfer_data(&self, to: Address, amount: U256) -> Bytes {
        Erc20::transferCall { to, amount }.abi_encode().into()
    }

    async fn view(&self, call: impl SolCall) -> Result<Bytes> {
        let request = TransactionRequest::default()
            .with_to(self.address)
            .with_input(call.abi_encode());
        self.chain.call(&request).await
    }

    fn decode_error(&self, function: &str, err: alloy::sol_types::Error) -> TransferError {
        TransferError::connectivity(
            self.chain.endpoint().chain,
            format!("{function} on {} returned undecodable data: {err}", self.address),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Chain,
        testing::{test_endpoint, FakeChain},
    };

    const TOKEN: Address = Address::repeat_byte(0x28);

    #[tokio::test]
    async fn reads_balance_and_allowance() {
        let chain = Arc::new(FakeChain::new(test_endpoint(Chain::Fantom)));
        let owner = Address::repeat_byte(0x01);
        let spender = Address::repeat_byte(0x02);
        chain.set_token_balance(TOKEN, owner, U256::from(1_500_000));
        chain.set_allowance(TOKEN, owner, spender, U256::from(42));

        let token = TokenClient::new(chain.clone(), TOKEN);
        assert_eq!(token.balance_of(owner).await.unwrap(), U256::from(1_500_000));
        assert_eq!(token.allowance(owner, spender).await.unwrap(), U256::from(42));
        assert_eq!(token.allowance(spender, owner).await.unwrap(), U256::ZERO);
    }

    #[test]
    fn write_calls_carry_selectors() {
        let chain = Arc::new(FakeChain::new(test_endpoint(Chain::Fantom)));
        let token = TokenClient::new(chain, TOKEN);
        let approve = token.approve_data(Address::repeat_byte(0x02), U256::from(9));
        assert_eq!(&approve[..4], &Erc20::approveCall::SELECTOR);
        assert_eq!(approve.len(), 4 + 64);

        let transfer = token.transfer_data(Address::repeat_byte(0x03), U256::from(9));
        let decoded = Erc20::transferCall::abi_decode(&transfer, true).unwrap();
        assert_eq!(decoded.to, Address::repeat_byte(0x03));
        assert_eq!(decoded.amount, U256::from(9));
    }
}
