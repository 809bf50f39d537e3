use alloy::primitives::{Address, Bytes, U256};

/// A contract call to be wrapped into a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub target: Address,
    pub data: Bytes,
    pub value: U256,
}

impl Call {
    pub fn new(target: Address, data: impl Into<Bytes>) -> Self {
        Self {
            target,
            data: data.into(),
            value: U256::ZERO,
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }
}

/// What a bridge adapter hands back for one hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub call: Call,
    /// Smallest amount the destination may receive before the bridge reverts.
    pub min_dest_amount: U256,
}
