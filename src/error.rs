use std::time::Duration;

use alloy::primitives::{TxHash, U256};
use thiserror::Error;

use crate::config::Chain;

/// Failure kinds of a single wallet job.
///
/// Every variant is caught at the per-wallet boundary; none of them stops the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("rpc unreachable on {chain}: {message}")]
    Connectivity { chain: Chain, message: String },

    #[error("insufficient {asset}: required {required}, available {available}")]
    InsufficientFunds {
        asset: String,
        required: U256,
        available: U256,
    },

    /// Gas estimation reverted. Recovered locally with a fallback limit.
    #[error("gas estimation reverted: {0}")]
    Estimation(String),

    #[error("quote unavailable (status {status}): {body}")]
    QuoteUnavailable { status: u16, body: String },

    #[error("malformed quote: {0}")]
    InvalidQuote(String),

    #[error("approve {hash} reverted: {}", .reason.as_deref().unwrap_or("unknown reason"))]
    ApprovalFailed { hash: TxHash, reason: Option<String> },

    #[error("transaction {hash} reverted: {}", .reason.as_deref().unwrap_or("unknown reason"))]
    SwapFailed { hash: TxHash, reason: Option<String> },

    #[error("transfer {hash} reverted: {}", .reason.as_deref().unwrap_or("unknown reason"))]
    TransferFailed { hash: TxHash, reason: Option<String> },

    /// No receipt before the deadline, or the node kept failing to answer.
    /// The transaction may still mine.
    #[error("no receipt for {hash} after {}s", .waited.as_secs())]
    Timeout { hash: TxHash, waited: Duration },

    #[error("no route from {from} to {to}")]
    UnknownRoute { from: Chain, to: Chain },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid wallet row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },

    #[error("config: {0}")]
    Config(String),
}

impl TransferError {
    pub fn connectivity(chain: Chain, err: impl std::fmt::Display) -> Self {
        Self::Connectivity {
            chain,
            message: err.to_string(),
        }
    }

    pub fn insufficient(asset: impl Into<String>, required: U256, available: U256) -> Self {
        Self::InsufficientFunds {
            asset: asset.into(),
            required,
            available,
        }
    }
}

pub type Result<T, E = TransferError> = std::result::Result<T, E>;
