use std::str::FromStr;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{BridgeAdapter, QuoteRequest};
use crate::{
    calls::{Call, Quote},
    error::{Result, TransferError},
};

/// Quote-API adapter backed by `GET /quote` on LI.FI.
///
/// Target, call data and value are taken from the response as-is; slippage is
/// the aggregator's business.
pub struct LifiAdapter {
    http: reqwest::Client,
    base_url: String,
    diamond: Address,
    bridges: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    transaction_request: TransactionRequestBody,
    estimate: Estimate,
}

#[derive(Debug, Deserialize)]
struct TransactionRequestBody {
    to: Address,
    data: Bytes,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Estimate {
    to_amount_min: String,
}

impl LifiAdapter {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        diamond: Address,
        bridges: Vec<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            diamond,
            bridges,
        }
    }

    fn query(&self, request: &QuoteRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("fromChain", request.source_chain_id.to_string()),
            ("toChain", request.destination_chain_id.to_string()),
            ("fromToken", request.source_token.to_checksum(None)),
            ("toToken", request.destination_token.to_checksum(None)),
            ("fromAmount", request.amount.to_string()),
            ("fromAddress", request.from.to_checksum(None)),
            ("toAddress", request.to.to_checksum(None)),
        ];
        query.extend(self.bridges.iter().map(|b| ("allowBridges", b.clone())));
        query
    }
}

/// Parses a quote body. `transactionRequest.value` comes back either as hex or decimal.
pub(crate) fn parse_quote(body: &str) -> Result<Quote> {
    let response: QuoteResponse =
        serde_json::from_str(body).map_err(|e| TransferError::InvalidQuote(e.to_string()))?;
    let value = parse_quantity(&response.transaction_request.value)?;
    let min_dest_amount = parse_quantity(&response.estimate.to_amount_min)?;
    Ok(Quote {
        call: Call::new(response.transaction_request.to, response.transaction_request.data)
            .with_value(value),
        min_dest_amount,
    })
}

fn parse_quantity(raw: &str) -> Result<U256> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some("") => Ok(U256::ZERO),
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str(raw),
    };
    parsed.map_err(|e| TransferError::InvalidQuote(format!("bad quantity {raw:?}: {e}")))
}

#[async_trait]
impl BridgeAdapter for LifiAdapter {
    fn name(&self) -> &'static str {
        "lifi"
    }

    fn spender(&self) -> Address {
        self.diamond
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote> {
        let url = format!("{}/quote", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&self.query(request))
            .send()
            .await
            .map_err(|e| TransferError::QuoteUnavailable {
                status: e.status().map(|s| s.as_u16()).unwrap_or_default(),
                body: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(TransferError::QuoteUnavailable {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let quote = parse_quote(&body)?;
        debug!(
            to = %quote.call.target,
            value = %quote.call.value,
            min = %quote.min_dest_amount,
            "lifi quote"
        );
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NATIVE_TOKEN_SENTINEL;

    const BODY: &str = r#"{
        "id": "a1b2",
        "tool": "squid",
        "estimate": {
            "fromAmount": "1000000000000000",
            "toAmount": "2950000000000000000",
            "toAmountMin": "2891000000000000000",
            "executionDuration": 60
        },
        "transactionRequest": {
            "from": "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
            "to": "0x1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE",
            "chainId": 8453,
            "data": "0xdeadbeef",
            "value": "0x38d7ea4c68000",
            "gasPrice": "0x3b9aca00",
            "gasLimit": "0x7a120"
        }
    }"#;

    #[test]
    fn parses_hex_value_and_minimum() {
        let quote = parse_quote(BODY).unwrap();
        assert_eq!(
            quote.call.target,
            alloy::primitives::address!("1231DEB6f5749EF6cE6943a275A1D3E7486F4EaE")
        );
        assert_eq!(quote.call.data, Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(quote.call.value, U256::from(1_000_000_000_000_000u64));
        assert_eq!(quote.min_dest_amount, U256::from(2_891_000_000_000_000_000u128));
    }

    #[test]
    fn accepts_decimal_value() {
        let body = BODY.replace("\"0x38d7ea4c68000\"", "\"1000000000000000\"");
        let quote = parse_quote(&body).unwrap();
        assert_eq!(quote.call.value, U256::from(1_000_000_000_000_000u64));
    }

    #[test]
    fn missing_transaction_request_is_invalid() {
        let err = parse_quote(r#"{"estimate": {"toAmountMin": "1"}}"#).unwrap_err();
        assert!(matches!(err, TransferError::InvalidQuote(_)));
    }

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("0x").unwrap(), U256::ZERO);
        assert_eq!(parse_quantity("0x10").unwrap(), U256::from(16));
        assert_eq!(parse_quantity(" 42 ").unwrap(), U256::from(42));
        assert!(parse_quantity("0xzz").is_err());
        assert!(parse_quantity("-1").is_err());
    }

    #[test]
    fn query_lists_route_parameters() {
        let adapter = LifiAdapter::new(
            reqwest::Client::new(),
            "https://li.quest/v1/",
            Address::ZERO,
            vec!["squid".into()],
        );
        assert_eq!(adapter.base_url, "https://li.quest/v1");
        let request = QuoteRequest {
            source_chain_id: 8453,
            destination_chain_id: 250,
            source_token: NATIVE_TOKEN_SENTINEL,
            destination_token: Address::ZERO,
            amount: U256::from(1_000_000_000_000_000u64),
            from: Address::repeat_byte(0x01),
            to: Address::repeat_byte(0x01),
        };
        let query = adapter.query(&request);
        let get = |key: &str| {
            query
                .iter()
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
                .collect::<Vec<_>>()
        };
        assert_eq!(get("fromChain"), ["8453"]);
        assert_eq!(get("toChain"), ["250"]);
        assert_eq!(get("fromToken"), ["0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE"]);
        assert_eq!(get("toToken"), ["0x0000000000000000000000000000000000000000"]);
        assert_eq!(get("fromAmount"), ["1000000000000000"]);
        assert_eq!(get("allowBridges"), ["squid"]);
    }
}
