use std::{fmt, fs::File, io::Read, path::Path, str::FromStr};

use alloy::{
    primitives::{Address, U256},
    signers::local::PrivateKeySigner,
};
use eyre::WrapErr;
use serde::Deserialize;

use crate::{
    config::{parse_amount, Chain},
    error::TransferError,
};

/// Private key of one wallet. `Debug` only shows the address.
#[derive(Clone)]
pub struct WalletKey(PrivateKeySigner);

impl WalletKey {
    /// Accepts 64 hex characters, with or without a `0x` prefix.
    pub fn from_hex(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        let hex = raw.strip_prefix("0x").unwrap_or(raw);
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err("private key must be 64 hex characters".into());
        }
        PrivateKeySigner::from_str(hex)
            .map(Self)
            .map_err(|e| format!("invalid private key: {e}"))
    }

    pub fn address(&self) -> Address {
        self.0.address()
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.0
    }
}

impl fmt::Debug for WalletKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WalletKey").field(&self.address()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Arbitrum,
    Optimism,
}

impl Destination {
    pub fn chain(self) -> Chain {
        match self {
            Destination::Arbitrum => Chain::Arbitrum,
            Destination::Optimism => Chain::Optimism,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalletJob {
    /// 1-based data row in the sheet, for reporting.
    pub row: usize,
    pub key: WalletKey,
    /// Spent on the gas-token top-up, in base units of the top-up asset.
    pub amount: U256,
    pub destination: Destination,
    /// Exchange deposit address proceeds are forwarded to.
    pub recipient: Address,
}

#[derive(Debug, Deserialize)]
struct SheetRow {
    #[serde(rename = "PrivateKey")]
    private_key: String,
    #[serde(rename = "Amount")]
    amount: String,
    #[serde(rename = "Arb")]
    arb: String,
    #[serde(rename = "Optimism")]
    optimism: String,
    #[serde(rename = "Destination")]
    destination: String,
}

impl SheetRow {
    fn into_job(self, row: usize, amount_decimals: u8) -> Result<WalletJob, TransferError> {
        let invalid = |reason: String| TransferError::InvalidRow { row, reason };

        let key = WalletKey::from_hex(&self.private_key).map_err(invalid)?;
        let amount = parse_amount(&self.amount, amount_decimals)
            .map_err(|e| invalid(format!("Amount: {e}")))?;
        let arb = parse_flag(&self.arb).map_err(|e| invalid(format!("Arb: {e}")))?;
        let optimism =
            parse_flag(&self.optimism).map_err(|e| invalid(format!("Optimism: {e}")))?;
        let destination = match (arb, optimism) {
            (true, false) => Destination::Arbitrum,
            (false, true) => Destination::Optimism,
            _ => {
                return Err(invalid(format!(
                    "exactly one of Arb/Optimism must be 1 (Arb={}, Optimism={})",
                    self.arb.trim(),
                    self.optimism.trim()
                )))
            }
        };
        let recipient = parse_address(&self.destination).map_err(invalid)?;

        Ok(WalletJob {
            row,
            key,
            amount,
            destination,
            recipient,
        })
    }
}

/// Spreadsheet exports write flags as `1`, `0`, `1.0` or leave them empty.
fn parse_flag(raw: &str) -> Result<bool, String> {
    match raw.trim() {
        "" | "0" | "0.0" => Ok(false),
        "1" | "1.0" => Ok(true),
        other => Err(format!("expected 0 or 1, got {other:?}")),
    }
}

/// Mixed-case addresses must carry a valid EIP-55 checksum.
fn parse_address(raw: &str) -> Result<Address, String> {
    let raw = raw.trim();
    let hex = raw.strip_prefix("0x").unwrap_or(raw);
    let mixed_case = hex.chars().any(|c| c.is_ascii_uppercase())
        && hex.chars().any(|c| c.is_ascii_lowercase());
    let parsed = if mixed_case {
        Address::parse_checksummed(format!("0x{hex}"), None).map_err(|e| e.to_string())
    } else {
        Address::from_str(hex).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| format!("invalid destination address {raw:?}: {e}"))
}

pub type SheetRows = Vec<Result<WalletJob, TransferError>>;

/// Parses every row. Bad rows come back as errors so the batch can skip them.
///
/// `amount_decimals` scales the `Amount` column: 18 for ETH, 6 for USDC.
pub fn parse_sheet<R: Read>(reader: R, amount_decimals: u8) -> eyre::Result<SheetRows> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut jobs = Vec::new();
    for (index, record) in reader.deserialize::<SheetRow>().enumerate() {
        let row = index + 1;
        let job = match record {
            Ok(record) => record.into_job(row, amount_decimals),
            Err(e) => Err(TransferError::InvalidRow {
                row,
                reason: e.to_string(),
            }),
        };
        jobs.push(job);
    }
    Ok(jobs)
}

pub fn read_sheet(path: &Path, amount_decimals: u8) -> eyre::Result<SheetRows> {
    let file =
        File::open(path).wrap_err_with(|| format!("open wallet sheet {}", path.display()))?;
    parse_sheet(file, amount_decimals)
        .wrap_err_with(|| format!("read wallet sheet {}", path.display()))
}
