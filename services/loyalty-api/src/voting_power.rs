//! Governance token balance lookup over Ethereum JSON-RPC
//!
//! Issues a read-only `eth_call` of ERC-20 `balanceOf(address)` and formats
//! the result with the token's decimals.

use async_trait::async_trait;
use loyalty_core::{external::VotingPowerSource, Error, Result, WalletAddress};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

/// `keccak256("balanceOf(address)")[..4]`
const BALANCE_OF_SELECTOR: &str = "70a08231";

#[derive(Debug, Serialize)]
struct RpcRequest {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<String>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct EthRpcVotingPower {
    rpc_url: String,
    token: String,
    decimals: u32,
    client: Client,
}

impl EthRpcVotingPower {
    pub fn new(rpc_url: String, token: String, decimals: u32, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("RPC client: {}", e)))?;

        Ok(Self {
            rpc_url,
            token,
            decimals,
            client,
        })
    }

    async fn balance_of(&self, wallet: &WalletAddress) -> Result<u128> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: "eth_call",
            params: json!([
                { "to": self.token, "data": balance_of_call(wallet)? },
                "latest"
            ]),
        };

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::VotingPowerUnavailable(format!("RPC request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            error!("RPC endpoint returned {}", status);
            return Err(Error::VotingPowerUnavailable(format!(
                "RPC endpoint returned {}",
                status
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| Error::VotingPowerUnavailable(format!("Malformed RPC response: {}", e)))?;

        if let Some(err) = body.error {
            return Err(Error::VotingPowerUnavailable(format!(
                "RPC error {}: {}",
                err.code, err.message
            )));
        }

        let result = body.result.ok_or_else(|| {
            Error::VotingPowerUnavailable("RPC response carries no result".to_string())
        })?;
        parse_quantity(&result)
    }
}

#[async_trait]
impl VotingPowerSource for EthRpcVotingPower {
    async fn voting_power(&self, wallet: &WalletAddress) -> Result<String> {
        let raw = self.balance_of(wallet).await?;
        let formatted = format_units(raw, self.decimals);
        debug!(wallet = %wallet, voting_power = %formatted, "Voting power fetched");
        Ok(formatted)
    }
}

/// ABI-encode `balanceOf(wallet)`
fn balance_of_call(wallet: &WalletAddress) -> Result<String> {
    let address = wallet.as_str().trim_start_matches("0x");
    if address.len() != 40 || !address.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::VotingPowerUnavailable(format!(
            "Not an account address: {}",
            wallet
        )));
    }
    Ok(format!(
        "0x{}{:0>64}",
        BALANCE_OF_SELECTOR,
        address.to_ascii_lowercase()
    ))
}

/// Parse a 32-byte hex word into a u128
fn parse_quantity(hex_word: &str) -> Result<u128> {
    let digits = hex_word.trim_start_matches("0x").trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    if digits.len() > 32 {
        return Err(Error::VotingPowerUnavailable(format!(
            "Balance exceeds supported range: {}",
            hex_word
        )));
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| Error::VotingPowerUnavailable(format!("Malformed balance {}: {}", hex_word, e)))
}

/// Fixed-point rendering with at least one fractional digit ("1.0", "0.25")
pub fn format_units(value: u128, decimals: u32) -> String {
    let base = 10u128.pow(decimals);
    let whole = value / base;
    let fraction = value % base;

    let fraction = format!("{:0width$}", fraction, width = decimals as usize);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        format!("{}.0", whole)
    } else {
        format!("{}.{}", whole, fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(0, 18), "0.0");
        assert_eq!(format_units(1_000_000_000_000_000_000, 18), "1.0");
        assert_eq!(format_units(1_500_000_000_000_000_000, 18), "1.5");
        assert_eq!(format_units(1, 18), "0.000000000000000001");
        assert_eq!(format_units(12345, 2), "123.45");
        assert_eq!(format_units(7, 0), "7.0");
    }

    #[test]
    fn test_balance_of_call_encoding() {
        let wallet = WalletAddress::new("0xAbCdEf0123456789aBcDeF0123456789AbCdEf01");
        let data = balance_of_call(&wallet).unwrap();
        assert_eq!(data.len(), 2 + 8 + 64);
        assert!(data.starts_with("0x70a08231000000000000000000000000"));
        assert!(data.ends_with("abcdef0123456789abcdef0123456789abcdef01"));
    }

    #[test]
    fn test_balance_of_call_rejects_non_address() {
        let result = balance_of_call(&WalletAddress::new("0xA"));
        assert!(matches!(result, Err(Error::VotingPowerUnavailable(_))));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(
            parse_quantity("0x0000000000000000000000000000000000000000000000000de0b6b3a7640000")
                .unwrap(),
            1_000_000_000_000_000_000
        );
        assert!(parse_quantity(&format!("0x1{}", "0".repeat(32))).is_err());
        assert!(parse_quantity("0xzz").is_err());
    }
}
