//! Etherscan `txlist` account API as a transaction-history feed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;

use crate::engine::{IndexedTransaction, TransactionHistory};
use crate::error::IndexerError;
use crate::types::{Address, TxHash};

const NO_TRANSACTIONS: &str = "No transactions found";

/// API endpoint per chain; chains without one are unsupported.
pub fn api_base(chain_id: u64) -> Option<&'static str> {
    match chain_id {
        1 => Some("https://api.etherscan.io/api"),
        11_155_111 => Some("https://api-sepolia.etherscan.io/api"),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct TxListResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    hash: String,
    block_number: String,
    #[serde(default)]
    transaction_index: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    input: String,
    #[serde(default)]
    is_error: String,
}

impl RawTransaction {
    fn into_indexed(self) -> Option<IndexedTransaction> {
        let hash = self.hash.parse::<TxHash>().ok()?;
        let block_number = self.block_number.parse().ok()?;
        let transaction_index = self.transaction_index.parse().unwrap_or(0);
        let to = self.to.parse::<Address>().ok();
        let body = self.input.strip_prefix("0x").unwrap_or(&self.input);
        let input = hex::decode(body).ok()?;
        Some(IndexedTransaction {
            hash,
            block_number,
            transaction_index,
            to,
            input,
            failed: self.is_error == "1",
        })
    }
}

/// Interpret a `txlist` response body.
///
/// Entries that cannot be decoded are skipped; an explicit "no transactions"
/// answer is an empty list rather than an error.
pub fn parse_txlist_response(body: &str) -> Result<Vec<IndexedTransaction>, IndexerError> {
    let response: TxListResponse = serde_json::from_str(body)?;
    if response.status != "1" {
        if response.message == NO_TRANSACTIONS {
            return Ok(Vec::new());
        }
        let detail = response
            .result
            .as_str()
            .map(str::to_string)
            .unwrap_or(response.message);
        return Err(IndexerError::Api { message: detail });
    }

    let entries: Vec<Value> = serde_json::from_value(response.result)?;
    let total = entries.len();
    let transactions: Vec<IndexedTransaction> = entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<RawTransaction>(entry).ok())
        .filter_map(RawTransaction::into_indexed)
        .collect();
    if transactions.len() < total {
        tracing::debug!(
            skipped = total - transactions.len(),
            "Skipped undecodable indexer entries"
        );
    }
    Ok(transactions)
}

pub struct EtherscanClient {
    client: Client,
    api_key: Option<SecretString>,
}

impl EtherscanClient {
    pub fn new(api_key: Option<SecretString>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
        }
    }

    fn txlist_url(&self, base: &str, contract: Address) -> String {
        let mut url = format!(
            "{}?module=account&action=txlist&address={}&startblock=0&endblock=99999999&sort=asc",
            base,
            contract.to_lower_hex()
        );
        if let Some(key) = &self.api_key {
            url.push_str("&apikey=");
            url.push_str(&urlencoding::encode(key.expose_secret()));
        }
        url
    }
}

#[async_trait]
impl TransactionHistory for EtherscanClient {
    async fn transactions_to(
        &self,
        chain_id: u64,
        contract: Address,
    ) -> Result<Vec<IndexedTransaction>, IndexerError> {
        let base = api_base(chain_id).ok_or(IndexerError::UnsupportedChain { chain_id })?;
        let body = self
            .client
            .get(self.txlist_url(base, contract))
            .header("Cache-Control", "no-cache")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_txlist_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(hash_byte: &str, block: &str, input: &str) -> Value {
        json!({
            "blockNumber": block,
            "transactionIndex": "3",
            "hash": format!("0x{}", hash_byte.repeat(32)),
            "from": "0x0000000000000000000000000000000000000001",
            "to": "0xdd63024953ad565748493f6b48a54e4886809667",
            "input": input,
            "isError": "0"
        })
    }

    #[test]
    fn parses_successful_listing() {
        let body = json!({
            "status": "1",
            "message": "OK",
            "result": [entry("aa", "10", "0xdeadbeef"), entry("bb", "20", "0x")]
        })
        .to_string();
        let txs = parse_txlist_response(&body).unwrap();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].block_number, 10);
        assert_eq!(txs[0].transaction_index, 3);
        assert_eq!(txs[0].input, vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(txs[1].input.is_empty());
        assert!(!txs[0].failed);
    }

    #[test]
    fn no_transactions_is_empty() {
        let body = json!({"status": "0", "message": NO_TRANSACTIONS, "result": []}).to_string();
        assert!(parse_txlist_response(&body).unwrap().is_empty());
    }

    #[test]
    fn api_errors_surface_result_text() {
        let body =
            json!({"status": "0", "message": "NOTOK", "result": "Invalid API Key"}).to_string();
        match parse_txlist_response(&body) {
            Err(IndexerError::Api { message }) => assert_eq!(message, "Invalid API Key"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn undecodable_entries_are_skipped() {
        let body = json!({
            "status": "1",
            "message": "OK",
            "result": [entry("aa", "not-a-number", "0x"), entry("cc", "5", "0xzz"), entry("dd", "6", "0x")]
        })
        .to_string();
        let txs = parse_txlist_response(&body).unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].block_number, 6);
    }

    #[test]
    fn only_etherscan_chains_are_supported() {
        assert!(api_base(11_155_111).is_some());
        assert!(api_base(1).is_some());
        assert!(api_base(137).is_none());
    }

    #[test]
    fn api_key_is_encoded_into_url() {
        let client = EtherscanClient::new(
            Some(SecretString::from("k e/y".to_string())),
            Duration::from_secs(5),
        );
        let url = client.txlist_url("https://api-sepolia.etherscan.io/api", Address([0xdd; 20]));
        assert!(url.ends_with("&apikey=k%20e%2Fy"));
        assert!(url.contains("sort=asc"));
    }
}
