use async_trait::async_trait;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::client::NodeClient;
use crate::error::{ScanError, ScanResult};
use crate::models::{Block, Log, Receipt, Transaction};
use crate::utils::{parse_hex_u128, parse_hex_u64, to_hex_quantity};

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    number: String,
    hash: Option<String>,
    #[serde(default)]
    transactions: Vec<RawTransaction>,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    hash: String,
    from: Option<String>,
    to: Option<String>,
    value: String,
    #[serde(default)]
    input: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    status: Option<String>,
    to: Option<String>,
    #[serde(default)]
    logs: Vec<RawLog>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
}

// JSON-RPC 2.0 client for Ethereum-compatible nodes over HTTP
pub struct EthereumRpc {
    http: reqwest::Client,
    url: String,
    request_id: AtomicU64,
}

impl EthereumRpc {
    pub fn new(url: &str, timeout: Duration) -> ScanResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        info!("Using Ethereum node RPC at {}", url);
        Ok(EthereumRpc {
            http,
            url: url.to_string(),
            request_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> ScanResult<Value> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
        };
        debug!("RPC {} {}", method, request.params);

        let response: JsonRpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(ScanError::Rpc(format!("{} returned {}: {}", method, err.code, err.message)));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

fn convert_transaction(raw: &RawTransaction) -> ScanResult<Transaction> {
    Ok(Transaction {
        hash: raw.hash.clone(),
        from: raw.from.clone(),
        to: raw.to.clone(),
        value: parse_hex_u128(&raw.value)?,
        input: raw.input.clone(),
    })
}

fn convert_block(raw: RawBlock) -> ScanResult<Block> {
    // Full blocks can carry hundreds of transactions; decode them in parallel
    let transactions = raw
        .transactions
        .par_iter()
        .map(convert_transaction)
        .collect::<ScanResult<Vec<_>>>()?;
    Ok(Block {
        number: parse_hex_u64(&raw.number)?,
        hash: raw.hash,
        transactions,
    })
}

// Decoding is CPU work on rayon's pool; keep it off the async workers
async fn decode_block(result: Value) -> ScanResult<Block> {
    tokio::task::spawn_blocking(move || -> ScanResult<Block> {
        let raw: RawBlock = serde_json::from_value(result)?;
        convert_block(raw)
    })
    .await
    .map_err(|e| ScanError::Decode(format!("block decoding task failed: {}", e)))?
}

fn convert_receipt(raw: RawReceipt) -> ScanResult<Receipt> {
    let status = raw.status.as_deref().map(parse_hex_u64).transpose()?;
    Ok(Receipt {
        transaction_hash: raw.transaction_hash,
        status,
        to: raw.to,
        logs: raw
            .logs
            .into_iter()
            .map(|log| Log {
                address: log.address,
                topics: log.topics,
                data: log.data,
            })
            .collect(),
    })
}

#[async_trait]
impl NodeClient for EthereumRpc {
    async fn latest_block_number(&self) -> ScanResult<u64> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let quantity = result
            .as_str()
            .ok_or_else(|| ScanError::Decode(format!("eth_blockNumber returned {}", result)))?;
        parse_hex_u64(quantity)
    }

    async fn get_block(&self, number: u64) -> ScanResult<Option<Block>> {
        let result = self
            .call("eth_getBlockByNumber", json!([to_hex_quantity(number), true]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        decode_block(result).await.map(Some)
    }

    async fn get_transaction_receipt(&self, hash: &str) -> ScanResult<Option<Receipt>> {
        let result = self.call("eth_getTransactionReceipt", json!([hash])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let raw: RawReceipt = serde_json::from_value(result)?;
        convert_receipt(raw).map(Some)
    }
}
