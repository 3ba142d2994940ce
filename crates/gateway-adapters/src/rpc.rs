//! Ledger client speaking Ethereum JSON-RPC over HTTP.

use async_trait::async_trait;
use gateway_core::abi::decode_revert_reason;
use gateway_core::{
    Address, BlockInfo, BlockTag, CallRequest, LedgerClient, LedgerError, Receipt,
    SignedTransaction, H256,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// JSON-RPC error code nodes use for execution reverts.
const EXECUTION_REVERTED: i64 = 3;

pub struct JsonRpcLedger {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcLedger {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LedgerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| LedgerError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, LedgerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(id, method, "json-rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                if err.is_connect() || err.is_timeout() {
                    LedgerError::Unavailable(err.to_string())
                } else {
                    LedgerError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::Transport(format!("{method}: HTTP {status}")));
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|err| LedgerError::Decode(format!("{method}: {err}")))?;
        if let Some(error) = envelope.error {
            return Err(error.into_ledger_error());
        }
        serde_json::from_value(envelope.result.unwrap_or(Value::Null))
            .map_err(|err| LedgerError::Decode(format!("{method}: {err}")))
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcError {
    fn into_ledger_error(self) -> LedgerError {
        let reverted = self.code == EXECUTION_REVERTED || self.message.contains("revert");
        if !reverted {
            return LedgerError::Rpc {
                code: self.code,
                message: self.message,
            };
        }

        let from_data = revert_data(self.data.as_ref())
            .and_then(|data| decode_revert_reason(&data));
        let reason = from_data.unwrap_or_else(|| {
            self.message
                .trim_start_matches("execution reverted")
                .trim_start_matches(':')
                .trim()
                .to_string()
        });
        LedgerError::Reverted(reason)
    }
}

/// Revert bytes appear either as a hex string or nested under `data`.
fn revert_data(data: Option<&Value>) -> Option<Vec<u8>> {
    match data? {
        Value::String(text) => decode_hex(text).ok(),
        Value::Object(fields) => revert_data(fields.get("data")),
        _ => None,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: String,
    timestamp: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: H256,
    block_number: Option<String>,
    status: Option<String>,
    gas_used: String,
}

fn quantity(value: u64) -> String {
    format!("{value:#x}")
}

fn parse_quantity(text: &str) -> Result<u64, LedgerError> {
    let digits = text.strip_prefix("0x").unwrap_or(text);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|_| LedgerError::Decode(format!("invalid quantity {text:?}")))
}

fn encode_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_hex(text: &str) -> Result<Vec<u8>, LedgerError> {
    hex::decode(text.strip_prefix("0x").unwrap_or(text))
        .map_err(|_| LedgerError::Decode(format!("invalid hex data {text:?}")))
}

fn call_object(request: &CallRequest) -> Value {
    let mut object = Map::new();
    if let Some(from) = request.from {
        object.insert("from".to_string(), json!(encode_hex(from.as_bytes())));
    }
    object.insert("to".to_string(), json!(encode_hex(request.to.as_bytes())));
    object.insert("data".to_string(), json!(encode_hex(&request.data)));
    if let Some(gas) = request.gas {
        object.insert("gas".to_string(), json!(quantity(gas)));
    }
    if let Some(gas_price) = request.gas_price {
        object.insert("gasPrice".to_string(), json!(quantity(gas_price)));
    }
    Value::Object(object)
}

fn block_param(block: Option<u64>) -> Value {
    match block {
        Some(number) => json!(quantity(number)),
        None => json!("latest"),
    }
}

#[async_trait]
impl LedgerClient for JsonRpcLedger {
    fn backend(&self) -> &'static str {
        "json-rpc"
    }

    async fn chain_id(&self) -> Result<u64, LedgerError> {
        let value: String = self.request("eth_chainId", json!([])).await?;
        parse_quantity(&value)
    }

    async fn latest_block(&self) -> Result<BlockInfo, LedgerError> {
        let block: Option<RpcBlock> = self
            .request("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let block = block.ok_or_else(|| LedgerError::Decode("latest block missing".to_string()))?;
        Ok(BlockInfo {
            number: parse_quantity(&block.number)?,
            timestamp: parse_quantity(&block.timestamp)?,
        })
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        let value: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&value)
    }

    async fn transaction_count(&self, address: Address, tag: BlockTag) -> Result<u64, LedgerError> {
        let tag = match tag {
            BlockTag::Latest => "latest",
            BlockTag::Pending => "pending",
        };
        let value: String = self
            .request(
                "eth_getTransactionCount",
                json!([encode_hex(address.as_bytes()), tag]),
            )
            .await?;
        parse_quantity(&value)
    }

    async fn gas_price(&self) -> Result<u64, LedgerError> {
        let value: String = self.request("eth_gasPrice", json!([])).await?;
        parse_quantity(&value)
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, LedgerError> {
        let value: String = self
            .request("eth_estimateGas", json!([call_object(request)]))
            .await?;
        parse_quantity(&value)
    }

    async fn call(&self, request: &CallRequest, block: Option<u64>) -> Result<Vec<u8>, LedgerError> {
        let value: String = self
            .request("eth_call", json!([call_object(request), block_param(block)]))
            .await?;
        decode_hex(&value)
    }

    async fn send_raw_transaction(
        &self,
        transaction: &SignedTransaction,
    ) -> Result<H256, LedgerError> {
        self.request("eth_sendRawTransaction", json!([transaction.raw_hex()]))
            .await
    }

    async fn transaction_receipt(&self, hash: H256) -> Result<Option<Receipt>, LedgerError> {
        let receipt: Option<RpcReceipt> = self
            .request("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        let Some(receipt) = receipt else {
            return Ok(None);
        };
        // Some nodes return a receipt shell before inclusion.
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };
        Ok(Some(Receipt {
            transaction_hash: receipt.transaction_hash,
            block_number: parse_quantity(&block_number)?,
            status: receipt
                .status
                .as_deref()
                .map(parse_quantity)
                .transpose()?
                .map_or(true, |status| status == 1),
            gas_used: parse_quantity(&receipt.gas_used)?,
        }))
    }
}
