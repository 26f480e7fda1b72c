// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::{
    abi::{self, Token},
    ChainError, CreateEventParams, EventCreatedWatcher, EventManagerReader, EventManagerWriter,
    TicketContractReader, WalletProvider,
};
use crate::{
    models::{amount::Amount, history::EventCreatedLog},
    utils::{counters::CONTRACT_READ_ERRORS_COUNT, util::standardize_address},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::{debug, warn};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    topics: Vec<String>,
    data: String,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    transaction_hash: Option<String>,
}

/// Talks to an Ethereum JSON-RPC endpoint. Reads go through `eth_call`; writes are submitted
/// with `eth_sendTransaction`, so the node (or the wallet behind it) signs.
pub struct RpcClient {
    http: reqwest::Client,
    rpc_url: Url,
    event_manager: String,
    next_id: AtomicU64,
    confirmation_timeout: Duration,
}

impl RpcClient {
    pub fn new(
        rpc_url: Url,
        event_manager: &str,
        confirmation_timeout: Duration,
    ) -> Result<Self, ChainError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            rpc_url,
            event_manager: standardize_address(event_manager),
            next_id: AtomicU64::new(1),
            confirmation_timeout,
        })
    }

    pub fn event_manager(&self) -> &str {
        &self.event_manager
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        let body = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method = method, "[RPC] Sending request");
        let response: JsonRpcResponse = self
            .http
            .post(self.rpc_url.clone())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if let Some(error) = response.error {
            return Err(rpc_error(error));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn eth_call(&self, to: &str, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let result = self
            .request(
                "eth_call",
                json!([{ "to": to, "data": hex_data(&data) }, "latest"]),
            )
            .await?;
        let hex = result
            .as_str()
            .ok_or_else(|| ChainError::Malformed("eth_call result is not a string".to_string()))?;
        Ok(abi::decode_hex(hex)?)
    }

    /// `eth_call` with the read error counter bumped on failure.
    async fn read(&self, function_name: &str, to: &str, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        self.eth_call(to, data).await.map_err(|e| {
            CONTRACT_READ_ERRORS_COUNT
                .with_label_values(&[function_name])
                .inc();
            e
        })
    }

    async fn send_transaction(
        &self,
        from: &str,
        data: Vec<u8>,
        value: Option<&Amount>,
    ) -> Result<String, ChainError> {
        let mut tx = json!({
            "from": standardize_address(from),
            "to": self.event_manager,
            "data": hex_data(&data),
        });
        if let Some(value) = value {
            tx["value"] = Value::String(hex_quantity(value));
        }
        let result = self.request("eth_sendTransaction", json!([tx])).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::Malformed("transaction hash is not a string".to_string()))
    }
}

fn rpc_error(error: JsonRpcError) -> ChainError {
    let reason = error
        .data
        .as_ref()
        .and_then(|data| match data {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map.get("data").and_then(Value::as_str),
            _ => None,
        })
        .and_then(|hex| abi::decode_hex(hex).ok())
        .and_then(|bytes| abi::decode_revert_reason(&bytes));
    let message = match reason {
        Some(reason) if !error.message.contains(&reason) => {
            format!("{}: {}", error.message, reason)
        },
        _ => error.message,
    };
    ChainError::Rpc {
        code: error.code,
        message,
    }
}

fn hex_data(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// Minimal hex quantity: no leading zeros, zero is `0x0`.
fn hex_quantity(value: &Amount) -> String {
    let digits = hex::encode(value.to_be_bytes32());
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        "0x0".to_string()
    } else {
        format!("0x{}", trimmed)
    }
}

fn parse_quantity(value: &Value) -> Result<u64, ChainError> {
    value
        .as_str()
        .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
        .ok_or_else(|| ChainError::Malformed(format!("not a hex quantity: {}", value)))
}

#[async_trait]
impl EventManagerReader for RpcClient {
    async fn get_event(&self, event_id: u64) -> Result<Value, ChainError> {
        let data = abi::encode_call(abi::GET_EVENT, &[Token::Uint(Amount::from_wei(event_id))])?;
        let bytes = self.read("getEvent", &self.event_manager, data).await?;
        Ok(abi::decode_event_record(&bytes)?)
    }

    async fn get_event_count(&self) -> Result<u64, ChainError> {
        let data = abi::encode_call(abi::GET_EVENT_COUNT, &[])?;
        let bytes = self.read("getEventCount", &self.event_manager, data).await?;
        Ok(abi::decode_uint(&bytes)?.as_u64_saturating())
    }
}

#[async_trait]
impl TicketContractReader for RpcClient {
    async fn balance_of(&self, ticket_contract: &str, owner: &str) -> Result<Amount, ChainError> {
        let data = abi::encode_call(abi::BALANCE_OF, &[Token::Address(owner.to_string())])?;
        let bytes = self.read("balanceOf", ticket_contract, data).await?;
        Ok(abi::decode_uint(&bytes)?)
    }

    async fn get_ticket_id(&self, ticket_contract: &str, owner: &str) -> Result<u64, ChainError> {
        let data = abi::encode_call(abi::GET_TICKET_ID, &[Token::Address(owner.to_string())])?;
        let bytes = self.read("getTicketId", ticket_contract, data).await?;
        Ok(abi::decode_uint(&bytes)?.as_u64_saturating())
    }

    async fn is_ticket_valid(&self, ticket_contract: &str, token_id: u64) -> Result<bool, ChainError> {
        let data =
            abi::encode_call(abi::IS_TICKET_VALID, &[Token::Uint(Amount::from_wei(token_id))])?;
        let bytes = self.read("isTicketValid", ticket_contract, data).await?;
        Ok(abi::decode_bool(&bytes)?)
    }
}

#[async_trait]
impl EventManagerWriter for RpcClient {
    async fn create_event(&self, from: &str, params: &CreateEventParams) -> Result<String, ChainError> {
        let data = abi::encode_call(abi::CREATE_EVENT, &[
            Token::String(params.name.clone()),
            Token::String(params.description.clone()),
            Token::String(params.image_uri.clone()),
            Token::Uint(params.ticket_price.clone()),
            Token::Uint(Amount::from_wei(params.max_tickets)),
            Token::Uint(Amount::from_wei(params.start_time)),
            Token::Uint(Amount::from_wei(params.end_time)),
            Token::Bool(params.is_soulbound),
        ])?;
        self.send_transaction(from, data, None).await
    }

    async fn buy_ticket(&self, from: &str, event_id: u64, value: &Amount) -> Result<String, ChainError> {
        let data = abi::encode_call(abi::BUY_TICKET, &[Token::Uint(Amount::from_wei(event_id))])?;
        self.send_transaction(from, data, Some(value)).await
    }

    async fn check_in(&self, from: &str, event_id: u64, attendee: &str) -> Result<String, ChainError> {
        let data = abi::encode_call(abi::CHECK_IN, &[
            Token::Uint(Amount::from_wei(event_id)),
            Token::Address(attendee.to_string()),
        ])?;
        self.send_transaction(from, data, None).await
    }

    async fn wait_for_confirmation(&self, tx_hash: &str) -> Result<(), ChainError> {
        let poll = async {
            loop {
                let receipt = self
                    .request("eth_getTransactionReceipt", json!([tx_hash]))
                    .await?;
                if !receipt.is_null() {
                    return match receipt.get("status").and_then(Value::as_str) {
                        Some("0x1") => Ok(()),
                        _ => Err(ChainError::Reverted(format!(
                            "transaction {} failed on chain",
                            tx_hash
                        ))),
                    };
                }
                tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
            }
        };
        match tokio::time::timeout(self.confirmation_timeout, poll).await {
            Ok(result) => result,
            Err(_) => {
                warn!(tx_hash = tx_hash, "[RPC] Gave up waiting for receipt");
                Err(ChainError::Timeout(format!("receipt of {}", tx_hash)))
            },
        }
    }
}

#[async_trait]
impl EventCreatedWatcher for RpcClient {
    async fn latest_block(&self) -> Result<u64, ChainError> {
        parse_quantity(&self.request("eth_blockNumber", json!([])).await?)
    }

    async fn event_created_logs(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EventCreatedLog>, ChainError> {
        let filter = json!([{
            "address": self.event_manager,
            "topics": [abi::event_topic(abi::EVENT_CREATED)],
            "fromBlock": format!("0x{:x}", from_block),
            "toBlock": format!("0x{:x}", to_block),
        }]);
        let raw = self.request("eth_getLogs", filter).await?;
        let logs: Vec<RpcLog> = serde_json::from_value(raw)
            .map_err(|e| ChainError::Malformed(format!("eth_getLogs: {}", e)))?;
        let mut decoded = Vec::with_capacity(logs.len());
        for log in logs {
            let data = abi::decode_hex(&log.data)?;
            match abi::decode_event_created(&log.topics, &data) {
                Ok(mut event) => {
                    event.block_number = log
                        .block_number
                        .as_deref()
                        .and_then(|n| u64::from_str_radix(n.trim_start_matches("0x"), 16).ok());
                    event.transaction_hash = log.transaction_hash;
                    decoded.push(event);
                },
                Err(e) => {
                    warn!(error = ?e, "[RPC] Skipping undecodable EventCreated log");
                },
            }
        }
        Ok(decoded)
    }
}

#[async_trait]
impl WalletProvider for RpcClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        parse_quantity(&self.request("eth_chainId", json!([])).await?)
    }

    async fn accounts(&self) -> Result<Vec<String>, ChainError> {
        let raw = self.request("eth_accounts", json!([])).await?;
        let accounts: Vec<String> = serde_json::from_value(raw)
            .map_err(|e| ChainError::Malformed(format!("eth_accounts: {}", e)))?;
        Ok(accounts.iter().map(|a| standardize_address(a)).collect())
    }
}
