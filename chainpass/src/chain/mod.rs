// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The contract surface. Everything above this module talks to the event manager and the
//! per-event ticket contracts only through these traits, so the JSON-RPC client and the
//! in-memory chain are interchangeable.

pub mod abi;
pub mod mock;
pub mod rpc;

use crate::models::{amount::Amount, history::EventCreatedLog};
use async_trait::async_trait;
use serde_json::Value;

pub const BASE_MAINNET_CHAIN_ID: u64 = 8453;
pub const BASE_SEPOLIA_CHAIN_ID: u64 = 84532;

/// JSON-RPC code wallets use when the user declines a request.
pub const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("{message}")]
    Rpc { code: i64, message: String },
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Malformed response: {0}")]
    Abi(#[from] abi::AbiError),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

impl ChainError {
    pub fn user_rejected() -> Self {
        ChainError::Rpc {
            code: USER_REJECTED_CODE,
            message: "User rejected the request.".to_string(),
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(self, ChainError::Rpc { code, .. } if *code == USER_REJECTED_CODE)
    }
}

/// Parameters of `createEvent`, already validated and scaled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateEventParams {
    pub name: String,
    pub description: String,
    pub image_uri: String,
    pub ticket_price: Amount,
    pub max_tickets: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub is_soulbound: bool,
}

#[async_trait]
pub trait EventManagerReader: Send + Sync {
    /// The raw record for `event_id`. Ids past the last event come back zeroed, not as errors.
    async fn get_event(&self, event_id: u64) -> Result<Value, ChainError>;

    async fn get_event_count(&self) -> Result<u64, ChainError>;
}

#[async_trait]
pub trait TicketContractReader: Send + Sync {
    async fn balance_of(&self, ticket_contract: &str, owner: &str) -> Result<Amount, ChainError>;

    async fn get_ticket_id(&self, ticket_contract: &str, owner: &str) -> Result<u64, ChainError>;

    async fn is_ticket_valid(&self, ticket_contract: &str, token_id: u64) -> Result<bool, ChainError>;
}

/// State changing calls. Each returns the transaction hash once submitted.
#[async_trait]
pub trait EventManagerWriter: Send + Sync {
    async fn create_event(&self, from: &str, params: &CreateEventParams) -> Result<String, ChainError>;

    async fn buy_ticket(&self, from: &str, event_id: u64, value: &Amount) -> Result<String, ChainError>;

    async fn check_in(&self, from: &str, event_id: u64, attendee: &str) -> Result<String, ChainError>;

    /// Resolves once the transaction is mined. A reverted receipt is an error.
    async fn wait_for_confirmation(&self, tx_hash: &str) -> Result<(), ChainError>;
}

#[async_trait]
pub trait EventCreatedWatcher: Send + Sync {
    async fn latest_block(&self) -> Result<u64, ChainError>;

    /// `EventCreated` logs emitted in the inclusive block range.
    async fn event_created_logs(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EventCreatedLog>, ChainError>;
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ChainError>;

    async fn accounts(&self) -> Result<Vec<String>, ChainError>;
}

/// Everything a connected session needs from the chain.
pub trait ChainClient:
    EventManagerReader + TicketContractReader + EventManagerWriter + EventCreatedWatcher + WalletProvider
{
}

impl<T> ChainClient for T where
    T: EventManagerReader
        + TicketContractReader
        + EventManagerWriter
        + EventCreatedWatcher
        + WalletProvider
{
}

pub fn is_base_chain(chain_id: u64) -> bool {
    chain_id == BASE_MAINNET_CHAIN_ID || chain_id == BASE_SEPOLIA_CHAIN_ID
}
