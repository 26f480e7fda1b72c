// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    utils::util::{is_valid_address, is_zero_address, standardize_address},
    worker::Worker,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use server_framework::RunnableConfig;
use std::path::PathBuf;
use tracing::warn;
use url::Url;

pub const EVENT_MANAGER_ADDRESS_ENV: &str = "CHAINPASS_EVENT_MANAGER_ADDRESS";
pub const RECENT_EVENTS_CAPACITY: usize = 5;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChainpassConfig {
    /// JSON-RPC endpoint of the node. Without one the client runs against demo data only.
    #[serde(default)]
    pub rpc_url: Option<Url>,
    #[serde(default)]
    pub event_manager_address: Option<String>,
    /// Account to act as. Defaults to the first account the node exposes.
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default = "ChainpassConfig::default_storage_dir")]
    pub storage_dir: PathBuf,
    #[serde(default = "ChainpassConfig::default_max_events_to_probe")]
    pub max_events_to_probe: u64,
    #[serde(default = "ChainpassConfig::default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "ChainpassConfig::default_event_created_refresh_delay_ms")]
    pub event_created_refresh_delay_ms: u64,
    #[serde(default = "ChainpassConfig::default_event_poll_interval_secs")]
    pub event_poll_interval_secs: u64,
    #[serde(default = "ChainpassConfig::default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub history_ttl_secs: Option<u64>,
    #[serde(default = "ChainpassConfig::default_mock_mode_failure_threshold")]
    pub mock_mode_failure_threshold: u32,
    #[serde(default = "ChainpassConfig::default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default)]
    pub explorer_url: Option<String>,
    /// Force demo tickets on even when a contract is configured.
    #[serde(default)]
    pub demo_mode: bool,
}

impl ChainpassConfig {
    pub fn default_storage_dir() -> PathBuf {
        PathBuf::from(".chainpass")
    }

    pub const fn default_max_events_to_probe() -> u64 {
        10
    }

    pub const fn default_refresh_interval_secs() -> u64 {
        60
    }

    pub const fn default_event_created_refresh_delay_ms() -> u64 {
        2000
    }

    pub const fn default_event_poll_interval_secs() -> u64 {
        5
    }

    pub const fn default_history_capacity() -> usize {
        50
    }

    pub const fn default_mock_mode_failure_threshold() -> u32 {
        2
    }

    pub const fn default_confirmation_timeout_secs() -> u64 {
        120
    }

    /// The configured contract, or the one from the environment. `None` when neither is
    /// set, the value is not a 20 byte hex address or it is the zero address.
    pub fn event_manager_address(&self) -> Option<String> {
        resolve_event_manager_address(
            self.event_manager_address.as_deref(),
            std::env::var(EVENT_MANAGER_ADDRESS_ENV).ok(),
        )
    }

    pub fn history_ttl(&self) -> Option<chrono::Duration> {
        self.history_ttl_secs
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(chrono::Duration::try_seconds)
    }
}

fn resolve_event_manager_address(configured: Option<&str>, env: Option<String>) -> Option<String> {
    let address = match configured {
        Some(address) => Some(address.to_string()),
        None => env,
    }?;
    let address = address.trim();
    if address.is_empty() {
        return None;
    }
    if !is_valid_address(address) {
        warn!(
            address = address,
            "[Config] Event manager address is not a valid address, running without a contract"
        );
        return None;
    }
    if is_zero_address(Some(address)) {
        return None;
    }
    Some(standardize_address(address))
}

#[async_trait::async_trait]
impl RunnableConfig for ChainpassConfig {
    async fn run(&self) -> Result<()> {
        let worker = Worker::new(self.clone())
            .await
            .context("Failed to build worker")?;
        worker.run().await
    }

    fn get_server_name(&self) -> String {
        "chainpass".to_string()
    }
}
