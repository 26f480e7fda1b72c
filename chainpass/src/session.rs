// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! An explicitly owned wallet session.
//!
//! `connect` resolves the account and chain once; every background task the session starts is
//! tied to its cancellation token and awaited by `disconnect`.

use crate::{
    chain::{is_base_chain, ChainClient},
    utils::util::{is_valid_address, short_address, standardize_address},
};
use anyhow::{bail, Context, Result};
use std::{
    future::Future,
    sync::{Arc, Mutex},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct WalletSession {
    account: Option<String>,
    chain_id: Option<u64>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WalletSession {
    /// Resolve the account to act as: `configured_account` when given, otherwise the first
    /// account the node exposes. A session without a client is a read-only demo session.
    pub async fn connect(
        client: Option<&Arc<dyn ChainClient>>,
        configured_account: Option<&str>,
        expected_chain_id: Option<u64>,
    ) -> Result<Self> {
        if let Some(account) = configured_account {
            if !is_valid_address(account) {
                bail!("Configured account {} is not a valid address", account);
            }
        }
        let Some(client) = client else {
            info!("[Session] No chain client, starting demo session");
            return Ok(Self::offline(configured_account));
        };

        let chain_id = client
            .chain_id()
            .await
            .context("Failed to read chain id")?;
        if let Some(expected) = expected_chain_id {
            if expected != chain_id {
                bail!(
                    "Connected to chain {} but configuration expects chain {}",
                    chain_id,
                    expected
                );
            }
        }
        if !is_base_chain(chain_id) {
            warn!(chain_id = chain_id, "[Session] Connected chain is neither Base nor Base Sepolia");
        }

        let account = match configured_account {
            Some(account) => Some(standardize_address(account)),
            None => client
                .accounts()
                .await
                .context("Failed to list accounts")?
                .into_iter()
                .next(),
        };
        match &account {
            Some(account) => info!(
                account = short_address(account).as_str(),
                chain_id = chain_id,
                "[Session] Connected"
            ),
            None => warn!(chain_id = chain_id, "[Session] Connected without an account, writes disabled"),
        }
        Ok(Self {
            account,
            chain_id: Some(chain_id),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(vec![]),
        })
    }

    pub fn offline(account: Option<&str>) -> Self {
        Self {
            account: account.map(standardize_address),
            chain_id: None,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(vec![]),
        }
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub fn is_connected(&self) -> bool {
        self.chain_id.is_some()
    }

    pub fn is_base_chain(&self) -> bool {
        self.chain_id.map_or(false, is_base_chain)
    }

    /// A token that fires when the session disconnects.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    pub fn is_disconnected(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `task` until it finishes or the session disconnects.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.cancellation_token();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {},
                _ = task => {},
            }
        });
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Cancel everything started under this session and wait for it to stop.
    pub async fn disconnect(&self) {
        self.cancel.cancel();
        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = ?e, "[Session] Task ended abnormally");
            }
        }
        info!("[Session] Disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    const ALICE: &str = "0x00000000000000000000000000000000000A11CE";

    fn client(chain: MockChain) -> Arc<dyn ChainClient> {
        Arc::new(chain)
    }

    #[tokio::test]
    async fn test_connect_picks_first_account() {
        let client = client(MockChain::new(&[ALICE]));
        let session = WalletSession::connect(Some(&client), None, None).await.unwrap();
        assert_eq!(session.account(), Some("0x00000000000000000000000000000000000a11ce"));
        assert_eq!(session.chain_id(), Some(84532));
        assert!(session.is_base_chain());
    }

    #[tokio::test]
    async fn test_connect_on_other_chain_still_connects() {
        let client = client(MockChain::with_chain_id(&[ALICE], 1));
        let session = WalletSession::connect(Some(&client), None, None).await.unwrap();
        assert!(session.is_connected());
        assert!(!session.is_base_chain());
    }

    #[tokio::test]
    async fn test_connect_rejects_mismatched_chain_and_bad_account() {
        let client = client(MockChain::new(&[ALICE]));
        assert!(WalletSession::connect(Some(&client), None, Some(8453)).await.is_err());
        assert!(WalletSession::connect(Some(&client), Some("0x12"), None).await.is_err());
    }

    #[tokio::test]
    async fn test_offline_session() {
        let session = WalletSession::connect(None, Some(ALICE), None).await.unwrap();
        assert!(!session.is_connected());
        assert_eq!(session.account(), Some("0x00000000000000000000000000000000000a11ce"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_tasks() {
        let session = WalletSession::offline(None);
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        session.spawn(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            flag.store(true, Ordering::SeqCst);
        });
        let token = session.cancellation_token();
        session.disconnect().await;
        assert!(token.is_cancelled());
        assert!(session.is_disconnected());
        assert!(!finished.load(Ordering::SeqCst));
    }
}
