// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use anyhow::Context;
use chainpass::{
    chain::{mock::MockChain, ChainClient},
    models::event::{sample_events, Event},
    storage::{KeyValueStore, MemoryStore},
    utils::util::unix_now,
    worker::Worker,
    ChainpassConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;

#[cfg(test)]
mod scenarios_tests;

pub const ALICE: &str = "0x00000000000000000000000000000000000a11ce";
pub const BOB: &str = "0x0000000000000000000000000000000000000b0b";
pub const EVENT_MANAGER: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

/// The test context holds the in-memory chain and the storage a worker is built on. Building
/// several workers from one context simulates restarts on the same profile.
pub struct TestContext {
    pub chain: Arc<MockChain>,
    pub store: Arc<dyn KeyValueStore>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            chain: Arc::new(MockChain::new(&[ALICE, BOB])),
            store,
        }
    }

    /// Seed the chain with the sample catalogue, passed through `f` first.
    pub fn seed_samples<F>(&self, f: F) -> Vec<Event>
    where
        F: Fn(&mut Event),
    {
        sample_events(unix_now())
            .into_iter()
            .map(|mut event| {
                event.ticket_contract = None;
                event.check_in_contract = None;
                f(&mut event);
                self.chain.seed_event(event)
            })
            .collect()
    }

    /// A worker talking to the in-memory chain, with `overrides` merged over the defaults.
    pub async fn worker(&self, overrides: Value) -> anyhow::Result<Worker> {
        let config = config(json!({ "event_manager_address": EVENT_MANAGER }), overrides)?;
        let client: Arc<dyn ChainClient> = self.chain.clone();
        Worker::with_client(config, Some(client), self.store.clone()).await
    }

    /// A worker with no contract configured.
    pub async fn unconfigured_worker(&self) -> anyhow::Result<Worker> {
        let config = config(json!({}), json!({ "account": ALICE }))?;
        Worker::with_client(config, None, self.store.clone()).await
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

fn config(mut base: Value, overrides: Value) -> anyhow::Result<ChainpassConfig> {
    if let (Some(base), Value::Object(overrides)) = (base.as_object_mut(), overrides) {
        base.extend(overrides);
    }
    serde_json::from_value(base).context("Invalid test config")
}
