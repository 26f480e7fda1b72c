// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Deciding whether to talk to the chain at all.
//!
//! Mock mode is on when no contract is configured, when it was forced by config, or once the
//! persisted count of failed writes reaches the threshold. The counter survives restarts so a
//! profile that keeps failing stays in mock mode until it is reset.

use crate::{
    storage::{KeyValueStore, FAILURE_COUNT_KEY},
    utils::util::is_zero_address,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockModeReason {
    NoContract,
    Forced,
    RepeatedFailures,
}

pub struct MockMode {
    store: Arc<dyn KeyValueStore>,
    failure_threshold: u32,
    no_contract: bool,
    forced: bool,
}

impl MockMode {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        contract_address: Option<&str>,
        failure_threshold: u32,
        forced: bool,
    ) -> Self {
        Self {
            store,
            failure_threshold: failure_threshold.max(1),
            no_contract: is_zero_address(contract_address),
            forced,
        }
    }

    pub fn reason(&self) -> Option<MockModeReason> {
        if self.no_contract {
            Some(MockModeReason::NoContract)
        } else if self.forced {
            Some(MockModeReason::Forced)
        } else if self.failure_count() >= self.failure_threshold {
            Some(MockModeReason::RepeatedFailures)
        } else {
            None
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.reason().is_some()
    }

    pub fn failure_count(&self) -> u32 {
        match self.store.get(FAILURE_COUNT_KEY) {
            Ok(Some(raw)) => raw.trim().parse::<u32>().unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                warn!(error = ?e, "[MockMode] Failed to read failure counter");
                0
            },
        }
    }

    /// Count one failed write. Returns whether this failure switched mock mode on.
    pub fn record_failure(&self) -> bool {
        let was_enabled = self.is_enabled();
        let count = self.failure_count().saturating_add(1);
        if let Err(e) = self.store.set(FAILURE_COUNT_KEY, &count.to_string()) {
            warn!(error = ?e, "[MockMode] Failed to persist failure counter");
        }
        let enabled = !was_enabled && self.is_enabled();
        if enabled {
            info!(
                failure_count = count,
                threshold = self.failure_threshold,
                "[MockMode] Too many failed transactions, switching to mock mode"
            );
        }
        enabled
    }

    pub fn reset(&self) {
        if let Err(e) = self.store.remove(FAILURE_COUNT_KEY) {
            warn!(error = ?e, "[MockMode] Failed to reset failure counter");
        }
    }
}
