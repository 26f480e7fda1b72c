// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::utils::util::{short_address, standardize_address};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decoded `EventCreated` log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCreatedLog {
    pub event_id: u64,
    pub name: String,
    pub organizer: String,
    pub ticket_contract: String,
    pub check_in_contract: String,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

/// One observed `EventCreated` notification, as kept in the local history lists.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSighting {
    pub event_id: u64,
    pub name: String,
    pub organizer: String,
    pub ticket_contract: String,
    pub check_in_contract: String,
    #[serde(default)]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl EventSighting {
    pub fn from_log(log: &EventCreatedLog, observed_at: DateTime<Utc>) -> Self {
        Self {
            event_id: log.event_id,
            name: log.name.clone(),
            organizer: standardize_address(&log.organizer),
            ticket_contract: standardize_address(&log.ticket_contract),
            check_in_contract: standardize_address(&log.check_in_contract),
            block_number: log.block_number,
            transaction_hash: log.transaction_hash.clone(),
            timestamp: observed_at,
        }
    }

    pub fn organizer_display(&self) -> String {
        short_address(&self.organizer)
    }
}
