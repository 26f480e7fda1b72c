// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

/// Number of `getEvent` reads issued by the reconciler
pub static EVENT_READS_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "chainpass_event_reads_count",
        "Number of getEvent reads issued by the reconciler"
    )
    .unwrap()
});

/// Number of contract reads that failed, by read surface
pub static CONTRACT_READ_ERRORS_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chainpass_contract_read_errors_count",
        "Number of contract reads that failed",
        &["function_name"]
    )
    .unwrap()
});

/// Number of times the reconciler fell back to the built-in sample events
pub static SAMPLE_EVENTS_FALLBACK_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "chainpass_sample_events_fallback_count",
        "Number of times the reconciler fell back to the built-in sample events"
    )
    .unwrap()
});

/// Events currently mirrored in memory, by source
pub static RECONCILED_EVENTS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "chainpass_reconciled_events",
        "Events currently mirrored in memory",
        &["source"]
    )
    .unwrap()
});

/// Unix timestamp of the last successful refresh
pub static LAST_REFRESHED_TIMESTAMP: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "chainpass_last_refreshed_timestamp",
        "Unix timestamp of the last successful refresh"
    )
    .unwrap()
});

/// Tickets resolved for the connected account, by source
pub static RESOLVED_TICKETS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "chainpass_resolved_tickets",
        "Tickets resolved for the connected account",
        &["source"]
    )
    .unwrap()
});

/// Notifications that reached a status
pub static NOTIFICATIONS_COUNT: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "chainpass_notifications_count",
        "Notifications that reached a status",
        &["status"]
    )
    .unwrap()
});

/// Entries currently stored per history key
pub static HISTORY_CACHE_SIZE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "chainpass_history_cache_size",
        "Entries currently stored per history key",
        &["storage_key"]
    )
    .unwrap()
});

/// EventCreated logs observed by the watcher
pub static EVENT_CREATED_SEEN_COUNT: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "chainpass_event_created_seen_count",
        "EventCreated logs observed by the watcher"
    )
    .unwrap()
});
