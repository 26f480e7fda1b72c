// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Mirrors the event manager's events.
//!
//! A refresh probes ids `1..=max_events_to_probe` with one `getEvent` read each and keeps the
//! records that look real (non-zero id, non-empty name). With no contract configured, or when
//! nothing real comes back, the fixed sample catalogue stands in so callers always have events
//! to show. Events created locally in mock mode are layered on top of the samples.

use crate::{
    chain::ChainClient,
    models::event::{sample_events, Event, EventFilter},
    utils::{
        counters::{
            CONTRACT_READ_ERRORS_COUNT, EVENT_READS_COUNT, LAST_REFRESHED_TIMESTAMP,
            RECONCILED_EVENTS, SAMPLE_EVENTS_FALLBACK_COUNT,
        },
        util::unix_now,
    },
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Chain,
    Sample,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::Chain => "chain",
            EventSource::Sample => "sample",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSnapshot {
    /// Sorted by id.
    pub events: Vec<Event>,
    pub source: EventSource,
    pub last_refreshed: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct ReconcilerState {
    snapshot: Option<EventSnapshot>,
    /// Mock mode creations, kept across refreshes.
    local_events: BTreeMap<u64, Event>,
}

pub struct EventReconciler {
    client: Option<Arc<dyn ChainClient>>,
    max_events_to_probe: u64,
    state: RwLock<ReconcilerState>,
}

impl EventReconciler {
    /// `client` is `None` when no event manager is configured.
    pub fn new(client: Option<Arc<dyn ChainClient>>, max_events_to_probe: u64) -> Self {
        Self {
            client,
            max_events_to_probe,
            state: RwLock::new(ReconcilerState::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ReconcilerState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ReconcilerState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Re-read every candidate id and replace the snapshot. Returns `None`, leaving the
    /// snapshot untouched, if `cancel` fires first.
    pub async fn refresh(&self, cancel: &CancellationToken) -> Option<EventSnapshot> {
        let now = unix_now();
        let chain_events = match &self.client {
            Some(client) => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("[Reconciler] Refresh cancelled");
                        return None;
                    },
                    events = self.probe(client.as_ref()) => events,
                }
            },
            None => {
                debug!("[Reconciler] No event manager configured, using sample events");
                vec![]
            },
        };
        if cancel.is_cancelled() {
            return None;
        }

        let snapshot = {
            let mut state = self.write();
            let (events, source) = if chain_events.is_empty() {
                SAMPLE_EVENTS_FALLBACK_COUNT.inc();
                let mut events = sample_events(now);
                events.extend(state.local_events.values().cloned());
                (events, EventSource::Sample)
            } else {
                (chain_events, EventSource::Chain)
            };
            let snapshot = EventSnapshot {
                events,
                source,
                last_refreshed: Some(Utc::now()),
            };
            state.snapshot = Some(snapshot.clone());
            snapshot
        };

        RECONCILED_EVENTS
            .with_label_values(&[snapshot.source.as_str()])
            .set(snapshot.events.len() as i64);
        LAST_REFRESHED_TIMESTAMP.set(Utc::now().timestamp());
        info!(
            event_count = snapshot.events.len(),
            source = snapshot.source.as_str(),
            "[Reconciler] Refreshed events"
        );
        Some(snapshot)
    }

    /// One read per candidate id, all in flight together. Failed reads count as absent.
    /// Candidates stop at the contract's event count when it can be read, otherwise at
    /// `max_events_to_probe`.
    async fn probe(&self, client: &dyn ChainClient) -> Vec<Event> {
        let last_id = match client.get_event_count().await {
            Ok(count) => count.min(self.max_events_to_probe),
            Err(e) => {
                CONTRACT_READ_ERRORS_COUNT
                    .with_label_values(&["event_count"])
                    .inc();
                warn!(
                    error = %e,
                    "[Reconciler] Failed to read event count, probing the full window"
                );
                self.max_events_to_probe
            },
        };
        let reads = (1..=last_id).map(|event_id| async move {
            EVENT_READS_COUNT.inc();
            match client.get_event(event_id).await {
                Ok(record) => Event::from_record(&record),
                Err(e) => {
                    warn!(event_id = event_id, error = %e, "[Reconciler] Failed to read event");
                    None
                },
            }
        });
        let mut by_id = BTreeMap::new();
        for event in join_all(reads).await.into_iter().flatten() {
            by_id.entry(event.id).or_insert(event);
        }
        by_id.into_values().collect()
    }

    /// Refresh once after `delay`, unless cancelled.
    pub fn schedule_refresh(
        self: &Arc<Self>,
        delay: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {},
                _ = tokio::time::sleep(delay) => {
                    reconciler.refresh(&cancel).await;
                },
            }
        })
    }

    /// The last refresh, or the sample catalogue before the first one.
    pub fn snapshot(&self) -> EventSnapshot {
        match &self.read().snapshot {
            Some(snapshot) => snapshot.clone(),
            None => EventSnapshot {
                events: sample_events(unix_now()),
                source: EventSource::Sample,
                last_refreshed: None,
            },
        }
    }

    pub fn events(&self, filter: EventFilter, now: u64) -> Vec<Event> {
        self.snapshot()
            .events
            .into_iter()
            .filter(|event| filter.matches(event, now))
            .collect()
    }

    pub fn event(&self, event_id: u64) -> Option<Event> {
        self.snapshot()
            .events
            .into_iter()
            .find(|event| event.id == event_id)
    }

    pub fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.read().snapshot.as_ref().and_then(|s| s.last_refreshed)
    }

    /// Bump the sold count after a purchase, ahead of the next refresh.
    pub fn record_purchase(&self, event_id: u64) {
        let mut state = self.write();
        if let Some(local) = state.local_events.get_mut(&event_id) {
            local.tickets_sold = local.tickets_sold.saturating_add(1);
        }
        if let Some(event) = state
            .snapshot
            .as_mut()
            .and_then(|s| s.events.iter_mut().find(|e| e.id == event_id))
        {
            event.tickets_sold = event.tickets_sold.saturating_add(1);
        }
    }

    /// Add an event created without the chain. It gets the next id after everything known.
    pub fn insert_local(&self, mut event: Event) -> Event {
        let mut state = self.write();
        let known_max = state
            .snapshot
            .as_ref()
            .map(|s| s.events.iter().map(|e| e.id).max().unwrap_or(0))
            .unwrap_or_else(|| sample_events(0).len() as u64);
        let local_max = state.local_events.keys().next_back().copied().unwrap_or(0);
        event.id = known_max.max(local_max) + 1;
        state.local_events.insert(event.id, event.clone());
        if let Some(snapshot) = state.snapshot.as_mut() {
            if snapshot.source == EventSource::Sample {
                snapshot.events.push(event.clone());
            }
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{chain::mock::MockChain, models::amount::Amount};

    const ALICE: &str = "0x00000000000000000000000000000000000a11ce";

    fn client(chain: &Arc<MockChain>) -> Arc<dyn ChainClient> {
        chain.clone()
    }

    fn event(name: &str) -> Event {
        let mut event = sample_events(1_000).remove(0);
        event.name = name.to_string();
        event.ticket_contract = None;
        event
    }

    #[tokio::test]
    async fn test_no_client_uses_samples() {
        let reconciler = EventReconciler::new(None, 10);
        assert_eq!(reconciler.last_refreshed(), None);
        let snapshot = reconciler.refresh(&CancellationToken::new()).await.unwrap();
        assert_eq!(snapshot.source, EventSource::Sample);
        assert_eq!(snapshot.events.len(), 3);
        assert!(reconciler.last_refreshed().is_some());
    }

    #[tokio::test]
    async fn test_probes_only_real_records() {
        let chain = Arc::new(MockChain::new(&[ALICE]));
        chain.seed_event(event("One"));
        chain.seed_event(event("Two"));
        let reconciler = EventReconciler::new(Some(client(&chain)), 10);
        let snapshot = reconciler.refresh(&CancellationToken::new()).await.unwrap();
        assert_eq!(snapshot.source, EventSource::Chain);
        let names: Vec<&str> = snapshot.events.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["One", "Two"]);
        assert!(snapshot.events.iter().all(|e| e.id != 0 && !e.name.is_empty()));
        assert_eq!(chain.event_reads(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_count_probes_full_window() {
        let chain = Arc::new(MockChain::new(&[ALICE]));
        chain.seed_event(event("One"));
        chain.seed_event(event("Two"));
        chain.fail_event_count();
        let reconciler = EventReconciler::new(Some(client(&chain)), 10);
        let snapshot = reconciler.refresh(&CancellationToken::new()).await.unwrap();
        assert_eq!(chain.event_reads(), 10);
        let ids: Vec<u64> = snapshot.events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_empty_chain_falls_back_to_samples() {
        let chain = Arc::new(MockChain::new(&[ALICE]));
        let reconciler = EventReconciler::new(Some(client(&chain)), 10);
        let snapshot = reconciler.refresh(&CancellationToken::new()).await.unwrap();
        assert_eq!(snapshot.source, EventSource::Sample);
        assert_eq!(snapshot.events.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_reads_are_skipped() {
        let chain = Arc::new(MockChain::new(&[ALICE]));
        chain.seed_event(event("One"));
        chain.seed_event(event("Two"));
        chain.fail_event_read(1);
        let reconciler = EventReconciler::new(Some(client(&chain)), 3);
        let snapshot = reconciler.refresh(&CancellationToken::new()).await.unwrap();
        assert_eq!(snapshot.events.len(), 1);
        assert_eq!(snapshot.events[0].id, 2);
    }

    #[tokio::test]
    async fn test_cancelled_refresh_keeps_snapshot() {
        let reconciler = EventReconciler::new(Some(client(&Arc::new(MockChain::new(&[ALICE])))), 3);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(reconciler.refresh(&cancel).await.is_none());
        assert_eq!(reconciler.last_refreshed(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_refresh_picks_up_new_event() {
        let chain = Arc::new(MockChain::new(&[ALICE]));
        chain.seed_event(event("One"));
        let reconciler = Arc::new(EventReconciler::new(Some(client(&chain)), 10));
        reconciler.refresh(&CancellationToken::new()).await;
        chain.seed_event(event("Two"));

        let handle = reconciler.schedule_refresh(Duration::from_millis(2_000), CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(reconciler.snapshot().events.len(), 1);
        handle.await.unwrap();
        assert_eq!(reconciler.snapshot().events.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_refresh_cancelled() {
        let reconciler = Arc::new(EventReconciler::new(None, 10));
        let cancel = CancellationToken::new();
        let handle = reconciler.schedule_refresh(Duration::from_secs(2), cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(reconciler.last_refreshed(), None);
    }

    #[tokio::test]
    async fn test_local_events_and_purchases() {
        let reconciler = EventReconciler::new(None, 10);
        reconciler.refresh(&CancellationToken::new()).await;
        let mut created = event("Local Meetup");
        created.ticket_price = Amount::from_wei(1);
        let created = reconciler.insert_local(created);
        assert_eq!(created.id, 4);
        reconciler.record_purchase(4);
        reconciler.record_purchase(1);
        assert_eq!(reconciler.event(4).unwrap().tickets_sold, created.tickets_sold + 1);
        assert_eq!(reconciler.event(1).unwrap().tickets_sold, 46);

        // Survives a refresh.
        reconciler.refresh(&CancellationToken::new()).await;
        assert_eq!(reconciler.snapshot().events.len(), 4);
        assert_eq!(reconciler.event(4).unwrap().tickets_sold, created.tickets_sold + 1);
    }

    #[tokio::test]
    async fn test_filters() {
        let reconciler = EventReconciler::new(None, 10);
        reconciler.refresh(&CancellationToken::new()).await;
        let now = unix_now();
        assert_eq!(reconciler.events(EventFilter::Upcoming, now).len(), 3);
        assert!(reconciler.events(EventFilter::Past, now).is_empty());
    }
}
