// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    actions::TicketingActions,
    chain::{rpc::RpcClient, ChainClient, ChainError},
    config::{ChainpassConfig, RECENT_EVENTS_CAPACITY},
    mock_mode::MockMode,
    models::{history::EventSighting, ticket::Ticket},
    notifications::NotificationTracker,
    ownership::OwnershipResolver,
    reconciler::EventReconciler,
    session::WalletSession,
    storage::{
        history_cache::{EvictionPolicy, HistoryCache},
        FileStore, KeyValueStore, DEMO_TICKETS_KEY, EVENT_HISTORY_KEY, RECENT_EVENTS_KEY,
    },
    utils::{counters::EVENT_CREATED_SEEN_COUNT, util::short_address},
};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct Worker {
    config: ChainpassConfig,
    client: Option<Arc<dyn ChainClient>>,
    session: Arc<WalletSession>,
    mock_mode: Arc<MockMode>,
    reconciler: Arc<EventReconciler>,
    resolver: Arc<OwnershipResolver>,
    actions: TicketingActions,
    recent_events: Arc<HistoryCache<EventSighting>>,
    event_history: Arc<HistoryCache<EventSighting>>,
}

impl Worker {
    pub async fn new(config: ChainpassConfig) -> Result<Self> {
        let event_manager = config.event_manager_address();
        let client = match (&config.rpc_url, &event_manager) {
            (Some(rpc_url), Some(event_manager)) => {
                let client = RpcClient::new(
                    rpc_url.clone(),
                    event_manager,
                    Duration::from_secs(config.confirmation_timeout_secs),
                )
                .context("Failed to build RPC client")?;
                info!(
                    event_manager = event_manager.as_str(),
                    "[Worker] Using event manager contract"
                );
                Some(Arc::new(client) as Arc<dyn ChainClient>)
            },
            (None, Some(_)) => bail!("rpc_url is required when an event manager address is set"),
            (_, None) => {
                info!("[Worker] No event manager configured, running on demo data");
                None
            },
        };
        let store = FileStore::new(&config.storage_dir).with_context(|| {
            format!(
                "Failed to open storage directory {}",
                config.storage_dir.display()
            )
        })?;
        Self::with_client(config, client, Arc::new(store)).await
    }

    /// Build a worker around an existing client and store.
    pub async fn with_client(
        config: ChainpassConfig,
        client: Option<Arc<dyn ChainClient>>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let event_manager = config.event_manager_address();
        let mock_mode = Arc::new(MockMode::new(
            store.clone(),
            event_manager.as_deref(),
            config.mock_mode_failure_threshold,
            config.demo_mode,
        ));
        if let Some(reason) = mock_mode.reason() {
            info!(reason = ?reason, "[Worker] Mock mode enabled");
        }

        let session = Arc::new(
            WalletSession::connect(client.as_ref(), config.account.as_deref(), config.chain_id)
                .await
                .context("Failed to connect wallet session")?,
        );

        let ttl = config.history_ttl();
        let history_policy = EvictionPolicy::new(config.history_capacity, ttl);
        let recent_events = Arc::new(HistoryCache::new(
            store.clone(),
            RECENT_EVENTS_KEY,
            EvictionPolicy::new(RECENT_EVENTS_CAPACITY, ttl),
        ));
        let event_history = Arc::new(HistoryCache::new(
            store.clone(),
            EVENT_HISTORY_KEY,
            history_policy,
        ));
        let demo_tickets = Arc::new(HistoryCache::new(store, DEMO_TICKETS_KEY, history_policy));

        let reconciler = Arc::new(EventReconciler::new(
            client.clone(),
            config.max_events_to_probe,
        ));
        let resolver = Arc::new(OwnershipResolver::new(client.clone(), demo_tickets.clone()));

        let mut notifications = NotificationTracker::new(session.cancellation_token());
        if let Some(explorer_url) = &config.explorer_url {
            notifications = notifications.with_explorer_url(explorer_url.as_str());
        }
        let actions = TicketingActions::new(
            client.clone(),
            session.clone(),
            notifications,
            mock_mode.clone(),
            reconciler.clone(),
            demo_tickets,
            event_history.clone(),
        );

        Ok(Self {
            config,
            client,
            session,
            mock_mode,
            reconciler,
            resolver,
            actions,
            recent_events,
            event_history,
        })
    }

    pub fn session(&self) -> &Arc<WalletSession> {
        &self.session
    }

    pub fn reconciler(&self) -> &Arc<EventReconciler> {
        &self.reconciler
    }

    pub fn actions(&self) -> &TicketingActions {
        &self.actions
    }

    pub fn mock_mode(&self) -> &Arc<MockMode> {
        &self.mock_mode
    }

    pub fn recent_events(&self) -> &Arc<HistoryCache<EventSighting>> {
        &self.recent_events
    }

    pub fn event_history(&self) -> &Arc<HistoryCache<EventSighting>> {
        &self.event_history
    }

    /// Re-read the events and resolve the session account's tickets against them.
    pub async fn refresh(&self) -> Vec<Ticket> {
        refresh_and_resolve(
            &self.reconciler,
            &self.resolver,
            self.session.account(),
            &self.session.cancellation_token(),
        )
        .await
    }

    /// Start the periodic refresh and, with a chain client, the `EventCreated` listener.
    /// Both stop when the session disconnects.
    pub fn start_background_tasks(&self) {
        let period = Duration::from_secs(self.config.refresh_interval_secs.max(1));
        let reconciler = self.reconciler.clone();
        let resolver = self.resolver.clone();
        let account = self.session.account().map(str::to_string);
        let cancel = self.session.cancellation_token();
        self.session.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let tickets =
                    refresh_and_resolve(&reconciler, &resolver, account.as_deref(), &cancel).await;
                debug!(tickets = tickets.len(), "[Worker] Periodic refresh complete");
            }
        });

        if let Some(client) = &self.client {
            let listener = EventCreatedListener {
                client: client.clone(),
                reconciler: self.reconciler.clone(),
                recent_events: self.recent_events.clone(),
                event_history: self.event_history.clone(),
                refresh_delay: Duration::from_millis(self.config.event_created_refresh_delay_ms),
                cancel: self.session.cancellation_token(),
            };
            let poll_interval = Duration::from_secs(self.config.event_poll_interval_secs.max(1));
            self.session.spawn(listener.run(poll_interval));
        }
    }

    pub async fn run(&self) -> Result<()> {
        info!(
            account = self.session.account().map(short_address).unwrap_or_default().as_str(),
            chain_id = self.session.chain_id().unwrap_or_default(),
            mock_mode = self.mock_mode.is_enabled(),
            "[Worker] Starting"
        );
        let tickets = self.refresh().await;
        info!(
            events = self.reconciler.snapshot().events.len(),
            tickets = tickets.len(),
            "[Worker] Initial sync complete"
        );
        self.start_background_tasks();

        let cancel = self.session.cancellation_token();
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res.context("Failed to listen for shutdown signal")?;
                info!("[Worker] Shutdown requested");
            },
            _ = cancel.cancelled() => {},
        }
        self.shutdown().await;
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.actions.notifications().shutdown();
        self.session.disconnect().await;
    }
}

async fn refresh_and_resolve(
    reconciler: &EventReconciler,
    resolver: &OwnershipResolver,
    account: Option<&str>,
    cancel: &CancellationToken,
) -> Vec<Ticket> {
    let Some(snapshot) = reconciler.refresh(cancel).await else {
        return vec![];
    };
    resolver.resolve(account, &snapshot.events, cancel).await
}

/// Polls for `EventCreated` logs, records each one in the recent and full history lists
/// and schedules a delayed refresh so the new event shows up once it is readable.
pub struct EventCreatedListener {
    client: Arc<dyn ChainClient>,
    reconciler: Arc<EventReconciler>,
    recent_events: Arc<HistoryCache<EventSighting>>,
    event_history: Arc<HistoryCache<EventSighting>>,
    refresh_delay: Duration,
    cancel: CancellationToken,
}

impl EventCreatedListener {
    /// Handle logs from `from_block` up to the chain head. Returns the block to poll from next.
    pub async fn poll_once(&self, from_block: u64) -> Result<u64, ChainError> {
        let latest = self.client.latest_block().await?;
        if latest < from_block {
            return Ok(from_block);
        }
        let logs = self.client.event_created_logs(from_block, latest).await?;
        if logs.is_empty() {
            return Ok(latest + 1);
        }

        let observed_at = Utc::now();
        for log in &logs {
            EVENT_CREATED_SEEN_COUNT.inc();
            let sighting = EventSighting::from_log(log, observed_at);
            info!(
                event_id = sighting.event_id,
                name = sighting.name.as_str(),
                organizer = sighting.organizer_display().as_str(),
                "[Worker] Observed EventCreated"
            );
            for cache in [&self.recent_events, &self.event_history] {
                if let Err(e) = cache.append(sighting.clone()) {
                    warn!(
                        storage_key = cache.key(),
                        error = %e,
                        "[Worker] Failed to record event sighting"
                    );
                }
            }
        }
        self.reconciler
            .schedule_refresh(self.refresh_delay, self.cancel.clone());
        Ok(latest + 1)
    }

    async fn run(self, poll_interval: Duration) {
        let mut next_block = None;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(poll_interval) => {},
            }
            let from_block = match next_block {
                Some(block) => block,
                // Only logs after startup are of interest.
                None => match self.client.latest_block().await {
                    Ok(block) => {
                        next_block = Some(block + 1);
                        continue;
                    },
                    Err(e) => {
                        warn!(error = %e, "[Worker] Failed to read latest block");
                        continue;
                    },
                },
            };
            match self.poll_once(from_block).await {
                Ok(next) => next_block = Some(next),
                Err(e) => warn!(
                    from_block = from_block,
                    error = %e,
                    "[Worker] Failed to poll EventCreated logs"
                ),
            }
        }
    }
}
