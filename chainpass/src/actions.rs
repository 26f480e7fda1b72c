// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! User-initiated writes: buying a ticket, creating an event and checking an attendee in.
//!
//! Each action opens a PENDING notification, runs the write (or its demo simulation when mock
//! mode is on) and settles the notification with the outcome. Checks that can be made locally,
//! such as a sold-out event, fail before anything is sent. Failed writes feed the mock mode
//! failure counter.

use crate::{
    chain::{ChainClient, ChainError, CreateEventParams},
    errors::TransactionError,
    mock_mode::MockMode,
    models::{
        amount::Amount,
        event::Event,
        history::EventSighting,
        ticket::{CheckInPayload, Ticket},
    },
    notifications::{NewNotification, NotificationId, NotificationTracker, NotificationUpdate, TxStatus},
    reconciler::EventReconciler,
    session::WalletSession,
    storage::{history_cache::HistoryCache, StorageError},
    utils::util::{short_address, unix_now, ZERO_ADDRESS},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PurchaseOutcome {
    Submitted { tx_hash: String },
    Demo { ticket: Ticket },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Submitted { tx_hash: String },
    Demo { event: Event },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckInOutcome {
    Submitted { tx_hash: String, event_id: u64, attendee: String },
    Simulated { event_id: u64, attendee: String },
    Demo { ticket_id: u64 },
}

/// The create-event form as entered.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateEventForm {
    pub name: String,
    pub description: String,
    pub image_uri: String,
    pub start_time: u64,
    pub end_time: u64,
    /// Whole units, e.g. `"0.05"`.
    pub ticket_price_eth: String,
    pub max_tickets: u64,
    pub is_soulbound: bool,
}

impl CreateEventForm {
    pub fn validate(&self) -> Result<CreateEventParams, TransactionError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(TransactionError::InvalidInput("Event name is required".to_string()));
        }
        if self.start_time >= self.end_time {
            return Err(TransactionError::InvalidInput(
                "End time must be after start time".to_string(),
            ));
        }
        if self.max_tickets == 0 {
            return Err(TransactionError::InvalidInput(
                "Maximum tickets must be at least 1".to_string(),
            ));
        }
        let ticket_price = Amount::from_eth_str(&self.ticket_price_eth).ok_or_else(|| {
            TransactionError::InvalidInput(format!(
                "Invalid ticket price: {}",
                self.ticket_price_eth
            ))
        })?;
        Ok(CreateEventParams {
            name: name.to_string(),
            description: self.description.trim().to_string(),
            image_uri: self.image_uri.trim().to_string(),
            ticket_price,
            max_tickets: self.max_tickets,
            start_time: self.start_time,
            end_time: self.end_time,
            is_soulbound: self.is_soulbound,
        })
    }
}

/// A failed action and whether it says anything about the chain.
struct Failure {
    error: TransactionError,
    counts: bool,
}

impl Failure {
    /// Caught before anything was sent.
    fn local(error: TransactionError) -> Self {
        Self {
            error,
            counts: false,
        }
    }
}

impl From<ChainError> for Failure {
    fn from(error: ChainError) -> Self {
        let error = TransactionError::from(error);
        Self {
            counts: error.counts_as_chain_failure(),
            error,
        }
    }
}

impl From<StorageError> for Failure {
    fn from(error: StorageError) -> Self {
        Self::local(TransactionError::Failed(error.to_string()))
    }
}

pub struct TicketingActions {
    client: Option<Arc<dyn ChainClient>>,
    session: Arc<WalletSession>,
    notifications: NotificationTracker,
    mock_mode: Arc<MockMode>,
    reconciler: Arc<EventReconciler>,
    demo_tickets: Arc<HistoryCache<Ticket>>,
    event_history: Arc<HistoryCache<EventSighting>>,
}

impl TicketingActions {
    pub fn new(
        client: Option<Arc<dyn ChainClient>>,
        session: Arc<WalletSession>,
        notifications: NotificationTracker,
        mock_mode: Arc<MockMode>,
        reconciler: Arc<EventReconciler>,
        demo_tickets: Arc<HistoryCache<Ticket>>,
        event_history: Arc<HistoryCache<EventSighting>>,
    ) -> Self {
        Self {
            client,
            session,
            notifications,
            mock_mode,
            reconciler,
            demo_tickets,
            event_history,
        }
    }

    pub fn notifications(&self) -> &NotificationTracker {
        &self.notifications
    }

    fn use_mock(&self) -> bool {
        self.client.is_none() || self.mock_mode.is_enabled()
    }

    fn signer(&self) -> Result<(&dyn ChainClient, &str), Failure> {
        match (&self.client, self.session.account()) {
            (Some(client), Some(account)) => Ok((client.as_ref(), account)),
            _ => Err(Failure::local(TransactionError::InvalidInput(
                "Connect a wallet to send transactions".to_string(),
            ))),
        }
    }

    fn open(&self, message: String) -> NotificationId {
        self.notifications.add(NewNotification {
            auto_close: Some(false),
            ..NewNotification::pending(message)
        })
    }

    fn submitted(&self, id: NotificationId, tx_hash: &str) {
        self.notifications.update(
            id,
            NotificationUpdate {
                message: Some("Transaction submitted, waiting for confirmation...".to_string()),
                ..Default::default()
            }
            .with_hash(tx_hash),
        );
    }

    fn settle<T>(&self, id: NotificationId, result: Result<(T, String), Failure>) -> Result<T, TransactionError> {
        match result {
            Ok((outcome, message)) => {
                self.notifications.update(id, NotificationUpdate {
                    auto_close: Some(true),
                    ..NotificationUpdate::finished(TxStatus::Success, message)
                });
                Ok(outcome)
            },
            Err(failure) => {
                let mut message = failure.error.to_string();
                if failure.counts && self.mock_mode.record_failure() {
                    message.push_str(". Switched to demo mode after repeated failures");
                }
                warn!(
                    notification_id = id,
                    error = %failure.error,
                    "[Actions] Transaction failed"
                );
                self.notifications.update(id, NotificationUpdate {
                    auto_close: Some(true),
                    ..NotificationUpdate::finished(failure.error.status(), message)
                });
                Err(failure.error)
            },
        }
    }

    pub async fn buy_ticket(&self, event_id: u64) -> Result<PurchaseOutcome, TransactionError> {
        let label = self
            .reconciler
            .event(event_id)
            .map(|e| e.name)
            .unwrap_or_else(|| format!("event #{}", event_id));
        let id = self.open(format!("Purchasing ticket for {}...", label));
        let result = self.buy_ticket_inner(event_id, id).await;
        self.settle(id, result)
    }

    async fn buy_ticket_inner(
        &self,
        event_id: u64,
        notification: NotificationId,
    ) -> Result<(PurchaseOutcome, String), Failure> {
        let event = self.reconciler.event(event_id).ok_or_else(|| {
            Failure::local(TransactionError::InvalidInput(format!(
                "Event {} not found",
                event_id
            )))
        })?;
        let now = unix_now();
        if !event.is_active {
            return Err(Failure::local(TransactionError::reverted("Event is not active")));
        }
        if event.has_ended(now) {
            return Err(Failure::local(TransactionError::reverted("Event has ended")));
        }
        if event.is_sold_out() {
            return Err(Failure::local(TransactionError::reverted("Event is sold out")));
        }

        if self.use_mock() {
            let ticket = {
                let mut rng = rand::thread_rng();
                Ticket::demo(&event, &mut rng, Utc::now())
            };
            self.demo_tickets.append(ticket.clone())?;
            self.reconciler.record_purchase(event_id);
            info!(event_id = event_id, ticket_id = ticket.id, "[Actions] Created demo ticket");
            let message = format!(
                "Demo ticket #{} for {} created. No blockchain transaction was sent.",
                ticket.id, event.name
            );
            return Ok((PurchaseOutcome::Demo { ticket }, message));
        }

        let (client, account) = self.signer()?;
        let tx_hash = client
            .buy_ticket(account, event_id, &event.ticket_price)
            .await?;
        self.submitted(notification, &tx_hash);
        client.wait_for_confirmation(&tx_hash).await?;
        self.reconciler.record_purchase(event_id);
        info!(event_id = event_id, tx_hash = tx_hash.as_str(), "[Actions] Ticket purchased");
        let message = format!("Ticket purchased for {}", event.name);
        Ok((PurchaseOutcome::Submitted { tx_hash }, message))
    }

    pub async fn create_event(&self, form: &CreateEventForm) -> Result<CreateOutcome, TransactionError> {
        let id = self.open(format!("Creating event {}...", form.name.trim()));
        let result = self.create_event_inner(form, id).await;
        self.settle(id, result)
    }

    async fn create_event_inner(
        &self,
        form: &CreateEventForm,
        notification: NotificationId,
    ) -> Result<(CreateOutcome, String), Failure> {
        let params = form.validate().map_err(Failure::local)?;

        if self.use_mock() {
            let organizer = self.session.account().unwrap_or(ZERO_ADDRESS).to_string();
            let event = self.reconciler.insert_local(Event {
                id: 0,
                name: params.name.clone(),
                description: params.description.clone(),
                image_uri: params.image_uri.clone(),
                organizer: organizer.clone(),
                ticket_price: params.ticket_price.clone(),
                max_tickets: params.max_tickets,
                tickets_sold: 0,
                start_time: params.start_time,
                end_time: params.end_time,
                is_active: true,
                is_soulbound: Some(params.is_soulbound),
                ticket_contract: None,
                check_in_contract: None,
            });
            self.event_history.append(EventSighting {
                event_id: event.id,
                name: event.name.clone(),
                organizer,
                ticket_contract: ZERO_ADDRESS.to_string(),
                check_in_contract: ZERO_ADDRESS.to_string(),
                block_number: None,
                transaction_hash: None,
                timestamp: Utc::now(),
            })?;
            info!(event_id = event.id, "[Actions] Created demo event");
            let message = format!(
                "Demo event \"{}\" created. No blockchain transaction was sent.",
                event.name
            );
            return Ok((CreateOutcome::Demo { event }, message));
        }

        let (client, account) = self.signer()?;
        let tx_hash = client.create_event(account, &params).await?;
        self.submitted(notification, &tx_hash);
        client.wait_for_confirmation(&tx_hash).await?;
        info!(tx_hash = tx_hash.as_str(), "[Actions] Event created");
        let message = format!("Event \"{}\" created", params.name);
        Ok((CreateOutcome::Submitted { tx_hash }, message))
    }

    /// `code` is what the attendee presents: `<event id>-<address>` or `DEMO-TICKET-<id>`.
    pub async fn check_in(&self, code: &str) -> Result<CheckInOutcome, TransactionError> {
        let id = self.open("Checking in attendee...".to_string());
        let result = self.check_in_inner(code, id).await;
        self.settle(id, result)
    }

    async fn check_in_inner(
        &self,
        code: &str,
        notification: NotificationId,
    ) -> Result<(CheckInOutcome, String), Failure> {
        let payload = code
            .parse::<CheckInPayload>()
            .map_err(|e| Failure::local(TransactionError::InvalidInput(e.to_string())))?;
        match payload {
            CheckInPayload::Demo { ticket_id } => {
                let mut already_used = false;
                let found = self.demo_tickets.update(&ticket_id.to_string(), |ticket| {
                    already_used = ticket.is_used;
                    ticket.is_used = true;
                })?;
                if !found {
                    return Err(Failure::local(TransactionError::InvalidInput(format!(
                        "Unknown demo ticket #{}",
                        ticket_id
                    ))));
                }
                if already_used {
                    return Err(Failure::local(TransactionError::reverted("Ticket already used")));
                }
                let message = format!("Demo ticket #{} checked in", ticket_id);
                Ok((CheckInOutcome::Demo { ticket_id }, message))
            },
            CheckInPayload::Attendee { event_id, address } => {
                if self.use_mock() {
                    let message = format!(
                        "Checked in {} for event #{}. No blockchain transaction was sent.",
                        short_address(&address),
                        event_id
                    );
                    return Ok((
                        CheckInOutcome::Simulated {
                            event_id,
                            attendee: address,
                        },
                        message,
                    ));
                }
                let (client, account) = self.signer()?;
                let tx_hash = client.check_in(account, event_id, &address).await?;
                self.submitted(notification, &tx_hash);
                client.wait_for_confirmation(&tx_hash).await?;
                let message = format!(
                    "Checked in {} for event #{}",
                    short_address(&address),
                    event_id
                );
                Ok((
                    CheckInOutcome::Submitted {
                        tx_hash,
                        event_id,
                        attendee: address,
                    },
                    message,
                ))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        chain::mock::MockChain,
        storage::{
            history_cache::EvictionPolicy, KeyValueStore, MemoryStore, DEMO_TICKETS_KEY,
            EVENT_HISTORY_KEY,
        },
    };
    use tokio_util::sync::CancellationToken;

    const ALICE: &str = "0x00000000000000000000000000000000000a11ce";
    const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

    struct Harness {
        chain: Arc<MockChain>,
        actions: TicketingActions,
        mock_mode: Arc<MockMode>,
        demo_tickets: Arc<HistoryCache<Ticket>>,
    }

    async fn harness(with_chain: bool) -> Harness {
        let chain = Arc::new(MockChain::new(&[ALICE]));
        let client = with_chain.then(|| chain.clone() as Arc<dyn ChainClient>);
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let contract = with_chain.then_some(CONTRACT);
        let mock_mode = Arc::new(MockMode::new(store.clone(), contract, 2, false));
        let reconciler = Arc::new(EventReconciler::new(client.clone(), 10));
        let demo_tickets = Arc::new(HistoryCache::new(
            store.clone(),
            DEMO_TICKETS_KEY,
            EvictionPolicy::new(50, None),
        ));
        let event_history = Arc::new(HistoryCache::new(
            store,
            EVENT_HISTORY_KEY,
            EvictionPolicy::new(50, None),
        ));
        let session = Arc::new(WalletSession::offline(Some(ALICE)));
        let actions = TicketingActions::new(
            client,
            session,
            NotificationTracker::default(),
            mock_mode.clone(),
            reconciler,
            demo_tickets.clone(),
            event_history,
        );
        Harness {
            chain,
            actions,
            mock_mode,
            demo_tickets,
        }
    }

    fn form(name: &str) -> CreateEventForm {
        let now = unix_now();
        CreateEventForm {
            name: name.to_string(),
            description: "Talks".to_string(),
            image_uri: String::new(),
            start_time: now + 3_600,
            end_time: now + 7_200,
            ticket_price_eth: "0.01".to_string(),
            max_tickets: 2,
            is_soulbound: false,
        }
    }

    async fn refresh(harness: &Harness) {
        harness
            .actions
            .reconciler
            .refresh(&CancellationToken::new())
            .await;
    }

    #[test]
    fn test_form_validation() {
        let valid = form("Rust Nights").validate().unwrap();
        assert_eq!(valid.ticket_price, Amount::from_wei(10_000_000_000_000_000));

        let mut bad = form("  ");
        assert!(matches!(bad.validate(), Err(TransactionError::InvalidInput(_))));
        bad = form("x");
        bad.end_time = bad.start_time;
        assert!(bad.validate().is_err());
        bad = form("x");
        bad.max_tickets = 0;
        assert!(bad.validate().is_err());
        bad = form("x");
        bad.ticket_price_eth = "-1".to_string();
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_buy_on_chain() {
        let h = harness(true).await;
        h.actions.create_event(&form("Rust Nights")).await.unwrap();
        refresh(&h).await;

        let outcome = h.actions.buy_ticket(1).await.unwrap();
        assert!(matches!(outcome, PurchaseOutcome::Submitted { .. }));
        let note = &h.actions.notifications().list()[0];
        assert_eq!(note.status, TxStatus::Success);
        assert!(note.hash.is_some());
        assert_eq!(h.actions.reconciler.event(1).unwrap().tickets_sold, 1);
        assert_eq!(h.chain.event(1).unwrap().tickets_sold, 1);
    }

    #[tokio::test]
    async fn test_rejected_buy_does_not_count_as_failure() {
        let h = harness(true).await;
        h.actions.create_event(&form("Rust Nights")).await.unwrap();
        refresh(&h).await;
        h.chain.fail_next_write(ChainError::user_rejected());

        let err = h.actions.buy_ticket(1).await.unwrap_err();
        assert_eq!(err, TransactionError::UserRejected);
        let note = &h.actions.notifications().list()[0];
        assert_eq!(note.status, TxStatus::Rejected);
        assert!(note.message.contains("rejected in your wallet"));
        assert_eq!(h.mock_mode.failure_count(), 0);
        assert_eq!(h.chain.event(1).unwrap().tickets_sold, 0);
    }

    #[tokio::test]
    async fn test_sold_out_fails_before_sending() {
        let h = harness(true).await;
        let mut event = crate::models::event::sample_events(unix_now()).remove(0);
        event.tickets_sold = event.max_tickets;
        event.ticket_contract = None;
        h.chain.seed_event(event);
        refresh(&h).await;

        let err = h.actions.buy_ticket(1).await.unwrap_err();
        assert_eq!(err, TransactionError::reverted("Event is sold out"));
        let note = &h.actions.notifications().list()[0];
        assert_eq!(note.status, TxStatus::Error);
        assert_eq!(note.message, "Transaction reverted: Event is sold out");
        assert_eq!(h.mock_mode.failure_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_failures_switch_to_demo_purchases() {
        let h = harness(true).await;
        h.actions.create_event(&form("Rust Nights")).await.unwrap();
        refresh(&h).await;
        for _ in 0..2 {
            h.chain.fail_next_write(ChainError::Rpc {
                code: -32000,
                message: "execution reverted: Incorrect payment amount".to_string(),
            });
            assert!(h.actions.buy_ticket(1).await.is_err());
        }
        assert!(h.mock_mode.is_enabled());
        assert!(h.actions.notifications().list()[0]
            .message
            .ends_with("Switched to demo mode after repeated failures"));

        let outcome = h.actions.buy_ticket(1).await.unwrap();
        let PurchaseOutcome::Demo { ticket } = outcome else {
            panic!("expected a demo ticket");
        };
        assert_eq!(h.demo_tickets.load(), vec![ticket]);
        assert_eq!(h.chain.event(1).unwrap().tickets_sold, 0);
    }

    #[tokio::test]
    async fn test_demo_create_and_check_in() {
        let h = harness(false).await;
        refresh(&h).await;
        let CreateOutcome::Demo { event } = h.actions.create_event(&form("Local")).await.unwrap() else {
            panic!("expected a demo event");
        };
        assert_eq!(event.id, 4);

        let PurchaseOutcome::Demo { ticket } = h.actions.buy_ticket(event.id).await.unwrap() else {
            panic!("expected a demo ticket");
        };
        let code = ticket.qr_payload.clone().unwrap();
        assert_eq!(
            h.actions.check_in(&code).await.unwrap(),
            CheckInOutcome::Demo { ticket_id: ticket.id }
        );
        assert!(h.demo_tickets.load()[0].is_used);
        assert_eq!(
            h.actions.check_in(&code).await.unwrap_err(),
            TransactionError::reverted("Ticket already used")
        );
        assert!(h.actions.check_in("DEMO-TICKET-1").await.is_err());
    }

    #[tokio::test]
    async fn test_check_in_on_chain() {
        let h = harness(true).await;
        h.actions.create_event(&form("Rust Nights")).await.unwrap();
        refresh(&h).await;
        h.actions.buy_ticket(1).await.unwrap();

        let code = format!("1-{}", ALICE);
        let outcome = h.actions.check_in(&code).await.unwrap();
        assert!(matches!(outcome, CheckInOutcome::Submitted { event_id: 1, .. }));
        let err = h.actions.check_in(&code).await.unwrap_err();
        assert_eq!(err, TransactionError::reverted("Ticket already used"));
        assert!(h.actions.check_in("garbage").await.is_err());
    }
}
