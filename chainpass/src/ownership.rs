// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    chain::{ChainClient, ChainError},
    models::{event::Event, ticket::Ticket},
    storage::history_cache::HistoryCache,
    utils::{
        counters::{CONTRACT_READ_ERRORS_COUNT, RESOLVED_TICKETS},
        util::standardize_address,
    },
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Finds the tickets an account holds.
///
/// Events are visited one after another. A ticket contract that errors, including one that
/// does not implement the expected interface, is logged and skipped. Demo tickets from the
/// local cache are appended after the chain tickets.
pub struct OwnershipResolver {
    client: Option<Arc<dyn ChainClient>>,
    demo_tickets: Arc<HistoryCache<Ticket>>,
}

impl OwnershipResolver {
    pub fn new(client: Option<Arc<dyn ChainClient>>, demo_tickets: Arc<HistoryCache<Ticket>>) -> Self {
        Self {
            client,
            demo_tickets,
        }
    }

    /// Chain tickets held by `account` followed by the cached demo tickets. Without an
    /// account only the demo tickets are returned.
    pub async fn resolve(
        &self,
        account: Option<&str>,
        events: &[Event],
        cancel: &CancellationToken,
    ) -> Vec<Ticket> {
        let account = account.map(standardize_address);
        let mut tickets = vec![];
        if let (Some(client), Some(account)) = (&self.client, account.as_deref()) {
            for event in events {
                if cancel.is_cancelled() {
                    debug!("[Ownership] Resolution cancelled");
                    break;
                }
                let Some(contract) = event.ticket_contract_address() else {
                    continue;
                };
                match resolve_one(client.as_ref(), contract, account, event).await {
                    Ok(Some(ticket)) => tickets.push(ticket),
                    Ok(None) => {},
                    Err(e) => {
                        CONTRACT_READ_ERRORS_COUNT
                            .with_label_values(&["ownership"])
                            .inc();
                        warn!(
                            event_id = event.id,
                            ticket_contract = contract,
                            error = %e,
                            "[Ownership] Failed to resolve ticket, skipping event"
                        );
                    },
                }
            }
        }
        let chain_count = tickets.len();
        let demo = self.demo_tickets.load();
        let demo_count = demo.len();
        tickets.extend(demo);

        RESOLVED_TICKETS
            .with_label_values(&["chain"])
            .set(chain_count as i64);
        RESOLVED_TICKETS
            .with_label_values(&["demo"])
            .set(demo_count as i64);
        info!(
            account = account.as_deref().unwrap_or_default(),
            chain_tickets = chain_count,
            demo_tickets = demo_count,
            "[Ownership] Resolved tickets"
        );
        tickets
    }
}

async fn resolve_one(
    client: &dyn ChainClient,
    contract: &str,
    account: &str,
    event: &Event,
) -> Result<Option<Ticket>, ChainError> {
    let balance = client.balance_of(contract, account).await?;
    if balance.is_zero() {
        return Ok(None);
    }
    let token_id = client.get_ticket_id(contract, account).await?;
    // An unknown validity shows the ticket as used.
    let is_valid = match client.is_ticket_valid(contract, token_id).await {
        Ok(valid) => valid,
        Err(e) => {
            warn!(
                event_id = event.id,
                token_id = token_id,
                error = %e,
                "[Ownership] Validity check failed, treating ticket as used"
            );
            false
        },
    };
    Ok(Some(Ticket::from_chain(token_id, event, is_valid, account)))
}
