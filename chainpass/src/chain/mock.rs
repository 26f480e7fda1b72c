// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! An in-memory event manager with the same revert behavior as the deployed contract. Used
//! for local runs without a node and throughout the tests.

use super::{
    ChainError, CreateEventParams, EventCreatedWatcher, EventManagerReader, EventManagerWriter,
    TicketContractReader, WalletProvider, BASE_SEPOLIA_CHAIN_ID,
};
use crate::{
    models::{amount::Amount, event::Event, history::EventCreatedLog},
    utils::util::{standardize_address, unix_now, ZERO_ADDRESS},
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Mutex, MutexGuard},
};

#[derive(Default)]
struct MockState {
    events: Vec<Event>,
    /// (ticket contract, owner) -> token id
    holders: HashMap<(String, String), u64>,
    used: HashSet<(String, u64)>,
    logs: Vec<EventCreatedLog>,
    block_number: u64,
    tx_count: u64,
    write_failures: VecDeque<ChainError>,
    failing_event_reads: HashSet<u64>,
    failing_event_count: bool,
    event_reads: u64,
    failing_contracts: HashSet<String>,
    failing_validity_checks: HashSet<String>,
    now_override: Option<u64>,
}

pub struct MockChain {
    state: Mutex<MockState>,
    chain_id: u64,
    accounts: Vec<String>,
}

impl MockChain {
    pub fn new(accounts: &[&str]) -> Self {
        Self::with_chain_id(accounts, BASE_SEPOLIA_CHAIN_ID)
    }

    pub fn with_chain_id(accounts: &[&str], chain_id: u64) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            chain_id,
            accounts: accounts.iter().map(|a| standardize_address(a)).collect(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Address of the ticket contract deployed for `event_id`.
    pub fn ticket_contract_for(event_id: u64) -> String {
        format!("0x{:0>40x}", 0x7100_0000u64 + event_id)
    }

    pub fn check_in_contract_for(event_id: u64) -> String {
        format!("0x{:0>40x}", 0xc100_0000u64 + event_id)
    }

    /// Insert an event directly, bypassing `createEvent` validation. The event id, and its
    /// contracts when unset, are assigned here.
    pub fn seed_event(&self, mut event: Event) -> Event {
        let mut state = self.state();
        event.id = state.events.len() as u64 + 1;
        if event.ticket_contract.is_none() {
            event.ticket_contract = Some(Self::ticket_contract_for(event.id));
        }
        if event.check_in_contract.is_none() {
            event.check_in_contract = Some(Self::check_in_contract_for(event.id));
        }
        state.events.push(event.clone());
        event
    }

    /// Hand `owner` a ticket for `event_id` without a purchase.
    pub fn grant_ticket(&self, event_id: u64, owner: &str) -> Option<u64> {
        let mut state = self.state();
        mint(&mut state, event_id, owner).ok()
    }

    pub fn mark_used(&self, event_id: u64, token_id: u64) {
        let mut state = self.state();
        if let Some(contract) = event_ticket_contract(&state, event_id) {
            state.used.insert((contract, token_id));
        }
    }

    /// The next write fails with `error` instead of executing.
    pub fn fail_next_write(&self, error: ChainError) {
        self.state().write_failures.push_back(error);
    }

    pub fn fail_event_read(&self, event_id: u64) {
        self.state().failing_event_reads.insert(event_id);
    }

    pub fn fail_event_count(&self) {
        self.state().failing_event_count = true;
    }

    /// `getEvent` calls served so far.
    pub fn event_reads(&self) -> u64 {
        self.state().event_reads
    }

    /// Every call to this ticket contract fails, as if it did not implement the interface.
    pub fn break_ticket_contract(&self, ticket_contract: &str) {
        self.state()
            .failing_contracts
            .insert(standardize_address(ticket_contract));
    }

    /// Only `isTicketValid` fails on this contract.
    pub fn break_validity_check(&self, ticket_contract: &str) {
        self.state()
            .failing_validity_checks
            .insert(standardize_address(ticket_contract));
    }

    /// Pin the clock the contract checks event times against.
    pub fn set_now(&self, now: u64) {
        self.state().now_override = Some(now);
    }

    pub fn event(&self, event_id: u64) -> Option<Event> {
        let state = self.state();
        find_event(&state, event_id).cloned()
    }

    pub fn event_count(&self) -> u64 {
        self.state().events.len() as u64
    }
}

fn find_event(state: &MockState, event_id: u64) -> Option<&Event> {
    event_id
        .checked_sub(1)
        .and_then(|index| state.events.get(index as usize))
}

fn event_ticket_contract(state: &MockState, event_id: u64) -> Option<String> {
    find_event(state, event_id).and_then(|e| e.ticket_contract.clone())
}

fn revert(reason: &str) -> ChainError {
    ChainError::Rpc {
        code: 3,
        message: format!("execution reverted: {}", reason),
    }
}

fn mint(state: &mut MockState, event_id: u64, owner: &str) -> Result<u64, ChainError> {
    let index = event_id
        .checked_sub(1)
        .map(|i| i as usize)
        .filter(|i| *i < state.events.len())
        .ok_or_else(|| revert("Event does not exist"))?;
    let event = &mut state.events[index];
    if event.is_sold_out() {
        return Err(revert("Event is sold out"));
    }
    let contract = event
        .ticket_contract
        .clone()
        .ok_or_else(|| revert("Ticket contract not deployed"))?;
    event.tickets_sold += 1;
    let token_id = event.tickets_sold;
    state
        .holders
        .insert((contract, standardize_address(owner)), token_id);
    Ok(token_id)
}

impl MockState {
    fn now(&self) -> u64 {
        self.now_override.unwrap_or_else(unix_now)
    }

    fn next_tx(&mut self) -> Result<String, ChainError> {
        if let Some(error) = self.write_failures.pop_front() {
            return Err(error);
        }
        self.tx_count += 1;
        self.block_number += 1;
        Ok(format!("0x{:064x}", self.tx_count))
    }

    fn check_contract(&self, ticket_contract: &str) -> Result<String, ChainError> {
        let contract = standardize_address(ticket_contract);
        if self.failing_contracts.contains(&contract) {
            return Err(revert("function selector was not recognized"));
        }
        Ok(contract)
    }
}

#[async_trait]
impl EventManagerReader for MockChain {
    async fn get_event(&self, event_id: u64) -> Result<Value, ChainError> {
        let mut state = self.state();
        state.event_reads += 1;
        if state.failing_event_reads.contains(&event_id) {
            return Err(ChainError::Rpc {
                code: -32000,
                message: "header not found".to_string(),
            });
        }
        match find_event(&state, event_id) {
            Some(event) => serde_json::to_value(event)
                .map_err(|e| ChainError::Malformed(e.to_string())),
            // Solidity hands back a zeroed struct for unknown ids.
            None => Ok(json!({
                "id": "0",
                "name": "",
                "description": "",
                "imageUri": "",
                "organizer": ZERO_ADDRESS,
                "ticketPrice": "0",
                "maxTickets": "0",
                "ticketsSold": "0",
                "startTime": "0",
                "endTime": "0",
                "isActive": false,
                "ticketContract": ZERO_ADDRESS,
                "checkInContract": ZERO_ADDRESS,
                "isSoulbound": false,
            })),
        }
    }

    async fn get_event_count(&self) -> Result<u64, ChainError> {
        if self.state().failing_event_count {
            return Err(ChainError::Rpc {
                code: -32000,
                message: "execution reverted".to_string(),
            });
        }
        Ok(self.event_count())
    }
}

#[async_trait]
impl TicketContractReader for MockChain {
    async fn balance_of(&self, ticket_contract: &str, owner: &str) -> Result<Amount, ChainError> {
        let state = self.state();
        let contract = state.check_contract(ticket_contract)?;
        let held = state
            .holders
            .contains_key(&(contract, standardize_address(owner)));
        Ok(Amount::from_wei(held as u64))
    }

    async fn get_ticket_id(&self, ticket_contract: &str, owner: &str) -> Result<u64, ChainError> {
        let state = self.state();
        let contract = state.check_contract(ticket_contract)?;
        state
            .holders
            .get(&(contract, standardize_address(owner)))
            .copied()
            .ok_or_else(|| revert("No ticket owned"))
    }

    async fn is_ticket_valid(&self, ticket_contract: &str, token_id: u64) -> Result<bool, ChainError> {
        let state = self.state();
        let contract = state.check_contract(ticket_contract)?;
        if state.failing_validity_checks.contains(&contract) {
            return Err(revert("function selector was not recognized"));
        }
        Ok(!state.used.contains(&(contract, token_id)))
    }
}

#[async_trait]
impl EventManagerWriter for MockChain {
    async fn create_event(&self, from: &str, params: &CreateEventParams) -> Result<String, ChainError> {
        let mut state = self.state();
        if params.name.trim().is_empty() {
            return Err(revert("Name is required"));
        }
        if params.start_time >= params.end_time {
            return Err(revert("End time must be after start time"));
        }
        if params.max_tickets == 0 {
            return Err(revert("Max tickets must be greater than zero"));
        }
        let tx_hash = state.next_tx()?;
        let id = state.events.len() as u64 + 1;
        let event = Event {
            id,
            name: params.name.clone(),
            description: params.description.clone(),
            image_uri: params.image_uri.clone(),
            organizer: standardize_address(from),
            ticket_price: params.ticket_price.clone(),
            max_tickets: params.max_tickets,
            tickets_sold: 0,
            start_time: params.start_time,
            end_time: params.end_time,
            is_active: true,
            is_soulbound: Some(params.is_soulbound),
            ticket_contract: Some(Self::ticket_contract_for(id)),
            check_in_contract: Some(Self::check_in_contract_for(id)),
        };
        let log = EventCreatedLog {
            event_id: id,
            name: event.name.clone(),
            organizer: event.organizer.clone(),
            ticket_contract: Self::ticket_contract_for(id),
            check_in_contract: Self::check_in_contract_for(id),
            block_number: Some(state.block_number),
            transaction_hash: Some(tx_hash.clone()),
        };
        state.events.push(event);
        state.logs.push(log);
        Ok(tx_hash)
    }

    async fn buy_ticket(&self, from: &str, event_id: u64, value: &Amount) -> Result<String, ChainError> {
        let mut state = self.state();
        let now = state.now();
        let event = find_event(&state, event_id).ok_or_else(|| revert("Event does not exist"))?;
        if !event.is_active {
            return Err(revert("Event is not active"));
        }
        if event.has_ended(now) {
            return Err(revert("Event has ended"));
        }
        if event.is_sold_out() {
            return Err(revert("Event is sold out"));
        }
        if *value != event.ticket_price {
            return Err(revert("Incorrect payment amount"));
        }
        let tx_hash = state.next_tx()?;
        mint(&mut state, event_id, from)?;
        Ok(tx_hash)
    }

    async fn check_in(&self, _from: &str, event_id: u64, attendee: &str) -> Result<String, ChainError> {
        let mut state = self.state();
        let contract = event_ticket_contract(&state, event_id)
            .ok_or_else(|| revert("Event does not exist"))?;
        let token_id = *state
            .holders
            .get(&(contract.clone(), standardize_address(attendee)))
            .ok_or_else(|| revert("Attendee has no ticket"))?;
        if state.used.contains(&(contract.clone(), token_id)) {
            return Err(revert("Ticket already used"));
        }
        let tx_hash = state.next_tx()?;
        state.used.insert((contract, token_id));
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, _tx_hash: &str) -> Result<(), ChainError> {
        Ok(())
    }
}

#[async_trait]
impl EventCreatedWatcher for MockChain {
    async fn latest_block(&self) -> Result<u64, ChainError> {
        Ok(self.state().block_number)
    }

    async fn event_created_logs(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<EventCreatedLog>, ChainError> {
        let state = self.state();
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.block_number
                    .map_or(false, |block| block >= from_block && block <= to_block)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WalletProvider for MockChain {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn accounts(&self) -> Result<Vec<String>, ChainError> {
        Ok(self.accounts.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0x00000000000000000000000000000000000a11ce";

    fn params(max_tickets: u64) -> CreateEventParams {
        CreateEventParams {
            name: "Rust Nights".to_string(),
            description: "Talks".to_string(),
            image_uri: String::new(),
            ticket_price: Amount::from_wei(1_000),
            max_tickets,
            start_time: 2_000,
            end_time: 3_000,
            is_soulbound: false,
        }
    }

    #[tokio::test]
    async fn test_create_buy_and_check_in() {
        let chain = MockChain::new(&[ALICE]);
        chain.set_now(1_000);
        chain.create_event(ALICE, &params(1)).await.unwrap();
        let event = Event::from_record(&chain.get_event(1).await.unwrap()).unwrap();
        assert_eq!(event.name, "Rust Nights");
        assert!(Event::from_record(&chain.get_event(2).await.unwrap()).is_none());

        chain
            .buy_ticket(ALICE, 1, &Amount::from_wei(1_000))
            .await
            .unwrap();
        let contract = MockChain::ticket_contract_for(1);
        assert_eq!(
            chain.balance_of(&contract, ALICE).await.unwrap(),
            Amount::from_wei(1)
        );
        let token = chain.get_ticket_id(&contract, ALICE).await.unwrap();
        assert!(chain.is_ticket_valid(&contract, token).await.unwrap());

        let err = chain
            .buy_ticket(ALICE, 1, &Amount::from_wei(1_000))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "execution reverted: Event is sold out");

        chain.check_in(ALICE, 1, ALICE).await.unwrap();
        assert!(!chain.is_ticket_valid(&contract, token).await.unwrap());
        assert!(chain.check_in(ALICE, 1, ALICE).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_write_failure() {
        let chain = MockChain::new(&[ALICE]);
        chain.fail_next_write(ChainError::user_rejected());
        let err = chain.create_event(ALICE, &params(5)).await.unwrap_err();
        assert!(err.is_user_rejection());
        assert_eq!(chain.event_count(), 0);
        chain.create_event(ALICE, &params(5)).await.unwrap();
        assert_eq!(chain.event_count(), 1);
    }

    #[tokio::test]
    async fn test_event_created_logs_by_block() {
        let chain = MockChain::new(&[ALICE]);
        chain.create_event(ALICE, &params(5)).await.unwrap();
        chain.create_event(ALICE, &params(5)).await.unwrap();
        let latest = chain.latest_block().await.unwrap();
        assert_eq!(latest, 2);
        let logs = chain.event_created_logs(2, latest).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].event_id, 2);
    }
}
