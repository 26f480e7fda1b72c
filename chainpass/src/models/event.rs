// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::amount::Amount;
use crate::utils::util::{is_zero_address, parse_address, ZERO_ADDRESS};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shown whenever an event carries no image of its own.
pub const DEFAULT_IMAGE_URI: &str = "https://images.unsplash.com/photo-1639322537228-f710d846310a?ixlib=rb-4.0.3&auto=format&fit=crop&w=1332&q=80";

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub image_uri: String,
    pub organizer: String,
    pub ticket_price: Amount,
    pub max_tickets: u64,
    #[serde(default)]
    pub tickets_sold: u64,
    pub start_time: u64,
    pub end_time: u64,
    pub is_active: bool,
    #[serde(default)]
    pub is_soulbound: Option<bool>,
    #[serde(default)]
    pub ticket_contract: Option<String>,
    #[serde(default)]
    pub check_in_contract: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Live,
    Ended,
    Inactive,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventFilter {
    #[default]
    All,
    Upcoming,
    Past,
}

impl EventFilter {
    pub fn matches(&self, event: &Event, now: u64) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Upcoming => event.start_time > now,
            EventFilter::Past => event.end_time < now,
        }
    }
}

impl Event {
    /// Normalize one `getEvent` result. `None` unless the record has a non-zero id and a
    /// non-empty name, which is how a probe past the last real id comes back.
    pub fn from_record(record: &Value) -> Option<Self> {
        let id = Amount::from_value(record.get("id")?).as_u64_saturating();
        let name = record.get("name").and_then(Value::as_str).unwrap_or("").trim();
        if id == 0 || name.is_empty() {
            return None;
        }
        let image_uri = record
            .get("imageUri")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
            .unwrap_or(DEFAULT_IMAGE_URI);

        Some(Self {
            id,
            name: name.to_string(),
            description: string_field(record, "description"),
            image_uri: image_uri.to_string(),
            organizer: record
                .get("organizer")
                .and_then(Value::as_str)
                .and_then(parse_address)
                .unwrap_or_else(|| ZERO_ADDRESS.to_string()),
            ticket_price: amount_field(record, "ticketPrice"),
            max_tickets: amount_field(record, "maxTickets").as_u64_saturating(),
            tickets_sold: amount_field(record, "ticketsSold").as_u64_saturating(),
            start_time: amount_field(record, "startTime").as_u64_saturating(),
            end_time: amount_field(record, "endTime").as_u64_saturating(),
            is_active: bool_field(record, "isActive").unwrap_or(false),
            is_soulbound: bool_field(record, "isSoulbound"),
            ticket_contract: address_field(record, "ticketContract"),
            check_in_contract: address_field(record, "checkInContract"),
        })
    }

    pub fn available_tickets(&self) -> u64 {
        self.max_tickets.saturating_sub(self.tickets_sold)
    }

    pub fn is_sold_out(&self) -> bool {
        self.available_tickets() == 0
    }

    pub fn has_ended(&self, now: u64) -> bool {
        now >= self.end_time
    }

    /// Inactive wins over timing.
    pub fn status(&self, now: u64) -> EventStatus {
        if !self.is_active {
            EventStatus::Inactive
        } else if self.has_ended(now) {
            EventStatus::Ended
        } else if now < self.start_time {
            EventStatus::Upcoming
        } else {
            EventStatus::Live
        }
    }

    pub fn can_purchase(&self, now: u64) -> bool {
        self.is_active && !self.has_ended(now) && !self.is_sold_out()
    }

    pub fn is_transferable(&self) -> bool {
        !self.is_soulbound.unwrap_or(false)
    }

    /// Ticket contract address, if the event has a real one.
    pub fn ticket_contract_address(&self) -> Option<&str> {
        self.ticket_contract
            .as_deref()
            .filter(|addr| !is_zero_address(Some(addr)))
    }
}

fn string_field(record: &Value, key: &str) -> String {
    record
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn amount_field(record: &Value, key: &str) -> Amount {
    record.get(key).map(Amount::from_value).unwrap_or_default()
}

fn bool_field(record: &Value, key: &str) -> Option<bool> {
    match record.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse::<bool>().ok(),
        Value::Number(n) => n.as_u64().map(|v| v != 0),
        _ => None,
    }
}

fn address_field(record: &Value, key: &str) -> Option<String> {
    record
        .get(key)
        .and_then(Value::as_str)
        .and_then(parse_address)
}

/// The fixed demo catalogue used whenever the chain is unconfigured or returns nothing.
/// Start times are relative to `now` so the list is always upcoming.
pub fn sample_events(now: u64) -> Vec<Event> {
    vec![
        Event {
            id: 1,
            name: "Blockchain Developer Summit".to_string(),
            description: "Join the largest gathering of blockchain developers to learn about the latest in Web3 technology.".to_string(),
            image_uri: "https://images.unsplash.com/photo-1516245834210-c4c142787335?ixlib=rb-4.0.3&auto=format&fit=crop".to_string(),
            organizer: ZERO_ADDRESS.to_string(),
            ticket_price: Amount::from_wei(50_000_000_000_000_000),
            max_tickets: 100,
            tickets_sold: 45,
            start_time: now + SECONDS_PER_DAY * 2,
            end_time: now + SECONDS_PER_DAY * 3,
            is_active: true,
            is_soulbound: Some(false),
            ticket_contract: None,
            check_in_contract: None,
        },
        Event {
            id: 2,
            name: "NFT Art Exhibition".to_string(),
            description: "Explore the intersection of art and technology in this exclusive NFT showcase.".to_string(),
            image_uri: "https://images.unsplash.com/photo-1642427749670-f20e2e76ed8c?ixlib=rb-4.0.3&auto=format&fit=crop".to_string(),
            organizer: ZERO_ADDRESS.to_string(),
            ticket_price: Amount::from_wei(100_000_000_000_000_000),
            max_tickets: 50,
            tickets_sold: 22,
            start_time: now + SECONDS_PER_DAY * 5,
            end_time: now + SECONDS_PER_DAY * 6,
            is_active: true,
            is_soulbound: Some(true),
            ticket_contract: None,
            check_in_contract: None,
        },
        Event {
            id: 3,
            name: "Web3 Music Festival".to_string(),
            description: "Three stages of live music with on-chain ticketing and collectible passes.".to_string(),
            image_uri: DEFAULT_IMAGE_URI.to_string(),
            organizer: ZERO_ADDRESS.to_string(),
            ticket_price: Amount::from_wei(75_000_000_000_000_000),
            max_tickets: 500,
            tickets_sold: 120,
            start_time: now + SECONDS_PER_DAY * 10,
            end_time: now + SECONDS_PER_DAY * 12,
            is_active: true,
            is_soulbound: Some(false),
            ticket_contract: None,
            check_in_contract: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "id": "3n",
            "name": "Rust Meetup",
            "description": "Talks",
            "imageUri": "",
            "organizer": "0xAbCdEf0000000000000000000000000000000001",
            "ticketPrice": {"_hex": "0xb1a2bc2ec50000"},
            "maxTickets": 10,
            "startTime": "1700000000",
            "endTime": 1700003600,
            "isActive": true,
            "ticketContract": "0x00000000000000000000000000000000000000aa",
            "checkInContract": "0x0000000000000000000000000000000000000000"
        })
    }

    #[test]
    fn test_from_record_normalizes_fields() {
        let event = Event::from_record(&record()).unwrap();
        assert_eq!(event.id, 3);
        assert_eq!(event.image_uri, DEFAULT_IMAGE_URI);
        assert_eq!(
            event.organizer,
            "0xabcdef0000000000000000000000000000000001"
        );
        assert_eq!(event.ticket_price.format_eth(), "0.05");
        assert_eq!(event.max_tickets, 10);
        assert_eq!(event.tickets_sold, 0);
        assert_eq!(event.start_time, 1_700_000_000);
        assert_eq!(event.is_soulbound, None);
        assert_eq!(
            event.ticket_contract_address(),
            Some("0x00000000000000000000000000000000000000aa")
        );
    }

    #[test]
    fn test_malformed_addresses_fall_back() {
        let mut raw = record();
        raw["organizer"] = json!(format!("{}a", "\u{e9}".repeat(20)));
        raw["ticketContract"] = json!("not-an-address");
        raw["checkInContract"] = json!(42);
        let event = Event::from_record(&raw).unwrap();
        assert_eq!(event.organizer, ZERO_ADDRESS);
        assert_eq!(event.ticket_contract, None);
        assert_eq!(event.ticket_contract_address(), None);
        assert_eq!(event.check_in_contract, None);
    }

    #[test]
    fn test_empty_records_are_rejected() {
        assert!(Event::from_record(&json!({"id": 0, "name": "x"})).is_none());
        assert!(Event::from_record(&json!({"id": 4, "name": ""})).is_none());
        assert!(Event::from_record(&json!({"id": 4, "name": "   "})).is_none());
        assert!(Event::from_record(&json!({"name": "no id"})).is_none());
        assert!(Event::from_record(&json!(null)).is_none());
    }

    #[test]
    fn test_status() {
        let mut event = Event::from_record(&record()).unwrap();
        assert_eq!(event.status(1_699_999_999), EventStatus::Upcoming);
        assert_eq!(event.status(1_700_000_001), EventStatus::Live);
        assert_eq!(event.status(1_700_003_600), EventStatus::Ended);
        event.is_active = false;
        assert_eq!(event.status(1_699_999_999), EventStatus::Inactive);
    }

    #[test]
    fn test_sold_out() {
        let mut event = Event::from_record(&record()).unwrap();
        event.tickets_sold = 10;
        assert_eq!(event.available_tickets(), 0);
        assert!(event.is_sold_out());
        assert!(!event.can_purchase(0));
        event.tickets_sold = 12;
        assert_eq!(event.available_tickets(), 0);
    }

    #[test]
    fn test_filters() {
        let event = Event::from_record(&record()).unwrap();
        assert!(EventFilter::All.matches(&event, 0));
        assert!(EventFilter::Upcoming.matches(&event, 0));
        assert!(!EventFilter::Past.matches(&event, 0));
        assert!(EventFilter::Past.matches(&event, 1_800_000_000));
    }

    #[test]
    fn test_sample_events_are_upcoming() {
        let now = 1_700_000_000;
        let samples = sample_events(now);
        assert_eq!(samples.len(), 3);
        for event in &samples {
            assert_eq!(event.status(now), EventStatus::Upcoming);
            assert!(event.start_time < event.end_time);
        }
        assert_eq!(sample_events(now), samples);
    }

    #[test]
    fn test_serde_roundtrip_keeps_amount_string() {
        let event = sample_events(0).remove(0);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["ticketPrice"], json!("50000000000000000"));
        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
