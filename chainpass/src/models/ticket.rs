// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::event::Event;
use crate::utils::util::{is_valid_address, standardize_address};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const DEMO_TICKET_PREFIX: &str = "DEMO-TICKET-";

/// Demo ticket ids have four to six digits.
const DEMO_TICKET_ID_RANGE: std::ops::Range<u64> = 1_000..1_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketSource {
    Chain,
    Demo,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: u64,
    pub event_id: u64,
    pub is_used: bool,
    #[serde(default)]
    pub purchased_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub qr_payload: Option<String>,
    pub source: TicketSource,
    /// Snapshot of the event at resolution time, for display.
    #[serde(default)]
    pub event: Option<Event>,
}

impl Ticket {
    pub fn from_chain(id: u64, event: &Event, is_valid: bool, owner: &str) -> Self {
        Self {
            id,
            event_id: event.id,
            is_used: !is_valid,
            purchased_at: None,
            qr_payload: Some(
                CheckInPayload::Attendee {
                    event_id: event.id,
                    address: standardize_address(owner),
                }
                .to_string(),
            ),
            source: TicketSource::Chain,
            event: Some(event.clone()),
        }
    }

    /// A client-side ticket for mock mode purchases.
    pub fn demo<R: Rng>(event: &Event, rng: &mut R, purchased_at: DateTime<Utc>) -> Self {
        let id = rng.gen_range(DEMO_TICKET_ID_RANGE);
        Self {
            id,
            event_id: event.id,
            is_used: false,
            purchased_at: Some(purchased_at),
            qr_payload: Some(CheckInPayload::Demo { ticket_id: id }.to_string()),
            source: TicketSource::Demo,
            event: Some(event.clone()),
        }
    }

    pub fn is_demo(&self) -> bool {
        self.source == TicketSource::Demo
    }
}

/// What the attendee shows at the door.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckInPayload {
    Attendee { event_id: u64, address: String },
    Demo { ticket_id: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Invalid check-in code: {0}")]
pub struct InvalidCheckInPayload(pub String);

impl fmt::Display for CheckInPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckInPayload::Attendee { event_id, address } => write!(f, "{}-{}", event_id, address),
            CheckInPayload::Demo { ticket_id } => write!(f, "{}{}", DEMO_TICKET_PREFIX, ticket_id),
        }
    }
}

impl FromStr for CheckInPayload {
    type Err = InvalidCheckInPayload;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        let invalid = || InvalidCheckInPayload(code.to_string());
        if let Some(id) = code.strip_prefix(DEMO_TICKET_PREFIX) {
            let ticket_id = id.parse::<u64>().map_err(|_| invalid())?;
            return Ok(CheckInPayload::Demo { ticket_id });
        }
        let (event_id, address) = code.split_once('-').ok_or_else(invalid)?;
        let event_id = event_id.parse::<u64>().map_err(|_| invalid())?;
        if event_id == 0 || !is_valid_address(address) {
            return Err(invalid());
        }
        Ok(CheckInPayload::Attendee {
            event_id,
            address: standardize_address(address),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::sample_events;
    use rand::{rngs::StdRng, SeedableRng};

    const OWNER: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    #[test]
    fn test_demo_ticket_ids_have_four_to_six_digits() {
        let event = sample_events(0).remove(0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let ticket = Ticket::demo(&event, &mut rng, Utc::now());
            let digits = ticket.id.to_string().len();
            assert!((4..=6).contains(&digits), "{}", ticket.id);
            assert!(ticket.is_demo());
            assert_eq!(
                ticket.qr_payload.as_deref(),
                Some(format!("DEMO-TICKET-{}", ticket.id).as_str())
            );
        }
    }

    #[test]
    fn test_chain_ticket_marks_invalid_as_used() {
        let event = sample_events(0).remove(1);
        let ticket = Ticket::from_chain(9, &event, false, OWNER);
        assert!(ticket.is_used);
        assert_eq!(ticket.source, TicketSource::Chain);
        assert_eq!(
            ticket.qr_payload.unwrap(),
            "2-0x5fbdb2315678afecb367f032d93f642f64180aa3"
        );
    }

    #[test]
    fn test_parse_check_in_payload() {
        let payload: CheckInPayload = format!("12-{}", OWNER).parse().unwrap();
        assert_eq!(payload, CheckInPayload::Attendee {
            event_id: 12,
            address: standardize_address(OWNER),
        });
        let demo: CheckInPayload = "DEMO-TICKET-4521".parse().unwrap();
        assert_eq!(demo, CheckInPayload::Demo { ticket_id: 4521 });

        assert!("".parse::<CheckInPayload>().is_err());
        assert!("12".parse::<CheckInPayload>().is_err());
        assert!("abc-0x1".parse::<CheckInPayload>().is_err());
        assert!(format!("0-{}", OWNER).parse::<CheckInPayload>().is_err());
        assert!("DEMO-TICKET-x".parse::<CheckInPayload>().is_err());
    }

    #[test]
    fn test_payload_display_round_trip() {
        let payload = CheckInPayload::Attendee {
            event_id: 5,
            address: standardize_address(OWNER),
        };
        assert_eq!(payload.to_string().parse::<CheckInPayload>().unwrap(), payload);
    }
}
