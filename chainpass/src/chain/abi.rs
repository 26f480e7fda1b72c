// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Minimal Solidity ABI codec for the handful of calls the event manager and ticket contracts
//! expose. Only static words and `string` are supported.

use crate::{
    models::{amount::Amount, history::EventCreatedLog},
    utils::util::{is_valid_address, standardize_address},
};
use serde_json::{json, Value};
use tiny_keccak::{Hasher, Keccak};

const WORD: usize = 32;

/// Selector of `Error(string)`, the payload of a `require` revert.
const REVERT_ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

pub const GET_EVENT: &str = "getEvent(uint256)";
pub const GET_EVENT_COUNT: &str = "getEventCount()";
pub const CREATE_EVENT: &str = "createEvent(string,string,string,uint256,uint256,uint256,uint256,bool)";
pub const BUY_TICKET: &str = "buyTicket(uint256)";
pub const CHECK_IN: &str = "checkIn(uint256,address)";
pub const BALANCE_OF: &str = "balanceOf(address)";
pub const GET_TICKET_ID: &str = "getTicketId(address)";
pub const IS_TICKET_VALID: &str = "isTicketValid(uint256)";
pub const EVENT_CREATED: &str = "EventCreated(uint256,string,address,address,address)";

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AbiError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Response too short: wanted {wanted} bytes at offset {offset}, have {len}")]
    OutOfBounds {
        offset: usize,
        wanted: usize,
        len: usize,
    },
    #[error("Malformed {0}")]
    Malformed(&'static str),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Uint(Amount),
    Address(String),
    Bool(bool),
    String(String),
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize(&mut out);
    out
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// `topic0` for a log signature, as a 0x-prefixed hex string.
pub fn event_topic(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

pub fn encode_call(signature: &str, tokens: &[Token]) -> Result<Vec<u8>, AbiError> {
    let mut out = selector(signature).to_vec();
    out.extend(encode_tokens(tokens)?);
    Ok(out)
}

/// Head/tail encoding of a flat parameter list.
pub fn encode_tokens(tokens: &[Token]) -> Result<Vec<u8>, AbiError> {
    let head_size = WORD * tokens.len();
    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();
    for token in tokens {
        match token {
            Token::Uint(value) => head.extend_from_slice(&value.to_be_bytes32()),
            Token::Address(address) => head.extend_from_slice(&address_word(address)?),
            Token::Bool(value) => head.extend_from_slice(&u64_word(*value as u64)),
            Token::String(value) => {
                head.extend_from_slice(&u64_word((head_size + tail.len()) as u64));
                tail.extend(encode_bytes(value.as_bytes()));
            },
        }
    }
    head.extend(tail);
    Ok(head)
}

fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let padded = bytes.len().div_ceil(WORD) * WORD;
    let mut out = u64_word(bytes.len() as u64).to_vec();
    out.extend_from_slice(bytes);
    out.resize(WORD + padded, 0);
    out
}

fn u64_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

fn address_word(address: &str) -> Result<[u8; 32], AbiError> {
    if !is_valid_address(address) {
        return Err(AbiError::InvalidAddress(address.to_string()));
    }
    let bytes = hex::decode(&standardize_address(address)[2..])
        .map_err(|_| AbiError::InvalidAddress(address.to_string()))?;
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(word)
}

/// Decode a 0x-prefixed (or bare) hex string.
pub fn decode_hex(data: &str) -> Result<Vec<u8>, AbiError> {
    let trimmed = data.trim();
    let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(digits).map_err(|_| AbiError::Malformed("hex data"))
}

/// Random access reader over return data.
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn slice(&self, offset: usize, wanted: usize) -> Result<&'a [u8], AbiError> {
        let end = offset.checked_add(wanted).ok_or(AbiError::OutOfBounds {
            offset,
            wanted,
            len: self.data.len(),
        })?;
        self.data.get(offset..end).ok_or(AbiError::OutOfBounds {
            offset,
            wanted,
            len: self.data.len(),
        })
    }

    pub fn word(&self, offset: usize) -> Result<&'a [u8], AbiError> {
        self.slice(offset, WORD)
    }

    pub fn uint(&self, offset: usize) -> Result<Amount, AbiError> {
        let word = self.word(offset)?;
        Ok(Amount::from_value(&Value::String(format!(
            "0x{}",
            hex::encode(word)
        ))))
    }

    /// A word used as a length or offset. Anything past the data is out of bounds.
    fn position(&self, offset: usize) -> Result<usize, AbiError> {
        let word = self.word(offset)?;
        if word[..24].iter().any(|b| *b != 0) {
            return Err(AbiError::Malformed("offset"));
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&word[24..]);
        usize::try_from(u64::from_be_bytes(bytes)).map_err(|_| AbiError::Malformed("offset"))
    }

    pub fn address(&self, offset: usize) -> Result<String, AbiError> {
        let word = self.word(offset)?;
        Ok(format!("0x{}", hex::encode(&word[12..])))
    }

    pub fn boolean(&self, offset: usize) -> Result<bool, AbiError> {
        Ok(self.word(offset)?.iter().any(|b| *b != 0))
    }

    /// A `string` whose offset word sits at `offset`, relative to `base`.
    pub fn string(&self, base: usize, offset: usize) -> Result<String, AbiError> {
        let start = base
            .checked_add(self.position(offset)?)
            .ok_or(AbiError::Malformed("string offset"))?;
        let len = self.position(start)?;
        let bytes = self.slice(start.saturating_add(WORD), len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Decode the `getEvent` return tuple into the loose record shape [`Event::from_record`]
/// consumes.
///
/// [`Event::from_record`]: crate::models::event::Event::from_record
pub fn decode_event_record(data: &[u8]) -> Result<Value, AbiError> {
    let decoder = Decoder::new(data);
    let base = decoder.position(0)?;
    let field = |index: usize| base.saturating_add(index * WORD);
    Ok(json!({
        "id": decoder.uint(field(0))?.to_wei_string(),
        "name": decoder.string(base, field(1))?,
        "description": decoder.string(base, field(2))?,
        "imageUri": decoder.string(base, field(3))?,
        "organizer": decoder.address(field(4))?,
        "ticketPrice": decoder.uint(field(5))?.to_wei_string(),
        "maxTickets": decoder.uint(field(6))?.to_wei_string(),
        "ticketsSold": decoder.uint(field(7))?.to_wei_string(),
        "startTime": decoder.uint(field(8))?.to_wei_string(),
        "endTime": decoder.uint(field(9))?.to_wei_string(),
        "isActive": decoder.boolean(field(10))?,
        "ticketContract": decoder.address(field(11))?,
        "checkInContract": decoder.address(field(12))?,
        "isSoulbound": decoder.boolean(field(13))?,
    }))
}

pub fn decode_uint(data: &[u8]) -> Result<Amount, AbiError> {
    Decoder::new(data).uint(0)
}

pub fn decode_bool(data: &[u8]) -> Result<bool, AbiError> {
    Decoder::new(data).boolean(0)
}

/// `EventCreated(uint256 indexed eventId, string name, address indexed organizer,
/// address ticketContract, address checkInContract)`.
pub fn decode_event_created(topics: &[String], data: &[u8]) -> Result<EventCreatedLog, AbiError> {
    if topics.len() < 3 {
        return Err(AbiError::Malformed("EventCreated topics"));
    }
    let event_id = decode_uint(&decode_hex(&topics[1])?)?.as_u64_saturating();
    let organizer = Decoder::new(&decode_hex(&topics[2])?).address(0)?;
    let decoder = Decoder::new(data);
    Ok(EventCreatedLog {
        event_id,
        name: decoder.string(0, 0)?,
        organizer,
        ticket_contract: decoder.address(WORD)?,
        check_in_contract: decoder.address(2 * WORD)?,
        block_number: None,
        transaction_hash: None,
    })
}

/// The reason string of an `Error(string)` revert payload, if that is what `data` holds.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&REVERT_ERROR_SELECTOR[..])?;
    Decoder::new(payload).string(0, 0).ok()
}
