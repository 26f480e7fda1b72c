// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Integer amounts as they come back from the contract surface.
//!
//! Contract reads hand us uint256 values in several encodings depending on the source: a
//! JSON number, a decimal string (sometimes with a trailing `n` big-int marker), a hex string,
//! or a big-number object such as `{"_hex": "0x..."}`. [`RawAmount`] names those shapes and
//! [`Amount::parse`] is the one place that turns any of them into a value. Parsing never fails;
//! anything unreadable is zero.

use bigdecimal::{BigDecimal, ToPrimitive};
use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::{fmt, str::FromStr};

pub const ETH_DECIMALS: usize = 18;

static WEI_PER_ETH: Lazy<BigDecimal> =
    Lazy::new(|| BigDecimal::from(1_000_000_000_000_000_000u64));

/// The largest uint256. Readings beyond it saturate here.
static UINT256_MAX: Lazy<BigDecimal> = Lazy::new(|| {
    BigDecimal::from_str(
        "115792089237316195423570985008687907853269984665640564039457584007913129639935",
    )
    .unwrap_or_default()
});
const UINT256_DECIMAL_DIGITS: usize = 78;
const UINT256_HEX_DIGITS: usize = 64;

/// Object keys under which big-number libraries keep their digits.
const BIG_INT_OBJECT_KEYS: [&str; 4] = ["_hex", "hex", "$bigint", "value"];

#[derive(Clone, Debug, PartialEq)]
pub enum RawAmount {
    Native(serde_json::Number),
    Text(String),
    BigInt(String),
    Missing,
}

impl From<&Value> for RawAmount {
    fn from(value: &Value) -> Self {
        match value {
            Value::Number(n) => RawAmount::Native(n.clone()),
            Value::String(s) => RawAmount::Text(s.clone()),
            Value::Object(map) => BIG_INT_OBJECT_KEYS
                .iter()
                .find_map(|key| match map.get(*key) {
                    Some(Value::String(s)) => Some(RawAmount::BigInt(s.clone())),
                    Some(Value::Number(n)) => Some(RawAmount::BigInt(n.to_string())),
                    _ => None,
                })
                .unwrap_or(RawAmount::Missing),
            Value::Null | Value::Bool(_) | Value::Array(_) => RawAmount::Missing,
        }
    }
}

/// A non-negative integer count of the smallest currency unit (wei).
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(BigDecimal);

impl Amount {
    pub fn zero() -> Self {
        Self(BigDecimal::from(0))
    }

    pub fn from_wei(wei: u64) -> Self {
        Self(BigDecimal::from(wei))
    }

    /// The canonical tolerant parse. Never fails, unreadable input is zero.
    pub fn parse(raw: &RawAmount) -> Self {
        let parsed = match raw {
            RawAmount::Native(n) => parse_native(n),
            RawAmount::Text(s) | RawAmount::BigInt(s) => parse_text(s),
            RawAmount::Missing => None,
        };
        parsed.map(Self::normalize).unwrap_or_default()
    }

    pub fn from_value(value: &Value) -> Self {
        Self::parse(&RawAmount::from(value))
    }

    /// Scale a whole-unit decimal string (e.g. `"0.05"`) into wei. Returns `None` when the
    /// input is not a non-negative decimal number.
    pub fn from_eth_str(eth: &str) -> Option<Self> {
        let value = parse_decimal(eth.trim())?;
        if value < BigDecimal::from(0) {
            return None;
        }
        Some(Self::normalize(value * &*WEI_PER_ETH))
    }

    pub fn from_eth_f64(eth: f64) -> Option<Self> {
        if !eth.is_finite() {
            return None;
        }
        Self::from_eth_str(&format!("{}", eth))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigDecimal::from(0)
    }

    /// Base 10 digits of the wei value.
    pub fn to_wei_string(&self) -> String {
        let (digits, _) = self.0.with_scale(0).as_bigint_and_exponent();
        digits.to_string()
    }

    pub fn as_u64_saturating(&self) -> u64 {
        self.0.to_u64().unwrap_or(u64::MAX)
    }

    /// 32 byte big-endian word, as used in abi encoding.
    pub fn to_be_bytes32(&self) -> [u8; 32] {
        let (digits, _) = self.0.with_scale(0).as_bigint_and_exponent();
        let (_, bytes) = digits.to_bytes_be();
        let mut word = [0u8; 32];
        let len = bytes.len().min(32);
        word[32 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
        word
    }

    /// Whole units with trailing zeros trimmed: 50000000000000000 wei is `"0.05"`.
    pub fn format_eth(&self) -> String {
        let digits = self.to_wei_string();
        let (whole, fraction) = if digits.len() > ETH_DECIMALS {
            let split = digits.len() - ETH_DECIMALS;
            (digits[..split].to_string(), digits[split..].to_string())
        } else {
            ("0".to_string(), format!("{:0>18}", digits))
        };
        let fraction = fraction.trim_end_matches('0');
        if fraction.is_empty() {
            whole
        } else {
            format!("{}.{}", whole, fraction)
        }
    }

    pub fn to_eth_f64(&self) -> f64 {
        self.format_eth().parse::<f64>().unwrap_or(0.0)
    }

    fn normalize(value: BigDecimal) -> Self {
        if value < BigDecimal::from(0) {
            Self::zero()
        } else {
            Self(value.with_scale(0).min(UINT256_MAX.clone()))
        }
    }
}

fn parse_native(n: &serde_json::Number) -> Option<BigDecimal> {
    if let Some(v) = n.as_u64() {
        return Some(BigDecimal::from(v));
    }
    if let Some(v) = n.as_i64() {
        return Some(BigDecimal::from(v));
    }
    n.as_f64()
        .filter(|f| f.is_finite())
        .and_then(|f| BigDecimal::from_str(&format!("{}", f)).ok())
}

fn parse_text(s: &str) -> Option<BigDecimal> {
    let trimmed = s.trim();
    let trimmed = trimmed.strip_suffix('n').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }
    match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => parse_hex(hex),
        None => parse_decimal(trimmed),
    }
}

/// Plain positional notation only. Exponents are refused, since `1e100000000` would
/// expand into a hundred million digits.
fn parse_decimal(s: &str) -> Option<BigDecimal> {
    let negative = s.starts_with('-');
    let unsigned = s.strip_prefix(|c| c == '+' || c == '-').unwrap_or(s);
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !negative && whole.trim_start_matches('0').len() > UINT256_DECIMAL_DIGITS {
        return Some(UINT256_MAX.clone());
    }
    BigDecimal::from_str(s).ok()
}

fn parse_hex(hex: &str) -> Option<BigDecimal> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let hex = hex.trim_start_matches('0');
    if hex.len() > UINT256_HEX_DIGITS {
        return Some(UINT256_MAX.clone());
    }
    let sixteen = BigDecimal::from(16);
    let mut acc = BigDecimal::from(0);
    for c in hex.chars() {
        let nibble = c.to_digit(16)?;
        acc = acc * &sixteen + BigDecimal::from(nibble);
    }
    Some(acc)
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_wei_string())
    }
}

impl From<u64> for Amount {
    fn from(wei: u64) -> Self {
        Self::from_wei(wei)
    }
}

// Persisted as a decimal string; a JSON number would lose precision above 2^53.
impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wei_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}
