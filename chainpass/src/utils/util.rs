// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
const ADDRESS_HEX_LENGTH: usize = 40;

/// Lowercase, `0x`-prefixed and left padded to 20 bytes. Anything that is not hex
/// becomes the zero address.
pub fn standardize_address(address: &str) -> String {
    parse_address(address).unwrap_or_else(|| ZERO_ADDRESS.to_string())
}

/// Standardized form of `address`, or `None` unless it is 1 to 64 hex digits. Longer
/// inputs (abi words) keep their low 20 bytes.
pub fn parse_address(address: &str) -> Option<String> {
    let trimmed = address.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if hex.is_empty() || hex.len() > 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let hex = hex.to_ascii_lowercase();
    if hex.len() >= ADDRESS_HEX_LENGTH {
        Some(format!("0x{}", &hex[hex.len() - ADDRESS_HEX_LENGTH..]))
    } else {
        Some(format!("0x{:0>40}", hex))
    }
}

pub fn is_valid_address(address: &str) -> bool {
    let trimmed = address.trim();
    match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => hex.len() == ADDRESS_HEX_LENGTH && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// An unset, empty or all-zero address means "no contract".
pub fn is_zero_address(address: Option<&str>) -> bool {
    match address.map(str::trim) {
        None | Some("") => true,
        Some(addr) => standardize_address(addr) == ZERO_ADDRESS,
    }
}

/// `0x1234...abcd`, the way organizers are shown in lists.
pub fn short_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

pub fn truncate_str(val: &str, max_chars: usize) -> String {
    let mut trunc = val.to_string();
    if let Some((idx, _)) = trunc.char_indices().nth(max_chars) {
        trunc.truncate(idx);
    }
    trunc
}

/// Seconds since epoch.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

pub fn unix_now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardize_address() {
        assert_eq!(
            standardize_address("0xABCDEF0000000000000000000000000000000001"),
            "0xabcdef0000000000000000000000000000000001"
        );
        assert_eq!(
            standardize_address("0x1"),
            "0x0000000000000000000000000000000000000001"
        );
        // 32 byte abi word keeps the low 20 bytes
        assert_eq!(
            standardize_address(
                "0x000000000000000000000000abcdef0000000000000000000000000000000001"
            ),
            "0xabcdef0000000000000000000000000000000001"
        );
    }

    #[test]
    fn test_non_hex_addresses_do_not_standardize() {
        let accented = format!("{}a", "\u{e9}".repeat(20));
        assert_eq!(parse_address(&accented), None);
        assert_eq!(standardize_address(&accented), ZERO_ADDRESS);
        assert_eq!(parse_address("not-an-address"), None);
        assert_eq!(parse_address("0x"), None);
        assert_eq!(parse_address(&format!("0x{}", "1".repeat(65))), None);
        assert_eq!(
            parse_address("0X5FBDB2315678AFECB367F032D93F642F64180AA3"),
            Some("0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string())
        );
    }

    #[test]
    fn test_zero_address_detection() {
        assert!(is_zero_address(None));
        assert!(is_zero_address(Some("")));
        assert!(is_zero_address(Some("0x0")));
        assert!(is_zero_address(Some(ZERO_ADDRESS)));
        assert!(!is_zero_address(Some(
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        )));
    }

    #[test]
    fn test_is_valid_address() {
        assert!(is_valid_address("0x5FbDB2315678afecb367f032d93F642f64180aa3"));
        assert!(!is_valid_address("5FbDB2315678afecb367f032d93F642f64180aa3"));
        assert!(!is_valid_address("0x5FbDB2315678afecb367f032d93F642f64180aaZ"));
        assert!(!is_valid_address("0x1234"));
    }

    #[test]
    fn test_short_address() {
        assert_eq!(
            short_address("0x5FbDB2315678afecb367f032d93F642f64180aa3"),
            "0x5FbD...0aa3"
        );
        assert_eq!(short_address("0x1"), "0x1");
        let accented = "\u{e9}".repeat(11);
        assert_eq!(
            short_address(&accented),
            format!("{}...{}", "\u{e9}".repeat(6), "\u{e9}".repeat(4))
        );
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("héllo wörld", 5), "héllo");
        assert_eq!(truncate_str("abc", 10), "abc");
    }
}
