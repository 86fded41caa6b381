//! Parsers for OpenOCD's `bp` and `wp` listings
//!
//! Each parser takes one line of the listing. Older OpenOCD versions print a
//! different layout, so both the current and the legacy form are accepted.

pub mod breakpoint;
pub mod watchpoint;

pub use breakpoint::parse_bp_entry;
pub use watchpoint::parse_wp_entry;

use crate::types::BreakpointKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ListingError {
    #[error("Could not parse {listing} entry: '{line}'")]
    Malformed { listing: &'static str, line: String },

    /// The line was understood, but this kind of breakpoint is not modelled.
    #[error("{0} breakpoints are recognized but not supported")]
    Unsupported(BreakpointKind),
}

/// Parse a hex number, with or without the `0x` prefix.
pub fn parse_hex(s: &str) -> Option<u64> {
    let s = s.trim();
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x10000000"), Some(0x10000000));
        assert_eq!(parse_hex("0X08000000"), Some(0x08000000));
        assert_eq!(parse_hex("DEADBEEF"), Some(0xdeadbeef));
        assert_eq!(parse_hex("  0x100  "), Some(0x100));
        assert_eq!(parse_hex("0xffffffffffffffff"), Some(u64::MAX));
    }

    #[test]
    fn test_parse_hex_invalid() {
        assert_eq!(parse_hex("0xZZZZ"), None);
        assert_eq!(parse_hex("0x"), None);
        assert_eq!(parse_hex(""), None);
        assert_eq!(parse_hex("+12"), None);
        assert_eq!(parse_hex("0x1ffffffffffffffff"), None);
    }
}
