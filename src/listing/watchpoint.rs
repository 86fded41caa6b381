//! `wp` listing entries
//!
//! ```text
//! address: 0x00002000, len: 0x00000004, r/w/a: a, value: 0x00000000, mask: 0xffffffffffffffff
//! ```
//! Older OpenOCD versions print `0` instead of `a` for access watchpoints.

use regex::Regex;
use std::sync::OnceLock;

use super::{parse_hex, ListingError};
use crate::types::{WatchpointInfo, WatchpointKind};

static WP_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Parse one line of the `wp` listing.
pub fn parse_wp_entry(line: &str) -> Result<WatchpointInfo, ListingError> {
    let pattern = WP_PATTERN.get_or_init(|| {
        Regex::new(
            r"^address: (0x[0-9a-fA-F]+), len: (0x[0-9a-fA-F]+), r/w/a: ([rwa0]), value: (0x[0-9a-fA-F]+), mask: (0x[0-9a-fA-F]+)$",
        )
        .expect("watchpoint pattern is valid")
    });

    let malformed = || ListingError::Malformed {
        listing: "watchpoint",
        line: line.to_string(),
    };

    let caps = pattern.captures(line.trim()).ok_or_else(malformed)?;
    let field = |i: usize| caps.get(i).and_then(|m| parse_hex(m.as_str()));

    let kind = match &caps[3] {
        "r" => WatchpointKind::Read,
        "w" => WatchpointKind::Write,
        _ => WatchpointKind::Access,
    };

    Ok(WatchpointInfo {
        addr: field(1).ok_or_else(malformed)?,
        size: field(2)
            .and_then(|s| u32::try_from(s).ok())
            .ok_or_else(malformed)?,
        kind,
        value: field(4).ok_or_else(malformed)?,
        mask: field(5).ok_or_else(malformed)?,
    })
}
