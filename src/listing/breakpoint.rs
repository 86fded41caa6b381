//! `bp` listing entries
//!
//! Current layout:
//! ```text
//! Hardware breakpoint(IVA): addr=0x00001010, len=0x4, num=0
//! Software breakpoint(IVA): addr=0x00001000, len=0x8, orig_instr=0xabcd1234
//! Context breakpoint: asid=0x00000010, len=0x4, num=0
//! Hybrid breakpoint(IVA): addr=0x00001020, len=0x4, num=0
//! ```
//! Legacy layout:
//! ```text
//! Breakpoint(IVA): 0x00001010, 0x4, 0
//! IVA breakpoint: 0x00001000, 0x8, 0xabcd1234
//! Context breakpoint: 0x00000010, 0x4, 0
//! Hybrid breakpoint(IVA): 0x00001020, 0x4, 0
//! ```

use regex::Regex;
use std::sync::OnceLock;

use super::{parse_hex, ListingError};
use crate::types::{BreakpointInfo, BreakpointKind};

static PATTERNS: OnceLock<Vec<(BreakpointKind, Regex)>> = OnceLock::new();

const HEX: &str = r"((?:0x)?[0-9a-fA-F]+)";
const NUM: &str = r"(?:0x)?[0-9a-fA-F]+";

fn patterns() -> &'static [(BreakpointKind, Regex)] {
    PATTERNS.get_or_init(|| {
        let table = [
            (
                BreakpointKind::Hardware,
                format!(r"^Hardware breakpoint\(IVA\): addr={HEX}, len={HEX}, num={NUM}$"),
            ),
            (
                BreakpointKind::Hardware,
                format!(r"^Breakpoint\(IVA\): {HEX}, {HEX}, {NUM}$"),
            ),
            (
                BreakpointKind::Software,
                format!(r"^Software breakpoint\(IVA\): addr={HEX}, len={HEX}, orig_instr={HEX}$"),
            ),
            (
                BreakpointKind::Software,
                format!(r"^IVA breakpoint: {HEX}, {HEX}, {HEX}$"),
            ),
            (
                BreakpointKind::Context,
                format!(r"^Context breakpoint: (?:asid=)?{HEX}, (?:len=)?{HEX}, (?:num=)?{NUM}$"),
            ),
            (
                BreakpointKind::Hybrid,
                format!(r"^Hybrid breakpoint\(IVA\): (?:addr=)?{HEX}, (?:len=)?{HEX}, (?:num=)?{NUM}$"),
            ),
        ];
        table
            .into_iter()
            .map(|(kind, pattern)| {
                (kind, Regex::new(&pattern).expect("breakpoint pattern is valid"))
            })
            .collect()
    })
}

/// Parse one line of the `bp` listing.
///
/// Context and hybrid entries are recognized but rejected with
/// [`ListingError::Unsupported`].
pub fn parse_bp_entry(line: &str) -> Result<BreakpointInfo, ListingError> {
    let malformed = || ListingError::Malformed {
        listing: "breakpoint",
        line: line.to_string(),
    };

    let line_trimmed = line.trim();
    let (kind, caps) = patterns()
        .iter()
        .find_map(|(kind, re)| re.captures(line_trimmed).map(|caps| (*kind, caps)))
        .ok_or_else(malformed)?;

    let field = |i: usize| caps.get(i).and_then(|m| parse_hex(m.as_str()));

    match kind {
        BreakpointKind::Hardware => {
            let addr = field(1).ok_or_else(malformed)?;
            let size = field(2)
                .and_then(|s| u32::try_from(s).ok())
                .ok_or_else(malformed)?;
            Ok(BreakpointInfo::hardware(addr, size))
        }
        BreakpointKind::Software => {
            let addr = field(1).ok_or_else(malformed)?;
            let size = field(2)
                .and_then(|s| u32::try_from(s).ok())
                .ok_or_else(malformed)?;
            let orig_instr = field(3).ok_or_else(malformed)?;
            Ok(BreakpointInfo::software(addr, size, orig_instr))
        }
        BreakpointKind::Context | BreakpointKind::Hybrid => Err(ListingError::Unsupported(kind)),
    }
}
