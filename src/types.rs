//! Value types produced by the client

use serde::Serialize;
use std::fmt;

/// Result of one finished TCL command, as reported by the command envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    /// Command as given by the caller
    pub cmd: String,
    /// Command as sent on the wire (wrapped in the envelope)
    pub full_cmd: String,
    /// TCL return code; zero means success
    pub retcode: i64,
    /// Textual output of the command, possibly empty
    pub out: String,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        self.retcode == 0
    }
}

/// Breakpoint kinds OpenOCD can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointKind {
    Hardware,
    Software,
    Context,
    Hybrid,
}

impl fmt::Display for BreakpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BreakpointKind::Hardware => "hardware",
            BreakpointKind::Software => "software",
            BreakpointKind::Context => "context",
            BreakpointKind::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// A single breakpoint from the `bp` listing.
///
/// Only hardware and software breakpoints can be constructed. The original
/// instruction is present exactly when the breakpoint is a software one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakpointInfo {
    addr: u64,
    size: u32,
    kind: BreakpointKind,
    orig_instr: Option<u64>,
}

impl BreakpointInfo {
    pub fn hardware(addr: u64, size: u32) -> Self {
        Self {
            addr,
            size,
            kind: BreakpointKind::Hardware,
            orig_instr: None,
        }
    }

    pub fn software(addr: u64, size: u32, orig_instr: u64) -> Self {
        Self {
            addr,
            size,
            kind: BreakpointKind::Software,
            orig_instr: Some(orig_instr),
        }
    }

    pub fn addr(&self) -> u64 {
        self.addr
    }

    /// Breakpoint length in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn kind(&self) -> BreakpointKind {
        self.kind
    }

    /// Instruction replaced by the software breakpoint
    pub fn orig_instr(&self) -> Option<u64> {
        self.orig_instr
    }
}

/// Watchpoint access kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchpointKind {
    Read,
    Write,
    #[default]
    Access,
}

impl WatchpointKind {
    /// Argument accepted by the `wp` command
    pub fn as_tcl(&self) -> &'static str {
        match self {
            WatchpointKind::Read => "r",
            WatchpointKind::Write => "w",
            WatchpointKind::Access => "a",
        }
    }
}

impl fmt::Display for WatchpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tcl())
    }
}

/// A single watchpoint from the `wp` listing.
///
/// Value and mask are as wide as the target's data bus, up to 64 bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchpointInfo {
    pub addr: u64,
    pub size: u32,
    pub kind: WatchpointKind,
    pub value: u64,
    pub mask: u64,
}
