//! Typed OpenOCD operations
//!
//! Each operation formats a TCL command, runs it through the
//! [`CommandEnvelope`] and interprets the output.

use regex::Regex;
use std::ops::{Deref, DerefMut};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::envelope::{CommandEnvelope, CommandOptions};
use crate::error::{OcdError, Result};
use crate::listing::{self, ListingError};
use crate::transport::TclTransport;
use crate::types::{BreakpointInfo, CommandResult, WatchpointInfo, WatchpointKind};

/// Default address of the OpenOCD TCL server
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6666;

const MEMORY_ACCESS_WIDTHS: [u32; 4] = [8, 16, 32, 64];

static HEX_VALUE_PATTERN: OnceLock<Regex> = OnceLock::new();
static VERSION_PATTERN: OnceLock<Regex> = OnceLock::new();

/// OpenOCD TCL client.
///
/// Not safe for concurrent use: OpenOCD answers commands strictly in order
/// and the protocol carries no request IDs. Use one client per task, or put
/// it behind a mutex.
#[derive(Debug)]
pub struct OpenocdClient {
    envelope: CommandEnvelope,
}

impl Default for OpenocdClient {
    fn default() -> Self {
        let transport = TclTransport::new(DEFAULT_HOST, DEFAULT_PORT)
            .expect("default port is in range");
        Self {
            envelope: CommandEnvelope::new(transport),
        }
    }
}

impl OpenocdClient {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        Ok(Self {
            envelope: CommandEnvelope::new(TclTransport::new(host, port)?),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let mut client = Self::new(config.host.clone(), config.port)?;
        if let Some(timeout) = config.timeout {
            client.set_default_timeout(timeout)?;
        }
        Ok(client)
    }

    pub fn host(&self) -> &str {
        self.envelope.transport().host()
    }

    pub fn port(&self) -> u16 {
        self.envelope.transport().port()
    }

    // =========================================================================
    // Connection
    // =========================================================================

    pub async fn connect(&mut self) -> Result<()> {
        self.envelope.transport_mut().connect().await
    }

    pub fn disconnect(&mut self) {
        self.envelope.transport_mut().disconnect();
    }

    pub async fn reconnect(&mut self) -> Result<()> {
        self.envelope.transport_mut().reconnect().await
    }

    pub fn is_connected(&self) -> bool {
        self.envelope.transport().is_connected()
    }

    /// Connect and return a guard that disconnects when dropped.
    pub async fn connect_scoped(mut self) -> Result<ConnectedClient> {
        self.connect().await?;
        Ok(ConnectedClient { client: self })
    }

    pub fn set_default_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.envelope.transport_mut().set_default_timeout(timeout)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Send a command as-is, without the envelope, and return the reply text.
    pub async fn raw_cmd(&mut self, cmd: &str, timeout: Option<Duration>) -> Result<String> {
        self.envelope.transport_mut().raw_cmd(cmd, timeout).await
    }

    /// Run a command; a nonzero return code is an error.
    pub async fn cmd(&mut self, cmd: &str) -> Result<CommandResult> {
        self.envelope.execute(cmd).await
    }

    pub async fn cmd_with(&mut self, cmd: &str, options: CommandOptions) -> Result<CommandResult> {
        self.envelope.execute_with(cmd, options).await
    }

    async fn cmd_timeout(&mut self, cmd: &str, timeout: Option<Duration>) -> Result<CommandResult> {
        self.cmd_with(cmd, CommandOptions::default().timeout(timeout)).await
    }

    // =========================================================================
    // Target control
    // =========================================================================

    pub async fn halt(&mut self) -> Result<()> {
        self.cmd("halt").await?;
        Ok(())
    }

    /// Resume execution, optionally from `new_pc`.
    pub async fn resume(&mut self, new_pc: Option<u64>) -> Result<()> {
        self.cmd(&with_optional_pc("resume", new_pc)).await?;
        Ok(())
    }

    /// Single-step, optionally from `new_pc`.
    pub async fn step(&mut self, new_pc: Option<u64>) -> Result<()> {
        self.cmd(&with_optional_pc("step", new_pc)).await?;
        Ok(())
    }

    pub async fn reset_halt(&mut self) -> Result<()> {
        self.cmd("reset halt").await?;
        Ok(())
    }

    pub async fn reset_init(&mut self) -> Result<()> {
        self.cmd("reset init").await?;
        Ok(())
    }

    pub async fn reset_run(&mut self) -> Result<()> {
        self.cmd("reset run").await?;
        Ok(())
    }

    /// State of the current target, e.g. `halted` or `running`.
    pub async fn curstate(&mut self) -> Result<String> {
        Ok(self.cmd("[target current] curstate").await?.out.trim().to_string())
    }

    pub async fn is_halted(&mut self) -> Result<bool> {
        Ok(self.curstate().await? == "halted")
    }

    pub async fn is_running(&mut self) -> Result<bool> {
        Ok(self.curstate().await? == "running")
    }

    // =========================================================================
    // Registers
    // =========================================================================

    pub async fn get_reg(&mut self, reg_name: &str, force: bool) -> Result<u64> {
        let result = self.cmd(&get_reg_command(reg_name, force)).await?;
        listing::parse_hex(&result.out).ok_or_else(|| {
            OcdError::invalid_response(
                "Obtained invalid number from get_reg command",
                result.full_cmd.as_str(),
                result.out.as_str(),
            )
        })
    }

    pub async fn set_reg(&mut self, reg_name: &str, value: u64, force: bool) -> Result<()> {
        self.cmd(&set_reg_command(reg_name, value, force)).await?;
        Ok(())
    }

    // =========================================================================
    // Memory
    // =========================================================================

    /// Read `count` items of `bit_width` bits starting at `addr`.
    pub async fn read_memory(
        &mut self,
        addr: u64,
        bit_width: u32,
        count: usize,
        phys: bool,
        timeout: Option<Duration>,
    ) -> Result<Vec<u64>> {
        let cmd = read_memory_command(addr, bit_width, count, phys)?;
        let result = self.cmd_timeout(&cmd, timeout).await?;
        parse_memory_values(&result, count)
    }

    pub async fn write_memory(
        &mut self,
        addr: u64,
        bit_width: u32,
        values: &[u64],
        phys: bool,
        timeout: Option<Duration>,
    ) -> Result<()> {
        let cmd = write_memory_command(addr, bit_width, values, phys)?;
        self.cmd_timeout(&cmd, timeout).await?;
        Ok(())
    }

    // =========================================================================
    // Breakpoints and watchpoints
    // =========================================================================

    pub async fn list_bp(&mut self) -> Result<Vec<BreakpointInfo>> {
        let result = self.cmd("bp").await?;
        result
            .out
            .trim()
            .lines()
            .map(|line| {
                listing::parse_bp_entry(line).map_err(|e| listing_error("bp", &result, e))
            })
            .collect()
    }

    pub async fn add_bp(&mut self, addr: u64, size: u32, hw: bool) -> Result<()> {
        let mut cmd = format!("bp {:#x} {}", addr, size);
        if hw {
            cmd.push_str(" hw");
        }
        self.cmd(&cmd).await?;
        Ok(())
    }

    pub async fn remove_bp(&mut self, addr: u64) -> Result<()> {
        self.cmd(&format!("rbp {:#x}", addr)).await?;
        Ok(())
    }

    pub async fn remove_all_bp(&mut self) -> Result<()> {
        self.cmd("rbp all").await?;
        Ok(())
    }

    pub async fn list_wp(&mut self) -> Result<Vec<WatchpointInfo>> {
        let result = self.cmd("wp").await?;
        result
            .out
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                listing::parse_wp_entry(line).map_err(|e| listing_error("wp", &result, e))
            })
            .collect()
    }

    pub async fn add_wp(&mut self, addr: u64, size: u32, kind: WatchpointKind) -> Result<()> {
        self.cmd(&format!("wp {:#x} {} {}", addr, size, kind.as_tcl())).await?;
        Ok(())
    }

    pub async fn remove_wp(&mut self, addr: u64) -> Result<()> {
        self.cmd(&format!("rwp {:#x}", addr)).await?;
        Ok(())
    }

    pub async fn remove_all_wp(&mut self) -> Result<()> {
        self.cmd("rwp all").await?;
        Ok(())
    }

    // =========================================================================
    // Misc
    // =========================================================================

    pub async fn echo(&mut self, msg: &str) -> Result<()> {
        self.cmd(&format!("echo {{{}}}", msg)).await?;
        Ok(())
    }

    pub async fn version(&mut self) -> Result<String> {
        Ok(self.cmd("version").await?.out.trim().to_string())
    }

    /// OpenOCD version as `(major, minor, patch)`.
    pub async fn version_tuple(&mut self) -> Result<(u32, u32, u32)> {
        let result = self.cmd("version").await?;
        parse_version(&result)
    }

    pub async fn target_names(&mut self) -> Result<Vec<String>> {
        let result = self.cmd("target names").await?;
        Ok(result.out.trim().lines().map(str::to_string).collect())
    }

    pub async fn select_target(&mut self, target_name: &str) -> Result<()> {
        self.cmd(&format!("targets {}", target_name)).await?;
        Ok(())
    }

    pub async fn set_poll(&mut self, enable_polling: bool) -> Result<()> {
        let cmd = if enable_polling { "poll on" } else { "poll off" };
        self.cmd(cmd).await?;
        Ok(())
    }

    /// Leave OpenOCD running and just close the connection.
    pub fn exit(&mut self) {
        self.disconnect();
    }

    /// Ask OpenOCD to terminate, then disconnect.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down OpenOCD");

        // shutdown reports a nonzero code even when it works
        let result = self
            .cmd_with("shutdown", CommandOptions::default().throw(false))
            .await;
        self.disconnect();
        result.map(|_| ())
    }
}

/// Client connected for the lifetime of the guard.
///
/// Dropping the guard disconnects on every exit path, including `?` returns
/// and panics unwinding through the owning scope.
#[derive(Debug)]
pub struct ConnectedClient {
    client: OpenocdClient,
}

impl ConnectedClient {
    /// Disconnect and hand back the client.
    pub fn into_inner(mut self) -> OpenocdClient {
        self.client.disconnect();
        std::mem::take(&mut self.client)
    }
}

impl Deref for ConnectedClient {
    type Target = OpenocdClient;

    fn deref(&self) -> &OpenocdClient {
        &self.client
    }
}

impl DerefMut for ConnectedClient {
    fn deref_mut(&mut self) -> &mut OpenocdClient {
        &mut self.client
    }
}

impl Drop for ConnectedClient {
    fn drop(&mut self) {
        debug!("Scoped OpenOCD session ends");
        self.client.disconnect();
    }
}

fn with_optional_pc(cmd: &str, new_pc: Option<u64>) -> String {
    match new_pc {
        Some(pc) => format!("{} {:#x}", cmd, pc),
        None => cmd.to_string(),
    }
}

fn force_arg(force: bool) -> &'static str {
    if force {
        "-force "
    } else {
        ""
    }
}

fn get_reg_command(reg_name: &str, force: bool) -> String {
    format!("dict get [ get_reg {}{} ] {}", force_arg(force), reg_name, reg_name)
}

fn set_reg_command(reg_name: &str, value: u64, force: bool) -> String {
    format!("set_reg {}{{ {} {:#x} }}", force_arg(force), reg_name, value)
}

fn check_memory_access_params(bit_width: u32) -> Result<()> {
    if !MEMORY_ACCESS_WIDTHS.contains(&bit_width) {
        return Err(OcdError::InvalidArgument(format!(
            "Memory access width must be one of: {:?}",
            MEMORY_ACCESS_WIDTHS
        )));
    }
    Ok(())
}

fn read_memory_command(addr: u64, bit_width: u32, count: usize, phys: bool) -> Result<String> {
    check_memory_access_params(bit_width)?;
    if count < 1 {
        return Err(OcdError::InvalidArgument("Count must be 1 or higher".to_string()));
    }

    let mut cmd = format!("read_memory {:#x} {} {}", addr, bit_width, count);
    if phys {
        cmd.push_str(" phys");
    }
    Ok(cmd)
}

fn write_memory_command(addr: u64, bit_width: u32, values: &[u64], phys: bool) -> Result<String> {
    check_memory_access_params(bit_width)?;
    if values.is_empty() {
        return Err(OcdError::InvalidArgument(
            "At least one value to write must be provided".to_string(),
        ));
    }
    if values.iter().any(|&v| u64::BITS - v.leading_zeros() > bit_width) {
        return Err(OcdError::InvalidArgument(format!(
            "Found a value that exceeds {} bits",
            bit_width
        )));
    }

    let items: Vec<String> = values.iter().map(|v| format!("{:#x}", v)).collect();
    let mut cmd = format!("write_memory {:#x} {} {{{}}}", addr, bit_width, items.join(" "));
    if phys {
        cmd.push_str(" phys");
    }
    Ok(cmd)
}

fn parse_memory_values(result: &CommandResult, count: usize) -> Result<Vec<u64>> {
    let invalid = |msg: String| {
        OcdError::invalid_response(msg, result.full_cmd.as_str(), result.out.as_str())
    };

    let items: Vec<&str> = result.out.trim().split(' ').collect();
    if items.len() != count {
        return Err(invalid(format!(
            "OpenOCD's read_memory command provided different number of values than requested \
             (expected {} but obtained {}).",
            count,
            items.len()
        )));
    }

    let pattern = HEX_VALUE_PATTERN
        .get_or_init(|| Regex::new(r"^0x[0-9a-fA-F]+$").expect("hex value pattern is valid"));

    items
        .into_iter()
        .map(|item| {
            pattern
                .is_match(item)
                .then(|| listing::parse_hex(item))
                .flatten()
                .ok_or_else(|| {
                    invalid("Found an item that is not a valid hexadecimal number".to_string())
                })
        })
        .collect()
}

fn parse_version(result: &CommandResult) -> Result<(u32, u32, u32)> {
    let pattern = VERSION_PATTERN.get_or_init(|| {
        Regex::new(r"Open On-Chip Debugger ([0-9]+)\.([0-9]+)\.([0-9]+)")
            .expect("version pattern is valid")
    });

    let invalid = || {
        OcdError::invalid_response(
            "Unable to parse the version string received from OpenOCD",
            result.full_cmd.as_str(),
            result.out.as_str(),
        )
    };

    let caps = pattern.captures(result.out.trim()).ok_or_else(invalid)?;
    let part = |i: usize| caps[i].parse::<u32>().map_err(|_| invalid());
    Ok((part(1)?, part(2)?, part(3)?))
}

fn listing_error(listing_cmd: &str, result: &CommandResult, error: ListingError) -> OcdError {
    match error {
        ListingError::Unsupported(kind) => OcdError::UnsupportedBreakpoint(kind),
        ListingError::Malformed { .. } => {
            debug!("{}", error);
            OcdError::invalid_response(
                format!("Could not parse the output of '{}' command", listing_cmd),
                result.full_cmd.as_str(),
                result.out.as_str(),
            )
        }
    }
}
