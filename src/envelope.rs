//! Command envelope
//!
//! Every command is sent wrapped as
//!
//! ```text
//! set CMD_RETCODE [ catch { <cmd> } CMD_OUTPUT ] ; return "$CMD_RETCODE $CMD_OUTPUT" ;
//! ```
//!
//! so the reply is always `<retcode>` optionally followed by a space and the
//! command's output. That gives a return code and text in a single exchange.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use crate::error::{OcdError, Result};
use crate::transport::TclTransport;
use crate::types::CommandResult;

static REPLY_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Per-call options for [`CommandEnvelope::execute_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOptions {
    /// Wrap the command in `capture { }` to collect its printed output
    pub capture: bool,
    /// Turn a nonzero return code into [`OcdError::CommandFailed`]
    pub throw: bool,
    /// Receive timeout for this call; the session default when `None`
    pub timeout: Option<Duration>,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            capture: false,
            throw: true,
            timeout: None,
        }
    }
}

impl CommandOptions {
    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    pub fn throw(mut self, throw: bool) -> Self {
        self.throw = throw;
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Build the wire text for `cmd`.
pub fn wrap_command(cmd: &str, capture: bool) -> String {
    let inner = if capture {
        format!("capture {{ {} }}", cmd)
    } else {
        cmd.to_string()
    };

    format!(
        "set CMD_RETCODE [ catch {{ {} }} CMD_OUTPUT ] ; return \"$CMD_RETCODE $CMD_OUTPUT\" ; ",
        inner
    )
}

/// Split an envelope reply into return code and output.
pub fn parse_reply(cmd: &str, full_cmd: &str, reply: &str) -> Result<CommandResult> {
    let pattern = REPLY_PATTERN
        .get_or_init(|| Regex::new(r"^-?[0-9]+(?:$| )").expect("reply pattern is valid"));

    let invalid = || {
        OcdError::invalid_response(
            "Received unexpected response from OpenOCD. It looks like OpenOCD misbehaves.",
            full_cmd,
            reply,
        )
    };

    if !pattern.is_match(reply) {
        return Err(invalid());
    }

    let (code, out) = reply.split_once(' ').unwrap_or((reply, ""));
    let retcode = code.parse::<i64>().map_err(|_| invalid())?;

    Ok(CommandResult {
        cmd: cmd.to_string(),
        full_cmd: full_cmd.to_string(),
        retcode,
        out: out.to_string(),
    })
}

/// Runs commands through the envelope on top of a [`TclTransport`].
#[derive(Debug)]
pub struct CommandEnvelope {
    transport: TclTransport,
}

impl CommandEnvelope {
    pub fn new(transport: TclTransport) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &TclTransport {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut TclTransport {
        &mut self.transport
    }

    /// Execute with default options: no capture, fail on nonzero return code.
    pub async fn execute(&mut self, cmd: &str) -> Result<CommandResult> {
        self.execute_with(cmd, CommandOptions::default()).await
    }

    pub async fn execute_with(&mut self, cmd: &str, options: CommandOptions) -> Result<CommandResult> {
        let full_cmd = wrap_command(cmd, options.capture);
        let reply = self.transport.raw_cmd(&full_cmd, options.timeout).await?;
        let result = parse_reply(cmd, &full_cmd, &reply)?;

        debug!("'{}' finished with code {}", cmd, result.retcode);

        if options.throw && result.retcode != 0 {
            return Err(OcdError::CommandFailed(Box::new(result)));
        }
        Ok(result)
    }
}
