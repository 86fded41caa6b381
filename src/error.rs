//! Error types for the OpenOCD TCL client

use std::time::Duration;
use thiserror::Error;

use crate::types::{BreakpointKind, CommandResult};

/// Main error type for the OpenOCD TCL client
#[derive(Error, Debug)]
pub enum OcdError {
    /// Transport-level failure. The session is disconnected afterwards,
    /// except for the "already connected" misuse.
    #[error("{message}")]
    Connection {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error(
        "Did not receive the complete command response within {} seconds",
        .timeout.as_secs_f64()
    )]
    CommandTimeout { full_cmd: String, timeout: Duration },

    /// The reply arrived intact but does not have the expected shape.
    #[error("{message}")]
    InvalidResponse {
        message: String,
        full_cmd: String,
        out: String,
    },

    #[error("OpenOCD command failed: '{}' (error code: {})", .0.cmd, .0.retcode)]
    CommandFailed(Box<CommandResult>),

    #[error("{0} breakpoints are not supported")]
    UnsupportedBreakpoint(BreakpointKind),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl OcdError {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        OcdError::Connection {
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn connection_io(message: impl Into<String>, source: std::io::Error) -> Self {
        OcdError::Connection {
            message: message.into(),
            source: Some(source),
        }
    }

    pub(crate) fn invalid_response(
        message: impl Into<String>,
        full_cmd: impl Into<String>,
        out: impl Into<String>,
    ) -> Self {
        OcdError::InvalidResponse {
            message: message.into(),
            full_cmd: full_cmd.into(),
            out: out.into(),
        }
    }

    /// Errors after which the socket can no longer be trusted
    pub fn is_transport_fault(&self) -> bool {
        matches!(self, OcdError::Connection { .. } | OcdError::CommandTimeout { .. })
    }

    /// The command result attached to a `CommandFailed` error
    pub fn result(&self) -> Option<&CommandResult> {
        match self {
            OcdError::CommandFailed(result) => Some(result.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, OcdError>;
