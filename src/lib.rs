//! OpenOCD TCL client
//!
//! Talks to OpenOCD's TCL server (default port 6666) over TCP.
//! Commands and replies are UTF-8 text, each terminated by 0x1a.
//!
//! The crate is layered:
//! - [`transport::TclTransport`] owns the socket and exchanges one framed
//!   command for one framed reply.
//! - [`envelope::CommandEnvelope`] wraps every command in a `catch`/`return`
//!   envelope so that a return code and output text come back in one exchange.
//! - [`client::OpenocdClient`] formats typed operations (halt, registers,
//!   memory, breakpoints, watchpoints) into commands.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod listing;
pub mod transport;
pub mod types;

pub use client::{ConnectedClient, OpenocdClient};
pub use config::{Args, ClientConfig};
pub use envelope::{CommandEnvelope, CommandOptions};
pub use error::{OcdError, Result};
pub use listing::ListingError;
pub use transport::TclTransport;
pub use types::{BreakpointInfo, BreakpointKind, CommandResult, WatchpointInfo, WatchpointKind};
