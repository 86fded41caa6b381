//! OpenOCD TCL socket transport
//!
//! Protocol: send command as UTF-8, terminated by 0x1a (SUB character).
//! Response: UTF-8 text terminated by 0x1a.
//!
//! The protocol has no request IDs, so any byte that shows up outside of the
//! expected request/response turn means the stream is out of sync. Such
//! conditions, and timeouts, close the socket before the error is returned.

use socket2::SockRef;
use std::io::ErrorKind;
use std::mem::MaybeUninit;
use std::net::Shutdown;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{OcdError, Result};

/// TCL protocol terminator byte (ASCII SUB / Ctrl-Z)
pub const COMMAND_DELIMITER: u8 = 0x1a;

/// Safety limit on the size of one response, delimiter included
pub const MAX_RESPONSE_SIZE: usize = 8 * 1024 * 1024;

/// Time allowed for handing one command to the socket
pub const SEND_TIMEOUT: Duration = Duration::from_secs(3);

/// Receive timeout used when neither the call nor the session overrides it
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Longest single wait on the socket before the overall deadline is re-checked
pub const RECV_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum number of bytes taken from the socket in one read
pub const RECV_BLOCK_SIZE: usize = 2048;

/// Connection to an OpenOCD TCL server.
///
/// A transport is either connected (socket open) or disconnected (no socket).
/// One command is in flight at a time; the `&mut self` receivers enforce this
/// for a single owner. A transport is not meant to be shared between tasks:
/// use one per task, or serialize access behind a mutex.
#[derive(Debug)]
pub struct TclTransport {
    host: String,
    port: u16,
    default_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TclTransport {
    /// Create an unconnected transport. Port 0 is rejected.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        if port == 0 {
            return Err(OcdError::InvalidArgument(
                "Incorrect TCP port. Expecting number in range 1 - 65535.".to_string(),
            ));
        }

        Ok(Self {
            host: host.into(),
            port,
            default_timeout: DEFAULT_RECV_TIMEOUT,
            stream: None,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub async fn connect(&mut self) -> Result<()> {
        if self.is_connected() {
            return Err(OcdError::connection("Already connected"));
        }

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| {
                OcdError::connection_io(
                    format!("Could not connect to OpenOCD at {}, port {}", self.host, self.port),
                    e,
                )
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            close_stream(stream, false);
            return Err(OcdError::connection_io(
                "Could not set TCP_NODELAY for the socket",
                e,
            ));
        }

        info!("Connected to OpenOCD TCL at {}:{}", self.host, self.port);
        self.stream = Some(stream);
        Ok(())
    }

    /// Close the connection gracefully. Does nothing when not connected.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            close_stream(stream, true);
            info!("Disconnected from OpenOCD TCL at {}:{}", self.host, self.port);
        }
    }

    pub async fn reconnect(&mut self) -> Result<()> {
        self.disconnect();
        self.connect().await
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Replace the receive timeout used by calls that don't pass their own.
    pub fn set_default_timeout(&mut self, timeout: Duration) -> Result<()> {
        check_timeout(timeout)?;
        self.default_timeout = timeout;
        Ok(())
    }

    /// Send one command and return the raw reply text.
    ///
    /// `timeout` overrides the default receive timeout for this call only.
    /// On `Connection` and `CommandTimeout` errors the socket is closed, so a
    /// late reply can never be mistaken for the answer to a later command.
    pub async fn raw_cmd(&mut self, cmd: &str, timeout: Option<Duration>) -> Result<String> {
        if let Some(timeout) = timeout {
            check_timeout(timeout)?;
        }
        let timeout = timeout.unwrap_or(self.default_timeout);

        let Some(stream) = self.stream.as_mut() else {
            return Err(OcdError::connection("Not connected"));
        };

        let result = exchange(stream, cmd, timeout).await;

        if let Err(e) = &result {
            if e.is_transport_fault() {
                warn!("Dropping OpenOCD connection after error: {}", e);
                if let Some(stream) = self.stream.take() {
                    close_stream(stream, false);
                }
            }
        }

        result
    }
}

impl Drop for TclTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn check_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(OcdError::InvalidArgument(
            "Timeout must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

async fn exchange(stream: &mut TcpStream, cmd: &str, timeout: Duration) -> Result<String> {
    check_no_premature_bytes(stream)?;
    send_command(stream, cmd).await?;
    receive_response(stream, cmd, timeout).await
}

/// Fail if anything is waiting on the socket before the command goes out.
fn check_no_premature_bytes(stream: &TcpStream) -> Result<()> {
    let mut probe = [MaybeUninit::<u8>::uninit(); 1];

    // The socket is non-blocking, so an empty receive queue shows up as WouldBlock.
    match SockRef::from(stream).peek(&mut probe) {
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(()),
        Ok(0) => Err(OcdError::connection("Connection closed by OpenOCD")),
        Ok(_) => Err(OcdError::connection(
            "Received unexpected bytes from OpenOCD before the command was even sent",
        )),
        Err(e) => Err(OcdError::connection_io("Could not poll the OpenOCD socket", e)),
    }
}

async fn send_command(stream: &mut TcpStream, cmd: &str) -> Result<()> {
    debug!("OpenOCD TCL command: {}", cmd);

    let mut payload = Vec::with_capacity(cmd.len() + 1);
    payload.extend_from_slice(cmd.as_bytes());
    payload.push(COMMAND_DELIMITER);

    match tokio::time::timeout(SEND_TIMEOUT, stream.write_all(&payload)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(OcdError::connection_io("Write failed", e)),
        Err(_) => Err(OcdError::connection(format!(
            "Could not send the command within {} seconds",
            SEND_TIMEOUT.as_secs_f64()
        ))),
    }
}

/// Read response bytes until the 0x1a terminator or until `timeout` elapses.
async fn receive_response(stream: &mut TcpStream, cmd: &str, timeout: Duration) -> Result<String> {
    let mut buf: Vec<u8> = Vec::new();
    let mut block = [0u8; RECV_BLOCK_SIZE];
    let deadline = Instant::now() + timeout;

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let poll = (deadline - now).min(RECV_POLL_TIMEOUT);

        let n = match tokio::time::timeout(poll, stream.read(&mut block)).await {
            Err(_) => continue,
            Ok(Err(e)) => return Err(OcdError::connection_io("Read failed", e)),
            Ok(Ok(0)) => return Err(OcdError::connection("Connection closed by OpenOCD")),
            Ok(Ok(n)) => n,
        };

        let received = &block[..n];
        buf.extend_from_slice(received);
        if buf.len() > MAX_RESPONSE_SIZE {
            return Err(OcdError::connection(format!(
                "Received too big response (exceeding {} bytes)",
                MAX_RESPONSE_SIZE
            )));
        }

        // Earlier blocks held no delimiter, so only the new one needs a look.
        if let Some(pos) = received.iter().position(|&b| b == COMMAND_DELIMITER) {
            if pos != n - 1 {
                return Err(OcdError::connection(
                    "Received extra unexpected byte(s) after the command response delimiter",
                ));
            }
            buf.pop();
            return decode_response(buf, cmd);
        }
    }

    Err(OcdError::CommandTimeout {
        full_cmd: cmd.to_string(),
        timeout,
    })
}

fn decode_response(buf: Vec<u8>, cmd: &str) -> Result<String> {
    match String::from_utf8(buf) {
        Ok(response) => {
            debug!("OpenOCD TCL response: {}", response);
            Ok(response)
        }
        Err(e) => {
            let out = String::from_utf8_lossy(e.as_bytes()).into_owned();
            Err(OcdError::invalid_response(
                format!("Invalid UTF-8 in response: {}", e.utf8_error()),
                cmd,
                out,
            ))
        }
    }
}

/// Close the socket. Errors are ignored: there is nothing left to do with it.
fn close_stream(stream: TcpStream, graceful: bool) {
    if graceful {
        // shutdown() sends FIN instead of the RST a bare close may produce
        if let Err(e) = SockRef::from(&stream).shutdown(Shutdown::Both) {
            debug!("Socket shutdown failed (ignored): {}", e);
        }
    }
    drop(stream);
}
