//! Mock OpenOCD TCL server for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const DELIM: u8 = 0x1a;

const ENVELOPE_PREFIX: &str = "set CMD_RETCODE [ catch { ";
const ENVELOPE_SUFFIX: &str = " } CMD_OUTPUT ] ; return \"$CMD_RETCODE $CMD_OUTPUT\" ; ";

/// What the mock does with one request
pub enum Reply {
    /// Send the text followed by the delimiter
    Frame(String),
    /// Send these exact bytes
    Raw(Vec<u8>),
    /// Send a frame, then more bytes after a pause
    FrameThenExtra(String, Vec<u8>),
    /// Never answer
    Silent,
    /// Close the connection
    Close,
}

impl Reply {
    /// Envelope-style reply: `"<retcode> <out>"`
    pub fn envelope(retcode: i64, out: &str) -> Self {
        Reply::Frame(format!("{} {}", retcode, out))
    }
}

/// Inner command of an enveloped request, if it is one
pub fn unwrap_envelope(request: &str) -> Option<&str> {
    request.strip_prefix(ENVELOPE_PREFIX)?.strip_suffix(ENVELOPE_SUFFIX)
}

pub struct MockOpenocd {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
    connections: Arc<Mutex<usize>>,
    task: JoinHandle<()>,
}

impl MockOpenocd {
    /// Start a server that answers every request with `responder`.
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(Mutex::new(0));
        let responder = Arc::new(responder);

        let task = {
            let requests = requests.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    *connections.lock().unwrap() += 1;
                    tokio::spawn(serve(stream, responder.clone(), requests.clone()));
                }
            })
        };

        Self {
            addr,
            requests,
            connections,
            task,
        }
    }

    /// Server that answers enveloped commands through `responder(inner_cmd)`.
    pub async fn start_enveloped<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Reply + Send + Sync + 'static,
    {
        Self::start(move |request| match unwrap_envelope(request) {
            Some(cmd) => responder(cmd),
            None => Reply::Frame(format!("invalid command name \"{}\"", request)),
        })
        .await
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Inner commands of all enveloped requests received so far
    pub fn commands(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|r| unwrap_envelope(r).map(str::to_string))
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        *self.connections.lock().unwrap()
    }
}

impl Drop for MockOpenocd {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve<F>(mut stream: TcpStream, responder: Arc<F>, requests: Arc<Mutex<Vec<String>>>)
where
    F: Fn(&str) -> Reply + Send + Sync + 'static,
{
    let mut pending: Vec<u8> = Vec::new();
    let mut block = [0u8; 4096];

    loop {
        let n = match stream.read(&mut block).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        pending.extend_from_slice(&block[..n]);

        while let Some(pos) = pending.iter().position(|&b| b == DELIM) {
            let frame: Vec<u8> = pending.drain(..=pos).collect();
            let request = String::from_utf8_lossy(&frame[..frame.len() - 1]).into_owned();
            requests.lock().unwrap().push(request.clone());

            let reply = (*responder)(&request);
            let written = match reply {
                Reply::Frame(text) => {
                    let mut bytes = text.into_bytes();
                    bytes.push(DELIM);
                    stream.write_all(&bytes).await
                }
                Reply::Raw(bytes) => stream.write_all(&bytes).await,
                Reply::FrameThenExtra(text, extra) => {
                    let mut bytes = text.into_bytes();
                    bytes.push(DELIM);
                    if stream.write_all(&bytes).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    stream.write_all(&extra).await
                }
                Reply::Silent => Ok(()),
                Reply::Close => return,
            };
            if written.is_err() {
                return;
            }
        }
    }
}
