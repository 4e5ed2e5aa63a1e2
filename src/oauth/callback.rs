//! Local redirect listener for the interactive authorization step.
//!
//! Accepts plain-HTTP requests on a loopback address and hands the first
//! `code` query parameter it sees to the waiting caller through a oneshot
//! channel. Exactly one code is ever delivered.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{BrokerageError, Result};

const MAX_REQUEST_BYTES: usize = 8192;

/// Bound listener waiting for the OAuth redirect.
pub struct CallbackListener {
    listener: TcpListener,
}

impl CallbackListener {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until a request carrying `code` arrives or `timeout` elapses.
    pub async fn wait_for_code(self, timeout: Duration) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        let server = tokio::spawn(serve(self.listener, tx));

        let outcome = tokio::time::timeout(timeout, rx).await;
        server.abort();

        match outcome {
            Ok(Ok(code)) => Ok(code),
            Ok(Err(_)) => Err(BrokerageError::Config(
                "callback listener stopped before a code arrived".to_string(),
            )),
            Err(_) => Err(BrokerageError::CallbackTimeout),
        }
    }
}

async fn serve(listener: TcpListener, tx: oneshot::Sender<String>) {
    let mut tx = Some(tx);

    while tx.is_some() {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(error = %e, "Failed to accept callback connection");
                continue;
            }
        };
        debug!(peer = %peer, "Callback connection");

        match handle(stream).await {
            Ok(Some(code)) => {
                info!("Authorization code received");
                if let Some(tx) = tx.take() {
                    let _ = tx.send(code);
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Callback request failed"),
        }
    }
}

async fn handle(mut stream: TcpStream) -> std::io::Result<Option<String>> {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];
    let n = stream.read(&mut buf).await?;
    let request = String::from_utf8_lossy(&buf[..n]);
    let request_line = request.lines().next().unwrap_or_default();

    let code = extract_code(request_line);
    let (status, message) = match code {
        Some(_) => ("200 OK", "Authorization code received. You can close this window."),
        None => ("400 Bad Request", "No code parameter found in the request."),
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        message.len(),
        message
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;

    Ok(code)
}

/// Pull the decoded `code` query parameter out of an HTTP request line.
pub fn extract_code(request_line: &str) -> Option<String> {
    let target = request_line.split_whitespace().nth(1)?;
    let (_, query) = target.split_once('?')?;

    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "code")
        .and_then(|(_, value)| {
            urlencoding::decode(&value.replace('+', " "))
                .ok()
                .map(|v| v.into_owned())
        })
        .filter(|v| !v.is_empty())
}
