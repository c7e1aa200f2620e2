// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Async TCP connection layer with automatic reconnection.
//!
//! Provides a connection handle that keeps a line-oriented TCP session to the
//! simulation backend open, with automatic reconnection, address hot-reload,
//! an optional handshake line sent on every connect, and graceful shutdown.

use std::time::Duration;

use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::error::Elapsed;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Default address of the simulation backend's snapshot stream.
pub const DEFAULT_FEED_ADDRESS: &str = "localhost:8090";

/// Configuration for TCP connections.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server address in "host:port" format.
    pub address: String,
    /// Delay before reconnecting after disconnect.
    pub reconnect_delay: Duration,
    /// Reconnect when no line arrives within this long.
    pub read_timeout: Option<Duration>,
    /// Channel buffer size for received data.
    pub buffer_size: usize,
    /// Line written to the server right after each connect.
    pub handshake: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_FEED_ADDRESS.to_string(),
            reconnect_delay: Duration::from_secs(5),
            read_timeout: None,
            buffer_size: 64,
            handshake: None,
        }
    }
}

/// Connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attempting to connect.
    Connecting,
    /// Successfully connected.
    Connected,
    /// Disconnected (will attempt reconnect).
    Disconnected,
    /// Connection error occurred.
    Error(String),
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Error(message) => write!(f, "Error: {message}"),
        }
    }
}

/// Events emitted by the connection.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Connection state changed.
    StateChanged(ConnectionState),
    /// Data received (one line).
    DataReceived(Vec<u8>),
}

/// Handle to a managed TCP connection.
///
/// The connection runs in a background task and automatically reconnects
/// on disconnect. Use `recv()` to receive events and `set_address()` to
/// change the server address at runtime.
pub struct Connection {
    event_rx: mpsc::Receiver<ConnectionEvent>,
    address_tx: watch::Sender<String>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("address", &*self.address_tx.borrow())
            .field("cancel_token", &self.cancel_token)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Spawn a new connection task with the given configuration.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(config: ConnectionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.buffer_size.max(1));
        let (address_tx, address_rx) = watch::channel(config.address.clone());
        let cancel_token = CancellationToken::new();

        let task_cancel = cancel_token.clone();
        tokio::spawn(async move {
            connection_loop(event_tx, address_rx, task_cancel, config).await;
        });

        Self {
            event_rx,
            address_tx,
            cancel_token,
        }
    }

    /// Receive the next event from the connection.
    ///
    /// Returns `None` if the connection has been shut down.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Change the server address.
    ///
    /// The connection will disconnect and reconnect to the new address.
    pub fn set_address(&self, address: String) {
        let _ = self.address_tx.send(address);
    }

    /// Get the current server address.
    #[must_use]
    pub fn current_address(&self) -> String {
        self.address_tx.borrow().clone()
    }

    /// Token cancelled when the connection shuts down.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Shut down the connection.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn connection_loop(
    event_tx: mpsc::Sender<ConnectionEvent>,
    mut address_rx: watch::Receiver<String>,
    cancel_token: CancellationToken,
    config: ConnectionConfig,
) {
    loop {
        if cancel_token.is_cancelled() {
            info!("Feed connection cancelled");
            return;
        }

        let current_address = address_rx.borrow_and_update().clone();

        if event_tx
            .send(ConnectionEvent::StateChanged(ConnectionState::Connecting))
            .await
            .is_err()
        {
            return; // Receiver dropped
        }

        info!("Connecting to simulation feed at {}...", current_address);

        match connect_and_process(
            &current_address,
            &config,
            &event_tx,
            &mut address_rx,
            &cancel_token,
        )
        .await
        {
            Ok(reason) => match reason {
                ReconnectReason::AddressChanged => {
                    info!("Feed address changed, reconnecting immediately...");
                    continue;
                }
                ReconnectReason::ConnectionClosed => {
                    info!("Feed connection closed");
                    let _ = event_tx
                        .send(ConnectionEvent::StateChanged(ConnectionState::Disconnected))
                        .await;
                }
                ReconnectReason::Stale => {
                    warn!("No data from feed within the read timeout");
                    let _ = event_tx
                        .send(ConnectionEvent::StateChanged(ConnectionState::Disconnected))
                        .await;
                }
                ReconnectReason::Cancelled => {
                    info!("Feed connection cancelled");
                    return;
                }
            },
            Err(e) => {
                error!("Feed connection error: {}", e);
                let _ = event_tx
                    .send(ConnectionEvent::StateChanged(ConnectionState::Error(
                        e.to_string(),
                    )))
                    .await;
            }
        }

        warn!(
            "Reconnecting in {} seconds...",
            config.reconnect_delay.as_secs()
        );

        tokio::select! {
            () = sleep(config.reconnect_delay) => {}
            () = cancel_token.cancelled() => {
                info!("Feed connection cancelled during reconnect delay");
                return;
            }
        }
    }
}

enum ReconnectReason {
    AddressChanged,
    ConnectionClosed,
    Stale,
    Cancelled,
}

async fn connect_and_process(
    address: &str,
    config: &ConnectionConfig,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    address_rx: &mut watch::Receiver<String>,
    cancel_token: &CancellationToken,
) -> Result<ReconnectReason, Box<dyn std::error::Error + Send + Sync>> {
    let mut stream = TcpStream::connect(address).await?;
    info!("Connected to {}", address);

    if let Some(handshake) = &config.handshake {
        stream.write_all(format!("{handshake}\n").as_bytes()).await?;
        stream.flush().await?;
    }

    if event_tx
        .send(ConnectionEvent::StateChanged(ConnectionState::Connected))
        .await
        .is_err()
    {
        return Ok(ReconnectReason::Cancelled);
    }

    let reader = BufReader::new(stream);
    let mut lines = reader.lines();

    loop {
        tokio::select! {
            line_result = next_line_within(&mut lines, config.read_timeout) => {
                match line_result {
                    Ok(Ok(Some(line))) => {
                        if event_tx
                            .send(ConnectionEvent::DataReceived(line.into_bytes()))
                            .await
                            .is_err()
                        {
                            return Ok(ReconnectReason::Cancelled);
                        }
                    }
                    Ok(Ok(None)) => {
                        info!("Connection closed by server");
                        return Ok(ReconnectReason::ConnectionClosed);
                    }
                    Ok(Err(e)) => {
                        return Err(Box::new(e));
                    }
                    Err(_elapsed) => {
                        return Ok(ReconnectReason::Stale);
                    }
                }
            }

            _ = address_rx.changed() => {
                let new_address = address_rx.borrow_and_update().clone();
                if new_address != address {
                    info!("Feed address changed from {} to {}", address, new_address);
                    return Ok(ReconnectReason::AddressChanged);
                }
            }

            () = cancel_token.cancelled() => {
                return Ok(ReconnectReason::Cancelled);
            }
        }
    }
}

async fn next_line_within(
    lines: &mut Lines<BufReader<TcpStream>>,
    limit: Option<Duration>,
) -> Result<std::io::Result<Option<String>>, Elapsed> {
    match limit {
        Some(limit) => timeout(limit, lines.next_line()).await,
        None => Ok(lines.next_line().await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_receives_lines_and_sends_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut handshake = String::new();
            BufReader::new(read_half)
                .read_line(&mut handshake)
                .await
                .unwrap();
            write_half.write_all(b"first\nsecond\n").await.unwrap();
            handshake
        });

        let mut connection = Connection::spawn(ConnectionConfig {
            address,
            handshake: Some("hello".to_string()),
            ..Default::default()
        });

        let mut lines = Vec::new();
        let mut states = Vec::new();
        while lines.len() < 2 {
            match connection.recv().await {
                Some(ConnectionEvent::DataReceived(data)) => {
                    lines.push(String::from_utf8(data).unwrap());
                }
                Some(ConnectionEvent::StateChanged(state)) => states.push(state),
                None => break,
            }
        }

        assert_eq!(lines, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(
            states,
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
        assert_eq!(server.await.unwrap(), "hello\n");
        connection.shutdown();
    }

    #[tokio::test]
    async fn test_reports_error_when_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let mut connection = Connection::spawn(ConnectionConfig {
            address,
            reconnect_delay: Duration::from_secs(60),
            ..Default::default()
        });

        assert!(matches!(
            connection.recv().await,
            Some(ConnectionEvent::StateChanged(ConnectionState::Connecting))
        ));
        assert!(matches!(
            connection.recv().await,
            Some(ConnectionEvent::StateChanged(ConnectionState::Error(_)))
        ));
        connection.shutdown();
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(
            ConnectionState::Error("refused".to_string()).to_string(),
            "Error: refused"
        );
    }
}
