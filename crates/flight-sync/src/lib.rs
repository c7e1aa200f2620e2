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

//! Flight position synchronization and great-circle animation.
//!
//! This library turns batches of multi-leg cargo itineraries into smoothly
//! animated flight positions. It is organized in layers that can be used
//! independently or composed together:
//!
//! - **Geometry**: great-circle distance, bearing and interpolation
//!   ([`geo`]), per-itinerary route lengths ([`route`]) and position lookup
//!   by traveled distance ([`resolver`])
//! - **Synchronization**: blending local playback progress with the
//!   simulation's authoritative clock ([`reconcile`])
//! - **Animation**: the frame-driven loop that advances every entity and
//!   pushes positions to a [`RenderSink`] ([`animation`])
//! - **Feed**: JSON-lines snapshot parsing and an async TCP client with
//!   automatic reconnection ([`protocol`], [`tcp`], [`FeedClient`])
//!
//! # Quick Start
//!
//! Drive an [`AnimationLoop`] from any frame source:
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use flight_sync::{
//!     demo, AnimationLoop, FrameScheduler, PlaybackConfig, ReconcileConfig, RenderSink,
//! };
//!
//! struct Log;
//! impl RenderSink for Log {
//!     fn set_entity_position(&mut self, id: &str, lon: f64, lat: f64) {
//!         println!("{id}: {lat:.3}, {lon:.3}");
//!     }
//!     fn set_entity_heading(&mut self, _id: &str, _degrees: f64) {}
//!     fn draw_static_route(&mut self, _id: &str, _leg: usize, _path: [flight_sync::Point; 2]) {}
//!     fn release_entity(&mut self, _id: &str) {}
//! }
//!
//! struct Manual;
//! impl FrameScheduler for Manual {
//!     fn request_frame(&mut self) {}
//!     fn cancel_frames(&mut self) {}
//! }
//!
//! let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
//! let mut sink = Log;
//! let mut animation = AnimationLoop::new(Manual, ReconcileConfig::default());
//! animation.load(demo::sample_itineraries(start), &mut sink);
//!
//! let playback = PlaybackConfig::default();
//! for frame in 0..3 {
//!     animation.tick(f64::from(frame) / 60.0, &playback, None, &mut sink);
//! }
//! ```
//!
//! # Receiving Snapshots
//!
//! ```no_run
//! use flight_sync::{FeedClient, FeedConfig};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = FeedClient::spawn(FeedConfig {
//!         seed: Some(42),
//!         ..Default::default()
//!     });
//!
//!     let mut seen = 0;
//!     loop {
//!         if client.generation() != seen {
//!             seen = client.generation();
//!             println!("{} itineraries", client.itineraries().len());
//!         }
//!         tokio::time::sleep(Duration::from_millis(250)).await;
//!     }
//! }
//! ```

pub mod animation;
pub mod demo;
pub mod feed;
pub mod geo;
pub mod model;
pub mod playback;
pub mod protocol;
pub mod reconcile;
pub mod resolver;
pub mod route;
pub mod tcp;

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

pub use animation::{
    AnimationLoop, AnimationState, EntityPhase, FrameReport, FrameScheduler, FrameStatus,
    RenderSink,
};
pub use feed::{load_snapshot_file, FeedError, FeedEvent, SnapshotStore};
pub use geo::Point;
pub use model::{
    Airport, CapacityLevel, IngestReport, Itinerary, ItineraryError, Leg, SimulationSnapshot,
};
pub use playback::PlaybackConfig;
pub use protocol::{FeedMessage, ParseError, Protocol, SnapshotParser};
pub use reconcile::{BlendTier, ClockReconciler, ReconcileConfig, SyncMode};
pub use route::{RouteCache, RouteGeometry};
pub use tcp::{Connection, ConnectionConfig, ConnectionEvent, ConnectionState};

/// Snapshot period requested from the backend when none is configured.
pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 500;

/// Configuration for the full-stack feed client.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Connection configuration.
    pub connection: ConnectionConfig,
    /// Seed forwarded to the backend in the init request.
    ///
    /// When set and the connection has no explicit handshake, the client
    /// asks the backend to start a simulation with this seed.
    pub seed: Option<u64>,
    /// Snapshot period requested in the init request.
    pub snapshot_interval_ms: u64,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            seed: None,
            snapshot_interval_ms: DEFAULT_SNAPSHOT_INTERVAL_MS,
            event_capacity: 64,
        }
    }
}

impl FeedConfig {
    /// The init request line sent on every connect, if any.
    #[must_use]
    pub fn init_request(&self) -> Option<String> {
        if let Some(handshake) = &self.connection.handshake {
            return Some(handshake.clone());
        }
        self.seed.map(|seed| {
            serde_json::json!({
                "action": "init",
                "seed": seed,
                "snapshotMs": self.snapshot_interval_ms,
            })
            .to_string()
        })
    }
}

/// Full-stack feed client that wires the connection, parser and store
/// together.
///
/// A background task owns the TCP connection, decodes every line and folds
/// it into a shared [`SnapshotStore`]. Changes are published on a broadcast
/// channel.
pub struct FeedClient {
    store: Arc<RwLock<SnapshotStore>>,
    events: broadcast::Sender<FeedEvent>,
    address_tx: watch::Sender<String>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("address", &*self.address_tx.borrow())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl FeedClient {
    /// Spawn a new client with the given configuration.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(config: FeedConfig) -> Self {
        let store = Arc::new(RwLock::new(SnapshotStore::new()));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (address_tx, address_rx) = watch::channel(config.connection.address.clone());
        let cancel_token = CancellationToken::new();

        let mut connection_config = config.connection.clone();
        connection_config.handshake = config.init_request();
        let connection = Connection::spawn(connection_config);

        tokio::spawn(process_feed(
            connection,
            Arc::clone(&store),
            events.clone(),
            address_rx,
            cancel_token.clone(),
        ));

        Self {
            store,
            events,
            address_tx,
            cancel_token,
        }
    }

    /// Increments whenever a snapshot changes the accepted batch.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.store.read().map(|s| s.generation()).unwrap_or(0)
    }

    /// The latest accepted itineraries.
    #[must_use]
    pub fn itineraries(&self) -> Arc<Vec<Itinerary>> {
        self.store
            .read()
            .map(|s| s.itineraries())
            .unwrap_or_default()
    }

    /// Itineraries rejected from the latest snapshot, with the reason.
    #[must_use]
    pub fn rejected(&self) -> Vec<(String, ItineraryError)> {
        self.store
            .read()
            .map(|s| s.rejected().to_vec())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn airports(&self) -> Vec<Airport> {
        self.store
            .read()
            .map(|s| s.airports().to_vec())
            .unwrap_or_default()
    }

    /// The simulation's authoritative clock, if it has reported one.
    #[must_use]
    pub fn simulated_time(&self) -> Option<DateTime<Utc>> {
        self.store.read().ok().and_then(|s| s.simulated_time())
    }

    #[must_use]
    pub fn running(&self) -> Option<bool> {
        self.store.read().ok().and_then(|s| s.running())
    }

    /// Run `f` against the store under a single read lock.
    ///
    /// Returns `None` if the lock is poisoned.
    pub fn with_store<R>(&self, f: impl FnOnce(&SnapshotStore) -> R) -> Option<R> {
        self.store.read().ok().map(|s| f(&s))
    }

    /// Subscribe to feed events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.events.subscribe()
    }

    /// Get the current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.store
            .read()
            .map(|s| s.connection_state().clone())
            .unwrap_or(ConnectionState::Disconnected)
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

    /// Shut down the client.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

impl Drop for FeedClient {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

async fn process_feed(
    mut connection: Connection,
    store: Arc<RwLock<SnapshotStore>>,
    events: broadcast::Sender<FeedEvent>,
    mut address_rx: watch::Receiver<String>,
    cancel_token: CancellationToken,
) {
    let mut parser = SnapshotParser::new();

    loop {
        tokio::select! {
            event = connection.recv() => {
                let Some(event) = event else {
                    debug!("Feed connection ended");
                    return;
                };
                for published in handle_event(event, &mut parser, &store) {
                    // No subscribers is fine.
                    let _ = events.send(published);
                }
            }

            changed = address_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                connection.set_address(address_rx.borrow_and_update().clone());
            }

            () = cancel_token.cancelled() => {
                connection.shutdown();
                return;
            }
        }
    }
}

fn handle_event(
    event: ConnectionEvent,
    parser: &mut SnapshotParser,
    store: &RwLock<SnapshotStore>,
) -> Vec<FeedEvent> {
    match event {
        ConnectionEvent::StateChanged(state) => store
            .write()
            .map(|mut s| vec![s.set_connection_state(state)])
            .unwrap_or_default(),
        ConnectionEvent::DataReceived(data) => match parser.parse(&data) {
            Ok(Some(message)) => store
                .write()
                .map(|mut s| s.apply(message))
                .unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Feed parse error: {}", e);
                if let Ok(mut s) = store.write() {
                    s.record_parse_error();
                }
                Vec::new()
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    const SNAPSHOT: &str = r#"{"itinerarios":[{"id":"IT-1","segmentos":[{"orden":1,"vuelo":{"codigo":"MT1","origen":{"codigo":"LIM","latitud":-12.0219,"longitud":-77.1143},"destino":{"codigo":"GYD","latitud":40.4675,"longitud":50.0467},"salidaProgramadaISO":"2025-03-01T08:00:00Z","llegadaProgramadaISO":"2025-03-02T02:00:00Z"}}]}],"meta":{"running":true,"simulatedTime":"2025-03-01T12:00:00Z"}}"#;

    #[test]
    fn test_init_request_from_seed() {
        let config = FeedConfig {
            seed: Some(7),
            snapshot_interval_ms: 250,
            ..Default::default()
        };
        let request: serde_json::Value =
            serde_json::from_str(&config.init_request().unwrap()).unwrap();
        assert_eq!(request["action"], "init");
        assert_eq!(request["seed"], 7);
        assert_eq!(request["snapshotMs"], 250);
    }

    #[test]
    fn test_explicit_handshake_wins() {
        let config = FeedConfig {
            connection: ConnectionConfig {
                handshake: Some("hello".to_string()),
                ..Default::default()
            },
            seed: Some(7),
            ..Default::default()
        };
        assert_eq!(config.init_request().as_deref(), Some("hello"));
        assert!(FeedConfig::default().init_request().is_none());
    }

    #[test]
    fn test_handle_event_counts_parse_errors() {
        let store = RwLock::new(SnapshotStore::new());
        let mut parser = SnapshotParser::new();

        let events = handle_event(
            ConnectionEvent::DataReceived(b"not json".to_vec()),
            &mut parser,
            &store,
        );
        assert!(events.is_empty());

        let events = handle_event(
            ConnectionEvent::DataReceived(SNAPSHOT.as_bytes().to_vec()),
            &mut parser,
            &store,
        );
        assert!(events.contains(&FeedEvent::BatchReplaced {
            generation: 1,
            accepted: 1,
            rejected: 0
        }));

        let store = store.read().unwrap();
        assert_eq!(store.parse_errors(), 1);
        assert_eq!(store.generation(), 1);
        assert_eq!(store.running(), Some(true));
    }

    #[tokio::test]
    async fn test_client_receives_snapshot() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            let mut init = String::new();
            BufReader::new(read_half).read_line(&mut init).await.unwrap();
            write_half
                .write_all(format!("{SNAPSHOT}\n").as_bytes())
                .await
                .unwrap();
            // Keep the socket open until the client has read the line.
            tokio::time::sleep(Duration::from_secs(2)).await;
            init
        });

        let client = FeedClient::spawn(FeedConfig {
            connection: ConnectionConfig {
                address,
                ..Default::default()
            },
            seed: Some(42),
            ..Default::default()
        });

        let mut waited = Duration::ZERO;
        while client.generation() == 0 && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(20)).await;
            waited += Duration::from_millis(20);
        }

        assert_eq!(client.generation(), 1);
        assert_eq!(client.itineraries()[0].id, "IT-1");
        assert_eq!(client.connection_state(), ConnectionState::Connected);
        assert!(client.simulated_time().is_some());
        assert_eq!(
            client.with_store(|s| (s.messages(), s.parse_errors())),
            Some((1, 0))
        );

        let init = server.await.unwrap();
        assert!(init.contains("\"seed\":42"));
        client.shutdown();
    }
}
