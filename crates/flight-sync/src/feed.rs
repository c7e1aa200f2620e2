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

//! Latest state received from the simulation backend.
//!
//! [`SnapshotStore`] folds decoded feed messages into the current batch of
//! itineraries, airports and simulated clock, and reports what changed.
//! [`load_snapshot_file`] reads the same messages from a file on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info};
use thiserror::Error;

use crate::model::{Airport, Itinerary, ItineraryError, SimulationSnapshot};
use crate::protocol::{FeedMessage, ParseError, Protocol, SnapshotParser};
use crate::route::fingerprint;
use crate::tcp::ConnectionState;

/// Errors that can occur while loading a snapshot from disk.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("no itineraries found in {0}")]
    NoItineraries(PathBuf),
}

/// Load a snapshot from a file.
///
/// The file may hold a single (possibly pretty-printed) JSON document or one
/// message per line. Messages are folded in order: the last itinerary batch
/// wins and airports or clock updates from later lines are merged in.
pub fn load_snapshot_file(path: &Path) -> Result<SimulationSnapshot, FeedError> {
    let bytes = std::fs::read(path).map_err(|source| FeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut parser = SnapshotParser::new();
    let messages: Vec<FeedMessage> = match parser.parse(&bytes) {
        Ok(message) => message.into_iter().collect(),
        Err(_) => bytes
            .split(|b| *b == b'\n')
            .filter_map(|line| parser.parse(line).transpose())
            .collect::<Result<_, _>>()?,
    };

    let mut snapshot = SimulationSnapshot::default();
    let mut found = false;
    for message in messages {
        match message {
            FeedMessage::Snapshot(batch) => {
                found = true;
                if !batch.airports.is_empty() {
                    snapshot.airports = batch.airports;
                }
                snapshot.itineraries = batch.itineraries;
                snapshot.running = batch.running.or(snapshot.running);
                snapshot.simulated_time = batch.simulated_time.or(snapshot.simulated_time);
            }
            FeedMessage::Status {
                simulated_time,
                running,
            } => {
                snapshot.running = running.or(snapshot.running);
                snapshot.simulated_time = simulated_time.or(snapshot.simulated_time);
            }
            FeedMessage::Airports(airports) => snapshot.airports = airports,
        }
    }

    if !found {
        return Err(FeedError::NoItineraries(path.to_path_buf()));
    }
    info!(
        "Loaded {} itineraries from {}",
        snapshot.itineraries.len(),
        path.display()
    );
    Ok(snapshot)
}

/// Batches match when every itinerary has the same content fingerprint.
/// Coordinates compare by bit pattern, so a NaN leg still matches itself.
fn same_batch(current: &[Itinerary], incoming: &[Itinerary]) -> bool {
    current.len() == incoming.len()
        && current
            .iter()
            .zip(incoming)
            .all(|(a, b)| fingerprint(a) == fingerprint(b))
}

/// Changes published by the feed client.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// A new batch of itineraries replaced the previous one.
    BatchReplaced {
        generation: u64,
        accepted: usize,
        rejected: usize,
    },
    /// The simulated clock moved (forward or backward).
    ClockUpdated(DateTime<Utc>),
    /// The airport list was replaced.
    AirportsUpdated(usize),
    /// The backend reported whether it is still running.
    RunStateChanged(bool),
    /// The TCP connection changed state.
    ConnectionChanged(ConnectionState),
}

/// Snapshot of everything the feed has delivered so far.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    generation: u64,
    itineraries: Arc<Vec<Itinerary>>,
    rejected: Vec<(String, ItineraryError)>,
    airports: Vec<Airport>,
    simulated_time: Option<DateTime<Utc>>,
    running: Option<bool>,
    connection_state: ConnectionState,
    messages: u64,
    parse_errors: u64,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            generation: 0,
            itineraries: Arc::new(Vec::new()),
            rejected: Vec::new(),
            airports: Vec::new(),
            simulated_time: None,
            running: None,
            connection_state: ConnectionState::Disconnected,
            messages: 0,
            parse_errors: 0,
        }
    }

    /// Fold one decoded message into the store.
    ///
    /// A snapshot whose accepted itineraries equal the current batch keeps
    /// the current generation.
    pub fn apply(&mut self, message: FeedMessage) -> Vec<FeedEvent> {
        self.messages += 1;
        let mut events = Vec::new();

        match message {
            FeedMessage::Snapshot(snapshot) => {
                let report = snapshot.ingest();
                if self.generation == 0 || !same_batch(&self.itineraries, &report.accepted) {
                    self.generation += 1;
                    info!(
                        "Batch {}: {} itineraries accepted, {} rejected",
                        self.generation,
                        report.accepted.len(),
                        report.rejected.len()
                    );
                    events.push(FeedEvent::BatchReplaced {
                        generation: self.generation,
                        accepted: report.accepted.len(),
                        rejected: report.rejected.len(),
                    });
                    self.itineraries = Arc::new(report.accepted);
                }
                self.rejected = report.rejected;

                if !snapshot.airports.is_empty() {
                    events.push(self.replace_airports(snapshot.airports));
                }
                self.update_clock(snapshot.simulated_time, &mut events);
                self.update_running(snapshot.running, &mut events);
            }
            FeedMessage::Status {
                simulated_time,
                running,
            } => {
                self.update_clock(simulated_time, &mut events);
                self.update_running(running, &mut events);
            }
            FeedMessage::Airports(airports) => {
                events.push(self.replace_airports(airports));
            }
        }

        events
    }

    fn replace_airports(&mut self, airports: Vec<Airport>) -> FeedEvent {
        self.airports = airports;
        FeedEvent::AirportsUpdated(self.airports.len())
    }

    fn update_clock(&mut self, time: Option<DateTime<Utc>>, events: &mut Vec<FeedEvent>) {
        let Some(time) = time else {
            return;
        };
        if self.simulated_time == Some(time) {
            return;
        }
        if self.simulated_time.is_some_and(|previous| time < previous) {
            debug!("Simulated clock moved backward to {}", time);
        }
        self.simulated_time = Some(time);
        events.push(FeedEvent::ClockUpdated(time));
    }

    fn update_running(&mut self, running: Option<bool>, events: &mut Vec<FeedEvent>) {
        if let Some(running) = running {
            if self.running != Some(running) {
                info!(
                    "Simulation {}",
                    if running { "running" } else { "stopped" }
                );
                self.running = Some(running);
                events.push(FeedEvent::RunStateChanged(running));
            }
        }
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) -> FeedEvent {
        self.connection_state = state.clone();
        FeedEvent::ConnectionChanged(state)
    }

    pub fn record_parse_error(&mut self) {
        self.parse_errors += 1;
    }

    /// Increments whenever the accepted batch changes.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn itineraries(&self) -> Arc<Vec<Itinerary>> {
        Arc::clone(&self.itineraries)
    }

    #[must_use]
    pub fn rejected(&self) -> &[(String, ItineraryError)] {
        &self.rejected
    }

    #[must_use]
    pub fn airports(&self) -> &[Airport] {
        &self.airports
    }

    #[must_use]
    pub fn simulated_time(&self) -> Option<DateTime<Utc>> {
        self.simulated_time
    }

    #[must_use]
    pub fn running(&self) -> Option<bool> {
        self.running
    }

    #[must_use]
    pub fn connection_state(&self) -> &ConnectionState {
        &self.connection_state
    }

    #[must_use]
    pub fn messages(&self) -> u64 {
        self.messages
    }

    #[must_use]
    pub fn parse_errors(&self) -> u64 {
        self.parse_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::{leg, BRU, GYD, JFK, LIM};
    use crate::model::SimulationSnapshot;
    use chrono::TimeZone;

    fn snapshot(itineraries: Vec<Itinerary>, hour: u32) -> FeedMessage {
        FeedMessage::Snapshot(SimulationSnapshot {
            airports: Vec::new(),
            itineraries,
            running: Some(true),
            simulated_time: Some(Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap()),
        })
    }

    #[test]
    fn test_repeated_snapshot_keeps_generation() {
        let mut store = SnapshotStore::new();
        let batch = vec![Itinerary::new("a", vec![leg(1, LIM, GYD)])];

        let events = store.apply(snapshot(batch.clone(), 8));
        assert_eq!(store.generation(), 1);
        assert!(events.contains(&FeedEvent::BatchReplaced {
            generation: 1,
            accepted: 1,
            rejected: 0
        }));
        assert!(events.contains(&FeedEvent::RunStateChanged(true)));

        let events = store.apply(snapshot(batch, 9));
        assert_eq!(store.generation(), 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], FeedEvent::ClockUpdated(_)));
        assert_eq!(store.messages(), 2);
    }

    #[test]
    fn test_repeated_malformed_snapshot_keeps_generation() {
        let mut store = SnapshotStore::new();
        let nowhere = ("XXX", crate::geo::Point::new(f64::NAN, 10.0));
        let batch = vec![
            Itinerary::new("a", vec![leg(1, LIM, GYD)]),
            Itinerary::new("broken", vec![leg(1, nowhere, BRU)]),
        ];

        store.apply(snapshot(batch.clone(), 8));
        assert_eq!(store.generation(), 1);
        assert_eq!(store.itineraries().len(), 2);

        let events = store.apply(snapshot(batch, 9));
        assert_eq!(store.generation(), 1);
        assert!(!events
            .iter()
            .any(|e| matches!(e, FeedEvent::BatchReplaced { .. })));
    }

    #[test]
    fn test_changed_batch_bumps_generation() {
        let mut store = SnapshotStore::new();
        store.apply(snapshot(vec![Itinerary::new("a", vec![leg(1, LIM, GYD)])], 8));
        store.apply(snapshot(vec![Itinerary::new("b", vec![leg(1, BRU, JFK)])], 8));
        assert_eq!(store.generation(), 2);
        assert_eq!(store.itineraries()[0].id, "b");
    }

    #[test]
    fn test_rejected_itineraries_are_recorded() {
        let mut store = SnapshotStore::new();
        let gap = Itinerary::new("gap", vec![leg(1, LIM, GYD), leg(2, BRU, JFK)]);
        let good = Itinerary::new("good", vec![leg(1, LIM, GYD)]);
        store.apply(snapshot(vec![gap, good], 8));

        assert_eq!(store.itineraries().len(), 1);
        assert_eq!(store.rejected().len(), 1);
        assert_eq!(store.rejected()[0].0, "gap");
    }

    #[test]
    fn test_clock_can_move_backward() {
        let mut store = SnapshotStore::new();
        let late = Utc.with_ymd_and_hms(2025, 3, 5, 0, 0, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        store.apply(FeedMessage::Status {
            simulated_time: Some(late),
            running: None,
        });
        let events = store.apply(FeedMessage::Status {
            simulated_time: Some(early),
            running: Some(false),
        });
        assert_eq!(store.simulated_time(), Some(early));
        assert_eq!(
            events,
            vec![
                FeedEvent::ClockUpdated(early),
                FeedEvent::RunStateChanged(false)
            ]
        );
    }

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("flight-sync-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    const LEG: &str = r#"{"orden":1,"vuelo":{"codigo":"MT1","origen":{"codigo":"LIM","latitud":-12.0219,"longitud":-77.1143},"destino":{"codigo":"GYD","latitud":40.4675,"longitud":50.0467}}}"#;

    #[test]
    fn test_load_pretty_printed_file() {
        let contents = format!(
            "{{\n  \"itinerarios\": [\n    {{\"id\": \"A\", \"segmentos\": [{LEG}]}}\n  ]\n}}\n"
        );
        let path = write_temp("pretty.json", &contents);
        let snapshot = load_snapshot_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(snapshot.itineraries.len(), 1);
        assert_eq!(snapshot.itineraries[0].id, "A");
    }

    #[test]
    fn test_load_json_lines_last_batch_wins() {
        let contents = format!(
            "{{\"itinerarios\":[{{\"id\":\"A\",\"segmentos\":[{LEG}]}}]}}\n\n\
             {{\"itinerarios\":[{{\"id\":\"B\",\"segmentos\":[{LEG}]}}]}}\n\
             {{\"meta\":{{\"running\":false}}}}\n"
        );
        let path = write_temp("lines.jsonl", &contents);
        let snapshot = load_snapshot_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(snapshot.itineraries.len(), 1);
        assert_eq!(snapshot.itineraries[0].id, "B");
        assert_eq!(snapshot.running, Some(false));
    }

    #[test]
    fn test_load_errors() {
        let missing = std::env::temp_dir().join("flight-sync-does-not-exist.json");
        assert!(matches!(
            load_snapshot_file(&missing),
            Err(FeedError::Io { .. })
        ));

        let path = write_temp("garbage.json", "not json\n");
        let result = load_snapshot_file(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(FeedError::Parse(_))));

        let path = write_temp("status.json", r#"{"meta":{"running":true}}"#);
        let result = load_snapshot_file(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(FeedError::NoItineraries(_))));
    }

    #[test]
    fn test_airports_replace() {
        let mut store = SnapshotStore::new();
        let events = store.apply(FeedMessage::Airports(crate::demo::airport_catalog()));
        assert_eq!(events, vec![FeedEvent::AirportsUpdated(10)]);
        assert_eq!(store.airports().len(), 10);
        assert_eq!(store.generation(), 0);
    }
}
