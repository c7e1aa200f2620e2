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

//! Protocol layer for simulation feed messages.
//!
//! This module provides a trait-based abstraction over feed formats.
//! Currently implements the JSON-lines snapshot format pushed by the
//! simulation backend.

mod snapshot;

pub use snapshot::SnapshotParser;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Airport, SimulationSnapshot};

/// Errors that can occur during message parsing.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for field '{field}': {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// A decoded feed message.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// A full batch of itineraries, optionally with airports and clock.
    Snapshot(SimulationSnapshot),

    /// Clock or run-state update without itineraries.
    Status {
        simulated_time: Option<DateTime<Utc>>,
        running: Option<bool>,
    },

    /// Airport markers only.
    Airports(Vec<Airport>),
}

impl FeedMessage {
    /// Simulated time carried by the message, if any.
    #[must_use]
    pub fn simulated_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Snapshot(snapshot) => snapshot.simulated_time,
            Self::Status { simulated_time, .. } => *simulated_time,
            Self::Airports(_) => None,
        }
    }
}

/// Trait for protocol parsers.
///
/// Implement this trait to add support for new feed formats.
pub trait Protocol {
    /// The message type produced by this parser.
    type Message;
    /// The error type for parsing failures.
    type Error;

    /// Parse input bytes into a message.
    ///
    /// Returns `Ok(Some(message))` if parsing succeeded,
    /// `Ok(None)` if the input is valid but doesn't produce a message,
    /// or `Err(error)` if parsing failed.
    fn parse(&mut self, input: &[u8]) -> Result<Option<Self::Message>, Self::Error>;
}
