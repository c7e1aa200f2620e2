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

//! Itineraries, airports and simulation snapshots.
//!
//! Everything here is an immutable value produced once per backend push. A
//! new snapshot replaces the previous one wholesale; nothing is patched in
//! place.

mod airport;

pub use airport::{Airport, CapacityLevel};

use chrono::{DateTime, Utc};
use log::warn;
use thiserror::Error;

use crate::geo::{distance_meters, Point};

/// Largest gap allowed between one leg's destination and the next leg's
/// origin before the itinerary is considered non-contiguous.
pub const CONTIGUITY_TOLERANCE_METERS: f64 = 1_000.0;

/// Problems detected in an itinerary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ItineraryError {
    #[error("itinerary has no legs")]
    NoLegs,

    #[error("leg {leg} has a non-finite coordinate")]
    NonFiniteCoordinate { leg: usize },

    #[error("leg {leg} starts {gap_meters:.0} m away from where the previous leg ended")]
    NonContiguous { leg: usize, gap_meters: f64 },

    #[error("leg {leg} arrives before it departs")]
    ScheduleInverted { leg: usize },
}

/// One scheduled flight within an itinerary.
#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    /// Position of this leg within its itinerary.
    pub order: u32,
    /// Flight code, e.g. "MT1000".
    pub flight_code: String,
    pub origin_code: String,
    pub destination_code: String,
    pub origin: Point,
    pub destination: Point,
    /// Scheduled departure, when the backend supplied one.
    pub departure: Option<DateTime<Utc>>,
    /// Scheduled arrival, when the backend supplied one.
    pub arrival: Option<DateTime<Utc>>,
}

impl Leg {
    /// Departure and arrival, when both are known.
    #[must_use]
    pub fn schedule(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.departure.zip(self.arrival)
    }
}

/// An ordered sequence of legs describing one aircraft's planned journey.
#[derive(Debug, Clone, PartialEq)]
pub struct Itinerary {
    pub id: String,
    pub legs: Vec<Leg>,
}

impl Itinerary {
    /// Build an itinerary, ordering legs by their `order` tag.
    #[must_use]
    pub fn new(id: impl Into<String>, mut legs: Vec<Leg>) -> Self {
        legs.sort_by_key(|leg| leg.order);
        Self { id: id.into(), legs }
    }

    /// Origin of the first leg.
    #[must_use]
    pub fn origin(&self) -> Option<Point> {
        self.legs.first().map(|leg| leg.origin)
    }

    /// Destination of the last leg.
    #[must_use]
    pub fn destination(&self) -> Option<Point> {
        self.legs.last().map(|leg| leg.destination)
    }

    /// Whether the route can be walked at all: at least one leg and every
    /// coordinate finite.
    pub fn validate_geometry(&self) -> Result<(), ItineraryError> {
        if self.legs.is_empty() {
            return Err(ItineraryError::NoLegs);
        }
        for (index, leg) in self.legs.iter().enumerate() {
            if !leg.origin.is_finite() || !leg.destination.is_finite() {
                return Err(ItineraryError::NonFiniteCoordinate { leg: index });
            }
        }
        Ok(())
    }

    /// Each leg must start where the previous one ended.
    pub fn check_contiguity(&self) -> Result<(), ItineraryError> {
        for (index, pair) in self.legs.windows(2).enumerate() {
            let gap_meters = distance_meters(pair[0].destination, pair[1].origin);
            if gap_meters > CONTIGUITY_TOLERANCE_METERS {
                return Err(ItineraryError::NonContiguous {
                    leg: index + 1,
                    gap_meters,
                });
            }
        }
        Ok(())
    }

    /// Every scheduled leg must arrive no earlier than it departs.
    pub fn check_schedule(&self) -> Result<(), ItineraryError> {
        for (index, leg) in self.legs.iter().enumerate() {
            if let Some((departure, arrival)) = leg.schedule() {
                if arrival < departure {
                    return Err(ItineraryError::ScheduleInverted { leg: index });
                }
            }
        }
        Ok(())
    }
}

/// One push from the simulation backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationSnapshot {
    pub airports: Vec<Airport>,
    pub itineraries: Vec<Itinerary>,
    /// Whether the backend simulation is still advancing.
    pub running: Option<bool>,
    /// The backend's notion of "now", when it sent one.
    pub simulated_time: Option<DateTime<Utc>>,
}

/// Result of admitting a snapshot's itineraries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub accepted: Vec<Itinerary>,
    pub rejected: Vec<(String, ItineraryError)>,
}

impl SimulationSnapshot {
    /// Split itineraries into those the animation can use and those whose
    /// intent cannot be determined.
    ///
    /// Non-contiguous and inverted-schedule itineraries are rejected here.
    /// Malformed geometry is passed through: the animation loop skips such
    /// entities frame by frame and keeps their last good position.
    #[must_use]
    pub fn ingest(&self) -> IngestReport {
        let mut report = IngestReport::default();
        for itinerary in &self.itineraries {
            let verdict = itinerary
                .check_contiguity()
                .and_then(|()| itinerary.check_schedule());
            match verdict {
                Ok(()) => report.accepted.push(itinerary.clone()),
                Err(e) => {
                    warn!("Rejecting itinerary {}: {}", itinerary.id, e);
                    report.rejected.push((itinerary.id.clone(), e));
                }
            }
        }
        report
    }
}
