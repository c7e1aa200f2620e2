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

//! Maps a traveled distance onto a point and heading along an itinerary.

use crate::geo::{bearing_degrees, interpolate, Point};
use crate::model::Itinerary;
use crate::route::RouteGeometry;

/// Where an aircraft is for a given traveled distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub position: Point,
    pub heading_degrees: f64,
    /// The unwrapped traveled distance has reached the end of the route.
    pub at_or_past_end: bool,
}

/// Distance actually walked along the route.
///
/// Looping wraps into `[0, span)`; otherwise the value is clamped to
/// `[0, total]`.
#[must_use]
pub fn effective_distance(geometry: &RouteGeometry, traveled: f64, looping: bool) -> f64 {
    if looping {
        let wrapped = traveled.rem_euclid(geometry.span());
        // rem_euclid rounds up to the divisor for tiny negative inputs
        if wrapped >= geometry.span() {
            0.0
        } else {
            wrapped
        }
    } else {
        traveled.clamp(0.0, geometry.total())
    }
}

/// Resolve position and heading for `traveled` meters along `itinerary`.
///
/// The itinerary must have at least one leg; callers validate beforehand.
#[must_use]
pub fn resolve(
    itinerary: &Itinerary,
    geometry: &RouteGeometry,
    traveled: f64,
    looping: bool,
) -> Resolved {
    let at_or_past_end = traveled >= geometry.total();

    let last = itinerary.legs.len().saturating_sub(1);
    if !looping && at_or_past_end {
        let leg = &itinerary.legs[last];
        return Resolved {
            position: leg.destination,
            heading_degrees: bearing_degrees(leg.origin, leg.destination),
            at_or_past_end,
        };
    }

    let mut remaining = effective_distance(geometry, traveled, looping);
    for (index, (leg, &length)) in itinerary
        .legs
        .iter()
        .zip(geometry.leg_lengths())
        .enumerate()
    {
        if remaining <= length || index == last {
            let t = if length > 0.0 {
                (remaining / length).clamp(0.0, 1.0)
            } else {
                0.0
            };
            return Resolved {
                position: interpolate(leg.origin, leg.destination, t),
                heading_degrees: bearing_degrees(leg.origin, leg.destination),
                at_or_past_end,
            };
        }
        remaining -= length;
    }

    // Only reachable when the geometry has fewer entries than legs.
    let leg = &itinerary.legs[0];
    Resolved {
        position: leg.origin,
        heading_degrees: bearing_degrees(leg.origin, leg.destination),
        at_or_past_end,
    }
}
