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

//! Per-itinerary leg lengths, computed once per batch and reused every frame.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::geo::distance_meters;
use crate::model::Itinerary;

/// Lower bound used wherever a route length is a divisor.
pub const MIN_ROUTE_LENGTH_M: f64 = 1.0;

/// Great-circle length of every leg, in order.
#[must_use]
pub fn compute_leg_lengths(itinerary: &Itinerary) -> Vec<f64> {
    itinerary
        .legs
        .iter()
        .map(|leg| distance_meters(leg.origin, leg.destination))
        .collect()
}

/// Sum of the leg lengths.
#[must_use]
pub fn compute_total_length(leg_lengths: &[f64]) -> f64 {
    leg_lengths.iter().sum()
}

/// Cached geometry of one itinerary.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteGeometry {
    leg_lengths: Vec<f64>,
    total: f64,
}

impl RouteGeometry {
    #[must_use]
    pub fn from_itinerary(itinerary: &Itinerary) -> Self {
        Self::from_leg_lengths(compute_leg_lengths(itinerary))
    }

    #[must_use]
    pub fn from_leg_lengths(leg_lengths: Vec<f64>) -> Self {
        let total = compute_total_length(&leg_lengths);
        Self { leg_lengths, total }
    }

    #[must_use]
    pub fn leg_lengths(&self) -> &[f64] {
        &self.leg_lengths
    }

    /// Exact sum of the leg lengths, possibly zero.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Total length floored at [`MIN_ROUTE_LENGTH_M`], safe to divide by.
    #[must_use]
    pub fn span(&self) -> f64 {
        self.total.max(MIN_ROUTE_LENGTH_M)
    }

    /// Distance flown before leg `index` starts.
    #[must_use]
    pub fn distance_before_leg(&self, index: usize) -> f64 {
        self.leg_lengths.iter().take(index).sum()
    }
}

/// Content fingerprint of an itinerary: id, leg order and coordinates.
#[must_use]
pub fn fingerprint(itinerary: &Itinerary) -> u64 {
    let mut hasher = DefaultHasher::new();
    itinerary.id.hash(&mut hasher);
    for leg in &itinerary.legs {
        leg.order.hash(&mut hasher);
        for value in [
            leg.origin.lon,
            leg.origin.lat,
            leg.destination.lon,
            leg.destination.lat,
        ] {
            value.to_bits().hash(&mut hasher);
        }
        leg.departure.hash(&mut hasher);
        leg.arrival.hash(&mut hasher);
    }
    hasher.finish()
}

#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: u64,
    geometry: Arc<RouteGeometry>,
}

/// Geometry for the current batch of itineraries.
///
/// A refresh builds a complete new map and swaps it in, so readers never
/// observe a half-updated batch.
#[derive(Debug, Default)]
pub struct RouteCache {
    entries: HashMap<String, CacheEntry>,
}

impl RouteCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache contents with geometry for `itineraries`.
    ///
    /// Returns the number of itineraries whose geometry was recomputed.
    pub fn refresh(&mut self, itineraries: &[Itinerary]) -> usize {
        let mut recomputed = 0;
        let mut next = HashMap::with_capacity(itineraries.len());
        for itinerary in itineraries {
            let print = fingerprint(itinerary);
            let geometry = match self.entries.get(&itinerary.id) {
                Some(entry) if entry.fingerprint == print => Arc::clone(&entry.geometry),
                _ => {
                    recomputed += 1;
                    Arc::new(RouteGeometry::from_itinerary(itinerary))
                }
            };
            next.insert(
                itinerary.id.clone(),
                CacheEntry {
                    fingerprint: print,
                    geometry,
                },
            );
        }
        self.entries = next;
        recomputed
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<RouteGeometry>> {
        self.entries.get(id).map(|entry| Arc::clone(&entry.geometry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::distance_meters;
    use crate::model::tests::{leg, BRU, GYD, JFK, LIM};

    #[test]
    fn test_single_leg_total() {
        let it = Itinerary::new("it", vec![leg(1, LIM, BRU)]);
        let geometry = RouteGeometry::from_itinerary(&it);
        assert_eq!(geometry.leg_lengths().len(), 1);
        assert!((geometry.total() - distance_meters(LIM.1, BRU.1)).abs() < 1e-9);
    }

    #[test]
    fn test_total_is_sum_of_legs() {
        let it = Itinerary::new("it", vec![leg(1, LIM, GYD), leg(2, GYD, JFK)]);
        let geometry = RouteGeometry::from_itinerary(&it);
        let sum: f64 = geometry.leg_lengths().iter().sum();
        assert!((geometry.total() - sum).abs() < 1e-9);
        assert!((geometry.distance_before_leg(1) - geometry.leg_lengths()[0]).abs() < 1e-9);
        assert!((geometry.distance_before_leg(2) - geometry.total()).abs() < 1e-9);
    }

    #[test]
    fn test_zero_length_route_span_floor() {
        let it = Itinerary::new("it", vec![leg(1, LIM, LIM)]);
        let geometry = RouteGeometry::from_itinerary(&it);
        assert!(geometry.total().abs() < 1e-9);
        assert!((geometry.span() - MIN_ROUTE_LENGTH_M).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cache_reuses_unchanged_geometry() {
        let a = Itinerary::new("a", vec![leg(1, LIM, GYD)]);
        let b = Itinerary::new("b", vec![leg(1, BRU, JFK)]);

        let mut cache = RouteCache::new();
        assert_eq!(cache.refresh(&[a.clone(), b.clone()]), 2);
        let first = cache.get("a").unwrap();

        assert_eq!(cache.refresh(&[a.clone(), b]), 0);
        assert!(Arc::ptr_eq(&first, &cache.get("a").unwrap()));

        let changed = Itinerary::new("a", vec![leg(1, LIM, JFK)]);
        assert_eq!(cache.refresh(&[changed]), 1);
        assert!(!Arc::ptr_eq(&first, &cache.get("a").unwrap()));
        assert!(cache.get("b").is_none());
        assert_eq!(cache.len(), 1);
    }
}
