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

//! Built-in airports and itineraries for running without a backend.

use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::geo::{distance_meters, Point};
use crate::model::{Airport, Itinerary, Leg};

/// Cruise speed used to derive demo schedules, in km/h.
const DEMO_CRUISE_KMH: f64 = 850.0;
/// Ground time between consecutive demo legs.
const DEMO_LAYOVER_MINUTES: i64 = 90;

struct CatalogEntry {
    code: &'static str,
    name: &'static str,
    city: &'static str,
    country: &'static str,
    lat: f64,
    lon: f64,
    hub: bool,
    capacity: u32,
}

#[rustfmt::skip]
const CATALOG: &[CatalogEntry] = &[
    CatalogEntry { code: "LIM", name: "Jorge Chavez International Airport", city: "Lima", country: "Peru", lat: -12.0219, lon: -77.1143, hub: true, capacity: 900 },
    CatalogEntry { code: "BRU", name: "Brussels Airport", city: "Brussels", country: "Belgium", lat: 50.9010, lon: 4.4844, hub: true, capacity: 850 },
    CatalogEntry { code: "GYD", name: "Heydar Aliyev International Airport", city: "Baku", country: "Azerbaijan", lat: 40.4675, lon: 50.0467, hub: true, capacity: 800 },
    CatalogEntry { code: "JFK", name: "John F. Kennedy International Airport", city: "New York", country: "United States", lat: 40.6413, lon: -73.7781, hub: false, capacity: 1000 },
    CatalogEntry { code: "GRU", name: "Sao Paulo/Guarulhos International Airport", city: "Sao Paulo", country: "Brazil", lat: -23.4356, lon: -46.4731, hub: false, capacity: 950 },
    CatalogEntry { code: "LAX", name: "Los Angeles International Airport", city: "Los Angeles", country: "United States", lat: 33.9416, lon: -118.4085, hub: false, capacity: 900 },
    CatalogEntry { code: "HND", name: "Tokyo Haneda Airport", city: "Tokyo", country: "Japan", lat: 35.5494, lon: 139.7798, hub: false, capacity: 950 },
    CatalogEntry { code: "ICN", name: "Incheon International Airport", city: "Seoul", country: "South Korea", lat: 37.4602, lon: 126.4407, hub: false, capacity: 900 },
    CatalogEntry { code: "MAD", name: "Adolfo Suarez Madrid-Barajas Airport", city: "Madrid", country: "Spain", lat: 40.4983, lon: -3.5676, hub: false, capacity: 880 },
    CatalogEntry { code: "SYD", name: "Sydney Kingsford Smith Airport", city: "Sydney", country: "Australia", lat: -33.9399, lon: 151.1753, hub: false, capacity: 820 },
];

/// The built-in airport catalog.
#[must_use]
pub fn airport_catalog() -> Vec<Airport> {
    CATALOG
        .iter()
        .map(|entry| Airport {
            code: entry.code.to_string(),
            name: entry.name.to_string(),
            city: entry.city.to_string(),
            country: entry.country.to_string(),
            location: Point::new(entry.lon, entry.lat),
            is_hub: entry.hub,
            capacity: Some(entry.capacity),
            used_capacity: None,
        })
        .collect()
}

fn stops<'a>(airports: &'a [Airport], codes: &[&str]) -> Vec<&'a Airport> {
    codes
        .iter()
        .filter_map(|code| airports.iter().find(|a| a.code == *code))
        .collect()
}

/// Block time for a leg flown at the demo cruise speed, whole minutes.
fn block_time(from: &Airport, to: &Airport) -> Duration {
    let hours = distance_meters(from.location, to.location) / 1000.0 / DEMO_CRUISE_KMH;
    let minutes = (hours * 60.0).ceil().max(1.0);
    Duration::minutes(minutes as i64)
}

fn scheduled_leg(
    order: u32,
    code: String,
    from: &Airport,
    to: &Airport,
    departure: DateTime<Utc>,
) -> Leg {
    Leg {
        order,
        flight_code: code,
        origin_code: from.code.clone(),
        destination_code: to.code.clone(),
        origin: from.location,
        destination: to.location,
        departure: Some(departure),
        arrival: Some(departure + block_time(from, to)),
    }
}

fn chain(id: &str, stops: &[&Airport], start: DateTime<Utc>, code_prefix: &str) -> Itinerary {
    let mut legs = Vec::with_capacity(stops.len().saturating_sub(1));
    let mut departure = start;
    for (index, pair) in stops.windows(2).enumerate() {
        let order = u32::try_from(index + 1).unwrap_or(u32::MAX);
        let code = format!("{code_prefix}{index}");
        let leg = scheduled_leg(order, code, pair[0], pair[1], departure);
        departure = leg.arrival.unwrap_or(departure) + Duration::minutes(DEMO_LAYOVER_MINUTES);
        legs.push(leg);
    }
    Itinerary::new(id, legs)
}

/// Two fixed itineraries: LIM -> GYD -> JFK and BRU -> LAX, departing at
/// `start`.
#[must_use]
pub fn sample_itineraries(start: DateTime<Utc>) -> Vec<Itinerary> {
    let airports = airport_catalog();
    vec![
        chain("it-001", &stops(&airports, &["LIM", "GYD", "JFK"]), start, "MP100"),
        chain("it-002", &stops(&airports, &["BRU", "LAX"]), start, "MP200"),
    ]
}

/// A week of randomized itineraries with 1 to 3 legs, each starting at a
/// hub. The same seed always yields the same plan.
#[must_use]
pub fn weekly_itineraries(seed: u64, count: usize, start: DateTime<Utc>) -> Vec<Itinerary> {
    let airports = airport_catalog();
    let hubs: Vec<&Airport> = airports.iter().filter(|a| a.is_hub).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    (0..count)
        .filter_map(|i| {
            let base = *hubs.choose(&mut rng)?;
            let legs = rng.gen_range(1..=3);
            let mut others: Vec<&Airport> =
                airports.iter().filter(|a| a.code != base.code).collect();
            others.shuffle(&mut rng);

            let mut stops = vec![base];
            stops.extend(others.into_iter().take(legs));

            let offset = Duration::minutes(rng.gen_range(0..7 * 24 * 60));
            Some(chain(
                &format!("IT-{}", i + 1),
                &stops,
                start + offset,
                &format!("MT{}", 100 + i),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_catalog_has_hubs() {
        let catalog = airport_catalog();
        assert_eq!(catalog.len(), 10);
        let hubs: Vec<&str> = catalog
            .iter()
            .filter(|a| a.is_hub)
            .map(|a| a.code.as_str())
            .collect();
        assert_eq!(hubs, vec!["LIM", "BRU", "GYD"]);
    }

    #[test]
    fn test_sample_itineraries() {
        let sample = sample_itineraries(start());
        assert_eq!(sample.len(), 2);

        let first = &sample[0];
        assert_eq!(first.id, "it-001");
        assert_eq!(first.legs.len(), 2);
        assert_eq!(first.legs[0].origin_code, "LIM");
        assert_eq!(first.legs[1].destination_code, "JFK");
        assert!(first.check_contiguity().is_ok());
        assert!(first.check_schedule().is_ok());
        assert!(first.legs[1].departure > first.legs[0].arrival);
    }

    #[test]
    fn test_weekly_is_deterministic_and_valid() {
        let a = weekly_itineraries(42, 12, start());
        let b = weekly_itineraries(42, 12, start());
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);

        for it in &a {
            assert!((1..=3).contains(&it.legs.len()));
            assert!(it.validate_geometry().is_ok());
            assert!(it.check_contiguity().is_ok());
            assert!(it.check_schedule().is_ok());
            assert!(["LIM", "BRU", "GYD"].contains(&it.legs[0].origin_code.as_str()));
        }
    }
}
