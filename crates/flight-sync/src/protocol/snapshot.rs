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

//! JSON-lines snapshot parser.
//!
//! The simulation backend pushes one JSON object per line:
//!
//! ```text
//! {"aeropuertos":[...],"itinerarios":[{"id":"IT-1","segmentos":[{"orden":1,"vuelo":{...}}]}],
//!  "meta":{"running":true,"simulatedTime":"2025-03-01T08:00:00Z"}}
//! ```
//!
//! Field names follow the backend's Spanish schema; the English names used
//! by the airport REST resource are accepted as aliases. Coordinates may be
//! numbers, decimal strings or degrees/minutes/seconds strings.

use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};
use serde::Deserialize;

use super::{FeedMessage, ParseError, Protocol};
use crate::geo::{dms_to_decimal, Point};
use crate::model::{Airport, Itinerary, Leg, SimulationSnapshot};

/// Parser for backend snapshot lines.
#[derive(Debug, Default)]
pub struct SnapshotParser {
    parsed: u64,
}

impl SnapshotParser {
    /// Create a new snapshot parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines that produced a message.
    #[must_use]
    pub fn parsed(&self) -> u64 {
        self.parsed
    }
}

impl Protocol for SnapshotParser {
    type Message = FeedMessage;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<FeedMessage>, ParseError> {
        let line = std::str::from_utf8(input)
            .map_err(|e| ParseError::InvalidFormat(format!("invalid UTF-8: {e}")))?;
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let wire: WireMessage =
            serde_json::from_str(line).map_err(|e| ParseError::InvalidFormat(e.to_string()))?;
        let message = decode(wire)?;
        if message.is_some() {
            self.parsed += 1;
        }
        Ok(message)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default, alias = "airports")]
    aeropuertos: Option<Vec<WireAirport>>,
    #[serde(default, alias = "itineraries")]
    itinerarios: Option<Vec<WireItinerary>>,
    #[serde(default)]
    meta: Option<WireMeta>,
    #[serde(default, alias = "tiempoSimulado")]
    simulated_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMeta {
    #[serde(default)]
    running: Option<bool>,
    #[serde(default, alias = "tiempoSimulado")]
    simulated_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireCoordinate {
    Number(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireCountry {
    Name(String),
    Detail {
        #[serde(alias = "name")]
        nombre: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireAirport {
    #[serde(alias = "code")]
    codigo: String,
    #[serde(default, alias = "name")]
    nombre: Option<String>,
    #[serde(default, alias = "city")]
    ciudad: Option<String>,
    #[serde(default, alias = "country")]
    pais: Option<WireCountry>,
    #[serde(default, alias = "latitude")]
    latitud: Option<WireCoordinate>,
    #[serde(default, alias = "longitude")]
    longitud: Option<WireCoordinate>,
    #[serde(default, alias = "isHub")]
    es_sede: bool,
    #[serde(default, alias = "capacity", alias = "capacidadTotal")]
    capacidad_almacen: Option<u32>,
    #[serde(default, alias = "usedCapacity")]
    capacidad_usada: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireItinerary {
    id: WireId,
    #[serde(default, alias = "legs")]
    segmentos: Vec<WireSegment>,
}

#[derive(Debug, Deserialize)]
struct WireSegment {
    #[serde(alias = "order")]
    orden: u32,
    #[serde(alias = "flight")]
    vuelo: WireFlight,
}

#[derive(Debug, Deserialize)]
struct WireFlight {
    #[serde(default, alias = "code")]
    codigo: Option<String>,
    #[serde(alias = "origin")]
    origen: WireAirport,
    #[serde(alias = "destination")]
    destino: WireAirport,
    #[serde(default, rename = "salidaProgramadaISO", alias = "departure")]
    salida: Option<String>,
    #[serde(default, rename = "llegadaProgramadaISO", alias = "arrival")]
    llegada: Option<String>,
}

fn decode(wire: WireMessage) -> Result<Option<FeedMessage>, ParseError> {
    let meta = wire.meta.unwrap_or_default();
    let simulated_time = wire
        .simulated_time
        .or(meta.simulated_time)
        .map(|text| parse_timestamp("simulatedTime", &text))
        .transpose()?;

    let airports = wire
        .aeropuertos
        .map(|list| list.into_iter().filter_map(decode_airport).collect());

    if let Some(itineraries) = wire.itinerarios {
        let itineraries = itineraries
            .into_iter()
            .map(decode_itinerary)
            .collect();
        return Ok(Some(FeedMessage::Snapshot(SimulationSnapshot {
            airports: airports.unwrap_or_default(),
            itineraries,
            running: meta.running,
            simulated_time,
        })));
    }

    if simulated_time.is_some() || meta.running.is_some() {
        return Ok(Some(FeedMessage::Status {
            simulated_time,
            running: meta.running,
        }));
    }

    if let Some(airports) = airports {
        return Ok(Some(FeedMessage::Airports(airports)));
    }

    debug!("Ignoring feed message without itineraries, airports or clock");
    Ok(None)
}

fn decode_itinerary(wire: WireItinerary) -> Itinerary {
    let id = wire.id.into_string();
    let legs = wire
        .segmentos
        .into_iter()
        .map(|segment| decode_leg(&id, segment))
        .collect();
    Itinerary::new(id, legs)
}

/// A leg whose schedule cannot be read keeps `None` for that timestamp, so
/// the itinerary animates visually instead of failing the batch.
fn decode_leg(itinerary_id: &str, segment: WireSegment) -> Leg {
    let flight = segment.vuelo;
    let schedule = |field: &'static str, text: Option<String>| {
        let text = text?;
        parse_timestamp(field, &text)
            .map_err(|e| warn!("Itinerary {} leg {}: {}", itinerary_id, segment.orden, e))
            .ok()
    };
    let departure = schedule("salidaProgramadaISO", flight.salida);
    let arrival = schedule("llegadaProgramadaISO", flight.llegada);

    Leg {
        order: segment.orden,
        flight_code: flight
            .codigo
            .unwrap_or_else(|| format!("{itinerary_id}-{}", segment.orden)),
        origin: coordinates(&flight.origen),
        destination: coordinates(&flight.destino),
        origin_code: flight.origen.codigo,
        destination_code: flight.destino.codigo,
        departure,
        arrival,
    }
}

fn decode_airport(wire: WireAirport) -> Option<Airport> {
    let location = coordinates(&wire);
    if !location.is_finite() {
        warn!("Dropping airport {} with unusable coordinates", wire.codigo);
        return None;
    }

    Some(Airport {
        name: wire.nombre.unwrap_or_else(|| wire.codigo.clone()),
        city: wire.ciudad.unwrap_or_default(),
        country: match wire.pais {
            Some(WireCountry::Name(name) | WireCountry::Detail { nombre: name }) => name,
            None => String::new(),
        },
        code: wire.codigo,
        location,
        is_hub: wire.es_sede,
        capacity: wire.capacidad_almacen,
        used_capacity: wire.capacidad_usada,
    })
}

/// Airport location; unparseable or missing components become NaN so the
/// itinerary is treated as malformed downstream instead of failing the batch.
fn coordinates(airport: &WireAirport) -> Point {
    let decode = |value: Option<&WireCoordinate>, axis: &str| -> f64 {
        let parsed = match value {
            Some(WireCoordinate::Number(n)) => Some(*n),
            Some(WireCoordinate::Text(text)) => dms_to_decimal(text),
            None => None,
        };
        parsed.unwrap_or_else(|| {
            warn!("Airport {} has no usable {}", airport.codigo, axis);
            f64::NAN
        })
    };
    Point::new(
        decode(airport.longitud.as_ref(), "longitude"),
        decode(airport.latitud.as_ref(), "latitude"),
    )
}

/// RFC 3339, or a naive ISO date-time taken as UTC.
fn parse_timestamp(field: &'static str, text: &str) -> Result<DateTime<Utc>, ParseError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ParseError::InvalidValue {
            field,
            value: text.to_string(),
        })
}
