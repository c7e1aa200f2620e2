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

//! Great-circle math on a spherical Earth.
//!
//! Distance, initial bearing and spherical interpolation between two points,
//! plus parsing of the degrees/minutes/seconds notation airport catalogs use.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Central angles below this (radians) are treated as the same point.
const DEGENERATE_ANGLE_RAD: f64 = 1e-12;

/// A geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Longitude in degrees, east positive.
    pub lon: f64,
    /// Latitude in degrees, north positive.
    pub lat: f64,
}

impl Point {
    #[must_use]
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Both components are finite numbers.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }

    fn to_unit_vector(self) -> [f64; 3] {
        let lat = self.lat.to_radians();
        let lon = self.lon.to_radians();
        [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
    }

    fn from_unit_vector(v: [f64; 3]) -> Self {
        let lat = v[2].atan2(v[0].hypot(v[1]));
        let lon = v[1].atan2(v[0]);
        Self::new(lon.to_degrees(), lat.to_degrees())
    }
}

/// Haversine great-circle distance between two points, in meters.
#[must_use]
pub fn distance_meters(a: Point, b: Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial bearing from `a` to `b` in degrees, normalized to `[0, 360)`.
///
/// Returns 0 when the points coincide.
#[must_use]
pub fn bearing_degrees(a: Point, b: Point) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lon = (b.lon - a.lon).to_radians();

    let x = delta_lon.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    if x.abs() < f64::EPSILON && y.abs() < f64::EPSILON {
        return 0.0;
    }

    let bearing = x.atan2(y).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

/// Central angle between two points in radians.
#[must_use]
pub fn central_angle(a: Point, b: Point) -> f64 {
    let va = a.to_unit_vector();
    let vb = b.to_unit_vector();
    let dot = va[0] * vb[0] + va[1] * vb[1] + va[2] * vb[2];
    dot.clamp(-1.0, 1.0).acos()
}

/// Spherical interpolation along the great circle from `a` to `b`.
///
/// `t = 0` yields `a` and `t = 1` yields `b`; values outside `[0, 1]`
/// extrapolate along the same circle.
#[must_use]
pub fn interpolate(a: Point, b: Point, t: f64) -> Point {
    let theta = central_angle(a, b);
    if theta < DEGENERATE_ANGLE_RAD {
        return a;
    }

    let sin_theta = theta.sin();
    if sin_theta.abs() < DEGENERATE_ANGLE_RAD {
        // Antipodal: every great circle qualifies, so there is no single path.
        return if t < 0.5 { a } else { b };
    }

    let wa = ((1.0 - t) * theta).sin() / sin_theta;
    let wb = (t * theta).sin() / sin_theta;
    let va = a.to_unit_vector();
    let vb = b.to_unit_vector();

    Point::from_unit_vector([
        wa * va[0] + wb * vb[0],
        wa * va[1] + wb * vb[1],
        wa * va[2] + wb * vb[2],
    ])
}

/// Parse a coordinate written either as a decimal number (`"-12.0219"`) or
/// as degrees, minutes and seconds with a hemisphere letter
/// (`"12 01 19 S"`, `"04°42'05\"N"`). South and west are negative.
#[must_use]
pub fn dms_to_decimal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<f64>() {
        return value.is_finite().then_some(value);
    }

    let cleaned: String = trimmed
        .chars()
        .map(|c| match c {
            '°' | '\'' | '"' | '′' | '″' | ':' => ' ',
            other => other,
        })
        .collect();
    let mut body = cleaned.trim_end();

    let mut sign = 1.0;
    if let Some(last) = body.chars().last().filter(char::is_ascii_alphabetic) {
        sign = match last.to_ascii_uppercase() {
            'N' | 'E' => 1.0,
            'S' | 'W' => -1.0,
            _ => return None,
        };
        body = &body[..body.len() - last.len_utf8()];
    }

    let parts: Vec<f64> = body
        .split_whitespace()
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .ok()?;

    let (degrees, minutes, seconds) = match parts.as_slice() {
        [d] => (*d, 0.0, 0.0),
        [d, m] => (*d, *m, 0.0),
        [d, m, s] => (*d, *m, *s),
        _ => return None,
    };
    if !(0.0..60.0).contains(&minutes) || !(0.0..60.0).contains(&seconds) {
        return None;
    }

    if degrees.is_sign_negative() {
        sign = -1.0;
    }
    let value = sign * (degrees.abs() + minutes / 60.0 + seconds / 3600.0);
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIM: Point = Point::new(-77.1143, -12.0219);
    const BRU: Point = Point::new(4.4844, 50.9010);
    const JFK: Point = Point::new(-73.7781, 40.6413);

    #[test]
    fn test_distance_symmetric() {
        let pairs = [(LIM, BRU), (BRU, JFK), (JFK, LIM)];
        for (a, b) in pairs {
            let ab = distance_meters(a, b);
            let ba = distance_meters(b, a);
            assert!((ab - ba).abs() <= ab * 1e-6);
        }
    }

    #[test]
    fn test_distance_zero_for_same_point() {
        assert!(distance_meters(LIM, LIM).abs() < 1e-6);
        assert!(distance_meters(LIM, BRU) > 0.0);
    }

    #[test]
    fn test_distance_one_degree_on_equator() {
        let d = distance_meters(Point::new(0.0, 0.0), Point::new(1.0, 0.0));
        let expected = EARTH_RADIUS_M * 1.0_f64.to_radians();
        assert!((d - expected).abs() < 1e-6);
    }

    #[test]
    fn test_lim_to_bru_distance() {
        // Roughly 10,500 km
        let d = distance_meters(LIM, BRU);
        assert!(d > 10_000_000.0 && d < 11_000_000.0, "got {d}");
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        let origin = Point::new(0.0, 0.0);
        assert!((bearing_degrees(origin, Point::new(0.0, 10.0)) - 0.0).abs() < 1e-9);
        assert!((bearing_degrees(origin, Point::new(10.0, 0.0)) - 90.0).abs() < 1e-9);
        assert!((bearing_degrees(origin, Point::new(0.0, -10.0)) - 180.0).abs() < 1e-9);
        assert!((bearing_degrees(origin, Point::new(-10.0, 0.0)) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_bearing_in_range() {
        for (a, b) in [(LIM, BRU), (BRU, LIM), (JFK, LIM), (LIM, JFK)] {
            let bearing = bearing_degrees(a, b);
            assert!((0.0..360.0).contains(&bearing));
        }
    }

    #[test]
    fn test_bearing_degenerate_is_zero() {
        let bearing = bearing_degrees(BRU, BRU);
        assert!(!bearing.is_nan());
        assert!(bearing.abs() < f64::EPSILON);
    }

    #[test]
    fn test_interpolate_endpoints() {
        for (a, b) in [(LIM, BRU), (BRU, JFK), (JFK, LIM)] {
            let start = interpolate(a, b, 0.0);
            let end = interpolate(a, b, 1.0);
            assert!((start.lon - a.lon).abs() < 1e-9 && (start.lat - a.lat).abs() < 1e-9);
            assert!((end.lon - b.lon).abs() < 1e-9 && (end.lat - b.lat).abs() < 1e-9);
        }
    }

    #[test]
    fn test_interpolate_midpoint_is_equidistant() {
        let mid = interpolate(LIM, BRU, 0.5);
        let to_start = distance_meters(LIM, mid);
        let to_end = distance_meters(mid, BRU);
        assert!((to_start - to_end).abs() < 1.0);
        assert!((to_start + to_end - distance_meters(LIM, BRU)).abs() < 1.0);
    }

    #[test]
    fn test_interpolate_degenerate_returns_origin() {
        let p = interpolate(JFK, JFK, 0.7);
        assert_eq!(p, JFK);
    }

    #[test]
    fn test_dms_decimal_string() {
        assert!((dms_to_decimal("-12.0219").unwrap() + 12.0219).abs() < 1e-12);
        assert!((dms_to_decimal(" 50.9010 ").unwrap() - 50.901).abs() < 1e-12);
    }

    #[test]
    fn test_dms_with_hemisphere() {
        let north = dms_to_decimal("04 42 05 N").unwrap();
        assert!((north - (4.0 + 42.0 / 60.0 + 5.0 / 3600.0)).abs() < 1e-9);

        let south = dms_to_decimal("12 01 19 S").unwrap();
        assert!((south + (12.0 + 1.0 / 60.0 + 19.0 / 3600.0)).abs() < 1e-9);

        let west = dms_to_decimal("77°06'51\"W").unwrap();
        assert!(west < -77.0 && west > -78.0);
    }

    #[test]
    fn test_dms_rejects_garbage() {
        assert!(dms_to_decimal("").is_none());
        assert!(dms_to_decimal("abc").is_none());
        assert!(dms_to_decimal("12 75 00 N").is_none());
        assert!(dms_to_decimal("12 01 19 X").is_none());
        assert!(dms_to_decimal("1 2 3 4").is_none());
    }
}
