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

use crate::geo::Point;

/// Warehouse usage tier of an airport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CapacityLevel {
    Normal,
    Moderate,
    High,
    Critical,
}

impl CapacityLevel {
    /// Tier for a usage percentage.
    #[must_use]
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 90.0 {
            Self::Critical
        } else if percent >= 70.0 {
            Self::High
        } else if percent >= 50.0 {
            Self::Moderate
        } else {
            Self::Normal
        }
    }
}

/// An airport shown as a static marker.
#[derive(Debug, Clone, PartialEq)]
pub struct Airport {
    /// IATA code, e.g. "LIM".
    pub code: String,
    pub name: String,
    pub city: String,
    pub country: String,
    pub location: Point,
    /// Company hub airports are drawn differently.
    pub is_hub: bool,
    /// Warehouse capacity in packages.
    pub capacity: Option<u32>,
    /// Packages currently stored.
    pub used_capacity: Option<u32>,
}

impl Airport {
    /// Storage usage as a percentage, when both figures are known.
    #[must_use]
    pub fn usage_percent(&self) -> Option<f64> {
        match (self.capacity, self.used_capacity) {
            (Some(capacity), Some(used)) if capacity > 0 => {
                Some(f64::from(used) / f64::from(capacity) * 100.0)
            }
            _ => None,
        }
    }

    /// Capacity tier, `Normal` when usage is unknown.
    #[must_use]
    pub fn capacity_level(&self) -> CapacityLevel {
        self.usage_percent()
            .map_or(CapacityLevel::Normal, CapacityLevel::from_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn airport(capacity: Option<u32>, used: Option<u32>) -> Airport {
        Airport {
            code: "LIM".to_string(),
            name: "Jorge Chavez".to_string(),
            city: "Lima".to_string(),
            country: "Peru".to_string(),
            location: Point::new(-77.1143, -12.0219),
            is_hub: true,
            capacity,
            used_capacity: used,
        }
    }

    #[test]
    fn test_capacity_tiers() {
        assert_eq!(CapacityLevel::from_percent(95.0), CapacityLevel::Critical);
        assert_eq!(CapacityLevel::from_percent(90.0), CapacityLevel::Critical);
        assert_eq!(CapacityLevel::from_percent(70.0), CapacityLevel::High);
        assert_eq!(CapacityLevel::from_percent(50.0), CapacityLevel::Moderate);
        assert_eq!(CapacityLevel::from_percent(49.9), CapacityLevel::Normal);
    }

    #[test]
    fn test_usage_percent() {
        let a = airport(Some(900), Some(450));
        assert!((a.usage_percent().unwrap() - 50.0).abs() < 1e-9);
        assert_eq!(a.capacity_level(), CapacityLevel::Moderate);

        assert!(airport(Some(0), Some(10)).usage_percent().is_none());
        assert!(airport(None, Some(10)).usage_percent().is_none());
        assert_eq!(airport(None, None).capacity_level(), CapacityLevel::Normal);
    }
}
