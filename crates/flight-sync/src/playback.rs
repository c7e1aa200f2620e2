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

//! Playback settings written by the UI and read by the animation loop.

use serde::{Deserialize, Serialize};

use crate::reconcile::SyncMode;

/// Slowest speed offered by the speed control, in km/h.
pub const MIN_SPEED_KMH: f64 = 50.0;
/// Fastest speed offered by the speed control, in km/h.
pub const MAX_SPEED_KMH: f64 = 1000.0;
/// Speed used when nothing else is configured, in km/h.
pub const DEFAULT_SPEED_KMH: f64 = 200.0;

/// Playback state shared between the controls and the animation loop.
///
/// The UI is the only writer; the loop reads it once per frame, so the last
/// write before a frame wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Whether the local clock advances.
    pub playing: bool,
    /// Visual cruise speed in km/h.
    pub speed_kmh: f64,
    /// Restart every route from its origin after reaching the end.
    pub looping: bool,
    /// Whether the backend clock corrects the visual motion.
    pub sync_mode: SyncMode,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            playing: true,
            speed_kmh: DEFAULT_SPEED_KMH,
            looping: false,
            sync_mode: SyncMode::default(),
        }
    }
}

impl PlaybackConfig {
    /// Speed in meters per second; non-finite or negative speeds count as 0.
    #[must_use]
    pub fn speed_mps(&self) -> f64 {
        kmh_to_mps(self.speed_kmh)
    }

    /// Set the speed, clamped to the range the controls offer.
    pub fn set_speed_kmh(&mut self, speed_kmh: f64) {
        self.speed_kmh = if speed_kmh.is_finite() {
            speed_kmh.clamp(MIN_SPEED_KMH, MAX_SPEED_KMH)
        } else {
            DEFAULT_SPEED_KMH
        };
    }

    pub fn toggle_playing(&mut self) {
        self.playing = !self.playing;
    }
}

/// Convert km/h to m/s.
#[must_use]
pub fn kmh_to_mps(speed_kmh: f64) -> f64 {
    if speed_kmh.is_finite() && speed_kmh > 0.0 {
        speed_kmh * 1000.0 / 3600.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlaybackConfig::default();
        assert!(config.playing);
        assert!(!config.looping);
        assert_eq!(config.sync_mode, SyncMode::Reconciled);
        assert!((config.speed_kmh - DEFAULT_SPEED_KMH).abs() < f64::EPSILON);
    }

    #[test]
    fn test_speed_conversion() {
        assert!((kmh_to_mps(900.0) - 250.0).abs() < 1e-12);
        assert!((kmh_to_mps(3.6) - 1.0).abs() < 1e-12);
        assert!(kmh_to_mps(-10.0).abs() < f64::EPSILON);
        assert!(kmh_to_mps(f64::NAN).abs() < f64::EPSILON);
    }

    #[test]
    fn test_set_speed_clamps() {
        let mut config = PlaybackConfig::default();
        config.set_speed_kmh(5.0);
        assert!((config.speed_kmh - MIN_SPEED_KMH).abs() < f64::EPSILON);
        config.set_speed_kmh(5_000.0);
        assert!((config.speed_kmh - MAX_SPEED_KMH).abs() < f64::EPSILON);
        config.set_speed_kmh(f64::INFINITY);
        assert!((config.speed_kmh - DEFAULT_SPEED_KMH).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: PlaybackConfig = serde_json::from_str(r#"{"looping": true}"#).unwrap();
        assert!(config.looping);
        assert!(config.playing);
        assert_eq!(config.sync_mode, SyncMode::Reconciled);
    }
}
