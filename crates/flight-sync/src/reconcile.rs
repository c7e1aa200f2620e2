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

//! Blending the smooth local clock with the backend's simulated clock.
//!
//! The local clock gives every frame a distance of `elapsed * speed`. When
//! the backend supplies a simulated "now", each itinerary also gets a target
//! distance from its leg schedule. The two are blended in three tiers based
//! on how far apart they are relative to the route length:
//!
//! | deviation            | result                                   |
//! |----------------------|------------------------------------------|
//! | above `hard`         | `hard_visual_weight` visual, rest target |
//! | above `soft`         | `soft_visual_weight` visual, rest target |
//! | at or below `soft`   | visual only                              |
//!
//! Everything is recomputed from absolute values each frame, so a backward
//! jump of the simulated clock corrects itself on the next frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Itinerary;
use crate::playback::PlaybackConfig;
use crate::route::RouteGeometry;

/// Which motion sources drive the animation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// Local clock only; the backend clock is ignored.
    VisualOnly,
    /// Local clock corrected toward the backend clock.
    #[default]
    Reconciled,
}

impl SyncMode {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::VisualOnly => "Visual only",
            Self::Reconciled => "Reconciled",
        }
    }
}

/// Which correction tier a blend fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendTier {
    /// Close enough; visual distance used unchanged.
    InSync,
    /// Moderate drift; gentle pull toward the target.
    Gentle,
    /// Large drift; strong pull toward the target.
    Aggressive,
}

/// Thresholds and weights of the three-tier blend.
///
/// Thresholds are fractions of the route length. Weights are the share given
/// to the visual distance; the target gets the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub hard_threshold: f64,
    pub soft_threshold: f64,
    pub hard_visual_weight: f64,
    pub soft_visual_weight: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            hard_threshold: 0.15,
            soft_threshold: 0.05,
            hard_visual_weight: 0.5,
            soft_visual_weight: 0.8,
        }
    }
}

impl ReconcileConfig {
    /// Tier for a deviation expressed as a fraction of the route length.
    #[must_use]
    pub fn tier(&self, deviation_fraction: f64) -> BlendTier {
        if deviation_fraction > self.hard_threshold {
            BlendTier::Aggressive
        } else if deviation_fraction > self.soft_threshold {
            BlendTier::Gentle
        } else {
            BlendTier::InSync
        }
    }

    /// Blend `visual` toward `target` for a route of length `total`.
    #[must_use]
    pub fn blend(&self, visual: f64, target: f64, total: f64) -> (f64, BlendTier) {
        let deviation = (visual - target).abs() / total.max(crate::route::MIN_ROUTE_LENGTH_M);
        let tier = self.tier(deviation);
        let weight = match tier {
            BlendTier::InSync => return (visual, tier),
            BlendTier::Gentle => self.soft_visual_weight,
            BlendTier::Aggressive => self.hard_visual_weight,
        }
        .clamp(0.0, 1.0);
        (weight * visual + (1.0 - weight) * target, tier)
    }
}

/// Distance covered by the local clock.
#[must_use]
pub fn visual_distance(elapsed_seconds: f64, speed_mps: f64) -> f64 {
    elapsed_seconds.max(0.0) * speed_mps
}

/// Distance the itinerary should have covered at simulated time `now`.
///
/// Before a leg departs the aircraft holds at that leg's origin; during the
/// leg it progresses linearly in time; after the final arrival it sits at the
/// route end. Returns `None` when any leg has no schedule.
#[must_use]
pub fn authoritative_target(
    itinerary: &Itinerary,
    geometry: &RouteGeometry,
    now: DateTime<Utc>,
) -> Option<f64> {
    if itinerary.legs.is_empty() || itinerary.legs.iter().any(|leg| leg.schedule().is_none()) {
        return None;
    }

    let mut prior = 0.0;
    for (leg, &length) in itinerary.legs.iter().zip(geometry.leg_lengths()) {
        let (departure, arrival) = leg.schedule()?;
        if now < departure {
            return Some(prior);
        }
        if now < arrival {
            let window = (arrival - departure).to_std().ok()?.as_secs_f64();
            let progressed = (now - departure).to_std().ok()?.as_secs_f64();
            let fraction = if window > 0.0 {
                (progressed / window).clamp(0.0, 1.0)
            } else {
                1.0
            };
            return Some(prior + fraction * length);
        }
        prior += length;
    }

    Some(geometry.total())
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciliation {
    /// Distance handed to the position resolver.
    pub distance: f64,
    /// Distance from the local clock alone.
    pub visual: f64,
    /// Distance implied by the simulated clock, when one applied.
    pub target: Option<f64>,
    /// Tier used, when a target applied.
    pub tier: Option<BlendTier>,
}

/// Produces the traveled distance for an itinerary each frame.
#[derive(Debug, Clone, Default)]
pub struct ClockReconciler {
    config: ReconcileConfig,
}

impl ClockReconciler {
    #[must_use]
    pub fn new(config: ReconcileConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ReconcileConfig) {
        self.config = config;
    }

    /// Traveled distance for `itinerary` after `elapsed_seconds` of local
    /// playback, corrected toward `clock` when the sync mode allows.
    ///
    /// Without looping the result stays within `[0, total]`. With looping the
    /// unwrapped visual distance is blended and left unwrapped; the resolver
    /// wraps it onto the route, so the result stays continuous across laps.
    #[must_use]
    pub fn traveled_distance(
        &self,
        itinerary: &Itinerary,
        geometry: &RouteGeometry,
        elapsed_seconds: f64,
        playback: &PlaybackConfig,
        clock: Option<DateTime<Utc>>,
    ) -> Reconciliation {
        let visual = visual_distance(elapsed_seconds, playback.speed_mps());
        let target = match (playback.sync_mode, clock) {
            (SyncMode::Reconciled, Some(now)) => authoritative_target(itinerary, geometry, now),
            _ => None,
        };

        let (distance, tier) = match target {
            None => (visual, None),
            Some(target) => {
                let (blended, tier) = self.config.blend(visual, target, geometry.span());
                (blended, Some(tier))
            }
        };

        let distance = if playback.looping {
            distance
        } else {
            distance.clamp(0.0, geometry.total())
        };

        Reconciliation {
            distance,
            visual,
            target,
            tier,
        }
    }
}
