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

//! Per-frame driver that moves every itinerary's aircraft along its route.
//!
//! The loop owns all mutable animation state. Each frame it advances the
//! local clock by the frame delta (only while playing), asks the
//! [`ClockReconciler`] for a traveled distance, resolves that into a position
//! and heading, and writes the result to a [`RenderSink`]. Every entity in a
//! frame sees the same delta.
//!
//! Without looping an entity moves from `Running` to `Finished` when it
//! reaches its destination; once every entity has finished the loop stops
//! asking its [`FrameScheduler`] for frames until new itineraries are loaded
//! or [`AnimationLoop::reset`] is called.

mod sink;

pub use sink::{FrameScheduler, RenderSink};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, trace, warn};

use crate::geo::{bearing_degrees, Point};
use crate::model::Itinerary;
use crate::playback::PlaybackConfig;
use crate::reconcile::{BlendTier, ClockReconciler, ReconcileConfig};
use crate::resolver::resolve;
use crate::route::{fingerprint, RouteCache, RouteGeometry};

/// Lifecycle of one animated itinerary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityPhase {
    Running,
    /// Reached the destination with looping disabled; position is frozen.
    Finished,
}

/// Mutable per-itinerary animation state.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationState {
    /// Local playback time, advanced only while playing.
    pub elapsed_local_seconds: f64,
    pub phase: EntityPhase,
    /// Last position written to the sink.
    pub last_position: Option<Point>,
    pub last_heading_degrees: f64,
    /// Traveled distance behind the last position.
    pub last_distance: f64,
    /// Correction tier of the last reconciliation, if a clock applied.
    pub last_tier: Option<BlendTier>,
}

impl AnimationState {
    fn new() -> Self {
        Self {
            elapsed_local_seconds: 0.0,
            phase: EntityPhase::Running,
            last_position: None,
            last_heading_degrees: 0.0,
            last_distance: 0.0,
            last_tier: None,
        }
    }
}

/// Whether the loop wants another frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Another frame was requested from the scheduler.
    Scheduled,
    /// Nothing left to animate; no frame was requested.
    Idle,
}

/// Summary of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    /// Entities whose position was recomputed.
    pub rendered: usize,
    /// Finished entities whose frozen position was re-asserted.
    pub frozen: usize,
    /// Malformed entities skipped this frame.
    pub skipped: usize,
    pub status: FrameStatus,
}

impl FrameReport {
    /// Report of a frame in which nothing ran.
    #[must_use]
    pub fn idle() -> Self {
        Self {
            rendered: 0,
            frozen: 0,
            skipped: 0,
            status: FrameStatus::Idle,
        }
    }
}

#[derive(Debug)]
struct Entity {
    itinerary: Itinerary,
    fingerprint: u64,
    /// `None` when the itinerary cannot be walked.
    geometry: Option<Arc<RouteGeometry>>,
    state: AnimationState,
}

impl Entity {
    fn is_settled(&self) -> bool {
        self.geometry.is_none() || self.state.phase == EntityPhase::Finished
    }
}

enum Step {
    Rendered,
    Frozen,
    Skipped,
}

/// Frame-driven animation of a batch of itineraries.
///
/// Entities live in a dense arena indexed by itinerary id.
#[derive(Debug)]
pub struct AnimationLoop<S: FrameScheduler> {
    scheduler: S,
    reconciler: ClockReconciler,
    routes: RouteCache,
    entities: Vec<Entity>,
    index: HashMap<String, usize>,
    last_frame: Option<f64>,
    running: bool,
}

impl<S: FrameScheduler> AnimationLoop<S> {
    #[must_use]
    pub fn new(scheduler: S, config: ReconcileConfig) -> Self {
        Self {
            scheduler,
            reconciler: ClockReconciler::new(config),
            routes: RouteCache::new(),
            entities: Vec::new(),
            index: HashMap::new(),
            last_frame: None,
            running: false,
        }
    }

    /// Replace the animated itineraries with a new batch.
    ///
    /// Itineraries whose id and content are unchanged keep their state.
    /// New or changed ones start from their origin with fresh routes drawn.
    /// Entities missing from the batch are released from the sink. An id
    /// whose new content is malformed keeps its last good position.
    pub fn load(&mut self, itineraries: Vec<Itinerary>, sink: &mut dyn RenderSink) {
        self.routes.refresh(&itineraries);

        let mut previous: HashMap<String, Entity> = self
            .entities
            .drain(..)
            .map(|entity| (entity.itinerary.id.clone(), entity))
            .collect();
        self.index.clear();

        let mut carried = 0;
        for itinerary in itineraries {
            if self.index.contains_key(&itinerary.id) {
                warn!("Ignoring duplicate itinerary id {}", itinerary.id);
                continue;
            }

            let print = fingerprint(&itinerary);
            let entity = match previous.remove(&itinerary.id) {
                Some(old) if old.fingerprint == print => {
                    carried += 1;
                    old
                }
                Some(old) => self.replace_entity(old, itinerary, print, sink),
                None => self.create_entity(itinerary, print, sink),
            };

            self.index
                .insert(entity.itinerary.id.clone(), self.entities.len());
            self.entities.push(entity);
        }

        for id in previous.keys() {
            debug!("Releasing itinerary {}", id);
            sink.release_entity(id);
        }

        info!(
            "Loaded {} itineraries ({} unchanged, {} released)",
            self.entities.len(),
            carried,
            previous.len()
        );

        if self.entities.is_empty() {
            self.halt();
        } else {
            if !self.running {
                self.last_frame = None;
            }
            self.running = true;
            self.scheduler.request_frame();
        }
    }

    fn create_entity(
        &self,
        itinerary: Itinerary,
        print: u64,
        sink: &mut dyn RenderSink,
    ) -> Entity {
        let mut entity = Entity {
            geometry: None,
            fingerprint: print,
            state: AnimationState::new(),
            itinerary,
        };

        match entity.itinerary.validate_geometry() {
            Ok(()) => {
                entity.geometry = self.routes.get(&entity.itinerary.id);
                draw_routes(&entity.itinerary, sink);
                place_at_origin(&mut entity, sink);
            }
            Err(e) => {
                warn!("Itinerary {} will not animate: {}", entity.itinerary.id, e);
                // Freeze at the origin when there is a usable one.
                if entity.itinerary.origin().is_some_and(|p| p.is_finite()) {
                    place_at_origin(&mut entity, sink);
                }
            }
        }
        entity
    }

    fn replace_entity(
        &self,
        old: Entity,
        itinerary: Itinerary,
        print: u64,
        sink: &mut dyn RenderSink,
    ) -> Entity {
        if let Err(e) = itinerary.validate_geometry() {
            warn!(
                "Itinerary {} update is malformed, keeping last position: {}",
                itinerary.id, e
            );
            return Entity {
                itinerary,
                fingerprint: print,
                geometry: None,
                state: old.state,
            };
        }

        debug!("Itinerary {} changed, redrawing", itinerary.id);
        sink.release_entity(&itinerary.id);
        self.create_entity(itinerary, print, sink)
    }

    /// Run one frame at monotonic time `now_seconds`.
    ///
    /// `clock` is the backend's simulated time when one is known.
    pub fn tick(
        &mut self,
        now_seconds: f64,
        playback: &PlaybackConfig,
        clock: Option<DateTime<Utc>>,
        sink: &mut dyn RenderSink,
    ) -> FrameReport {
        if !self.running {
            return FrameReport::idle();
        }

        let delta = match self.last_frame {
            Some(previous) if now_seconds > previous => now_seconds - previous,
            _ => 0.0,
        };
        self.last_frame = Some(now_seconds);
        // Paused frames discard their delta.
        let delta = if playback.playing { delta } else { 0.0 };

        let mut report = FrameReport {
            status: FrameStatus::Scheduled,
            ..FrameReport::idle()
        };
        for entity in &mut self.entities {
            entity.state.elapsed_local_seconds += delta;
            if playback.looping && entity.state.phase == EntityPhase::Finished {
                entity.state.phase = EntityPhase::Running;
            }

            match step(entity, &self.reconciler, playback, clock, sink) {
                Step::Rendered => report.rendered += 1,
                Step::Frozen => report.frozen += 1,
                Step::Skipped => report.skipped += 1,
            }
        }

        if !playback.looping && self.entities.iter().all(Entity::is_settled) {
            info!("All itineraries finished, stopping animation");
            self.halt();
            report.status = FrameStatus::Idle;
        } else {
            self.scheduler.request_frame();
        }
        report
    }

    /// Restart every itinerary from its origin.
    pub fn reset(&mut self, sink: &mut dyn RenderSink) {
        for entity in &mut self.entities {
            entity.state = AnimationState::new();
            if entity.itinerary.origin().is_some_and(|p| p.is_finite()) {
                place_at_origin(entity, sink);
            }
        }
        self.last_frame = None;
        if !self.entities.is_empty() {
            self.running = true;
            self.scheduler.request_frame();
        }
    }

    /// Restart frame scheduling after the loop went idle, without touching
    /// entity state. Time spent idle is not counted.
    pub fn resume(&mut self) {
        if !self.running && !self.entities.is_empty() {
            self.last_frame = None;
            self.running = true;
            self.scheduler.request_frame();
        }
    }

    /// Cancel pending frames and release every entity from the sink.
    pub fn stop(&mut self, sink: &mut dyn RenderSink) {
        self.halt();
        for entity in self.entities.drain(..) {
            sink.release_entity(&entity.itinerary.id);
        }
        self.index.clear();
        self.routes.refresh(&[]);
        self.last_frame = None;
    }

    fn halt(&mut self) {
        self.running = false;
        self.scheduler.cancel_frames();
    }

    pub fn set_reconcile_config(&mut self, config: ReconcileConfig) {
        self.reconciler.set_config(config);
    }

    #[must_use]
    pub fn reconcile_config(&self) -> &ReconcileConfig {
        self.reconciler.config()
    }

    /// Whether frames are still being requested.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn state(&self, id: &str) -> Option<&AnimationState> {
        self.index.get(id).map(|&i| &self.entities[i].state)
    }

    /// Itineraries and their state, in load order.
    pub fn entities(&self) -> impl Iterator<Item = (&Itinerary, &AnimationState)> {
        self.entities.iter().map(|e| (&e.itinerary, &e.state))
    }

    #[must_use]
    pub fn finished_count(&self) -> usize {
        self.entities
            .iter()
            .filter(|e| e.state.phase == EntityPhase::Finished)
            .count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[must_use]
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }
}

impl<S: FrameScheduler> Drop for AnimationLoop<S> {
    fn drop(&mut self) {
        self.scheduler.cancel_frames();
    }
}

fn draw_routes(itinerary: &Itinerary, sink: &mut dyn RenderSink) {
    for (index, leg) in itinerary.legs.iter().enumerate() {
        sink.draw_static_route(&itinerary.id, index, [leg.origin, leg.destination]);
    }
}

fn place_at_origin(entity: &mut Entity, sink: &mut dyn RenderSink) {
    let Some(leg) = entity.itinerary.legs.first() else {
        return;
    };
    let heading = bearing_degrees(leg.origin, leg.destination);
    let heading = if heading.is_finite() { heading } else { 0.0 };
    sink.set_entity_position(&entity.itinerary.id, leg.origin.lon, leg.origin.lat);
    sink.set_entity_heading(&entity.itinerary.id, heading);
    entity.state.last_position = Some(leg.origin);
    entity.state.last_heading_degrees = heading;
}

fn step(
    entity: &mut Entity,
    reconciler: &ClockReconciler,
    playback: &PlaybackConfig,
    clock: Option<DateTime<Utc>>,
    sink: &mut dyn RenderSink,
) -> Step {
    let id = entity.itinerary.id.as_str();
    let Some(geometry) = entity.geometry.as_deref() else {
        trace!("Skipping malformed itinerary {}", id);
        return Step::Skipped;
    };

    if entity.state.phase == EntityPhase::Finished {
        if let Some(position) = entity.state.last_position {
            sink.set_entity_position(id, position.lon, position.lat);
            sink.set_entity_heading(id, entity.state.last_heading_degrees);
        }
        return Step::Frozen;
    }

    let reconciliation = reconciler.traveled_distance(
        &entity.itinerary,
        geometry,
        entity.state.elapsed_local_seconds,
        playback,
        clock,
    );
    let resolved = resolve(
        &entity.itinerary,
        geometry,
        reconciliation.distance,
        playback.looping,
    );
    if !resolved.position.is_finite() || !resolved.heading_degrees.is_finite() {
        debug!(
            "Itinerary {} resolved to a non-finite position at {} m, keeping last position",
            id, reconciliation.distance
        );
        return Step::Skipped;
    }

    sink.set_entity_position(id, resolved.position.lon, resolved.position.lat);
    sink.set_entity_heading(id, resolved.heading_degrees);

    let state = &mut entity.state;
    state.last_position = Some(resolved.position);
    state.last_heading_degrees = resolved.heading_degrees;
    state.last_distance = reconciliation.distance;
    state.last_tier = reconciliation.tier;

    if !playback.looping && resolved.at_or_past_end {
        info!("Itinerary {} reached its destination", id);
        state.phase = EntityPhase::Finished;
    }
    Step::Rendered
}
