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

/// Rendering layer the animation writes into.
///
/// Implement this trait to display animated itineraries on a map. Entity ids
/// are itinerary ids.
pub trait RenderSink {
    /// Move an entity's marker, creating it on first use.
    fn set_entity_position(&mut self, entity_id: &str, lon: f64, lat: f64);

    /// Rotate an entity's marker; degrees clockwise from north.
    fn set_entity_heading(&mut self, entity_id: &str, degrees: f64);

    /// Draw one leg of an itinerary's route as a static line.
    fn draw_static_route(&mut self, itinerary_id: &str, leg_index: usize, path: [Point; 2]);

    /// Drop the marker and routes created for an entity.
    fn release_entity(&mut self, entity_id: &str);
}

/// Source of animation frames.
///
/// The loop requests one frame at a time; cancelling withdraws any pending
/// request.
pub trait FrameScheduler {
    fn request_frame(&mut self);
    fn cancel_frames(&mut self);
}
