//! Selection and gesture handling for placed objects.
//!
//! The controller owns the only piece of selection state, `tracked_object`.
//! Changing it toggles highlights and moves the action panel; pans and
//! rotations mutate the selected object directly. Work that has to go
//! through the scene queue (anchor reassignment after a drag) is posted
//! there; work that needs the session (placement, deletion, texture editing)
//! is returned as a [`TapOutcome`].

pub mod gestures;
pub mod panel;

use std::time::Instant;

use glam::{Mat4, Vec2, Vec3};
use shared::{ObjectId, TextureSetId};

use crate::scene::{PanelAction, Ray, SceneCommand, SceneQueue};
use crate::state::session::{PlacementIntent, PlacementRequest};
use crate::state::settings::PlacementSettings;
use crate::state::Scene;
use crate::tracking::{PlaneAlignment, RaycastHit, TrackingSession};

pub use gestures::{
    recognizes_simultaneously, GestureKind, GesturePhase, PanGesture, RotationGesture,
    ThresholdPan,
};
pub use panel::ActionPanel;

/// What a tap resolved to
#[derive(Debug, Clone, PartialEq)]
pub enum TapOutcome {
    /// A model is pending placement and the tap hit a plane
    Place(RaycastHit),
    /// A model is pending placement but no plane is under the tap
    PlacementMissed,
    /// Delete control: the object is already deselected
    Delete(ObjectId),
    /// Copy control: load and place this request
    Copy(PlacementRequest),
    /// Texture control
    EditTexture(ObjectId),
    /// A placed object was selected (or was already selected)
    Selected(ObjectId),
    /// Empty space: selection cleared
    Cleared,
    /// No touch points; nothing changed
    Ignored,
}

pub struct GestureInteractionController {
    tracked_object: Option<ObjectId>,
    /// Bumped on every selection change; async completions compare against it
    selection_epoch: u64,
    /// Screen position the current drag has reached
    tracking_position: Option<Vec2>,
    /// Object whose anchor was detached by the current drag
    dragging: Option<ObjectId>,
    pan: ThresholdPan,
    panel: ActionPanel,
    queue: SceneQueue,
    settings: PlacementSettings,
}

impl GestureInteractionController {
    pub fn new(queue: SceneQueue, settings: PlacementSettings) -> Self {
        Self {
            tracked_object: None,
            selection_epoch: 0,
            tracking_position: None,
            dragging: None,
            pan: ThresholdPan::new(),
            panel: ActionPanel::new(),
            queue,
            settings,
        }
    }

    pub fn tracked_object(&self) -> Option<ObjectId> {
        self.tracked_object
    }

    pub fn selection_epoch(&self) -> u64 {
        self.selection_epoch
    }

    pub fn tracking_position(&self) -> Option<Vec2> {
        self.tracking_position
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.is_some()
    }

    pub fn panel(&self) -> &ActionPanel {
        &self.panel
    }

    pub fn settings(&self) -> &PlacementSettings {
        &self.settings
    }

    /// Change the selection. The previous object is un-highlighted before the
    /// new one is highlighted and the panel moves with the selection.
    /// Returns false when the selection did not change.
    pub fn set_tracked_object(&mut self, object: Option<ObjectId>, scene: &mut Scene, now: Instant) -> bool {
        if object == self.tracked_object {
            return false;
        }

        if let Some(previous) = self.tracked_object.take() {
            if let Some(root) = scene.registry.get(previous).and_then(|o| o.node) {
                scene.graph.set_highlight(root, false);
            }
        }
        self.panel.detach(&mut scene.graph);
        self.end_drag();
        self.selection_epoch += 1;

        let selected = object.and_then(|id| scene.registry.get(id)).filter(|o| o.node.is_some());
        if let Some(selected) = selected {
            if let Some(root) = selected.node {
                scene.graph.set_highlight(root, true);
            }
            self.panel
                .attach(&mut scene.graph, selected, &self.settings.panel, now);
            self.tracked_object = Some(selected.id);
        }
        tracing::debug!("Selection changed to {:?}", self.tracked_object);
        true
    }

    /// Drop the selection if it refers to `object` (it is being removed)
    pub fn forget(&mut self, object: ObjectId, scene: &mut Scene, now: Instant) {
        if self.tracked_object == Some(object) {
            self.set_tracked_object(None, scene, now);
        }
        if self.dragging == Some(object) {
            self.dragging = None;
            self.tracking_position = None;
        }
    }

    // ── Tap ─────────────────────────────────────────────────

    /// Resolve a tap: pending placement, then panel controls, then placed
    /// objects, then empty space.
    pub fn handle_tap(
        &mut self,
        touches: &[Vec2],
        placement_pending: bool,
        scene: &mut Scene,
        tracking: &dyn TrackingSession,
        now: Instant,
    ) -> TapOutcome {
        let Some(centroid) = centroid(touches) else {
            return TapOutcome::Ignored;
        };

        if placement_pending {
            return match tracking.raycast(centroid, PlaneAlignment::Horizontal) {
                Some(hit) => TapOutcome::Place(hit),
                None => TapOutcome::PlacementMissed,
            };
        }

        if self.tracked_object.is_some() {
            let action = touches
                .iter()
                .chain(std::iter::once(&centroid))
                .find_map(|p| scene.graph.panel_action_at(&tracking.screen_ray(*p)));
            if let Some(action) = action {
                if let Some(outcome) = self.run_action(action, scene, now) {
                    return outcome;
                }
            }
        }

        match self.object_under(touches, centroid, scene, tracking) {
            Some(hit) => {
                self.set_tracked_object(Some(hit), scene, now);
                TapOutcome::Selected(hit)
            }
            None => {
                self.set_tracked_object(None, scene, now);
                TapOutcome::Cleared
            }
        }
    }

    /// Hit-test each touch against object bounds, then the centroid
    fn object_under(
        &self,
        touches: &[Vec2],
        centroid: Vec2,
        scene: &Scene,
        tracking: &dyn TrackingSession,
    ) -> Option<ObjectId> {
        let hit = |p: Vec2| -> Option<ObjectId> {
            let ray: Ray = tracking.screen_ray(p);
            scene.graph.object_at(&ray)
        };
        touches.iter().find_map(|p| hit(*p)).or_else(|| hit(centroid))
    }

    fn run_action(&mut self, action: PanelAction, scene: &mut Scene, now: Instant) -> Option<TapOutcome> {
        let id = self.tracked_object?;
        match action {
            PanelAction::Delete => {
                self.set_tracked_object(None, scene, now);
                tracing::info!("Delete requested for {}", id);
                Some(TapOutcome::Delete(id))
            }
            PanelAction::Copy => {
                let source = scene.registry.get(id)?;
                let offset = source.root_bounds().size().x - self.settings.copy_gap;
                let mut request = PlacementRequest {
                    model: source.model.clone(),
                    world_transform: source.world_transform
                        * Mat4::from_translation(Vec3::new(offset, 0.0, 0.0)),
                    yaw: source.yaw,
                    scale: source.scale,
                    texture: source.applied_texture.clone(),
                    intent: PlacementIntent::Copy { source: id },
                    epoch: 0,
                };
                // selection is cleared while the copy loads
                self.set_tracked_object(None, scene, now);
                request.epoch = self.selection_epoch;
                tracing::info!("Copy of {} requested", id);
                Some(TapOutcome::Copy(request))
            }
            PanelAction::Texture => Some(TapOutcome::EditTexture(id)),
        }
    }

    /// Select a freshly loaded copy unless the user changed the selection
    /// while it was loading. Returns whether it was selected.
    pub fn complete_copy(&mut self, copy: ObjectId, epoch: u64, scene: &mut Scene, now: Instant) -> bool {
        if epoch != self.selection_epoch {
            tracing::debug!("Copy {} arrived after the selection changed", copy);
            return false;
        }
        self.set_tracked_object(Some(copy), scene, now)
    }

    // ── Pan ─────────────────────────────────────────────────

    /// Drag the selected object across detected planes. Returns true when
    /// the object moved this callback.
    pub fn handle_pan(&mut self, gesture: &PanGesture, scene: &mut Scene, tracking: &dyn TrackingSession) -> bool {
        match gesture.phase {
            GesturePhase::Began => {
                self.pan.update(gesture, &self.settings.gestures);
                self.tracking_position = None;
                false
            }
            GesturePhase::Changed => {
                if !self.pan.update(gesture, &self.settings.gestures) {
                    return false;
                }
                let Some(id) = self.tracked_object else {
                    return false;
                };
                let Some(position) = scene.registry.get(id).map(|o| o.position()) else {
                    return false;
                };

                let translation = self.pan.take_translation();
                let current = self
                    .tracking_position
                    .unwrap_or_else(|| tracking.project_point(position));
                let updated = current + translation;
                self.tracking_position = Some(updated);

                if self.dragging != Some(id) {
                    scene.anchors.unbind(id, &mut scene.registry);
                    self.dragging = Some(id);
                }

                let Some(hit) = tracking.raycast(updated, PlaneAlignment::Horizontal) else {
                    return false;
                };
                if let Some(object) = scene.registry.get_mut(id) {
                    object.world_transform = hit.world_transform;
                    if let Some(root) = object.node {
                        scene
                            .graph
                            .set_object_pose(root, object.world_transform, object.model_pose());
                    }
                }
                true
            }
            GesturePhase::Ended | GesturePhase::Cancelled => {
                self.end_drag();
                false
            }
        }
    }

    /// Clear the drag sub-state, queueing one anchor reassignment if an
    /// object was dragged
    fn end_drag(&mut self) {
        self.tracking_position = None;
        self.pan.reset();
        if let Some(id) = self.dragging.take() {
            self.queue.push(SceneCommand::AssignAnchor(id));
        }
    }

    // ── Rotation ────────────────────────────────────────────

    /// Subtract the gesture's rotation from the selected object's yaw and
    /// zero the gesture. Correct when the camera looks down on the object;
    /// from below the direction is inverted.
    pub fn handle_rotation(&mut self, gesture: &mut RotationGesture, scene: &mut Scene) -> bool {
        if gesture.phase != GesturePhase::Changed {
            return false;
        }
        let Some(object) = self.tracked_object.and_then(|id| scene.registry.get_mut(id)) else {
            return false;
        };
        object.yaw -= gesture.rotation;
        gesture.rotation = 0.0;
        if let Some(root) = object.node {
            scene
                .graph
                .set_object_pose(root, object.world_transform, object.model_pose());
        }
        true
    }

    // ── Texture ─────────────────────────────────────────────

    /// Apply a texture set to the selected object's materials in place
    pub fn did_select_texture(&mut self, set: &str, scene: &mut Scene) -> Option<(ObjectId, TextureSetId)> {
        let id = self.tracked_object?;
        let model = scene.registry.get(id)?.model.clone();
        let Some(texture) = scene.registry.find_texture_set(&model, set) else {
            tracing::warn!("Texture set {} not found for {}", set, model);
            return None;
        };
        let object = scene.registry.get_mut(id)?;
        let bound = object.apply_texture(&texture);
        tracing::info!("Applied texture {} to {} ({} nodes)", set, id, bound);
        Some((id, texture.id))
    }
}

fn centroid(points: &[Vec2]) -> Option<Vec2> {
    if points.is_empty() {
        return None;
    }
    Some(points.iter().copied().sum::<Vec2>() / points.len() as f32)
}
