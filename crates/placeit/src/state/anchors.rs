//! Reconciles tracking anchors with floor-plane records and placed objects.
//!
//! Plane anchors classified as floor get a [`PlaneRecord`] and a visualization
//! node. Object anchors are matched to registry objects through
//! `PlacedObject::anchor`; a match re-attaches the object to the scene graph
//! and keeps its world transform equal to the anchor's last delivered pose.

use std::collections::{BTreeMap, HashMap};

use glam::{Mat4, Vec2, Vec3};
use shared::{AnchorId, AnchorKind, AnchorRecord, ObjectId};

use crate::scene::{NodeId, SceneGraph};
use crate::state::registry::ObjectRegistry;
use crate::tracking::TrackingSession;

/// A detected floor plane and its visualization
#[derive(Debug, Clone, PartialEq)]
pub struct PlaneRecord {
    pub id: AnchorId,
    pub transform: Mat4,
    pub center: Vec3,
    pub extent: Vec2,
    pub node: NodeId,
}

impl PlaneRecord {
    /// World-space center of the plane
    pub fn world_center(&self) -> Vec3 {
        self.transform.transform_point3(self.center)
    }
}

#[derive(Debug, Default)]
pub struct AnchorReconciler {
    planes: BTreeMap<AnchorId, PlaneRecord>,
    /// Anchors unbound at drag start, removed from tracking on reassignment
    stale: HashMap<ObjectId, AnchorId>,
}

impl AnchorReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plane(&self, id: AnchorId) -> Option<&PlaneRecord> {
        self.planes.get(&id)
    }

    pub fn planes(&self) -> impl Iterator<Item = &PlaneRecord> {
        self.planes.values()
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Handle a newly delivered anchor. Returns the object it re-attached, if
    /// any.
    pub fn on_anchor_added(
        &mut self,
        anchor: &AnchorRecord,
        registry: &mut ObjectRegistry,
        graph: &mut SceneGraph,
    ) -> Option<ObjectId> {
        match &anchor.kind {
            AnchorKind::Plane { center, extent, .. } => {
                if !anchor.is_floor_plane() {
                    return None;
                }
                if let Some(existing) = self.planes.get(&anchor.id) {
                    tracing::debug!("Plane {} delivered twice", existing.id);
                    return None;
                }
                let node = graph.add_plane(anchor.id, anchor.transform, *center, *extent);
                self.planes.insert(
                    anchor.id,
                    PlaneRecord {
                        id: anchor.id,
                        transform: anchor.transform,
                        center: *center,
                        extent: *extent,
                        node,
                    },
                );
                tracing::debug!("Floor plane {} detected", anchor.id);
                None
            }
            AnchorKind::Snapshot { .. } => None,
            AnchorKind::Object => {
                let id = registry.find_by_anchor(anchor.id)?;
                let object = registry.get_mut(id)?;
                object.world_transform = anchor.transform;
                match object.node {
                    Some(root) => {
                        graph.set_object_pose(root, object.world_transform, object.model_pose());
                        None
                    }
                    None => {
                        let root = graph.attach_object(
                            object.id,
                            object.world_transform,
                            object.model_pose(),
                            object.bounds,
                        );
                        object.node = Some(root);
                        tracing::info!("Re-attached {} ({}) on anchor {}", object.model, id, anchor.id);
                        Some(id)
                    }
                }
            }
        }
    }

    /// Handle an anchor pose/extent refinement. Plane records and bound
    /// objects are checked independently.
    pub fn on_anchor_updated(
        &mut self,
        anchor: &AnchorRecord,
        registry: &mut ObjectRegistry,
        graph: &mut SceneGraph,
    ) {
        if let Some(plane) = self.planes.get_mut(&anchor.id) {
            if let AnchorKind::Plane { center, extent, .. } = &anchor.kind {
                plane.transform = anchor.transform;
                plane.center = *center;
                plane.extent = *extent;
                graph.update_plane(plane.node, plane.transform, plane.center, plane.extent);
            }
        }

        if let Some(object) = registry
            .find_by_anchor(anchor.id)
            .and_then(|id| registry.get_mut(id))
        {
            object.world_transform = anchor.transform;
            if let Some(root) = object.node {
                graph.set_object_pose(root, object.world_transform, object.model_pose());
            }
        }
    }

    /// Handle anchor removal (plane merge)
    pub fn on_anchor_removed(&mut self, id: AnchorId, graph: &mut SceneGraph) {
        if let Some(plane) = self.planes.remove(&id) {
            graph.detach(plane.node);
            tracing::debug!("Plane {} removed", id);
        }
    }

    /// Give an object a fresh anchor at its current world transform, removing
    /// whatever anchor it had before. Never called during a drag.
    pub fn assign_anchor(
        &mut self,
        object: ObjectId,
        registry: &mut ObjectRegistry,
        tracking: &mut dyn TrackingSession,
    ) -> Option<AnchorId> {
        let object = registry.get_mut(object)?;
        if let Some(stale) = self.stale.remove(&object.id) {
            tracking.remove_anchor(stale);
        }
        if let Some(previous) = object.anchor.take() {
            tracking.remove_anchor(previous);
        }
        let anchor = AnchorRecord::object(object.world_transform);
        let id = anchor.id;
        object.anchor = Some(id);
        tracking.add_anchor(anchor);
        tracing::debug!("Object {} anchored to {}", object.id, id);
        Some(id)
    }

    /// Detach an object's anchor at drag start so tracking updates cannot move
    /// it while the user does
    pub fn unbind(&mut self, object: ObjectId, registry: &mut ObjectRegistry) {
        if let Some(object) = registry.get_mut(object) {
            if let Some(anchor) = object.anchor.take() {
                self.stale.insert(object.id, anchor);
            }
        }
    }

    /// Drop every anchor an object holds, current or stale
    pub fn release(&mut self, object: ObjectId, anchor: Option<AnchorId>, tracking: &mut dyn TrackingSession) {
        if let Some(stale) = self.stale.remove(&object) {
            tracking.remove_anchor(stale);
        }
        if let Some(anchor) = anchor {
            tracking.remove_anchor(anchor);
        }
    }

    /// Forget all planes and pending state, e.g. before relocalizing
    pub fn reset(&mut self, graph: &mut SceneGraph) {
        for plane in std::mem::take(&mut self.planes).into_values() {
            graph.detach(plane.node);
        }
        self.stale.clear();
    }
}
