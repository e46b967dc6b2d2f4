//! Render-graph node table.
//!
//! Nodes form a parent/child hierarchy and carry a local transform. Placed
//! objects do not live in the graph themselves: each one owns a root node
//! (world pose) and a model node beneath it (yaw and scale, plus the asset
//! bounds). Hit-testing resolves a node back to its object through an explicit
//! owner table rather than walking ancestors.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use glam::{Mat4, Quat, Vec2, Vec3};
use shared::{AnchorId, ObjectId};

use super::picking::{ray_aabb, Aabb, Ray};

/// Stable identifier of a scene node
pub type NodeId = u64;

/// Controls on the action panel, in layout order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PanelAction {
    Copy,
    Delete,
    Texture,
}

impl PanelAction {
    pub fn all() -> &'static [PanelAction] {
        &[PanelAction::Copy, PanelAction::Delete, PanelAction::Texture]
    }
}

/// What a node draws
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    /// Pose root of a placed object
    ObjectRoot(ObjectId),
    /// Geometry of a placed object (yaw and scale applied)
    ObjectModel(ObjectId),
    /// Visualization of a detected floor plane
    Plane(AnchorId),
    /// Action panel container
    ActionPanel,
    PanelButton(PanelAction),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Animation {
    /// Rise from `drop` below the resting position while fading in
    Appear {
        start: Instant,
        duration: Duration,
        rest: Mat4,
        drop: f32,
    },
    /// Shrink to nothing, then detach
    Shrink { start: Instant, duration: Duration },
}

/// One node in the table
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub local: Mat4,
    /// Local-space bounds used for hit-testing; None for non-pickable nodes
    pub bounds: Option<Aabb>,
    pub highlighted: bool,
    pub opacity: f32,
    animation: Option<Animation>,
}

impl SceneNode {
    fn new(kind: NodeKind, parent: Option<NodeId>, local: Mat4, bounds: Option<Aabb>) -> Self {
        Self {
            kind,
            parent,
            local,
            bounds,
            highlighted: false,
            opacity: 1.0,
            animation: None,
        }
    }

    /// True while a shrink-out removal is pending
    pub fn is_removing(&self) -> bool {
        matches!(self.animation, Some(Animation::Shrink { .. }))
    }

    /// True while the appear animation runs
    pub fn is_appearing(&self) -> bool {
        matches!(self.animation, Some(Animation::Appear { .. }))
    }
}

/// Local transform of an object's model node
pub fn model_pose(yaw: f32, scale: Vec3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, Quat::from_rotation_y(yaw), Vec3::ZERO)
}

/// Node table with owner lookup
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: HashMap<NodeId, SceneNode>,
    /// Pickable node -> owning object
    owners: HashMap<NodeId, ObjectId>,
    next_id: NodeId,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    /// Insert a node and return its id
    pub fn insert(
        &mut self,
        kind: NodeKind,
        parent: Option<NodeId>,
        local: Mat4,
        bounds: Option<Aabb>,
    ) -> NodeId {
        self.next_id += 1;
        let id = self.next_id;
        self.nodes
            .insert(id, SceneNode::new(kind, parent, local, bounds));
        id
    }

    /// Direct children of a node
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == Some(id))
            .map(|(child, _)| *child)
            .collect();
        children.sort_unstable();
        children
    }

    /// World transform, composed through the parent chain
    pub fn world_transform(&self, id: NodeId) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(node_id) = current {
            match self.nodes.get(&node_id) {
                Some(node) => {
                    matrix = node.local * matrix;
                    current = node.parent;
                }
                None => break,
            }
        }
        matrix
    }

    pub fn set_local(&mut self, id: NodeId, local: Mat4) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.local = local;
        }
    }

    /// Remove a node and all of its descendants immediately
    pub fn detach(&mut self, id: NodeId) {
        for child in self.children(id) {
            self.detach(child);
        }
        self.nodes.remove(&id);
        self.owners.remove(&id);
    }

    // ── Placed objects ──────────────────────────────────────

    /// Attach an object's root and model nodes; returns the root node id
    pub fn attach_object(
        &mut self,
        object: ObjectId,
        world: Mat4,
        pose: Mat4,
        bounds: Aabb,
    ) -> NodeId {
        let root = self.insert(NodeKind::ObjectRoot(object), None, world, None);
        let model = self.insert(NodeKind::ObjectModel(object), Some(root), pose, Some(bounds));
        self.owners.insert(root, object);
        self.owners.insert(model, object);
        tracing::debug!("Attached object {} as node {}", object, root);
        root
    }

    /// Update the world pose and the yaw/scale pose of an attached object
    pub fn set_object_pose(&mut self, root: NodeId, world: Mat4, pose: Mat4) {
        self.set_local(root, world);
        if let Some(model) = self.model_node(root) {
            self.set_local(model, pose);
        }
    }

    /// Replace the geometry bounds of an attached object
    pub fn set_object_bounds(&mut self, root: NodeId, bounds: Aabb) {
        if let Some(model) = self.model_node(root) {
            if let Some(node) = self.nodes.get_mut(&model) {
                node.bounds = Some(bounds);
            }
        }
    }

    fn model_node(&self, root: NodeId) -> Option<NodeId> {
        self.children(root).into_iter().find(|child| {
            matches!(
                self.nodes.get(child).map(|n| n.kind),
                Some(NodeKind::ObjectModel(_))
            )
        })
    }

    /// Toggle the selected look of an object (root and model node)
    pub fn set_highlight(&mut self, root: NodeId, on: bool) {
        let mut targets = vec![root];
        targets.extend(self.model_node(root));
        for id in targets {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.highlighted = on;
            }
        }
    }

    /// Objects currently drawn highlighted
    pub fn highlighted_objects(&self) -> Vec<ObjectId> {
        let mut objects: Vec<ObjectId> = self
            .nodes
            .values()
            .filter_map(|n| match n.kind {
                NodeKind::ObjectRoot(id) if n.highlighted => Some(id),
                _ => None,
            })
            .collect();
        objects.sort_unstable();
        objects
    }

    /// Start a shrink-out; the node stops being pickable right away and is
    /// detached by [`SceneGraph::tick`] once `duration` has elapsed.
    pub fn schedule_removal(&mut self, root: NodeId, now: Instant, duration: Duration) {
        let mut stale = vec![root];
        stale.extend(self.children(root));
        for id in stale {
            self.owners.remove(&id);
        }
        if let Some(node) = self.nodes.get_mut(&root) {
            node.highlighted = false;
            node.animation = Some(Animation::Shrink {
                start: now,
                duration,
            });
        }
    }

    // ── Planes ──────────────────────────────────────────────

    fn plane_local(transform: Mat4, center: Vec3) -> Mat4 {
        transform * Mat4::from_translation(center)
    }

    fn plane_bounds(extent: Vec2) -> Aabb {
        Aabb::from_center_size(Vec3::ZERO, Vec3::new(extent.x, 0.001, extent.y))
    }

    /// Add a floor-plane visualization node
    pub fn add_plane(&mut self, anchor: AnchorId, transform: Mat4, center: Vec3, extent: Vec2) -> NodeId {
        self.insert(
            NodeKind::Plane(anchor),
            None,
            Self::plane_local(transform, center),
            Some(Self::plane_bounds(extent)),
        )
    }

    pub fn update_plane(&mut self, node: NodeId, transform: Mat4, center: Vec3, extent: Vec2) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.local = Self::plane_local(transform, center);
            n.bounds = Some(Self::plane_bounds(extent));
        }
    }

    // ── Animation ───────────────────────────────────────────

    /// Start the appear animation for a node resting at `rest`
    pub fn animate_appear(&mut self, id: NodeId, rest: Mat4, drop: f32, now: Instant, duration: Duration) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.local = Mat4::from_translation(Vec3::new(0.0, -drop, 0.0)) * rest;
            node.opacity = 0.0;
            node.animation = Some(Animation::Appear {
                start: now,
                duration,
                rest,
                drop,
            });
        }
    }

    /// Advance animations; returns the nodes detached by finished removals
    pub fn tick(&mut self, now: Instant) -> Vec<NodeId> {
        let mut finished = Vec::new();
        for (id, node) in self.nodes.iter_mut() {
            match node.animation {
                Some(Animation::Appear {
                    start,
                    duration,
                    rest,
                    drop,
                }) => {
                    let t = progress(start, duration, now);
                    node.local = Mat4::from_translation(Vec3::new(0.0, -drop * (1.0 - t), 0.0)) * rest;
                    node.opacity = t;
                    if t >= 1.0 {
                        node.animation = None;
                    }
                }
                Some(Animation::Shrink { start, duration }) => {
                    if progress(start, duration, now) >= 1.0 {
                        finished.push(*id);
                    }
                }
                None => {}
            }
        }
        finished.sort_unstable();
        for id in &finished {
            self.detach(*id);
        }
        finished
    }

    // ── Hit-testing ─────────────────────────────────────────

    fn nearest_hit(&self, ray: &Ray, pick: impl Fn(&NodeId, &SceneNode) -> bool) -> Option<(NodeId, f32)> {
        self.nodes
            .iter()
            .filter(|(id, node)| pick(*id, *node))
            .filter_map(|(id, node)| {
                let bounds = node.bounds?.transform(&self.world_transform(*id));
                ray_aabb(ray, &bounds).map(|dist| (*id, dist))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Nearest placed object whose bounding box the ray hits
    pub fn object_at(&self, ray: &Ray) -> Option<ObjectId> {
        let (node, _) = self.nearest_hit(ray, |id, _| self.owners.contains_key(id))?;
        self.owners.get(&node).copied()
    }

    /// Panel control under the ray, if any
    pub fn panel_action_at(&self, ray: &Ray) -> Option<PanelAction> {
        let (node, _) = self.nearest_hit(ray, |_, n| matches!(n.kind, NodeKind::PanelButton(_)))?;
        match self.nodes.get(&node)?.kind {
            NodeKind::PanelButton(action) => Some(action),
            _ => None,
        }
    }

    /// Owning object of a node, if it is part of a placed object
    pub fn owner(&self, id: NodeId) -> Option<ObjectId> {
        self.owners.get(&id).copied()
    }
}

fn progress(start: Instant, duration: Duration, now: Instant) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    let elapsed = now.saturating_duration_since(start).as_secs_f32();
    (elapsed / duration.as_secs_f32()).clamp(0.0, 1.0)
}
