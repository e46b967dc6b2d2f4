//! Deterministic in-process tracking session.
//!
//! The camera looks straight down at the floor. Screen x maps to world x and
//! screen y maps to world z, scaled by `pixels_per_meter`. Planes are added by
//! hand; relocalization against a loaded map happens when the driver calls
//! [`SimulatedTracking::relocalize`].

use std::sync::{Arc, Mutex, MutexGuard};

use glam::{Mat4, Quat, Vec2, Vec3};
use shared::{AnchorId, AnchorKind, AnchorRecord, PlaneClassification, WorldMap};
use tokio::sync::oneshot;

use super::{
    FrameState, LimitedReason, MappingStatus, PlaneAlignment, RaycastHit, RunOptions,
    SessionConfig, TrackingSession, TrackingState,
};
use crate::scene::{Ray, SceneQueue};

/// Default camera height above the floor, meters
const CAMERA_HEIGHT: f32 = 1.5;
/// Default screen scale
const PIXELS_PER_METER: f32 = 100.0;
/// Stand-in thumbnail bytes (PNG signature)
const SNAPSHOT: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Clone)]
struct TrackedAnchor {
    record: AnchorRecord,
    delivered: bool,
}

#[derive(Debug)]
struct SimState {
    queue: Option<SceneQueue>,
    running: bool,
    run_count: usize,
    last_options: Option<RunOptions>,
    anchors: Vec<TrackedAnchor>,
    /// Anchors of a loaded map, delivered on relocalization
    pending: Vec<AnchorRecord>,
    relocalizing: bool,
    feature_points: Vec<Vec3>,
    world_map_available: bool,
    mapping: MappingStatus,
    camera_origin: Vec2,
    pixels_per_meter: f32,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            queue: None,
            running: false,
            run_count: 0,
            last_options: None,
            anchors: Vec::new(),
            pending: Vec::new(),
            relocalizing: false,
            feature_points: Vec::new(),
            world_map_available: true,
            mapping: MappingStatus::Mapped,
            camera_origin: Vec2::ZERO,
            pixels_per_meter: PIXELS_PER_METER,
        }
    }
}

impl SimState {
    fn emit_added(&mut self, index: usize) {
        if !self.running {
            return;
        }
        if let (Some(queue), Some(anchor)) = (&self.queue, self.anchors.get_mut(index)) {
            queue.anchor_added(anchor.record.clone());
            anchor.delivered = true;
        }
    }

    fn emit_updated(&self, record: &AnchorRecord) {
        if let (true, Some(queue)) = (self.running, &self.queue) {
            queue.anchor_updated(record.clone());
        }
    }

    fn emit_removed(&self, id: AnchorId) {
        if let (true, Some(queue)) = (self.running, &self.queue) {
            queue.anchor_removed(id);
        }
    }

    fn flush_undelivered(&mut self) {
        for index in 0..self.anchors.len() {
            if !self.anchors[index].delivered {
                self.emit_added(index);
            }
        }
    }

    fn index_of(&self, id: AnchorId) -> Option<usize> {
        self.anchors.iter().position(|a| a.record.id == id)
    }

    fn screen_ray(&self, point: Vec2) -> Ray {
        let xz = self.camera_origin + point / self.pixels_per_meter;
        Ray::new(Vec3::new(xz.x, CAMERA_HEIGHT, xz.y), Vec3::NEG_Y)
    }
}

/// Simulated tracking session; clones share state so a driver can keep a
/// handle after boxing one into the session manager
#[derive(Debug, Clone, Default)]
pub struct SimulatedTracking {
    inner: Arc<Mutex<SimState>>,
}

impl SimulatedTracking {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Driver controls ─────────────────────────────────────

    /// Detect a floor plane centered at `center` (world xz) with the given
    /// width and depth
    pub fn add_floor(&self, center: Vec2, extent: Vec2) -> AnchorId {
        self.add_plane(center, 0.0, extent, PlaneClassification::Floor)
    }

    /// Detect a horizontal plane at height `y`
    pub fn add_plane(
        &self,
        center: Vec2,
        y: f32,
        extent: Vec2,
        classification: PlaneClassification,
    ) -> AnchorId {
        let record = AnchorRecord {
            id: uuid::Uuid::new_v4(),
            transform: Mat4::from_translation(Vec3::new(center.x, y, center.y)),
            kind: AnchorKind::Plane {
                center: Vec3::ZERO,
                extent,
                classification,
            },
        };
        let id = record.id;
        let mut state = self.state();
        state.anchors.push(TrackedAnchor {
            record,
            delivered: false,
        });
        let index = state.anchors.len() - 1;
        state.emit_added(index);
        id
    }

    /// Grow or move a detected plane; `center` is relative to its anchor
    pub fn update_plane(&self, id: AnchorId, center: Vec3, extent: Vec2) {
        let mut state = self.state();
        let Some(index) = state.index_of(id) else {
            return;
        };
        if let AnchorKind::Plane {
            center: c,
            extent: e,
            ..
        } = &mut state.anchors[index].record.kind
        {
            *c = center;
            *e = extent;
        }
        let record = state.anchors[index].record.clone();
        state.emit_updated(&record);
    }

    /// Merge `absorbed` into `keep`: the kept plane grows to cover both and
    /// the absorbed one is removed
    pub fn merge_planes(&self, keep: AnchorId, absorbed: AnchorId) {
        let (bounds_keep, bounds_absorbed) = {
            let state = self.state();
            let footprint = |id| {
                let index = state.index_of(id)?;
                let record = &state.anchors[index].record;
                match record.kind {
                    AnchorKind::Plane { center, extent, .. } => {
                        let c = record.transform.transform_point3(center);
                        let half = Vec2::new(extent.x, extent.y) * 0.5;
                        let c = Vec2::new(c.x, c.z);
                        Some((c - half, c + half))
                    }
                    _ => None,
                }
            };
            (footprint(keep), footprint(absorbed))
        };
        let (Some((min_a, max_a)), Some((min_b, max_b))) = (bounds_keep, bounds_absorbed) else {
            return;
        };
        let (min, max) = (min_a.min(min_b), max_a.max(max_b));
        let anchor_xz = {
            let state = self.state();
            state
                .index_of(keep)
                .map(|i| state.anchors[i].record.position())
                .unwrap_or_default()
        };
        let mid = (min + max) * 0.5;
        self.update_plane(
            keep,
            Vec3::new(mid.x - anchor_xz.x, 0.0, mid.y - anchor_xz.z),
            max - min,
        );
        self.remove_anchor_internal(absorbed);
    }

    /// Move an anchor to a new pose, as a tracking refinement would
    pub fn move_anchor(&self, id: AnchorId, transform: Mat4) {
        let mut state = self.state();
        let Some(index) = state.index_of(id) else {
            return;
        };
        state.anchors[index].record.transform = transform;
        let record = state.anchors[index].record.clone();
        state.emit_updated(&record);
    }

    /// Finish relocalizing against the loaded map: its anchors become live and
    /// are delivered
    pub fn relocalize(&self) {
        let mut state = self.state();
        state.relocalizing = false;
        let pending = std::mem::take(&mut state.pending);
        for record in pending {
            state.anchors.push(TrackedAnchor {
                record,
                delivered: false,
            });
        }
        state.flush_undelivered();
    }

    pub fn set_world_map_available(&self, available: bool) {
        self.state().world_map_available = available;
    }

    pub fn set_mapping(&self, mapping: MappingStatus) {
        self.state().mapping = mapping;
    }

    /// Move the camera so screen origin looks at world `(x, z)`
    pub fn set_camera_origin(&self, origin: Vec2) {
        self.state().camera_origin = origin;
    }

    pub fn pixels_per_meter(&self) -> f32 {
        self.state().pixels_per_meter
    }

    // ── Observation ─────────────────────────────────────────

    pub fn is_running(&self) -> bool {
        self.state().running
    }

    pub fn run_count(&self) -> usize {
        self.state().run_count
    }

    pub fn last_run_options(&self) -> Option<RunOptions> {
        self.state().last_options
    }

    pub fn anchor(&self, id: AnchorId) -> Option<AnchorRecord> {
        let state = self.state();
        state.index_of(id).map(|i| state.anchors[i].record.clone())
    }

    pub fn anchor_count(&self) -> usize {
        self.state().anchors.len()
    }

    fn remove_anchor_internal(&self, id: AnchorId) {
        let mut state = self.state();
        state.pending.retain(|a| a.id != id);
        if let Some(index) = state.index_of(id) {
            let removed = state.anchors.remove(index);
            if removed.delivered {
                state.emit_removed(id);
            }
        }
    }
}

impl TrackingSession for SimulatedTracking {
    fn connect(&mut self, queue: SceneQueue) {
        self.state().queue = Some(queue);
    }

    fn run(&mut self, config: SessionConfig) {
        let mut state = self.state();
        state.running = true;
        state.run_count += 1;
        state.last_options = Some(config.options);

        if config.options.remove_existing_anchors {
            let removed: Vec<TrackedAnchor> = std::mem::take(&mut state.anchors);
            for anchor in removed.iter().filter(|a| a.delivered) {
                state.emit_removed(anchor.record.id);
            }
        }
        if let Some(map) = config.initial_world_map {
            state.feature_points = map.feature_points;
            state.pending = map.anchors;
            state.relocalizing = true;
        }
        state.flush_undelivered();
        tracing::debug!("Simulated tracking running (run #{})", state.run_count);
    }

    fn pause(&mut self) {
        self.state().running = false;
    }

    fn add_anchor(&mut self, anchor: AnchorRecord) {
        let mut state = self.state();
        state.anchors.push(TrackedAnchor {
            record: anchor,
            delivered: false,
        });
        let index = state.anchors.len() - 1;
        state.emit_added(index);
    }

    fn remove_anchor(&mut self, id: AnchorId) {
        self.remove_anchor_internal(id);
    }

    fn raycast(&self, point: Vec2, alignment: PlaneAlignment) -> Option<RaycastHit> {
        let state = self.state();
        let ray = state.screen_ray(point);
        state
            .anchors
            .iter()
            .filter_map(|a| {
                let record = &a.record;
                let AnchorKind::Plane { center, extent, .. } = record.kind else {
                    return None;
                };
                let (_, rotation, _) = record.transform.to_scale_rotation_translation();
                let up = rotation * Vec3::Y;
                let horizontal = up.dot(Vec3::Y) > 0.99;
                if alignment == PlaneAlignment::Horizontal && !horizontal {
                    return None;
                }
                let origin = record.transform.transform_point3(center);
                let denom = up.dot(ray.direction);
                if denom.abs() < 1e-6 {
                    return None;
                }
                let t = (origin - ray.origin).dot(up) / denom;
                if t < 0.0 {
                    return None;
                }
                let hit = ray.point_at(t);
                let local = record.transform.inverse().transform_point3(hit) - center;
                if local.x.abs() > extent.x * 0.5 || local.z.abs() > extent.y * 0.5 {
                    return None;
                }
                Some((
                    t,
                    RaycastHit {
                        world_transform: Mat4::from_rotation_translation(rotation, hit),
                        anchor: Some(record.id),
                    },
                ))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, hit)| hit)
    }

    fn screen_ray(&self, point: Vec2) -> Ray {
        self.state().screen_ray(point)
    }

    fn project_point(&self, world: Vec3) -> Vec2 {
        let state = self.state();
        (Vec2::new(world.x, world.z) - state.camera_origin) * state.pixels_per_meter
    }

    fn request_world_map(&mut self, reply: oneshot::Sender<Option<WorldMap>>) {
        let state = self.state();
        let map = (state.running && state.world_map_available && !state.relocalizing).then(|| {
            WorldMap {
                feature_points: state.feature_points.clone(),
                anchors: state.anchors.iter().map(|a| a.record.clone()).collect(),
                ..Default::default()
            }
        });
        if reply.send(map).is_err() {
            tracing::debug!("World map requester went away");
        }
    }

    fn capture_snapshot(&self) -> Vec<u8> {
        SNAPSHOT.to_vec()
    }

    fn camera_transform(&self) -> Mat4 {
        let state = self.state();
        let position = Vec3::new(state.camera_origin.x, CAMERA_HEIGHT, state.camera_origin.y);
        Mat4::from_rotation_translation(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2), position)
    }

    fn current_frame(&self) -> FrameState {
        let state = self.state();
        if !state.running {
            return FrameState::default();
        }
        if state.relocalizing {
            return FrameState {
                tracking: TrackingState::Limited(LimitedReason::Relocalizing),
                mapping: MappingStatus::NotAvailable,
            };
        }
        FrameState {
            tracking: TrackingState::Normal,
            mapping: state.mapping,
        }
    }
}
