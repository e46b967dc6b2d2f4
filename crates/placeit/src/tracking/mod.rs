//! Tracking subsystem interface.
//!
//! Camera tracking, plane detection and world-map capture are provided by the
//! platform. The core talks to them through [`TrackingSession`]; anchor
//! callbacks are delivered onto the scene queue handed over in
//! [`TrackingSession::connect`].

pub mod simulated;

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use shared::{AnchorId, AnchorRecord, WorldMap};
use tokio::sync::oneshot;

use crate::scene::{Ray, SceneQueue};

pub use simulated::SimulatedTracking;

/// Why tracking quality is limited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitedReason {
    Initializing,
    ExcessiveMotion,
    InsufficientFeatures,
    Relocalizing,
    Other,
}

/// Camera tracking quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingState {
    NotAvailable,
    Limited(LimitedReason),
    Normal,
}

impl TrackingState {
    /// Generic user feedback for this tracking state
    pub fn feedback(&self) -> &'static str {
        match self {
            TrackingState::Normal => "Move around to map the environment.",
            TrackingState::NotAvailable => "Tracking unavailable.",
            TrackingState::Limited(LimitedReason::ExcessiveMotion) => "Move the device more slowly.",
            TrackingState::Limited(LimitedReason::InsufficientFeatures) => {
                "Point the device at an area with visible surface detail, or improve lighting conditions."
            }
            TrackingState::Limited(LimitedReason::Relocalizing) => {
                "Resuming session: move to where you were when the session was interrupted."
            }
            TrackingState::Limited(LimitedReason::Initializing) => "Initializing AR session.",
            TrackingState::Limited(LimitedReason::Other) => "Tracking limited - unspecified reason",
        }
    }
}

/// How much of the environment the world map covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingStatus {
    NotAvailable,
    Limited,
    Extending,
    Mapped,
}

/// Per-frame tracking snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameState {
    pub tracking: TrackingState,
    pub mapping: MappingStatus,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            tracking: TrackingState::NotAvailable,
            mapping: MappingStatus::NotAvailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorldAlignment {
    #[default]
    Gravity,
    GravityAndHeading,
}

/// Options for re-running an existing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    pub reset_tracking: bool,
    pub remove_existing_anchors: bool,
}

/// Configuration handed to [`TrackingSession::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub horizontal_plane_detection: bool,
    pub world_alignment: WorldAlignment,
    /// Map to relocalize against
    pub initial_world_map: Option<WorldMap>,
    pub options: RunOptions,
}

impl SessionConfig {
    /// Fresh world tracking with horizontal plane detection
    pub fn world_tracking() -> Self {
        Self {
            horizontal_plane_detection: true,
            world_alignment: WorldAlignment::Gravity,
            initial_world_map: None,
            options: RunOptions::default(),
        }
    }

    /// Restart from a saved map, discarding the current session's anchors
    pub fn relocalizing(map: WorldMap) -> Self {
        Self {
            initial_world_map: Some(map),
            options: RunOptions {
                reset_tracking: true,
                remove_existing_anchors: true,
            },
            ..Self::world_tracking()
        }
    }
}

/// Which planes a raycast may hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaneAlignment {
    Horizontal,
    Any,
}

/// Result of a raycast against detected planes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// Pose at the hit point, oriented like the hit plane
    pub world_transform: Mat4,
    pub anchor: Option<AnchorId>,
}

impl RaycastHit {
    pub fn position(&self) -> Vec3 {
        self.world_transform.w_axis.truncate()
    }
}

/// The platform tracking session
pub trait TrackingSession: Send {
    /// Deliver anchor add/update/remove callbacks onto `queue`
    fn connect(&mut self, queue: SceneQueue);

    fn run(&mut self, config: SessionConfig);

    fn pause(&mut self);

    fn add_anchor(&mut self, anchor: AnchorRecord);

    fn remove_anchor(&mut self, id: AnchorId);

    /// Raycast from a screen point against detected planes
    fn raycast(&self, point: Vec2, alignment: PlaneAlignment) -> Option<RaycastHit>;

    /// World-space ray through a screen point
    fn screen_ray(&self, point: Vec2) -> Ray;

    /// Screen position of a world point
    fn project_point(&self, world: Vec3) -> Vec2;

    /// Ask for the current world map; the answer may arrive frames later
    fn request_world_map(&mut self, reply: oneshot::Sender<Option<WorldMap>>);

    /// Encoded camera image for the save-time thumbnail
    fn capture_snapshot(&self) -> Vec<u8>;

    fn camera_transform(&self) -> Mat4;

    /// Latest tracking and mapping state
    fn current_frame(&self) -> FrameState;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relocalizing_config_resets() {
        let config = SessionConfig::relocalizing(WorldMap::default());
        assert!(config.horizontal_plane_detection);
        assert!(config.options.reset_tracking);
        assert!(config.options.remove_existing_anchors);
        assert!(config.initial_world_map.is_some());

        let fresh = SessionConfig::world_tracking();
        assert_eq!(fresh.options, RunOptions::default());
        assert_eq!(fresh.world_alignment, WorldAlignment::Gravity);
    }

    #[test]
    fn test_feedback_messages() {
        assert_eq!(TrackingState::NotAvailable.feedback(), "Tracking unavailable.");
        assert_eq!(
            TrackingState::Limited(LimitedReason::ExcessiveMotion).feedback(),
            "Move the device more slowly."
        );
        assert_eq!(
            TrackingState::Limited(LimitedReason::Other).feedback(),
            "Tracking limited - unspecified reason"
        );
    }
}
