//! Headless harness for driving a placement session programmatically.
//!
//! Wires a [`SceneSessionManager`] to simulated tracking and the fixture
//! furniture catalog, and offers world-space shortcuts for taps and drags.
//! Must be created inside a tokio runtime.

use std::path::Path;
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};
use shared::{AnchorId, ObjectId};
use tokio::runtime::Handle;

use crate::assets::{CatalogAssets, ModelRef};
use crate::error::StoreError;
use crate::fixtures;
use crate::scene::PanelAction;
use crate::state::interaction::{PanGesture, TapOutcome};
use crate::state::session::{SceneSessionManager, SessionEvent};
use crate::state::settings::PlacementSettings;
use crate::store::RoomStore;
use crate::tracking::{SimulatedTracking, TrackingSession};

pub struct SessionHarness {
    pub session: SceneSessionManager,
    pub tracking: SimulatedTracking,
    pub catalog: Arc<CatalogAssets>,
}

impl SessionHarness {
    /// Session over the fixture catalog, storing rooms in `rooms_dir`
    pub fn new(rooms_dir: &Path) -> Result<Self, StoreError> {
        Self::with_settings(rooms_dir, PlacementSettings::default())
    }

    pub fn with_settings(rooms_dir: &Path, settings: PlacementSettings) -> Result<Self, StoreError> {
        let tracking = SimulatedTracking::new();
        let catalog = Arc::new(fixtures::furniture_catalog());
        let store = RoomStore::open(rooms_dir)?;
        let session = SceneSessionManager::new(
            catalog.clone(),
            Box::new(tracking.clone()),
            store,
            settings,
            Handle::current(),
        );
        Ok(Self {
            session,
            tracking,
            catalog,
        })
    }

    // ── Environment ───────────────────────────────────────────

    /// Start the session and detect a floor of the given size around the
    /// origin
    pub async fn start_with_floor(&mut self, extent: Vec2) -> AnchorId {
        self.session.start();
        let floor = self.tracking.add_floor(Vec2::ZERO, extent);
        self.settle().await;
        self.sync_frame();
        floor
    }

    /// Wait for loads and drain the scene queue
    pub async fn settle(&mut self) {
        self.session.settle().await;
    }

    pub fn sync_frame(&mut self) {
        self.session.sync_frame();
    }

    // ── Input ─────────────────────────────────────────────────

    pub fn screen_point(&self, world: Vec3) -> Vec2 {
        self.tracking.project_point(world)
    }

    pub fn tap(&mut self, point: Vec2) -> TapOutcome {
        self.session.handle_tap(&[point])
    }

    pub fn tap_world(&mut self, world: Vec3) -> TapOutcome {
        let point = self.screen_point(world);
        self.tap(point)
    }

    /// Tap a control of the action panel on the selected object
    pub fn tap_action(&mut self, action: PanelAction) -> Option<TapOutcome> {
        let position = self
            .session
            .interaction()
            .panel()
            .button_position(&self.session.scene().graph, action)?;
        Some(self.tap_world(position))
    }

    /// One-finger drag of `delta` screen units, split into `steps` moves
    pub fn pan(&mut self, delta: Vec2, steps: usize) {
        let steps = steps.max(1);
        self.session.handle_pan(&PanGesture::began(1));
        for _ in 0..steps {
            self.session
                .handle_pan(&PanGesture::moved(1, delta / steps as f32));
        }
        self.session.handle_pan(&PanGesture::ended());
    }

    // ── Placement ─────────────────────────────────────────────

    /// Select `model` for placement, tap the floor at `position` and wait for
    /// the object to load. Returns the new object's id.
    pub async fn place(&mut self, model: &str, position: Vec3) -> Option<ObjectId> {
        self.session
            .select_model_for_placement(Some(ModelRef::new(model)));
        self.tap_world(position);
        self.settle().await;
        self.session
            .take_events()
            .into_iter()
            .rev()
            .find_map(|e| match e {
                SessionEvent::ObjectPlaced { object, .. } => Some(object),
                _ => None,
            })
    }

    pub fn object_position(&self, id: ObjectId) -> Option<Vec3> {
        self.session.registry().get(id).map(|o| o.position())
    }

    /// World transform of an object's anchor as tracking currently holds it
    pub fn anchor_transform(&self, id: ObjectId) -> Option<Mat4> {
        let anchor = self.session.registry().get(id)?.anchor?;
        self.tracking.anchor(anchor).map(|a| a.transform)
    }

    pub fn object_count(&self) -> usize {
        self.session.registry().len()
    }
}
