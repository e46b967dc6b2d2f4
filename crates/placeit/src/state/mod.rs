pub mod anchors;
pub mod interaction;
pub mod registry;
pub mod session;
pub mod settings;
pub mod status;

pub use anchors::{AnchorReconciler, PlaneRecord};
pub use interaction::{GestureInteractionController, TapOutcome};
pub use registry::{ObjectRegistry, PlacedObject};
pub use session::{PlacementIntent, PlacementRequest, SceneSessionManager, SessionEvent, SessionPhase};
pub use settings::{GestureSettings, PanelSettings, PlacementSettings};
pub use status::{derive_status, SessionStatus, StatusInputs};

use crate::scene::SceneGraph;

/// Scene-owned state. Only the session owner mutates it; other producers go
/// through the scene queue.
pub struct Scene {
    pub registry: ObjectRegistry,
    pub graph: SceneGraph,
    pub anchors: AnchorReconciler,
}

impl Scene {
    pub fn new(registry: ObjectRegistry) -> Self {
        Self {
            registry,
            graph: SceneGraph::new(),
            anchors: AnchorReconciler::default(),
        }
    }
}
