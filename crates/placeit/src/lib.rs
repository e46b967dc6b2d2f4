// Library crate: the placement core, usable headless from tests and tools.
// Platform shells provide a `TrackingSession` and render the scene graph.

pub mod assets;
pub mod error;
pub mod fixtures;
pub mod harness;
pub mod scene;
pub mod state;
pub mod store;
pub mod tracking;
