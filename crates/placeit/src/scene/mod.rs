pub mod graph;
pub mod picking;
pub mod queue;

pub use graph::{model_pose, NodeId, NodeKind, PanelAction, SceneGraph, SceneNode};
pub use picking::{ray_aabb, Aabb, Ray};
pub use queue::{SceneCommand, SceneQueue};
