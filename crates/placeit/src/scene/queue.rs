//! Serial scene command queue.
//!
//! Everything that mutates the scene from outside the owner (tracking
//! callbacks, geometry load completions, world-map replies, post-drag anchor
//! reassignment) is posted here and applied by the session manager in FIFO
//! order.

use shared::{AnchorId, AnchorRecord, ObjectId, WorldMap};
use tokio::sync::mpsc;

use crate::error::AssetLoadError;
use crate::state::registry::PlacedObject;
use crate::state::session::PlacementRequest;

/// A queued scene mutation
#[derive(Debug)]
pub enum SceneCommand {
    AnchorAdded(AnchorRecord),
    AnchorUpdated(AnchorRecord),
    AnchorRemoved(AnchorId),
    /// A geometry load finished, successfully or not
    PlacementLoaded {
        request: PlacementRequest,
        result: Result<PlacedObject, AssetLoadError>,
    },
    /// Re-anchor an object after a drag ended
    AssignAnchor(ObjectId),
    /// Reply to a world-map request; None when the map is unavailable
    WorldMapReady(Option<WorldMap>),
}

/// Sending half of the scene queue, cheap to clone
#[derive(Debug, Clone)]
pub struct SceneQueue {
    tx: mpsc::UnboundedSender<SceneCommand>,
}

impl SceneQueue {
    /// Create a queue and its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SceneCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn push(&self, command: SceneCommand) {
        if let Err(e) = self.tx.send(command) {
            tracing::warn!("Scene queue closed, dropping {:?}", e.0);
        }
    }

    pub fn anchor_added(&self, anchor: AnchorRecord) {
        self.push(SceneCommand::AnchorAdded(anchor));
    }

    pub fn anchor_updated(&self, anchor: AnchorRecord) {
        self.push(SceneCommand::AnchorUpdated(anchor));
    }

    pub fn anchor_removed(&self, id: AnchorId) {
        self.push(SceneCommand::AnchorRemoved(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    #[test]
    fn test_commands_arrive_in_order() {
        let (queue, mut rx) = SceneQueue::channel();
        let anchor = AnchorRecord::object(Mat4::IDENTITY);
        let id = anchor.id;
        queue.anchor_added(anchor.clone());
        queue.anchor_updated(anchor);
        queue.anchor_removed(id);

        assert!(matches!(rx.try_recv(), Ok(SceneCommand::AnchorAdded(a)) if a.id == id));
        assert!(matches!(rx.try_recv(), Ok(SceneCommand::AnchorUpdated(a)) if a.id == id));
        assert!(matches!(rx.try_recv(), Ok(SceneCommand::AnchorRemoved(a)) if a == id));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_push_after_close_is_dropped() {
        let (queue, rx) = SceneQueue::channel();
        drop(rx);
        queue.push(SceneCommand::WorldMapReady(None));
    }
}
