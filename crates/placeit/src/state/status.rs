//! User-facing status message derived from tracking and session state

use crate::tracking::{FrameState, LimitedReason, MappingStatus, TrackingState};

/// Everything the status message depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusInputs {
    pub frame: FrameState,
    pub relocalizing: bool,
    /// The active room has a saved world map and object list
    pub archived: bool,
    pub has_anchored_objects: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub message: String,
    /// Show the saved snapshot as a relocalization hint
    pub show_snapshot: bool,
}

/// Ordered guarded cases; the first match wins
pub fn derive_status(inputs: &StatusInputs) -> SessionStatus {
    let tracking = inputs.frame.tracking;
    let mapping = inputs.frame.mapping;

    let (message, show_snapshot) = match (tracking, mapping) {
        (TrackingState::Normal, MappingStatus::Mapped | MappingStatus::Extending) => {
            if inputs.has_anchored_objects {
                ("Tap 'Save' to save the current room.", false)
            } else {
                ("Tap on a surface to place an object.", false)
            }
        }
        (TrackingState::Normal, _) if inputs.archived && !inputs.relocalizing => (
            "Move around to map the environment or load the saved room.",
            false,
        ),
        (TrackingState::Normal, _) if !inputs.archived => ("Move around to map the environment.", false),
        (TrackingState::Limited(LimitedReason::Relocalizing), _) if inputs.relocalizing => (
            "Move your device to the location shown in the image.",
            true,
        ),
        _ => (tracking.feedback(), false),
    };

    SessionStatus {
        message: message.to_string(),
        show_snapshot,
    }
}
