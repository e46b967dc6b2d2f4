//! Gesture inputs and the threshold pan recognizer

use glam::Vec2;

use crate::state::settings::GestureSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Began,
    Changed,
    Ended,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    Tap,
    Pan,
    Rotation,
}

/// Pan and rotation may be recognized together, so two-finger
/// rotate-and-drag works as one gesture
pub fn recognizes_simultaneously(_a: GestureKind, _b: GestureKind) -> bool {
    true
}

/// One pan callback: the displacement since the previous callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanGesture {
    pub phase: GesturePhase,
    pub touch_count: usize,
    pub delta: Vec2,
}

impl PanGesture {
    pub fn began(touch_count: usize) -> Self {
        Self {
            phase: GesturePhase::Began,
            touch_count,
            delta: Vec2::ZERO,
        }
    }

    pub fn moved(touch_count: usize, delta: Vec2) -> Self {
        Self {
            phase: GesturePhase::Changed,
            touch_count,
            delta,
        }
    }

    pub fn ended() -> Self {
        Self {
            phase: GesturePhase::Ended,
            touch_count: 0,
            delta: Vec2::ZERO,
        }
    }
}

/// Rotation callback. `rotation` is the angle accumulated since it was last
/// consumed; the controller zeroes it after applying.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationGesture {
    pub phase: GesturePhase,
    pub rotation: f32,
}

impl RotationGesture {
    pub fn changed(rotation: f32) -> Self {
        Self {
            phase: GesturePhase::Changed,
            rotation,
        }
    }
}

/// Pan recognizer that ignores displacement below a touch-count dependent
/// threshold.
///
/// Until the threshold is crossed every delta accumulates. At the crossing the
/// accumulator keeps only the excess beyond the threshold, so the first real
/// movement continues from where the finger is without a jump.
#[derive(Debug, Clone, Default)]
pub struct ThresholdPan {
    translation: Vec2,
    exceeded: bool,
}

impl ThresholdPan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_threshold_exceeded(&self) -> bool {
        self.exceeded
    }

    /// Translation accumulated since it was last taken
    pub fn translation(&self) -> Vec2 {
        self.translation
    }

    /// Feed one callback. Returns true once the threshold has been exceeded.
    pub fn update(&mut self, gesture: &PanGesture, settings: &GestureSettings) -> bool {
        match gesture.phase {
            GesturePhase::Began => {
                self.reset();
            }
            GesturePhase::Changed => {
                self.translation += gesture.delta;
                if !self.exceeded {
                    let threshold = settings.threshold_for(gesture.touch_count);
                    let magnitude = self.translation.length();
                    if magnitude > threshold {
                        self.exceeded = true;
                        self.translation -= self.translation / magnitude * threshold;
                    }
                }
            }
            GesturePhase::Ended | GesturePhase::Cancelled => {}
        }
        self.exceeded
    }

    /// Consume the accumulated translation
    pub fn take_translation(&mut self) -> Vec2 {
        std::mem::take(&mut self.translation)
    }

    pub fn reset(&mut self) {
        self.translation = Vec2::ZERO;
        self.exceeded = false;
    }
}
