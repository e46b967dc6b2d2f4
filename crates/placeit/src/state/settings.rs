//! Placement settings

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "placeit";
const APPLICATION: &str = "placeit";

/// Gesture thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureSettings {
    /// Pan displacement ignored with one touch, screen units
    pub pan_threshold: f32,
    /// Pan displacement ignored with two or more touches; higher so rotation
    /// wins for two-finger gestures
    pub multi_touch_pan_threshold: f32,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            pan_threshold: 30.0,
            multi_touch_pan_threshold: 60.0,
        }
    }
}

impl GestureSettings {
    /// Threshold for a gesture with `touches` active touches
    pub fn threshold_for(&self, touches: usize) -> f32 {
        if touches > 1 {
            self.multi_touch_pan_threshold
        } else {
            self.pan_threshold
        }
    }
}

/// Action panel layout and animation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelSettings {
    /// Gap between the object's top and the panel, meters
    pub margin: f32,
    pub button_size: f32,
    pub button_padding: f32,
    /// Distance the panel rises while appearing
    pub appear_drop: f32,
    pub appear_seconds: f32,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            margin: 0.15,
            button_size: 0.08,
            button_padding: 0.03,
            appear_drop: 0.05,
            appear_seconds: 0.5,
        }
    }
}

/// All placement settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementSettings {
    pub gestures: GestureSettings,
    pub panel: PanelSettings,
    /// Copies are offset by the source's width minus this gap
    pub copy_gap: f32,
    /// Shrink-out duration for animated removal
    pub removal_seconds: f32,
    /// Override for the room directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rooms_dir: Option<PathBuf>,
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self {
            gestures: GestureSettings::default(),
            panel: PanelSettings::default(),
            copy_gap: 0.2,
            removal_seconds: 0.5,
            rooms_dir: None,
        }
    }
}

impl PlacementSettings {
    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
    }

    /// Path of the settings file, if a config directory exists
    pub fn config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Default room directory: `<data dir>/arexperience/rooms`
    pub fn default_rooms_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().join("arexperience").join("rooms"))
    }

    /// Room directory to use: the override, else the default
    pub fn rooms_dir(&self) -> Option<PathBuf> {
        self.rooms_dir.clone().or_else(Self::default_rooms_dir)
    }

    /// Load settings from the config directory, or return defaults
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load settings from a file, falling back to defaults when it is missing
    /// or unreadable
    pub fn load_from(path: &Path) -> Self {
        let Ok(json) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&json) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("Ignoring invalid settings file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save settings to the config directory
    pub fn save(&self) {
        if let Some(path) = Self::config_path() {
            self.save_to(&path);
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(dir) = path.parent() {
            if std::fs::create_dir_all(dir).is_err() {
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::warn!("Failed to save settings to {}: {}", path.display(), e);
                }
            }
            Err(e) => tracing::warn!("Failed to serialize settings: {}", e),
        }
    }
}
