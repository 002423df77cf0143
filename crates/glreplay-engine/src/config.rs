//! Viewer configuration.

use std::path::Path;

use glreplay_common::{GlReplayError, Result};
use serde::{Deserialize, Serialize};

use crate::math::Vec3;

/// How shaders declare the view block matrices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixMajor {
    #[default]
    RowMajor,
    ColumnMajor,
}

/// Host-settable viewer properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub width: u32,
    pub height: u32,
    pub camera_pos: Vec3,
    /// Degrees.
    pub camera_yaw: f64,
    /// Degrees.
    pub camera_pitch: f64,
    pub mouse_speed: f64,
    pub move_speed: f64,
    /// Forward, left, back and right keys, in that order.
    pub move_keys: String,
    pub shader_matrix_major: MatrixMajor,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            width: 700,
            height: 500,
            camera_pos: [0.0, 50.0, 200.0],
            camera_yaw: 0.0,
            camera_pitch: 0.0,
            mouse_speed: 1.0,
            move_speed: 1.0,
            move_keys: "wasd".to_string(),
            shader_matrix_major: MatrixMajor::RowMajor,
        }
    }
}

impl ViewerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ViewerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(GlReplayError::config(format!(
                "viewer size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.move_keys.chars().count() != 4 {
            return Err(GlReplayError::config(format!(
                "move_keys needs exactly 4 keys, got '{}'",
                self.move_keys
            )));
        }
        Ok(())
    }

    /// The move key for direction `slot` (0 forward, 1 left, 2 back, 3 right).
    pub fn move_key(&self, slot: usize) -> Option<char> {
        self.move_keys.chars().nth(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ViewerConfig::default();
        assert_eq!((config.width, config.height), (700, 500));
        assert_eq!(config.camera_pos, [0.0, 50.0, 200.0]);
        assert_eq!(config.move_key(2), Some('s'));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config =
            ViewerConfig::from_json(r#"{"width": 320, "shader_matrix_major": "column_major"}"#)
                .unwrap();
        assert_eq!(config.width, 320);
        assert_eq!(config.height, 500);
        assert_eq!(config.shader_matrix_major, MatrixMajor::ColumnMajor);
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = ViewerConfig::from_json(r#"{"move_keys": "wa"}"#).unwrap_err();
        assert_eq!(err.category(), "config");
        let err = ViewerConfig::from_json(r#"{"height": 0}"#).unwrap_err();
        assert_eq!(err.category(), "config");
        let err = ViewerConfig::from_json(r#"{"shader_matrix_major": "diagonal"}"#).unwrap_err();
        assert_eq!(err.category(), "json");
    }
}
