use crate::common::error::{AttendanceError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_warmup_delay")]
    pub warmup_delay_ms: u64,
    #[serde(default = "default_frame_width")]
    pub width: u32,
    #[serde(default = "default_frame_height")]
    pub height: u32,
}

fn default_warmup_frames() -> u32 { 5 }
fn default_warmup_delay() -> u64 { 50 }
fn default_frame_width() -> u32 { 640 }
fn default_frame_height() -> u32 { 480 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            warmup_frames: default_warmup_frames(),
            warmup_delay_ms: default_warmup_delay(),
            width: default_frame_width(),
            height: default_frame_height(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Seconds between timetable checks while the loop is idle.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Start the camera this many minutes before a scheduled lecture.
    #[serde(default = "default_early_start")]
    pub early_start_minutes: i64,
}

fn default_tick_interval() -> u64 { 1 }
fn default_early_start() -> i64 { 15 }

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            early_start_minutes: default_early_start(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecognitionConfig {
    /// Minimum recognizer confidence before a candidate identity is considered.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    /// Re-run liveness for an already-accepted identity after this many
    /// seconds. None disables periodic re-checks.
    #[serde(default)]
    pub liveness_recheck_secs: Option<u64>,
}

fn default_match_threshold() -> f32 { 0.6 }

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            match_threshold: default_match_threshold(),
            liveness_recheck_secs: None,
        }
    }
}

/// Thresholds for the anti-spoofing check ensemble.
///
/// `min_checks_to_fail` is the voting threshold: a face is flagged as a
/// spoof once at least that many checks fail. The default is 2. Setting
/// it to 1 makes any single failed check sufficient, at the cost of more
/// false rejections under poor lighting.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LivenessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fraction of near-saturated pixels above which the specular check fails.
    #[serde(default = "default_specular_threshold")]
    pub specular_threshold: f32,
    /// Brightness level (0-255) counted as a specular highlight.
    #[serde(default = "default_specular_intensity")]
    pub specular_intensity: u8,
    /// Ceiling on mean absolute Laplacian response for the sharpness check.
    #[serde(default = "default_edge_sharpness_max")]
    pub edge_sharpness_max: f32,
    /// Ceiling on blue-channel mean over the red/green average.
    #[serde(default = "default_blue_shift_max")]
    pub color_blue_shift_max: f32,
    /// Fraction of clipped pixels above which the color check fails.
    #[serde(default = "default_clipping_max")]
    pub color_clipping_max: f32,
    /// Floor on brightness variance across the 3x3 face grid.
    #[serde(default = "default_reflection_variance_min")]
    pub reflection_variance_min: f32,
    /// Floor on Laplacian variance of the downscaled face.
    #[serde(default = "default_texture_variance_min")]
    pub texture_variance_min: f32,
    /// Failed checks required before a face is flagged as a spoof.
    #[serde(default = "default_min_checks_to_fail")]
    pub min_checks_to_fail: u32,
    /// Faces smaller than this (either dimension, pixels) are not analyzed.
    #[serde(default = "default_min_face_size")]
    pub min_face_size: u32,
}

fn default_true() -> bool { true }
fn default_specular_threshold() -> f32 { 0.005 }
fn default_specular_intensity() -> u8 { 215 }
fn default_edge_sharpness_max() -> f32 { 45.0 }
fn default_blue_shift_max() -> f32 { 1.05 }
fn default_clipping_max() -> f32 { 0.08 }
fn default_reflection_variance_min() -> f32 { 50.0 }
fn default_texture_variance_min() -> f32 { 80.0 }
fn default_min_checks_to_fail() -> u32 { 2 }
fn default_min_face_size() -> u32 { 50 }

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            specular_threshold: default_specular_threshold(),
            specular_intensity: default_specular_intensity(),
            edge_sharpness_max: default_edge_sharpness_max(),
            color_blue_shift_max: default_blue_shift_max(),
            color_clipping_max: default_clipping_max(),
            reflection_variance_min: default_reflection_variance_min(),
            texture_variance_min: default_texture_variance_min(),
            min_checks_to_fail: default_min_checks_to_fail(),
            min_face_size: default_min_face_size(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Path::new("configs/rollcall.toml");
        if config_path.exists() {
            Self::load_from_path(config_path)
        } else {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AttendanceError::Other(anyhow::anyhow!(
                "Config file not found: {}", path.display()
            )));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| AttendanceError::Other(anyhow::anyhow!("Config parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.recognition.match_threshold < 0.0 || self.recognition.match_threshold > 1.0 {
            return Err(AttendanceError::Other(anyhow::anyhow!(
                "Match threshold must be between 0.0 and 1.0, got {}",
                self.recognition.match_threshold
            )));
        }
        if self.monitor.tick_interval_secs == 0 {
            return Err(AttendanceError::Other(anyhow::anyhow!(
                "Tick interval must be at least 1 second"
            )));
        }
        if self.monitor.early_start_minutes < 0 {
            return Err(AttendanceError::Other(anyhow::anyhow!(
                "Early start minutes cannot be negative, got {}",
                self.monitor.early_start_minutes
            )));
        }
        if self.liveness.min_checks_to_fail == 0 || self.liveness.min_checks_to_fail > 5 {
            return Err(AttendanceError::Other(anyhow::anyhow!(
                "min_checks_to_fail must be between 1 and 5, got {}",
                self.liveness.min_checks_to_fail
            )));
        }
        if self.liveness.specular_threshold < 0.0 || self.liveness.specular_threshold > 1.0 {
            return Err(AttendanceError::Other(anyhow::anyhow!(
                "Specular threshold must be between 0.0 and 1.0, got {}",
                self.liveness.specular_threshold
            )));
        }
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(AttendanceError::Other(anyhow::anyhow!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(AttendanceError::Other(anyhow::anyhow!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.liveness.min_checks_to_fail, 2);
        assert_eq!(config.monitor.early_start_minutes, 15);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            "[monitor]\nearly_start_minutes = 10\n\n[liveness]\nmin_checks_to_fail = 1\n",
        )
        .unwrap();
        assert_eq!(config.monitor.early_start_minutes, 10);
        assert_eq!(config.monitor.tick_interval_secs, 1);
        assert_eq!(config.liveness.min_checks_to_fail, 1);
        assert!(config.liveness.enabled);
    }

    #[test]
    fn rejects_zero_vote_threshold() {
        let mut config = Config::default();
        config.liveness.min_checks_to_fail = 0;
        assert!(config.validate().is_err());
    }
}
