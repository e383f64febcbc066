pub mod config;
pub mod error;

pub use config::{CameraConfig, Config, LivenessConfig, MonitorConfig, RecognitionConfig};
pub use error::{AttendanceError, Result};
