// Core modules
pub mod admin;
pub mod attendance;
pub mod camera;
pub mod common;
pub mod core;
pub mod monitor;
pub mod schedule;
pub mod storage;

// Re-export commonly used types
pub use admin::AdminApi;
pub use attendance::{AttendanceLedger, LectureLifecycle};
pub use camera::{CameraProvider, FrameSource, V4lProvider};
pub use common::{AttendanceError, Config, Result};
pub use crate::core::{LivenessVoter, RecognitionGate, Recognizer, SessionState};
pub use monitor::{Clock, RoomMonitor, SystemClock};
pub use schedule::{ConflictResolver, TimetableIndex};
pub use storage::{FileStore, MemoryStore, Store};
