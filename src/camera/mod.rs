pub mod v4l2;

use crate::common::Result;
use image::DynamicImage;

pub use v4l2::{V4lCamera, V4lProvider};

/// A source of frames from one room's camera.
pub trait FrameSource: Send {
    fn capture_frame(&mut self) -> Result<DynamicImage>;
}

/// Opens cameras by device index. The monitor acquires a camera before
/// a lecture and drops the handle afterwards so the device is released
/// between sessions.
pub trait CameraProvider: Send {
    fn acquire(&self, index: u32) -> Result<Box<dyn FrameSource>>;
}
