use crate::common::Result;
use image::DynamicImage;

/// Face bounding box in frame coordinates, exclusive on the far edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl FaceBox {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    /// Crop the face region out of a full frame, clamped to the frame
    /// bounds.
    pub fn crop(&self, frame: &DynamicImage) -> DynamicImage {
        let x = self.x1.min(frame.width());
        let y = self.y1.min(frame.height());
        let w = self.width().min(frame.width().saturating_sub(x));
        let h = self.height().min(frame.height().saturating_sub(y));
        frame.crop_imm(x, y, w, h)
    }
}

/// One recognized face within a frame.
#[derive(Debug, Clone)]
pub struct Identification {
    /// Enrollment label the face matched against.
    pub label: String,
    /// Match confidence in [0, 1].
    pub confidence: f32,
    pub face: FaceBox,
}

/// Face detection plus identification against the enrolled set.
///
/// Implementations are expected to return every face found in the
/// frame; filtering by confidence is the caller's job.
pub trait Recognizer: Send {
    fn identify(&mut self, frame: &DynamicImage) -> Result<Vec<Identification>>;
}

/// Recognizer that never sees anyone. Lets the monitor run the full
/// lecture lifecycle on a machine without a recognition backend;
/// attendance then comes from carry-forward and manual overrides only.
pub struct NullRecognizer;

impl Recognizer for NullRecognizer {
    fn identify(&mut self, _frame: &DynamicImage) -> Result<Vec<Identification>> {
        Ok(Vec::new())
    }
}
