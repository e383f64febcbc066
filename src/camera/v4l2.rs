use crate::camera::{CameraProvider, FrameSource};
use crate::common::{AttendanceError, CameraConfig, Result};
use image::{DynamicImage, ImageBuffer, Luma};
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

/// V4L2 capture device for one room.
pub struct V4lCamera {
    device: Device,
    config: CameraConfig,
}

impl V4lCamera {
    pub fn open(index: u32, config: CameraConfig) -> Result<Self> {
        info!(index, "opening camera device");

        let device = Device::new(index as usize)
            .map_err(|e| AttendanceError::Camera(format!("failed to open camera {}: {}", index, e)))?;

        let caps = device
            .query_caps()
            .map_err(|e| AttendanceError::Camera(format!("failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            warn!(index, capabilities = ?caps.capabilities, "device may not support video capture");
        }

        let mut fmt = device
            .format()
            .map_err(|e| AttendanceError::Camera(format!("failed to get format: {}", e)))?;

        fmt.width = config.width;
        fmt.height = config.height;
        // Keep grayscale for IR cameras, otherwise request MJPG.
        if fmt.fourcc.repr != *b"GREY" {
            fmt.fourcc = FourCC::new(b"MJPG");
        }

        if let Err(e) = device.set_format(&fmt) {
            warn!(index, "could not set requested format, using device defaults: {}", e);
        }

        let actual = device
            .format()
            .map_err(|e| AttendanceError::Camera(format!("failed to get final format: {}", e)))?;
        if actual.width != config.width || actual.height != config.height {
            warn!(
                index,
                actual_width = actual.width,
                actual_height = actual.height,
                requested_width = config.width,
                requested_height = config.height,
                "camera resolution differs from requested"
            );
        }
        debug!(index, width = actual.width, height = actual.height, "camera format negotiated");

        Ok(Self { device, config })
    }

    fn decode(&self, fourcc: [u8; 4], data: &[u8], width: u32, height: u32) -> Result<DynamicImage> {
        match &fourcc {
            b"GREY" => {
                let buffer = ImageBuffer::<Luma<u8>, _>::from_raw(width, height, data.to_vec())
                    .ok_or_else(|| {
                        AttendanceError::Camera("grayscale frame shorter than its format".into())
                    })?;
                Ok(DynamicImage::ImageLuma8(buffer))
            }
            b"MJPG" => image::load_from_memory(data)
                .map_err(|e| AttendanceError::Camera(format!("failed to decode MJPG frame: {}", e))),
            other => Err(AttendanceError::Camera(format!(
                "unsupported pixel format {}",
                String::from_utf8_lossy(other)
            ))),
        }
    }
}

impl FrameSource for V4lCamera {
    fn capture_frame(&mut self) -> Result<DynamicImage> {
        let fmt = self
            .device
            .format()
            .map_err(|e| AttendanceError::Camera(format!("failed to get format: {}", e)))?;

        let mut stream = v4l::io::mmap::Stream::with_buffers(&mut self.device, Type::VideoCapture, 4)
            .map_err(|e| AttendanceError::Camera(format!("failed to create stream: {}", e)))?;

        // Warmup frames so auto-exposure settles.
        for _ in 0..self.config.warmup_frames {
            stream
                .next()
                .map_err(|e| AttendanceError::Camera(format!("failed to capture warmup frame: {}", e)))?;
            std::thread::sleep(std::time::Duration::from_millis(self.config.warmup_delay_ms));
        }

        let (buf, _meta) = stream
            .next()
            .map_err(|e| AttendanceError::Camera(format!("failed to capture: {}", e)))?;

        self.decode(fmt.fourcc.repr, buf, fmt.width, fmt.height)
    }
}

/// Opens `V4lCamera`s on demand.
pub struct V4lProvider {
    config: CameraConfig,
}

impl V4lProvider {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }
}

impl CameraProvider for V4lProvider {
    fn acquire(&self, index: u32) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(V4lCamera::open(index, self.config.clone())?))
    }
}
