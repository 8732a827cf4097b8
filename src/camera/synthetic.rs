use super::device::{CaptureBackend, CaptureDevice};
use crate::config::{CameraConfig, SourceLocator};
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use std::collections::HashSet;
use std::time::SystemTime;
use tracing::{debug, trace};

/// Backend producing generated MJPEG frames.
///
/// Opens every device index and every `stub://` URL; other URLs need a real
/// backend. Individual locators can be marked unavailable to exercise the
/// open-failure path.
#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    resolution: (u32, u32),
    unavailable: HashSet<String>,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self {
            resolution: (640, 480),
            unavailable: HashSet::new(),
        }
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = (width, height);
        self
    }

    /// Make `open` fail for this locator (as written in the camera config)
    pub fn with_unavailable(mut self, locator: impl Into<String>) -> Self {
        self.unavailable.insert(locator.into());
        self
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn open(&self, config: &CameraConfig) -> Result<Box<dyn CaptureDevice>, CameraError> {
        let locator = config.source.as_locator_string();
        if self.unavailable.contains(&locator) {
            return Err(CameraError::DeviceOpen {
                source_desc: config.source.to_string(),
                details: "source marked unavailable".to_string(),
            });
        }

        if let SourceLocator::Url(url) = &config.source {
            if url.scheme() != "stub" {
                return Err(CameraError::DeviceOpen {
                    source_desc: config.source.to_string(),
                    details: format!(
                        "scheme '{}' requires the camera feature",
                        url.scheme()
                    ),
                });
            }
        }

        let (width, height) = config.resolution.unwrap_or(self.resolution);
        debug!(
            "Opened synthetic source {} for camera {} ({}x{})",
            config.source, config.id, width, height
        );

        Ok(Box::new(SyntheticDevice {
            width,
            height,
            frame_count: 0,
            released: false,
        }))
    }
}

struct SyntheticDevice {
    width: u32,
    height: u32,
    frame_count: u64,
    released: bool,
}

impl CaptureDevice for SyntheticDevice {
    fn set_buffer_size(&mut self, _frames: u32) -> Result<(), CameraError> {
        Ok(())
    }

    fn set_fps(&mut self, _fps: u32) -> Result<(), CameraError> {
        Ok(())
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CameraError> {
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<FrameData, CameraError> {
        if self.released {
            return Err(CameraError::capture("device released"));
        }

        self.frame_count += 1;
        let frame_id = self.frame_count;

        // JPEG SOI + JFIF header, patterned body, EOI
        let mut data = vec![
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46, 0x00, 0x01, 0x01, 0x01,
            0x00, 0x48, 0x00, 0x48, 0x00, 0x00,
        ];
        let pattern_size = 1000 + (frame_id % 500) as usize;
        let pattern_byte = (frame_id % 256) as u8;
        data.extend(vec![pattern_byte; pattern_size]);
        data.extend_from_slice(&[0xFF, 0xD9]);

        trace!("Generated synthetic frame {} ({} bytes)", frame_id, data.len());

        Ok(FrameData::new(
            frame_id,
            SystemTime::now(),
            data,
            self.width,
            self.height,
            FrameFormat::Mjpeg,
        ))
    }

    fn release(&mut self) {
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_opens_devices_and_stub_urls() {
        let backend = SyntheticBackend::new();
        let device = CameraConfig::new(1, "Lobby", "0", 30).unwrap();
        let stub = CameraConfig::new(2, "Yard", "stub://yard", 30).unwrap();
        let rtsp = CameraConfig::new(3, "Gate", "rtsp://10.0.0.9/live", 30).unwrap();

        assert!(backend.open(&device).is_ok());
        assert!(backend.open(&stub).is_ok());
        assert!(matches!(
            backend.open(&rtsp),
            Err(CameraError::DeviceOpen { .. })
        ));
    }

    #[test]
    fn test_unavailable_locator_fails_open() {
        let backend = SyntheticBackend::new().with_unavailable("3");
        let config = CameraConfig::new(1, "Attic", "3", 30).unwrap();
        assert!(backend.open(&config).is_err());
    }

    #[test]
    fn test_synthetic_frames_are_well_formed() {
        let backend = SyntheticBackend::new().with_resolution(320, 240);
        let config = CameraConfig::new(1, "Lobby", "0", 30).unwrap();
        let mut device = backend.open(&config).unwrap();

        let first = device.read_frame().unwrap();
        let second = device.read_frame().unwrap();
        assert_eq!(first.id + 1, second.id);
        assert_eq!((first.width, first.height), (320, 240));
        assert_eq!(&first.data[..2], &[0xFF, 0xD8]);
        assert_eq!(&first.data[first.data.len() - 2..], &[0xFF, 0xD9]);

        device.release();
        assert!(device.read_frame().is_err());
    }
}
