use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::FrameData;
use std::sync::Arc;

/// An opened video device or stream.
///
/// Owned by exactly one capture thread; the setters are best-effort and a
/// failing setter never aborts capture.
pub trait CaptureDevice: Send {
    /// Request an internal buffer depth (in frames)
    fn set_buffer_size(&mut self, frames: u32) -> Result<(), CameraError>;

    /// Request the device's native frame rate
    fn set_fps(&mut self, fps: u32) -> Result<(), CameraError>;

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CameraError> {
        Err(CameraError::configuration(format!(
            "resolution control ({}x{}) not supported by this device",
            width, height
        )))
    }

    /// Read one frame, blocking up to the device's own timeout
    fn read_frame(&mut self) -> Result<FrameData, CameraError>;

    fn release(&mut self) {}
}

/// Opens capture devices from camera configuration records
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, config: &CameraConfig) -> Result<Box<dyn CaptureDevice>, CameraError>;
}

/// The hardware backend this build supports.
///
/// Builds without the `camera` feature (or off Linux) have no hardware
/// backend; callers pick `SyntheticBackend` explicitly instead.
pub fn default_backend() -> Result<Arc<dyn CaptureBackend>, CameraError> {
    #[cfg(all(feature = "camera", target_os = "linux"))]
    {
        let backend: Arc<dyn CaptureBackend> = Arc::new(super::GstreamerBackend::new()?);
        Ok(backend)
    }

    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    {
        Err(CameraError::configuration(
            "built without the camera feature; no hardware capture backend available",
        ))
    }
}

#[cfg(test)]
mod tests {
    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    #[test]
    fn test_default_backend_requires_camera_feature() {
        assert!(super::default_backend().is_err());
    }
}
