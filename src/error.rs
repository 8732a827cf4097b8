use thiserror::Error;

#[derive(Error, Debug)]
pub enum MulticamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("System error: {message}")]
    System { message: String },
}

/// Failures raised by capture backends and devices
#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("Failed to open camera source {source_desc}: {details}")]
    DeviceOpen { source_desc: String, details: String },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Capture stream error: {details}")]
    CaptureStream { details: String },

    #[error("Invalid source locator '{locator}': {details}")]
    InvalidSource { locator: String, details: String },
}

impl MulticamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

impl CameraError {
    pub fn capture<S: Into<String>>(details: S) -> Self {
        Self::CaptureStream {
            details: details.into(),
        }
    }

    pub fn configuration<S: Into<String>>(details: S) -> Self {
        Self::Configuration {
            details: details.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MulticamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_error_converts_into_crate_error() {
        let err: MulticamError = CameraError::capture("no buffer in sample").into();
        assert!(matches!(err, MulticamError::Camera(CameraError::CaptureStream { .. })));
        assert!(err.to_string().contains("no buffer in sample"));
    }

    #[test]
    fn test_system_error_message() {
        let err = MulticamError::system("registry poisoned");
        assert_eq!(err.to_string(), "System error: registry poisoned");
    }
}
