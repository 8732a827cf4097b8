pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod provider;
pub mod registry;

pub use camera::{
    default_backend, CameraSourceWorker, CaptureBackend, CaptureDevice, StatusSnapshot,
    SyntheticBackend,
};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use camera::GstreamerBackend;
pub use config::{CameraConfig, CaptureSettings, MulticamConfig, SourceLocator};
pub use error::{CameraError, MulticamError, Result};
pub use frame::{FrameData, FrameFormat};
pub use provider::{ConfigProvider, FileConfigProvider, StaticConfigProvider};
pub use registry::CameraRegistry;
