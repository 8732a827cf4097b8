mod device;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst_backend;
mod status;
mod synthetic;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use device::{default_backend, CaptureBackend, CaptureDevice};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst_backend::GstreamerBackend;
pub use status::StatusSnapshot;
pub use synthetic::SyntheticBackend;
pub use worker::CameraSourceWorker;
