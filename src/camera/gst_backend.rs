use super::device::{CaptureBackend, CaptureDevice};
use crate::config::{CameraConfig, SourceLocator};
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use gstreamer::prelude::*;
use gstreamer::{ClockTime, Pipeline};
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::time::SystemTime;
use tracing::{debug, info, trace, warn};

/// How long opening may take before the source counts as unopenable
const OPEN_TIMEOUT_SECS: u64 = 5;
/// Upper bound for a single blocking read
const READ_TIMEOUT_MS: u64 = 1000;

/// GStreamer-backed capture: `v4l2src` for device indices, `uridecodebin` for URLs
pub struct GstreamerBackend;

impl GstreamerBackend {
    pub fn new() -> Result<Self, CameraError> {
        gstreamer::init().map_err(|e| {
            CameraError::configuration(format!("Failed to initialize GStreamer: {}", e))
        })?;
        Ok(Self)
    }

    fn build_pipeline_string(config: &CameraConfig) -> String {
        let head = match &config.source {
            SourceLocator::Device(index) => {
                format!("v4l2src device=/dev/video{} ! decodebin", index)
            }
            SourceLocator::Url(url) => format!("uridecodebin uri=\"{}\"", url),
        };

        format!(
            "{} ! videoconvert ! videoscale ! videorate name=rate drop-only=true ! \
             capsfilter name=shape caps=video/x-raw,format=RGB ! \
             appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
            head
        )
    }
}

impl CaptureBackend for GstreamerBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn open(&self, config: &CameraConfig) -> Result<Box<dyn CaptureDevice>, CameraError> {
        let open_error = |details: String| CameraError::DeviceOpen {
            source_desc: config.source.to_string(),
            details,
        };

        let description = Self::build_pipeline_string(config);
        debug!("Creating GStreamer pipeline for camera {}", config.id);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| open_error(format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| open_error("Failed to downcast to Pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| open_error("Pipeline has no appsink".to_string()))?;

        let shape = pipeline
            .by_name("shape")
            .ok_or_else(|| open_error("Pipeline has no capsfilter".to_string()))?;

        let rate = pipeline
            .by_name("rate")
            .ok_or_else(|| open_error("Pipeline has no videorate".to_string()))?;

        // PAUSED opens the device / connects the stream without pulling frames yet
        pipeline
            .set_state(gstreamer::State::Paused)
            .map_err(|e| open_error(format!("Failed to open source: {}", e)))?;
        let (result, _, _) = pipeline.state(ClockTime::from_seconds(OPEN_TIMEOUT_SECS));
        if let Err(e) = result {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(open_error(format!("Source did not become ready: {}", e)));
        }

        info!("GStreamer source opened for camera {}", config.id);

        Ok(Box::new(GstreamerDevice {
            pipeline,
            appsink,
            shape,
            rate,
            width: None,
            height: None,
            playing: false,
            frame_count: 0,
        }))
    }
}

struct GstreamerDevice {
    pipeline: Pipeline,
    appsink: AppSink,
    shape: gstreamer::Element,
    rate: gstreamer::Element,
    width: Option<u32>,
    height: Option<u32>,
    playing: bool,
    frame_count: u64,
}

impl GstreamerDevice {
    fn apply_caps(&self) {
        let mut builder = gstreamer::Caps::builder("video/x-raw").field("format", "RGB");
        if let (Some(width), Some(height)) = (self.width, self.height) {
            builder = builder
                .field("width", width as i32)
                .field("height", height as i32);
        }
        self.shape.set_property("caps", builder.build());
    }

    fn ensure_playing(&mut self) -> Result<(), CameraError> {
        if self.playing {
            return Ok(());
        }
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| CameraError::capture(format!("Failed to start pipeline: {}", e)))?;
        self.playing = true;
        Ok(())
    }
}

impl CaptureDevice for GstreamerDevice {
    fn set_buffer_size(&mut self, frames: u32) -> Result<(), CameraError> {
        self.appsink.set_max_buffers(frames);
        self.appsink.set_drop(true);
        Ok(())
    }

    /// Caps the output rate only; sources slower than `fps` pass through unchanged
    fn set_fps(&mut self, fps: u32) -> Result<(), CameraError> {
        let max_rate = i32::try_from(fps)
            .map_err(|_| CameraError::configuration(format!("fps {} out of range", fps)))?;
        self.rate.set_property("max-rate", max_rate);
        Ok(())
    }

    fn set_resolution(&mut self, width: u32, height: u32) -> Result<(), CameraError> {
        self.width = Some(width);
        self.height = Some(height);
        self.apply_caps();
        Ok(())
    }

    fn read_frame(&mut self) -> Result<FrameData, CameraError> {
        self.ensure_playing()?;

        let sample = self
            .appsink
            .try_pull_sample(ClockTime::from_mseconds(READ_TIMEOUT_MS))
            .ok_or_else(|| {
                if self.appsink.is_eos() {
                    CameraError::capture("end of stream")
                } else {
                    CameraError::capture("timed out waiting for sample")
                }
            })?;

        let buffer = sample
            .buffer()
            .ok_or_else(|| CameraError::capture("No buffer in sample"))?;
        let caps = sample
            .caps()
            .ok_or_else(|| CameraError::capture("No caps in sample"))?;
        let video_info = VideoInfo::from_caps(caps)
            .map_err(|e| CameraError::capture(format!("Failed to get video info: {}", e)))?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride()[0] as usize;
        let row_bytes = width as usize * 3;

        let map = buffer
            .map_readable()
            .map_err(|e| CameraError::capture(format!("Failed to map buffer: {}", e)))?;
        let bytes = map.as_slice();

        // Drop row padding so the payload is tightly packed RGB
        let mut data = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let line = bytes
                .get(start..start + row_bytes)
                .ok_or_else(|| CameraError::capture("Buffer shorter than frame geometry"))?;
            data.extend_from_slice(line);
        }

        self.frame_count += 1;
        trace!("Pulled RGB frame {} ({}x{})", self.frame_count, width, height);

        Ok(FrameData::new(
            self.frame_count,
            SystemTime::now(),
            data,
            width,
            height,
            FrameFormat::Rgb24,
        ))
    }

    fn release(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to release GStreamer pipeline: {}", e);
        }
        self.playing = false;
    }
}

impl Drop for GstreamerDevice {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gstreamer::State::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_string_for_device_and_url() {
        let device = CameraConfig::new(1, "Lobby", "2", 30).unwrap();
        let pipeline = GstreamerBackend::build_pipeline_string(&device);
        assert!(pipeline.starts_with("v4l2src device=/dev/video2"));
        assert!(pipeline.contains("appsink name=sink"));
        assert!(pipeline.contains("max-buffers=1 drop=true"));
        assert!(pipeline.contains("videorate name=rate drop-only=true"));
        assert!(!pipeline.contains("framerate"));

        let url = CameraConfig::new(2, "Gate", "rtsp://10.0.0.5/live", 15).unwrap();
        let pipeline = GstreamerBackend::build_pipeline_string(&url);
        assert!(pipeline.starts_with("uridecodebin uri=\"rtsp://10.0.0.5/live\""));
    }
}
