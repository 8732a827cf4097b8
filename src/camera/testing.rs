//! Scripted capture backend for worker and registry tests

use super::device::{CaptureBackend, CaptureDevice};
use crate::config::{CameraConfig, CaptureSettings};
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Payload length of scripted frames
pub(crate) const FRAME_LEN: usize = 256;

#[derive(Default)]
pub(crate) struct ScriptedBackend {
    fail_open: Mutex<HashSet<u32>>,
    /// Every Nth read fails (0 disables)
    fail_every: AtomicU64,
    /// While set, reads block and ignore shutdown, like a hung network stream
    hang_reads: Arc<AtomicBool>,
    /// Time `open` takes before succeeding or failing, in milliseconds
    open_delay_ms: AtomicU64,
    pub(crate) opens: AtomicU64,
    pub(crate) releases: Arc<AtomicU64>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_open_for(&self, camera_id: u32) {
        self.fail_open.lock().insert(camera_id);
    }

    pub(crate) fn fail_every(&self, n: u64) {
        self.fail_every.store(n, Ordering::Relaxed);
    }

    pub(crate) fn set_open_delay(&self, delay: Duration) {
        self.open_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn set_hang_reads(&self, hang: bool) {
        self.hang_reads.store(hang, Ordering::Release);
    }
}

impl CaptureBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn open(&self, config: &CameraConfig) -> Result<Box<dyn CaptureDevice>, CameraError> {
        let delay = self.open_delay_ms.load(Ordering::Relaxed);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }

        if self.fail_open.lock().contains(&config.id) {
            return Err(CameraError::DeviceOpen {
                source_desc: config.source.to_string(),
                details: "scripted open failure".to_string(),
            });
        }
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ScriptedDevice {
            reads: 0,
            fail_every: self.fail_every.load(Ordering::Relaxed),
            hang_reads: Arc::clone(&self.hang_reads),
            releases: Arc::clone(&self.releases),
        }))
    }
}

struct ScriptedDevice {
    reads: u64,
    fail_every: u64,
    hang_reads: Arc<AtomicBool>,
    releases: Arc<AtomicU64>,
}

impl CaptureDevice for ScriptedDevice {
    fn set_buffer_size(&mut self, _frames: u32) -> Result<(), CameraError> {
        Ok(())
    }

    fn set_fps(&mut self, _fps: u32) -> Result<(), CameraError> {
        Err(CameraError::configuration("scripted device has a fixed rate"))
    }

    fn read_frame(&mut self) -> Result<FrameData, CameraError> {
        while self.hang_reads.load(Ordering::Acquire) {
            std::thread::sleep(Duration::from_millis(5));
        }

        self.reads += 1;
        if self.fail_every > 0 && self.reads % self.fail_every == 0 {
            return Err(CameraError::capture("scripted read failure"));
        }

        // Every byte carries the read number so torn frames are detectable
        let fill = (self.reads % 251) as u8;
        Ok(FrameData::new(
            self.reads,
            SystemTime::now(),
            vec![fill; FRAME_LEN],
            16,
            16,
            FrameFormat::Mjpeg,
        ))
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::Relaxed);
    }
}

/// Short timings so tests run quickly
pub(crate) fn fast_settings() -> CaptureSettings {
    CaptureSettings {
        start_grace_ms: 500,
        stop_timeout_ms: 500,
        shutdown_join_timeout_ms: 500,
        start_stagger_ms: 10,
        read_retry_ms: 5,
        idle_poll_ms: 1,
        buffer_size: 1,
    }
}

pub(crate) fn camera(id: u32, fps: u32) -> CameraConfig {
    CameraConfig::new(id, format!("Camera {}", id), &id.to_string(), fps)
        .expect("valid test camera")
}
