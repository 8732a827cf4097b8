use super::device::{CaptureBackend, CaptureDevice};
use super::status::{round_fps, StatusSnapshot};
use crate::config::{CameraConfig, CaptureSettings};
use crate::frame::FrameData;
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Read failures between two warn-level log records
const READ_FAILURE_LOG_INTERVAL: u64 = 50;

/// Mutable capture state shared between a worker and its capture thread.
///
/// `epoch` names the run allowed to write. A capture thread commits frames,
/// counters and the running flag only while its own epoch is current, so a
/// thread that outlives `stop()` can no longer touch the state.
#[derive(Debug, Default)]
struct CaptureState {
    running: bool,
    epoch: u64,
    latest_frame: Option<FrameData>,
    last_frame_at: Option<Instant>,
    last_frame_wall: Option<DateTime<Utc>>,
    frames_captured: u64,
    run_frames: u64,
    read_failures: u64,
    started_at: Option<Instant>,
    started_wall: Option<DateTime<Utc>>,
    stopped_at: Option<Instant>,
}

/// Handle to one start→stop cycle of the capture thread
struct RunHandle {
    epoch: u64,
    shutdown: Arc<AtomicBool>,
    /// Disconnects when the capture thread has fully exited
    done: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl RunHandle {
    fn signal(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn has_exited(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Wait up to `timeout` for the thread to exit, joining it if it did
    fn wait(&mut self, camera_id: u32, timeout: Duration) -> bool {
        match self.done.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                self.join(camera_id);
                true
            }
        }
    }

    fn join(&mut self, camera_id: u32) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(camera_id, epoch = self.epoch, "Capture thread panicked");
            }
        }
    }
}

#[derive(Default)]
struct Control {
    active: Option<RunHandle>,
    lingering: Vec<RunHandle>,
    next_epoch: u64,
}

/// Owns one camera's capture thread and its latest-frame slot.
///
/// `start`/`stop` are serialized by a control lock; frame and counter reads
/// only take the short-held state lock and never wait on the device.
pub struct CameraSourceWorker {
    config: CameraConfig,
    generation: u64,
    settings: CaptureSettings,
    backend: Arc<dyn CaptureBackend>,
    state: Arc<Mutex<CaptureState>>,
    control: Mutex<Control>,
    lingering: AtomicUsize,
}

impl CameraSourceWorker {
    pub fn new(
        config: CameraConfig,
        backend: Arc<dyn CaptureBackend>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            config,
            generation: 0,
            settings,
            backend,
            state: Arc::new(Mutex::new(CaptureState::default())),
            control: Mutex::new(Control::default()),
            lingering: AtomicUsize::new(0),
        }
    }

    /// Tag the worker with the registry's construction counter
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn id(&self) -> u32 {
        self.config.id
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Capture threads whose stop timed out and have not been seen exiting
    pub fn lingering_threads(&self) -> usize {
        self.lingering.load(Ordering::Relaxed)
    }

    /// Launch the capture thread.
    ///
    /// Returns whether the device reported itself open within the start grace
    /// period. Returns false without side effects when already running.
    pub fn start(&self) -> bool {
        let camera_id = self.config.id;
        let mut control = self.control.lock();
        self.reap_lingering(&mut control);

        if self.is_running() {
            warn!(camera_id, "Camera {} is already running", camera_id);
            return false;
        }

        if let Some(mut previous) = control.active.take() {
            if previous.has_exited() {
                previous.join(camera_id);
            } else {
                warn!(
                    camera_id,
                    "Camera {} is still opening from a previous start", camera_id
                );
                control.active = Some(previous);
                return false;
            }
        }

        if !control.lingering.is_empty() {
            warn!(
                camera_id,
                lingering = control.lingering.len(),
                "Starting camera {} while earlier capture threads have not exited",
                camera_id
            );
        }

        control.next_epoch += 1;
        let epoch = control.next_epoch;
        self.state.lock().epoch = epoch;

        info!(
            camera_id,
            generation = self.generation,
            source = %self.config.source,
            "Starting camera stream: {} (ID: {})",
            self.config.name,
            camera_id
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let (opened_tx, opened_rx) = channel::bounded(1);
        let (done_tx, done_rx) = channel::bounded::<()>(0);

        let context = CaptureContext {
            config: self.config.clone(),
            settings: self.settings.clone(),
            backend: Arc::clone(&self.backend),
            state: Arc::clone(&self.state),
            shutdown: Arc::clone(&shutdown),
            epoch,
            opened_tx,
        };

        let spawned = thread::Builder::new()
            .name(format!("camera-{}", camera_id))
            .spawn(move || {
                let _exit_signal = done_tx;
                run_capture_loop(context);
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                error!(camera_id, "Failed to spawn capture thread: {}", e);
                self.retire_epoch(epoch);
                return false;
            }
        };

        control.active = Some(RunHandle {
            epoch,
            shutdown,
            done: done_rx,
            thread: Some(thread),
        });

        match opened_rx.recv_timeout(self.settings.start_grace()) {
            Ok(true) => {
                info!(camera_id, "Camera {} started", camera_id);
                true
            }
            Ok(false) | Err(RecvTimeoutError::Disconnected) => {
                warn!(camera_id, "Camera {} failed to start", camera_id);
                false
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    camera_id,
                    grace_ms = self.settings.start_grace_ms,
                    "Camera {} did not open within the start grace period",
                    camera_id
                );
                false
            }
        }
    }

    /// Signal the capture thread and wait (bounded) for it to exit.
    ///
    /// Returns false when not running. A timed-out join still returns true;
    /// the thread is tracked as lingering and its epoch is retired so it can
    /// no longer write.
    pub fn stop(&self) -> bool {
        let camera_id = self.config.id;
        let mut control = self.control.lock();
        self.reap_lingering(&mut control);

        if !self.is_running() {
            // A run still opening its device gets cancelled quietly
            if let Some(run) = control.active.take() {
                run.signal();
                self.retire_epoch(run.epoch);
                self.park(&mut control, run);
            }
            warn!(camera_id, "Camera {} is not running", camera_id);
            return false;
        }

        let Some(mut run) = control.active.take() else {
            warn!(camera_id, "Camera {} has no capture thread", camera_id);
            return false;
        };

        info!(
            camera_id,
            "Stopping camera stream: {} (ID: {})", self.config.name, camera_id
        );
        run.signal();

        if run.wait(camera_id, self.settings.stop_timeout()) {
            debug!(camera_id, "Capture thread joined");
        } else {
            warn!(
                camera_id,
                timeout_ms = self.settings.stop_timeout_ms,
                "Capture thread for camera {} did not exit in time; tracking it as lingering",
                camera_id
            );
        }

        self.retire_epoch(run.epoch);
        self.park(&mut control, run);
        true
    }

    /// Copy of the most recent frame, kept after stop
    pub fn get_latest_frame(&self) -> Option<FrameData> {
        self.state.lock().latest_frame.clone()
    }

    pub fn get_status(&self) -> StatusSnapshot {
        let state = self.state.lock();
        let now = Instant::now();

        let uptime = state
            .started_at
            .map(|started| {
                let until = if state.running {
                    now
                } else {
                    state.stopped_at.unwrap_or(now)
                };
                until.saturating_duration_since(started).as_secs_f64()
            })
            .unwrap_or(0.0);

        let actual_fps = if uptime > 0.0 {
            state.run_frames as f64 / uptime
        } else {
            0.0
        };

        StatusSnapshot {
            camera_id: self.config.id,
            camera_name: self.config.name.clone(),
            generation: self.generation,
            is_running: state.running,
            frames_captured: state.frames_captured,
            read_failures: state.read_failures,
            uptime_seconds: uptime,
            actual_fps: round_fps(actual_fps),
            configured_fps: self.config.fps,
            last_frame_age_seconds: state
                .last_frame_at
                .map(|at| now.saturating_duration_since(at).as_secs_f64()),
            started_at: state.started_wall,
            last_frame_at: state.last_frame_wall,
            lingering_threads: self.lingering_threads(),
        }
    }

    /// Wait up to `timeout` in total for lingering threads to exit.
    ///
    /// Returns true when none remain.
    pub fn join_lingering(&self, timeout: Duration) -> bool {
        let camera_id = self.config.id;
        let deadline = Instant::now() + timeout;
        let mut control = self.control.lock();

        control.lingering.retain_mut(|run| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            !run.wait(camera_id, remaining)
        });

        let remaining = control.lingering.len();
        self.lingering.store(remaining, Ordering::Relaxed);
        if remaining > 0 {
            warn!(
                camera_id,
                remaining, "Capture threads for camera {} are still alive", camera_id
            );
        }
        remaining == 0
    }

    fn reap_lingering(&self, control: &mut Control) {
        let camera_id = self.config.id;
        control.lingering.retain_mut(|run| {
            if run.has_exited() {
                run.join(camera_id);
                debug!(camera_id, epoch = run.epoch, "Lingering capture thread exited");
                false
            } else {
                true
            }
        });
        self.lingering
            .store(control.lingering.len(), Ordering::Relaxed);
    }

    /// Join an exited run or keep it as lingering
    fn park(&self, control: &mut Control, mut run: RunHandle) {
        if run.thread.is_none() || run.has_exited() {
            run.join(self.config.id);
        } else {
            control.lingering.push(run);
        }
        self.lingering
            .store(control.lingering.len(), Ordering::Relaxed);
    }

    fn retire_epoch(&self, epoch: u64) {
        let mut state = self.state.lock();
        if state.epoch == epoch {
            state.epoch = 0;
            if state.running {
                state.running = false;
                state.stopped_at = Some(Instant::now());
            }
        }
    }
}

impl Drop for CameraSourceWorker {
    fn drop(&mut self) {
        let control = self.control.get_mut();
        if let Some(run) = control.active.as_ref() {
            run.signal();
        }
        for run in &control.lingering {
            run.signal();
        }
    }
}

struct CaptureContext {
    config: CameraConfig,
    settings: CaptureSettings,
    backend: Arc<dyn CaptureBackend>,
    state: Arc<Mutex<CaptureState>>,
    shutdown: Arc<AtomicBool>,
    epoch: u64,
    opened_tx: Sender<bool>,
}

/// Owns the open device for one run; releasing it and clearing the running
/// flag happen on drop so every exit path (including a panic) tears down.
struct RunGuard<'a> {
    camera_id: u32,
    epoch: u64,
    state: &'a Mutex<CaptureState>,
    device: Box<dyn CaptureDevice>,
}

impl RunGuard<'_> {
    fn mark_running(&self) -> bool {
        let mut state = self.state.lock();
        if state.epoch != self.epoch {
            return false;
        }
        state.running = true;
        state.run_frames = 0;
        state.started_at = Some(Instant::now());
        state.started_wall = Some(Utc::now());
        state.stopped_at = None;
        true
    }

    /// Swap in a new frame; false once this run's epoch has been retired
    fn commit(&self, frame: FrameData, captured_at: Instant) -> bool {
        let mut state = self.state.lock();
        if state.epoch != self.epoch {
            return false;
        }
        state.frames_captured += 1;
        state.run_frames += 1;
        let sequence = state.frames_captured;
        state.latest_frame = Some(frame.with_id(sequence));
        state.last_frame_at = Some(captured_at);
        state.last_frame_wall = Some(Utc::now());
        true
    }

    fn record_read_failure(&self) {
        let mut state = self.state.lock();
        if state.epoch == self.epoch {
            state.read_failures += 1;
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.device.release();

        let mut state = self.state.lock();
        if state.epoch == self.epoch && state.running {
            state.running = false;
            state.stopped_at = Some(Instant::now());
        }
        drop(state);

        info!(
            camera_id = self.camera_id,
            "Camera {} stream stopped and cleaned up", self.camera_id
        );
    }
}

fn run_capture_loop(context: CaptureContext) {
    let camera_id = context.config.id;

    let mut device = match context.backend.open(&context.config) {
        Ok(device) => device,
        Err(e) => {
            error!(
                camera_id,
                source = %context.config.source,
                "Failed to open camera stream: {}",
                e
            );
            let _ = context.opened_tx.send(false);
            return;
        }
    };

    if let Err(e) = device.set_buffer_size(context.settings.buffer_size) {
        debug!(camera_id, "Could not set buffer size: {}", e);
    }
    if let Err(e) = device.set_fps(context.config.fps) {
        warn!(camera_id, "Could not set FPS for camera {}: {}", camera_id, e);
    }
    if let Some((width, height)) = context.config.resolution {
        if let Err(e) = device.set_resolution(width, height) {
            warn!(
                camera_id,
                "Could not set resolution {}x{} for camera {}: {}", width, height, camera_id, e
            );
        }
    }

    let mut guard = RunGuard {
        camera_id,
        epoch: context.epoch,
        state: &context.state,
        device,
    };

    if !guard.mark_running() {
        debug!(camera_id, "Run cancelled before the device finished opening");
        let _ = context.opened_tx.send(false);
        return;
    }
    let _ = context.opened_tx.send(true);
    info!(
        camera_id,
        backend = context.backend.name(),
        "Camera {} stream started successfully",
        camera_id
    );

    let frame_interval = Duration::from_secs_f64(1.0 / context.config.fps as f64);
    let idle_poll = context.settings.idle_poll();
    let read_retry = context.settings.read_retry();
    let mut last_capture: Option<Instant> = None;
    let mut consecutive_failures: u64 = 0;

    while !context.shutdown.load(Ordering::Acquire) {
        if let Some(last) = last_capture {
            let elapsed = last.elapsed();
            if elapsed < frame_interval {
                thread::sleep(idle_poll.min(frame_interval - elapsed));
                continue;
            }
        }

        let read_started = Instant::now();
        match guard.device.read_frame() {
            Ok(frame) => {
                if consecutive_failures > 0 {
                    info!(
                        camera_id,
                        failures = consecutive_failures,
                        "Camera {} recovered after read failures",
                        camera_id
                    );
                    consecutive_failures = 0;
                }
                if !guard.commit(frame, read_started) {
                    debug!(camera_id, "Run retired; discarding frame");
                    break;
                }
                last_capture = Some(read_started);
            }
            Err(e) => {
                consecutive_failures += 1;
                guard.record_read_failure();
                if consecutive_failures == 1
                    || consecutive_failures % READ_FAILURE_LOG_INTERVAL == 0
                {
                    warn!(
                        camera_id,
                        consecutive_failures,
                        "Failed to read frame from camera {}: {}",
                        camera_id,
                        e
                    );
                } else {
                    debug!(camera_id, consecutive_failures, "Frame read failed: {}", e);
                }
                thread::sleep(read_retry);
            }
        }
    }

    debug!(camera_id, "Capture loop exiting");
}
