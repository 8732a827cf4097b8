use super::CameraRegistry;
use crate::camera::CameraSourceWorker;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

impl CameraRegistry {
    /// Cold restart: stop and discard every worker, then rebuild from a fresh
    /// config pull. Frames and statistics are lost.
    pub fn refresh(&self) -> bool {
        info!("Refreshing camera configuration");
        let _lifecycle = self.lifecycle.write();

        let discarded = self.take_all_workers();
        for worker in &discarded {
            worker.stop();
        }
        self.retire(discarded);

        self.initialize()
    }

    /// Stop everything, join lingering capture threads (bounded) and clear
    /// the registry. Called at process teardown.
    pub fn shutdown(&self) {
        info!("Shutting down camera registry");
        let _lifecycle = self.lifecycle.write();

        let discarded = self.take_all_workers();
        for worker in &discarded {
            worker.stop();
        }
        self.retire(discarded);

        // Join outside the lock so status reads are not held up meanwhile
        let deadline = Instant::now() + self.settings.shutdown_join_timeout();
        let mut pending = std::mem::take(&mut *self.retired.lock());
        pending.retain(|worker| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            !worker.join_lingering(remaining)
        });

        let mut retired = self.retired.lock();
        retired.extend(pending);
        if retired.is_empty() {
            info!("Camera registry shutdown complete");
        } else {
            warn!(
                "Camera registry shutdown complete; {} camera(s) left capture threads running",
                retired.len()
            );
        }
    }

    fn take_all_workers(&self) -> Vec<Arc<CameraSourceWorker>> {
        std::mem::take(&mut *self.workers.lock())
            .into_values()
            .collect()
    }

    /// Keep discarded workers that still have live threads, drop the rest
    fn retire(&self, discarded: Vec<Arc<CameraSourceWorker>>) {
        let mut retired = self.retired.lock();
        retired.extend(discarded);
        retired.retain(|worker| !worker.join_lingering(Duration::ZERO));
    }
}
