use super::CameraRegistry;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

impl CameraRegistry {
    /// Start one camera, constructing its worker from a fresh config pull
    /// when the id is not yet known. Waits out a refresh or shutdown in
    /// progress.
    pub fn start(&self, camera_id: u32) -> bool {
        let _lifecycle = self.lifecycle.read();

        let worker = match self.worker(camera_id) {
            Some(worker) => worker,
            None => {
                let Some(config) = self
                    .load_camera_configs()
                    .into_iter()
                    .find(|config| config.id == camera_id)
                else {
                    error!(camera_id, "Camera {} not found in configuration", camera_id);
                    return false;
                };

                // A concurrent lazy start may have inserted it meanwhile
                let mut workers = self.workers.lock();
                Arc::clone(
                    workers
                        .entry(camera_id)
                        .or_insert_with(|| self.build_worker(config)),
                )
            }
        };

        worker.start()
    }

    pub fn stop(&self, camera_id: u32) -> bool {
        match self.worker(camera_id) {
            Some(worker) => worker.stop(),
            None => {
                warn!(camera_id, "Camera {} not found", camera_id);
                false
            }
        }
    }

    /// Start the camera unless it is already running
    pub fn ensure_running(&self, camera_id: u32) -> bool {
        self.is_running(camera_id) || self.start(camera_id)
    }

    /// Start every known camera, initializing from config first when the
    /// registry is empty. Starts are staggered to avoid contention on the
    /// device bus and network.
    pub fn start_all(&self) -> BTreeMap<u32, bool> {
        let _lifecycle = self.lifecycle.read();

        if self.workers.lock().is_empty() {
            self.initialize();
        }

        let stagger = self.settings.start_stagger();
        let mut results = BTreeMap::new();
        for (index, worker) in self.snapshot().into_iter().enumerate() {
            if index > 0 && !stagger.is_zero() {
                thread::sleep(stagger);
            }
            results.insert(worker.id(), worker.start());
        }

        info!(
            "Started {} of {} cameras",
            results.values().filter(|started| **started).count(),
            results.len()
        );
        results
    }

    pub fn stop_all(&self) -> BTreeMap<u32, bool> {
        let results: BTreeMap<u32, bool> = self
            .snapshot()
            .into_iter()
            .map(|worker| (worker.id(), worker.stop()))
            .collect();

        info!(
            "Stopped {} of {} cameras",
            results.values().filter(|stopped| **stopped).count(),
            results.len()
        );
        results
    }
}
