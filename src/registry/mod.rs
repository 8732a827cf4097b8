//! Camera registry: the id→worker map and the single entry point used by
//! transport handlers and the tracking pipeline.
//!
//! The map lock is only held for lookups and mutation. Every start, stop and
//! join runs on a cloned worker handle after the lock is released, so a slow
//! teardown never stalls unrelated reads.

mod lifecycle;
mod shutdown;


use crate::camera::{CameraSourceWorker, CaptureBackend, StatusSnapshot};
use crate::config::{CameraConfig, CaptureSettings};
use crate::frame::FrameData;
use crate::provider::{ConfigProvider, StaticConfigProvider};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct CameraRegistry {
    provider: Arc<dyn ConfigProvider>,
    backend: Arc<dyn CaptureBackend>,
    settings: CaptureSettings,
    workers: Mutex<BTreeMap<u32, Arc<CameraSourceWorker>>>,
    /// Held shared by starts and exclusively by refresh/shutdown, so no start
    /// can slip a worker in while the map is being torn down
    lifecycle: RwLock<()>,
    /// Discarded workers whose capture threads have not confirmed exit
    retired: Mutex<Vec<Arc<CameraSourceWorker>>>,
    generation: AtomicU64,
}

impl CameraRegistry {
    pub fn new(
        provider: Arc<dyn ConfigProvider>,
        backend: Arc<dyn CaptureBackend>,
        settings: CaptureSettings,
    ) -> Self {
        info!("Camera registry created (backend: {})", backend.name());
        Self {
            provider,
            backend,
            settings,
            workers: Mutex::new(BTreeMap::new()),
            lifecycle: RwLock::new(()),
            retired: Mutex::new(Vec::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Registry over a fixed camera list
    pub fn with_configs(
        configs: Vec<CameraConfig>,
        backend: Arc<dyn CaptureBackend>,
        settings: CaptureSettings,
    ) -> Self {
        Self::new(Arc::new(StaticConfigProvider::new(configs)), backend, settings)
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Pull the camera list; provider failures count as "no cameras"
    fn load_camera_configs(&self) -> Vec<CameraConfig> {
        match self.provider.camera_configs() {
            Ok(configs) => configs,
            Err(e) => {
                error!("Failed to load camera configs: {}", e);
                Vec::new()
            }
        }
    }

    fn build_worker(&self, config: CameraConfig) -> Arc<CameraSourceWorker> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            camera_id = config.id,
            generation,
            "Initialized camera stream: {} (ID: {})",
            config.name,
            config.id
        );
        Arc::new(
            CameraSourceWorker::new(config, Arc::clone(&self.backend), self.settings.clone())
                .with_generation(generation),
        )
    }

    /// Construct (without starting) a worker for every configured camera not
    /// yet known. Returns whether any configs were found.
    pub fn initialize(&self) -> bool {
        let configs = self.load_camera_configs();
        if configs.is_empty() {
            warn!("No camera configurations found");
            return false;
        }

        let mut workers = self.workers.lock();
        for config in configs {
            if !workers.contains_key(&config.id) {
                let id = config.id;
                let worker = self.build_worker(config);
                workers.insert(id, worker);
            }
        }

        info!("Initialized {} camera streams", workers.len());
        true
    }

    pub(crate) fn worker(&self, camera_id: u32) -> Option<Arc<CameraSourceWorker>> {
        self.workers.lock().get(&camera_id).cloned()
    }

    /// Handles of every known worker, in id order
    pub(crate) fn snapshot(&self) -> Vec<Arc<CameraSourceWorker>> {
        self.workers.lock().values().cloned().collect()
    }

    pub fn known_ids(&self) -> BTreeSet<u32> {
        self.workers.lock().keys().copied().collect()
    }

    pub fn get_frame(&self, camera_id: u32) -> Option<FrameData> {
        self.worker(camera_id)?.get_latest_frame()
    }

    pub fn get_status(&self, camera_id: u32) -> Option<StatusSnapshot> {
        self.worker(camera_id).map(|worker| worker.get_status())
    }

    pub fn get_all_status(&self) -> BTreeMap<u32, StatusSnapshot> {
        self.snapshot()
            .into_iter()
            .map(|worker| (worker.id(), worker.get_status()))
            .collect()
    }

    pub fn is_running(&self, camera_id: u32) -> bool {
        self.worker(camera_id)
            .map(|worker| worker.is_running())
            .unwrap_or(false)
    }

    pub fn running_ids(&self) -> BTreeSet<u32> {
        self.snapshot()
            .into_iter()
            .filter(|worker| worker.is_running())
            .map(|worker| worker.id())
            .collect()
    }

    /// Capture threads of current and retired workers that outlived a stop
    pub fn lingering_thread_count(&self) -> usize {
        let current: usize = self
            .snapshot()
            .iter()
            .map(|worker| worker.lingering_threads())
            .sum();
        let retired: usize = self
            .retired
            .lock()
            .iter()
            .map(|worker| worker.lingering_threads())
            .sum();
        current + retired
    }
}
