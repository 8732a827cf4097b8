//! Camera configuration sources.
//!
//! The registry pulls the camera list on initialization, on lazy start of an
//! unknown id and on refresh. Providers have no push or subscription contract.

use crate::config::{CameraConfig, MulticamConfig};
use crate::error::Result;
use parking_lot::RwLock;
use std::path::PathBuf;
use tracing::debug;

/// Pull interface returning the ordered list of camera records
pub trait ConfigProvider: Send + Sync {
    fn camera_configs(&self) -> Result<Vec<CameraConfig>>;
}

/// In-memory camera list that can be swapped at runtime
#[derive(Debug, Default)]
pub struct StaticConfigProvider {
    cameras: RwLock<Vec<CameraConfig>>,
}

impl StaticConfigProvider {
    pub fn new(cameras: Vec<CameraConfig>) -> Self {
        Self {
            cameras: RwLock::new(cameras),
        }
    }

    /// Replace the list returned by subsequent pulls
    pub fn replace(&self, cameras: Vec<CameraConfig>) {
        *self.cameras.write() = cameras;
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn camera_configs(&self) -> Result<Vec<CameraConfig>> {
        Ok(self.cameras.read().clone())
    }
}

/// Re-reads the `[[cameras]]` tables of a TOML file on every pull
#[derive(Debug, Clone)]
pub struct FileConfigProvider {
    path: PathBuf,
}

impl FileConfigProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigProvider for FileConfigProvider {
    fn camera_configs(&self) -> Result<Vec<CameraConfig>> {
        debug!("Reading camera list from {}", self.path.display());
        let config = MulticamConfig::load_from_file(&self.path)?;
        Ok(config.cameras)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_static_provider_replace() {
        let provider = StaticConfigProvider::new(vec![CameraConfig::new(1, "A", "0", 30).unwrap()]);
        assert_eq!(provider.camera_configs().unwrap().len(), 1);

        provider.replace(vec![
            CameraConfig::new(2, "B", "1", 30).unwrap(),
            CameraConfig::new(3, "C", "2", 30).unwrap(),
        ]);
        let ids: Vec<u32> = provider.camera_configs().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_file_provider_sees_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cameras.toml");

        std::fs::write(&path, "[[cameras]]\nid = 1\nname = \"Lobby\"\nsource = \"0\"\n").unwrap();
        let provider = FileConfigProvider::new(&path);
        assert_eq!(provider.camera_configs().unwrap().len(), 1);

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "\n[[cameras]]\nid = 2\nname = \"Yard\"\nsource = \"stub://yard\"").unwrap();
        drop(file);

        let ids: Vec<u32> = provider.camera_configs().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_file_provider_reports_malformed_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cameras.toml");
        std::fs::write(&path, "[[cameras]]\nid = 1\nname = \"Lobby\"\nsource = \"\"\n").unwrap();

        assert!(FileConfigProvider::new(&path).camera_configs().is_err());
    }
}
