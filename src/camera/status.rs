use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Point-in-time view of one camera worker, produced on demand
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub camera_id: u32,
    pub camera_name: String,
    /// Registry construction counter of the worker that produced this snapshot
    pub generation: u64,
    pub is_running: bool,
    pub frames_captured: u64,
    pub read_failures: u64,
    pub uptime_seconds: f64,
    /// Frames per second over the current (or last) run
    pub actual_fps: f64,
    pub configured_fps: u32,
    /// None until the first frame arrives
    pub last_frame_age_seconds: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_frame_at: Option<DateTime<Utc>>,
    /// Capture threads that outlived their stop timeout
    pub lingering_threads: usize,
}

impl StatusSnapshot {
    /// True when no frame has arrived within `threshold`, or none ever did
    pub fn is_stale(&self, threshold: Duration) -> bool {
        self.last_frame_age_seconds
            .map(|age| age > threshold.as_secs_f64())
            .unwrap_or(true)
    }
}

pub(crate) fn round_fps(fps: f64) -> f64 {
    (fps * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(age: Option<f64>) -> StatusSnapshot {
        StatusSnapshot {
            camera_id: 1,
            camera_name: "Lobby".to_string(),
            generation: 1,
            is_running: true,
            frames_captured: 10,
            read_failures: 0,
            uptime_seconds: 1.0,
            actual_fps: 10.0,
            configured_fps: 30,
            last_frame_age_seconds: age,
            started_at: None,
            last_frame_at: None,
            lingering_threads: 0,
        }
    }

    #[test]
    fn test_staleness() {
        assert!(snapshot(None).is_stale(Duration::from_secs(5)));
        assert!(snapshot(Some(6.0)).is_stale(Duration::from_secs(5)));
        assert!(!snapshot(Some(0.2)).is_stale(Duration::from_secs(5)));
    }

    #[test]
    fn test_round_fps() {
        assert_eq!(round_fps(29.876), 29.88);
        assert_eq!(round_fps(0.0), 0.0);
    }

    #[test]
    fn test_snapshot_serializes_for_http_consumers() {
        let json = serde_json::to_value(snapshot(Some(0.5))).unwrap();
        assert_eq!(json["camera_id"], 1);
        assert_eq!(json["configured_fps"], 30);
        assert_eq!(json["last_frame_age_seconds"], 0.5);
        assert!(json["started_at"].is_null());
    }
}
