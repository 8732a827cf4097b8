use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel encoding of a frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Compressed JPEG, one image per payload
    Mjpeg,
    /// Tightly packed 8-bit RGB rows
    Rgb24,
}

/// One captured frame.
///
/// The pixel payload sits behind an `Arc` and is never mutated after
/// construction, so cloning a `FrameData` hands out an independent, complete
/// view of the frame without copying pixels.
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Per-worker sequence number
    pub id: u64,
    pub timestamp: SystemTime,
    pub data: Arc<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
}

impl FrameData {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    /// Same payload and metadata, renumbered for the worker that stores it
    pub(crate) fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_shares_payload() {
        let frame = FrameData::new(9, SystemTime::now(), vec![7u8; 16], 4, 4, FrameFormat::Mjpeg);
        let copy = frame.clone().with_id(10);

        assert!(Arc::ptr_eq(&frame.data, &copy.data));
        assert_eq!(frame.id, 9);
        assert_eq!(copy.id, 10);
    }
}
