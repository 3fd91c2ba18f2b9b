//! Latest detection result and detector diagnostics.
//!
//! The box slot holds four signed 64-bit words in the order top, right,
//! bottom, left. "No detection" is written as [`ABSENT_SENTINEL`] in every
//! field so a face at the origin stays distinguishable from no face.

use super::region::SharedRegion;
pub use crate::frame::BoundingBox;
use crate::{constants::ABSENT_SENTINEL, Error, Result};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Number of 64-bit fields in the box slot
pub const BOX_FIELDS: usize = 4;

/// Shared slot holding the latest bounding box, or absent
#[derive(Debug, Clone)]
pub struct SharedDetectionResult {
    region: Arc<SharedRegion>,
}

impl SharedDetectionResult {
    /// Allocate an anonymous slot, initially absent
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping fails
    pub fn new() -> Result<Self> {
        Self::with_region(Arc::new(SharedRegion::anonymous(BOX_FIELDS * 8)?))
    }

    /// Use an existing region and mark it absent
    ///
    /// # Errors
    ///
    /// Returns a shared-memory error if the region is smaller than four words
    pub fn with_region(region: Arc<SharedRegion>) -> Result<Self> {
        if region.signed_words().len() < BOX_FIELDS {
            return Err(Error::SharedMemory(format!(
                "Detection region holds {} bytes, needs {}",
                region.byte_len(),
                BOX_FIELDS * 8
            )));
        }
        let slot = Self { region };
        slot.write(None);
        Ok(slot)
    }

    /// Publish a detection, or absent
    pub fn write(&self, detection: Option<BoundingBox>) {
        let edges = detection.map_or([ABSENT_SENTINEL; BOX_FIELDS], |b| b.to_array());
        for (field, value) in self.region.signed_words().iter().zip(edges) {
            field.store(value, Ordering::Release);
        }
    }

    /// Raw field values, possibly torn
    #[must_use]
    pub fn read_raw(&self) -> [i64; BOX_FIELDS] {
        let words = self.region.signed_words();
        std::array::from_fn(|i| words[i].load(Ordering::Acquire))
    }

    /// Latest box; a sentinel in any field reads as absent
    #[must_use]
    pub fn read(&self) -> Option<BoundingBox> {
        let raw = self.read_raw();
        if raw.contains(&ABSENT_SENTINEL) {
            None
        } else {
            Some(BoundingBox::from_array(raw))
        }
    }
}

/// Detector diagnostics: achieved detection rate and detection count
#[derive(Debug, Clone)]
pub struct SharedDetectorRate {
    rate_bits: Arc<AtomicU64>,
    detections: Arc<AtomicU64>,
}

impl Default for SharedDetectorRate {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedDetectorRate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rate_bits: Arc::new(AtomicU64::new(0.0f64.to_bits())),
            detections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish the current detection rate in Hz
    pub fn set_rate(&self, hz: f64) {
        self.rate_bits.store(hz.to_bits(), Ordering::Relaxed);
    }

    /// Most recently published detection rate in Hz
    #[must_use]
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    pub fn record_detection(&self) {
        self.detections.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames in which a face was found
    #[must_use]
    pub fn detections(&self) -> u64 {
        self.detections.load(Ordering::Relaxed)
    }
}
