//! Latest-frame slot shared between the capture and detector loops.
//!
//! Single writer, any number of readers, no locking. A read racing a write may
//! return a frame that mixes two captures; the next read heals it.
//!
//! Region layout: the BGR frame bytes from offset 0, padded to a whole word,
//! followed by one word counting published frames. Every handle on the region,
//! including other processes attached to a named region, sees the same count.

use super::region::SharedRegion;
use crate::{
    frame::{Frame, FrameShape},
    Error, Result,
};
use std::sync::{
    atomic::{fence, AtomicU64, Ordering},
    Arc,
};

const WORD: usize = std::mem::size_of::<u64>();

/// Handle to the shared frame slot; clones refer to the same memory
#[derive(Debug, Clone)]
pub struct SharedFrameBuffer {
    region: Arc<SharedRegion>,
    shape: FrameShape,
}

impl SharedFrameBuffer {
    /// Allocate an anonymous slot sized for one frame
    ///
    /// # Errors
    ///
    /// Returns an error if the mapping fails
    pub fn new(shape: FrameShape) -> Result<Self> {
        Self::with_region(Arc::new(SharedRegion::anonymous(Self::region_len(shape))?), shape)
    }

    /// Bytes a region needs to hold a frame of `shape` and the publish counter
    #[must_use]
    pub const fn region_len(shape: FrameShape) -> usize {
        (SharedRegion::words_for(shape.byte_len()) + 1) * WORD
    }

    /// Use an existing region of at least [`Self::region_len`] bytes
    ///
    /// # Errors
    ///
    /// Returns a shared-memory error if the region is too small
    pub fn with_region(region: Arc<SharedRegion>, shape: FrameShape) -> Result<Self> {
        if region.byte_len() < Self::region_len(shape) {
            return Err(Error::SharedMemory(format!(
                "Frame region holds {} bytes, needs {}",
                region.byte_len(),
                Self::region_len(shape)
            )));
        }
        Ok(Self { region, shape })
    }

    fn counter(&self) -> &AtomicU64 {
        &self.region.words()[SharedRegion::words_for(self.shape.byte_len())]
    }

    pub const fn shape(&self) -> FrameShape {
        self.shape
    }

    /// Number of frames written so far
    pub fn frames_published(&self) -> u64 {
        self.counter().load(Ordering::Acquire)
    }

    /// Overwrite the slot with `frame`
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error if the frame shape differs from the slot's
    pub fn write(&self, frame: &Frame) -> Result<()> {
        if frame.shape() != self.shape {
            return Err(Error::InvalidInput(format!(
                "Frame {}x{} does not fit slot {}x{}",
                frame.shape().height,
                frame.shape().width,
                self.shape.height,
                self.shape.width
            )));
        }

        for (chunk, word) in frame.as_bytes().chunks(WORD).zip(self.region.words()) {
            let mut bytes = [0u8; WORD];
            bytes[..chunk.len()].copy_from_slice(chunk);
            word.store(u64::from_ne_bytes(bytes), Ordering::Relaxed);
        }
        self.counter().fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Copy the slot into `frame`, reusing its allocation
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error if the frame shape differs from the slot's
    pub fn read_into(&self, frame: &mut Frame) -> Result<()> {
        if frame.shape() != self.shape {
            return Err(Error::InvalidInput("Destination frame has the wrong shape".to_string()));
        }
        self.copy_into(frame.as_bytes_mut());
        Ok(())
    }

    /// Snapshot of the slot
    #[must_use]
    pub fn read(&self) -> Frame {
        let mut frame = Frame::zeroed(self.shape);
        self.copy_into(frame.as_bytes_mut());
        frame
    }

    fn copy_into(&self, bytes: &mut [u8]) {
        // Pairs with the release increment in `write`
        fence(Ordering::Acquire);
        for (chunk, word) in bytes.chunks_mut(WORD).zip(self.region.words()) {
            let stored = word.load(Ordering::Relaxed).to_ne_bytes();
            chunk.copy_from_slice(&stored[..chunk.len()]);
        }
    }
}
