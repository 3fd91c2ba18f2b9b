//! Lock-free shared regions linking the capture and detector loops

pub mod detection;
pub mod frame_buffer;
pub mod region;

pub use detection::{SharedDetectionResult, SharedDetectorRate};
pub use frame_buffer::SharedFrameBuffer;
pub use region::SharedRegion;
