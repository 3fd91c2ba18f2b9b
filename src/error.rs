//! Error types for the face tracking rig.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// Serial port could not be opened or written
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid construction parameters (servo geometry, config values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mutation rejected because the bound hardware forbids it
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Write-through attempted while the microcontroller is closed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Camera failed to deliver a frame
    #[error("Camera error: {0}")]
    Camera(String),

    /// Detection collaborator failed on a frame
    #[error("Detection error: {0}")]
    Detection(String),

    /// Display collaborator failed to render
    #[error("Display error: {0}")]
    Display(String),

    /// Shared memory region could not be created or has the wrong shape
    #[error("Shared memory error: {0}")]
    SharedMemory(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A pipeline thread panicked
    #[error("Thread panicked: {0}")]
    ThreadPanicked(String),

    /// A pipeline thread did not stop within the grace period
    #[error("Shutdown timeout: {0}")]
    ShutdownTimeout(String),
}

impl Error {
    /// True for failures the realtime loops log and skip instead of escalating
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Camera(_) | Self::Detection(_) | Self::Display(_))
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::Camera("no frame".to_string()).is_transient());
        assert!(Error::Detection("bad input".to_string()).is_transient());
        assert!(!Error::Config("range".to_string()).is_transient());
        assert!(!Error::Connection("closed".to_string()).is_transient());
    }

    #[test]
    fn test_display_formatting() {
        let err = Error::InvalidOperation("fixed pulse bounds".to_string());
        assert_eq!(err.to_string(), "Invalid operation: fixed pulse bounds");
    }
}
