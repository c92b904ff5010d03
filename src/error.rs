use crate::frame::Geometry;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MotioncamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Motion analysis error: {0}")]
    Motion(#[from] MotionError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    #[error("System error: {message}")]
    System { message: String },
}

impl MotioncamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("Camera device {device} unavailable: {details}")]
    DeviceUnavailable { device: String, details: String },

    #[error("Camera device {device} could not be opened after {attempts} attempts")]
    RetriesExhausted { device: String, attempts: u32 },

    #[error("Opening camera device {device} was cancelled by shutdown")]
    Cancelled { device: String },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },
}

impl CameraError {
    pub fn unavailable<D: Into<String>, S: Into<String>>(device: D, details: S) -> Self {
        Self::DeviceUnavailable {
            device: device.into(),
            details: details.into(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, CameraError::DeviceUnavailable { .. })
    }
}

#[derive(Error, Debug, Clone)]
pub enum MotionError {
    #[error("Frame geometry mismatch: previous {previous}, current {current}")]
    GeometryMismatch { previous: Geometry, current: Geometry },

    #[error("Frame processing failed: {details}")]
    FrameProcessing { details: String },
}

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("Failed to open recording {}: {details}", path.display())]
    WriterOpenFailed { path: PathBuf, details: String },

    #[error("Failed to write frame to recording: {details}")]
    WriteFailed { details: String },

    #[error("Failed to finalize recording: {details}")]
    FinishFailed { details: String },
}

#[derive(Error, Debug, Clone)]
pub enum DisplayError {
    #[error("No display sink attached")]
    SinkUnavailable,

    #[error("Display format conversion failed: {details}")]
    FormatConversion { details: String },

    #[error("Display format negotiation failed: {details}")]
    Negotiation { details: String },
}

pub type Result<T> = std::result::Result<T, MotioncamError>;
