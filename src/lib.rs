pub mod analyzer;
pub mod camera;
pub mod capture;
pub mod config;
pub mod display;
pub mod error;
pub mod events;
pub mod frame;
pub mod pipeline;
pub mod recovery;

pub use analyzer::{annotate, MotionDetector, MotionSample, Region};
pub use camera::{CameraDevice, FrameSource, FrameSourceBuilder, MockCamera, SyntheticCamera};
pub use capture::{
    RecordingController, RecordingState, VideoWriter, VideoWriterFactory, WriterFactory,
};
pub use config::MotioncamConfig;
pub use display::{ChannelSink, DisplayFeed, DisplaySink, DisplayStats, VideoFormat};
pub use error::{
    CameraError, DisplayError, MotionError, MotioncamError, RecordingError, Result,
};
pub use events::{EventBus, PipelineEvent};
pub use frame::{DisplayFrame, FrameData, FrameFormat, Geometry, PixelFormat};
pub use pipeline::{CapturePipeline, PipelineStats};
pub use recovery::{RecoveryAction, RetryPolicy};
