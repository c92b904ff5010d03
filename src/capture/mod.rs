mod controller;
mod encode;
mod mock;
mod naming;
#[cfg(test)]
mod tests;

pub use controller::{RecordingController, RecordingState};
#[cfg(all(target_os = "linux", feature = "video_encoding"))]
pub use encode::GstVideoWriter;
pub use encode::{VideoWriter, VideoWriterFactory, WriterFactory, Y4mWriter};
pub use mock::{MockWriterFactory, MockWriterStats};
pub use naming::{FileNamer, NameTimezone};
