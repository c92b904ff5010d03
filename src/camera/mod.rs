mod builder;
mod interface;
mod mock;
mod source;
mod synthetic;
#[cfg(test)]
mod tests;

pub use builder::{open_device, FrameSourceBuilder, SYNTHETIC_DEVICE};
#[cfg(all(target_os = "linux", feature = "camera"))]
pub use interface::GstCamera;
pub use interface::CameraDevice;
pub use mock::{MockCamera, MockCameraStats, MockRead};
pub use source::FrameSource;
pub use synthetic::SyntheticCamera;
