mod motion;
mod overlay;

pub use motion::{MotionDetector, MotionSample, Region};
pub use overlay::annotate;
