use super::interface::CameraDevice;
use super::source::FrameSource;
use super::synthetic::SyntheticCamera;
use crate::config::CameraConfig;
use crate::error::{MotioncamError, Result};
use crate::frame::Geometry;
use crate::recovery::RetryPolicy;

/// Device name selecting the built-in test pattern
pub const SYNTHETIC_DEVICE: &str = "synthetic";

/// Builder for a frame source from configuration or an explicit device
pub struct FrameSourceBuilder {
    config: Option<CameraConfig>,
    device: Option<Box<dyn CameraDevice>>,
    policy: Option<RetryPolicy>,
}

impl FrameSourceBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            device: None,
            policy: None,
        }
    }

    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use this device instead of one derived from configuration
    pub fn device(mut self, device: Box<dyn CameraDevice>) -> Self {
        self.device = Some(device);
        self
    }

    /// Override the retry policy derived from configuration
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<FrameSource> {
        let policy = match (&self.policy, &self.config) {
            (Some(policy), _) => policy.clone(),
            (None, Some(config)) => {
                RetryPolicy::from_config(&config.reconnect, config.fatal_on_device_loss)
            }
            (None, None) => RetryPolicy::default(),
        };

        let device = match (self.device, self.config) {
            (Some(device), _) => device,
            (None, Some(config)) => open_device(&config)?,
            (None, None) => {
                return Err(MotioncamError::system(
                    "Camera configuration or device must be specified",
                ))
            }
        };

        Ok(FrameSource::new(device, policy))
    }
}

impl Default for FrameSourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Pick the camera backend named by the configuration
pub fn open_device(config: &CameraConfig) -> Result<Box<dyn CameraDevice>> {
    if config.device == SYNTHETIC_DEVICE {
        let (width, height) = config.resolution.unwrap_or((640, 480));
        return Ok(Box::new(SyntheticCamera::new(Geometry::new(width, height))));
    }

    #[cfg(all(target_os = "linux", feature = "camera"))]
    {
        Ok(Box::new(super::interface::GstCamera::new(
            config.device.clone(),
            config.resolution,
            config.read_timeout(),
        )))
    }

    #[cfg(not(all(target_os = "linux", feature = "camera")))]
    {
        Err(crate::error::CameraError::Configuration {
            details: format!(
                "No camera backend for '{}': build on Linux with the `camera` feature or use device = \"{}\"",
                config.device, SYNTHETIC_DEVICE
            ),
        }
        .into())
    }
}
