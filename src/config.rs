use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct MotioncamConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Device path, numeric index, or "synthetic" for the built-in test pattern
    #[serde(default = "default_camera_device")]
    pub device: String,

    /// Capture resolution (width, height) to scale to; the device's native
    /// geometry is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<(u32, u32)>,

    /// Upper bound on a single blocking frame read
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Stop the pipeline with a fatal error once reconnect attempts are exhausted
    #[serde(default = "default_fatal_on_device_loss")]
    pub fatal_on_device_loss: bool,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReconnectConfig {
    /// Open attempts before giving up; 0 retries until shutdown
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling for the backoff delay
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Double the delay after every failed attempt
    #[serde(default = "default_exponential_backoff")]
    pub exponential_backoff: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MotionConfig {
    /// Percentage of changed pixels that counts as motion
    #[serde(default = "default_sensitivity_percent")]
    pub sensitivity_percent: f64,

    /// Per-pixel intensity delta above which a pixel counts as changed
    #[serde(default = "default_binarize_threshold")]
    pub binarize_threshold: u8,

    /// Gaussian sigma applied to the difference image
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,

    /// Dilation radius in pixels (L-infinity norm)
    #[serde(default = "default_dilate_radius")]
    pub dilate_radius: u8,

    /// Draw bounding boxes of changed regions on recorded and displayed frames
    #[serde(default = "default_draw_regions")]
    pub draw_regions: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecordingCodec {
    /// MPEG-1 in an AVI container
    Mpeg1,
    /// H.264 in an MP4 container
    H264,
    /// Uncompressed YUV4MPEG2 stream, no encoder required
    Y4m,
}

impl RecordingCodec {
    pub fn extension(&self) -> &'static str {
        match self {
            RecordingCodec::Mpeg1 => "avi",
            RecordingCodec::H264 => "mp4",
            RecordingCodec::Y4m => "y4m",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecordingConfig {
    /// Directory receiving one file per recording session
    #[serde(default = "default_recording_path")]
    pub path: String,

    /// Seconds a session stays open after the last detected motion
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,

    /// Frame rate written into the container
    #[serde(default = "default_recording_fps")]
    pub fps: u32,

    #[serde(default = "default_recording_codec")]
    pub codec: RecordingCodec,

    /// strftime template for file names, extension is appended
    #[serde(default = "default_file_name_template")]
    pub file_name_template: String,

    /// IANA timezone for file names, or "local"
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DisplayConfig {
    /// Geometry frames are scaled to for the display; defaults to the camera geometry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_resolution: Option<(u32, u32)>,

    /// Frames buffered for the display consumer before new ones are dropped
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    /// Sleep at the end of every capture iteration
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl MotioncamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("motioncam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.device", default_camera_device())?
            .set_default("recording.path", default_recording_path())?
            .set_default("recording.cooldown_seconds", default_cooldown_seconds())?
            .set_default("recording.fps", default_recording_fps())?
            .set_default("motion.sensitivity_percent", default_sensitivity_percent())?
            .set_default(
                "pipeline.frame_interval_ms",
                default_frame_interval_ms(),
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment overrides, e.g. MOTIONCAM_RECORDING__COOLDOWN_SECONDS=10
            .add_source(
                Environment::with_prefix("MOTIONCAM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: MotioncamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.device.trim().is_empty() {
            return Err(ConfigError::Message(
                "Camera device must not be empty".to_string(),
            ));
        }

        if let Some((w, h)) = self.camera.resolution {
            if w == 0 || h == 0 {
                return Err(ConfigError::Message(
                    "Camera resolution must be greater than 0".to_string(),
                ));
            }
        }

        if self.camera.read_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Camera read_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.camera.reconnect.max_delay_ms < self.camera.reconnect.base_delay_ms {
            return Err(ConfigError::Message(
                "Reconnect max_delay_ms must not be below base_delay_ms".to_string(),
            ));
        }

        if !(self.motion.sensitivity_percent > 0.0 && self.motion.sensitivity_percent <= 100.0)
        {
            return Err(ConfigError::Message(
                "Motion sensitivity_percent must be in (0, 100]".to_string(),
            ));
        }

        if self.motion.blur_sigma <= 0.0 {
            return Err(ConfigError::Message(
                "Motion blur_sigma must be greater than 0".to_string(),
            ));
        }

        if self.recording.cooldown_seconds == 0 {
            return Err(ConfigError::Message(
                "Recording cooldown_seconds must be greater than 0".to_string(),
            ));
        }

        if self.recording.fps == 0 {
            return Err(ConfigError::Message(
                "Recording fps must be greater than 0".to_string(),
            ));
        }

        if self.recording.file_name_template.trim().is_empty() {
            return Err(ConfigError::Message(
                "Recording file_name_template must not be empty".to_string(),
            ));
        }

        if let Some((w, h)) = self.display.target_resolution {
            if w == 0 || h == 0 {
                return Err(ConfigError::Message(
                    "Display target_resolution must be greater than 0".to_string(),
                ));
            }
        }

        if self.display.feed_capacity == 0 {
            return Err(ConfigError::Message(
                "Display feed_capacity must be greater than 0".to_string(),
            ));
        }

        if self.pipeline.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Serialize configuration to TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl CameraConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl RecordingConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }
}

impl PipelineConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: default_camera_device(),
            resolution: None,
            read_timeout_ms: default_read_timeout_ms(),
            fatal_on_device_loss: default_fatal_on_device_loss(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            exponential_backoff: default_exponential_backoff(),
        }
    }
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            sensitivity_percent: default_sensitivity_percent(),
            binarize_threshold: default_binarize_threshold(),
            blur_sigma: default_blur_sigma(),
            dilate_radius: default_dilate_radius(),
            draw_regions: default_draw_regions(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            path: default_recording_path(),
            cooldown_seconds: default_cooldown_seconds(),
            fps: default_recording_fps(),
            codec: default_recording_codec(),
            file_name_template: default_file_name_template(),
            timezone: default_timezone(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            target_resolution: None,
            feed_capacity: default_feed_capacity(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: default_frame_interval_ms(),
            event_bus_capacity: default_event_bus_capacity(),
        }
    }
}

// Default value functions
fn default_camera_device() -> String {
    "/dev/video0".to_string()
}
fn default_read_timeout_ms() -> u64 {
    2000
}
fn default_fatal_on_device_loss() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    10
}
fn default_base_delay_ms() -> u64 {
    250
}
fn default_max_delay_ms() -> u64 {
    10_000
}
fn default_exponential_backoff() -> bool {
    true
}

fn default_sensitivity_percent() -> f64 {
    0.1
}
fn default_binarize_threshold() -> u8 {
    20
}
// Matches the sigma OpenCV derives for a 5x5 kernel
fn default_blur_sigma() -> f32 {
    1.1
}
fn default_dilate_radius() -> u8 {
    3
}
fn default_draw_regions() -> bool {
    true
}

fn default_recording_path() -> String {
    "./recordings".to_string()
}
fn default_cooldown_seconds() -> u64 {
    30
}
fn default_recording_fps() -> u32 {
    20
}
fn default_recording_codec() -> RecordingCodec {
    RecordingCodec::Mpeg1
}
fn default_file_name_template() -> String {
    "%a %b %e %H:%M:%S %Y".to_string()
}
fn default_timezone() -> String {
    "local".to_string()
}

fn default_feed_capacity() -> usize {
    4
}

fn default_frame_interval_ms() -> u64 {
    5
}
fn default_event_bus_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MotioncamConfig::default();
        assert_eq!(config.camera.device, "/dev/video0");
        assert_eq!(config.recording.cooldown(), Duration::from_secs(30));
        assert_eq!(config.recording.fps, 20);
        assert_eq!(config.motion.sensitivity_percent, 0.1);
        assert_eq!(config.motion.binarize_threshold, 20);
        assert_eq!(config.pipeline.frame_interval(), Duration::from_millis(5));
        assert!(config.display.target_resolution.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
[camera]
device = "synthetic"

[recording]
cooldown_seconds = 5
codec = "y4m"

[display]
target_resolution = [320, 240]
"#
        )
        .unwrap();

        let config = MotioncamConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.camera.device, "synthetic");
        assert_eq!(config.recording.cooldown_seconds, 5);
        assert_eq!(config.recording.codec, RecordingCodec::Y4m);
        assert_eq!(config.display.target_resolution, Some((320, 240)));
        // Untouched values keep their defaults
        assert_eq!(config.recording.fps, 20);
        assert_eq!(config.motion.dilate_radius, 3);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = MotioncamConfig::load_from_file("/nonexistent/motioncam.toml").unwrap();
        assert_eq!(config.camera.resolution, None);
        assert_eq!(config.recording.path, "./recordings");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = MotioncamConfig::default();
        config.recording.cooldown_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = MotioncamConfig::default();
        config.motion.sensitivity_percent = 0.0;
        assert!(config.validate().is_err());

        let mut config = MotioncamConfig::default();
        config.display.target_resolution = Some((0, 480));
        assert!(config.validate().is_err());

        let mut config = MotioncamConfig::default();
        config.camera.reconnect.base_delay_ms = 1000;
        config.camera.reconnect.max_delay_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_codec_extensions() {
        assert_eq!(RecordingCodec::Mpeg1.extension(), "avi");
        assert_eq!(RecordingCodec::H264.extension(), "mp4");
        assert_eq!(RecordingCodec::Y4m.extension(), "y4m");
    }

    #[test]
    fn test_default_config_serializes_to_toml() {
        let toml = MotioncamConfig::default().to_toml().unwrap();
        assert!(toml.contains("[recording]"));
        assert!(toml.contains("cooldown_seconds = 30"));
        assert!(!toml.contains("target_resolution"));
    }
}
