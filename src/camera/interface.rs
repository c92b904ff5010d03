use crate::error::CameraError;
use crate::frame::{FrameData, Geometry};

#[cfg(all(target_os = "linux", feature = "camera"))]
use crate::frame::FrameFormat;
#[cfg(all(target_os = "linux", feature = "camera"))]
use gstreamer::prelude::*;
#[cfg(all(target_os = "linux", feature = "camera"))]
use gstreamer::Pipeline;
#[cfg(all(target_os = "linux", feature = "camera"))]
use gstreamer_app::AppSink;
#[cfg(all(target_os = "linux", feature = "camera"))]
use gstreamer_video::VideoInfo;
#[cfg(all(target_os = "linux", feature = "camera"))]
use std::time::{Duration, SystemTime};
#[cfg(all(target_os = "linux", feature = "camera"))]
use tracing::{debug, info, trace, warn};

/// A camera handle that delivers raw frames with blocking reads.
///
/// Implementations own the underlying device. `release` must be idempotent
/// and a failed `read` leaves the device in a state where `release` followed
/// by `open` recovers it.
pub trait CameraDevice: Send {
    /// Identifier used in logs and errors
    fn device_id(&self) -> &str;

    /// Open the device and report the geometry it negotiated
    fn open(&mut self) -> Result<Geometry, CameraError>;

    /// Block until the next frame is available or the read times out
    fn read(&mut self) -> Result<FrameData, CameraError>;

    /// Close the device; safe to call when already closed
    fn release(&mut self);

    fn is_open(&self) -> bool;
}

/// Parse a `/dev/videoX` style device or a bare index
pub(crate) fn parse_device_index(device: &str) -> Option<u32> {
    if let Ok(index) = device.parse::<u32>() {
        return Some(index);
    }
    device
        .strip_prefix("/dev/video")
        .filter(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()))
        .and_then(|rest| rest.parse().ok())
}

/// V4L2 camera read through a GStreamer appsink, converted to BGR
#[cfg(all(target_os = "linux", feature = "camera"))]
pub struct GstCamera {
    device: String,
    resolution: Option<(u32, u32)>,
    read_timeout: Duration,
    pipeline: Option<Pipeline>,
    appsink: Option<AppSink>,
    pending: Option<FrameData>,
    frame_counter: u64,
}

#[cfg(all(target_os = "linux", feature = "camera"))]
impl GstCamera {
    pub fn new(device: String, resolution: Option<(u32, u32)>, read_timeout: Duration) -> Self {
        Self {
            device,
            resolution,
            read_timeout,
            pipeline: None,
            appsink: None,
            pending: None,
            frame_counter: 0,
        }
    }

    /// Build GStreamer pipeline string for raw BGR capture
    fn build_pipeline_string(&self) -> String {
        let source = match parse_device_index(&self.device) {
            Some(index) => format!("v4l2src device=/dev/video{} do-timestamp=true", index),
            None if self.device.starts_with('/') => {
                format!("v4l2src device={} do-timestamp=true", self.device)
            }
            // Anything else is taken as a GStreamer source description
            None => self.device.clone(),
        };

        let caps = match self.resolution {
            Some((width, height)) => format!(
                "videoscale ! video/x-raw,format=BGR,width={},height={}",
                width, height
            ),
            None => "video/x-raw,format=BGR".to_string(),
        };

        format!(
            "{} ! decodebin ! videoconvert ! {} ! \
             appsink name=sink sync=false max-buffers=2 drop=true emit-signals=false",
            source, caps
        )
    }

    fn timeout(&self) -> gstreamer::ClockTime {
        gstreamer::ClockTime::from_nseconds(self.read_timeout.as_nanos() as u64)
    }

    fn fail(&mut self, details: String) -> CameraError {
        self.release();
        CameraError::unavailable(self.device.clone(), details)
    }

    fn try_open(&mut self) -> Result<Geometry, CameraError> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let pipeline_desc = self.build_pipeline_string();
        info!("Creating GStreamer capture pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| CameraError::Configuration {
                details: "Failed to get appsink element".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        self.pipeline = Some(pipeline.clone());
        self.appsink = Some(appsink.clone());

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| self.fail(format!("Failed to start pipeline: {}", e)))?;

        // The first sample carries the negotiated caps; keep it for the first read
        let sample = match appsink.try_pull_sample(self.timeout()) {
            Some(sample) => sample,
            None => return Err(self.fail("No frame received after opening".to_string())),
        };
        let frame = self.sample_to_frame(&sample)?;
        let geometry = frame.geometry();
        self.pending = Some(frame);

        info!("Camera {} opened at {}", self.device, geometry);
        Ok(geometry)
    }

    /// Process a GStreamer sample into a frame
    fn sample_to_frame(&mut self, sample: &gstreamer::Sample) -> Result<FrameData, CameraError> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| CameraError::unavailable(self.device.clone(), "No buffer in sample"))?;

        let caps = sample
            .caps()
            .ok_or_else(|| CameraError::unavailable(self.device.clone(), "No caps in sample"))?;

        let video_info = VideoInfo::from_caps(caps).map_err(|e| {
            CameraError::unavailable(self.device.clone(), format!("Failed to get video info: {}", e))
        })?;

        let map = buffer.map_readable().map_err(|e| {
            CameraError::unavailable(self.device.clone(), format!("Failed to map buffer: {}", e))
        })?;

        let stride = video_info.stride()[0].max(0) as usize;
        self.frame_counter += 1;

        let frame = FrameData::with_stride(
            self.frame_counter,
            SystemTime::now(),
            map.as_slice().to_vec(),
            video_info.width(),
            video_info.height(),
            stride,
            FrameFormat::Bgr24,
        );

        if !frame.validate_size() {
            return Err(CameraError::unavailable(
                self.device.clone(),
                format!(
                    "Short frame buffer: {} bytes for {}",
                    map.len(),
                    frame.geometry()
                ),
            ));
        }

        trace!(
            "Captured frame {} ({}, {} bytes)",
            frame.id,
            frame.geometry(),
            map.len()
        );
        Ok(frame)
    }
}

#[cfg(all(target_os = "linux", feature = "camera"))]
impl CameraDevice for GstCamera {
    fn device_id(&self) -> &str {
        &self.device
    }

    fn open(&mut self) -> Result<Geometry, CameraError> {
        if self.is_open() {
            if let Some(frame) = &self.pending {
                return Ok(frame.geometry());
            }
        }
        self.release();
        self.try_open()
    }

    fn read(&mut self) -> Result<FrameData, CameraError> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }

        let appsink = self
            .appsink
            .clone()
            .ok_or_else(|| CameraError::unavailable(self.device.clone(), "Device is not open"))?;

        match appsink.try_pull_sample(self.timeout()) {
            Some(sample) => self.sample_to_frame(&sample),
            None if appsink.is_eos() => Err(self.fail("End of stream".to_string())),
            None => Err(self.fail(format!("No frame within {:?}", self.read_timeout))),
        }
    }

    fn release(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop capture pipeline cleanly: {}", e);
            }
            debug!("Camera {} released", self.device);
        }
        self.appsink = None;
        self.pending = None;
    }

    fn is_open(&self) -> bool {
        self.pipeline.is_some()
    }
}

#[cfg(all(target_os = "linux", feature = "camera"))]
impl Drop for GstCamera {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_index() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("/dev/videoX"), None);
        assert_eq!(parse_device_index("synthetic"), None);
    }

    #[cfg(all(target_os = "linux", feature = "camera"))]
    #[test]
    fn test_pipeline_string() {
        let camera = GstCamera::new(
            "/dev/video1".to_string(),
            Some((320, 240)),
            Duration::from_secs(1),
        );
        let desc = camera.build_pipeline_string();
        assert!(desc.starts_with("v4l2src device=/dev/video1"));
        assert!(desc.contains("format=BGR,width=320,height=240"));
        assert!(desc.contains("appsink name=sink"));
        assert!(!camera.is_open());
    }
}
