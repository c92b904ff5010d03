use super::interface::CameraDevice;
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat, Geometry};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

const BLOCK_SIZE: u32 = 50;

/// Test-pattern camera: a static gradient with a bright block that crosses
/// the frame for `active_frames` out of every `period` frames.
pub struct SyntheticCamera {
    device: String,
    geometry: Geometry,
    frame_interval: Duration,
    period: u64,
    active_frames: u64,
    frame_counter: u64,
    is_open: bool,
}

impl SyntheticCamera {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            device: "synthetic".to_string(),
            geometry,
            frame_interval: Duration::from_millis(33),
            period: 600,
            active_frames: 60,
            frame_counter: 0,
            is_open: false,
        }
    }

    /// Pace reads like a camera running at `1 / interval` fps
    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }

    /// Show the moving block for `active_frames` out of every `period` frames
    pub fn with_motion_cycle(mut self, period: u64, active_frames: u64) -> Self {
        self.period = period.max(1);
        self.active_frames = active_frames.min(self.period);
        self
    }

    /// Top-left corner of the block in frame `n`, if it is visible
    fn block_position(&self, n: u64) -> Option<(u32, u32)> {
        let phase = n % self.period;
        if phase >= self.active_frames {
            return None;
        }
        let span = self.geometry.width.saturating_sub(BLOCK_SIZE).max(1) as u64;
        let x = (phase * 8 % span) as u32;
        let y = self.geometry.height.saturating_sub(BLOCK_SIZE) / 2;
        Some((x, y))
    }

    fn render(&self, n: u64) -> Vec<u8> {
        let Geometry { width, height } = self.geometry;
        let mut data = Vec::with_capacity(self.geometry.pixel_count() * 3);
        for y in 0..height {
            for x in 0..width {
                // Smooth background so the frame is not trivially uniform
                let shade = ((x + y) * 96 / (width + height).max(1)) as u8;
                data.extend_from_slice(&[shade, shade, shade]);
            }
        }

        if let Some((bx, by)) = self.block_position(n) {
            for y in by..(by + BLOCK_SIZE).min(height) {
                for x in bx..(bx + BLOCK_SIZE).min(width) {
                    let idx = (y as usize * width as usize + x as usize) * 3;
                    data[idx..idx + 3].copy_from_slice(&[255, 255, 255]);
                }
            }
        }
        data
    }
}

impl CameraDevice for SyntheticCamera {
    fn device_id(&self) -> &str {
        &self.device
    }

    fn open(&mut self) -> Result<Geometry, CameraError> {
        if self.geometry.is_empty() {
            return Err(CameraError::Configuration {
                details: format!("Invalid synthetic geometry {}", self.geometry),
            });
        }
        if !self.is_open {
            info!("Synthetic camera opened at {}", self.geometry);
            self.is_open = true;
        }
        Ok(self.geometry)
    }

    fn read(&mut self) -> Result<FrameData, CameraError> {
        if !self.is_open {
            return Err(CameraError::unavailable(&self.device, "Device is not open"));
        }
        if !self.frame_interval.is_zero() {
            std::thread::sleep(self.frame_interval);
        }

        self.frame_counter += 1;
        Ok(FrameData::new(
            self.frame_counter,
            SystemTime::now(),
            self.render(self.frame_counter),
            self.geometry.width,
            self.geometry.height,
            FrameFormat::Bgr24,
        ))
    }

    fn release(&mut self) {
        if self.is_open {
            debug!("Synthetic camera released");
            self.is_open = false;
        }
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_requires_open() {
        let mut camera = SyntheticCamera::new(Geometry::new(64, 48));
        assert!(camera.read().is_err());
        assert_eq!(camera.open().unwrap(), Geometry::new(64, 48));
        assert!(camera.is_open());
    }

    #[test]
    fn test_frames_have_expected_layout() {
        let mut camera = SyntheticCamera::new(Geometry::new(120, 80))
            .with_frame_interval(Duration::ZERO)
            .with_motion_cycle(10, 5);
        camera.open().unwrap();

        let first = camera.read().unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(first.format, FrameFormat::Bgr24);
        assert!(first.validate_size());

        let second = camera.read().unwrap();
        assert_ne!(first.data, second.data, "block should have moved");
    }

    #[test]
    fn test_static_outside_motion_cycle() {
        let mut camera = SyntheticCamera::new(Geometry::new(120, 80))
            .with_frame_interval(Duration::ZERO)
            .with_motion_cycle(10, 2);
        camera.open().unwrap();

        let frames: Vec<_> = (0..6).map(|_| camera.read().unwrap()).collect();
        // Frames 3.. fall outside the active window and are identical
        assert_eq!(frames[3].data, frames[4].data);
        assert_eq!(frames[4].data, frames[5].data);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut camera = SyntheticCamera::new(Geometry::new(8, 8));
        camera.open().unwrap();
        camera.release();
        camera.release();
        assert!(!camera.is_open());
    }
}
