use super::interface::CameraDevice;
use crate::error::CameraError;
use crate::frame::{FrameData, Geometry};
use crate::recovery::{RecoveryAction, RetryPolicy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest uninterrupted sleep while waiting to retry, so shutdown stays prompt
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Owns a camera device and reopens it according to a retry policy
pub struct FrameSource {
    device: Box<dyn CameraDevice>,
    policy: RetryPolicy,
    geometry: Option<Geometry>,
    reconnects: u64,
}

impl FrameSource {
    pub fn new(device: Box<dyn CameraDevice>, policy: RetryPolicy) -> Self {
        Self {
            device,
            policy,
            geometry: None,
            reconnects: 0,
        }
    }

    /// Open the device, retrying per policy while `running` stays set.
    ///
    /// Returns the negotiated geometry, which may differ from the geometry of
    /// a previous session.
    pub fn open(&mut self, running: &AtomicBool) -> Result<Geometry, CameraError> {
        if self.device.is_open() {
            if let Some(geometry) = self.geometry {
                return Ok(geometry);
            }
        }

        let device_id = self.device.device_id().to_string();
        let mut tracker = self.policy.tracker();

        loop {
            if !running.load(Ordering::Acquire) {
                debug!("Opening {} abandoned, pipeline is stopping", device_id);
                return Err(CameraError::Cancelled { device: device_id });
            }

            let result = self.device.open().and_then(|geometry| {
                if geometry.is_empty() {
                    Err(CameraError::unavailable(
                        device_id.as_str(),
                        format!("Device reported empty geometry {}", geometry),
                    ))
                } else {
                    Ok(geometry)
                }
            });

            match result {
                Ok(geometry) => {
                    if self.geometry.is_some() {
                        self.reconnects += 1;
                    }
                    if self.geometry.map_or(false, |previous| previous != geometry) {
                        info!(
                            "Camera {} reopened with new geometry {}",
                            device_id, geometry
                        );
                    } else {
                        info!("Camera {} open at {}", device_id, geometry);
                    }
                    self.geometry = Some(geometry);
                    return Ok(geometry);
                }
                Err(e) => {
                    self.device.release();
                    if !e.is_recoverable() {
                        warn!("Camera {} cannot be opened: {}", device_id, e);
                        return Err(e);
                    }
                    match tracker.record_failure("camera", &e.to_string()) {
                        RecoveryAction::RetryAfterDelay(delay) => sleep_while_running(delay, running),
                        RecoveryAction::GiveUp => {
                            return Err(CameraError::RetriesExhausted {
                                device: device_id,
                                attempts: tracker.attempts(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// Block for the next frame. On failure the device is released so the
    /// next `open` starts from a clean handle.
    pub fn read(&mut self) -> Result<FrameData, CameraError> {
        if !self.device.is_open() {
            return Err(CameraError::unavailable(
                self.device.device_id(),
                "Device is not open",
            ));
        }

        match self.device.read() {
            Ok(frame) => Ok(frame),
            Err(e) => {
                warn!("Camera read failed: {}", e);
                self.release();
                Err(e)
            }
        }
    }

    /// Close the device; safe to call repeatedly
    pub fn release(&mut self) {
        if self.device.is_open() {
            self.device.release();
            info!("Camera {} released", self.device.device_id());
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.is_open()
    }

    /// Geometry negotiated by the most recent successful open
    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    pub fn device_id(&self) -> &str {
        self.device.device_id()
    }

    /// Successful reopens after the first open
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn sleep_while_running(delay: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + delay;
    loop {
        let now = Instant::now();
        if now >= deadline || !running.load(Ordering::Acquire) {
            return;
        }
        std::thread::sleep((deadline - now).min(SHUTDOWN_POLL));
    }
}
