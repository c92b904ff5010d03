use super::interface::CameraDevice;
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat, Geometry};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// One scripted read result
#[derive(Debug, Clone)]
pub enum MockRead {
    /// Uniform frame at the current geometry
    Fill(u8),
    /// This exact frame
    Frame(FrameData),
    /// A read failure, as if the device disappeared
    Fail,
}

/// Counters observable after the camera has been moved into a pipeline
#[derive(Debug, Default)]
pub struct MockCameraStats {
    pub opens: AtomicU64,
    pub failed_opens: AtomicU64,
    pub releases: AtomicU64,
    pub reads: AtomicU64,
}

#[derive(Debug, Default)]
struct Script {
    open_failures: u32,
    reopen_failures: u32,
    open_error: Option<CameraError>,
    geometries: VecDeque<Geometry>,
    reads: VecDeque<MockRead>,
}

/// Mock camera for testing without real hardware
pub struct MockCamera {
    script: Mutex<Script>,
    stats: Arc<MockCameraStats>,
    geometry: Geometry,
    read_delay: Duration,
    frame_counter: u64,
    is_open: bool,
}

impl MockCamera {
    /// Camera that opens at `geometry` and then serves black frames
    pub fn new(geometry: Geometry) -> Self {
        Self {
            script: Mutex::new(Script::default()),
            stats: Arc::new(MockCameraStats::default()),
            geometry,
            read_delay: Duration::ZERO,
            frame_counter: 0,
            is_open: false,
        }
    }

    /// Fail the next `count` open attempts
    pub fn with_open_failures(self, count: u32) -> Self {
        self.script.lock().open_failures = count;
        self
    }

    /// Fail `count` open attempts once the first open has succeeded
    pub fn with_reopen_failures(self, count: u32) -> Self {
        self.script.lock().reopen_failures = count;
        self
    }

    /// Fail every open with `error`, as a misconfigured device would
    pub fn with_open_error(self, error: CameraError) -> Self {
        self.script.lock().open_error = Some(error);
        self
    }

    /// Geometry adopted by the next successful reopen
    pub fn with_reopen_geometry(self, geometry: Geometry) -> Self {
        self.script.lock().geometries.push_back(geometry);
        self
    }

    pub fn with_reads<I: IntoIterator<Item = MockRead>>(self, reads: I) -> Self {
        self.script.lock().reads.extend(reads);
        self
    }

    /// Sleep inside every read, like a camera waiting for its next frame
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn stats(&self) -> Arc<MockCameraStats> {
        Arc::clone(&self.stats)
    }

    fn uniform_frame(&mut self, value: u8) -> FrameData {
        self.frame_counter += 1;
        FrameData::new(
            self.frame_counter,
            SystemTime::now(),
            vec![value; self.geometry.pixel_count() * 3],
            self.geometry.width,
            self.geometry.height,
            FrameFormat::Bgr24,
        )
    }
}

impl CameraDevice for MockCamera {
    fn device_id(&self) -> &str {
        "mock"
    }

    fn open(&mut self) -> Result<Geometry, CameraError> {
        let mut script = self.script.lock();
        if let Some(error) = &script.open_error {
            self.stats.failed_opens.fetch_add(1, Ordering::SeqCst);
            return Err(error.clone());
        }
        let reopening = self.stats.opens.load(Ordering::SeqCst) > 0;
        let failures = if reopening {
            &mut script.reopen_failures
        } else {
            &mut script.open_failures
        };
        if *failures > 0 {
            *failures -= 1;
            self.stats.failed_opens.fetch_add(1, Ordering::SeqCst);
            return Err(CameraError::unavailable("mock", "scripted open failure"));
        }

        if reopening {
            if let Some(geometry) = script.geometries.pop_front() {
                self.geometry = geometry;
            }
        }

        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        self.is_open = true;
        Ok(self.geometry)
    }

    fn read(&mut self) -> Result<FrameData, CameraError> {
        if !self.is_open {
            return Err(CameraError::unavailable("mock", "Device is not open"));
        }
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        self.stats.reads.fetch_add(1, Ordering::SeqCst);

        let next = self.script.lock().reads.pop_front();
        match next {
            Some(MockRead::Fill(value)) => Ok(self.uniform_frame(value)),
            Some(MockRead::Frame(frame)) => Ok(frame),
            Some(MockRead::Fail) => Err(CameraError::unavailable("mock", "scripted read failure")),
            None => Ok(self.uniform_frame(0)),
        }
    }

    fn release(&mut self) {
        if self.is_open {
            self.is_open = false;
            self.stats.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
