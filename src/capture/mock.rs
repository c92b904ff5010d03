use super::encode::{VideoWriter, WriterFactory};
use crate::error::RecordingError;
use crate::frame::{FrameData, Geometry};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters shared between a mock factory and its writers
#[derive(Debug, Default)]
pub struct MockWriterStats {
    pub opened: AtomicU64,
    pub failed_opens: AtomicU64,
    pub finished: AtomicU64,
    pub frames: AtomicU64,
    /// Writers currently open
    pub active: AtomicU64,
    paths: Mutex<Vec<PathBuf>>,
    frame_ids: Mutex<Vec<u64>>,
}

impl MockWriterStats {
    /// Paths of every writer opened so far
    pub fn paths(&self) -> Vec<PathBuf> {
        self.paths.lock().clone()
    }

    /// Ids of every frame written, across all sessions
    pub fn frame_ids(&self) -> Vec<u64> {
        self.frame_ids.lock().clone()
    }
}

/// Writer factory that records calls instead of touching the filesystem
pub struct MockWriterFactory {
    stats: Arc<MockWriterStats>,
    open_failures: u32,
    fail_writes_after: Option<u64>,
}

impl MockWriterFactory {
    pub fn new() -> Self {
        Self {
            stats: Arc::new(MockWriterStats::default()),
            open_failures: 0,
            fail_writes_after: None,
        }
    }

    /// Fail the next `count` opens
    pub fn with_open_failures(mut self, count: u32) -> Self {
        self.open_failures = count;
        self
    }

    /// Writers reject every frame after their first `count`
    pub fn with_write_limit(mut self, count: u64) -> Self {
        self.fail_writes_after = Some(count);
        self
    }

    pub fn stats(&self) -> Arc<MockWriterStats> {
        Arc::clone(&self.stats)
    }
}

impl Default for MockWriterFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl WriterFactory for MockWriterFactory {
    fn open(
        &mut self,
        path: &Path,
        geometry: Geometry,
        _fps: u32,
    ) -> Result<Box<dyn VideoWriter>, RecordingError> {
        if self.open_failures > 0 {
            self.open_failures -= 1;
            self.stats.failed_opens.fetch_add(1, Ordering::SeqCst);
            return Err(RecordingError::WriterOpenFailed {
                path: path.to_path_buf(),
                details: "scripted open failure".to_string(),
            });
        }

        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        self.stats.active.fetch_add(1, Ordering::SeqCst);
        self.stats.paths.lock().push(path.to_path_buf());

        Ok(Box::new(MockWriter {
            path: path.to_path_buf(),
            geometry,
            frames: 0,
            fail_after: self.fail_writes_after,
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MockWriter {
    path: PathBuf,
    geometry: Geometry,
    frames: u64,
    fail_after: Option<u64>,
    stats: Arc<MockWriterStats>,
}

impl VideoWriter for MockWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, frame: &FrameData) -> Result<(), RecordingError> {
        if frame.geometry() != self.geometry {
            return Err(RecordingError::WriteFailed {
                details: format!("geometry {} != {}", frame.geometry(), self.geometry),
            });
        }
        if self.fail_after.map_or(false, |limit| self.frames >= limit) {
            return Err(RecordingError::WriteFailed {
                details: "scripted write failure".to_string(),
            });
        }
        self.frames += 1;
        self.stats.frames.fetch_add(1, Ordering::SeqCst);
        self.stats.frame_ids.lock().push(frame.id);
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }

    fn finish(self: Box<Self>) -> Result<(), RecordingError> {
        self.stats.finished.fetch_add(1, Ordering::SeqCst);
        self.stats.active.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
