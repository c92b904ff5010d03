use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Counters updated by the capture worker and read from any thread
#[derive(Debug, Default)]
pub(crate) struct PipelineCounters {
    pub frames_captured: AtomicU64,
    pub frames_published: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub motion_detections: AtomicU64,
    pub read_failures: AtomicU64,
    pub reconnects: AtomicU64,
    pub sessions_opened: AtomicU64,
    pub negotiations: AtomicU64,
    pub recording: AtomicBool,
}

impl PipelineCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            motion_detections: self.motion_detections.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            negotiations: self.negotiations.load(Ordering::Relaxed),
            recording: self.recording.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time pipeline statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames_captured: u64,
    /// Frames accepted by the display sink
    pub frames_published: u64,
    /// Frames not delivered to a sink: none attached, full, or conversion failed
    pub frames_dropped: u64,
    pub motion_detections: u64,
    pub read_failures: u64,
    pub reconnects: u64,
    pub sessions_opened: u64,
    pub negotiations: u64,
    pub recording: bool,
}
