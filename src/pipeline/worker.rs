use super::stats::PipelineCounters;
use crate::analyzer::{annotate, MotionDetector};
use crate::camera::FrameSource;
use crate::capture::RecordingController;
use crate::display::{negotiate, DisplayConverter, DisplaySink, VideoFormat};
use crate::error::CameraError;
use crate::events::{EventBus, PipelineEvent};
use crate::frame::{FrameData, Geometry, PixelFormat};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, trace, warn};

/// Pixel format requested from display sinks
pub(crate) const DISPLAY_PIXEL_FORMAT: PixelFormat = PixelFormat::Rgb32;

/// Display slot shared between the control thread and the worker
#[derive(Default)]
pub(crate) struct DisplayState {
    pub sink: Option<Box<dyn DisplaySink>>,
    /// Geometry to request at the next negotiation
    pub target: Option<Geometry>,
    /// Format requested at the last negotiation
    pub requested: Option<VideoFormat>,
    /// Format the sink accepted at the last negotiation
    pub format: Option<VideoFormat>,
}

/// State shared by the pipeline handle and its worker thread
#[derive(Default)]
pub(crate) struct PipelineShared {
    pub running: AtomicBool,
    pub format_negotiated: AtomicBool,
    pub display: Mutex<DisplayState>,
    pub counters: PipelineCounters,
}

/// Components the worker owns while running and hands back when it exits
pub(crate) struct WorkerParts {
    pub source: FrameSource,
    pub controller: RecordingController,
}

pub(crate) struct WorkerExit {
    pub parts: WorkerParts,
    pub result: Result<(), CameraError>,
}

/// What one iteration did with a frame pair
#[derive(Debug)]
pub(crate) struct FrameOutcome {
    pub scored: bool,
    pub detected: bool,
    /// Frame to show, carrying region outlines when enabled
    pub display: FrameData,
}

pub(crate) struct Worker {
    shared: Arc<PipelineShared>,
    detector: MotionDetector,
    draw_regions: bool,
    frame_interval: Duration,
    events: EventBus,
    geometry: Option<Geometry>,
}

impl Worker {
    pub fn new(
        shared: Arc<PipelineShared>,
        detector: MotionDetector,
        frame_interval: Duration,
        events: EventBus,
    ) -> Self {
        let draw_regions = detector.config().draw_regions;
        Self {
            shared,
            detector,
            draw_regions,
            frame_interval,
            events,
            geometry: None,
        }
    }

    /// Run until the running flag is cleared or the camera is lost for good
    pub fn run(mut self, mut parts: WorkerParts) -> WorkerExit {
        info!("Capture worker started");
        let result = self.run_loop(&mut parts);
        match &result {
            Ok(()) => info!("Capture worker stopped"),
            Err(e) => error!("Capture worker stopped on error: {}", e),
        }
        WorkerExit { parts, result }
    }

    fn run_loop(&mut self, parts: &mut WorkerParts) -> Result<(), CameraError> {
        self.geometry = parts.source.geometry();
        let mut previous: Option<FrameData> = None;

        while self.shared.running.load(Ordering::Acquire) {
            if !parts.source.is_open() {
                previous = None;
                match self.reopen(parts) {
                    Ok(()) => {}
                    Err(CameraError::Cancelled { .. }) => break,
                    Err(e) => {
                        self.events.publish(PipelineEvent::Fatal {
                            component: "camera".to_string(),
                            error: e.to_string(),
                        });
                        self.shared.running.store(false, Ordering::Release);
                        return Err(e);
                    }
                }
            }

            let current = match parts.source.read() {
                Ok(frame) => frame,
                Err(e) => {
                    debug!("Frame read failed, reopening: {}", e);
                    PipelineCounters::bump(&self.shared.counters.read_failures);
                    self.events.publish(PipelineEvent::CameraStatusChanged {
                        connected: false,
                        timestamp: SystemTime::now(),
                    });
                    continue;
                }
            };
            PipelineCounters::bump(&self.shared.counters.frames_captured);

            let outcome = self.process_frame(
                previous.take(),
                &current,
                &mut parts.controller,
                SystemTime::now(),
            );
            self.publish(&outcome.display);

            previous = Some(current);

            if !self.frame_interval.is_zero() {
                std::thread::sleep(self.frame_interval);
            }
        }

        Ok(())
    }

    fn reopen(&mut self, parts: &mut WorkerParts) -> Result<(), CameraError> {
        let geometry = parts.source.open(&self.shared.running)?;

        self.shared
            .counters
            .reconnects
            .store(parts.source.reconnects(), Ordering::Relaxed);
        self.events.publish(PipelineEvent::CameraStatusChanged {
            connected: true,
            timestamp: SystemTime::now(),
        });

        parts.controller.refresh_geometry(geometry);
        self.sync_recording_state(&parts.controller);

        if self.geometry != Some(geometry) {
            debug!("Display format must be renegotiated for {}", geometry);
            self.shared.format_negotiated.store(false, Ordering::Release);
            self.geometry = Some(geometry);
        }
        Ok(())
    }

    /// Score `current` against `previous` and drive the recording controller.
    ///
    /// `previous` is recorded, so the recording trails the live view by one
    /// frame. Pairs of differing geometry are never scored.
    pub fn process_frame(
        &self,
        previous: Option<FrameData>,
        current: &FrameData,
        controller: &mut RecordingController,
        now: SystemTime,
    ) -> FrameOutcome {
        let scored = previous.and_then(|prev| {
            if prev.geometry() != current.geometry() {
                trace!(
                    "Skipping scoring across geometry change {} -> {}",
                    prev.geometry(),
                    current.geometry()
                );
                return None;
            }
            match self.detector.score_at(&prev, current, now) {
                Ok(sample) => Some((prev, sample)),
                Err(e) => {
                    warn!("Motion scoring failed: {}", e);
                    None
                }
            }
        });

        let outcome = match scored {
            Some((prev, sample)) => {
                let detected = sample.is_detected();
                if detected {
                    PipelineCounters::bump(&self.shared.counters.motion_detections);
                    self.events.publish(PipelineEvent::MotionDetected {
                        intensity: sample.intensity,
                        timestamp: now,
                    });
                }

                let outline = self.draw_regions && !sample.regions.is_empty();
                let recorded = if outline {
                    annotate(&prev, &sample.regions)
                } else {
                    prev
                };
                controller.on_sample(&sample, &recorded, now);

                let display = if outline {
                    annotate(current, &sample.regions)
                } else {
                    current.clone()
                };
                FrameOutcome {
                    scored: true,
                    detected,
                    display,
                }
            }
            None => {
                controller.expire(now);
                FrameOutcome {
                    scored: false,
                    detected: false,
                    display: current.clone(),
                }
            }
        };

        self.sync_recording_state(controller);
        outcome
    }

    fn sync_recording_state(&self, controller: &RecordingController) {
        let counters = &self.shared.counters;
        counters
            .sessions_opened
            .store(controller.sessions_opened(), Ordering::Relaxed);
        counters
            .recording
            .store(controller.is_recording(), Ordering::Relaxed);
    }

    /// Convert and hand a frame to the attached sink, dropping it on any failure
    pub fn publish(&self, frame: &FrameData) {
        let counters = &self.shared.counters;
        let mut guard = self.shared.display.lock();
        let display = &mut *guard;

        let Some(sink) = display.sink.as_mut() else {
            PipelineCounters::bump(&counters.frames_dropped);
            return;
        };

        if !self.shared.format_negotiated.load(Ordering::Acquire) {
            let requested = VideoFormat::new(
                display.target.unwrap_or_else(|| frame.geometry()),
                DISPLAY_PIXEL_FORMAT,
            );
            display.requested = Some(requested);
            match negotiate(sink.as_mut(), requested) {
                Ok(format) => {
                    display.format = Some(format);
                    PipelineCounters::bump(&counters.negotiations);
                    self.shared.format_negotiated.store(true, Ordering::Release);
                }
                Err(e) => {
                    warn!("Display negotiation failed: {}", e);
                    display.format = None;
                    PipelineCounters::bump(&counters.frames_dropped);
                    return;
                }
            }
        }

        let Some(format) = display.format else {
            PipelineCounters::bump(&counters.frames_dropped);
            return;
        };

        let converted = match DisplayConverter::convert(frame, format.geometry, format.pixel_format)
        {
            Ok(converted) => converted,
            Err(e) => {
                warn!("Display conversion failed: {}", e);
                PipelineCounters::bump(&counters.frames_dropped);
                return;
            }
        };

        match sink.present(converted) {
            Ok(true) => PipelineCounters::bump(&counters.frames_published),
            Ok(false) => {
                trace!("Display sink full, frame {} dropped", frame.id);
                PipelineCounters::bump(&counters.frames_dropped);
            }
            Err(e) => {
                debug!("Display sink rejected frame {}: {}", frame.id, e);
                PipelineCounters::bump(&counters.frames_dropped);
                self.shared.format_negotiated.store(false, Ordering::Release);
            }
        }
    }
}
