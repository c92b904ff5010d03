use super::stats::PipelineStats;
use super::worker::{PipelineShared, Worker, WorkerExit, WorkerParts};
use crate::analyzer::MotionDetector;
use crate::camera::{FrameSource, FrameSourceBuilder};
use crate::capture::{RecordingController, VideoWriterFactory, WriterFactory};
use crate::config::{MotionConfig, MotioncamConfig};
use crate::display::{negotiate, DisplaySink};
use crate::error::{CameraError, DisplayError, MotioncamError, Result};
use crate::events::{EventBus, PipelineEvent};
use crate::frame::Geometry;
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

pub(super) enum WorkerSlot {
    /// Components parked between runs; `None` only if a worker panicked
    Idle(Option<WorkerParts>),
    Running(JoinHandle<WorkerExit>),
}

/// Capture pipeline: camera in, motion-gated recording and display feed out.
///
/// Every method takes `&self`, so the pipeline can be shared with a signal
/// handler that calls [`CapturePipeline::stop`] while `start` is still
/// waiting for the camera.
pub struct CapturePipeline {
    shared: Arc<PipelineShared>,
    motion: MotionConfig,
    frame_interval: Duration,
    events: EventBus,
    pub(super) slot: Mutex<WorkerSlot>,
}

impl CapturePipeline {
    /// Pipeline over explicit components
    pub fn new(
        config: &MotioncamConfig,
        source: FrameSource,
        factory: Box<dyn WriterFactory>,
    ) -> Self {
        let events = EventBus::new(config.pipeline.event_bus_capacity);
        let controller =
            RecordingController::new(&config.recording, factory).with_events(events.clone());

        let shared = Arc::new(PipelineShared::default());
        if let Some((width, height)) = config.display.target_resolution {
            shared.display.lock().target = Some(Geometry::new(width, height));
        }

        Self {
            shared,
            motion: config.motion.clone(),
            frame_interval: config.pipeline.frame_interval(),
            events,
            slot: Mutex::new(WorkerSlot::Idle(Some(WorkerParts { source, controller }))),
        }
    }

    /// Pipeline with the camera backend and writer chosen by configuration
    pub fn from_config(config: &MotioncamConfig) -> Result<Self> {
        let source = FrameSourceBuilder::new()
            .config(config.camera.clone())
            .build()?;
        let factory = Box::new(VideoWriterFactory::new(config.recording.codec));
        Ok(Self::new(config, source, factory))
    }

    /// Open the camera and start the capture worker.
    ///
    /// Blocks while the camera is being opened. Calling `start` on a running
    /// pipeline does nothing.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.slot.lock();
        self.start_locked(&mut slot)
    }

    pub(super) fn start_locked(&self, slot: &mut WorkerSlot) -> Result<()> {
        if self.shared.running.load(Ordering::Acquire) && matches!(*slot, WorkerSlot::Running(_)) {
            debug!("Capture pipeline already running");
            return Ok(());
        }

        let Some(mut parts) = reclaim(slot) else {
            return Err(MotioncamError::system(
                "Capture components were lost when the worker panicked",
            ));
        };

        info!("Starting capture pipeline on {}", parts.source.device_id());
        self.shared.running.store(true, Ordering::Release);

        match parts.source.open(&self.shared.running) {
            Ok(geometry) => {
                parts.controller.refresh_geometry(geometry);
                self.shared
                    .counters
                    .reconnects
                    .store(parts.source.reconnects(), Ordering::Relaxed);
                self.events.publish(PipelineEvent::CameraStatusChanged {
                    connected: true,
                    timestamp: SystemTime::now(),
                });
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                if matches!(e, CameraError::Cancelled { .. }) {
                    warn!("Capture pipeline start aborted: {}", e);
                } else {
                    self.events.publish(PipelineEvent::Fatal {
                        component: "camera".to_string(),
                        error: e.to_string(),
                    });
                }
                *slot = WorkerSlot::Idle(Some(parts));
                return Err(e.into());
            }
        }

        let worker = Worker::new(
            Arc::clone(&self.shared),
            MotionDetector::new(self.motion.clone()),
            self.frame_interval,
            self.events.clone(),
        );

        let spawned = std::thread::Builder::new()
            .name("motioncam-capture".to_string())
            .spawn(move || worker.run(parts));

        match spawned {
            Ok(handle) => {
                *slot = WorkerSlot::Running(handle);
                info!("Capture pipeline started");
                Ok(())
            }
            Err(e) => {
                // The closure and its parts are dropped, releasing the device
                self.shared.running.store(false, Ordering::Release);
                *slot = WorkerSlot::Idle(None);
                Err(MotioncamError::Io(e))
            }
        }
    }

    /// Stop the worker, release the camera and close any open recording.
    ///
    /// Returns once the worker has exited. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut was_running = self.shared.running.swap(false, Ordering::AcqRel);
        let mut slot = self.slot.lock();
        // A start holding the slot may have raised the flag again
        was_running |= self.shared.running.swap(false, Ordering::AcqRel);

        let Some(mut parts) = reclaim(&mut slot) else {
            return;
        };

        let was_open = parts.source.is_open();
        parts.source.release();
        parts.controller.finish();
        self.shared.counters.recording.store(false, Ordering::Relaxed);
        *slot = WorkerSlot::Idle(Some(parts));

        if was_open {
            self.events.publish(PipelineEvent::CameraStatusChanged {
                connected: false,
                timestamp: SystemTime::now(),
            });
        }
        if was_running {
            info!("Capture pipeline stopped");
        }
    }

    /// Geometry requested from the display sink at the next negotiation
    pub fn set_target_geometry(&self, width: u32, height: u32) -> Result<()> {
        let geometry = Geometry::new(width, height);
        if geometry.is_empty() {
            return Err(DisplayError::Negotiation {
                details: format!("Invalid target geometry {}", geometry),
            }
            .into());
        }
        self.shared.display.lock().target = Some(geometry);
        debug!("Display target geometry set to {}", geometry);
        Ok(())
    }

    /// Replace the display sink.
    ///
    /// The previous sink is stopped. If a format was already negotiated, the
    /// new sink is started with the same request right away.
    pub fn set_display_sink(&self, mut sink: Box<dyn DisplaySink>) {
        let mut guard = self.shared.display.lock();
        let display = &mut *guard;

        if let Some(old) = display.sink.as_mut() {
            if old.is_active() {
                old.stop();
            }
        }

        match display.requested {
            Some(requested) if self.shared.format_negotiated.load(Ordering::Acquire) => {
                match negotiate(sink.as_mut(), requested) {
                    Ok(format) => {
                        display.format = Some(format);
                        self.shared.counters.negotiations.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        warn!("New display sink rejected the current format: {}", e);
                        display.format = None;
                        self.shared.format_negotiated.store(false, Ordering::Release);
                    }
                }
            }
            _ => self.shared.format_negotiated.store(false, Ordering::Release),
        }

        display.sink = Some(sink);
        info!("Display sink attached");
    }

    /// Detach the display sink, stopping it; frames are dropped until another is set
    pub fn take_display_sink(&self) -> Option<Box<dyn DisplaySink>> {
        let mut display = self.shared.display.lock();
        let mut sink = display.sink.take()?;
        if sink.is_active() {
            sink.stop();
        }
        display.format = None;
        self.shared.format_negotiated.store(false, Ordering::Release);
        Some(sink)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.counters.snapshot()
    }

    /// Subscribe to pipeline events
    pub fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Take the parked components, joining a worker that has been told to stop
/// or has exited on its own
fn reclaim(slot: &mut WorkerSlot) -> Option<WorkerParts> {
    match std::mem::replace(slot, WorkerSlot::Idle(None)) {
        WorkerSlot::Idle(parts) => parts,
        WorkerSlot::Running(handle) => match handle.join() {
            Ok(WorkerExit { parts, result }) => {
                if let Err(e) = result {
                    debug!("Reclaimed components from failed worker: {}", e);
                }
                Some(parts)
            }
            Err(_) => {
                error!("Capture worker panicked");
                None
            }
        },
    }
}
