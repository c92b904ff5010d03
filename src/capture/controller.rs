use super::encode::{VideoWriter, WriterFactory};
use super::naming::FileNamer;
use crate::analyzer::MotionSample;
use crate::config::RecordingConfig;
use crate::error::RecordingError;
use crate::events::{EventBus, PipelineEvent};
use crate::frame::{FrameData, Geometry};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Whether a recording file is currently open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

struct Session {
    writer: Box<dyn VideoWriter>,
    path: PathBuf,
    geometry: Geometry,
}

/// Motion-gated recording state machine.
///
/// A session opens on the first detection while idle and stays open while the
/// most recent detection lies within the cooldown window. At most one writer
/// is open at a time, and every opened writer is finished exactly once.
pub struct RecordingController {
    factory: Box<dyn WriterFactory>,
    namer: FileNamer,
    fps: u32,
    cooldown: Duration,
    last_motion: Option<SystemTime>,
    session: Option<Session>,
    events: Option<EventBus>,
    sessions_opened: u64,
}

impl RecordingController {
    pub fn new(config: &RecordingConfig, factory: Box<dyn WriterFactory>) -> Self {
        Self {
            factory,
            namer: FileNamer::from_config(config),
            fps: config.fps,
            cooldown: config.cooldown(),
            last_motion: None,
            session: None,
            events: None,
            sessions_opened: 0,
        }
    }

    /// Publish session lifecycle events on `events`
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Feed one scored sample together with the frame it was scored on
    pub fn on_sample(&mut self, sample: &MotionSample, frame: &FrameData, now: SystemTime) {
        if let Some(detected_at) = sample.detected_at {
            self.last_motion = Some(match self.last_motion {
                Some(last) if last > detected_at => last,
                _ => detected_at,
            });
        }

        if !self.within_cooldown(now) {
            self.close_session("cooldown elapsed");
            return;
        }

        if let Some(session) = &self.session {
            if session.geometry != frame.geometry() {
                self.close_session("frame geometry changed");
            }
        }

        match self.session.as_mut() {
            Some(session) => {
                if let Err(e) = session.writer.write(frame) {
                    warn!("Recording {} failed: {}", session.path.display(), e);
                    self.close_session("write failed");
                }
            }
            None if sample.is_detected() => self.open_session(frame, now),
            None => {}
        }
    }

    /// Close the session once the cooldown has elapsed without new motion
    pub fn expire(&mut self, now: SystemTime) {
        if self.session.is_some() && !self.within_cooldown(now) {
            self.close_session("cooldown elapsed");
        }
    }

    /// Close the session if the camera came back with a different geometry
    pub fn refresh_geometry(&mut self, geometry: Geometry) {
        if let Some(session) = &self.session {
            if session.geometry != geometry {
                info!(
                    "Camera geometry changed from {} to {}",
                    session.geometry, geometry
                );
                self.close_session("camera geometry changed");
            }
        }
    }

    /// Close any open session; further calls do nothing
    pub fn finish(&mut self) {
        self.close_session("shutdown");
    }

    pub fn state(&self) -> RecordingState {
        if self.session.is_some() {
            RecordingState::Recording
        } else {
            RecordingState::Idle
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    pub fn last_motion(&self) -> Option<SystemTime> {
        self.last_motion
    }

    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened
    }

    fn within_cooldown(&self, now: SystemTime) -> bool {
        match self.last_motion {
            // A detection stamped after `now` counts as zero elapsed time
            Some(last) => now.duration_since(last).unwrap_or_default() < self.cooldown,
            None => false,
        }
    }

    fn open_session(&mut self, frame: &FrameData, now: SystemTime) {
        let geometry = frame.geometry();
        let opened = self
            .namer
            .path_for(now)
            .and_then(|path| {
                let writer = self.factory.open(&path, geometry, self.fps)?;
                Ok((path, writer))
            });

        let (path, mut writer) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                self.report_open_failure(e);
                return;
            }
        };

        self.sessions_opened += 1;
        debug!("Recording started: {} at {}", path.display(), geometry);
        self.publish(PipelineEvent::RecordingStarted {
            path: path.clone(),
            timestamp: now,
        });

        let write_result = writer.write(frame);
        self.session = Some(Session {
            writer,
            path,
            geometry,
        });

        if let Err(e) = write_result {
            warn!("Recording failed on its first frame: {}", e);
            self.close_session("write failed");
        }
    }

    fn report_open_failure(&self, error: RecordingError) {
        let path = match &error {
            RecordingError::WriterOpenFailed { path, .. } => path.clone(),
            _ => self.namer.directory().to_path_buf(),
        };
        warn!("Could not start recording: {}", error);
        self.publish(PipelineEvent::RecordingFailed {
            path,
            error: error.to_string(),
        });
    }

    fn close_session(&mut self, reason: &str) {
        let Some(session) = self.session.take() else {
            return;
        };

        let frames_written = session.writer.frames_written();
        debug!(
            "Closing recording {} ({}): {} frames",
            session.path.display(),
            reason,
            frames_written
        );
        if let Err(e) = session.writer.finish() {
            warn!("Recording {} did not close cleanly: {}", session.path.display(), e);
        }

        debug!("Recording stopped: {}", session.path.display());
        self.publish(PipelineEvent::RecordingStopped {
            path: session.path,
            frames_written,
            timestamp: SystemTime::now(),
        });
    }

    fn publish(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.finish();
    }
}
