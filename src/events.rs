use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events reported by the capture pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    /// Motion was detected between two consecutive frames
    MotionDetected {
        intensity: f64,
        timestamp: SystemTime,
    },
    /// A recording session opened its output file
    RecordingStarted {
        path: PathBuf,
        timestamp: SystemTime,
    },
    /// A recording session closed its output file
    RecordingStopped {
        path: PathBuf,
        frames_written: u64,
        timestamp: SystemTime,
    },
    /// The output file for a new session could not be created
    RecordingFailed { path: PathBuf, error: String },
    /// Camera connection status changed
    CameraStatusChanged {
        connected: bool,
        timestamp: SystemTime,
    },
    /// The pipeline stopped on an unrecoverable error
    Fatal { component: String, error: String },
}

impl PipelineEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            PipelineEvent::MotionDetected { intensity, .. } => {
                format!("Motion detected ({:.3}% changed)", intensity)
            }
            PipelineEvent::RecordingStarted { path, .. } => {
                format!("Recording started: {}", path.display())
            }
            PipelineEvent::RecordingStopped {
                path,
                frames_written,
                ..
            } => format!(
                "Recording stopped: {} ({} frames)",
                path.display(),
                frames_written
            ),
            PipelineEvent::RecordingFailed { path, error } => {
                format!("Recording {} failed: {}", path.display(), error)
            }
            PipelineEvent::CameraStatusChanged { connected, .. } => format!(
                "Camera {}",
                if *connected {
                    "connected"
                } else {
                    "disconnected"
                }
            ),
            PipelineEvent::Fatal { component, error } => {
                format!("Fatal error in {}: {}", component, error)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::MotionDetected { .. } => "motion_detected",
            PipelineEvent::RecordingStarted { .. } => "recording_started",
            PipelineEvent::RecordingStopped { .. } => "recording_stopped",
            PipelineEvent::RecordingFailed { .. } => "recording_failed",
            PipelineEvent::CameraStatusChanged { .. } => "camera_status_changed",
            PipelineEvent::Fatal { .. } => "fatal",
        }
    }
}

/// Event bus backed by a broadcast channel. Publishing never blocks, so the
/// capture worker can report from its own thread.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: PipelineEvent) -> usize {
        match &event {
            PipelineEvent::RecordingFailed { .. } => warn!("{}", event.description()),
            PipelineEvent::Fatal { .. } => error!("{}", event.description()),
            PipelineEvent::CameraStatusChanged { connected: false, .. } => {
                warn!("{}", event.description())
            }
            PipelineEvent::MotionDetected { .. } => debug!("{}", event.description()),
            _ => info!("{}", event.description()),
        }

        // No subscribers is not an error for a fire-and-forget report
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
