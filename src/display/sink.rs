use crate::error::DisplayError;
use crate::frame::{DisplayFrame, Geometry, PixelFormat};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Geometry and pixel layout agreed between the pipeline and a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub geometry: Geometry,
    pub pixel_format: PixelFormat,
}

impl VideoFormat {
    pub fn new(geometry: Geometry, pixel_format: PixelFormat) -> Self {
        Self {
            geometry,
            pixel_format,
        }
    }
}

/// Consumer of converted frames, such as a screen or a preview window
pub trait DisplaySink: Send {
    /// The supported format closest to `requested`
    fn nearest_format(&self, requested: VideoFormat) -> Result<VideoFormat, DisplayError>;

    fn start(&mut self, format: VideoFormat) -> Result<(), DisplayError>;

    fn stop(&mut self);

    fn is_active(&self) -> bool;

    /// Hand over one frame without blocking; `Ok(false)` means it was dropped
    fn present(&mut self, frame: DisplayFrame) -> Result<bool, DisplayError>;
}

/// Stop the sink if active, then start it with the closest format it supports
pub fn negotiate(
    sink: &mut dyn DisplaySink,
    requested: VideoFormat,
) -> Result<VideoFormat, DisplayError> {
    if sink.is_active() {
        sink.stop();
    }

    let format = sink.nearest_format(requested)?;
    if format.geometry.is_empty() {
        return Err(DisplayError::Negotiation {
            details: format!("Sink offered empty geometry {}", format.geometry),
        });
    }

    sink.start(format)?;
    info!(
        "Display negotiated {} {:?} (requested {} {:?})",
        format.geometry, format.pixel_format, requested.geometry, requested.pixel_format
    );
    Ok(format)
}

/// Display sink backed by a bounded crossbeam channel.
///
/// Frames are offered with `try_send`, so a slow consumer loses frames
/// instead of stalling capture.
pub struct ChannelSink {
    tx: Sender<DisplayFrame>,
    format: Arc<RwLock<Option<VideoFormat>>>,
    supported: Vec<PixelFormat>,
    fixed_geometry: Option<Geometry>,
}

/// Receiving end of a [`ChannelSink`]
#[derive(Clone)]
pub struct DisplayFeed {
    rx: Receiver<DisplayFrame>,
    format: Arc<RwLock<Option<VideoFormat>>>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, DisplayFeed) {
        let (tx, rx) = channel::bounded(capacity.max(1));
        let format = Arc::new(RwLock::new(None));
        (
            Self {
                tx,
                format: Arc::clone(&format),
                supported: vec![PixelFormat::Rgb32, PixelFormat::Rgb24],
                fixed_geometry: None,
            },
            DisplayFeed { rx, format },
        )
    }

    /// Restrict the pixel formats this sink accepts; the first is preferred
    pub fn with_formats(mut self, formats: Vec<PixelFormat>) -> Self {
        if !formats.is_empty() {
            self.supported = formats;
        }
        self
    }

    /// Accept only this geometry, like a panel with a fixed resolution
    pub fn with_fixed_geometry(mut self, geometry: Geometry) -> Self {
        self.fixed_geometry = Some(geometry);
        self
    }
}

impl DisplaySink for ChannelSink {
    fn nearest_format(&self, requested: VideoFormat) -> Result<VideoFormat, DisplayError> {
        let pixel_format = if self.supported.contains(&requested.pixel_format) {
            requested.pixel_format
        } else {
            *self.supported.first().ok_or_else(|| DisplayError::Negotiation {
                details: "Sink supports no pixel formats".to_string(),
            })?
        };

        Ok(VideoFormat {
            geometry: self.fixed_geometry.unwrap_or(requested.geometry),
            pixel_format,
        })
    }

    fn start(&mut self, format: VideoFormat) -> Result<(), DisplayError> {
        if !self.supported.contains(&format.pixel_format) {
            return Err(DisplayError::Negotiation {
                details: format!("Unsupported pixel format {:?}", format.pixel_format),
            });
        }
        *self.format.write() = Some(format);
        debug!("Channel sink started at {}", format.geometry);
        Ok(())
    }

    fn stop(&mut self) {
        if self.format.write().take().is_some() {
            debug!("Channel sink stopped");
        }
    }

    fn is_active(&self) -> bool {
        self.format.read().is_some()
    }

    fn present(&mut self, frame: DisplayFrame) -> Result<bool, DisplayError> {
        let Some(format) = *self.format.read() else {
            return Err(DisplayError::Negotiation {
                details: "Sink has not been started".to_string(),
            });
        };
        if frame.geometry() != format.geometry || frame.format != format.pixel_format {
            return Err(DisplayError::FormatConversion {
                details: format!(
                    "Frame is {} {:?}, sink expects {} {:?}",
                    frame.geometry(),
                    frame.format,
                    format.geometry,
                    format.pixel_format
                ),
            });
        }

        match self.tx.try_send(frame) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Ok(false),
        }
    }
}

impl DisplayFeed {
    /// Format of the frames currently delivered, if the sink is active
    pub fn format(&self) -> Option<VideoFormat> {
        *self.format.read()
    }

    /// Wait up to `timeout` for a frame.
    ///
    /// Returns `Ok(None)` on timeout and `SinkUnavailable` once the sink has
    /// been dropped and the queue is drained.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<DisplayFrame>, DisplayError> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(DisplayError::SinkUnavailable),
        }
    }

    pub fn try_recv(&self) -> Option<DisplayFrame> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
