use crate::config::RecordingCodec;
use crate::error::RecordingError;
use crate::frame::{FrameData, Geometry};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[cfg(all(target_os = "linux", feature = "video_encoding"))]
use gstreamer::prelude::*;
#[cfg(all(target_os = "linux", feature = "video_encoding"))]
use gstreamer::Pipeline;
#[cfg(all(target_os = "linux", feature = "video_encoding"))]
use gstreamer_app::AppSrc;

/// An open output file receiving frames of one fixed geometry
pub trait VideoWriter: Send {
    fn path(&self) -> &Path;

    /// Append one frame; frames of any other geometry are rejected
    fn write(&mut self, frame: &FrameData) -> Result<(), RecordingError>;

    fn frames_written(&self) -> u64;

    /// Flush and close the file
    fn finish(self: Box<Self>) -> Result<(), RecordingError>;
}

/// Creates writers for new recording sessions
pub trait WriterFactory: Send {
    fn open(
        &mut self,
        path: &Path,
        geometry: Geometry,
        fps: u32,
    ) -> Result<Box<dyn VideoWriter>, RecordingError>;
}

/// Factory choosing the writer backend from the configured codec
pub struct VideoWriterFactory {
    codec: RecordingCodec,
}

impl VideoWriterFactory {
    pub fn new(codec: RecordingCodec) -> Self {
        Self { codec }
    }
}

impl WriterFactory for VideoWriterFactory {
    fn open(
        &mut self,
        path: &Path,
        geometry: Geometry,
        fps: u32,
    ) -> Result<Box<dyn VideoWriter>, RecordingError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| open_failed(path, e))?;
        }

        match self.codec {
            RecordingCodec::Y4m => Ok(Box::new(Y4mWriter::create(path, geometry, fps)?)),
            RecordingCodec::Mpeg1 | RecordingCodec::H264 => {
                #[cfg(all(target_os = "linux", feature = "video_encoding"))]
                {
                    Ok(Box::new(GstVideoWriter::create(
                        path, geometry, fps, self.codec,
                    )?))
                }

                #[cfg(not(all(target_os = "linux", feature = "video_encoding")))]
                {
                    Err(RecordingError::WriterOpenFailed {
                        path: path.to_path_buf(),
                        details: format!(
                            "{:?} encoding not available in this build, use codec = \"y4m\"",
                            self.codec
                        ),
                    })
                }
            }
        }
    }
}

fn open_failed<E: std::fmt::Display>(path: &Path, e: E) -> RecordingError {
    RecordingError::WriterOpenFailed {
        path: path.to_path_buf(),
        details: e.to_string(),
    }
}

fn check_geometry(expected: Geometry, frame: &FrameData) -> Result<(), RecordingError> {
    if frame.geometry() != expected {
        return Err(RecordingError::WriteFailed {
            details: format!(
                "Frame {} is {}, recording is {}",
                frame.id,
                frame.geometry(),
                expected
            ),
        });
    }
    if !frame.validate_size() {
        return Err(RecordingError::WriteFailed {
            details: format!("Frame {} buffer is truncated", frame.id),
        });
    }
    Ok(())
}

/// Uncompressed YUV4MPEG2 writer, 4:4:4 studio range
pub struct Y4mWriter {
    path: PathBuf,
    out: BufWriter<File>,
    geometry: Geometry,
    frames: u64,
}

impl Y4mWriter {
    pub fn create(path: &Path, geometry: Geometry, fps: u32) -> Result<Self, RecordingError> {
        let file = File::create(path).map_err(|e| open_failed(path, e))?;
        let mut out = BufWriter::new(file);
        writeln!(
            out,
            "YUV4MPEG2 W{} H{} F{}:1 Ip A1:1 C444",
            geometry.width, geometry.height, fps
        )
        .map_err(|e| open_failed(path, e))?;

        debug!("Opened Y4M writer {} at {}", path.display(), geometry);
        Ok(Self {
            path: path.to_path_buf(),
            out,
            geometry,
            frames: 0,
        })
    }
}

impl VideoWriter for Y4mWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, frame: &FrameData) -> Result<(), RecordingError> {
        check_geometry(self.geometry, frame)?;

        let pixels = self.geometry.pixel_count();
        let mut planes = vec![0u8; pixels * 3];
        let (y_plane, chroma) = planes.split_at_mut(pixels);
        let (cb_plane, cr_plane) = chroma.split_at_mut(pixels);

        let (ro, go, bo) = frame.format.channel_offsets();
        let bpp = frame.format.bytes_per_pixel();
        let mut i = 0;
        for row in 0..frame.height {
            for px in frame.row(row).chunks_exact(bpp) {
                let (r, g, b) = (px[ro] as i32, px[go] as i32, px[bo] as i32);
                y_plane[i] = (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16) as u8;
                cb_plane[i] = (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128) as u8;
                cr_plane[i] = (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128) as u8;
                i += 1;
            }
        }

        self.out
            .write_all(b"FRAME\n")
            .and_then(|_| self.out.write_all(&planes))
            .map_err(|e| RecordingError::WriteFailed {
                details: format!("{}: {}", self.path.display(), e),
            })?;

        self.frames += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }

    fn finish(mut self: Box<Self>) -> Result<(), RecordingError> {
        self.out.flush().map_err(|e| RecordingError::FinishFailed {
            details: format!("{}: {}", self.path.display(), e),
        })?;
        info!(
            "Y4M recording {} closed: {} frames",
            self.path.display(),
            self.frames
        );
        Ok(())
    }
}

/// Compressed writer feeding raw BGR frames through a GStreamer encoder
#[cfg(all(target_os = "linux", feature = "video_encoding"))]
pub struct GstVideoWriter {
    path: PathBuf,
    pipeline: Pipeline,
    appsrc: AppSrc,
    geometry: Geometry,
    fps: u32,
    frames: u64,
    finished: bool,
}

#[cfg(all(target_os = "linux", feature = "video_encoding"))]
impl GstVideoWriter {
    pub fn create(
        path: &Path,
        geometry: Geometry,
        fps: u32,
        codec: RecordingCodec,
    ) -> Result<Self, RecordingError> {
        gstreamer::init()
            .map_err(|e| open_failed(path, format!("Failed to initialize GStreamer: {}", e)))?;

        let encoder = match codec {
            RecordingCodec::H264 => {
                "videoconvert ! video/x-raw,format=I420 ! \
                 x264enc speed-preset=veryfast tune=zerolatency ! \
                 h264parse ! mp4mux"
            }
            _ => {
                "videoconvert ! video/x-raw,format=I420 ! \
                 avenc_mpeg1video compliance=unofficial ! avimux"
            }
        };

        let pipeline_desc = format!(
            "appsrc name=src format=time is-live=false \
             caps=video/x-raw,format=BGR,width={},height={},framerate={}/1 ! \
             {} ! filesink name=sink",
            geometry.width, geometry.height, fps, encoder
        );
        debug!("Recording pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| open_failed(path, format!("Failed to create pipeline: {}", e)))?
            .downcast::<Pipeline>()
            .map_err(|_| open_failed(path, "Failed to downcast to Pipeline"))?;

        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| open_failed(path, "Failed to get appsrc element"))?
            .downcast::<AppSrc>()
            .map_err(|_| open_failed(path, "Failed to downcast to AppSrc"))?;

        // Set programmatically so names with spaces need no quoting
        let sink = pipeline
            .by_name("sink")
            .ok_or_else(|| open_failed(path, "Failed to get filesink element"))?;
        sink.set_property("location", path.to_string_lossy().to_string());

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| open_failed(path, format!("Failed to start pipeline: {}", e)))?;

        info!(
            "Opened {:?} recording {} at {} {} fps",
            codec,
            path.display(),
            geometry,
            fps
        );

        Ok(Self {
            path: path.to_path_buf(),
            pipeline,
            appsrc,
            geometry,
            fps,
            frames: 0,
            finished: false,
        })
    }

    /// Copy a frame into GStreamer's 4-byte aligned BGR row layout
    fn bgr_buffer(&self, frame: &FrameData) -> Vec<u8> {
        let row_bytes = self.geometry.width as usize * 3;
        let stride = (row_bytes + 3) & !3;
        let mut out = vec![0u8; stride * self.geometry.height as usize];
        let (ro, go, bo) = frame.format.channel_offsets();

        for y in 0..frame.height {
            let dst = &mut out[y as usize * stride..y as usize * stride + row_bytes];
            for (d, s) in dst.chunks_exact_mut(3).zip(frame.row(y).chunks_exact(3)) {
                d[0] = s[bo];
                d[1] = s[go];
                d[2] = s[ro];
            }
        }
        out
    }

    fn check_bus(&self) -> Result<(), RecordingError> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        if let Some(msg) = bus.pop_filtered(&[gstreamer::MessageType::Error]) {
            if let gstreamer::MessageView::Error(err) = msg.view() {
                return Err(RecordingError::WriteFailed {
                    details: format!(
                        "Encoder error: {} ({})",
                        err.error(),
                        err.debug().unwrap_or_default()
                    ),
                });
            }
        }
        Ok(())
    }
}

#[cfg(all(target_os = "linux", feature = "video_encoding"))]
impl VideoWriter for GstVideoWriter {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&mut self, frame: &FrameData) -> Result<(), RecordingError> {
        check_geometry(self.geometry, frame)?;
        self.check_bus()?;

        let frame_ns = 1_000_000_000u64 / self.fps as u64;
        let mut buffer = gstreamer::Buffer::from_mut_slice(self.bgr_buffer(frame));
        if let Some(buffer_ref) = buffer.get_mut() {
            buffer_ref.set_pts(gstreamer::ClockTime::from_nseconds(self.frames * frame_ns));
            buffer_ref.set_duration(gstreamer::ClockTime::from_nseconds(frame_ns));
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| RecordingError::WriteFailed {
                details: format!("Failed to push buffer: {:?}", e),
            })?;

        self.frames += 1;
        if self.frames % 100 == 0 {
            debug!("Encoded {} frames into {}", self.frames, self.path.display());
        }
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }

    fn finish(mut self: Box<Self>) -> Result<(), RecordingError> {
        let drained = self.drain();

        // The pipeline goes to Null on every path, including a failed drain
        let stopped = self
            .pipeline
            .set_state(gstreamer::State::Null)
            .map(|_| ())
            .map_err(|e| RecordingError::FinishFailed {
                details: format!("Failed to stop pipeline: {}", e),
            });
        self.finished = stopped.is_ok();

        drained?;
        stopped?;

        info!(
            "Recording {} closed: {} frames",
            self.path.display(),
            self.frames
        );
        Ok(())
    }
}

#[cfg(all(target_os = "linux", feature = "video_encoding"))]
impl GstVideoWriter {
    /// Send EOS and wait for the muxer to flush the file
    fn drain(&self) -> Result<(), RecordingError> {
        self.appsrc
            .end_of_stream()
            .map_err(|e| RecordingError::FinishFailed {
                details: format!("Failed to signal EOS: {:?}", e),
            })?;

        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        for msg in bus.iter_timed(gstreamer::ClockTime::from_seconds(30)) {
            match msg.view() {
                gstreamer::MessageView::Eos(..) => break,
                gstreamer::MessageView::Error(err) => {
                    return Err(RecordingError::FinishFailed {
                        details: format!(
                            "Encoder error: {} ({})",
                            err.error(),
                            err.debug().unwrap_or_default()
                        ),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(all(target_os = "linux", feature = "video_encoding"))]
impl Drop for GstVideoWriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.pipeline.set_state(gstreamer::State::Null);
        }
    }
}

#[cfg(all(test, target_os = "linux", feature = "video_encoding"))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_failed_drain_still_stops_pipeline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.avi");
        let writer = match GstVideoWriter::create(
            &path,
            Geometry::new(64, 48),
            20,
            RecordingCodec::Mpeg1,
        ) {
            Ok(writer) => writer,
            Err(e) => {
                eprintln!("Skipping, encoder unavailable: {}", e);
                return;
            }
        };
        let pipeline = writer.pipeline.clone();

        // A stopped appsrc refuses EOS
        pipeline.set_state(gstreamer::State::Ready).unwrap();
        assert!(Box::new(writer).finish().is_err());

        assert_eq!(pipeline.current_state(), gstreamer::State::Null);
    }
}
