use super::*;
use crate::error::{DisplayError, MotioncamError};
use crate::frame::{DisplayFrame, FrameData, FrameFormat, Geometry, PixelFormat};
use std::time::{Duration, SystemTime};

fn create_test_frame(width: u32, height: u32) -> FrameData {
    // Each pixel encodes its own coordinates: B = x, G = y, R = 200
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[x as u8, y as u8, 200]);
        }
    }
    FrameData::new(9, SystemTime::now(), data, width, height, FrameFormat::Bgr24)
}

fn blank_display_frame(geometry: Geometry, format: PixelFormat) -> DisplayFrame {
    DisplayFrame {
        id: 0,
        timestamp: SystemTime::now(),
        data: vec![0u8; geometry.pixel_count() * format.bytes_per_pixel()],
        width: geometry.width,
        height: geometry.height,
        format,
    }
}

#[test]
fn test_bgr_to_rgb32_layout() {
    let frame = create_test_frame(2, 1);
    let converted =
        DisplayConverter::convert(&frame, Geometry::new(2, 1), PixelFormat::Rgb32).unwrap();

    assert_eq!(converted.id, 9);
    assert_eq!(converted.format, PixelFormat::Rgb32);
    assert_eq!(converted.data, vec![0, 0, 200, 0xff, 1, 0, 200, 0xff]);
}

#[test]
fn test_bgr_to_rgb24_layout() {
    let frame = create_test_frame(1, 1);
    let converted =
        DisplayConverter::convert(&frame, Geometry::new(1, 1), PixelFormat::Rgb24).unwrap();
    assert_eq!(converted.data, vec![200, 0, 0]);
}

#[test]
fn test_downscale_picks_nearest_pixels() {
    let frame = create_test_frame(4, 4);
    let converted =
        DisplayConverter::convert(&frame, Geometry::new(2, 2), PixelFormat::Rgb32).unwrap();

    assert_eq!(converted.geometry(), Geometry::new(2, 2));
    assert_eq!(converted.data.len(), 2 * 2 * 4);
    // Bottom-right output pixel samples source (2, 2)
    assert_eq!(&converted.data[12..16], &[2, 2, 200, 0xff]);
}

#[test]
fn test_upscale_fills_target() {
    let frame = create_test_frame(2, 2);
    let converted =
        DisplayConverter::convert(&frame, Geometry::new(5, 3), PixelFormat::Rgb24).unwrap();
    assert_eq!(converted.data.len(), 5 * 3 * 3);
}

#[test]
fn test_truncated_frame_fails_conversion() {
    let frame = FrameData::new(1, SystemTime::now(), vec![0u8; 5], 2, 2, FrameFormat::Bgr24);
    let result = DisplayConverter::convert(&frame, Geometry::new(2, 2), PixelFormat::Rgb32);
    assert!(matches!(
        result,
        Err(MotioncamError::Display(DisplayError::FormatConversion { .. }))
    ));
}

#[test]
fn test_negotiation_keeps_supported_request() {
    let (mut sink, feed) = ChannelSink::new(2);
    let requested = VideoFormat::new(Geometry::new(64, 48), PixelFormat::Rgb32);

    let format = negotiate(&mut sink, requested).unwrap();
    assert_eq!(format, requested);
    assert!(sink.is_active());
    assert_eq!(feed.format(), Some(requested));
}

#[test]
fn test_negotiation_falls_back_to_sink_preferences() {
    let (sink, _feed) = ChannelSink::new(2);
    let mut sink = sink
        .with_formats(vec![PixelFormat::Rgb24])
        .with_fixed_geometry(Geometry::new(800, 480));

    let format = negotiate(
        &mut sink,
        VideoFormat::new(Geometry::new(640, 480), PixelFormat::Rgb32),
    )
    .unwrap();
    assert_eq!(format.geometry, Geometry::new(800, 480));
    assert_eq!(format.pixel_format, PixelFormat::Rgb24);
}

#[test]
fn test_renegotiation_replaces_active_format() {
    let (mut sink, feed) = ChannelSink::new(2);
    negotiate(
        &mut sink,
        VideoFormat::new(Geometry::new(64, 48), PixelFormat::Rgb32),
    )
    .unwrap();
    negotiate(
        &mut sink,
        VideoFormat::new(Geometry::new(32, 24), PixelFormat::Rgb32),
    )
    .unwrap();
    assert_eq!(feed.format().unwrap().geometry, Geometry::new(32, 24));
}

#[test]
fn test_full_channel_drops_frames() {
    let (mut sink, feed) = ChannelSink::new(2);
    let format = negotiate(
        &mut sink,
        VideoFormat::new(Geometry::new(4, 4), PixelFormat::Rgb32),
    )
    .unwrap();
    let frame = blank_display_frame(format.geometry, format.pixel_format);

    assert!(sink.present(frame.clone()).unwrap());
    assert!(sink.present(frame.clone()).unwrap());
    assert!(!sink.present(frame).unwrap());
    assert_eq!(feed.len(), 2);

    assert!(feed.recv_timeout(Duration::from_millis(10)).unwrap().is_some());
    assert!(feed.try_recv().is_some());
    assert!(feed.recv_timeout(Duration::from_millis(10)).unwrap().is_none());
}

#[test]
fn test_present_requires_started_sink_and_matching_format() {
    let (mut sink, _feed) = ChannelSink::new(2);
    let frame = blank_display_frame(Geometry::new(4, 4), PixelFormat::Rgb32);
    assert!(sink.present(frame.clone()).is_err());

    negotiate(
        &mut sink,
        VideoFormat::new(Geometry::new(8, 8), PixelFormat::Rgb32),
    )
    .unwrap();
    assert!(matches!(
        sink.present(frame),
        Err(DisplayError::FormatConversion { .. })
    ));
}

#[test]
fn test_feed_reports_dropped_sink() {
    let (sink, feed) = ChannelSink::new(1);
    drop(sink);
    assert!(matches!(
        feed.recv_timeout(Duration::from_millis(10)),
        Err(DisplayError::SinkUnavailable)
    ));
}

#[test]
fn test_display_stats_counts_frames_and_negotiations() {
    let mut stats = DisplayStats::default();
    assert!(stats.last_frame_time.is_none());

    stats.record_frame();
    stats.record_frame();
    stats.record_negotiation();
    assert_eq!(stats.frames_presented, 2);
    assert_eq!(stats.negotiations, 1);
    assert!(stats.last_frame_time.is_some());
}
