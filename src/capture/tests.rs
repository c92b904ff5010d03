use super::*;
use crate::analyzer::MotionSample;
use crate::config::{RecordingCodec, RecordingConfig};
use crate::events::{EventBus, PipelineEvent};
use crate::frame::{FrameData, FrameFormat, Geometry};
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn create_test_config(dir: &TempDir) -> RecordingConfig {
    RecordingConfig {
        path: dir.path().to_string_lossy().to_string(),
        cooldown_seconds: 30,
        fps: 20,
        codec: RecordingCodec::Y4m,
        file_name_template: "%H%M%S".to_string(),
        timezone: "UTC".to_string(),
    }
}

fn create_test_frame(id: u64, width: u32, height: u32) -> FrameData {
    FrameData::new(
        id,
        SystemTime::now(),
        vec![(id % 255) as u8; (width * height * 3) as usize],
        width,
        height,
        FrameFormat::Bgr24,
    )
}

fn at(seconds: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000 + seconds)
}

fn motion(at: SystemTime) -> MotionSample {
    MotionSample {
        intensity: 2.5,
        changed_pixels: 100,
        detected_at: Some(at),
        regions: Vec::new(),
    }
}

fn quiet() -> MotionSample {
    MotionSample {
        intensity: 0.0,
        changed_pixels: 0,
        detected_at: None,
        regions: Vec::new(),
    }
}

fn controller_with(dir: &TempDir, factory: MockWriterFactory) -> RecordingController {
    RecordingController::new(&create_test_config(dir), Box::new(factory))
}

#[test]
fn test_quiet_samples_never_open_a_writer() {
    let dir = TempDir::new().unwrap();
    let factory = MockWriterFactory::new();
    let stats = factory.stats();
    let mut controller = controller_with(&dir, factory);

    for i in 0..5 {
        controller.on_sample(&quiet(), &create_test_frame(i, 8, 8), at(i));
    }
    assert_eq!(controller.state(), RecordingState::Idle);
    assert_eq!(stats.opened.load(Ordering::SeqCst), 0);
}

#[test]
fn test_detection_opens_session_and_writes_trigger_frame() {
    let dir = TempDir::new().unwrap();
    let factory = MockWriterFactory::new();
    let stats = factory.stats();
    let mut controller = controller_with(&dir, factory);

    controller.on_sample(&motion(at(0)), &create_test_frame(1, 8, 8), at(0));
    assert_eq!(controller.state(), RecordingState::Recording);
    assert_eq!(stats.opened.load(Ordering::SeqCst), 1);
    assert_eq!(stats.frame_ids(), vec![1]);

    // Quiet frames inside the cooldown are still recorded
    controller.on_sample(&quiet(), &create_test_frame(2, 8, 8), at(10));
    controller.on_sample(&quiet(), &create_test_frame(3, 8, 8), at(29));
    assert_eq!(stats.frame_ids(), vec![1, 2, 3]);
    assert!(controller.is_recording());

    controller.on_sample(&quiet(), &create_test_frame(4, 8, 8), at(30));
    assert_eq!(controller.state(), RecordingState::Idle);
    assert_eq!(stats.frame_ids(), vec![1, 2, 3]);
    assert_eq!(stats.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_new_motion_extends_session_without_reopening() {
    let dir = TempDir::new().unwrap();
    let factory = MockWriterFactory::new();
    let stats = factory.stats();
    let mut controller = controller_with(&dir, factory);

    controller.on_sample(&motion(at(0)), &create_test_frame(1, 8, 8), at(0));
    controller.on_sample(&motion(at(20)), &create_test_frame(2, 8, 8), at(20));
    controller.on_sample(&quiet(), &create_test_frame(3, 8, 8), at(40));
    assert!(controller.is_recording());
    assert_eq!(controller.last_motion(), Some(at(20)));

    controller.expire(at(49));
    assert!(controller.is_recording());
    controller.expire(at(50));
    assert!(!controller.is_recording());

    assert_eq!(stats.opened.load(Ordering::SeqCst), 1);
    assert_eq!(stats.finished.load(Ordering::SeqCst), 1);
    assert_eq!(controller.sessions_opened(), 1);
}

#[test]
fn test_stale_detection_does_not_move_last_motion_backwards() {
    let dir = TempDir::new().unwrap();
    let mut controller = controller_with(&dir, MockWriterFactory::new());

    controller.on_sample(&motion(at(20)), &create_test_frame(1, 8, 8), at(20));
    controller.on_sample(&motion(at(5)), &create_test_frame(2, 8, 8), at(21));
    assert_eq!(controller.last_motion(), Some(at(20)));
}

#[test]
fn test_at_most_one_writer_open() {
    let dir = TempDir::new().unwrap();
    let factory = MockWriterFactory::new();
    let stats = factory.stats();
    let mut controller = controller_with(&dir, factory);

    for i in 0..100u64 {
        let sample = if i % 7 == 0 { motion(at(i)) } else { quiet() };
        controller.on_sample(&sample, &create_test_frame(i, 8, 8), at(i));
        assert!(stats.active.load(Ordering::SeqCst) <= 1);
    }
    controller.finish();
    assert_eq!(stats.active.load(Ordering::SeqCst), 0);
    assert_eq!(
        stats.opened.load(Ordering::SeqCst),
        stats.finished.load(Ordering::SeqCst)
    );
}

#[test]
fn test_open_failure_stays_idle_until_next_detection() {
    let dir = TempDir::new().unwrap();
    let factory = MockWriterFactory::new().with_open_failures(1);
    let stats = factory.stats();
    let events = EventBus::new(16);
    let mut rx = events.subscribe();
    let mut controller = controller_with(&dir, factory).with_events(events);

    controller.on_sample(&motion(at(0)), &create_test_frame(1, 8, 8), at(0));
    assert!(!controller.is_recording());
    assert!(matches!(
        rx.try_recv(),
        Ok(PipelineEvent::RecordingFailed { .. })
    ));

    // A quiet frame inside the cooldown does not retry
    controller.on_sample(&quiet(), &create_test_frame(2, 8, 8), at(1));
    assert!(!controller.is_recording());
    assert_eq!(stats.failed_opens.load(Ordering::SeqCst), 1);

    controller.on_sample(&motion(at(2)), &create_test_frame(3, 8, 8), at(2));
    assert!(controller.is_recording());
    assert_eq!(stats.opened.load(Ordering::SeqCst), 1);
    assert_eq!(stats.frame_ids(), vec![3]);
}

#[test]
fn test_finish_closes_exactly_once() {
    let dir = TempDir::new().unwrap();
    let factory = MockWriterFactory::new();
    let stats = factory.stats();
    let mut controller = controller_with(&dir, factory);

    controller.on_sample(&motion(at(0)), &create_test_frame(1, 8, 8), at(0));
    controller.finish();
    controller.finish();
    drop(controller);

    assert_eq!(stats.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_drop_finishes_open_session() {
    let dir = TempDir::new().unwrap();
    let factory = MockWriterFactory::new();
    let stats = factory.stats();
    let mut controller = controller_with(&dir, factory);

    controller.on_sample(&motion(at(0)), &create_test_frame(1, 8, 8), at(0));
    drop(controller);
    assert_eq!(stats.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_geometry_change_closes_session() {
    let dir = TempDir::new().unwrap();
    let factory = MockWriterFactory::new();
    let stats = factory.stats();
    let mut controller = controller_with(&dir, factory);

    controller.on_sample(&motion(at(0)), &create_test_frame(1, 8, 8), at(0));
    controller.refresh_geometry(Geometry::new(8, 8));
    assert!(controller.is_recording());

    controller.refresh_geometry(Geometry::new(16, 8));
    assert!(!controller.is_recording());
    assert_eq!(stats.finished.load(Ordering::SeqCst), 1);

    // Still within cooldown, but a new session needs a new detection
    controller.on_sample(&quiet(), &create_test_frame(2, 16, 8), at(1));
    assert!(!controller.is_recording());
    controller.on_sample(&motion(at(2)), &create_test_frame(3, 16, 8), at(2));
    assert!(controller.is_recording());
    assert_eq!(stats.opened.load(Ordering::SeqCst), 2);
}

#[test]
fn test_frame_with_new_geometry_never_reaches_old_writer() {
    let dir = TempDir::new().unwrap();
    let factory = MockWriterFactory::new();
    let stats = factory.stats();
    let mut controller = controller_with(&dir, factory);

    controller.on_sample(&motion(at(0)), &create_test_frame(1, 8, 8), at(0));
    controller.on_sample(&motion(at(1)), &create_test_frame(2, 4, 4), at(1));

    assert_eq!(stats.finished.load(Ordering::SeqCst), 1);
    assert_eq!(stats.opened.load(Ordering::SeqCst), 2);
    assert_eq!(stats.frame_ids(), vec![1, 2]);
}

#[test]
fn test_write_failure_closes_session() {
    let dir = TempDir::new().unwrap();
    let factory = MockWriterFactory::new().with_write_limit(2);
    let stats = factory.stats();
    let mut controller = controller_with(&dir, factory);

    controller.on_sample(&motion(at(0)), &create_test_frame(1, 8, 8), at(0));
    controller.on_sample(&quiet(), &create_test_frame(2, 8, 8), at(1));
    assert!(controller.is_recording());

    controller.on_sample(&quiet(), &create_test_frame(3, 8, 8), at(2));
    assert!(!controller.is_recording());
    assert_eq!(stats.finished.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lifecycle_events_are_published() {
    let dir = TempDir::new().unwrap();
    let events = EventBus::new(16);
    let mut rx = events.subscribe();
    let mut controller = controller_with(&dir, MockWriterFactory::new()).with_events(events);

    controller.on_sample(&motion(at(0)), &create_test_frame(1, 8, 8), at(0));
    controller.on_sample(&quiet(), &create_test_frame(2, 8, 8), at(1));
    controller.expire(at(60));

    let started = match rx.try_recv() {
        Ok(PipelineEvent::RecordingStarted { path, timestamp }) => {
            assert_eq!(timestamp, at(0));
            path
        }
        other => panic!("expected RecordingStarted, got {:?}", other),
    };
    match rx.try_recv() {
        Ok(PipelineEvent::RecordingStopped {
            path,
            frames_written,
            ..
        }) => {
            assert_eq!(path, started);
            assert_eq!(frames_written, 2);
        }
        other => panic!("expected RecordingStopped, got {:?}", other),
    }
}

#[test]
fn test_y4m_recording_is_written_to_disk() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let mut controller = RecordingController::new(
        &config,
        Box::new(VideoWriterFactory::new(RecordingCodec::Y4m)),
    );

    controller.on_sample(&motion(at(0)), &create_test_frame(1, 4, 2), at(0));
    controller.on_sample(&quiet(), &create_test_frame(2, 4, 2), at(1));
    let path = controller.current_path().unwrap().to_path_buf();
    controller.finish();

    assert_eq!(path.file_name().unwrap().to_string_lossy(), "122640.y4m");
    let bytes = std::fs::read(&path).unwrap();
    let header = b"YUV4MPEG2 W4 H2 F20:1 Ip A1:1 C444\n";
    assert!(bytes.starts_with(header));
    let frame_len = b"FRAME\n".len() + 4 * 2 * 3;
    assert_eq!(bytes.len(), header.len() + 2 * frame_len);
    assert_eq!(&bytes[header.len()..header.len() + 6], b"FRAME\n");
}

#[test]
fn test_y4m_writer_rejects_other_geometry() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.y4m");
    let mut writer = Y4mWriter::create(&path, Geometry::new(4, 4), 20).unwrap();

    assert!(writer.write(&create_test_frame(1, 4, 4)).is_ok());
    assert!(writer.write(&create_test_frame(2, 2, 2)).is_err());
    assert_eq!(writer.frames_written(), 1);
    Box::new(writer).finish().unwrap();
}

#[test]
fn test_y4m_converts_black_and_white() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bw.y4m");
    let mut writer = Y4mWriter::create(&path, Geometry::new(2, 1), 10).unwrap();
    let frame = FrameData::new(
        1,
        SystemTime::now(),
        vec![0, 0, 0, 255, 255, 255],
        2,
        1,
        FrameFormat::Bgr24,
    );
    writer.write(&frame).unwrap();
    Box::new(writer).finish().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let planes = &bytes[bytes.len() - 6..];
    assert_eq!(planes, &[16, 235, 128, 128, 128, 128]);
}
