use super::*;
use crate::config::CameraConfig;
use crate::error::{CameraError, MotioncamError};
use crate::frame::Geometry;
use crate::recovery::RetryPolicy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fast_policy(max_attempts: Option<u32>) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential_backoff: true,
    }
}

fn source_with(camera: MockCamera, max_attempts: Option<u32>) -> FrameSource {
    FrameSourceBuilder::new()
        .device(Box::new(camera))
        .policy(fast_policy(max_attempts))
        .build()
        .unwrap()
}

#[test]
fn test_open_retries_until_success() {
    let camera = MockCamera::new(Geometry::new(32, 24)).with_open_failures(3);
    let stats = camera.stats();
    let mut source = source_with(camera, Some(10));
    let running = AtomicBool::new(true);

    let geometry = source.open(&running).unwrap();
    assert_eq!(geometry, Geometry::new(32, 24));
    assert_eq!(stats.failed_opens.load(Ordering::SeqCst), 3);
    assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
    assert!(source.is_open());
}

#[test]
fn test_open_is_idempotent() {
    let camera = MockCamera::new(Geometry::new(32, 24));
    let stats = camera.stats();
    let mut source = source_with(camera, None);
    let running = AtomicBool::new(true);

    source.open(&running).unwrap();
    source.open(&running).unwrap();
    assert_eq!(stats.opens.load(Ordering::SeqCst), 1);
}

#[test]
fn test_open_gives_up_after_policy_limit() {
    let camera = MockCamera::new(Geometry::new(32, 24)).with_open_failures(100);
    let mut source = source_with(camera, Some(4));
    let running = AtomicBool::new(true);

    match source.open(&running) {
        Err(CameraError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 4),
        other => panic!("expected exhausted retries, got {:?}", other),
    }
    assert!(!source.is_open());
}

#[test]
fn test_configuration_error_is_not_retried() {
    let camera = MockCamera::new(Geometry::new(32, 24)).with_open_error(CameraError::Configuration {
        details: "no such element v4l2src".to_string(),
    });
    let stats = camera.stats();
    let mut source = source_with(camera, None);
    let running = AtomicBool::new(true);

    assert!(matches!(
        source.open(&running),
        Err(CameraError::Configuration { .. })
    ));
    assert_eq!(stats.failed_opens.load(Ordering::SeqCst), 1);
    assert!(!source.is_open());
}

#[test]
fn test_open_aborts_when_running_cleared() {
    let camera = MockCamera::new(Geometry::new(32, 24)).with_open_failures(u32::MAX);
    let mut source = FrameSourceBuilder::new()
        .device(Box::new(camera))
        .policy(RetryPolicy::unbounded(Duration::from_millis(20)))
        .build()
        .unwrap();

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        flag.store(false, Ordering::Release);
    });

    let started = Instant::now();
    let result = source.open(&running);
    stopper.join().unwrap();

    assert!(matches!(result, Err(CameraError::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn test_read_failure_releases_device() {
    let camera = MockCamera::new(Geometry::new(16, 16)).with_reads([MockRead::Fill(1), MockRead::Fail]);
    let stats = camera.stats();
    let mut source = source_with(camera, None);
    let running = AtomicBool::new(true);

    source.open(&running).unwrap();
    assert!(source.read().is_ok());
    assert!(source.read().is_err());
    assert!(!source.is_open());
    assert_eq!(stats.releases.load(Ordering::SeqCst), 1);

    // Reading a closed source fails without touching the device
    assert!(source.read().is_err());
    assert_eq!(stats.reads.load(Ordering::SeqCst), 2);
}

#[test]
fn test_reopen_reports_new_geometry() {
    let camera = MockCamera::new(Geometry::new(16, 16))
        .with_reopen_geometry(Geometry::new(32, 8))
        .with_reads([MockRead::Fail]);
    let mut source = source_with(camera, None);
    let running = AtomicBool::new(true);

    assert_eq!(source.open(&running).unwrap(), Geometry::new(16, 16));
    assert!(source.read().is_err());
    assert_eq!(source.open(&running).unwrap(), Geometry::new(32, 8));
    assert_eq!(source.geometry(), Some(Geometry::new(32, 8)));
    assert_eq!(source.reconnects(), 1);
}

#[test]
fn test_release_is_idempotent_and_runs_on_drop() {
    let camera = MockCamera::new(Geometry::new(8, 8));
    let stats = camera.stats();
    let mut source = source_with(camera, None);
    let running = AtomicBool::new(true);

    source.open(&running).unwrap();
    source.release();
    source.release();
    assert_eq!(stats.releases.load(Ordering::SeqCst), 1);

    source.open(&running).unwrap();
    drop(source);
    assert_eq!(stats.releases.load(Ordering::SeqCst), 2);
}

#[test]
fn test_builder_requires_config_or_device() {
    let result = FrameSourceBuilder::new().build();
    match result {
        Err(MotioncamError::System { message }) => {
            assert!(message.contains("must be specified"))
        }
        Err(e) => panic!("unexpected error: {}", e),
        Ok(_) => panic!("builder without config should fail"),
    }
}

#[test]
fn test_builder_selects_synthetic_device() {
    let config = CameraConfig {
        device: SYNTHETIC_DEVICE.to_string(),
        resolution: Some((64, 48)),
        ..CameraConfig::default()
    };
    let mut source = FrameSourceBuilder::new().config(config).build().unwrap();
    let running = AtomicBool::new(true);

    assert_eq!(source.device_id(), "synthetic");
    assert_eq!(source.open(&running).unwrap(), Geometry::new(64, 48));
}
