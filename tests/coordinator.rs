//! Integration tests for the capture coordinator.
//!
//! Every test runs the full caller -> producer -> render -> caller protocol on
//! the memory backend.
//!
//! A fatal condition on a context thread aborts the process, so
//! `test_deferred_geometry_mismatch_aborts` re-runs this test binary and
//! checks how the child exits.

mod common;

use std::sync::atomic::Ordering;
use std::process::Command;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use rstest::rstest;

use common::{test_config, MisreportingCube, TestRig, FACE_SIZE, HEIGHT, TEST_WAIT_SLICE, WIDTH};
use scene_capture::backend::memory::TestPatternRenderer;
use scene_capture::backend::CubeFace;
use scene_capture::{
    CaptureCoordinator, CaptureError, CaptureRequestParams, CaptureStatus, PixelRepresentation,
    SceneCaptureComponentCube,
};

// ============================================================================
// Planar Captures
// ============================================================================

#[test]
fn test_planar_uint8_is_packed_bgr() {
    let rig = TestRig::running(test_config());

    let results = rig.coordinator.capture(vec![rig.color_request(false)], false).unwrap();
    let result = &results[0];

    assert_eq!(result.status, CaptureStatus::Captured);
    assert_eq!((result.width, result.height), (WIDTH, HEIGHT));
    let bytes = result.payload.as_uint8().expect("uint8 payload");
    assert_eq!(bytes.len(), (WIDTH * HEIGHT * 3) as usize);

    // Pixel (x, y) is drawn as r = x, g = y, b = frame.
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            let i = ((y * WIDTH + x) * 3) as usize;
            assert_eq!(bytes[i + 1], y as u8);
            assert_eq!(bytes[i + 2], x as u8);
        }
    }
}

#[test]
fn test_planar_float_is_one_sample_per_pixel() {
    let rig = TestRig::running(test_config());

    let results = rig.coordinator.capture(vec![rig.depth_request()], false).unwrap();
    let floats = results[0].payload.as_float().expect("float payload");

    assert_eq!(floats.len(), (WIDTH * HEIGHT) as usize);
    assert_eq!(floats[0], TestPatternRenderer::planar_depth(0, 0));
    let last = floats[floats.len() - 1];
    assert_eq!(last, TestPatternRenderer::planar_depth(WIDTH - 1, HEIGHT - 1));
}

#[test]
fn test_compressed_capture_decodes_to_capture_size() {
    let rig = TestRig::running(test_config());

    let results = rig
        .coordinator
        .capture(vec![rig.color_request(true), rig.cube_request(true)], false)
        .unwrap();

    let planar = image::load_from_memory(results[0].payload.as_compressed().unwrap()).unwrap();
    assert_eq!(image::GenericImageView::dimensions(&planar), (WIDTH, HEIGHT));

    let cube = image::load_from_memory(results[1].payload.as_compressed().unwrap()).unwrap();
    assert_eq!(image::GenericImageView::dimensions(&cube), (FACE_SIZE * 2, FACE_SIZE));
}

// ============================================================================
// Cube Captures
// ============================================================================

#[test]
fn test_cube_float_is_scaled_to_meters() {
    let rig = TestRig::running(test_config());
    let max = TestPatternRenderer::cube_depth_cm(CubeFace::NegZ) * 0.01;

    // The first batch unwraps faces that were never drawn.
    let first = rig.coordinator.capture(vec![rig.cube_depth_request()], false).unwrap();
    let floats = first[0].payload.as_float().unwrap();
    assert_eq!(floats.len(), (FACE_SIZE * 2 * FACE_SIZE) as usize);
    assert!(floats.iter().all(|v| *v == 0.0));

    let second = rig.coordinator.capture(vec![rig.cube_depth_request()], false).unwrap();
    let result = &second[0];
    assert_eq!((result.width, result.height), (FACE_SIZE * 2, FACE_SIZE));
    let floats = result.payload.as_float().unwrap();
    assert_eq!(floats.len(), (result.width * result.height) as usize);
    assert!(floats.iter().all(|v| *v >= 0.0 && *v <= max));
    assert!(floats.iter().any(|v| *v > 0.0));
}

#[test]
fn test_cube_uint8_lags_one_capture_behind() {
    let rig = TestRig::running(test_config());

    let first = rig.coordinator.capture(vec![rig.cube_request(false)], false).unwrap();
    let bytes = first[0].payload.as_uint8().unwrap();
    assert_eq!(bytes.len(), (FACE_SIZE * 2 * FACE_SIZE * 4) as usize);
    assert!(bytes.iter().all(|b| *b == 0));

    let second = rig.coordinator.capture(vec![rig.cube_request(false)], false).unwrap();
    let bytes = second[0].payload.as_uint8().unwrap();
    // Every texel comes from a face drawn opaque.
    assert!(bytes.chunks_exact(4).all(|bgra| bgra[3] == 255));
}

#[test]
fn test_unwrap_failure_only_fails_its_entry() {
    let rig = TestRig::running(test_config());
    rig.cube_target.fail_next_unwrap();

    let results = rig
        .coordinator
        .capture(vec![rig.color_request(false), rig.cube_request(false)], false)
        .unwrap();

    assert_eq!(results[0].status, CaptureStatus::Captured);
    assert_eq!(results[1].status, CaptureStatus::UnwrapFailed);
    assert!(results[1].payload.is_empty());
    assert_eq!((results[1].width, results[1].height), (FACE_SIZE * 2, FACE_SIZE));
    assert_eq!(rig.coordinator.stats().failed_entries, 1);
}

#[test]
#[should_panic(expected = "unwrapped height")]
fn test_cube_geometry_mismatch_is_fatal() {
    let rig = TestRig::new(test_config());
    let liar = Arc::new(SceneCaptureComponentCube::new(
        "liar",
        Arc::new(MisreportingCube::new(FACE_SIZE)),
    ));
    let params = CaptureRequestParams::cube(liar, PixelRepresentation::Uint8, false);

    // Inline: the assertion unwinds into the caller.
    let _ = rig.coordinator.capture(vec![params], true);
}

const ABORT_CHILD_ENV: &str = "SCENE_CAPTURE_ABORT_CHILD";

#[test]
fn test_deferred_geometry_mismatch_aborts() {
    if std::env::var_os(ABORT_CHILD_ENV).is_some() {
        // Child: the unwrap runs on the producer context, which aborts.
        let rig = TestRig::new(test_config().with_max_wait_slices(50));
        let liar = Arc::new(SceneCaptureComponentCube::new(
            "liar",
            Arc::new(MisreportingCube::new(FACE_SIZE)),
        ));
        let params = CaptureRequestParams::cube(liar, PixelRepresentation::Uint8, false);
        let _ = rig.coordinator.capture(vec![params], false);
        return;
    }

    let status = Command::new(std::env::current_exe().unwrap())
        .args(["test_deferred_geometry_mismatch_aborts", "--exact", "--test-threads=1"])
        .env(ABORT_CHILD_ENV, "1")
        .status()
        .unwrap();

    assert!(!status.success());
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(status.signal(), Some(6), "expected SIGABRT, got {:?}", status);
    }
}

#[rstest]
#[case::float_from_8bit_cube(true)]
#[case::uint8_from_half_cube(false)]
fn test_cube_format_mismatch_fails_entry(#[case] float_from_8bit: bool) {
    let rig = TestRig::running(test_config());
    let request = if float_from_8bit {
        CaptureRequestParams::cube(rig.cube.clone(), PixelRepresentation::Float, false)
    } else {
        CaptureRequestParams::cube(rig.cube_depth.clone(), PixelRepresentation::Uint8, false)
    };

    for _ in 0..2 {
        let results = rig
            .coordinator
            .capture(vec![request.clone(), rig.color_request(false)], false)
            .unwrap();

        assert_eq!(results[0].status, CaptureStatus::FormatMismatch);
        assert!(results[0].payload.is_empty());
        assert_eq!((results[0].width, results[0].height), (FACE_SIZE * 2, FACE_SIZE));
        assert!(results[1].is_captured());
    }
    assert_eq!(rig.coordinator.stats().failed_entries, 2);
}

// ============================================================================
// Readback
// ============================================================================

#[rstest]
#[case::with_fallback(true, CaptureStatus::Captured)]
#[case::without_fallback(false, CaptureStatus::ReadbackFailed)]
fn test_fast_readback_failure(#[case] fallback: bool, #[case] expected: CaptureStatus) {
    let rig = TestRig::running(test_config().with_fallback_to_flushing_readback(fallback));
    rig.color_target.fail_next_fast_reads(1);

    let results = rig.coordinator.capture(vec![rig.color_request(false)], false).unwrap();

    assert_eq!(results[0].status, expected);
    assert_eq!(results[0].payload.is_empty(), !fallback);
    assert_eq!((results[0].width, results[0].height), (WIDTH, HEIGHT));
}

// ============================================================================
// Protocol
// ============================================================================

#[test]
fn test_back_to_back_batches_are_stable() {
    let rig = TestRig::running(test_config());
    let batch = || vec![rig.color_request(false), rig.depth_request(), rig.cube_request(false)];

    let first = rig.coordinator.capture(batch(), false).unwrap();
    let second = rig.coordinator.capture(batch(), false).unwrap();

    for (a, b) in first.iter().zip(&second) {
        assert_eq!((a.width, a.height), (b.width, b.height));
        assert!(b.time_stamp >= a.time_stamp);
    }
    assert_eq!(rig.coordinator.stats().batches, 2);
}

#[test]
fn test_pose_callback_runs_once_per_batch() {
    let rig = TestRig::running(test_config());

    rig.coordinator
        .capture(vec![rig.color_request(false), rig.depth_request()], false)
        .unwrap();
    assert_eq!(rig.poses.load(Ordering::SeqCst), 1);

    rig.coordinator.capture(vec![rig.color_request(false)], false).unwrap();
    assert_eq!(rig.poses.load(Ordering::SeqCst), 2);
}

#[test]
fn test_world_rendering_flag_is_restored() {
    let rig = TestRig::running(test_config());
    rig.engine.viewport().set_disable_world_rendering(true);

    let results = rig.coordinator.capture(vec![rig.color_request(false)], false).unwrap();

    assert!(results[0].is_captured());
    assert!(rig.engine.viewport().is_world_rendering_disabled());
}

#[test]
fn test_overlapping_coordinators_keep_world_rendering_disabled() {
    let rig = TestRig::new(test_config());
    let other = CaptureCoordinator::new(&rig.engine, Arc::new(|| {})).with_config(test_config());
    let viewport = rig.engine.viewport().clone();
    viewport.set_disable_world_rendering(true);

    let (first, second) = std::thread::scope(|s| {
        let first = s.spawn(|| rig.coordinator.capture(vec![rig.color_request(false)], false));
        let second = s.spawn(|| other.capture(vec![rig.depth_request()], false));

        // Both batches hook the same end of draw.
        while viewport.pending_end_draw_hooks() < 2 {
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(!viewport.is_world_rendering_disabled());
        rig.engine.step().unwrap();

        (first.join().unwrap().unwrap(), second.join().unwrap().unwrap())
    });

    assert!(first[0].is_captured());
    assert!(second[0].is_captured());
    assert_eq!(viewport.forced_scopes(), 0);
    assert!(viewport.is_world_rendering_disabled());
}

#[test]
fn test_panicking_pose_callback_does_not_fail_batch() {
    let rig = TestRig::with_pose_callback(test_config(), |n| {
        if n == 1 {
            panic!("pose unavailable");
        }
    });
    rig.engine.start_frame_loop(Duration::from_millis(2)).unwrap();
    rig.engine.viewport().set_disable_world_rendering(true);

    let results = rig.coordinator.capture(vec![rig.color_request(false)], false).unwrap();

    assert!(results[0].is_captured());
    assert!(rig.engine.viewport().is_world_rendering_disabled());
}

#[test]
fn test_slow_frame_waits_past_first_slice() {
    let rig = TestRig::new(test_config());

    let results = std::thread::scope(|s| {
        s.spawn(|| {
            std::thread::sleep(TEST_WAIT_SLICE * 3);
            rig.engine.step().unwrap();
        });
        rig.coordinator.capture(vec![rig.color_request(false)], false)
    })
    .unwrap();

    assert!(rig.coordinator.stats().wait_timeouts >= 1);
    assert!(results[0].is_captured());
    assert_eq!(results[0].payload.as_uint8().unwrap().len(), (WIDTH * HEIGHT * 3) as usize);
}

#[test]
fn test_bounded_wait_times_out_and_recovers() {
    let rig = TestRig::new(test_config().with_max_wait_slices(2));

    let err = rig.coordinator.capture(vec![rig.color_request(false)], false).unwrap_err();
    assert!(matches!(err, CaptureError::Timeout { slices: 2 }));
    assert!(rig.coordinator.is_in_flight());

    let err = rig.coordinator.capture(vec![rig.color_request(false)], false).unwrap_err();
    assert!(matches!(err, CaptureError::BatchInFlight));

    // The abandoned batch completes on the next frame.
    rig.engine.step_and_wait().unwrap();
    assert!(!rig.coordinator.is_in_flight());

    rig.engine.start_frame_loop(Duration::from_millis(2)).unwrap();
    let results = rig.coordinator.capture(vec![rig.color_request(false)], false).unwrap();
    assert!(results[0].is_captured());
}

#[test]
fn test_concurrent_batch_is_rejected() {
    let rig = TestRig::new(test_config());

    std::thread::scope(|s| {
        let first = s.spawn(|| rig.coordinator.capture(vec![rig.color_request(false)], false));

        while !rig.coordinator.is_in_flight() {
            std::thread::sleep(Duration::from_millis(1));
        }
        let err = rig.coordinator.capture(vec![rig.depth_request()], false).unwrap_err();
        assert!(matches!(err, CaptureError::BatchInFlight));

        rig.engine.step().unwrap();
        assert!(first.join().unwrap().unwrap()[0].is_captured());
    });
}

// ============================================================================
// Safe Method
// ============================================================================

#[test]
fn test_safe_method_on_render_context_reads_inline() {
    let rig = TestRig::new(test_config());
    rig.color.capture_scene_deferred();
    rig.cube.capture_scene_deferred();
    rig.engine.step_and_wait().unwrap();

    let (tx, rx) = mpsc::channel();
    let coordinator = rig.coordinator.clone();
    let params = vec![rig.color_request(false), rig.cube_request(false)];
    rig.engine
        .render()
        .enqueue(Box::new(move || {
            let _ = tx.send(coordinator.capture(params, true));
        }))
        .unwrap();

    let results = rx.recv().unwrap().unwrap();
    assert!(results.iter().all(|r| r.is_captured()));
    assert_eq!(results[0].payload.as_uint8().unwrap().len(), (WIDTH * HEIGHT * 3) as usize);
    assert_eq!((results[1].width, results[1].height), (FACE_SIZE * 2, FACE_SIZE));
    // Inline cube captures read the current faces and draw nothing new.
    assert!(results[1].payload.as_uint8().unwrap().chunks_exact(4).all(|p| p[3] == 255));
    assert!(!rig.cube.is_capture_pending());
    assert_eq!(rig.poses.load(Ordering::SeqCst), 0);
}

#[test]
fn test_deferred_capture_on_render_context_is_rejected() {
    let rig = TestRig::new(test_config());

    let (tx, rx) = mpsc::channel();
    let coordinator = rig.coordinator.clone();
    let params = vec![rig.color_request(false)];
    rig.engine
        .render()
        .enqueue(Box::new(move || {
            let _ = tx.send(coordinator.capture(params, false).map(|_| ()));
        }))
        .unwrap();

    let err = rx.recv().unwrap().unwrap_err();
    assert!(matches!(err, CaptureError::ForbiddenContext(name) if name == "render"));
}
