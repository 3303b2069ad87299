//! Integration tests for the display session lifecycle, driven through the
//! command dispatcher exactly as a client's text commands would be.

use std::sync::Arc;
use std::time::{Duration, Instant};

use vdisplay_core::{AccessUnitKind, DisplayGeometry, InputEvent, MotionAction, VirtualDisplayFlags};
use vdisplay_server::application::dispatch::{CommandDispatcher, DEFAULT_BITRATE_KBPS};
use vdisplay_server::application::display_session::{
    DisplayController, SessionError, SessionSettings, SessionState,
};
use vdisplay_server::application::frame_sink::FrameSink;
use vdisplay_server::application::input_injector::InputInjector;
use vdisplay_server::application::privileged_bridge::{DisplayServices, PrivilegedServiceBridge};
use vdisplay_server::application::screenshot::ScreenshotService;
use vdisplay_server::application::video_encoder::EncoderFactory;
use vdisplay_server::infrastructure::platform::simulated::{
    RecordingSink, ScriptedOutput, SimulatedDisplayServices, SimulatedEncoderFactory,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Harness {
    services: Arc<SimulatedDisplayServices>,
    encoders: Arc<SimulatedEncoderFactory>,
    sink: Arc<RecordingSink>,
    controller: Arc<DisplayController>,
    dispatcher: CommandDispatcher,
}

fn harness_with(
    services: SimulatedDisplayServices,
    encoders: SimulatedEncoderFactory,
    join_timeout: Duration,
) -> Harness {
    let services = Arc::new(services);
    let encoders = Arc::new(encoders);
    let sink = Arc::new(RecordingSink::new());
    let bridge = Arc::new(PrivilegedServiceBridge::new(
        Arc::clone(&services) as Arc<dyn DisplayServices>
    ));
    let injector = Arc::new(
        InputInjector::new(Arc::clone(&bridge), Duration::ZERO)
            .with_max_swipe(Duration::from_millis(200)),
    );
    let controller = Arc::new(DisplayController::new(
        Arc::clone(&bridge),
        Arc::clone(&encoders) as Arc<dyn EncoderFactory>,
        Arc::clone(&injector),
        Arc::clone(&sink) as Arc<dyn FrameSink>,
        SessionSettings {
            drain_poll_timeout: Duration::from_millis(5),
            drain_join_timeout: join_timeout,
            ..SessionSettings::default()
        },
    ));
    let dispatcher = CommandDispatcher::new(
        Arc::clone(&controller),
        injector,
        ScreenshotService::default(),
        bridge,
        Arc::clone(&sink) as Arc<dyn FrameSink>,
        DEFAULT_BITRATE_KBPS,
    );
    Harness {
        services,
        encoders,
        sink,
        controller,
        dispatcher,
    }
}

fn harness() -> Harness {
    harness_with(
        SimulatedDisplayServices::new(),
        SimulatedEncoderFactory::synthetic(),
        Duration::from_secs(2),
    )
}

/// Polls `condition` for up to two seconds.
fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ── Create / destroy ──────────────────────────────────────────────────────────

#[test]
fn test_create_destroy_create_leaves_nothing_behind() {
    // Arrange
    let h = harness();

    // Act
    h.dispatcher.handle_line("CREATE_DISPLAY 1080 1920 320 4000");
    assert_eq!(h.controller.state(), SessionState::Streaming);
    h.dispatcher.handle_line("DESTROY_DISPLAY");

    // Assert: idle, every resource released
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(h.controller.display_id().is_none());
    assert!(h.services.live_displays().is_empty());
    let first = h.encoders.last_encoder().unwrap();
    assert!(first.is_released());
    assert!(first.surface_released());
    assert_eq!(first.outstanding_buffers(), 0);

    // A second identical request succeeds.
    h.dispatcher.handle_line("CREATE_DISPLAY 1080 1920 320 4000");
    assert_eq!(h.controller.state(), SessionState::Streaming);
    assert_eq!(h.encoders.created_encoders().len(), 2);
    h.dispatcher.handle_line("STOP");
    assert!(h.services.live_displays().is_empty());
}

#[test]
fn test_odd_size_is_aligned_down_to_multiple_of_eight() {
    let h = harness();

    h.dispatcher.handle_line("CREATE_DISPLAY 1079 2339 320");

    let format = &h.encoders.configured_formats()[0];
    assert_eq!((format.width, format.height), (1072, 2336));
    let display = &h.services.created_displays()[0];
    assert_eq!((display.width, display.height, display.dpi), (1072, 2336, 320));
    h.dispatcher.handle_line("DESTROY_DISPLAY");
}

#[test]
fn test_tiny_size_is_clamped_to_minimum() {
    let h = harness();

    h.dispatcher.handle_line("CREATE_DISPLAY 5 3 160");

    let format = &h.encoders.configured_formats()[0];
    assert!(format.width >= 2 && format.height >= 2);
    assert_eq!(format.width % 2, 0);
    h.dispatcher.handle_line("DESTROY_DISPLAY");
}

#[test]
fn test_display_requests_platform_flags() {
    let h = harness();

    h.dispatcher.handle_line("CREATE_DISPLAY");

    let flags = h.services.created_displays()[0].flags;
    for flag in [
        VirtualDisplayFlags::PUBLIC,
        VirtualDisplayFlags::PRESENTATION,
        VirtualDisplayFlags::OWN_CONTENT_ONLY,
        VirtualDisplayFlags::SUPPORTS_TOUCH,
        VirtualDisplayFlags::ROTATES_WITH_CONTENT,
        VirtualDisplayFlags::TRUSTED,
        VirtualDisplayFlags::OWN_FOCUS,
    ] {
        assert!(flags.contains(flag), "missing flag {flag:#x}");
    }
    h.dispatcher.handle_line("DESTROY_DISPLAY");
}

#[test]
fn test_ensure_display_is_idempotent_while_streaming() {
    let h = harness();

    h.dispatcher.handle_line("CREATE_DISPLAY 1080 1920 320");
    let first = h.controller.active().unwrap();
    h.dispatcher.handle_line("CREATE_DISPLAY 720 1280 240");
    let second = h.controller.active().unwrap();

    assert_eq!(first, second);
    assert_eq!(h.encoders.configured_formats().len(), 1);
    assert_eq!(h.services.created_displays().len(), 1);
    h.dispatcher.handle_line("DESTROY_DISPLAY");
}

#[test]
fn test_release_is_idempotent() {
    let h = harness();

    h.dispatcher.handle_line("DESTROY_DISPLAY");
    h.dispatcher.handle_line("STOP");
    h.dispatcher.handle_line("CREATE_DISPLAY");
    h.dispatcher.handle_line("DESTROY_DISPLAY");
    h.dispatcher.handle_line("DESTROY_DISPLAY");

    assert_eq!(h.controller.state(), SessionState::Idle);
    assert_eq!(h.services.released_displays().len(), 1);
}

// ── Stream ordering ───────────────────────────────────────────────────────────

#[test]
fn test_one_config_group_strictly_before_first_frame() {
    let h = harness();

    h.dispatcher.handle_line("CREATE_DISPLAY 640 480 160");
    assert!(wait_for(|| h
        .sink
        .access_units()
        .iter()
        .filter(|u| u.kind == AccessUnitKind::Frame)
        .count()
        >= 3));
    h.dispatcher.handle_line("DESTROY_DISPLAY");

    let units = h.sink.access_units();
    let first_frame = units
        .iter()
        .position(|u| u.kind == AccessUnitKind::Frame)
        .unwrap();
    assert!(first_frame > 0);
    assert!(units[..first_frame]
        .iter()
        .all(|u| u.kind == AccessUnitKind::Config));
    assert!(units[first_frame..]
        .iter()
        .all(|u| u.kind == AccessUnitKind::Frame));
    assert_eq!(units[0].bytes[4], 0x67);
}

// ── Failure handling ──────────────────────────────────────────────────────────

#[test]
fn test_encoder_start_failure_rolls_back_to_idle() {
    let h = harness_with(
        SimulatedDisplayServices::new(),
        SimulatedEncoderFactory {
            fail_start: true,
            ..SimulatedEncoderFactory::synthetic()
        },
        Duration::from_secs(2),
    );

    let result = h
        .controller
        .ensure_display(DisplayGeometry::new(640, 480, 160), 1_000_000);

    assert!(matches!(result, Err(SessionError::Encoder(_))));
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(h.services.created_displays().is_empty());
    let encoder = h.encoders.last_encoder().unwrap();
    assert!(encoder.surface_released());
    assert!(encoder.is_released());
}

#[test]
fn test_configure_failure_leaves_no_session() {
    let h = harness_with(
        SimulatedDisplayServices::new(),
        SimulatedEncoderFactory {
            fail_configure: true,
            ..SimulatedEncoderFactory::synthetic()
        },
        Duration::from_secs(2),
    );

    h.dispatcher.handle_line("CREATE_DISPLAY");

    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(h.encoders.created_encoders().is_empty());
}

#[test]
fn test_dead_drain_thread_is_replaced_on_next_create() {
    // Arrange: the first encoder fails right after its config
    let h = harness_with(
        SimulatedDisplayServices::new(),
        SimulatedEncoderFactory::scripted(vec![
            ScriptedOutput::FormatChanged(vec![vec![0, 0, 0, 1, 0x67]]),
            ScriptedOutput::Fail("codec reset".to_string()),
        ]),
        Duration::from_secs(2),
    );
    h.dispatcher.handle_line("CREATE_DISPLAY 640 480 160");
    assert!(wait_for(|| !h.controller.is_alive()));
    let dead_id = h.controller.display_id().unwrap();

    // Act
    h.dispatcher.handle_line("CREATE_DISPLAY 640 480 160");

    // Assert
    assert_eq!(h.encoders.created_encoders().len(), 2);
    assert_ne!(h.controller.display_id(), Some(dead_id));
    assert!(h.encoders.created_encoders()[0].is_released());
    assert_eq!(h.services.live_displays().len(), 1);
    h.dispatcher.handle_line("DESTROY_DISPLAY");
}

#[test]
fn test_release_forces_stop_when_drain_ignores_end_of_stream() {
    let h = harness_with(
        SimulatedDisplayServices::new(),
        SimulatedEncoderFactory {
            ignore_end_of_stream: true,
            ..SimulatedEncoderFactory::synthetic()
        },
        Duration::from_millis(50),
    );
    h.dispatcher.handle_line("CREATE_DISPLAY 320 240 160");

    let started = Instant::now();
    h.dispatcher.handle_line("DESTROY_DISPLAY");

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(h.controller.state(), SessionState::Idle);
    let encoder = h.encoders.last_encoder().unwrap();
    assert!(encoder.is_stopped());
    assert!(encoder.is_released());
}

// ── Commands without a session ────────────────────────────────────────────────

#[test]
fn test_screenshot_without_session_reports_error_only() {
    let h = harness();

    h.dispatcher.handle_line("SCREENSHOT");

    assert_eq!(h.sink.text_lines(), vec!["SCREENSHOT_ERROR no_virtual_display"]);
    assert!(h.sink.access_units().is_empty());
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(h.encoders.configured_formats().is_empty());
}

#[test]
fn test_malformed_numbers_change_nothing() {
    let h = harness();

    for line in [
        "CREATE_DISPLAY 1080 x 320",
        "CREATE_DISPLAY 1080 1920",
        "TAP 1 y",
        "SWIPE 0 0 10 10 fast",
        "KEY enter",
    ] {
        h.dispatcher.handle_line(line);
    }

    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(h.encoders.configured_formats().is_empty());
    assert!(h.services.events().is_empty());
    assert!(h.sink.text_lines().is_empty());
    assert!(h.sink.access_units().is_empty());
}

#[test]
fn test_input_injection_failure_keeps_session() {
    let h = harness_with(
        SimulatedDisplayServices {
            fail_inject: true,
            ..SimulatedDisplayServices::new()
        },
        SimulatedEncoderFactory::synthetic(),
        Duration::from_secs(2),
    );
    h.dispatcher.handle_line("CREATE_DISPLAY");

    h.dispatcher.handle_line("TAP 10 10");
    h.dispatcher.handle_line("SWIPE 0 0 100 100 50");

    assert_eq!(h.controller.state(), SessionState::Streaming);
    h.dispatcher.handle_line("DESTROY_DISPLAY");
}

#[test]
fn test_extreme_but_valid_arguments_keep_server_usable() {
    // Arrange
    let h = harness();

    // Act: largest values the grammar accepts
    h.dispatcher
        .handle_line("CREATE_DISPLAY 4294967295 4294967295 4294967295 4294967295");
    h.dispatcher.handle_line("SWIPE 0 0 100 100 18446744073709551615");
    h.dispatcher.handle_line("TAP -2147483648 2147483647");

    // Assert: the session came up with saturated settings
    assert_eq!(h.controller.state(), SessionState::Streaming);
    let format = h.encoders.configured_formats()[0].clone();
    assert_eq!((format.width, format.height), (4_294_967_288, 4_294_967_288));
    assert_eq!(format.bitrate_bps, u32::MAX);

    // The swipe was shortened but still ended at its target.
    let motions: Vec<_> = h
        .services
        .events()
        .into_iter()
        .filter_map(|e| match e {
            InputEvent::Motion(m) => Some(m),
            InputEvent::Key(_) => None,
        })
        .collect();
    let up = motions
        .iter()
        .find(|m| m.action == MotionAction::Up)
        .unwrap();
    assert_eq!((up.x, up.y), (100, 100));

    // The controller still cycles normally afterwards.
    h.dispatcher.handle_line("DESTROY_DISPLAY");
    assert_eq!(h.controller.state(), SessionState::Idle);
    h.dispatcher.handle_line("CREATE_DISPLAY 640 480 160");
    assert_eq!(h.controller.state(), SessionState::Streaming);
    h.dispatcher.handle_line("STOP");
    assert!(h.services.live_displays().is_empty());
}
