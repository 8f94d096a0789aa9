use ally_common::{Viewport, WaitUntil};
use ally_drivers::testing::{DriverCall, ScriptedDriver};
use ally_drivers::MouseButton;
use ally_tools::ComputerTool;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use std::sync::Arc;

fn tool(driver: &ScriptedDriver) -> ComputerTool {
    ComputerTool::new(Arc::new(driver.clone()), Viewport::new(800, 600), true, None)
}

fn key(name: &str) -> String {
    name.to_string()
}

#[tokio::test]
async fn out_of_bounds_coordinates_touch_nothing() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    let mut computer = tool(&driver);

    for action in ["mouse_move", "left_click", "double_click"] {
        let result = computer
            .call(&json!({"action": action, "coordinate": [801, 10]}))
            .await;
        assert_eq!(
            result.error.as_deref(),
            Some("Coordinate (801,10) is outside viewport bounds (800x600). Please use coordinates within the visible area. Please try again with a valid command.")
        );
    }
    assert!(driver.calls().is_empty());
    assert_eq!(computer.cursor(), (0, 0));
}

#[tokio::test]
async fn coordinates_are_validated_in_order() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    let mut computer = tool(&driver);

    let missing = computer.call(&json!({"action": "mouse_move"})).await;
    assert!(missing
        .error
        .unwrap()
        .starts_with("Coordinate is required for 'mouse_move'."));

    let shape = computer
        .call(&json!({"action": "mouse_move", "coordinate": [1, 2, 3]}))
        .await;
    assert!(shape
        .error
        .unwrap()
        .starts_with("Coordinate must have exactly 2 elements (x,y), got 3."));

    let negative = computer
        .call(&json!({"action": "left_click", "coordinate": [-1, 2]}))
        .await;
    assert!(negative
        .error
        .unwrap()
        .starts_with("Coordinate elements must be non-negative numbers."));

    let not_a_list = computer
        .call(&json!({"action": "left_click", "coordinate": "10,10"}))
        .await;
    assert!(not_a_list
        .error
        .unwrap()
        .starts_with("Coordinate must be a list or tuple of [x,y], got string."));

    let with_text = computer
        .call(&json!({"action": "right_click", "coordinate": [1, 1], "text": "x"}))
        .await;
    assert_eq!(
        with_text.error.as_deref(),
        Some("Text parameter is not accepted for 'right_click' action. Please try again with a valid command.")
    );
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn mouse_move_truncates_and_tracks_cursor() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    let mut computer = tool(&driver);

    let result = computer
        .call(&json!({"action": "mouse_move", "coordinate": [120.9, 800.0 - 300.5]}))
        .await;
    assert_eq!(result.output.as_deref(), Some("Moved cursor to (120,499)"));
    assert_eq!(computer.cursor(), (120, 499));
    assert_eq!(driver.calls(), vec![DriverCall::MouseMove { x: 120, y: 499 }]);

    let pos = computer.call(&json!({"action": "cursor_position"})).await;
    assert_eq!(pos.output.as_deref(), Some("Cursor position: X=120, Y=499"));
}

#[tokio::test]
async fn clicks_move_then_click_then_capture() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    let mut computer = tool(&driver);

    let result = computer
        .call(&json!({"action": "double_click", "coordinate": [800, 600]}))
        .await;
    assert!(result.error.is_none());
    assert!(result.base64_image.is_some());
    assert_eq!(
        driver.calls(),
        vec![
            DriverCall::MouseMove { x: 800, y: 600 },
            DriverCall::MouseClick {
                x: 800,
                y: 600,
                button: MouseButton::Left,
                count: 2
            },
            DriverCall::WaitForReady(None),
            DriverCall::Screenshot,
        ]
    );
}

#[tokio::test]
async fn click_without_coordinate_uses_cursor() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    let mut computer = tool(&driver);
    computer
        .call(&json!({"action": "mouse_move", "coordinate": [5, 6]}))
        .await;
    driver.clear_calls();

    computer.call(&json!({"action": "middle_click"})).await;
    assert_eq!(
        driver.calls()[1],
        DriverCall::MouseClick {
            x: 5,
            y: 6,
            button: MouseButton::Middle,
            count: 1
        }
    );
}

#[tokio::test]
async fn drag_is_not_implemented() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    let mut computer = tool(&driver);

    let result = computer
        .call(&json!({"action": "left_click_drag", "coordinate": [10, 10]}))
        .await;
    assert_eq!(
        result.error.as_deref(),
        Some("The left_click_drag action is not implemented yet. Please use mouse_move followed by left_click instead. Please try again with a valid command.")
    );
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn key_chord_releases_in_reverse_order() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    let mut computer = tool(&driver);

    let result = computer
        .call(&json!({"action": "key", "text": "ctrl+shift+t"}))
        .await;
    assert_eq!(result.output.as_deref(), Some("Pressed key: ctrl+shift+t"));
    assert_eq!(
        driver.calls(),
        vec![
            DriverCall::KeyDown(key("Control")),
            DriverCall::KeyDown(key("Shift")),
            DriverCall::KeyPress(key("t")),
            DriverCall::KeyUp(key("Shift")),
            DriverCall::KeyUp(key("Control")),
        ]
    );
}

#[tokio::test]
async fn failed_main_key_still_releases_modifiers() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    driver.fail_on(DriverCall::KeyPress(key("Enter")), "key dispatch failed");
    let mut computer = tool(&driver);

    let result = computer
        .call(&json!({"action": "key", "text": "cmd+alt+Return"}))
        .await;
    assert_eq!(
        result.error.as_deref(),
        Some("Error pressing key 'Return': key dispatch failed Please try again with a valid command.")
    );
    assert_eq!(
        driver.calls(),
        vec![
            DriverCall::KeyDown(key("Meta")),
            DriverCall::KeyDown(key("Alt")),
            DriverCall::KeyPress(key("Enter")),
            DriverCall::KeyUp(key("Alt")),
            DriverCall::KeyUp(key("Meta")),
        ]
    );
}

#[tokio::test]
async fn failed_release_still_releases_remaining_modifiers() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    driver.fail_on(DriverCall::KeyUp(key("Shift")), "release lost");
    let mut computer = tool(&driver);

    let result = computer
        .call(&json!({"action": "key", "text": "ctrl+shift+t"}))
        .await;
    assert_eq!(
        result.error.as_deref(),
        Some("Error pressing key 't': release lost Please try again with a valid command.")
    );
    assert_eq!(
        driver.calls(),
        vec![
            DriverCall::KeyDown(key("Control")),
            DriverCall::KeyDown(key("Shift")),
            DriverCall::KeyPress(key("t")),
            DriverCall::KeyUp(key("Shift")),
            DriverCall::KeyUp(key("Control")),
        ]
    );
}

#[tokio::test]
async fn failed_modifier_releases_only_pressed_ones() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    driver.fail_on(DriverCall::KeyDown(key("Shift")), "stuck");
    let mut computer = tool(&driver);

    let result = computer.call(&json!({"action": "key", "text": "ctrl+shift+a"})).await;
    assert!(result.error.is_some());
    assert_eq!(
        driver.calls(),
        vec![
            DriverCall::KeyDown(key("Control")),
            DriverCall::KeyDown(key("Shift")),
            DriverCall::KeyUp(key("Control")),
        ]
    );
}

#[tokio::test]
async fn unknown_keys_are_rejected_before_pressing() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    let mut computer = tool(&driver);

    let result = computer.call(&json!({"action": "key", "text": "ctrl+Hyper_L"})).await;
    assert_eq!(
        result.error.as_deref(),
        Some("Unrecognized key: 'Hyper_L'. Please use a standard key name. Please try again with a valid command.")
    );
    let result = computer.call(&json!({"action": "key", "text": "super+a"})).await;
    assert!(result.error.unwrap().starts_with("Invalid modifier key: 'super'."));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn key_and_type_check_text_parameter() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    let mut computer = tool(&driver);

    let missing = computer.call(&json!({"action": "type"})).await;
    assert!(missing
        .error
        .unwrap()
        .starts_with("Text parameter is required for 'type' action."));

    let with_coordinate = computer
        .call(&json!({"action": "key", "text": "a", "coordinate": [1, 1]}))
        .await;
    assert!(with_coordinate
        .error
        .unwrap()
        .starts_with("Coordinate parameter is not accepted for 'key' action."));

    let number = computer.call(&json!({"action": "type", "text": 42})).await;
    assert!(number.error.unwrap().starts_with("Text must be a string, got number."));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn typing_goes_out_in_fifty_character_chunks() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    let mut computer = tool(&driver);
    let text = "x".repeat(120);

    let result = computer.call(&json!({"action": "type", "text": text})).await;
    assert!(result.base64_image.is_some());

    let typed: Vec<String> = driver
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            DriverCall::Type(t) => Some(t),
            _ => None,
        })
        .collect();
    assert_eq!(
        typed.iter().map(String::len).collect::<Vec<_>>(),
        vec![50, 50, 20]
    );
    assert_eq!(typed.concat(), text);
}

#[tokio::test]
async fn screenshot_waits_for_configured_state_first() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    let mut computer = ComputerTool::new(
        Arc::new(driver.clone()),
        Viewport::new(800, 600),
        false,
        Some(WaitUntil::NetworkIdle),
    );

    let result = computer.call(&json!({"action": "screenshot"})).await;
    assert!(result.output.is_none());
    assert!(result.error.is_none());
    assert_eq!(
        driver.calls(),
        vec![
            DriverCall::WaitForReady(Some(WaitUntil::NetworkIdle)),
            DriverCall::WaitForReady(None),
            DriverCall::Screenshot,
        ]
    );

    let text = computer.call(&json!({"action": "screenshot", "text": "now"})).await;
    assert!(text.error.is_some());
}

#[tokio::test]
async fn hidpi_screenshots_match_viewport() {
    let viewport = Viewport::new(320, 200);
    let driver = ScriptedDriver::with_device_scale(viewport, 2);
    let mut computer = ComputerTool::new(Arc::new(driver.clone()), viewport, true, None);

    let result = computer.call(&json!({"action": "screenshot"})).await;
    let bytes = STANDARD.decode(result.base64_image.unwrap()).unwrap();
    let frame = image::load_from_memory(&bytes).unwrap();
    assert_eq!((frame.width(), frame.height()), (320, 200));
}

#[tokio::test]
async fn capture_failures_are_reported_without_retry_hint() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    driver.fail_on(DriverCall::Screenshot, "renderer crashed");
    let mut computer = tool(&driver);

    let result = computer.call(&json!({"action": "screenshot"})).await;
    assert_eq!(
        result.error.as_deref(),
        Some("Failed to take screenshot: renderer crashed")
    );
    assert!(result.base64_image.is_none());
}

#[tokio::test]
async fn driver_errors_become_unexpected_error_results() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    driver.fail_on(DriverCall::MouseMove { x: 3, y: 4 }, "session gone");
    let mut computer = tool(&driver);

    let result = computer
        .call(&json!({"action": "mouse_move", "coordinate": [3, 4]}))
        .await;
    assert_eq!(
        result.error.as_deref(),
        Some("Unexpected error during 'mouse_move' action: session gone. Please try again.")
    );
    assert_eq!(computer.cursor(), (0, 0));
}

#[tokio::test]
async fn unknown_actions_list_valid_ones() {
    let driver = ScriptedDriver::new(Viewport::new(800, 600));
    let mut computer = tool(&driver);

    let result = computer.call(&json!({"action": "scroll"})).await;
    assert_eq!(
        result.error.as_deref(),
        Some("Invalid action: 'scroll'. Valid actions are: cursor_position, double_click, key, left_click, left_click_drag, middle_click, mouse_move, right_click, screenshot, type Please try again with a valid command.")
    );
}
