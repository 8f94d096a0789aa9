use ally_common::Viewport;
use ally_drivers::testing::{DriverCall, ScriptedDriver};
use ally_llm::types::{ContentBlock, ToolKind, ToolResultContent};
use ally_tools::{Tool, Toolbox, ToolboxOptions};
use serde_json::json;
use std::sync::Arc;

fn toolbox(driver: &ScriptedDriver) -> Toolbox {
    Toolbox::new(
        Arc::new(driver.clone()),
        ToolboxOptions {
            viewport: Viewport::new(1280, 720),
            ..ToolboxOptions::default()
        },
    )
}

fn error_text(block: &ContentBlock) -> Option<&str> {
    match block {
        ContentBlock::ToolResult {
            content, is_error: true, ..
        } => match content.as_slice() {
            [ToolResultContent::Text { text }] => Some(text.as_str()),
            _ => None,
        },
        _ => None,
    }
}

#[test]
fn specs_are_ordered_and_computer_carries_display() {
    let driver = ScriptedDriver::default();
    let specs = toolbox(&driver).specs();
    let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["computer", "set_url", "previous_page"]);
    assert_eq!(
        specs[0].kind,
        ToolKind::Computer {
            display_width_px: 1280,
            display_height_px: 720,
            display_number: 1
        }
    );
    assert_eq!(specs[1].input_schema["required"], json!(["url"]));
    assert_eq!(specs[2].kind, ToolKind::Function);
    assert_eq!(Tool::from_name("set_url"), Some(Tool::SetUrl));
}

#[tokio::test]
async fn unknown_tool_invokes_nothing() {
    let driver = ScriptedDriver::default();
    let mut tools = toolbox(&driver);

    let block = tools
        .run_tool("nonexistent_tool", &json!({"action": "screenshot"}), "toolu_9")
        .await;
    assert_eq!(
        error_text(&block),
        Some("Unknown tool 'nonexistent_tool'. Please try a valid tool: computer, set_url, or previous_page.")
    );
    assert!(matches!(&block, ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "toolu_9"));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn computer_results_are_wrapped_with_call_id() {
    let driver = ScriptedDriver::default();
    let mut tools = toolbox(&driver);

    let block = tools
        .run_tool("computer", &json!({"action": "mouse_move", "coordinate": [1, 2]}), "toolu_1")
        .await;
    match block {
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
            ..
        } => {
            assert_eq!(tool_use_id, "toolu_1");
            assert!(!is_error);
            assert_eq!(
                content,
                vec![ToolResultContent::Text {
                    text: "Moved cursor to (1,2)".into()
                }]
            );
        }
        other => panic!("unexpected block {other:?}"),
    }
    assert_eq!(tools.computer().cursor(), (1, 2));

    let shot = tools
        .run_tool("computer", &json!({"action": "screenshot"}), "toolu_2")
        .await;
    assert!(matches!(
        shot,
        ContentBlock::ToolResult { ref content, .. } if matches!(content.as_slice(), [ToolResultContent::Image { .. }])
    ));
}

#[tokio::test]
async fn set_url_navigates_and_reports_failures() {
    let driver = ScriptedDriver::default();
    let mut tools = toolbox(&driver);

    let ok = tools
        .run_tool("set_url", &json!({"url": "https://example.org"}), "toolu_1")
        .await;
    assert!(matches!(ok, ContentBlock::ToolResult { is_error: false, ref content, .. } if content.is_empty()));

    driver.fail_on(DriverCall::Goto("notaurl".into()), "invalid argument");
    let failed = tools.run_tool("set_url", &json!({"url": "notaurl"}), "toolu_2").await;
    assert_eq!(
        error_text(&failed),
        Some("Failed to navigate to URL: invalid argument. Please check the URL format and try again.")
    );

    let missing = tools.run_tool("set_url", &json!({}), "toolu_3").await;
    assert!(error_text(&missing)
        .unwrap()
        .starts_with("Error executing tool 'set_url'"));
    assert_eq!(
        driver.calls(),
        vec![
            DriverCall::Goto("https://example.org".into()),
            DriverCall::Goto("notaurl".into())
        ]
    );
}

#[tokio::test]
async fn previous_page_without_history_is_an_error() {
    let driver = ScriptedDriver::default();
    let mut tools = toolbox(&driver);

    let block = tools.run_tool("previous_page", &json!({}), "toolu_1").await;
    assert_eq!(
        error_text(&block),
        Some("Failed to navigate to previous page: no previous page in history. This may happen if there's no previous page in the browser history.")
    );

    tools
        .run_tool("set_url", &json!({"url": "https://a.test"}), "toolu_2")
        .await;
    let back = tools.run_tool("previous_page", &json!({}), "toolu_3").await;
    assert!(error_text(&back).is_none());
}
