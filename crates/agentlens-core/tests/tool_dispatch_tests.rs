#![cfg(feature = "integration")]

//! Tool-layer dispatch tests.

mod common;

use agentlens_core::SurfaceError;
use agentlens_core::tools::dispatch;
use serde_json::json;

#[tokio::test]
async fn tool_roundtrip_drives_the_surface() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    let ready = dispatch(surface, "browser_initialize", &json!({}))
        .await
        .expect("initialize failed");
    assert!(ready.contains("default"));

    let page = dispatch(
        surface,
        "browser_navigate",
        &json!({"url": "data:text/html,<button onclick=\"window.n=1\">Press</button>"}),
    )
    .await
    .expect("navigate failed");
    let button_ref = common::ref_on_line(&page, r#"button "Press""#)
        .expect("navigate output should embed refs");

    let clicked = dispatch(surface, "browser_click", &json!({"ref": button_ref}))
        .await
        .expect("click failed");
    assert!(clicked.contains(&button_ref));

    let roles = dispatch(surface, "list_current_roles", &json!({}))
        .await
        .expect("list roles failed");
    assert!(roles.contains("default"));

    let current = dispatch(surface, "get_current_role", &json!({}))
        .await
        .expect("current role failed");
    assert_eq!(current, "default");

    dispatch(surface, "wait_for_browser", &json!({"milliseconds": 10}))
        .await
        .expect("wait failed");

    dispatch(surface, "browser_close", &json!({}))
        .await
        .expect("close failed");
    browser.close().await;
}

#[tokio::test]
async fn unknown_tool_and_bad_arguments_are_typed_errors() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    let err = dispatch(surface, "browser_teleport", &json!({}))
        .await
        .expect_err("unknown tool must fail");
    assert!(matches!(err, SurfaceError::UnknownTool(name) if name == "browser_teleport"));

    let err = dispatch(surface, "browser_navigate", &json!({}))
        .await
        .expect_err("missing url must fail");
    assert!(matches!(err, SurfaceError::InvalidArguments { .. }));

    browser.close().await;
}
