#![cfg(feature = "integration")]

//! Main-frame snapshot and action tests.

mod common;

use std::collections::HashSet;

#[tokio::test]
async fn click_on_main_frame_ref_reaches_the_element() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    let snapshot = surface
        .navigate(r#"data:text/html,<button onclick="window.clicked=true">Hi</button>"#)
        .await
        .expect("navigate failed");

    let button_ref = common::ref_on_line(&snapshot.text, r#"button "Hi""#)
        .expect("snapshot should contain the button with a ref");

    surface.click(&button_ref).await.expect("click failed");

    let ctx = surface.initialize().await.unwrap();
    let clicked = common::eval_in_page(&ctx, "window.clicked === true")
        .await
        .unwrap();
    assert_eq!(clicked, serde_json::json!(true));

    browser.close().await;
}

#[tokio::test]
async fn type_fills_a_textbox() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    let snapshot = surface
        .navigate(r#"data:text/html,<input id="name" placeholder="Name">"#)
        .await
        .expect("navigate failed");

    let input_ref = common::ref_on_line(&snapshot.text, "textbox")
        .expect("snapshot should contain the textbox");
    surface.type_text(&input_ref, "Ada").await.expect("type failed");

    let ctx = surface.initialize().await.unwrap();
    let value = common::eval_in_page(&ctx, "document.getElementById('name').value")
        .await
        .unwrap();
    assert_eq!(value, serde_json::json!("Ada"));

    browser.close().await;
}

#[tokio::test]
async fn snapshot_refs_are_unique_and_indexed() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    let snapshot = surface
        .navigate(
            r"data:text/html,<button>A</button><button>B</button><a href='/x'>C</a>",
        )
        .await
        .expect("navigate failed");

    let mut seen = HashSet::new();
    for line in snapshot.text.lines() {
        if let Some(r) = common::ref_on_line(line, "[ref=") {
            assert!(seen.insert(r.clone()), "duplicate ref {r} in snapshot");
        }
    }
    assert!(!seen.is_empty());

    // Every ref in the text resolves through the routing index.
    let ctx = surface.initialize().await.unwrap();
    for r in &seen {
        assert!(ctx.resolve_ref(r).is_some(), "ref {r} missing from index");
    }
    assert_eq!(ctx.ref_count(), seen.len());

    browser.close().await;
}

#[tokio::test]
async fn inspect_describes_the_element() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    let snapshot = surface
        .navigate(r#"data:text/html,<button id="go" class="big">Go</button>"#)
        .await
        .expect("navigate failed");

    let button_ref = common::ref_on_line(&snapshot.text, r#"button "Go""#).unwrap();
    let detail = surface.inspect(&button_ref).await.expect("inspect failed");

    assert_eq!(detail["role"], serde_json::json!("button"));
    assert_eq!(detail["tag"], serde_json::json!("button"));
    assert_eq!(detail["visible"], serde_json::json!(true));
    assert_eq!(detail["attributes"]["id"], serde_json::json!("go"));

    browser.close().await;
}

#[tokio::test]
async fn structural_queries_return_plain_data() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    let snapshot = surface
        .navigate(
            r"data:text/html,<ul><li><a href='/a'>A</a></li><li><a href='/b'>B</a></li></ul>",
        )
        .await
        .expect("navigate failed");

    let link_ref = common::ref_on_line(&snapshot.text, r#"link "A""#).unwrap();

    let ancestors = surface.ancestors(&link_ref).await.expect("ancestors failed");
    assert!(ancestors["ancestors"].as_array().is_some_and(|a| !a.is_empty()));

    let siblings = surface.siblings(&link_ref, 1).await.expect("siblings failed");
    assert!(siblings["siblings"].as_array().is_some_and(|s| s.len() >= 2));

    let anchors = surface.descendants(&link_ref, 2).await.expect("descendants failed");
    assert!(anchors["anchors"].as_array().is_some_and(|a| a.len() >= 2));

    browser.close().await;
}
