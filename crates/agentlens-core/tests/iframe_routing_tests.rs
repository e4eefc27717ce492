#![cfg(feature = "integration")]

//! Iframe ref routing and nested frame composition tests.

mod common;

#[tokio::test]
async fn iframe_refs_route_into_the_owning_frame() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    let snapshot = surface
        .navigate(
            r#"data:text/html,<iframe srcdoc="<button id='x' onclick='window.clicked=true'>Go</button>"></iframe>"#,
        )
        .await
        .expect("navigate failed");

    let button_ref = common::ref_on_line(&snapshot.text, r#"button "Go""#)
        .expect("iframe content should be expanded into the snapshot");
    assert!(
        button_ref.starts_with("f1_"),
        "iframe ref should be frame-qualified, got {button_ref}"
    );

    surface.click(&button_ref).await.expect("click failed");

    let ctx = surface.initialize().await.unwrap();
    let clicked = common::eval_in_page(
        &ctx,
        "document.querySelector('iframe').contentWindow.clicked === true",
    )
    .await
    .unwrap();
    assert_eq!(clicked, serde_json::json!(true));

    browser.close().await;
}

#[tokio::test]
async fn nested_iframes_get_increasing_ordinals_and_indentation() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    // A top-level iframe whose document contains another iframe.
    let inner = "<button>Level 2</button>";
    let outer = format!(
        "<button>Level 1</button><iframe srcdoc=\"{}\"></iframe>",
        inner.replace('"', "&quot;")
    );
    let url = format!(
        "data:text/html,<iframe srcdoc='{}'></iframe>",
        outer.replace('\'', "&#39;")
    );

    let snapshot = surface.navigate(&url).await.expect("navigate failed");

    let level1_ref = common::ref_on_line(&snapshot.text, r#"button "Level 1""#)
        .expect("level 1 button missing");
    let level2_ref = common::ref_on_line(&snapshot.text, r#"button "Level 2""#)
        .expect("level 2 button missing");
    assert!(level1_ref.starts_with("f1_"), "got {level1_ref}");
    assert!(level2_ref.starts_with("f2_"), "got {level2_ref}");

    let indent_of = |needle: &str| {
        snapshot
            .text
            .lines()
            .find(|line| line.contains(needle))
            .map(|line| line.len() - line.trim_start().len())
            .unwrap()
    };
    assert!(
        indent_of("Level 2") > indent_of("Level 1"),
        "nested frame content must be indented deeper"
    );

    // Both nested refs resolve and are clickable.
    surface.click(&level2_ref).await.expect("nested click failed");

    browser.close().await;
}

#[tokio::test]
async fn empty_iframe_degrades_to_unavailable_marker() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    let snapshot = surface
        .navigate(r#"data:text/html,<iframe name="empty"></iframe><button>Still here</button>"#)
        .await
        .expect("navigate failed");

    // The page remains snapshot-able whatever happened to the iframe.
    assert!(snapshot.text.contains("Still here"));
    // An about:blank iframe still has a frame; either real expansion or a
    // graceful marker is acceptable, but never a hard failure.
    assert!(snapshot.text.contains("- iframe"));

    browser.close().await;
}
