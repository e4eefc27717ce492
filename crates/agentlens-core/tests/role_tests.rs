#![cfg(feature = "integration")]

//! Persona selection and authentication hydration tests.

mod common;

use std::collections::HashMap;

use agentlens_core::{AuthState, RoleConfig, SurfaceError};

#[tokio::test]
async fn missing_auth_file_degrades_to_unauthenticated() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    let mut roles = HashMap::new();
    roles.insert(
        "guest".to_string(),
        RoleConfig {
            auth_path: Some("/nonexistent/guest-auth.json".into()),
            default_url: None,
            auth_required: false,
            limits: None,
        },
    );
    surface.set_configuration(roles);

    surface.select_role("guest").await.expect("select must succeed");
    let snapshot = surface
        .navigate("data:text/html,<p>open content</p>")
        .await
        .expect("navigate failed");

    let warnings = snapshot.warnings.expect("warnings expected");
    assert_eq!(warnings.auth_status.as_deref(), Some("unauthenticated"));

    browser.close().await;
}

#[tokio::test]
async fn required_auth_failure_rolls_back_the_selection() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    // Establish a current role first.
    surface.select_role("default").await.expect("default select failed");

    let mut roles = HashMap::new();
    roles.insert(
        "admin".to_string(),
        RoleConfig {
            auth_path: Some("/nonexistent/admin-auth.json".into()),
            default_url: None,
            auth_required: true,
            limits: None,
        },
    );
    surface.set_configuration(roles);

    let err = surface
        .select_role("admin")
        .await
        .expect_err("required auth must fail");
    assert!(
        matches!(err, SurfaceError::Authentication { ref role, .. } if role == "admin"),
        "got {err}"
    );

    // The previous role is still current.
    assert_eq!(surface.current_role().as_deref(), Some("default"));

    // And a retry is possible: the failed creation was evicted, so fixing
    // the configuration unblocks the role.
    let mut fixed = HashMap::new();
    fixed.insert("admin".to_string(), RoleConfig::default());
    surface.set_configuration(fixed);
    surface.select_role("admin").await.expect("retry must succeed");
    assert_eq!(surface.current_role().as_deref(), Some("admin"));

    browser.close().await;
}

#[tokio::test]
async fn auth_state_hydrates_cookies_and_local_storage() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    // The auth file points at an origin the test can actually visit.
    let dir = tempfile::tempdir().unwrap();
    let auth_path = dir.path().join("auth.json");
    let state: AuthState = serde_json::from_value(serde_json::json!({
        "cookies": [],
        "origins": []
    }))
    .unwrap();
    state.save(&auth_path).await.unwrap();

    let mut roles = HashMap::new();
    roles.insert(
        "member".to_string(),
        RoleConfig {
            auth_path: Some(auth_path),
            default_url: None,
            auth_required: true,
            limits: None,
        },
    );
    surface.set_configuration(roles);

    // An empty-but-present auth file satisfies auth_required.
    surface.select_role("member").await.expect("select failed");
    let snapshot = surface
        .navigate("data:text/html,<p>member area</p>")
        .await
        .expect("navigate failed");
    assert!(snapshot.warnings.is_none(), "no warnings expected: {:?}", snapshot.warnings);

    browser.close().await;
}

#[tokio::test]
async fn personas_are_isolated_by_partition() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    let mut roles = HashMap::new();
    roles.insert("alice".to_string(), RoleConfig::default());
    roles.insert("bob".to_string(), RoleConfig::default());
    surface.set_configuration(roles);

    surface.select_role("alice").await.expect("select alice failed");
    surface
        .navigate("data:text/html,<p>alice</p>")
        .await
        .expect("alice navigate failed");
    let alice = surface.initialize().await.unwrap();
    common::eval_in_page(&alice, "localStorage.setItem('who', 'alice')")
        .await
        .ok();

    surface.select_role("bob").await.expect("select bob failed");
    let bob = surface.initialize().await.unwrap();
    assert_ne!(
        alice.browser_context_id(),
        bob.browser_context_id(),
        "separate personas must live in separate partitions"
    );
    assert_ne!(alice.session_id(), bob.session_id());

    browser.close().await;
}

#[tokio::test]
async fn unknown_role_is_a_typed_error() {
    let mut browser = common::launch().await;
    let surface = browser.surface();

    let err = surface
        .select_role("never-configured")
        .await
        .expect_err("unknown role must fail");
    assert!(matches!(err, SurfaceError::Identity(_)), "got {err}");

    browser.close().await;
}
