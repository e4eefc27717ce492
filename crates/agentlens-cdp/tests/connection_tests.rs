#![cfg(feature = "integration")]

//! Connection tests against a real headless Chromium.

use agentlens_cdp::protocol::target::GetTargetsResult;
use agentlens_cdp::{CdpConnection, ChromiumLauncher};

#[tokio::test]
async fn launch_connect_and_list_targets() {
    let mut browser = ChromiumLauncher::new()
        .launch()
        .await
        .expect("Failed to launch browser");
    assert!(browser.ws_url.starts_with("ws://"));

    let conn = CdpConnection::connect(&browser.ws_url)
        .await
        .expect("Failed to connect");

    let targets: GetTargetsResult = conn
        .send_command("Target.getTargets", None::<()>, None)
        .await
        .expect("Target.getTargets failed");
    assert!(
        targets.target_infos.iter().any(|t| t.target_type == "page"),
        "a fresh browser should expose at least one page target"
    );

    browser.kill().await;
}

#[tokio::test]
async fn protocol_errors_are_typed() {
    let mut browser = ChromiumLauncher::new()
        .launch()
        .await
        .expect("Failed to launch browser");
    let conn = CdpConnection::connect(&browser.ws_url)
        .await
        .expect("Failed to connect");

    let err = conn
        .send_command::<_, serde_json::Value>("No.suchMethod", None::<()>, None)
        .await
        .expect_err("bogus method must fail");
    assert!(matches!(err, agentlens_cdp::CdpError::Protocol { .. }));

    browser.kill().await;
}
