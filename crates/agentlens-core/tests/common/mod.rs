//! Common setup for browser-driving integration tests.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::sync::Once;

use agentlens_core::{AgentBrowser, IdentityContext, SurfaceError};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing once per test binary.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive(tracing::Level::INFO.into()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Launch a headless browser for a test.
pub async fn launch() -> AgentBrowser {
    init_tracing();
    AgentBrowser::launch().await.expect("Failed to launch browser")
}

/// Evaluate an expression in the page's main world and return it by value.
pub async fn eval_in_page(
    ctx: &IdentityContext,
    expression: &str,
) -> Result<serde_json::Value, SurfaceError> {
    use agentlens_cdp::protocol::runtime::{EvaluateParams, EvaluateResult};

    let result: EvaluateResult = ctx
        .connection()
        .send_command(
            "Runtime.evaluate",
            Some(EvaluateParams {
                expression: expression.to_string(),
                silent: Some(true),
                context_id: None,
                return_by_value: Some(true),
                await_promise: Some(false),
            }),
            Some(ctx.session_id()),
        )
        .await
        .map_err(SurfaceError::Cdp)?;
    Ok(result.result.value.unwrap_or(serde_json::Value::Null))
}

/// Find the first ref on a snapshot line containing `needle`.
pub fn ref_on_line(text: &str, needle: &str) -> Option<String> {
    let line = text.lines().find(|line| line.contains(needle))?;
    let start = line.find("[ref=")? + "[ref=".len();
    let end = line[start..].find(']')? + start;
    Some(line[start..end].to_string())
}
