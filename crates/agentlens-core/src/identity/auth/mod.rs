//! Authentication state hydration.
//!
//! Cookies install first, against the role's storage partition; then each
//! origin is visited and its localStorage entries written. Ordering
//! matters: origin pages may read cookies while loading.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};
use url::Url;

use agentlens_cdp::CdpConnection;
use agentlens_cdp::protocol::page::{NavigateParams, NavigateResult};
use agentlens_cdp::protocol::runtime::EvaluateParams;
use agentlens_cdp::protocol::storage::SetCookiesParams;

use super::types::{AuthOrigin, AuthState};
use crate::error::IdentityError;
use crate::wait::{LoadPhase, NavigationWatcher};

/// How long each hydration navigation may take.
const HYDRATION_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Apply `state` to a freshly created context.
///
/// # Errors
///
/// Returns an error when cookie installation or any origin visit fails;
/// the caller decides whether that degrades to a warning or poisons the
/// context (`auth_required`).
#[instrument(level = "debug", skip_all, fields(cookies = state.cookies.len(), origins = state.origins.len()))]
pub async fn hydrate(
    connection: &Arc<CdpConnection>,
    session_id: &str,
    main_frame_id: &str,
    browser_context_id: Option<&str>,
    state: &AuthState,
) -> Result<(), IdentityError> {
    if !state.cookies.is_empty() {
        connection
            .send_command::<_, serde_json::Value>(
                "Storage.setCookies",
                Some(SetCookiesParams {
                    cookies: state.cookies.iter().map(super::types::AuthCookie::to_param).collect(),
                    browser_context_id: browser_context_id.map(ToString::to_string),
                }),
                None,
            )
            .await?;
        debug!(count = state.cookies.len(), "Installed cookies");
    }

    for origin in &state.origins {
        write_origin_storage(connection, session_id, main_frame_id, origin).await?;
    }

    Ok(())
}

/// Navigate to one origin and write its localStorage entries.
async fn write_origin_storage(
    connection: &Arc<CdpConnection>,
    session_id: &str,
    main_frame_id: &str,
    origin: &AuthOrigin,
) -> Result<(), IdentityError> {
    if origin.local_storage.is_empty() {
        return Ok(());
    }

    let origin_url = Url::parse(&origin.origin).map_err(|e| {
        IdentityError::CreateFailed(format!("invalid origin '{}': {e}", origin.origin))
    })?;

    let mut watcher =
        NavigationWatcher::new(connection.subscribe_events(), session_id, main_frame_id);

    let result: NavigateResult = connection
        .send_command(
            "Page.navigate",
            Some(NavigateParams {
                url: origin_url.to_string(),
                referrer: None,
                transition_type: None,
                frame_id: None,
            }),
            Some(session_id),
        )
        .await?;
    if let Some(error_text) = result.error_text {
        return Err(IdentityError::CreateFailed(format!(
            "could not reach origin {}: {error_text}",
            origin.origin
        )));
    }

    watcher
        .wait_until(LoadPhase::DomContentLoaded, HYDRATION_NAVIGATION_TIMEOUT)
        .await
        .map_err(|e| {
            IdentityError::CreateFailed(format!("load of origin {} failed: {e}", origin.origin))
        })?;

    let entries_json = serde_json::to_string(&origin.local_storage)
        .map_err(|e| IdentityError::CreateFailed(format!("serialize localStorage: {e}")))?;
    let js = format!(
        r"
        (function() {{
            const entries = {entries_json};
            for (const entry of entries) {{
                localStorage.setItem(entry.name, entry.value);
            }}
            return entries.length;
        }})()
    "
    );

    connection
        .send_command::<_, serde_json::Value>(
            "Runtime.evaluate",
            Some(EvaluateParams {
                expression: js,
                silent: Some(true),
                context_id: None,
                return_by_value: Some(true),
                await_promise: Some(false),
            }),
            Some(session_id),
        )
        .await?;

    debug!(origin = %origin.origin, count = origin.local_storage.len(), "Restored localStorage entries");
    Ok(())
}
