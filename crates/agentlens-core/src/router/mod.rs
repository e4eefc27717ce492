//! Reference routing and the action façade.
//!
//! Everything the agent does funnels through here: the façade asks the
//! identity manager for the current context, translates global refs into
//! `(frame, local ref)` through the context's ref index, and dispatches
//! into the owning frame's bridge. Ref translation is a pure lookup with
//! no heuristics — a stale ref must fail loudly rather than hit the wrong
//! element.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use agentlens_cdp::CdpConnection;
use agentlens_cdp::protocol::page::{NavigateParams, NavigateResult};

use crate::error::{NavigationError, SurfaceError};
use crate::identity::{DEFAULT_ROLE, IdentityContext, IdentityManager, RoleConfig};
use crate::inject;
use crate::snapshot::{self, NavigationMetadata, RefTarget, Snapshot};
use crate::wait::{ActionWatcher, LoadPhase, NavigationWatcher};

/// Timeout for explicit navigations.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for agent-requested waits.
const MAX_WAIT: Duration = Duration::from_secs(30);

/// The agent-facing browser façade.
#[derive(Debug)]
pub struct BrowserSurface {
    identities: IdentityManager,
}

impl BrowserSurface {
    /// Build a façade over one browser connection.
    pub fn new(connection: Arc<CdpConnection>) -> Self {
        Self {
            identities: IdentityManager::new(connection),
        }
    }

    /// The identity manager behind this façade.
    pub fn identities(&self) -> &IdentityManager {
        &self.identities
    }

    /// Configure the persona table.
    pub fn set_configuration(
        &self,
        configs: std::collections::HashMap<String, RoleConfig>,
    ) {
        self.identities.set_configuration(configs);
    }

    /// Ensure a current context exists, selecting the default role when
    /// none has been picked yet.
    ///
    /// # Errors
    ///
    /// Context creation failures.
    pub async fn initialize(&self) -> Result<Arc<IdentityContext>, SurfaceError> {
        match self.identities.current() {
            Some(ctx) => {
                ctx.touch();
                Ok(ctx)
            }
            None => Ok(self.identities.select(DEFAULT_ROLE).await?),
        }
    }

    /// Translate a global ref through the current snapshot's index.
    fn parse_ref(ctx: &IdentityContext, ref_str: &str) -> Result<RefTarget, SurfaceError> {
        ctx.resolve_ref(ref_str)
            .ok_or_else(|| SurfaceError::UnknownRef(ref_str.to_string()))
    }

    /// Navigate the current page and return the fresh snapshot with
    /// navigation metadata attached.
    ///
    /// # Errors
    ///
    /// A typed navigation error; a best-effort error snapshot lands in
    /// the context's `last_error_snapshot` first.
    #[instrument(level = "info", skip(self))]
    pub async fn navigate(&self, url: &str) -> Result<Snapshot, SurfaceError> {
        let ctx = self.initialize().await?;
        let started = Instant::now();

        // The watcher doubles as the transient response listener; dropping
        // it at the end of this call unsubscribes it either way.
        let mut watcher = NavigationWatcher::new(
            ctx.connection().subscribe_events(),
            ctx.session_id(),
            ctx.main_frame_id(),
        );

        match self.drive_navigation(&ctx, url, &mut watcher).await {
            Ok(()) => {}
            Err(e) => {
                self.capture_error_snapshot(&ctx).await;
                return Err(SurfaceError::Navigation(e));
            }
        }

        ctx.mark_navigated();
        let mut snap = snapshot::compose(&ctx).await?;

        let response = watcher.response();
        let final_url = response
            .final_url
            .or_else(|| snap.page_context.as_ref().map(|p| p.url.clone()))
            .unwrap_or_else(|| url.to_string());
        let page_title = snap
            .page_context
            .as_ref()
            .map(|p| p.title.clone())
            .unwrap_or_default();
        snap.navigation = Some(NavigationMetadata {
            requested_url: url.to_string(),
            final_url,
            page_title,
            status_code: response.status,
            load_time_ms: started.elapsed().as_millis() as u64,
            redirect_count: response.redirect_count,
            content_type: response.content_type,
            timestamp: Utc::now(),
            success: true,
        });
        Ok(snap)
    }

    /// Send the navigation and wait it out, then re-inject the new frame
    /// tree.
    async fn drive_navigation(
        &self,
        ctx: &IdentityContext,
        url: &str,
        watcher: &mut NavigationWatcher,
    ) -> Result<(), NavigationError> {
        let result: NavigateResult = ctx
            .connection()
            .send_command(
                "Page.navigate",
                Some(NavigateParams {
                    url: url.to_string(),
                    referrer: None,
                    transition_type: None,
                    frame_id: None,
                }),
                Some(ctx.session_id()),
            )
            .await?;
        if let Some(error_text) = result.error_text {
            return Err(NavigationError::NetworkError(error_text));
        }

        watcher
            .wait_until(LoadPhase::NetworkIdle, NAVIGATION_TIMEOUT)
            .await?;

        inject::inject_frame_tree(ctx).await?;
        Ok(())
    }

    /// Stash a best-effort snapshot after a failed navigation.
    async fn capture_error_snapshot(&self, ctx: &IdentityContext) {
        match snapshot::compose(ctx).await {
            Ok(snap) => ctx.set_error_snapshot(snap),
            Err(e) => debug!(error = %e, "No error snapshot available"),
        }
    }

    /// Compose a fresh snapshot of the current page.
    ///
    /// # Errors
    ///
    /// Fails when the main frame cannot be snapshotted.
    #[instrument(level = "debug", skip(self))]
    pub async fn snapshot(&self) -> Result<Snapshot, SurfaceError> {
        let ctx = self.initialize().await?;
        Ok(snapshot::compose(&ctx).await?)
    }

    /// Click the element behind `ref_str`.
    ///
    /// A navigation waiter is armed before the click and always awaited
    /// after it, so a click that tears down the document cannot leave a
    /// dangling wait; a quiet timeout simply means the click did not
    /// navigate.
    ///
    /// # Errors
    ///
    /// [`SurfaceError::UnknownRef`] for stale refs, bridge errors from the
    /// dispatch, non-timeout waiter failures.
    #[instrument(level = "info", skip(self))]
    pub async fn click(&self, ref_str: &str) -> Result<(), SurfaceError> {
        let ctx = self.initialize().await?;
        let target = Self::parse_ref(&ctx, ref_str)?;
        debug!(frame_id = %target.frame_id, local_ref = %target.local_ref, "Dispatching click");

        let watcher = ActionWatcher::new(
            ctx.connection().subscribe_events(),
            ctx.session_id(),
            ctx.main_frame_id(),
        );
        let settle = tokio::spawn(watcher.settle());

        let dispatch = ctx
            .injector()
            .call_method::<bool>(&target.frame_id, "click", vec![json!(target.local_ref)])
            .await;

        // The waiter must be resolved even when the dispatch failed, or a
        // teardown mid-click leaks a pending wait.
        let settled = settle.await;

        dispatch?;
        match settled {
            Ok(Ok(navigated)) => {
                if navigated {
                    debug!("Click triggered navigation");
                }
                Ok(())
            }
            Ok(Err(e)) => Err(SurfaceError::Navigation(NavigationError::Wait(e))),
            Err(join_error) => {
                warn!(error = %join_error, "Click navigation waiter panicked");
                Ok(())
            }
        }
    }

    /// Type `text` into the element behind `ref_str`.
    ///
    /// # Errors
    ///
    /// [`SurfaceError::UnknownRef`] for stale refs, bridge errors from the
    /// dispatch.
    #[instrument(level = "info", skip(self, text))]
    pub async fn type_text(&self, ref_str: &str, text: &str) -> Result<(), SurfaceError> {
        let ctx = self.initialize().await?;
        let target = Self::parse_ref(&ctx, ref_str)?;
        ctx.injector()
            .call_method::<bool>(
                &target.frame_id,
                "type",
                vec![json!(target.local_ref), json!(text)],
            )
            .await?;
        Ok(())
    }

    /// Detailed element record for `ref_str`.
    ///
    /// # Errors
    ///
    /// [`SurfaceError::UnknownRef`] for stale refs, bridge errors.
    pub async fn inspect(&self, ref_str: &str) -> Result<serde_json::Value, SurfaceError> {
        self.structural(ref_str, "inspect", Vec::new()).await
    }

    /// Ancestor chain of the element behind `ref_str`.
    ///
    /// # Errors
    ///
    /// [`SurfaceError::UnknownRef`] for stale refs, bridge errors.
    pub async fn ancestors(&self, ref_str: &str) -> Result<serde_json::Value, SurfaceError> {
        self.structural(ref_str, "resolveContainer", Vec::new()).await
    }

    /// Siblings of the element's ancestor at `level`.
    ///
    /// # Errors
    ///
    /// [`SurfaceError::UnknownRef`] for stale refs, bridge errors.
    pub async fn siblings(
        &self,
        ref_str: &str,
        level: u32,
    ) -> Result<serde_json::Value, SurfaceError> {
        self.structural(ref_str, "inspectPattern", vec![json!(level)]).await
    }

    /// Anchors below the element's ancestor at `level`.
    ///
    /// # Errors
    ///
    /// [`SurfaceError::UnknownRef`] for stale refs, bridge errors.
    pub async fn descendants(
        &self,
        ref_str: &str,
        level: u32,
    ) -> Result<serde_json::Value, SurfaceError> {
        self.structural(ref_str, "extractAnchors", vec![json!(level)]).await
    }

    /// Route a structural query into the owning frame. Opaque
    /// pass-through.
    async fn structural(
        &self,
        ref_str: &str,
        method: &str,
        extra_args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, SurfaceError> {
        let ctx = self.initialize().await?;
        let target = Self::parse_ref(&ctx, ref_str)?;
        let mut args = vec![json!(target.local_ref)];
        args.extend(extra_args);
        Ok(ctx
            .injector()
            .call_method(&target.frame_id, method, args)
            .await?)
    }

    /// Sleep, bounded to a sane maximum.
    pub async fn wait(&self, milliseconds: u64) {
        let duration = Duration::from_millis(milliseconds).min(MAX_WAIT);
        tokio::time::sleep(duration).await;
    }

    /// Switch persona.
    ///
    /// # Errors
    ///
    /// Unknown roles, authentication failures, default-URL navigation
    /// failures. The previous role stays selected on failure.
    pub async fn select_role(&self, role: &str) -> Result<Arc<IdentityContext>, SurfaceError> {
        Ok(self.identities.select(role).await?)
    }

    /// The currently selected role, if any.
    pub fn current_role(&self) -> Option<String> {
        self.identities.current_role()
    }

    /// All configured roles.
    pub fn roles(&self) -> Vec<String> {
        self.identities.roles()
    }

    /// Dispose every context. Failures are recorded, never raised.
    pub async fn close(&self) {
        self.identities.close().await;
    }
}
