//! Identity and context management.
//!
//! Each persona (role) gets an isolated browsing partition, a page, a
//! flat-mode debugger session, and a bridge injector salted to the role.
//! Contexts are created lazily on first use and memoized by role; the
//! memoization stores the in-flight creation (a single-flight gate), not
//! the finished value, and a failed creation is evicted so the next
//! request retries from scratch instead of observing a poisoned context.
//!
//! Ownership is a straight chain: context → session → page → partition.
//! Teardown walks it once, in that order, recording step failures without
//! aborting the remaining steps.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use agentlens_cdp::CdpConnection;
use agentlens_cdp::protocol::page::{GetFrameTreeResult, NavigateParams, NavigateResult};
use agentlens_cdp::protocol::runtime::{EvaluateParams, EvaluateResult};
use agentlens_cdp::protocol::target::{
    AttachToTargetParams, AttachToTargetResult, CloseTargetParams, CloseTargetResult,
    CreateBrowserContextParams, CreateBrowserContextResult, CreateTargetParams,
    CreateTargetResult, DetachFromTargetParams, DisposeBrowserContextParams, GetTargetsResult,
};

use crate::bridge::{BridgeInjector, BridgeLimits};
use crate::error::IdentityError;
use crate::failures::FailureLog;
use crate::snapshot::{RefTarget, Snapshot};
use crate::wait::{LoadPhase, NavigationWatcher};

pub mod auth;
pub mod types;

pub use types::{AuthCookie, AuthOrigin, AuthState, LocalStorageEntry, RoleConfig, SameSite};

/// The reserved role that reuses the browser's default partition.
pub const DEFAULT_ROLE: &str = "default";

/// Timeout for the optional default-URL navigation during selection.
const SELECT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// URLs considered "nothing loaded yet".
fn is_blank_url(url: &str) -> bool {
    url.is_empty() || url == "about:blank"
}

/// Known roles: everything configured plus the reserved default.
fn role_list(configs: &HashMap<String, RoleConfig>) -> Vec<String> {
    let mut roles: Vec<String> = configs.keys().cloned().collect();
    if !roles.iter().any(|r| r == DEFAULT_ROLE) {
        roles.push(DEFAULT_ROLE.to_string());
    }
    roles.sort();
    roles
}

/// A long-lived per-persona browsing context.
#[derive(Debug)]
pub struct IdentityContext {
    role: String,
    connection: Arc<CdpConnection>,
    /// Partition backing this persona; `None` for the default partition.
    browser_context_id: Option<String>,
    target_id: String,
    /// Whether the page target was created (and may be closed) by us.
    created_target: bool,
    session_id: String,
    main_frame_id: String,
    injector: Arc<BridgeInjector>,
    default_url: Option<String>,
    created_at: DateTime<Utc>,
    last_used_at: parking_lot::Mutex<DateTime<Utc>>,
    has_navigated: AtomicBool,
    last_error_snapshot: parking_lot::Mutex<Option<Snapshot>>,
    /// Global ref → routing target. Owned by the snapshot composer and
    /// fully replaced on every successful snapshot.
    ref_index: parking_lot::RwLock<HashMap<String, RefTarget>>,
    failures: FailureLog,
}

impl IdentityContext {
    /// The persona name.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// The shared CDP connection.
    pub fn connection(&self) -> &Arc<CdpConnection> {
        &self.connection
    }

    /// The partition backing this persona, if not the default one.
    pub fn browser_context_id(&self) -> Option<&str> {
        self.browser_context_id.as_deref()
    }

    /// The page target.
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// The flat-mode debugger session.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The page's main frame.
    pub fn main_frame_id(&self) -> &str {
        &self.main_frame_id
    }

    /// The bridge injector bound to this session.
    pub fn injector(&self) -> &Arc<BridgeInjector> {
        &self.injector
    }

    /// The configured default URL, if any.
    pub fn default_url(&self) -> Option<&str> {
        self.default_url.as_deref()
    }

    /// When the context was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the context was last used.
    pub fn last_used_at(&self) -> DateTime<Utc> {
        *self.last_used_at.lock()
    }

    /// Record a use of this context.
    pub fn touch(&self) {
        *self.last_used_at.lock() = Utc::now();
    }

    /// Whether a top-level navigation has happened on this context.
    pub fn has_navigated(&self) -> bool {
        self.has_navigated.load(Ordering::Relaxed)
    }

    /// Mark that a top-level navigation happened.
    pub fn mark_navigated(&self) {
        self.has_navigated.store(true, Ordering::Relaxed);
    }

    /// The failure record for this context.
    pub fn failures(&self) -> &FailureLog {
        &self.failures
    }

    /// Route a global ref to its owning frame. Pure index lookup.
    pub fn resolve_ref(&self, ref_str: &str) -> Option<RefTarget> {
        self.ref_index.read().get(ref_str).cloned()
    }

    /// Number of refs in the current index.
    pub fn ref_count(&self) -> usize {
        self.ref_index.read().len()
    }

    /// Replace the ref index wholesale. Composer only.
    pub fn replace_ref_index(&self, index: HashMap<String, RefTarget>) {
        *self.ref_index.write() = index;
    }

    /// Stash a best-effort snapshot taken after a failure.
    pub fn set_error_snapshot(&self, snapshot: Snapshot) {
        *self.last_error_snapshot.lock() = Some(snapshot);
    }

    /// The last error snapshot, if one was captured.
    pub fn last_error_snapshot(&self) -> Option<Snapshot> {
        self.last_error_snapshot.lock().clone()
    }

    /// Current URL of the page's main world.
    async fn page_url(&self) -> Option<String> {
        let result: EvaluateResult = self
            .connection
            .send_command(
                "Runtime.evaluate",
                Some(EvaluateParams {
                    expression: "location.href".to_string(),
                    silent: Some(true),
                    context_id: None,
                    return_by_value: Some(true),
                    await_promise: Some(false),
                }),
                Some(&self.session_id),
            )
            .await
            .ok()?;
        result.result.value.and_then(|v| v.as_str().map(ToString::to_string))
    }
}

/// Single-flight slot for one role's context.
#[derive(Debug, Default)]
struct ContextSlot {
    gate: OnceCell<Arc<IdentityContext>>,
}

/// Lazily creates and hands out identity contexts.
#[derive(Debug)]
pub struct IdentityManager {
    connection: Arc<CdpConnection>,
    configs: parking_lot::RwLock<HashMap<String, RoleConfig>>,
    contexts: parking_lot::Mutex<HashMap<String, Arc<ContextSlot>>>,
    current: parking_lot::Mutex<Option<String>>,
    limits: BridgeLimits,
}

impl IdentityManager {
    /// Create a manager over one browser connection.
    pub fn new(connection: Arc<CdpConnection>) -> Self {
        Self {
            connection,
            configs: parking_lot::RwLock::new(HashMap::new()),
            contexts: parking_lot::Mutex::new(HashMap::new()),
            current: parking_lot::Mutex::new(None),
            limits: BridgeLimits::default(),
        }
    }

    /// Replace the per-role configuration table.
    pub fn set_configuration(&self, configs: HashMap<String, RoleConfig>) {
        *self.configs.write() = configs;
    }

    /// Set the default bridge limits for roles without overrides.
    pub fn set_limits(&mut self, limits: BridgeLimits) {
        self.limits = limits;
    }

    /// All known roles: the reserved default plus everything configured.
    pub fn roles(&self) -> Vec<String> {
        role_list(&self.configs.read())
    }

    /// The currently selected role, if any.
    pub fn current_role(&self) -> Option<String> {
        self.current.lock().clone()
    }

    /// The currently selected context, if its creation has completed.
    pub fn current(&self) -> Option<Arc<IdentityContext>> {
        let role = self.current.lock().clone()?;
        let slot = self.contexts.lock().get(&role).cloned()?;
        slot.gate.get().cloned()
    }

    /// Get the context for `role`, creating it on first use.
    ///
    /// Concurrent calls for the same role share one creation; a failed
    /// creation is evicted so retries start fresh.
    ///
    /// # Errors
    ///
    /// [`IdentityError::UnknownRole`] for unconfigured non-default roles,
    /// [`IdentityError::Authentication`] when required auth state cannot
    /// be loaded, plus CDP/bridge failures from context construction.
    pub async fn get_or_create(&self, role: &str) -> Result<Arc<IdentityContext>, IdentityError> {
        let config = {
            let configs = self.configs.read();
            match configs.get(role) {
                Some(config) => config.clone(),
                None if role == DEFAULT_ROLE => RoleConfig::default(),
                None => return Err(IdentityError::UnknownRole(role.to_string())),
            }
        };

        let slot = {
            let mut contexts = self.contexts.lock();
            Arc::clone(contexts.entry(role.to_string()).or_default())
        };

        let result = slot
            .gate
            .get_or_try_init(|| self.create_context(role, &config))
            .await;

        match result {
            Ok(ctx) => Ok(Arc::clone(ctx)),
            Err(err) => {
                let mut contexts = self.contexts.lock();
                if contexts
                    .get(role)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot))
                {
                    contexts.remove(role);
                }
                Err(err)
            }
        }
    }

    /// Switch the current persona.
    ///
    /// On first selection of a role with a `default_url`, navigates there
    /// when the page is still blank. The current pointer only moves on
    /// success, so a failed switch leaves the previous role selected.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`get_or_create`](Self::get_or_create), plus
    /// navigation failures for the default URL.
    #[instrument(level = "info", skip(self))]
    pub async fn select(&self, role: &str) -> Result<Arc<IdentityContext>, IdentityError> {
        let ctx = self.get_or_create(role).await?;
        ctx.touch();

        if let Some(default_url) = ctx.default_url()
            && !ctx.has_navigated()
        {
            let blank = ctx.page_url().await.as_deref().is_none_or(is_blank_url);
            if blank {
                self.open_default_url(&ctx, default_url).await?;
            }
        }

        *self.current.lock() = Some(role.to_string());
        info!(role = %role, "Selected role");
        Ok(ctx)
    }

    /// Navigate a fresh context to its configured default URL.
    async fn open_default_url(
        &self,
        ctx: &IdentityContext,
        url: &str,
    ) -> Result<(), IdentityError> {
        debug!(role = %ctx.role(), url = %url, "Opening default URL");
        let mut watcher = NavigationWatcher::new(
            self.connection.subscribe_events(),
            ctx.session_id(),
            ctx.main_frame_id(),
        );

        let result: NavigateResult = self
            .connection
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
            return Err(IdentityError::Navigation(
                crate::error::NavigationError::NetworkError(error_text),
            ));
        }

        watcher
            .wait_until(LoadPhase::Load, SELECT_NAVIGATION_TIMEOUT)
            .await
            .map_err(crate::error::NavigationError::Wait)?;
        ctx.mark_navigated();
        Ok(())
    }

    /// Build one context: partition, page, session, bridge, auth.
    #[instrument(level = "info", skip(self, config))]
    async fn create_context(
        &self,
        role: &str,
        config: &RoleConfig,
    ) -> Result<Arc<IdentityContext>, IdentityError> {
        info!(role = %role, "Creating identity context");

        let (browser_context_id, target_id, created_target) = if role == DEFAULT_ROLE {
            match self.first_default_page().await? {
                Some(target_id) => (None, target_id, false),
                None => {
                    let created: CreateTargetResult = self
                        .connection
                        .send_command(
                            "Target.createTarget",
                            Some(CreateTargetParams {
                                url: "about:blank".to_string(),
                                browser_context_id: None,
                            }),
                            None,
                        )
                        .await?;
                    (None, created.target_id, true)
                }
            }
        } else {
            let context: CreateBrowserContextResult = self
                .connection
                .send_command(
                    "Target.createBrowserContext",
                    Some(CreateBrowserContextParams {
                        dispose_on_detach: Some(true),
                    }),
                    None,
                )
                .await?;
            let created: CreateTargetResult = self
                .connection
                .send_command(
                    "Target.createTarget",
                    Some(CreateTargetParams {
                        url: "about:blank".to_string(),
                        browser_context_id: Some(context.browser_context_id.clone()),
                    }),
                    None,
                )
                .await?;
            (
                Some(context.browser_context_id),
                created.target_id,
                true,
            )
        };

        let attached: AttachToTargetResult = self
            .connection
            .send_command(
                "Target.attachToTarget",
                Some(AttachToTargetParams {
                    target_id: target_id.clone(),
                    flatten: Some(true),
                }),
                None,
            )
            .await?;
        let session_id = attached.session_id;

        // Page for frame events, Network for load watchers; both needed
        // before any hydration navigation.
        self.connection
            .send_command::<_, serde_json::Value>("Page.enable", None::<()>, Some(&session_id))
            .await?;
        self.connection
            .send_command::<_, serde_json::Value>("Network.enable", None::<()>, Some(&session_id))
            .await?;

        let tree: GetFrameTreeResult = self
            .connection
            .send_command("Page.getFrameTree", None::<()>, Some(&session_id))
            .await?;
        let main_frame_id = tree.frame_tree.frame.id;

        let failures = FailureLog::new();

        if let Some(auth_path) = &config.auth_path {
            let outcome = match AuthState::load(auth_path).await {
                Ok(state) => auth::hydrate(
                    &self.connection,
                    &session_id,
                    &main_frame_id,
                    browser_context_id.as_deref(),
                    &state,
                )
                .await
                .err()
                .map(|e| e.to_string()),
                Err(e) => Some(format!("{}: {e}", auth_path.display())),
            };
            if let Some(reason) = outcome {
                if config.auth_required {
                    self.teardown_partial(
                        &session_id,
                        created_target.then_some(target_id.as_str()),
                        browser_context_id.as_deref(),
                    )
                    .await;
                    return Err(IdentityError::Authentication {
                        role: role.to_string(),
                        reason,
                    });
                }
                failures.set_auth_error(reason);
            }
        }

        let limits = config.limits.unwrap_or(self.limits);
        let injector = Arc::new(BridgeInjector::new(
            Arc::clone(&self.connection),
            session_id.clone(),
            role,
            limits,
        ));
        if let Err(e) = injector.setup_auto_injection().await {
            self.teardown_partial(
                &session_id,
                created_target.then_some(target_id.as_str()),
                browser_context_id.as_deref(),
            )
            .await;
            return Err(e.into());
        }

        let now = Utc::now();
        Ok(Arc::new(IdentityContext {
            role: role.to_string(),
            connection: Arc::clone(&self.connection),
            browser_context_id,
            target_id,
            created_target,
            session_id,
            main_frame_id,
            injector,
            default_url: config.default_url.clone(),
            created_at: now,
            last_used_at: parking_lot::Mutex::new(now),
            has_navigated: AtomicBool::new(false),
            last_error_snapshot: parking_lot::Mutex::new(None),
            ref_index: parking_lot::RwLock::new(HashMap::new()),
            failures,
        }))
    }

    /// Find the first existing page in the default partition.
    async fn first_default_page(&self) -> Result<Option<String>, IdentityError> {
        let targets: GetTargetsResult = self
            .connection
            .send_command("Target.getTargets", None::<()>, None)
            .await?;
        Ok(targets
            .target_infos
            .into_iter()
            .find(|t| t.target_type == "page" && t.browser_context_id.is_none())
            .map(|t| t.target_id))
    }

    /// Best-effort disposal of partially created resources.
    async fn teardown_partial(
        &self,
        session_id: &str,
        target_id: Option<&str>,
        browser_context_id: Option<&str>,
    ) {
        if let Err(e) = self
            .connection
            .send_command::<_, serde_json::Value>(
                "Target.detachFromTarget",
                Some(DetachFromTargetParams {
                    session_id: session_id.to_string(),
                }),
                None,
            )
            .await
        {
            warn!(error = %e, "Failed to detach session during teardown");
        }
        if let Some(target_id) = target_id
            && let Err(e) = self
                .connection
                .send_command::<_, CloseTargetResult>(
                    "Target.closeTarget",
                    Some(CloseTargetParams {
                        target_id: target_id.to_string(),
                    }),
                    None,
                )
                .await
        {
            warn!(error = %e, "Failed to close page during teardown");
        }
        if let Some(context_id) = browser_context_id
            && let Err(e) = self
                .connection
                .send_command::<_, serde_json::Value>(
                    "Target.disposeBrowserContext",
                    Some(DisposeBrowserContextParams {
                        browser_context_id: context_id.to_string(),
                    }),
                    None,
                )
                .await
        {
            warn!(error = %e, "Failed to dispose partition during teardown");
        }
    }

    /// Dispose every context, bridge first, then session, page, partition.
    ///
    /// Step failures are recorded in each context's failure log and
    /// logged; none abort the remaining steps or escape this method.
    #[instrument(level = "info", skip(self))]
    pub async fn close(&self) {
        let slots: Vec<Arc<ContextSlot>> = {
            let mut contexts = self.contexts.lock();
            let slots = contexts.values().cloned().collect();
            contexts.clear();
            slots
        };
        *self.current.lock() = None;

        for slot in slots {
            let Some(ctx) = slot.gate.get() else {
                continue;
            };
            self.dispose_context(ctx).await;
        }
    }

    /// Walk one context's ownership chain down.
    async fn dispose_context(&self, ctx: &IdentityContext) {
        debug!(role = %ctx.role(), "Disposing identity context");
        ctx.injector().dispose();

        if let Err(e) = self
            .connection
            .send_command::<_, serde_json::Value>(
                "Target.detachFromTarget",
                Some(DetachFromTargetParams {
                    session_id: ctx.session_id().to_string(),
                }),
                None,
            )
            .await
        {
            ctx.failures().record_cleanup("detach-session", e.to_string());
        }

        if ctx.created_target {
            if let Err(e) = self
                .connection
                .send_command::<_, CloseTargetResult>(
                    "Target.closeTarget",
                    Some(CloseTargetParams {
                        target_id: ctx.target_id().to_string(),
                    }),
                    None,
                )
                .await
            {
                ctx.failures().record_cleanup("close-page", e.to_string());
            }
        }

        if let Some(context_id) = ctx.browser_context_id() {
            if let Err(e) = self
                .connection
                .send_command::<_, serde_json::Value>(
                    "Target.disposeBrowserContext",
                    Some(DisposeBrowserContextParams {
                        browser_context_id: context_id.to_string(),
                    }),
                    None,
                )
                .await
            {
                ctx.failures().record_cleanup("dispose-partition", e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_urls_are_recognized() {
        assert!(is_blank_url(""));
        assert!(is_blank_url("about:blank"));
        assert!(!is_blank_url("https://example.com/"));
    }

    #[test]
    fn default_role_is_always_listed() {
        let configs: HashMap<String, RoleConfig> =
            [("admin".to_string(), RoleConfig::default())].into_iter().collect();
        assert_eq!(
            role_list(&configs),
            vec!["admin".to_string(), "default".to_string()]
        );
    }

    #[test]
    fn configured_default_role_is_not_duplicated() {
        let configs: HashMap<String, RoleConfig> =
            [(DEFAULT_ROLE.to_string(), RoleConfig::default())].into_iter().collect();
        assert_eq!(role_list(&configs), vec!["default".to_string()]);
    }
}
