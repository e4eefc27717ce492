//! Per-frame bridge lifecycle.
//!
//! The injector guarantees that every reachable frame of one debugger
//! session has a live helper object in a named isolated world, and that
//! callers never observe a handle without its execution context. Frame
//! state follows a small machine:
//!
//! ```text
//! Absent → Creating (gate pending) → Ready → dropped on
//!   executionContextDestroyed / frameNavigated / frameDetached → Absent
//! ```
//!
//! The readiness gate is a `tokio::sync::OnceCell` inside an `Arc` slot:
//! concurrent `ensure_frame_state` calls for the same frame share one
//! initialization, a failed initialization evicts the slot so the next
//! call starts fresh, and a document swap replaces the slot (never resets
//! it in place) so late initializers can detect they lost the race.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

use agentlens_cdp::{CdpConnection, CdpError};
use agentlens_cdp::protocol::page::{
    CreateIsolatedWorldParams, CreateIsolatedWorldResult, FrameDetachedEvent, FrameNavigatedEvent,
};
use agentlens_cdp::protocol::runtime::{
    CallArgument, CallFunctionOnParams, CallFunctionOnResult, EvaluateParams, EvaluateResult,
    ExecutionContextDestroyedEvent, ExecutionContextId,
};

use crate::error::BridgeError;
use crate::failures::{FailureKind, classify};

pub mod bootstrap;

pub use bootstrap::BridgeLimits;

/// Prefix of every isolated world this crate creates.
const WORLD_PREFIX: &str = "agentlens";

/// A live helper handle: the isolated-world context and the remote object
/// inside it, always observed together.
#[derive(Debug, Clone)]
pub struct FrameBridge {
    /// Execution context of the frame's isolated world.
    pub context_id: ExecutionContextId,
    /// Remote object id of the helper.
    pub object_id: String,
}

/// One frame's readiness gate.
#[derive(Debug, Default)]
struct FrameSlot {
    gate: OnceCell<FrameBridge>,
}

/// State shared with the event listener task.
#[derive(Debug, Default)]
struct InjectorState {
    /// frame id → slot. At most one slot per frame at any moment.
    frames: parking_lot::Mutex<HashMap<String, Arc<FrameSlot>>>,
    /// isolated-world context id → frame id, for destruction events.
    contexts: parking_lot::Mutex<HashMap<ExecutionContextId, String>>,
}

impl InjectorState {
    fn drop_frame(&self, frame_id: &str) {
        let removed = self.frames.lock().remove(frame_id).is_some();
        self.contexts.lock().retain(|_, owner| owner != frame_id);
        if removed {
            debug!(frame_id = %frame_id, "Dropped frame bridge state");
        }
    }
}

/// Installs and tracks helper objects across all frames of one session.
#[derive(Debug)]
pub struct BridgeInjector {
    connection: Arc<CdpConnection>,
    session_id: String,
    world_name: String,
    limits: BridgeLimits,
    state: Arc<InjectorState>,
    listener: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BridgeInjector {
    /// Create an injector for one session.
    ///
    /// `role` salts the isolated-world name so concurrent personas on the
    /// same page cannot share (or collide on) a world.
    pub fn new(
        connection: Arc<CdpConnection>,
        session_id: impl Into<String>,
        role: &str,
        limits: BridgeLimits,
    ) -> Self {
        let salt = Uuid::new_v4().simple().to_string();
        let world_name = format!("{WORLD_PREFIX}_{role}_{}", &salt[..8]);
        Self {
            connection,
            session_id: session_id.into(),
            world_name,
            limits,
            state: Arc::new(InjectorState::default()),
            listener: parking_lot::Mutex::new(None),
        }
    }

    /// The salted isolated-world name used by this injector.
    pub fn world_name(&self) -> &str {
        &self.world_name
    }

    /// Session this injector is bound to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Register event listeners and enable the protocol domains.
    ///
    /// Must complete before the first injection so a navigation racing the
    /// injection cannot leak a handle into a dead context.
    ///
    /// # Errors
    ///
    /// Returns an error if enabling a domain fails.
    #[instrument(level = "debug", skip(self), fields(session_id = %self.session_id, world = %self.world_name))]
    pub async fn setup_auto_injection(&self) -> Result<(), BridgeError> {
        // Listener first: events may fire during the enables below.
        let mut events = self.connection.subscribe_events();
        let state = Arc::clone(&self.state);
        let session_id = self.session_id.clone();
        let handle = tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed = missed, "Bridge listener lagged on event stream");
                        continue;
                    }
                };
                if event.session_id.as_deref() != Some(&session_id) {
                    continue;
                }
                match event.method.as_str() {
                    "Runtime.executionContextDestroyed" => {
                        if let Some(params) = event.params
                            && let Ok(evt) =
                                serde_json::from_value::<ExecutionContextDestroyedEvent>(params)
                        {
                            let owner =
                                state.contexts.lock().remove(&evt.execution_context_id);
                            if let Some(frame_id) = owner {
                                trace!(
                                    context_id = evt.execution_context_id,
                                    frame_id = %frame_id,
                                    "Isolated world destroyed"
                                );
                                state.frames.lock().remove(&frame_id);
                            }
                        }
                    }
                    "Page.frameNavigated" => {
                        // The event names the frame whose document was
                        // replaced; its world is gone with the document.
                        if let Some(params) = event.params
                            && let Ok(evt) = serde_json::from_value::<FrameNavigatedEvent>(params)
                        {
                            state.drop_frame(&evt.frame.id);
                        }
                    }
                    "Page.frameDetached" => {
                        if let Some(params) = event.params
                            && let Ok(evt) = serde_json::from_value::<FrameDetachedEvent>(params)
                        {
                            state.drop_frame(&evt.frame_id);
                        }
                    }
                    _ => {}
                }
            }
        });
        *self.listener.lock() = Some(handle);

        self.connection
            .send_command::<_, Value>("Page.enable", None::<()>, Some(&self.session_id))
            .await?;
        self.connection
            .send_command::<_, Value>("Runtime.enable", None::<()>, Some(&self.session_id))
            .await?;
        debug!("Auto-injection armed");
        Ok(())
    }

    /// Guarantee a live helper in `frame_id` and return its handle.
    ///
    /// Idempotent and concurrency-safe: simultaneous calls for one frame
    /// share a single injection through the slot's gate.
    ///
    /// # Errors
    ///
    /// Fails with [`BridgeError::FrameDetached`] when the frame vanishes
    /// under the injection; the slot is evicted so a later call retries
    /// fresh.
    pub async fn ensure_frame_state(&self, frame_id: &str) -> Result<FrameBridge, BridgeError> {
        let slot = {
            let mut frames = self.state.frames.lock();
            Arc::clone(frames.entry(frame_id.to_string()).or_default())
        };

        let result = slot
            .gate
            .get_or_try_init(|| self.create_bridge(frame_id))
            .await;

        match result {
            Ok(bridge) => {
                // A navigation event may have swapped the slot out while
                // the injection was in flight; a handle in a replaced
                // document must not escape.
                let still_current = self
                    .state
                    .frames
                    .lock()
                    .get(frame_id)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot));
                if still_current {
                    Ok(bridge.clone())
                } else {
                    Err(BridgeError::FrameDetached(frame_id.to_string()))
                }
            }
            Err(err) => {
                let mut frames = self.state.frames.lock();
                if frames
                    .get(frame_id)
                    .is_some_and(|current| Arc::ptr_eq(current, &slot))
                {
                    frames.remove(frame_id);
                }
                Err(err)
            }
        }
    }

    /// Create the isolated world and evaluate the helper bootstrap.
    #[instrument(level = "debug", skip(self), fields(frame_id = %frame_id, world = %self.world_name))]
    async fn create_bridge(&self, frame_id: &str) -> Result<FrameBridge, BridgeError> {
        let world: CreateIsolatedWorldResult = self
            .connection
            .send_command(
                "Page.createIsolatedWorld",
                Some(CreateIsolatedWorldParams {
                    frame_id: frame_id.to_string(),
                    world_name: Some(self.world_name.clone()),
                    grant_univeral_access: Some(false),
                }),
                Some(&self.session_id),
            )
            .await
            .map_err(|e| self.map_cdp(frame_id, e))?;
        let context_id = world.execution_context_id;

        let result: EvaluateResult = self
            .connection
            .send_command(
                "Runtime.evaluate",
                Some(EvaluateParams {
                    expression: bootstrap::bootstrap_source(self.limits),
                    silent: Some(true),
                    context_id: Some(context_id),
                    return_by_value: Some(false),
                    await_promise: Some(false),
                }),
                Some(&self.session_id),
            )
            .await
            .map_err(|e| self.map_cdp(frame_id, e))?;

        if let Some(details) = result.exception_details {
            return Err(BridgeError::Evaluation(details.message()));
        }
        let object_id = result.result.object_id.ok_or_else(|| {
            BridgeError::Evaluation("bootstrap did not return an object handle".to_string())
        })?;

        self.state
            .contexts
            .lock()
            .insert(context_id, frame_id.to_string());
        debug!(context_id = context_id, "Bridge installed");
        Ok(FrameBridge {
            context_id,
            object_id,
        })
    }

    /// Call a helper method and decode its by-value result.
    ///
    /// The stored handle is revalidated with a `ping()` first; a dead
    /// handle drops the frame state, re-injects, and the dispatch runs
    /// against the fresh handle. A failure of that dispatch surfaces
    /// as-is.
    ///
    /// # Errors
    ///
    /// [`BridgeError::FrameDetached`] when the frame is gone,
    /// [`BridgeError::Evaluation`] when the helper throws or returns an
    /// undecodable payload.
    pub async fn call_method<R>(
        &self,
        frame_id: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<R, BridgeError>
    where
        R: DeserializeOwned,
    {
        let bridge = self.revalidated(frame_id).await?;
        self.dispatch(frame_id, &bridge, method, args, true)
            .await?
            .value()
            .map_err(|e| BridgeError::Evaluation(format!("helper payload for {method}: {e}")))
    }

    /// Call a helper method and return the remote object id of its result.
    ///
    /// Used where the result must stay in the page (iframe elements for
    /// frame-id resolution).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`call_method`](Self::call_method), plus an
    /// evaluation error when the helper returns a non-object.
    pub async fn call_method_handle(
        &self,
        frame_id: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<String, BridgeError> {
        let bridge = self.revalidated(frame_id).await?;
        self.dispatch(frame_id, &bridge, method, args, false)
            .await?
            .handle()
            .ok_or_else(|| {
                BridgeError::Evaluation(format!("helper returned no handle for {method}"))
            })
    }

    /// Ensure a handle and revalidate it, re-injecting once if stale.
    async fn revalidated(&self, frame_id: &str) -> Result<FrameBridge, BridgeError> {
        let bridge = self.ensure_frame_state(frame_id).await?;
        if self.ping(&bridge).await {
            return Ok(bridge);
        }
        debug!(frame_id = %frame_id, "Handle failed revalidation, re-injecting");
        self.state.drop_frame(frame_id);
        self.ensure_frame_state(frame_id).await
    }

    /// Trivial liveness probe on a stored handle.
    async fn ping(&self, bridge: &FrameBridge) -> bool {
        match self
            .dispatch_raw(bridge, "function() { return this.ping(); }", Vec::new(), true)
            .await
        {
            Ok(result) => result.exception_details.is_none(),
            Err(_) => false,
        }
    }

    async fn dispatch(
        &self,
        frame_id: &str,
        bridge: &FrameBridge,
        method: &str,
        args: Vec<Value>,
        by_value: bool,
    ) -> Result<DispatchResult, BridgeError> {
        let declaration = format!("function(...args) {{ return this.{method}(...args); }}");
        let result = self
            .dispatch_raw(bridge, &declaration, args, by_value)
            .await
            .map_err(|e| self.map_cdp(frame_id, e))?;
        if let Some(details) = result.exception_details {
            let message = details.message();
            if classify(&message) == FailureKind::Detached {
                return Err(BridgeError::FrameDetached(frame_id.to_string()));
            }
            return Err(BridgeError::Evaluation(message));
        }
        Ok(DispatchResult {
            value: result.result.value,
            object_id: result.result.object_id,
        })
    }

    async fn dispatch_raw(
        &self,
        bridge: &FrameBridge,
        declaration: &str,
        args: Vec<Value>,
        by_value: bool,
    ) -> Result<CallFunctionOnResult, CdpError> {
        self.connection
            .send_command(
                "Runtime.callFunctionOn",
                Some(CallFunctionOnParams {
                    function_declaration: declaration.to_string(),
                    object_id: Some(bridge.object_id.clone()),
                    arguments: Some(
                        args.into_iter()
                            .map(|value| CallArgument {
                                value: Some(value),
                                object_id: None,
                            })
                            .collect(),
                    ),
                    silent: Some(true),
                    return_by_value: Some(by_value),
                    await_promise: Some(true),
                }),
                Some(&self.session_id),
            )
            .await
    }

    /// Map a CDP failure, recognizing gone-frame conditions.
    fn map_cdp(&self, frame_id: &str, err: CdpError) -> BridgeError {
        if let CdpError::Protocol { message, .. } = &err
            && classify(message) == FailureKind::Detached
        {
            return BridgeError::FrameDetached(frame_id.to_string());
        }
        BridgeError::Cdp(err)
    }

    /// Whether a ready frame state exists right now. Test hook.
    pub fn has_frame_state(&self, frame_id: &str) -> bool {
        self.state
            .frames
            .lock()
            .get(frame_id)
            .is_some_and(|slot| slot.gate.initialized())
    }

    /// Unregister listeners and drop all frame state.
    pub fn dispose(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
        self.state.frames.lock().clear();
        self.state.contexts.lock().clear();
        debug!(session_id = %self.session_id, "Bridge injector disposed");
    }
}

impl Drop for BridgeInjector {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }
}

/// Outcome of a helper dispatch before decoding.
#[derive(Debug)]
struct DispatchResult {
    value: Option<Value>,
    object_id: Option<String>,
}

impl DispatchResult {
    fn value<R: DeserializeOwned>(self) -> Result<R, serde_json::Error> {
        serde_json::from_value(self.value.unwrap_or(Value::Null))
    }

    fn handle(self) -> Option<String> {
        self.object_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_names_are_salted_per_injector() {
        // World-name construction is pure; replicate it here to pin the
        // shape without a connection.
        let salt_a = Uuid::new_v4().simple().to_string();
        let salt_b = Uuid::new_v4().simple().to_string();
        let name_a = format!("{WORLD_PREFIX}_agent_{}", &salt_a[..8]);
        let name_b = format!("{WORLD_PREFIX}_agent_{}", &salt_b[..8]);
        assert_ne!(name_a, name_b);
        assert!(name_a.starts_with("agentlens_agent_"));
    }

    #[test]
    fn injector_state_drop_frame_clears_reverse_map() {
        let state = InjectorState::default();
        state
            .frames
            .lock()
            .insert("FRAME".to_string(), Arc::new(FrameSlot::default()));
        state.contexts.lock().insert(42, "FRAME".to_string());
        state.drop_frame("FRAME");
        assert!(state.frames.lock().is_empty());
        assert!(state.contexts.lock().is_empty());
    }

    #[test]
    fn dispatch_result_decodes_value() {
        let result = DispatchResult {
            value: Some(serde_json::json!({"text": "- button", "elementCount": 1})),
            object_id: None,
        };
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Payload {
            text: String,
            element_count: u32,
        }
        let payload: Payload = result.value().unwrap();
        assert_eq!(payload.text, "- button");
        assert_eq!(payload.element_count, 1);
    }

    #[test]
    fn dispatch_result_exposes_handle() {
        let result = DispatchResult {
            value: None,
            object_id: Some("OBJ".to_string()),
        };
        assert_eq!(result.handle().as_deref(), Some("OBJ"));
    }
}
