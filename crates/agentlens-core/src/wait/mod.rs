//! Navigation and load-state waiting.
//!
//! Everything here is event-driven: a watcher subscribes to the CDP event
//! stream before the triggering command is sent, then folds lifecycle and
//! network events into a load phase. Two flavors exist:
//!
//! - [`NavigationWatcher`] for explicit navigations: waits for a target
//!   [`LoadPhase`] and captures the main document response (status, final
//!   URL, content type, redirect count) along the way.
//! - [`ActionWatcher`] for actions that may or may not navigate (clicks):
//!   a short detection window plus a tolerant completion wait where a
//!   timeout means "no navigation happened".

use std::collections::HashSet;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, trace};

use agentlens_cdp::CdpEvent;
use agentlens_cdp::protocol::network::{
    LoadingFailedEvent, LoadingFinishedEvent, RequestWillBeSentEvent, ResponseReceivedEvent,
};
use agentlens_cdp::protocol::page::{FrameNavigatedEvent, NavigatedWithinDocumentEvent};

use crate::error::WaitError;

/// Stages of a document load, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LoadPhase {
    /// Navigation committed; the response started arriving.
    Commit,
    /// DOM fully parsed.
    DomContentLoaded,
    /// Load event fired.
    #[default]
    Load,
    /// Load plus no network activity for the idle threshold.
    NetworkIdle,
}

/// Quiet period that counts as network idle.
const NETWORK_IDLE_THRESHOLD: Duration = Duration::from_millis(500);

/// How long an [`ActionWatcher`] listens for a navigation to start.
const ACTION_DETECTION_WINDOW: Duration = Duration::from_millis(150);

/// Default completion budget for an action-triggered navigation.
const ACTION_COMPLETION_TIMEOUT: Duration = Duration::from_secs(1);

/// Main-document response data captured while waiting.
#[derive(Debug, Clone, Default)]
pub struct NavigationResponse {
    /// HTTP status of the final response.
    pub status: Option<u16>,
    /// URL of the final response, after redirects.
    pub final_url: Option<String>,
    /// Content type of the final response.
    pub content_type: Option<String>,
    /// Number of redirects followed by the main document request.
    pub redirect_count: u32,
}

/// Event-driven waiter for one frame's load progress.
#[derive(Debug)]
pub struct NavigationWatcher {
    event_rx: broadcast::Receiver<CdpEvent>,
    session_id: String,
    frame_id: String,
    phase: LoadPhase,
    pending_requests: HashSet<String>,
    last_activity: Instant,
    main_request_id: Option<String>,
    response: NavigationResponse,
    navigated: bool,
    navigated_in_document: bool,
}

impl NavigationWatcher {
    /// Create a watcher over `event_rx` for one `(session, frame)`.
    ///
    /// Subscribe before sending the navigating command, or the commit can
    /// be missed.
    pub fn new(
        event_rx: broadcast::Receiver<CdpEvent>,
        session_id: impl Into<String>,
        frame_id: impl Into<String>,
    ) -> Self {
        Self {
            event_rx,
            session_id: session_id.into(),
            frame_id: frame_id.into(),
            phase: LoadPhase::Commit,
            pending_requests: HashSet::new(),
            last_activity: Instant::now(),
            main_request_id: None,
            response: NavigationResponse::default(),
            navigated: false,
            navigated_in_document: false,
        }
    }

    /// The response data captured so far.
    pub fn response(&self) -> NavigationResponse {
        self.response.clone()
    }

    /// Whether a cross-document navigation of the frame was observed.
    pub fn navigation_seen(&self) -> bool {
        self.navigated
    }

    /// Wait until `target` is reached.
    ///
    /// # Errors
    ///
    /// [`WaitError::Timeout`] if the phase is not reached in time,
    /// [`WaitError::ConnectionClosed`] if the event stream ends.
    pub async fn wait_until(
        &mut self,
        target: LoadPhase,
        timeout_duration: Duration,
    ) -> Result<(), WaitError> {
        match timeout(timeout_duration, self.drive_to(target)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(target = ?target, timeout_ms = timeout_duration.as_millis(), "Load wait timed out");
                Err(WaitError::Timeout(timeout_duration))
            }
        }
    }

    /// Event loop folding CDP events until `target` is reached.
    async fn drive_to(&mut self, target: LoadPhase) -> Result<(), WaitError> {
        loop {
            if self.reached(target) && target != LoadPhase::NetworkIdle {
                return Ok(());
            }

            let idle_candidate =
                target == LoadPhase::NetworkIdle && self.reached(LoadPhase::Load) && self.pending_requests.is_empty();

            if idle_candidate {
                let idle_deadline = self.last_activity + NETWORK_IDLE_THRESHOLD;
                tokio::select! {
                    event = self.event_rx.recv() => self.fold(event)?,
                    () = sleep_until(idle_deadline) => return Ok(()),
                }
            } else {
                let event = self.event_rx.recv().await;
                self.fold(event)?;
            }
        }
    }

    fn reached(&self, target: LoadPhase) -> bool {
        self.phase >= target
    }

    /// Apply one received event (or channel outcome) to the state.
    fn fold(
        &mut self,
        event: Result<CdpEvent, broadcast::error::RecvError>,
    ) -> Result<(), WaitError> {
        let event = match event {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Closed) => return Err(WaitError::ConnectionClosed),
            // Missed events; keep folding what still arrives.
            Err(broadcast::error::RecvError::Lagged(_)) => return Ok(()),
        };

        if event.session_id.as_deref() != Some(&self.session_id) {
            return Ok(());
        }

        match event.method.as_str() {
            "Page.frameNavigated" => {
                if let Some(params) = event.params
                    && let Ok(evt) = serde_json::from_value::<FrameNavigatedEvent>(params)
                    && evt.frame.id == self.frame_id
                {
                    trace!(frame_id = %evt.frame.id, url = %evt.frame.url, "Frame navigation committed");
                    self.navigated = true;
                    self.bump(LoadPhase::Commit);
                }
            }
            "Page.navigatedWithinDocument" => {
                if let Some(params) = event.params
                    && let Ok(evt) = serde_json::from_value::<NavigatedWithinDocumentEvent>(params)
                    && evt.frame_id == self.frame_id
                {
                    trace!(url = %evt.url, "Within-document navigation");
                    self.navigated_in_document = true;
                }
            }
            "Page.domContentEventFired" => self.bump(LoadPhase::DomContentLoaded),
            "Page.loadEventFired" => self.bump(LoadPhase::Load),
            "Network.requestWillBeSent" => {
                if let Some(params) = event.params
                    && let Ok(evt) = serde_json::from_value::<RequestWillBeSentEvent>(params)
                {
                    self.on_request(&evt);
                }
            }
            "Network.responseReceived" => {
                if let Some(params) = event.params
                    && let Ok(evt) = serde_json::from_value::<ResponseReceivedEvent>(params)
                {
                    self.on_response(&evt);
                }
            }
            "Network.loadingFinished" => {
                if let Some(params) = event.params
                    && let Ok(evt) = serde_json::from_value::<LoadingFinishedEvent>(params)
                {
                    self.finish_request(&evt.request_id);
                }
            }
            "Network.loadingFailed" => {
                if let Some(params) = event.params
                    && let Ok(evt) = serde_json::from_value::<LoadingFailedEvent>(params)
                {
                    self.finish_request(&evt.request_id);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn bump(&mut self, phase: LoadPhase) {
        if self.phase < phase {
            trace!(from = ?self.phase, to = ?phase, "Load phase transition");
            self.phase = phase;
        }
    }

    fn on_request(&mut self, evt: &RequestWillBeSentEvent) {
        if evt.frame_id.as_deref() != Some(&self.frame_id) {
            return;
        }
        // A redirect reuses the request id; count the hop instead of
        // tracking a second pending request.
        if evt.redirect_response.is_some() {
            if self.main_request_id.as_deref() == Some(&evt.request_id) {
                self.response.redirect_count += 1;
                trace!(count = self.response.redirect_count, "Main document redirect");
            }
            self.last_activity = Instant::now();
            return;
        }
        if self.pending_requests.insert(evt.request_id.clone()) {
            self.last_activity = Instant::now();
        }
        if evt.resource_type.as_deref() == Some("Document") && self.main_request_id.is_none() {
            self.main_request_id = Some(evt.request_id.clone());
        }
    }

    fn on_response(&mut self, evt: &ResponseReceivedEvent) {
        if self.main_request_id.as_deref() == Some(&evt.request_id) {
            self.response.status = Some(evt.response.status as u16);
            self.response.final_url = Some(evt.response.url.clone());
            self.response.content_type = evt.response.mime_type.clone().or_else(|| {
                evt.response
                    .headers
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                    .map(|(_, v)| v.clone())
            });
        }
        self.last_activity = Instant::now();
    }

    fn finish_request(&mut self, request_id: &str) {
        if self.pending_requests.remove(request_id) {
            self.last_activity = Instant::now();
        }
    }

    /// Fold events until a navigation of the frame is observed.
    async fn drive_until_navigation(&mut self) -> Result<(), WaitError> {
        loop {
            if self.navigated || self.navigated_in_document {
                return Ok(());
            }
            let event = self.event_rx.recv().await;
            self.fold(event)?;
        }
    }
}

/// Tolerant waiter armed before an action that may navigate.
///
/// Non-navigating actions are the common case, so a timeout here is an
/// answer ("no navigation"), not an error.
#[derive(Debug)]
pub struct ActionWatcher {
    watcher: NavigationWatcher,
    completion_timeout: Duration,
}

impl ActionWatcher {
    /// Arm a watcher for an upcoming action on `(session, frame)`.
    pub fn new(
        event_rx: broadcast::Receiver<CdpEvent>,
        session_id: impl Into<String>,
        frame_id: impl Into<String>,
    ) -> Self {
        Self {
            watcher: NavigationWatcher::new(event_rx, session_id, frame_id),
            completion_timeout: ACTION_COMPLETION_TIMEOUT,
        }
    }

    /// Wait out any navigation the action triggered.
    ///
    /// Returns `Ok(true)` if a navigation was detected (and settled or ran
    /// out its budget), `Ok(false)` if none started within the detection
    /// window.
    ///
    /// # Errors
    ///
    /// Only non-timeout conditions are errors.
    pub async fn settle(mut self) -> Result<bool, WaitError> {
        // Detection window: did the action start a navigation at all?
        let detection = timeout(
            ACTION_DETECTION_WINDOW,
            self.watcher.drive_until_navigation(),
        )
        .await;

        match detection {
            // No navigation within the window.
            Err(_) => return Ok(false),
            Ok(Err(e)) => return Err(e),
            Ok(Ok(())) => {}
        }

        if self.watcher.navigated_in_document && !self.watcher.navigated {
            // History API or fragment change; nothing to wait for.
            debug!("Action caused within-document navigation only");
            return Ok(true);
        }

        debug!("Action triggered navigation, waiting for it to settle");
        match self
            .watcher
            .wait_until(LoadPhase::NetworkIdle, self.completion_timeout)
            .await
        {
            Ok(()) => Ok(true),
            // Ran out its budget; the document may still be loading, which
            // the next snapshot will reflect.
            Err(WaitError::Timeout(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(method: &str, session: &str, params: serde_json::Value) -> CdpEvent {
        CdpEvent {
            method: method.to_string(),
            params: Some(params),
            session_id: Some(session.to_string()),
        }
    }

    #[test]
    fn load_phases_are_ordered() {
        assert!(LoadPhase::Commit < LoadPhase::DomContentLoaded);
        assert!(LoadPhase::DomContentLoaded < LoadPhase::Load);
        assert!(LoadPhase::Load < LoadPhase::NetworkIdle);
    }

    #[tokio::test]
    async fn watcher_reaches_load_on_load_event() {
        let (tx, rx) = broadcast::channel(16);
        let mut watcher = NavigationWatcher::new(rx, "S", "F");
        tx.send(event("Page.loadEventFired", "S", serde_json::json!({})))
            .unwrap();
        watcher
            .wait_until(LoadPhase::Load, Duration::from_millis(200))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn watcher_ignores_other_sessions() {
        let (tx, rx) = broadcast::channel(16);
        let mut watcher = NavigationWatcher::new(rx, "S", "F");
        tx.send(event("Page.loadEventFired", "OTHER", serde_json::json!({})))
            .unwrap();
        let err = watcher
            .wait_until(LoadPhase::Load, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn watcher_counts_redirects_and_captures_response() {
        let (tx, rx) = broadcast::channel(16);
        let mut watcher = NavigationWatcher::new(rx, "S", "F");

        tx.send(event(
            "Network.requestWillBeSent",
            "S",
            serde_json::json!({"requestId": "R1", "frameId": "F", "type": "Document"}),
        ))
        .unwrap();
        tx.send(event(
            "Network.requestWillBeSent",
            "S",
            serde_json::json!({
                "requestId": "R1", "frameId": "F", "type": "Document",
                "redirectResponse": {"url": "http://a/", "status": 302, "headers": {}}
            }),
        ))
        .unwrap();
        tx.send(event(
            "Network.responseReceived",
            "S",
            serde_json::json!({
                "requestId": "R1", "frameId": "F",
                "response": {"url": "http://b/", "status": 200, "headers": {}, "mimeType": "text/html"}
            }),
        ))
        .unwrap();
        tx.send(event(
            "Network.loadingFinished",
            "S",
            serde_json::json!({"requestId": "R1"}),
        ))
        .unwrap();
        tx.send(event("Page.loadEventFired", "S", serde_json::json!({})))
            .unwrap();

        watcher
            .wait_until(LoadPhase::Load, Duration::from_millis(200))
            .await
            .unwrap();
        let response = watcher.response();
        assert_eq!(response.redirect_count, 1);
        assert_eq!(response.status, Some(200));
        assert_eq!(response.final_url.as_deref(), Some("http://b/"));
        assert_eq!(response.content_type.as_deref(), Some("text/html"));
    }

    #[tokio::test]
    async fn network_idle_waits_out_the_threshold() {
        let (tx, rx) = broadcast::channel(16);
        let start = Instant::now();
        let mut watcher = NavigationWatcher::new(rx, "S", "F");
        tx.send(event("Page.loadEventFired", "S", serde_json::json!({})))
            .unwrap();
        watcher
            .wait_until(LoadPhase::NetworkIdle, Duration::from_secs(2))
            .await
            .unwrap();
        assert!(start.elapsed() >= NETWORK_IDLE_THRESHOLD);
    }

    #[tokio::test]
    async fn action_watcher_reports_no_navigation() {
        let (_tx, rx) = broadcast::channel::<CdpEvent>(16);
        let watcher = ActionWatcher::new(rx, "S", "F");
        assert!(!watcher.settle().await.unwrap());
    }

    #[tokio::test]
    async fn action_watcher_detects_navigation() {
        let (tx, rx) = broadcast::channel(16);
        let watcher = ActionWatcher::new(rx, "S", "F");
        tx.send(event(
            "Page.frameNavigated",
            "S",
            serde_json::json!({"frame": {"id": "F", "url": "http://x/"}}),
        ))
        .unwrap();
        tx.send(event("Page.loadEventFired", "S", serde_json::json!({})))
            .unwrap();
        assert!(watcher.settle().await.unwrap());
    }
}
