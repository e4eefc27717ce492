//! Per-context failure record.
//!
//! Child-frame trouble must not break main-frame snapshots, so it is
//! recorded here instead of raised: frame injection failures (classified),
//! frame expansion failures, the auth-load error, the frame-discovery
//! error, and cleanup step failures. Snapshots derive their `warnings`
//! field from this log.

use serde::Serialize;
use tracing::{debug, warn};

/// Classification of a frame injection failure, by error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The frame lives in an origin this session cannot script.
    CrossOrigin,
    /// The frame or its execution context was gone by the time we got
    /// there.
    Detached,
    /// The injection timed out.
    Timeout,
    /// Anything else.
    Unknown,
}

/// Substrings that indicate the frame vanished rather than misbehaved.
const DETACHED_INDICATORS: &[&str] = &[
    "frame detached",
    "detached",
    "execution context destroyed",
    "execution context was destroyed",
    "cannot find context",
    "target closed",
    "session closed",
    "session not found",
    "no frame with given id",
    "frame id not found",
];

/// Classify an error message into a [`FailureKind`].
pub fn classify(message: &str) -> FailureKind {
    let lower = message.to_lowercase();
    if lower.contains("cross-origin") {
        FailureKind::CrossOrigin
    } else if DETACHED_INDICATORS.iter().any(|s| lower.contains(s)) {
        FailureKind::Detached
    } else if lower.contains("timeout") {
        FailureKind::Timeout
    } else {
        FailureKind::Unknown
    }
}

/// A recorded frame injection failure.
#[derive(Debug, Clone, Serialize)]
pub struct InjectionFailure {
    /// Frame that could not be injected.
    pub frame_id: String,
    /// Failure classification.
    pub kind: FailureKind,
    /// Whether the failed frame was the main frame.
    pub is_main_frame: bool,
    /// The underlying error message.
    pub message: String,
}

/// A recorded frame expansion failure.
#[derive(Debug, Clone, Serialize)]
pub struct ExpansionFailure {
    /// Frame that could not be expanded, when known.
    pub frame_id: Option<String>,
    /// Whether the frame was detached (as opposed to erroring).
    pub detached: bool,
    /// The underlying error message.
    pub message: String,
}

/// A recorded teardown step failure.
#[derive(Debug, Clone, Serialize)]
pub struct CleanupFailure {
    /// Which teardown step failed.
    pub step: String,
    /// The underlying error message.
    pub message: String,
}

#[derive(Debug, Default)]
struct FailureLogInner {
    injection: Vec<InjectionFailure>,
    expansion: Vec<ExpansionFailure>,
    auth_error: Option<String>,
    discovery_error: Option<String>,
    cleanup: Vec<CleanupFailure>,
}

/// Append-only failure record owned by one identity context.
#[derive(Debug, Default)]
pub struct FailureLog {
    inner: parking_lot::Mutex<FailureLogInner>,
}

/// Point-in-time copy of a [`FailureLog`], for inspection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FailureReport {
    /// Frame injection failures.
    pub injection: Vec<InjectionFailure>,
    /// Frame expansion failures.
    pub expansion: Vec<ExpansionFailure>,
    /// The auth-load error, if hydration failed.
    pub auth_error: Option<String>,
    /// The frame-discovery error, if the frame tree walk failed.
    pub discovery_error: Option<String>,
    /// Teardown step failures.
    pub cleanup: Vec<CleanupFailure>,
}

impl FailureLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a frame injection failure.
    pub fn record_injection(&self, frame_id: &str, is_main_frame: bool, message: String) {
        let kind = classify(&message);
        if kind == FailureKind::Detached {
            debug!(frame_id = %frame_id, message = %message, "Frame detached during injection");
        } else {
            warn!(frame_id = %frame_id, kind = ?kind, message = %message, "Frame injection failed");
        }
        self.inner.lock().injection.push(InjectionFailure {
            frame_id: frame_id.to_string(),
            kind,
            is_main_frame,
            message,
        });
    }

    /// Record a frame expansion failure.
    pub fn record_expansion(&self, frame_id: Option<&str>, detached: bool, message: String) {
        if detached {
            debug!(frame_id = ?frame_id, "Frame detached during expansion");
        } else {
            warn!(frame_id = ?frame_id, message = %message, "Frame expansion failed");
        }
        self.inner.lock().expansion.push(ExpansionFailure {
            frame_id: frame_id.map(ToString::to_string),
            detached,
            message,
        });
    }

    /// Record the auth-load error.
    pub fn set_auth_error(&self, message: String) {
        warn!(message = %message, "Authentication state could not be loaded");
        self.inner.lock().auth_error = Some(message);
    }

    /// Record the frame-discovery error.
    pub fn set_discovery_error(&self, message: String) {
        warn!(message = %message, "Frame discovery failed");
        self.inner.lock().discovery_error = Some(message);
    }

    /// Record a teardown step failure.
    pub fn record_cleanup(&self, step: &str, message: String) {
        warn!(step = %step, message = %message, "Cleanup step failed");
        self.inner.lock().cleanup.push(CleanupFailure {
            step: step.to_string(),
            message,
        });
    }

    /// Whether anything has been recorded.
    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock();
        inner.injection.is_empty()
            && inner.expansion.is_empty()
            && inner.auth_error.is_none()
            && inner.discovery_error.is_none()
            && inner.cleanup.is_empty()
    }

    /// Copy the current contents.
    pub fn report(&self) -> FailureReport {
        let inner = self.inner.lock();
        FailureReport {
            injection: inner.injection.clone(),
            expansion: inner.expansion.clone(),
            auth_error: inner.auth_error.clone(),
            discovery_error: inner.discovery_error.clone(),
            cleanup: inner.cleanup.clone(),
        }
    }

    /// Drop everything recorded so far. Test isolation only.
    pub fn clear(&self) {
        *self.inner.lock() = FailureLogInner::default();
    }
}

/// User-facing warning summary attached to snapshots.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Warnings {
    /// Number of child frames that could not be injected (detached frames
    /// excluded; they are gone, not inaccessible).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inaccessible_frames: Option<usize>,
    /// `"unauthenticated"` when the role's auth state failed to load.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_status: Option<String>,
    /// Set when some frame content is missing from the snapshot text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_content: Option<bool>,
    /// One line per recorded failure.
    pub details: Vec<String>,
}

/// Derive the warning summary, or `None` when nothing has failed.
pub fn build_warnings(log: &FailureLog) -> Option<Warnings> {
    if log.is_empty() {
        return None;
    }
    let report = log.report();

    let inaccessible = report
        .injection
        .iter()
        .filter(|f| f.kind != FailureKind::Detached)
        .count();
    let partial = !report.expansion.is_empty();

    let mut details = Vec::new();
    for failure in &report.injection {
        if failure.kind != FailureKind::Detached {
            details.push(format!(
                "frame {} could not be injected ({:?}): {}",
                failure.frame_id, failure.kind, failure.message
            ));
        }
    }
    for failure in &report.expansion {
        if !failure.detached {
            details.push(format!(
                "frame {} could not be expanded: {}",
                failure.frame_id.as_deref().unwrap_or("<unresolved>"),
                failure.message
            ));
        }
    }
    if let Some(err) = &report.auth_error {
        details.push(format!("authentication state not loaded: {err}"));
    }
    if let Some(err) = &report.discovery_error {
        details.push(format!("frame discovery failed: {err}"));
    }
    for failure in &report.cleanup {
        details.push(format!("cleanup step '{}' failed: {}", failure.step, failure.message));
    }

    Some(Warnings {
        inaccessible_frames: (inaccessible > 0).then_some(inaccessible),
        auth_status: report.auth_error.is_some().then(|| "unauthenticated".to_string()),
        partial_content: partial.then_some(true),
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_message_substring() {
        assert_eq!(
            classify("Frame is cross-origin and cannot be scripted"),
            FailureKind::CrossOrigin
        );
        assert_eq!(classify("frame detached: ABC"), FailureKind::Detached);
        assert_eq!(
            classify("Execution context was destroyed."),
            FailureKind::Detached
        );
        assert_eq!(classify("No frame with given id found"), FailureKind::Detached);
        assert_eq!(classify("response timeout after 30s"), FailureKind::Timeout);
        assert_eq!(classify("something odd"), FailureKind::Unknown);
    }

    #[test]
    fn empty_log_builds_no_warnings() {
        let log = FailureLog::new();
        assert!(log.is_empty());
        assert!(build_warnings(&log).is_none());
    }

    #[test]
    fn injection_failure_counts_as_inaccessible() {
        let log = FailureLog::new();
        log.record_injection("FRAME-A", false, "cross-origin frame".to_string());
        let warnings = build_warnings(&log).unwrap();
        assert_eq!(warnings.inaccessible_frames, Some(1));
        assert_eq!(warnings.auth_status, None);
        assert!(warnings.details.iter().any(|d| d.contains("FRAME-A")));
    }

    #[test]
    fn detached_injection_is_not_a_warning_count() {
        let log = FailureLog::new();
        log.record_injection("FRAME-B", false, "frame detached".to_string());
        let warnings = build_warnings(&log).unwrap();
        assert_eq!(warnings.inaccessible_frames, None);
    }

    #[test]
    fn auth_error_reports_unauthenticated() {
        let log = FailureLog::new();
        log.set_auth_error("no such file".to_string());
        let warnings = build_warnings(&log).unwrap();
        assert_eq!(warnings.auth_status.as_deref(), Some("unauthenticated"));
    }

    #[test]
    fn expansion_failure_marks_partial_content() {
        let log = FailureLog::new();
        log.record_expansion(Some("FRAME-C"), false, "helper threw".to_string());
        let warnings = build_warnings(&log).unwrap();
        assert_eq!(warnings.partial_content, Some(true));
    }

    #[test]
    fn clear_resets_everything() {
        let log = FailureLog::new();
        log.record_injection("F", false, "timeout".to_string());
        log.set_auth_error("x".to_string());
        log.clear();
        assert!(log.is_empty());
    }
}
