//! Core error types.
//!
//! One enum per area, rolled up into [`SurfaceError`] at the agent-facing
//! boundary. Fatal conditions (unknown refs, navigation, authentication,
//! detached frames) surface as typed errors; child-frame trouble degrades
//! the snapshot and lands in the failure log instead.

use std::time::Duration;

use thiserror::Error;

use agentlens_cdp::CdpError;

/// Errors from the bridge injector.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The target frame vanished before or during the operation.
    #[error("frame detached: {0}")]
    FrameDetached(String),

    /// The in-page helper threw.
    #[error("bridge evaluation failed: {0}")]
    Evaluation(String),

    /// The injector was disposed while the operation was in flight.
    #[error("bridge injector disposed")]
    Disposed,

    /// CDP error during injection or dispatch.
    #[error("CDP error: {0}")]
    Cdp(#[from] CdpError),
}

/// Errors from wait primitives.
#[derive(Error, Debug)]
pub enum WaitError {
    /// The awaited condition did not occur in time.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The event stream ended while waiting.
    #[error("connection closed during wait")]
    ConnectionClosed,
}

impl WaitError {
    /// Whether this is the benign timeout case.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Errors from top-level navigation.
#[derive(Error, Debug)]
pub enum NavigationError {
    /// The browser reported a network-level failure.
    #[error("network error: {0}")]
    NetworkError(String),

    /// Waiting for the load state failed.
    #[error("wait error: {0}")]
    Wait(#[from] WaitError),

    /// The main frame could not be injected after navigation.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// The post-navigation snapshot failed.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// CDP error during navigation.
    #[error("CDP error: {0}")]
    Cdp(#[from] CdpError),
}

/// Errors from identity context management.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// No configuration exists for the requested role.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    /// Required authentication state could not be loaded.
    #[error("authentication failed for role '{role}': {reason}")]
    Authentication {
        /// The role whose auth state failed to load.
        role: String,
        /// Why it failed.
        reason: String,
    },

    /// Context creation failed outside the CDP layer.
    #[error("context creation failed: {0}")]
    CreateFailed(String),

    /// Default-URL navigation during role selection failed.
    #[error("navigation error: {0}")]
    Navigation(#[from] NavigationError),

    /// Bridge setup failed during context creation.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// CDP error during context management.
    #[error("CDP error: {0}")]
    Cdp(#[from] CdpError),
}

/// Errors from snapshot composition.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// The main frame's helper call failed.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// The helper returned something other than the snapshot contract.
    #[error("malformed snapshot payload: {0}")]
    Malformed(String),

    /// CDP error during composition.
    #[error("CDP error: {0}")]
    Cdp(#[from] CdpError),
}

/// Errors crossing the agent-facing boundary.
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// The ref is not in the current snapshot's index.
    #[error(
        "unknown ref '{0}': it is not part of the latest snapshot (refs go stale \
         after navigation). Take a new snapshot and retry with a fresh ref."
    )]
    UnknownRef(String),

    /// The frame owning the ref vanished.
    #[error("frame detached: {0}")]
    FrameDetached(String),

    /// Top-level navigation failed.
    #[error("navigation failed: {0}")]
    Navigation(#[from] NavigationError),

    /// Authentication state was required but could not be loaded.
    #[error("authentication failed for role '{role}': {reason}")]
    Authentication {
        /// The role whose auth state failed to load.
        role: String,
        /// Why it failed.
        reason: String,
    },

    /// Bridge failure not attributable to a detached frame.
    #[error("bridge error: {0}")]
    Bridge(BridgeError),

    /// Identity failure other than authentication.
    #[error("identity error: {0}")]
    Identity(IdentityError),

    /// Snapshot composition failed.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// CDP error at the boundary.
    #[error("CDP error: {0}")]
    Cdp(#[from] CdpError),

    /// The tool dispatch got an unrecognized operation name.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The tool dispatch got arguments it cannot decode.
    #[error("invalid arguments for {tool}: {message}")]
    InvalidArguments {
        /// Operation name.
        tool: String,
        /// What was wrong.
        message: String,
    },
}

impl From<BridgeError> for SurfaceError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::FrameDetached(frame_id) => Self::FrameDetached(frame_id),
            other => Self::Bridge(other),
        }
    }
}

impl From<IdentityError> for SurfaceError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::Authentication { role, reason } => {
                Self::Authentication { role, reason }
            }
            other => Self::Identity(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_ref_message_mentions_staleness() {
        let err = SurfaceError::UnknownRef("f1_e1".to_string());
        let msg = err.to_string();
        assert!(msg.contains("f1_e1"));
        assert!(msg.contains("stale"));
        assert!(msg.contains("snapshot"));
    }

    #[test]
    fn frame_detached_bridge_errors_surface_as_frame_detached() {
        let err: SurfaceError = BridgeError::FrameDetached("F123".to_string()).into();
        assert!(matches!(err, SurfaceError::FrameDetached(id) if id == "F123"));
    }

    #[test]
    fn authentication_identity_errors_surface_as_authentication() {
        let err: SurfaceError = IdentityError::Authentication {
            role: "admin".to_string(),
            reason: "no such file".to_string(),
        }
        .into();
        assert!(matches!(err, SurfaceError::Authentication { role, .. } if role == "admin"));
    }

    #[test]
    fn wait_timeout_is_timeout() {
        assert!(WaitError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(!WaitError::ConnectionClosed.is_timeout());
    }
}
