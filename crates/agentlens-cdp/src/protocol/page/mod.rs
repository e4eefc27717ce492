//! Page domain types.
//!
//! Navigation, frame-tree inspection, isolated world creation, and the
//! frame lifecycle events.

use serde::{Deserialize, Serialize};

/// Unique frame identifier.
pub type FrameId = String;

/// Parameters for Page.navigate.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateParams {
    /// URL to navigate to.
    pub url: String,
    /// Referrer URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// Transition type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition_type: Option<String>,
    /// Frame to navigate; the top frame when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<FrameId>,
}

/// Result of Page.navigate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
    /// Frame that was navigated.
    pub frame_id: FrameId,
    /// Loader identifier for the navigation.
    pub loader_id: Option<String>,
    /// Set when the navigation was blocked or failed at the network layer.
    pub error_text: Option<String>,
}

/// A frame in the frame tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Frame identifier.
    pub id: FrameId,
    /// Parent frame identifier, absent on the top frame.
    pub parent_id: Option<FrameId>,
    /// Loader identifier.
    pub loader_id: Option<String>,
    /// Frame name attribute.
    pub name: Option<String>,
    /// Frame document URL.
    pub url: String,
}

/// A node of the frame tree.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTree {
    /// The frame at this node.
    pub frame: Frame,
    /// Child frames, if any.
    pub child_frames: Option<Vec<FrameTree>>,
}

/// Result of Page.getFrameTree.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetFrameTreeResult {
    /// Root of the frame tree.
    pub frame_tree: FrameTree,
}

/// Parameters for Page.createIsolatedWorld.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIsolatedWorldParams {
    /// Frame to create the world in.
    pub frame_id: FrameId,
    /// Human-readable world name; also keys context reuse in the browser.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_name: Option<String>,
    /// Whether the world is granted universal access. The protocol's
    /// misspelling is load-bearing.
    #[serde(rename = "grantUniveralAccess", skip_serializing_if = "Option::is_none")]
    pub grant_univeral_access: Option<bool>,
}

/// Result of Page.createIsolatedWorld.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIsolatedWorldResult {
    /// Execution context of the new world.
    pub execution_context_id: crate::protocol::runtime::ExecutionContextId,
}

/// Parameters for Page.setDocumentContent.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDocumentContentParams {
    /// Frame whose document is replaced.
    pub frame_id: FrameId,
    /// New document HTML.
    pub html: String,
}

/// Event: Page.frameNavigated.
///
/// Fired once per frame when its document is replaced by a committed
/// navigation.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameNavigatedEvent {
    /// The frame after navigation.
    pub frame: Frame,
}

/// Event: Page.frameDetached.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDetachedEvent {
    /// The detached frame.
    pub frame_id: FrameId,
    /// Removal or swap; swapped frames continue in another target.
    pub reason: Option<String>,
}

/// Event: Page.navigatedWithinDocument.
///
/// Same-document navigation (history API, fragments). No document is
/// replaced.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatedWithinDocumentEvent {
    /// Frame that navigated.
    pub frame_id: FrameId,
    /// New URL.
    pub url: String,
}
